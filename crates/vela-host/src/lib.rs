//! Vela native host
//!
//! The bootstrap layer that runs before the Vela runtime exists in the
//! process. It works out which application to run, finds the `velafxr`
//! resolver library and hands control to it:
//! - **binding**: app path embedded in a patched apphost
//! - **bundle**: single-file bundle extraction
//! - **launch**: apphost and muxer path resolution
//! - **fxr**: resolver library location and ABI
//! - **dispatch**: load and invoke the resolver
//! - **trace**: diagnostics sink
//! - **pal**: platform helpers and dynamic loading

pub mod binding;
pub mod bundle;
pub mod config;
pub mod dispatch;
pub mod fxr;
pub mod launch;
pub mod pal;
pub mod status;
pub mod trace;

pub use binding::{BindingError, BindingSource, EmbeddedBinding};
pub use bundle::{BundleError, BundleProbe, NativeBundle};
pub use config::HostConfig;
pub use fxr::{DefaultLocator, FxrLocation, FxrLocator, LocateError};
pub use launch::{exe_start, host_main, HostEnv, LaunchContext, LauncherMode};
pub use pal::{DynamicLibrary, LibraryLoader, LoadError, NativeLoader, NativePlatform, Platform};
pub use status::StatusCode;
pub use trace::{TraceSettings, TraceSink};
