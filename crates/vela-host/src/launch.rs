//! Launch path resolution.
//!
//! Computes the host path, application root and application binary path
//! for one of the two launcher modes, then hands the result to the
//! dispatcher. The mode is fixed per binary: `vela` is always the muxer,
//! `vela-apphost` is always bound-app.

use std::ffi::OsString;
use std::path::{PathBuf, MAIN_SEPARATOR};

use crate::binding::{BindingSource, EmbeddedBinding};
use crate::bundle::{BundleProbe, NativeBundle};
use crate::config::HostConfig;
use crate::dispatch;
use crate::fxr::{DefaultLocator, FxrLocator};
use crate::pal::{self, LibraryLoader, NativeLoader, NativePlatform, Platform};
use crate::status::StatusCode;
use crate::trace::{self, TraceSink};

/// Identity of the generic muxer executable.
pub const MUXER_NAME: &str = "vela";

/// Extension of application binaries.
pub const APP_BINARY_EXT: &str = ".dll";

/// Which launcher this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherMode {
    /// Apphost bound to one application through the embedded binding.
    BoundApp,
    /// The identity-protected generic launcher.
    Muxer,
}

impl LauncherMode {
    /// Name used in diagnostics.
    pub fn host_type(self) -> &'static str {
        match self {
            LauncherMode::BoundApp => "apphost",
            LauncherMode::Muxer => MUXER_NAME,
        }
    }
}

/// Paths computed for one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    pub mode: LauncherMode,
    /// Canonical path of the running executable.
    pub host_path: PathBuf,
    /// Directory the resolver search starts from.
    pub app_root: PathBuf,
    /// Application binary to run.
    pub app_path: PathBuf,
    /// The binding uses a relative sub-path, which the legacy entry point
    /// cannot honor.
    pub requires_v2: bool,
}

/// Collaborators used by a launch.
#[derive(Clone, Copy)]
pub struct HostEnv<'a> {
    pub platform: &'a dyn Platform,
    pub binding: &'a dyn BindingSource,
    pub bundle: &'a dyn BundleProbe,
    pub locator: &'a dyn FxrLocator,
    pub loader: &'a dyn LibraryLoader,
    pub sink: &'a TraceSink,
}

/// Process entry: set up tracing, run the launch, flush, return the exit code.
pub fn host_main(mode: LauncherMode) -> i32 {
    let config = HostConfig::from_env();
    let sink = trace::init(&config.trace);
    let args: Vec<OsString> = std::env::args_os().collect();

    if sink.is_enabled() {
        sink.info(&format!(
            "--- Invoked {} [version: {}] main = {{",
            mode.host_type(),
            env!("CARGO_PKG_VERSION")
        ));
        for arg in &args {
            sink.info(&arg.to_string_lossy());
        }
        sink.info("}");
    }

    let bundle = NativeBundle::new(config.bundle_extract_base.clone());
    let locator = DefaultLocator::from_config(&config);
    let env = HostEnv {
        platform: &NativePlatform,
        binding: &EmbeddedBinding,
        bundle: &bundle,
        locator: &locator,
        loader: &NativeLoader,
        sink,
    };

    let exit_code = exe_start(mode, &args, &env);

    // Flush traces before exit - just to be sure
    sink.flush();
    exit_code
}

/// Resolve the launch paths and dispatch to the resolver.
pub fn exe_start(mode: LauncherMode, args: &[OsString], env: &HostEnv<'_>) -> i32 {
    let context = resolve_host_path(env).and_then(|host_path| match mode {
        LauncherMode::BoundApp => resolve_bound_app(host_path, env),
        LauncherMode::Muxer => resolve_muxer(host_path, args, env),
    });

    match context {
        Ok(context) => dispatch::run(&context, args, env),
        Err(status) => status.into(),
    }
}

/// Canonical path of the running executable.
pub fn resolve_host_path(env: &HostEnv<'_>) -> Result<PathBuf, StatusCode> {
    let own_path = env.platform.own_executable_path();
    match own_path.as_deref().and_then(|path| env.platform.realpath(path)) {
        Some(host_path) => Ok(host_path),
        None => {
            env.sink.error(&format!(
                "Failed to resolve full path of the current executable [{}]",
                own_path.unwrap_or_default().display()
            ));
            Err(StatusCode::CoreHostCurHostFindFailure)
        }
    }
}

/// Bound-app mode: the embedded binding names the application.
pub fn resolve_bound_app(host_path: PathBuf, env: &HostEnv<'_>) -> Result<LaunchContext, StatusCode> {
    let sink = env.sink;

    let binding = match env.binding.read_binding() {
        Ok(binding) => binding,
        Err(err) => {
            sink.error(&err.to_string());
            sink.error("A fatal error was encountered. This executable was not bound to load a managed DLL.");
            return Err(StatusCode::AppHostExeNotBoundFailure);
        }
    };
    sink.info(&format!("The managed DLL bound to this executable is: '{}'", binding));

    let binding = pal::normalize_separators(&binding);
    let requires_v2 = binding.contains(MAIN_SEPARATOR);

    let root = if env.bundle.is_bundle(&host_path) {
        match env.bundle.extract(&host_path) {
            Ok(extraction_dir) => extraction_dir,
            Err(err) => {
                sink.error(&err.to_string());
                sink.error("A fatal error was encountered. Could not extract contents of the bundle");
                return Err(err.status());
            }
        }
    } else {
        pal::get_directory(&host_path)
    };

    let candidate = root.join(&binding);
    let app_path = match env.platform.realpath(&candidate) {
        Some(app_path) => app_path,
        None => {
            sink.error(&format!(
                "The application to execute does not exist: '{}'.",
                candidate.display()
            ));
            return Err(StatusCode::LibHostAppRootFindFailure);
        }
    };

    Ok(LaunchContext {
        mode: LauncherMode::BoundApp,
        app_root: pal::get_directory(&app_path),
        host_path,
        app_path,
        requires_v2,
    })
}

/// Muxer mode: fixed identity, application named on the command line.
pub fn resolve_muxer(
    host_path: PathBuf,
    args: &[OsString],
    env: &HostEnv<'_>,
) -> Result<LaunchContext, StatusCode> {
    let sink = env.sink;
    let file_name = pal::get_filename(&host_path);
    let own_name = pal::strip_executable_ext(&file_name).to_string();

    if !own_name.eq_ignore_ascii_case(MUXER_NAME) {
        // A signed muxer renamed next to an app would let the app pass as
        // signed by the muxer's publisher.
        sink.error(&format!(
            "A fatal error was encountered. Cannot execute {} when renamed to {}.",
            MUXER_NAME, own_name
        ));
        return Err(StatusCode::CoreHostEntryPointFailure);
    }

    if args.len() <= 1 {
        print_usage(sink);
        return Err(StatusCode::InvalidArgFailure);
    }

    let app_root = pal::get_directory(&host_path);
    let app_path = app_root.join(format!("{}{}", own_name, APP_BINARY_EXT));

    Ok(LaunchContext {
        mode: LauncherMode::Muxer,
        host_path,
        app_root,
        app_path,
        requires_v2: false,
    })
}

fn print_usage(sink: &TraceSink) {
    let usage = [
        String::new(),
        format!("Usage: {} [options]", MUXER_NAME),
        format!("Usage: {} [path-to-application]", MUXER_NAME),
        String::new(),
        "Options:".to_string(),
        "  -h|--help         Display help.".to_string(),
        "  --info            Display Vela information.".to_string(),
        "  --list-sdks       Display the installed SDKs.".to_string(),
        "  --list-runtimes   Display the installed runtimes.".to_string(),
        String::new(),
        "path-to-application:".to_string(),
        format!("  The path to an application {} file to execute.", APP_BINARY_EXT),
    ];
    for line in &usage {
        sink.println(line);
    }
}
