//! Resolver dispatch
//!
//! Loads `velafxr`, probes which entry points it exports and calls the best
//! one. The library handle is owned here for exactly one call and dropped
//! (unloaded) before [`run`] returns, whatever branch was taken.

use std::cell::Cell;
use std::ffi::OsString;
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::fxr::abi::{self, SetErrorWriterFn, LIBFXR_NAME};
use crate::fxr::FxrLocation;
use crate::launch::{HostEnv, LaunchContext};
use crate::pal::{library_file_name, string_from_native, DynamicLibrary, NativeString, PalChar};
use crate::status::StatusCode;
use crate::trace::{self, TraceSink};

/// Where users are sent when no suitable runtime is installed.
pub const RUNTIME_DOWNLOAD_URL: &str = "https://vela-runtime.dev/download";

/// Where users are sent when the resolver library exists but will not load.
pub const PREREQUISITES_URL: &str = "https://vela-runtime.dev/docs/install/prerequisites";

/// Locate, load and invoke the resolver for `context`.
pub fn run(context: &LaunchContext, args: &[OsString], env: &HostEnv<'_>) -> i32 {
    let sink = env.sink;

    let location = match env.locator.locate(context.mode, &context.app_root) {
        Ok(location) => location,
        Err(err) => {
            sink.error(&err.to_string());
            sink.error(&format!(
                "  - The Vela runtime can be found at: {}",
                RUNTIME_DOWNLOAD_URL
            ));
            return StatusCode::CoreHostLibMissingFailure.into();
        }
    };

    let library = match env.loader.load(&location.fxr_path) {
        Ok(library) => library,
        Err(err) => {
            sink.info(&err.to_string());
            sink.error(&format!(
                "The library {} was found, but loading it from {} failed",
                library_file_name(LIBFXR_NAME),
                location.fxr_path.display()
            ));
            sink.error("  - Installing Vela prerequisites might help resolve this problem.");
            sink.error(&format!("     {}", PREREQUISITES_URL));
            return StatusCode::CoreHostLibLoadFailure.into();
        }
    };

    let rc = invoke(context, &location, library.as_ref(), args, sink);
    drop(library);
    rc
}

fn invoke(
    context: &LaunchContext,
    location: &FxrLocation,
    library: &dyn DynamicLibrary,
    args: &[OsString],
    sink: &TraceSink,
) -> i32 {
    let argv = NativeArgs::new(args);

    if let Some(main_startupinfo) = abi::main_startupinfo(library) {
        let host_path = NativeString::from_path(&context.host_path);
        let runtime_root = location
            .runtime_root
            .as_deref()
            .filter(|root| !root.as_os_str().is_empty())
            .map(NativeString::from_path);
        let app_path = Some(context.app_path.as_path())
            .filter(|path| !path.as_os_str().is_empty())
            .map(NativeString::from_path);

        sink.info(&format!(
            "Invoking fx resolver [{}] v2",
            library.path().display()
        ));
        sink.info(&format!("Host path: [{}]", context.host_path.display()));
        sink.info(&format!(
            "Runtime root: [{}]",
            location
                .runtime_root
                .as_deref()
                .map(|root| root.display().to_string())
                .unwrap_or_default()
        ));
        sink.info(&format!("App path: [{}]", context.app_path.display()));

        let set_error_writer = abi::set_error_writer(library);
        let rc = {
            let _guard = ErrorWriterGuard::install(set_error_writer, sink);
            unsafe {
                main_startupinfo(
                    argv.argc(),
                    argv.as_ptr(),
                    host_path.as_ptr(),
                    runtime_root.as_ref().map_or(ptr::null(), NativeString::as_ptr),
                    app_path.as_ref().map_or(ptr::null(), NativeString::as_ptr),
                )
            }
        };

        if rc == StatusCode::FrameworkMissingFailure.exit_code()
            && set_error_writer.is_none()
            && sink.has_error_writer()
        {
            sink.error(&format!(
                "  - To run this application, you need to install a newer version of Vela: {}",
                RUNTIME_DOWNLOAD_URL
            ));
        }
        return rc;
    }

    if context.requires_v2 {
        sink.error(&format!(
            "The required library {} does not support relative app paths. Please upgrade the Vela runtime.",
            library.path().display()
        ));
        return StatusCode::CoreHostEntryPointFailure.into();
    }

    match abi::main(library) {
        Some(main) => {
            sink.info(&format!(
                "Invoking fx resolver [{}] v1",
                library.path().display()
            ));
            // The legacy entry point sets up its own tracing.
            sink.flush();
            unsafe { main(argv.argc(), argv.as_ptr()) }
        }
        None => {
            sink.error(&format!(
                "The library {} does not contain a valid entry point.",
                library.path().display()
            ));
            StatusCode::CoreHostEntryPointFailure.into()
        }
    }
}

thread_local! {
    // Sink of the dispatch in progress on this thread, null outside one.
    static ACTIVE_SINK: Cell<*const TraceSink> = const { Cell::new(ptr::null()) };
}

/// Keeps the resolver's error writer pointed at [`forward_resolver_error`],
/// and that bridge pointed at `sink`, while alive.
pub struct ErrorWriterGuard<'a> {
    set_error_writer: Option<SetErrorWriterFn>,
    previous_sink: *const TraceSink,
    _sink: PhantomData<&'a TraceSink>,
}

impl<'a> ErrorWriterGuard<'a> {
    /// Flush the sink, then install the bridge if the resolver exports an
    /// installer.
    pub fn install(set_error_writer: Option<SetErrorWriterFn>, sink: &'a TraceSink) -> Self {
        sink.flush();
        let previous_sink = ACTIVE_SINK.with(|active| active.replace(sink as *const TraceSink));
        if let Some(set) = set_error_writer {
            unsafe {
                set(Some(forward_resolver_error));
            }
        }
        Self {
            set_error_writer,
            previous_sink,
            _sink: PhantomData,
        }
    }
}

impl Drop for ErrorWriterGuard<'_> {
    fn drop(&mut self) {
        if let Some(set) = self.set_error_writer.take() {
            unsafe {
                set(None);
            }
        }
        ACTIVE_SINK.with(|active| active.set(self.previous_sink));
    }
}

/// Error callback handed to the resolver.
///
/// Messages go to the sink of the dispatch in progress, else the
/// process-wide sink, else stderr.
pub extern "C" fn forward_resolver_error(message: *const PalChar) {
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        let message = match unsafe { string_from_native(message) } {
            Some(message) => message,
            None => return,
        };
        let active = ACTIVE_SINK.with(Cell::get);
        // Non-null only while a guard borrowing the sink is alive.
        match unsafe { active.as_ref() }.or_else(|| trace::global()) {
            Some(sink) => sink.error(&message),
            None => eprintln!("{}", message),
        }
    }));
}

/// `argv` in ABI form: NUL-terminated native strings and a trailing null
/// pointer.
pub struct NativeArgs {
    // Owns the buffers `pointers` refers to.
    _strings: Vec<NativeString>,
    pointers: Vec<*const PalChar>,
}

impl NativeArgs {
    pub fn new(args: &[OsString]) -> Self {
        let strings: Vec<NativeString> = args.iter().map(|arg| NativeString::from_os(arg)).collect();
        let mut pointers: Vec<*const PalChar> = strings.iter().map(NativeString::as_ptr).collect();
        pointers.push(ptr::null());
        Self {
            _strings: strings,
            pointers,
        }
    }

    pub fn argc(&self) -> c_int {
        c_int::try_from(self.pointers.len() - 1).unwrap_or(c_int::MAX)
    }

    pub fn as_ptr(&self) -> *const *const PalChar {
        self.pointers.as_ptr()
    }
}
