//! Test harness for launcher and dispatch tests
//!
//! Every collaborator of [`HostEnv`] is replaced by a mock that records how
//! it was used. Resolver entry points are `extern "C"` functions recording
//! into thread-locals, so each test thread sees only its own calls.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::ffi::{c_void, CStr, OsString};
use std::io::{self, Write};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::Mutex;
use vela_host::binding::BindingError;
use vela_host::bundle::BundleError;
use vela_host::fxr::abi::{self, ErrorWriterFn, MainFn, MainStartupInfoFn, SetErrorWriterFn};
use vela_host::pal::{string_from_native, PalChar};
use vela_host::{
    exe_start, BindingSource, BundleProbe, DynamicLibrary, FxrLocation, FxrLocator, HostEnv,
    LauncherMode, LibraryLoader, LoadError, LocateError, Platform, TraceSettings, TraceSink,
};

/// A call made into the mock resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverCall {
    MainStartupInfo {
        args: Vec<String>,
        host_path: String,
        runtime_root: Option<String>,
        app_path: Option<String>,
    },
    Main {
        args: Vec<String>,
    },
    SetErrorWriter {
        installed: bool,
    },
}

/// Message the reporting entry point sends through the installed writer.
pub const RESOLVER_DIAGNOSTIC: &CStr = c"velafxr: framework 'Vela.App' was not found";

thread_local! {
    static CALLS: RefCell<Vec<ResolverCall>> = RefCell::new(Vec::new());
    static MAIN_RESULT: Cell<c_int> = Cell::new(0);
    static ERROR_WRITER: Cell<Option<ErrorWriterFn>> = Cell::new(None);
    static WATCHED_STDERR: RefCell<Option<Captured>> = RefCell::new(None);
    static STDERR_AT_CALL: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

/// Clear recorded calls and set the value returned by both entry points.
pub fn reset_resolver(result: c_int) {
    CALLS.with(|calls| calls.borrow_mut().clear());
    MAIN_RESULT.with(|rc| rc.set(result));
    ERROR_WRITER.with(|writer| writer.set(None));
    WATCHED_STDERR.with(|watched| *watched.borrow_mut() = None);
    STDERR_AT_CALL.with(|seen| seen.borrow_mut().clear());
}

pub fn resolver_calls() -> Vec<ResolverCall> {
    CALLS.with(|calls| calls.borrow().clone())
}

/// Snapshot `stderr` every time the mock resolver is entered.
pub fn watch_stderr(stderr: &Captured) {
    WATCHED_STDERR.with(|watched| *watched.borrow_mut() = Some(stderr.clone()));
}

/// What the watched stderr held at each resolver call, in call order.
pub fn stderr_at_calls() -> Vec<String> {
    STDERR_AT_CALL.with(|seen| seen.borrow().clone())
}

fn record(call: ResolverCall) {
    let snapshot = WATCHED_STDERR.with(|watched| watched.borrow().as_ref().map(Captured::contents));
    if let Some(snapshot) = snapshot {
        STDERR_AT_CALL.with(|seen| seen.borrow_mut().push(snapshot));
    }
    CALLS.with(|calls| calls.borrow_mut().push(call));
}

unsafe fn collect_args(argc: c_int, argv: *const *const PalChar) -> Vec<String> {
    (0..argc as usize)
        .map(|i| string_from_native(*argv.add(i)).unwrap_or_default())
        .collect()
}

pub unsafe extern "C" fn mock_main_startupinfo(
    argc: c_int,
    argv: *const *const PalChar,
    host_path: *const PalChar,
    runtime_root: *const PalChar,
    app_path: *const PalChar,
) -> c_int {
    let call = ResolverCall::MainStartupInfo {
        args: collect_args(argc, argv),
        host_path: string_from_native(host_path).unwrap_or_default(),
        runtime_root: string_from_native(runtime_root),
        app_path: string_from_native(app_path),
    };
    record(call);
    MAIN_RESULT.with(|rc| rc.get())
}

pub unsafe extern "C" fn mock_main(argc: c_int, argv: *const *const PalChar) -> c_int {
    let call = ResolverCall::Main {
        args: collect_args(argc, argv),
    };
    record(call);
    MAIN_RESULT.with(|rc| rc.get())
}

pub unsafe extern "C" fn mock_set_error_writer(writer: Option<ErrorWriterFn>) -> Option<ErrorWriterFn> {
    let call = ResolverCall::SetErrorWriter {
        installed: writer.is_some(),
    };
    record(call);
    ERROR_WRITER.with(|installed| installed.replace(writer))
}

/// Modern entry point that reports through the installed error writer.
pub unsafe extern "C" fn mock_main_startupinfo_reporting(
    argc: c_int,
    argv: *const *const PalChar,
    host_path: *const PalChar,
    runtime_root: *const PalChar,
    app_path: *const PalChar,
) -> c_int {
    if let Some(writer) = ERROR_WRITER.with(Cell::get) {
        writer(RESOLVER_DIAGNOSTIC.as_ptr());
    }
    mock_main_startupinfo(argc, argv, host_path, runtime_root, app_path)
}

/// Symbols exported by a mock resolver library.
#[derive(Clone, Copy, Default)]
pub struct Exports {
    pub main_startupinfo: Option<MainStartupInfoFn>,
    pub main: Option<MainFn>,
    pub set_error_writer: Option<SetErrorWriterFn>,
}

impl Exports {
    pub fn modern() -> Self {
        Self {
            main_startupinfo: Some(mock_main_startupinfo),
            main: Some(mock_main),
            set_error_writer: None,
        }
    }

    pub fn modern_with_error_writer() -> Self {
        Self {
            set_error_writer: Some(mock_set_error_writer),
            ..Self::modern()
        }
    }

    pub fn reporting_errors() -> Self {
        Self {
            main_startupinfo: Some(mock_main_startupinfo_reporting),
            ..Self::modern_with_error_writer()
        }
    }

    pub fn legacy() -> Self {
        Self {
            main: Some(mock_main),
            ..Self::default()
        }
    }
}

pub struct MockLibrary {
    path: PathBuf,
    exports: Exports,
    unloads: Rc<Cell<usize>>,
}

impl DynamicLibrary for MockLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &CStr) -> Option<NonNull<c_void>> {
        let address = if name == abi::MAIN_STARTUPINFO_SYMBOL {
            self.exports.main_startupinfo.map(|f| f as *mut c_void)
        } else if name == abi::MAIN_SYMBOL {
            self.exports.main.map(|f| f as *mut c_void)
        } else if name == abi::SET_ERROR_WRITER_SYMBOL {
            self.exports.set_error_writer.map(|f| f as *mut c_void)
        } else {
            None
        };
        address.and_then(NonNull::new)
    }
}

impl Drop for MockLibrary {
    fn drop(&mut self) {
        self.unloads.set(self.unloads.get() + 1);
    }
}

pub struct MockLoader {
    pub exports: Exports,
    pub fail: bool,
    pub loads: RefCell<Vec<PathBuf>>,
    pub unloads: Rc<Cell<usize>>,
}

impl MockLoader {
    pub fn new(exports: Exports) -> Self {
        Self {
            exports,
            fail: false,
            loads: RefCell::new(Vec::new()),
            unloads: Rc::new(Cell::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Exports::default())
        }
    }
}

impl LibraryLoader for MockLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn DynamicLibrary>, LoadError> {
        self.loads.borrow_mut().push(path.to_path_buf());
        if self.fail {
            return Err(LoadError::LoadFailed {
                path: path.to_path_buf(),
                reason: "mock loader refused".to_string(),
            });
        }
        Ok(Box::new(MockLibrary {
            path: path.to_path_buf(),
            exports: self.exports,
            unloads: Rc::clone(&self.unloads),
        }))
    }
}

/// A filesystem where only the listed paths exist.
pub struct MockPlatform {
    pub exe: Option<PathBuf>,
    pub existing: Vec<PathBuf>,
    pub realpath_calls: RefCell<Vec<PathBuf>>,
}

impl MockPlatform {
    pub fn new(exe: &str, existing: &[&str]) -> Self {
        let mut paths: Vec<PathBuf> = existing.iter().map(PathBuf::from).collect();
        paths.push(PathBuf::from(exe));
        Self {
            exe: Some(PathBuf::from(exe)),
            existing: paths,
            realpath_calls: RefCell::new(Vec::new()),
        }
    }
}

impl Platform for MockPlatform {
    fn own_executable_path(&self) -> Option<PathBuf> {
        self.exe.clone()
    }

    fn realpath(&self, path: &Path) -> Option<PathBuf> {
        self.realpath_calls.borrow_mut().push(path.to_path_buf());
        self.existing.iter().find(|p| p.as_path() == path).cloned()
    }
}

pub struct MockBinding(pub Result<String, BindingError>);

impl MockBinding {
    pub fn bound(path: &str) -> Self {
        MockBinding(Ok(path.to_string()))
    }
}

impl BindingSource for MockBinding {
    fn read_binding(&self) -> Result<String, BindingError> {
        self.0.clone()
    }
}

type Extraction = Box<dyn Fn() -> Result<PathBuf, BundleError>>;

pub struct MockBundle {
    pub bundled: bool,
    pub extraction: Extraction,
    pub extract_calls: Cell<usize>,
}

impl MockBundle {
    pub fn none() -> Self {
        Self {
            bundled: false,
            extraction: Box::new(|| Err(BundleError::NoExtractionDir)),
            extract_calls: Cell::new(0),
        }
    }

    pub fn extracting_to(dir: &str) -> Self {
        let dir = PathBuf::from(dir);
        Self {
            bundled: true,
            extraction: Box::new(move || Ok(dir.clone())),
            extract_calls: Cell::new(0),
        }
    }

    pub fn failing(make_error: fn() -> BundleError) -> Self {
        Self {
            bundled: true,
            extraction: Box::new(move || Err(make_error())),
            extract_calls: Cell::new(0),
        }
    }
}

impl BundleProbe for MockBundle {
    fn is_bundle(&self, _exe_path: &Path) -> bool {
        self.bundled
    }

    fn extract(&self, _exe_path: &Path) -> Result<PathBuf, BundleError> {
        self.extract_calls.set(self.extract_calls.get() + 1);
        (self.extraction)()
    }
}

pub struct MockLocator {
    pub result: Result<FxrLocation, LocateError>,
    pub calls: RefCell<Vec<(LauncherMode, PathBuf)>>,
}

impl MockLocator {
    pub fn found(runtime_root: Option<&str>, fxr_path: &str) -> Self {
        Self {
            result: Ok(FxrLocation {
                runtime_root: runtime_root.map(PathBuf::from),
                fxr_path: PathBuf::from(fxr_path),
            }),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn missing() -> Self {
        Self {
            result: Err(LocateError::NoInstallLocation),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl FxrLocator for MockLocator {
    fn locate(&self, mode: LauncherMode, app_root: &Path) -> Result<FxrLocation, LocateError> {
        self.calls.borrow_mut().push((mode, app_root.to_path_buf()));
        self.result.clone()
    }
}

/// In-memory output shared between a sink and a test.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A full set of mocks plus a capturing sink.
pub struct Fixture {
    pub platform: MockPlatform,
    pub binding: MockBinding,
    pub bundle: MockBundle,
    pub locator: MockLocator,
    pub loader: MockLoader,
    pub sink: TraceSink,
    pub stdout: Captured,
    pub stderr: Captured,
}

impl Fixture {
    pub fn new(platform: MockPlatform, locator: MockLocator, loader: MockLoader) -> Self {
        let stdout = Captured::default();
        let stderr = Captured::default();
        let sink = TraceSink::with_outputs(
            &TraceSettings::default(),
            Box::new(stdout.clone()),
            Box::new(stderr.clone()),
        );
        Self {
            platform,
            binding: MockBinding(Err(BindingError::Unreadable)),
            bundle: MockBundle::none(),
            locator,
            loader,
            sink,
            stdout,
            stderr,
        }
    }

    /// Rebuild the sink with tracing enabled; traces share the stderr capture.
    pub fn with_tracing(mut self) -> Self {
        let settings = TraceSettings {
            enabled: true,
            ..TraceSettings::default()
        };
        self.sink = TraceSink::with_outputs(
            &settings,
            Box::new(self.stdout.clone()),
            Box::new(self.stderr.clone()),
        );
        self
    }

    pub fn with_binding(mut self, binding: MockBinding) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_bundle(mut self, bundle: MockBundle) -> Self {
        self.bundle = bundle;
        self
    }

    /// Run the launcher and flush the sink.
    pub fn run(&self, mode: LauncherMode, args: &[&str]) -> i32 {
        let args: Vec<OsString> = args.iter().map(OsString::from).collect();
        let env = HostEnv {
            platform: &self.platform,
            binding: &self.binding,
            bundle: &self.bundle,
            locator: &self.locator,
            loader: &self.loader,
            sink: &self.sink,
        };
        let rc = exe_start(mode, &args, &env);
        self.sink.flush();
        rc
    }

    pub fn locator_calls(&self) -> usize {
        self.locator.calls.borrow().len()
    }

    pub fn unloads(&self) -> usize {
        self.loader.unloads.get()
    }

    /// Error lines mentioning `needle`.
    pub fn error_lines_containing(&self, needle: &str) -> usize {
        self.stderr
            .contents()
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}
