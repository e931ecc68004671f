//! Dynamic library loading
//!
//! Cross-platform support for loading the resolver library (.so, .dylib, .dll).
//! Symbols are looked up as optional capabilities: a missing export is a
//! normal answer, not an error.

use std::ffi::{c_void, CStr};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use thiserror::Error;

/// Errors that can occur during library loading
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file could not be loaded
    #[error("Failed to load {path}: {reason}")]
    LoadFailed {
        /// Path that was attempted
        path: PathBuf,
        /// Loader diagnostic
        reason: String,
    },

    /// Path can't be passed to the platform loader
    #[error("Invalid library path: {0}")]
    InvalidPath(PathBuf),
}

/// A loaded shared library. Dropping it unloads the library.
pub trait DynamicLibrary {
    /// Path the library was loaded from.
    fn path(&self) -> &Path;

    /// Address of an exported symbol, if the library exports it.
    fn symbol(&self, name: &CStr) -> Option<NonNull<c_void>>;
}

/// Loads shared libraries.
pub trait LibraryLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn DynamicLibrary>, LoadError>;
}

/// [`LibraryLoader`] using the platform loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl LibraryLoader for NativeLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn DynamicLibrary>, LoadError> {
        Ok(Box::new(Library::open(path)?))
    }
}

/// Cross-platform dynamic library handle
pub struct Library {
    handle: LibraryHandle,
    path: PathBuf,
}

impl Library {
    /// Load a dynamic library from the given path.
    ///
    /// # Platform-specific behavior
    ///
    /// - **Linux/macOS**: `dlopen(RTLD_NOW | RTLD_LOCAL)`
    /// - **Windows**: `LoadLibraryExW` with the library's own directory on
    ///   the dependency search path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let handle = LibraryHandle::load(path)?;
        log::debug!("Loaded library [{}]", path.display());

        Ok(Library {
            handle,
            path: path.to_path_buf(),
        })
    }
}

impl DynamicLibrary for Library {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &CStr) -> Option<NonNull<c_void>> {
        let symbol = self.handle.symbol(name);
        if symbol.is_none() {
            log::debug!(
                "Symbol [{}] not exported by [{}]",
                name.to_string_lossy(),
                self.path.display()
            );
        }
        symbol
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        log::debug!("Unloading library [{}]", self.path.display());
        // LibraryHandle handles cleanup
    }
}

// Platform-specific implementations

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(windows)]
type LibraryHandle = WindowsLibrary;

// ============================================================================
// Unix Implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
struct UnixLibrary {
    handle: NonNull<c_void>,
}

#[cfg(unix)]
impl UnixLibrary {
    fn load(path: &Path) -> Result<Self, LoadError> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| LoadError::InvalidPath(path.to_path_buf()))?;

        // RTLD_NOW: Resolve all symbols immediately
        // RTLD_LOCAL: Symbols not available for subsequently loaded libraries
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };

        match NonNull::new(handle) {
            Some(handle) => Ok(UnixLibrary { handle }),
            None => Err(LoadError::LoadFailed {
                path: path.to_path_buf(),
                reason: last_dl_error(),
            }),
        }
    }

    fn symbol(&self, name: &CStr) -> Option<NonNull<c_void>> {
        unsafe {
            // Clear any previous errors
            libc::dlerror();
            NonNull::new(libc::dlsym(self.handle.as_ptr(), name.as_ptr()))
        }
    }
}

#[cfg(unix)]
fn last_dl_error() -> String {
    unsafe {
        let err_ptr = libc::dlerror();
        if err_ptr.is_null() {
            "Unknown error".to_string()
        } else {
            CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
        }
    }
}

#[cfg(unix)]
impl Drop for UnixLibrary {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle.as_ptr());
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
struct WindowsLibrary {
    handle: NonNull<c_void>,
}

#[cfg(windows)]
impl WindowsLibrary {
    fn load(path: &Path) -> Result<Self, LoadError> {
        use std::os::windows::ffi::OsStrExt;

        // Convert to wide string
        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe {
            LoadLibraryExW(
                wide.as_ptr(),
                std::ptr::null_mut(),
                LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR | LOAD_LIBRARY_SEARCH_DEFAULT_DIRS,
            )
        };

        match NonNull::new(handle) {
            Some(handle) => Ok(WindowsLibrary { handle }),
            None => {
                let error = unsafe { GetLastError() };
                Err(LoadError::LoadFailed {
                    path: path.to_path_buf(),
                    reason: format!("error code: {}", error),
                })
            }
        }
    }

    fn symbol(&self, name: &CStr) -> Option<NonNull<c_void>> {
        NonNull::new(unsafe { GetProcAddress(self.handle.as_ptr(), name.as_ptr()) })
    }
}

#[cfg(windows)]
impl Drop for WindowsLibrary {
    fn drop(&mut self) {
        unsafe {
            FreeLibrary(self.handle.as_ptr());
        }
    }
}

#[cfg(windows)]
const LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR: u32 = 0x0000_0100;
#[cfg(windows)]
const LOAD_LIBRARY_SEARCH_DEFAULT_DIRS: u32 = 0x0000_1000;

// Windows FFI declarations
#[cfg(windows)]
extern "system" {
    fn LoadLibraryExW(filename: *const u16, file: *mut c_void, flags: u32) -> *mut c_void;
    fn GetProcAddress(module: *mut c_void, procname: *const std::os::raw::c_char) -> *mut c_void;
    fn FreeLibrary(module: *mut c_void) -> i32;
    fn GetLastError() -> u32;
}
