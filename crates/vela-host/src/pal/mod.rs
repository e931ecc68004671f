//! Platform layer
//!
//! Thin wrappers over what the host needs from the operating system:
//! - **executable path** discovery and canonicalization ([`Platform`])
//! - **path helpers** (directory/file name, separator normalization)
//! - **native strings** for the resolver ABI ([`NativeString`])
//! - **dynamic libraries** ([`library`])

pub mod library;

pub use library::{DynamicLibrary, Library, LibraryLoader, LoadError, NativeLoader};

use std::ffi::OsStr;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Character type of the resolver ABI (`char` on Unix, UTF-16 on Windows).
#[cfg(unix)]
pub type PalChar = std::os::raw::c_char;

/// Character type of the resolver ABI (`char` on Unix, UTF-16 on Windows).
#[cfg(windows)]
pub type PalChar = u16;

/// Operating system services used while resolving the launch paths.
pub trait Platform {
    /// Path of the running executable, as reported by the OS.
    fn own_executable_path(&self) -> Option<PathBuf>;

    /// Absolute path with symlinks and relative segments resolved.
    ///
    /// Returns `None` if the path does not exist.
    fn realpath(&self, path: &Path) -> Option<PathBuf>;
}

/// [`Platform`] backed by `std`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePlatform;

impl Platform for NativePlatform {
    fn own_executable_path(&self) -> Option<PathBuf> {
        std::env::current_exe().ok()
    }

    fn realpath(&self, path: &Path) -> Option<PathBuf> {
        std::fs::canonicalize(path).ok().map(simplify_verbatim)
    }
}

#[cfg(windows)]
fn simplify_verbatim(path: PathBuf) -> PathBuf {
    // `\\?\C:\dir` -> `C:\dir`; UNC verbatim paths are kept as is.
    match path.to_str() {
        Some(s) if s.starts_with(r"\\?\") && !s.starts_with(r"\\?\UNC\") => PathBuf::from(&s[4..]),
        _ => path,
    }
}

#[cfg(not(windows))]
fn simplify_verbatim(path: PathBuf) -> PathBuf {
    path
}

/// Directory portion of `path` (empty if there is none).
pub fn get_directory(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// File name of `path` as a string (lossy).
pub fn get_filename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Strip the platform executable suffix (`.exe` on Windows), ignoring case.
pub fn strip_executable_ext(name: &str) -> &str {
    strip_suffix_ignore_case(name, std::env::consts::EXE_SUFFIX)
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> &'a str {
    if suffix.is_empty() || name.len() < suffix.len() {
        return name;
    }
    let split = name.len() - suffix.len();
    match name.get(split..) {
        Some(tail) if tail.eq_ignore_ascii_case(suffix) => &name[..split],
        _ => name,
    }
}

/// Replace `/` with the host separator on hosts where they differ.
pub fn normalize_separators(path: &str) -> String {
    if MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace('/', &MAIN_SEPARATOR.to_string())
    }
}

/// Platform file name of a shared library: `libname.so`, `libname.dylib`, `name.dll`.
pub fn library_file_name(stem: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        stem,
        std::env::consts::DLL_SUFFIX
    )
}

/// NUL-terminated string in the resolver ABI encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeString(Vec<PalChar>);

impl NativeString {
    #[cfg(unix)]
    pub fn from_os(value: &OsStr) -> Self {
        use std::os::unix::ffi::OsStrExt;

        let mut chars: Vec<PalChar> = value
            .as_bytes()
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as PalChar)
            .collect();
        chars.push(0);
        NativeString(chars)
    }

    #[cfg(windows)]
    pub fn from_os(value: &OsStr) -> Self {
        use std::os::windows::ffi::OsStrExt;

        let mut chars: Vec<PalChar> = value.encode_wide().take_while(|&c| c != 0).collect();
        chars.push(0);
        NativeString(chars)
    }

    pub fn from_path(path: &Path) -> Self {
        Self::from_os(path.as_os_str())
    }

    pub fn as_ptr(&self) -> *const PalChar {
        self.0.as_ptr()
    }
}

/// Read a NUL-terminated ABI string.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
pub unsafe fn string_from_native(ptr: *const PalChar) -> Option<String> {
    if ptr.is_null() {
        return None;
    }

    #[cfg(unix)]
    {
        Some(
            std::ffi::CStr::from_ptr(ptr)
                .to_string_lossy()
                .into_owned(),
        )
    }

    #[cfg(windows)]
    {
        let mut len = 0;
        while *ptr.add(len) != 0 {
            len += 1;
        }
        Some(String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len)))
    }
}
