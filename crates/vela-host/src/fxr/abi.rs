//! velafxr ABI
//!
//! Symbol names and signatures exported by the resolver library, and typed
//! lookups that turn "symbol present or absent" into an `Option`.

use std::ffi::CStr;
use std::os::raw::c_int;

use crate::pal::{DynamicLibrary, PalChar};

/// File stem of the resolver library.
pub const LIBFXR_NAME: &str = "velafxr";

pub const MAIN_STARTUPINFO_SYMBOL: &CStr = c"velafxr_main_startupinfo";
pub const MAIN_SYMBOL: &CStr = c"velafxr_main";
pub const SET_ERROR_WRITER_SYMBOL: &CStr = c"velafxr_set_error_writer";

/// Modern entry point.
pub type MainStartupInfoFn = unsafe extern "C" fn(
    argc: c_int,
    argv: *const *const PalChar,
    host_path: *const PalChar,
    runtime_root: *const PalChar,
    app_path: *const PalChar,
) -> c_int;

/// Legacy entry point.
pub type MainFn = unsafe extern "C" fn(argc: c_int, argv: *const *const PalChar) -> c_int;

/// Callback receiving the resolver's error messages.
pub type ErrorWriterFn = unsafe extern "C" fn(message: *const PalChar);

/// Installs an error writer (or clears it with `None`), returning the previous one.
pub type SetErrorWriterFn = unsafe extern "C" fn(writer: Option<ErrorWriterFn>) -> Option<ErrorWriterFn>;

pub fn main_startupinfo(library: &dyn DynamicLibrary) -> Option<MainStartupInfoFn> {
    library
        .symbol(MAIN_STARTUPINFO_SYMBOL)
        .map(|ptr| unsafe { std::mem::transmute::<*mut std::ffi::c_void, MainStartupInfoFn>(ptr.as_ptr()) })
}

pub fn main(library: &dyn DynamicLibrary) -> Option<MainFn> {
    library
        .symbol(MAIN_SYMBOL)
        .map(|ptr| unsafe { std::mem::transmute::<*mut std::ffi::c_void, MainFn>(ptr.as_ptr()) })
}

pub fn set_error_writer(library: &dyn DynamicLibrary) -> Option<SetErrorWriterFn> {
    library
        .symbol(SET_ERROR_WRITER_SYMBOL)
        .map(|ptr| unsafe { std::mem::transmute::<*mut std::ffi::c_void, SetErrorWriterFn>(ptr.as_ptr()) })
}
