//! Host status codes.
//!
//! The numeric values are a stable contract: calling shells and tools read
//! them back from the process exit code, so they never change between
//! releases.

use std::fmt;

/// Status and exit codes produced by the host.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success = 0,
    InvalidArgFailure = 0x8000_8081,
    CoreHostLibLoadFailure = 0x8000_8082,
    CoreHostLibMissingFailure = 0x8000_8083,
    CoreHostEntryPointFailure = 0x8000_8084,
    CoreHostCurHostFindFailure = 0x8000_8085,
    AppHostExeNotBoundFailure = 0x8000_8095,
    FrameworkMissingFailure = 0x8000_8096,
    LibHostAppRootFindFailure = 0x8000_809a,
    AppHostExeNotBundle = 0x8000_809e,
    BundleExtractionFailure = 0x8000_809f,
    BundleExtractionIOError = 0x8000_80a0,
}

impl StatusCode {
    /// Raw 32-bit value.
    pub fn value(self) -> u32 {
        self as u32
    }

    /// Value as a process exit code (same bits, signed).
    pub fn exit_code(self) -> i32 {
        self as u32 as i32
    }
}

impl From<StatusCode> for i32 {
    fn from(status: StatusCode) -> i32 {
        status.exit_code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:08x})", self, self.value())
    }
}
