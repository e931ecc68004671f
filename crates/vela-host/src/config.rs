//! Host configuration.
//!
//! Everything the host reads from its environment is gathered here once at
//! startup. Lookups go through a caller-supplied function so tests can
//! build a configuration without touching the process environment.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::trace::{TraceSettings, DEFAULT_VERBOSITY};

/// Enables host tracing when set to `1`.
pub const TRACE_ENV: &str = "VELA_HOST_TRACE";
/// Redirects trace output to a file.
pub const TRACE_FILE_ENV: &str = "VELA_HOST_TRACEFILE";
/// Trace verbosity, 1 (errors) to 4 (verbose).
pub const TRACE_VERBOSITY_ENV: &str = "VELA_HOST_TRACE_VERBOSITY";
/// Runtime root override; an architecture-specific variant takes precedence.
pub const RUNTIME_ROOT_ENV: &str = "VELA_ROOT";
/// Base directory for single-file bundle extraction.
pub const BUNDLE_EXTRACT_BASE_DIR_ENV: &str = "VELA_BUNDLE_EXTRACT_BASE_DIR";

/// Resolved host configuration.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    pub trace: TraceSettings,
    /// Runtime root from `VELA_ROOT_<ARCH>` or `VELA_ROOT`.
    pub runtime_root: Option<PathBuf>,
    /// Base directory for bundle extraction.
    pub bundle_extract_base: Option<PathBuf>,
    /// File whose first line names a registered install location.
    pub install_location_file: Option<PathBuf>,
    /// Platform default install location.
    pub default_install_dir: Option<PathBuf>,
}

impl HostConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let enabled = get(TRACE_ENV).map_or(false, |value| value == "1");
        let verbosity = get(TRACE_VERBOSITY_ENV)
            .and_then(|value| value.to_str().and_then(|s| s.trim().parse::<u8>().ok()))
            .map(|level| level.clamp(1, DEFAULT_VERBOSITY))
            .unwrap_or(DEFAULT_VERBOSITY);
        let trace = TraceSettings {
            enabled,
            verbosity,
            trace_file: get(TRACE_FILE_ENV).map(PathBuf::from),
        };

        let runtime_root = get(&arch_runtime_root_env())
            .or_else(|| get(RUNTIME_ROOT_ENV))
            .map(PathBuf::from);

        Self {
            trace,
            runtime_root,
            bundle_extract_base: get(BUNDLE_EXTRACT_BASE_DIR_ENV).map(PathBuf::from),
            install_location_file: install_location_file(),
            default_install_dir: default_install_dir(&get),
        }
    }
}

/// `VELA_ROOT_X64`, `VELA_ROOT_ARM64`, ...
pub fn arch_runtime_root_env() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "X64".to_string(),
        "x86" => "X86".to_string(),
        "aarch64" => "ARM64".to_string(),
        "arm" => "ARM".to_string(),
        other => other.to_ascii_uppercase(),
    };
    format!("{}_{}", RUNTIME_ROOT_ENV, arch)
}

#[cfg(unix)]
fn install_location_file() -> Option<PathBuf> {
    Some(PathBuf::from("/etc/vela/install_location"))
}

#[cfg(not(unix))]
fn install_location_file() -> Option<PathBuf> {
    None
}

#[cfg(target_os = "macos")]
fn default_install_dir(_get: &dyn Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    Some(PathBuf::from("/usr/local/share/vela"))
}

#[cfg(all(unix, not(target_os = "macos")))]
fn default_install_dir(_get: &dyn Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    Some(PathBuf::from("/usr/share/vela"))
}

#[cfg(windows)]
fn default_install_dir(get: &dyn Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    get("ProgramFiles").map(|dir| PathBuf::from(dir).join("vela"))
}
