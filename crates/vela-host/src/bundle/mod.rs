//! Single-file bundle handoff
//!
//! A bundled apphost carries the application's files appended to its own
//! image. Before the launch paths are computed, the files are extracted and
//! the extraction directory replaces the executable's directory as the
//! application root:
//! - **format**: trailer, manifest and writer
//! - **runner**: extraction into the cache directory

pub mod format;
pub mod runner;

pub use format::{read_trailer, write_bundle, BundleTrailer, ManifestEntry, BUNDLE_MAGIC, TRAILER_SIZE};
pub use runner::BundleRunner;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::status::StatusCode;

/// Errors that can occur while extracting a bundle
#[derive(Debug, Error)]
pub enum BundleError {
    /// I/O error while reading the image or writing files
    #[error("Bundle I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The executable has no bundle trailer
    #[error("{0} is not a single-file bundle")]
    NotABundle(PathBuf),

    /// Trailer, digest or manifest is invalid
    #[error("Bundle is corrupt: {0}")]
    Corrupt(String),

    /// Entry would be written outside the extraction directory
    #[error("Bundle entry has an invalid path: '{0}'")]
    InvalidEntryPath(String),

    /// No base directory is available for extraction
    #[error("No directory is available to extract the bundle to")]
    NoExtractionDir,
}

impl BundleError {
    /// Status code reported when extraction fails with this error.
    pub fn status(&self) -> StatusCode {
        match self {
            BundleError::Io(_) => StatusCode::BundleExtractionIOError,
            BundleError::NotABundle(_) => StatusCode::AppHostExeNotBundle,
            BundleError::Corrupt(_)
            | BundleError::InvalidEntryPath(_)
            | BundleError::NoExtractionDir => StatusCode::BundleExtractionFailure,
        }
    }
}

/// Bundle detection and extraction as seen by the launcher.
pub trait BundleProbe {
    /// Whether the executable at `exe_path` carries a bundle.
    fn is_bundle(&self, exe_path: &Path) -> bool;

    /// Extract the bundle, returning the extraction directory.
    fn extract(&self, exe_path: &Path) -> Result<PathBuf, BundleError>;
}

/// [`BundleProbe`] over the on-disk format.
#[derive(Debug, Clone, Default)]
pub struct NativeBundle {
    base_dir: Option<PathBuf>,
}

impl NativeBundle {
    /// Use `base_dir` if given, otherwise the user cache directory.
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.or_else(default_extract_base),
        }
    }
}

impl BundleProbe for NativeBundle {
    fn is_bundle(&self, exe_path: &Path) -> bool {
        matches!(read_trailer(exe_path), Ok(Some(_)))
    }

    fn extract(&self, exe_path: &Path) -> Result<PathBuf, BundleError> {
        let base_dir = self.base_dir.as_ref().ok_or(BundleError::NoExtractionDir)?;
        BundleRunner::new(exe_path, base_dir).extract()
    }
}

/// `<cache dir>/vela/bundle`, falling back to the temp directory.
pub fn default_extract_base() -> Option<PathBuf> {
    let cache = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    Some(cache.join("vela").join("bundle"))
}
