//! Resolver library location
//!
//! Finds the runtime root and the `velafxr` library that will receive
//! control:
//!
//! - **muxer**: the runtime root is the muxer's own directory
//! - **apphost, self-contained**: the library sits next to the application
//! - **apphost, framework-dependent**: the runtime root comes from
//!   `VELA_ROOT[_<ARCH>]`, the registered install location, or the
//!   platform default
//!
//! Under a runtime root the library lives in `host/fxr/<version>/`; the
//! highest semantic version wins.

pub mod abi;

use std::path::{Path, PathBuf};

use semver::Version;
use thiserror::Error;

use crate::config::HostConfig;
use crate::launch::LauncherMode;
use crate::pal::library_file_name;
use abi::LIBFXR_NAME;

/// Where the runtime and its resolver library were found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FxrLocation {
    /// Runtime root passed to the resolver; `None` lets it pick its own.
    pub runtime_root: Option<PathBuf>,
    /// Full path of the resolver library.
    pub fxr_path: PathBuf,
}

/// Errors that can occur while locating the resolver library
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocateError {
    #[error("A fatal error occurred, the default install location cannot be obtained.")]
    NoInstallLocation,

    #[error("A fatal error occurred. The required library {lib} could not be found. The folder [{0}] does not exist.", lib = library_file_name(LIBFXR_NAME))]
    FxrDirMissing(PathBuf),

    #[error("A fatal error occurred, the folder [{0}] does not contain any version-numbered child folders.")]
    NoVersion(PathBuf),

    #[error("A fatal error occurred. The required library could not be found in [{0}].")]
    LibraryMissing(PathBuf),
}

/// Finds the resolver library for an application root.
pub trait FxrLocator {
    fn locate(&self, mode: LauncherMode, app_root: &Path) -> Result<FxrLocation, LocateError>;
}

/// The standard search described in the module docs.
#[derive(Debug, Clone, Default)]
pub struct DefaultLocator {
    runtime_root: Option<PathBuf>,
    install_location_file: Option<PathBuf>,
    default_install_dir: Option<PathBuf>,
}

impl DefaultLocator {
    pub fn new(
        runtime_root: Option<PathBuf>,
        install_location_file: Option<PathBuf>,
        default_install_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            runtime_root,
            install_location_file,
            default_install_dir,
        }
    }

    pub fn from_config(config: &HostConfig) -> Self {
        Self::new(
            config.runtime_root.clone(),
            config.install_location_file.clone(),
            config.default_install_dir.clone(),
        )
    }

    /// Runtime root for a framework-dependent app.
    fn global_runtime_root(&self) -> Result<PathBuf, LocateError> {
        if let Some(root) = &self.runtime_root {
            log::info!("Using environment variable as runtime location [{}]", root.display());
            return Ok(root.clone());
        }

        if let Some(registered) = self.install_location_file.as_deref().and_then(read_install_location) {
            log::info!("Using registered install location [{}]", registered.display());
            return Ok(registered);
        }

        match &self.default_install_dir {
            Some(dir) => {
                log::info!("Using global installation location [{}]", dir.display());
                Ok(dir.clone())
            }
            None => Err(LocateError::NoInstallLocation),
        }
    }
}

impl FxrLocator for DefaultLocator {
    fn locate(&self, mode: LauncherMode, app_root: &Path) -> Result<FxrLocation, LocateError> {
        let runtime_root = match mode {
            LauncherMode::Muxer => app_root.to_path_buf(),
            LauncherMode::BoundApp => {
                let app_local = app_root.join(library_file_name(LIBFXR_NAME));
                if app_local.is_file() {
                    log::info!("Resolved fxr [{}] next to the app", app_local.display());
                    return Ok(FxrLocation {
                        runtime_root: Some(app_root.to_path_buf()),
                        fxr_path: app_local,
                    });
                }
                self.global_runtime_root()?
            }
        };

        let fxr_path = latest_fxr(&runtime_root.join("host").join("fxr"))?;
        log::info!("Resolved fxr [{}]", fxr_path.display());
        Ok(FxrLocation {
            runtime_root: Some(runtime_root),
            fxr_path,
        })
    }
}

/// First non-empty line of the install-location file.
fn read_install_location(file: &Path) -> Option<PathBuf> {
    let contents = std::fs::read_to_string(file).ok()?;
    let line = contents.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(PathBuf::from(line))
    }
}

/// Library path inside the highest version directory of `fxr_dir`.
pub fn latest_fxr(fxr_dir: &Path) -> Result<PathBuf, LocateError> {
    if !fxr_dir.is_dir() {
        return Err(LocateError::FxrDirMissing(fxr_dir.to_path_buf()));
    }

    let entries =
        std::fs::read_dir(fxr_dir).map_err(|_| LocateError::FxrDirMissing(fxr_dir.to_path_buf()))?;

    let mut best: Option<(Version, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let version = match entry.file_name().to_str().and_then(|name| Version::parse(name).ok()) {
            Some(version) => version,
            None => continue,
        };
        log::debug!("Considering fxr version [{}]", version);
        if best.as_ref().map_or(true, |(current, _)| version > *current) {
            best = Some((version, path));
        }
    }

    let (version, dir) = best.ok_or_else(|| LocateError::NoVersion(fxr_dir.to_path_buf()))?;
    log::info!("Detected latest fxr version [{}]", version);

    let library = dir.join(library_file_name(LIBFXR_NAME));
    if library.is_file() {
        Ok(library)
    } else {
        Err(LocateError::LibraryMissing(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn install_fxr(root: &Path, version: &str) -> PathBuf {
        let dir = root.join("host").join("fxr").join(version);
        fs::create_dir_all(&dir).unwrap();
        let lib = dir.join(library_file_name(LIBFXR_NAME));
        fs::write(&lib, b"lib").unwrap();
        lib
    }

    #[test]
    fn test_latest_fxr_picks_highest_semver() {
        let temp = TempDir::new().unwrap();
        install_fxr(temp.path(), "2.1.0");
        install_fxr(temp.path(), "10.0.1");
        install_fxr(temp.path(), "10.0.1-preview.1");
        let expected = install_fxr(temp.path(), "10.0.1");
        fs::create_dir_all(temp.path().join("host/fxr/not-a-version")).unwrap();

        let found = latest_fxr(&temp.path().join("host").join("fxr")).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_latest_fxr_missing_dir() {
        let temp = TempDir::new().unwrap();
        let fxr_dir = temp.path().join("host").join("fxr");
        assert_eq!(latest_fxr(&fxr_dir), Err(LocateError::FxrDirMissing(fxr_dir.clone())));

        fs::create_dir_all(fxr_dir.join("junk")).unwrap();
        assert_eq!(latest_fxr(&fxr_dir), Err(LocateError::NoVersion(fxr_dir.clone())));
    }

    #[test]
    fn test_latest_fxr_library_missing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("host").join("fxr").join("3.0.0");
        fs::create_dir_all(&dir).unwrap();
        assert_eq!(
            latest_fxr(&temp.path().join("host").join("fxr")),
            Err(LocateError::LibraryMissing(dir))
        );
    }

    #[test]
    fn test_muxer_uses_own_directory() {
        let temp = TempDir::new().unwrap();
        let lib = install_fxr(temp.path(), "1.0.0");
        let location = DefaultLocator::default()
            .locate(LauncherMode::Muxer, temp.path())
            .unwrap();
        assert_eq!(location.runtime_root.as_deref(), Some(temp.path()));
        assert_eq!(location.fxr_path, lib);
    }

    #[test]
    fn test_self_contained_app() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path().join(library_file_name(LIBFXR_NAME));
        fs::write(&lib, b"lib").unwrap();
        let location = DefaultLocator::default()
            .locate(LauncherMode::BoundApp, temp.path())
            .unwrap();
        assert_eq!(location.fxr_path, lib);
        assert_eq!(location.runtime_root.as_deref(), Some(temp.path()));
    }

    #[test]
    fn test_framework_dependent_app_uses_override() {
        let app = TempDir::new().unwrap();
        let runtime = TempDir::new().unwrap();
        let lib = install_fxr(runtime.path(), "5.0.0");
        let locator = DefaultLocator::new(Some(runtime.path().to_path_buf()), None, None);
        let location = locator.locate(LauncherMode::BoundApp, app.path()).unwrap();
        assert_eq!(location.fxr_path, lib);
        assert_eq!(location.runtime_root.as_deref(), Some(runtime.path()));
    }

    #[test]
    fn test_registered_location_before_default() {
        let app = TempDir::new().unwrap();
        let registered = TempDir::new().unwrap();
        let lib = install_fxr(registered.path(), "6.0.0");
        let file = app.path().join("install_location");
        fs::write(&file, format!("{}\n", registered.path().display())).unwrap();

        let locator = DefaultLocator::new(None, Some(file), Some(PathBuf::from("/nonexistent/vela")));
        let location = locator.locate(LauncherMode::BoundApp, app.path()).unwrap();
        assert_eq!(location.fxr_path, lib);
    }

    #[test]
    fn test_no_install_location() {
        let app = TempDir::new().unwrap();
        let locator = DefaultLocator::new(None, Some(app.path().join("missing")), None);
        assert_eq!(
            locator.locate(LauncherMode::BoundApp, app.path()),
            Err(LocateError::NoInstallLocation)
        );
    }
}
