//! Bundle extraction
//!
//! Unpacks the files of a bundled apphost into a cache directory:
//! 1. Read the whole executable, locate the trailer
//! 2. Verify the payload digest
//! 3. Parse the manifest and validate every entry path
//! 4. Reuse `<base>/<app>/<bundle id>` if a previous run extracted it,
//!    otherwise write into a staging directory and rename it into place

use std::fs;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use super::format::{read_manifest, BundleTrailer, ManifestEntry, TRAILER_SIZE};
use super::BundleError;

/// Extracts one bundled executable.
#[derive(Debug, Clone)]
pub struct BundleRunner {
    exe_path: PathBuf,
    base_dir: PathBuf,
}

impl BundleRunner {
    pub fn new(exe_path: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            exe_path: exe_path.into(),
            base_dir: base_dir.into(),
        }
    }

    /// Verify the bundle and list its files without extracting them.
    pub fn inspect(&self) -> Result<(BundleTrailer, Vec<ManifestEntry>), BundleError> {
        let image = fs::read(&self.exe_path)?;
        self.verify(&image)
    }

    /// Extract the bundle, returning the directory holding its files.
    pub fn extract(&self) -> Result<PathBuf, BundleError> {
        let image = fs::read(&self.exe_path)?;
        let (trailer, entries) = self.verify(&image)?;
        let payload = payload_slice(&image, &trailer)?;

        let final_dir = self.extraction_dir(&trailer);
        if final_dir.is_dir() {
            log::info!("Reusing extraction of bundle at [{}]", final_dir.display());
            return Ok(final_dir);
        }

        let parent = get_parent(&final_dir)?;
        fs::create_dir_all(&parent)?;
        let staging = parent.join(format!("{}.{}.tmp", trailer.bundle_id(), std::process::id()));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }

        if let Err(err) = write_entries(&staging, payload, &entries) {
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }

        match fs::rename(&staging, &final_dir) {
            Ok(()) => {
                log::info!(
                    "Extracted {} files of bundle to [{}]",
                    entries.len(),
                    final_dir.display()
                );
                Ok(final_dir)
            }
            Err(_) if final_dir.is_dir() => {
                // Another process finished the same extraction first.
                let _ = fs::remove_dir_all(&staging);
                Ok(final_dir)
            }
            Err(err) => {
                let _ = fs::remove_dir_all(&staging);
                Err(err.into())
            }
        }
    }

    /// Check the trailer, payload digest, manifest and entry paths.
    fn verify(&self, image: &[u8]) -> Result<(BundleTrailer, Vec<ManifestEntry>), BundleError> {
        if image.len() < TRAILER_SIZE {
            return Err(BundleError::NotABundle(self.exe_path.clone()));
        }

        let trailer = BundleTrailer::from_bytes(&image[image.len() - TRAILER_SIZE..])
            .ok_or_else(|| BundleError::NotABundle(self.exe_path.clone()))?;
        let version = trailer.version;
        if version != super::format::BUNDLE_VERSION {
            return Err(BundleError::Corrupt(format!(
                "unsupported bundle version {}",
                version
            )));
        }

        let payload = payload_slice(image, &trailer)?;
        let digest: [u8; 32] = Sha256::digest(payload).into();
        if digest != trailer.digest {
            return Err(BundleError::Corrupt("payload digest mismatch".to_string()));
        }

        let manifest_start = trailer.manifest_offset as usize;
        let manifest_end = manifest_start
            .checked_add(trailer.manifest_size as usize)
            .filter(|&end| end <= payload.len() && manifest_start <= end)
            .ok_or_else(|| BundleError::Corrupt("manifest out of range".to_string()))?;
        let entries = read_manifest(
            &payload[manifest_start..manifest_end],
            trailer.file_count,
            trailer.manifest_offset,
        )
        .ok_or_else(|| BundleError::Corrupt("malformed manifest".to_string()))?;

        for entry in &entries {
            validate_entry_path(&entry.path)?;
        }

        Ok((trailer, entries))
    }

    /// `<base>/<app name>/<bundle id>`
    pub fn extraction_dir(&self, trailer: &BundleTrailer) -> PathBuf {
        let app_name = self
            .exe_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app".to_string());
        self.base_dir.join(app_name).join(trailer.bundle_id())
    }
}

fn payload_slice<'a>(image: &'a [u8], trailer: &BundleTrailer) -> Result<&'a [u8], BundleError> {
    let start = trailer.payload_offset as usize;
    let size = trailer.payload_size as usize;
    let end = start
        .checked_add(size)
        .filter(|&end| end == image.len() - TRAILER_SIZE)
        .ok_or_else(|| BundleError::Corrupt("payload out of range".to_string()))?;
    Ok(&image[start..end])
}

fn get_parent(dir: &Path) -> Result<PathBuf, BundleError> {
    dir.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| BundleError::Corrupt(format!("invalid extraction directory {}", dir.display())))
}

/// Entry paths must stay inside the extraction directory.
fn validate_entry_path(path: &str) -> Result<(), BundleError> {
    let relative = Path::new(path);
    let valid = !path.is_empty()
        && !path.contains('\\')
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(BundleError::InvalidEntryPath(path.to_string()))
    }
}

fn write_entries(dir: &Path, payload: &[u8], entries: &[ManifestEntry]) -> Result<(), BundleError> {
    fs::create_dir_all(dir)?;
    for entry in entries {
        let target = dir.join(&entry.path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let start = entry.offset as usize;
        let end = start + entry.size as usize;
        fs::write(&target, &payload[start..end])?;
    }
    Ok(())
}
