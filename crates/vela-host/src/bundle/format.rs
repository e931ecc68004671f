//! Single-file bundle format
//!
//! Defines the payload appended to an apphost executable.
//!
//! ```text
//! ┌─────────────────────────┐
//! │  apphost (bound)        │  ← normal launcher executable
//! ├─────────────────────────┤
//! │  File data              │  ← each file's bytes, back to back
//! ├─────────────────────────┤
//! │  Manifest               │  ← FileEntryHeader + path, per file
//! ├─────────────────────────┤
//! │  Trailer                │  ← fixed-size, at very end of file
//! └─────────────────────────┘
//! ```
//!
//! File data and manifest together form the payload; the trailer carries
//! its SHA-256 digest.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Magic bytes identifying a bundle trailer.
pub const BUNDLE_MAGIC: [u8; 8] = *b"VELABNDL";

/// Current format version.
pub const BUNDLE_VERSION: u32 = 1;

/// Size of the bundle trailer in bytes.
pub const TRAILER_SIZE: usize = std::mem::size_of::<BundleTrailer>();

/// Size of a manifest entry header in bytes.
pub const ENTRY_HEADER_SIZE: usize = std::mem::size_of::<FileEntryHeader>();

/// Fixed-size trailer at the very end of the bundled executable.
///
/// To detect if an executable is a bundle, read the last `TRAILER_SIZE`
/// bytes and check if magic matches.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct BundleTrailer {
    /// Magic bytes: b"VELABNDL"
    pub magic: [u8; 8],

    /// Format version.
    pub version: u32,

    /// Number of files in the manifest.
    pub file_count: u32,

    /// Byte offset of the manifest from start of payload.
    pub manifest_offset: u64,

    /// Size of the manifest in bytes.
    pub manifest_size: u64,

    /// Offset from the start of the file to the start of the payload.
    /// This equals the size of the host image.
    pub payload_offset: u64,

    /// Size of the payload (file data + manifest).
    pub payload_size: u64,

    /// SHA-256 of the payload.
    pub digest: [u8; 32],

    /// Size of this trailer struct (for forward compatibility).
    pub trailer_size: u32,
}

/// Entry in the manifest, followed by `path_len` bytes of UTF-8 path.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct FileEntryHeader {
    /// Length of the relative path (UTF-8 bytes).
    pub path_len: u32,

    /// Byte offset of the file data from start of payload.
    pub offset: u64,

    /// Size of the file data in bytes.
    pub size: u64,
}

/// A file listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Relative path, `/` separated.
    pub path: String,
    pub offset: u64,
    pub size: u64,
}

impl BundleTrailer {
    /// Check if this trailer has the correct magic bytes.
    pub fn is_valid(&self) -> bool {
        let trailer_size = self.trailer_size;
        self.magic == BUNDLE_MAGIC && trailer_size as usize == TRAILER_SIZE
    }

    /// Read a trailer from raw bytes (must be at least TRAILER_SIZE bytes).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < TRAILER_SIZE {
            return None;
        }

        // Safety: BundleTrailer is repr(C, packed) with no padding
        let trailer = unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const BundleTrailer) };

        if trailer.is_valid() {
            Some(trailer)
        } else {
            None
        }
    }

    /// Write the trailer to a byte buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; TRAILER_SIZE];
        unsafe {
            std::ptr::write_unaligned(bytes.as_mut_ptr() as *mut BundleTrailer, *self);
        }
        bytes
    }

    /// Hex id derived from the payload digest, used to name extraction directories.
    pub fn bundle_id(&self) -> String {
        let digest = self.digest;
        hex::encode(&digest[..8])
    }
}

impl FileEntryHeader {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ENTRY_HEADER_SIZE {
            return None;
        }
        Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const FileEntryHeader) })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; ENTRY_HEADER_SIZE];
        unsafe {
            std::ptr::write_unaligned(bytes.as_mut_ptr() as *mut FileEntryHeader, *self);
        }
        bytes
    }
}

/// Read the trailer of the file at `path`, if it has one.
///
/// Only the last `TRAILER_SIZE` bytes are read.
pub fn read_trailer(path: &Path) -> io::Result<Option<BundleTrailer>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < TRAILER_SIZE as u64 {
        return Ok(None);
    }

    file.seek(SeekFrom::End(-(TRAILER_SIZE as i64)))?;
    let mut bytes = vec![0u8; TRAILER_SIZE];
    file.read_exact(&mut bytes)?;
    Ok(BundleTrailer::from_bytes(&bytes))
}

/// Parse the manifest section.
///
/// Returns `None` if the manifest is truncated, a path is not UTF-8, or an
/// entry points outside the file data.
pub fn read_manifest(manifest: &[u8], file_count: u32, data_len: u64) -> Option<Vec<ManifestEntry>> {
    // The digest does not cover the trailer, so the count is untrusted.
    let capacity = (file_count as usize).min(manifest.len() / ENTRY_HEADER_SIZE);
    let mut entries = Vec::with_capacity(capacity);
    let mut offset = 0;

    for _ in 0..file_count {
        let header = FileEntryHeader::from_bytes(manifest.get(offset..)?)?;
        offset += ENTRY_HEADER_SIZE;

        let path_len = header.path_len as usize;
        let path_bytes = manifest.get(offset..offset.checked_add(path_len)?)?;
        let path = std::str::from_utf8(path_bytes).ok()?.to_string();
        offset += path_len;

        let (file_offset, size) = (header.offset, header.size);
        if file_offset.checked_add(size)? > data_len {
            return None;
        }

        entries.push(ManifestEntry {
            path,
            offset: file_offset,
            size,
        });
    }

    if offset != manifest.len() {
        return None;
    }

    Some(entries)
}

/// Append a bundle of `files` to `host_image` and write the result.
///
/// Files are stored sorted by path so identical inputs produce identical
/// bundles (and the same bundle id).
pub fn write_bundle<W: Write>(
    writer: &mut W,
    host_image: &[u8],
    files: &[(String, Vec<u8>)],
) -> io::Result<BundleTrailer> {
    let mut sorted: Vec<&(String, Vec<u8>)> = files.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut payload = Vec::new();
    let mut manifest = Vec::new();

    for (path, data) in sorted {
        let header = FileEntryHeader {
            path_len: format_u32(path.len(), "bundle path length")?,
            offset: payload.len() as u64,
            size: data.len() as u64,
        };
        payload.extend_from_slice(data);
        manifest.extend_from_slice(&header.to_bytes());
        manifest.extend_from_slice(path.as_bytes());
    }

    let manifest_offset = payload.len() as u64;
    payload.extend_from_slice(&manifest);

    let trailer = BundleTrailer {
        magic: BUNDLE_MAGIC,
        version: BUNDLE_VERSION,
        file_count: format_u32(files.len(), "bundle entry count")?,
        manifest_offset,
        manifest_size: manifest.len() as u64,
        payload_offset: host_image.len() as u64,
        payload_size: payload.len() as u64,
        digest: Sha256::digest(&payload).into(),
        trailer_size: TRAILER_SIZE as u32,
    };

    writer.write_all(host_image)?;
    writer.write_all(&payload)?;
    writer.write_all(&trailer.to_bytes())?;

    Ok(trailer)
}

fn format_u32(len: usize, what: &str) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} {} does not fit the bundle format", what, len),
        )
    })
}
