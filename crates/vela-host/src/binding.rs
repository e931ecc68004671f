//! Embedded application binding.
//!
//! An apphost template carries a fixed 1025-byte region that initially
//! holds a 64-character placeholder. `vela-hostwriter` overwrites the
//! placeholder in the built executable with the NUL-terminated UTF-8
//! relative path of the application binary. A template that was never
//! patched still contains the placeholder and refuses to run.
//!
//! The placeholder is only ever compared against its two halves, held as
//! separate NUL-terminated statics, so the full value exists exactly once
//! in the image: inside the region itself. A region is recognized as the
//! placeholder followed by zeros up to `EMBED_SIZE`.

use thiserror::Error;

/// Length of the placeholder (both halves).
pub const SENTINEL_LEN: usize = 64;
/// Length of one half of the placeholder, excluding its terminator.
pub const HALF_LEN: usize = SENTINEL_LEN / 2;
/// Longest binding accepted, in UTF-8 bytes, excluding the terminator.
pub const MAX_BINDING_LEN: usize = 1024;
/// Size of the embedded region.
pub const EMBED_SIZE: usize = MAX_BINDING_LEN + 1;

const HI_PART: [u8; HALF_LEN + 1] = *b"c3ab8ff13720e8ad9047dd39466b3c89\0";
const LO_PART: [u8; HALF_LEN + 1] = *b"74e592c2fa383d4a3960714caef0c4f2\0";

/// First half of the placeholder, NUL-terminated.
pub static EMBED_HASH_HI_PART: [u8; HALF_LEN + 1] = HI_PART;
/// Second half of the placeholder, NUL-terminated.
pub static EMBED_HASH_LO_PART: [u8; HALF_LEN + 1] = LO_PART;

/// The region patched by `vela-hostwriter`. Never written at runtime.
#[used]
static APP_BINDING: [u8; EMBED_SIZE] = initial_region();

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("The managed DLL bound to this executable could not be retrieved from the executable image.")]
    Unreadable,

    #[error("This executable is not bound to a managed DLL to execute. The binding value is: '{0}'")]
    NotBound(String),

    #[error("The application path to bind is empty")]
    EmptyPath,

    #[error("The application path to bind contains a NUL character")]
    PathContainsNul,

    #[error("The application path to bind is {len} bytes long; at most {max} bytes are supported", max = MAX_BINDING_LEN)]
    PathTooLong { len: usize },

    #[error("The binding placeholder was not found; the image is not an unbound apphost template")]
    SentinelNotFound,

    #[error("The image contains {count} binding placeholder regions; expected exactly one")]
    AmbiguousSentinel { count: usize },
}

/// Where the launcher gets its binding from.
pub trait BindingSource {
    fn read_binding(&self) -> Result<String, BindingError>;
}

/// The binding compiled into this executable.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedBinding;

impl BindingSource for EmbeddedBinding {
    fn read_binding(&self) -> Result<String, BindingError> {
        extract_binding()
    }
}

// Evaluated only for the static initializer.
const fn initial_region() -> [u8; EMBED_SIZE] {
    let mut region = [0u8; EMBED_SIZE];
    let mut i = 0;
    while i < HALF_LEN {
        region[i] = HI_PART[i];
        region[HALF_LEN + i] = LO_PART[i];
        i += 1;
    }
    region
}

/// Read and validate the binding of the running executable.
pub fn extract_binding() -> Result<String, BindingError> {
    // Volatile so the compile-time content is never folded into the check.
    let region = unsafe { std::ptr::read_volatile(std::ptr::addr_of!(APP_BINDING)) };
    decode_binding(&region)
}

/// Decode a binding region: trim at the first NUL, require UTF-8, reject
/// the unpatched placeholder.
pub fn decode_binding(region: &[u8]) -> Result<String, BindingError> {
    let region = &region[..region.len().min(EMBED_SIZE)];
    let end = region.iter().position(|&b| b == 0).unwrap_or(region.len());
    let binding = std::str::from_utf8(&region[..end]).map_err(|_| BindingError::Unreadable)?;

    if is_placeholder(binding.as_bytes(), &Halves::load()) {
        return Err(BindingError::NotBound(binding.to_string()));
    }

    Ok(binding.to_string())
}

/// The sentinel halves as read from their statics.
struct Halves {
    hi: [u8; HALF_LEN + 1],
    lo: [u8; HALF_LEN + 1],
}

impl Halves {
    fn load() -> Self {
        // Volatile so the comparison operands stay the terminated statics.
        unsafe {
            Self {
                hi: std::ptr::read_volatile(std::ptr::addr_of!(EMBED_HASH_HI_PART)),
                lo: std::ptr::read_volatile(std::ptr::addr_of!(EMBED_HASH_LO_PART)),
            }
        }
    }
}

fn is_placeholder(bytes: &[u8], halves: &Halves) -> bool {
    bytes.len() >= SENTINEL_LEN
        && bytes[..HALF_LEN] == halves.hi[..HALF_LEN]
        && bytes[HALF_LEN..SENTINEL_LEN] == halves.lo[..HALF_LEN]
}

fn is_unbound_region(bytes: &[u8], halves: &Halves) -> bool {
    bytes.len() >= EMBED_SIZE
        && is_placeholder(bytes, halves)
        && bytes[SENTINEL_LEN..EMBED_SIZE].iter().all(|&b| b == 0)
}

/// Bind an apphost image to `app_path`.
///
/// Finds the placeholder, writes the path and its terminator, and zeroes
/// whatever is left of the placeholder. Returns the region offset.
pub fn patch_image(image: &mut [u8], app_path: &str) -> Result<usize, BindingError> {
    let bytes = app_path.as_bytes();
    if bytes.is_empty() {
        return Err(BindingError::EmptyPath);
    }
    if bytes.contains(&0) {
        return Err(BindingError::PathContainsNul);
    }
    if bytes.len() > MAX_BINDING_LEN {
        return Err(BindingError::PathTooLong { len: bytes.len() });
    }

    let offset = find_placeholder(image)?;
    let region = &mut image[offset..offset + EMBED_SIZE];
    region[..bytes.len()].copy_from_slice(bytes);
    let clear_to = SENTINEL_LEN.max(bytes.len() + 1);
    for b in &mut region[bytes.len()..clear_to] {
        *b = 0;
    }

    Ok(offset)
}

/// Offsets of every unbound region in `image`.
pub fn placeholder_regions(image: &[u8]) -> Vec<usize> {
    if image.len() < EMBED_SIZE {
        return Vec::new();
    }
    let halves = Halves::load();
    (0..=image.len() - EMBED_SIZE)
        .filter(|&offset| is_unbound_region(&image[offset..], &halves))
        .collect()
}

/// Offset of the single unbound region in `image`.
pub fn find_placeholder(image: &[u8]) -> Result<usize, BindingError> {
    match placeholder_regions(image).as_slice() {
        [] => Err(BindingError::SentinelNotFound),
        [offset] => Ok(*offset),
        offsets => Err(BindingError::AmbiguousSentinel {
            count: offsets.len(),
        }),
    }
}
