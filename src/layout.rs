//! Region layout and wrap-safe index arithmetic.
//!
//! The region is a flat byte slice owned by the caller:
//!
//! ```text
//! byte offset   content
//!   0..8        read_index   (u64 LE)
//!   8..16       write_index  (u64 LE)
//!  16..M        data region, D = M - HEADER_SIZE
//! ```
//!
//! Everything in this module is pure arithmetic over lengths and offsets;
//! it never touches the index fields themselves (see `ring.rs` for the
//! atomic loads/stores).

/// Maximum payload length, in bytes, of a single message.
pub const MAX_MSG: usize = 65536;

/// Size of the fixed header at the front of the region.
pub const HEADER_SIZE: usize = 16;

/// Size of the little-endian length prefix in front of each frame's payload.
pub const PREFIX: usize = 4;

/// Slack reserved so a full ring never aliases the empty condition.
pub const EXTRA: usize = 1;

/// Smallest region a queue can be constructed over.
pub const MIN_REGION_SIZE: usize = HEADER_SIZE + EXTRA + MAX_MSG;

/// Returns the data-region length `D` for a region of total length `m`.
///
/// # Panics
///
/// Panics if `m < HEADER_SIZE`; callers must check `m >= MIN_REGION_SIZE`
/// before calling this.
#[inline]
#[must_use]
pub const fn data_len(m: usize) -> usize {
    m - HEADER_SIZE
}

/// Copies `len` bytes out of the data region starting at data-relative
/// offset `start`, wrapping at the data-region boundary as needed: one
/// copy if the run fits before the end of the region, two copies (split at
/// the boundary) otherwise.
///
/// `start` and `start + len` (mod `d`) must be in-bounds for `data`, which
/// must have length `d`.
#[inline]
pub fn read_wrapping(data: &[u8], start: usize, len: usize, out: &mut [u8]) {
    debug_assert!(out.len() >= len);
    let d = data.len();
    if start + len <= d {
        out[..len].copy_from_slice(&data[start..start + len]);
    } else {
        let first = d - start;
        out[..first].copy_from_slice(&data[start..]);
        out[first..len].copy_from_slice(&data[..len - first]);
    }
}

/// Writes `src` into the data region starting at data-relative offset
/// `start`, wrapping at the data-region boundary as needed, same split
/// rule as `read_wrapping`.
#[inline]
pub fn write_wrapping(data: &mut [u8], start: usize, src: &[u8]) {
    let d = data.len();
    let len = src.len();
    if start + len <= d {
        data[start..start + len].copy_from_slice(src);
    } else {
        let first = d - start;
        data[start..].copy_from_slice(&src[..first]);
        data[..len - first].copy_from_slice(&src[first..]);
    }
}

/// Advances a data-region-relative index by `len` bytes, wrapping at `d`.
#[inline]
#[must_use]
pub const fn advance(index: usize, len: usize, d: usize) -> usize {
    let sum = index + len;
    if sum >= d {
        sum - d
    } else {
        sum
    }
}
