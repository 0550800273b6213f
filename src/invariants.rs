//! Debug assertion macros for the queue's runtime invariants.
//!
//! These macros provide runtime checks only; they are compiled out entirely
//! in release builds (`debug_assert!`).

// =============================================================================
// INV-IDX-01: Index range
// =============================================================================

/// Assert that an index lies in `[0, d)`.
///
/// Used after every publish of `read_index` / `write_index`.
macro_rules! debug_assert_index_in_range {
    ($name:literal, $index:expr, $d:expr) => {
        debug_assert!(
            ($index as usize) < $d,
            "INV-IDX-01 violated: {} index {} not in [0, {})",
            $name,
            $index,
            $d
        )
    };
}

// =============================================================================
// INV-EMPTY-01: Empty iff equal indices
// =============================================================================

/// Assert that emptiness and index equality agree.
macro_rules! debug_assert_empty_iff_equal {
    ($empty:expr, $r:expr, $w:expr) => {
        debug_assert!(
            $empty == ($r == $w),
            "INV-EMPTY-01 violated: empty()={} but read_index={} write_index={}",
            $empty,
            $r,
            $w
        )
    };
}

// =============================================================================
// INV-FRAME-01: Frame length bounds
// =============================================================================

/// Assert that a decoded frame's payload length is in `[1, MAX_MSG]`.
///
/// Used right after decoding the length prefix, before the corrupt-frame
/// error path is even considered. This macro exists to catch the codec's
/// own bugs, not untrusted input (that's `QueueError::CorruptFrame`).
macro_rules! debug_assert_frame_len {
    ($len:expr, $max:expr) => {
        debug_assert!(
            $len >= 1 && $len <= $max,
            "INV-FRAME-01 violated: frame length {} outside [1, {}]",
            $len,
            $max
        )
    };
}

// =============================================================================
// INV-FREE-01: Reserved slack
// =============================================================================

/// Assert that a committed enqueue never writes into the reserved slack.
///
/// **Invariant**: `len(payload) + PREFIX + EXTRA <= raw_free(r, w)`
macro_rules! debug_assert_reserve_respected {
    ($needed:expr, $raw_free:expr) => {
        debug_assert!(
            $needed <= $raw_free,
            "INV-FREE-01 violated: needed {} bytes but raw free space was {}",
            $needed,
            $raw_free
        )
    };
}

pub(crate) use debug_assert_empty_iff_equal;
pub(crate) use debug_assert_frame_len;
pub(crate) use debug_assert_index_in_range;
pub(crate) use debug_assert_reserve_respected;
