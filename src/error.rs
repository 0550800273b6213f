//! Error types for queue construction and frame operations.

use thiserror::Error;

/// Errors surfaced by [`crate::ShmQueue`].
///
/// Every variant leaves the queue's state unchanged except where noted: a
/// failed `enqueue`/`dequeue_into`/`dequeue` never partially publishes a
/// frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The supplied region is shorter than [`crate::MIN_REGION_SIZE`].
    #[error("region of {actual} bytes is smaller than the minimum of {required} bytes")]
    RegionTooSmall {
        /// Length of the region the caller supplied.
        actual: usize,
        /// `MIN_REGION_SIZE`.
        required: usize,
    },

    /// A restored `read_index` or `write_index` exceeds the data region.
    #[error("corrupt index: {index} exceeds data region of {data_len} bytes")]
    CorruptIndex {
        /// The out-of-range index value read from the header.
        index: u64,
        /// `D`, the data region length.
        data_len: usize,
    },

    /// A decoded frame length is `0` or greater than `MAX_MSG`.
    #[error("corrupt frame: decoded length {0} is out of range")]
    CorruptFrame(u32),

    /// `dequeue`/`dequeue_into` was called on an empty ring.
    #[error("queue is empty")]
    Empty,

    /// `enqueue` was called with a zero-length payload.
    #[error("payload must not be empty")]
    EmptyPayload,

    /// The payload exceeds `MAX_MSG` bytes.
    #[error("payload of {len} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge {
        /// Length of the rejected payload.
        len: usize,
        /// `MAX_MSG`.
        max: usize,
    },

    /// `space_left()` was less than the payload length.
    #[error("insufficient space: need {needed} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Bytes the caller tried to enqueue.
        needed: usize,
        /// `space_left()` at the time of the call.
        available: usize,
    },

    /// The caller-supplied output buffer is shorter than the frame's payload.
    #[error("buffer of {buffer_len} bytes is too small for a frame of {frame_len} bytes")]
    BufferTooSmall {
        /// Length of the caller's buffer.
        buffer_len: usize,
        /// Length of the pending frame's payload.
        frame_len: usize,
    },
}

impl QueueError {
    /// Returns `true` for errors that indicate the region's contents can no
    /// longer be trusted (`CorruptIndex`, `CorruptFrame`).
    #[inline]
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptIndex { .. } | Self::CorruptFrame(_))
    }

    /// Returns `true` for errors a caller can reasonably retry after waiting
    /// (`Empty`, `InsufficientSpace`) or after supplying a bigger buffer
    /// (`BufferTooSmall`). All other variants reflect a programming error
    /// or unrecoverable corruption.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Empty | Self::InsufficientSpace { .. } | Self::BufferTooSmall { .. }
        )
    }
}
