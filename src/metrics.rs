//! Optional instrumentation for monitoring queue activity.
//!
//! A handful of atomics the queue bumps on its hot path (`Ordering::Relaxed`,
//! since these are counters, not synchronization points) and a plain `Copy`
//! snapshot struct callers can read without touching the atomics again.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters updated by [`crate::ShmQueue`] when metrics are
/// enabled at construction time.
#[derive(Debug, Default)]
pub struct Metrics {
    messages_enqueued: AtomicU64,
    messages_dequeued: AtomicU64,
    corrupt_frames: AtomicU64,
}

impl Metrics {
    /// Creates a fresh, zeroed set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_enqueued(&self, n: u64) {
        self.messages_enqueued.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_dequeued(&self, n: u64) {
        self.messages_dequeued.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_corrupt_frame(&self) {
        self.corrupt_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot of the counters.
    ///
    /// The three loads are independent `Relaxed` reads, so a snapshot taken
    /// concurrently with activity may show `messages_dequeued` very slightly
    /// ahead of or behind `messages_enqueued`. Fine for monitoring, not
    /// meant for correctness checks.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_enqueued: self.messages_enqueued.load(Ordering::Relaxed),
            messages_dequeued: self.messages_dequeued.load(Ordering::Relaxed),
            corrupt_frames: self.corrupt_frames.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`Metrics`]' counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total messages successfully enqueued.
    pub messages_enqueued: u64,
    /// Total messages successfully dequeued.
    pub messages_dequeued: u64,
    /// Total corrupt-frame errors encountered while dequeuing.
    pub corrupt_frames: u64,
}
