//! The SPSC framed byte queue itself: construction, free-space accounting,
//! and the enqueue/dequeue frame codec.
//!
//! # Memory ordering
//!
//! Only the producer ever stores `write_index`; only the consumer ever
//! stores `read_index`. Both sides read both indices. The store that
//! publishes `write_index` after an enqueue uses `Release` ordering with
//! respect to the preceding frame-byte writes; the peer's load of
//! `write_index` uses `Acquire`, so observing the new index implies
//! observing the frame bytes. The same pairing applies symmetrically to
//! `read_index`. Each side's load of its *own* index uses `Relaxed`, since
//! only that side ever writes it.
//!
//! # Safety
//!
//! `ShmQueue` does not own the region; it holds a raw pointer into bytes
//! the caller guarantees will outlive the queue (typically a memory-mapped
//! file, see [`crate::mapping`]). It never borrows the region as a Rust
//! `&mut [u8]` beyond the call that constructs it, which is what lets two
//! independent handles exist over the same bytes (e.g. a producer's handle
//! in one process and a consumer's handle in another, both mapping the
//! same file). The SPSC discipline, at most one producer and at most one
//! consumer, coordinated by the caller, is exactly what makes the
//! unsynchronized byte-level reads and writes of frame contents sound; it
//! is never checked by this type.

use crate::error::QueueError;
use crate::invariants::{
    debug_assert_empty_iff_equal, debug_assert_frame_len, debug_assert_index_in_range,
    debug_assert_reserve_respected,
};
use crate::layout::{self, EXTRA, HEADER_SIZE, MAX_MSG, MIN_REGION_SIZE, PREFIX};
use crate::metrics::{Metrics, MetricsSnapshot};
use std::ptr::NonNull;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free SPSC message queue over a fixed, caller-supplied byte region.
///
/// See the module docs for the safety contract. All operations are
/// wait-free: bounded work proportional to the message length, no waiting
/// on the peer.
pub struct ShmQueue {
    ptr: NonNull<u8>,
    len: usize,
    metrics: Option<Metrics>,
}

// SAFETY: the only shared mutable state (`read_index`/`write_index`) is
// accessed exclusively through atomics; the frame bytes are only ever
// touched by one side at a time under the documented SPSC discipline.
unsafe impl Send for ShmQueue {}
unsafe impl Sync for ShmQueue {}

impl ShmQueue {
    /// Creates a fresh queue over `region`, zeroing both indices.
    ///
    /// Intended for the side that first initializes a freshly allocated or
    /// freshly mapped region (typically the producer).
    pub fn create(region: &mut [u8]) -> Result<Self, QueueError> {
        Self::create_impl(region, None)
    }

    /// Like [`Self::create`], with [`Metrics`] instrumentation enabled.
    pub fn create_with_metrics(region: &mut [u8]) -> Result<Self, QueueError> {
        Self::create_impl(region, Some(Metrics::new()))
    }

    fn create_impl(region: &mut [u8], metrics: Option<Metrics>) -> Result<Self, QueueError> {
        Self::check_region_len(region.len())?;
        let queue = Self::from_region(region, metrics);
        queue.store_read_index(0, Ordering::Relaxed);
        queue.store_write_index(0, Ordering::Relaxed);
        Ok(queue)
    }

    /// Attaches to an already-initialized region without modifying it.
    ///
    /// Validates that both indices stored in the header lie within the
    /// data region; a value greater than or equal to `D` is treated as
    /// corruption (valid indices occupy `[0, D)`, never `D` itself).
    /// Intended for attaching to an existing mapping (typically the
    /// consumer side).
    pub fn restore(region: &mut [u8]) -> Result<Self, QueueError> {
        Self::restore_impl(region, None)
    }

    /// Like [`Self::restore`], with [`Metrics`] instrumentation enabled.
    pub fn restore_with_metrics(region: &mut [u8]) -> Result<Self, QueueError> {
        Self::restore_impl(region, Some(Metrics::new()))
    }

    fn restore_impl(region: &mut [u8], metrics: Option<Metrics>) -> Result<Self, QueueError> {
        Self::check_region_len(region.len())?;
        let queue = Self::from_region(region, metrics);
        let d = queue.data_len();

        let r = queue.load_read_index(Ordering::Relaxed);
        if r as usize >= d {
            return Err(QueueError::CorruptIndex { index: r, data_len: d });
        }
        let w = queue.load_write_index(Ordering::Relaxed);
        if w as usize >= d {
            return Err(QueueError::CorruptIndex { index: w, data_len: d });
        }

        Ok(queue)
    }

    fn check_region_len(len: usize) -> Result<(), QueueError> {
        if len < MIN_REGION_SIZE {
            return Err(QueueError::RegionTooSmall {
                actual: len,
                required: MIN_REGION_SIZE,
            });
        }
        Ok(())
    }

    fn from_region(region: &mut [u8], metrics: Option<Metrics>) -> Self {
        debug_assert_eq!(
            region.as_ptr() as usize % 8,
            0,
            "region must be 8-byte aligned for atomic index access"
        );
        // SAFETY: `region` is a live, non-empty slice, so its pointer is non-null.
        let ptr = unsafe { NonNull::new_unchecked(region.as_mut_ptr()) };
        Self {
            ptr,
            len: region.len(),
            metrics,
        }
    }

    // -------------------------------------------------------------------
    // CONSTANTS & STATUS
    // -------------------------------------------------------------------

    /// Returns the maximum payload length this (or any) queue accepts.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        MAX_MSG
    }

    /// Returns the length, in bytes, of the region this queue was
    /// constructed over.
    #[inline]
    #[must_use]
    pub const fn region_len(&self) -> usize {
        self.len
    }

    #[inline]
    fn data_len(&self) -> usize {
        layout::data_len(self.len)
    }

    /// Returns `true` iff `read_index == write_index`.
    ///
    /// Reads its own side's index with `Relaxed` ordering and the peer's
    /// with `Acquire`; intended to be called from the consumer side (the
    /// side that does not own `read_index`'s writes but does own its reads).
    #[inline]
    #[must_use]
    pub fn empty(&self) -> bool {
        let r = self.load_read_index(Ordering::Relaxed);
        let w = self.load_write_index(Ordering::Acquire);
        let result = r == w;
        debug_assert_empty_iff_equal!(result, r, w);
        result
    }

    /// Returns the maximum payload length a producer may enqueue right now.
    ///
    /// This is the free byte count minus the reserved `PREFIX + EXTRA`
    /// bytes; if the reserve exceeds the raw free count (which cannot
    /// happen under the invariants, but is computed defensively) this
    /// returns `0` rather than underflowing.
    #[inline]
    #[must_use]
    pub fn space_left(&self) -> usize {
        let w = self.load_write_index(Ordering::Relaxed) as usize;
        let r = self.load_read_index(Ordering::Acquire) as usize;
        Self::raw_free(w, r, self.data_len()).saturating_sub(PREFIX + EXTRA)
    }

    /// Returns the aggregated instrumentation if metrics were enabled at
    /// construction, or a zeroed snapshot otherwise.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics
            .as_ref()
            .map_or_else(MetricsSnapshot::default, Metrics::snapshot)
    }

    /// Raw free bytes before the `PREFIX + EXTRA` reserve is subtracted.
    ///
    /// Derived from first principles: `w ∈ [0, D)`, `r ∈ [0, D)`. When
    /// `w < r` the producer is behind the consumer in data-region
    /// coordinates and the free run is the gap between them. Otherwise
    /// (including `w == r`, the empty case) the free run wraps through the
    /// end of the data region and back to `r`, which correctly evaluates
    /// to `D` when the ring is empty.
    #[inline]
    fn raw_free(w: usize, r: usize, d: usize) -> usize {
        if w < r {
            r - w
        } else {
            d - w + r
        }
    }

    // -------------------------------------------------------------------
    // PRODUCER API
    // -------------------------------------------------------------------

    /// Enqueues `payload`, framed as a 4-byte little-endian length prefix
    /// followed by the payload bytes, each wrapped at the data-region
    /// boundary as needed.
    ///
    /// Fails without modifying the queue's state if the payload is empty,
    /// exceeds [`Self::capacity`], or exceeds [`Self::space_left`].
    pub fn enqueue(&self, payload: &[u8]) -> Result<(), QueueError> {
        if payload.is_empty() {
            return Err(QueueError::EmptyPayload);
        }
        if payload.len() > MAX_MSG {
            return Err(QueueError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_MSG,
            });
        }

        let d = self.data_len();
        let w = self.load_write_index(Ordering::Relaxed) as usize;
        let r = self.load_read_index(Ordering::Acquire) as usize;
        let raw_free = Self::raw_free(w, r, d);
        let available = raw_free.saturating_sub(PREFIX + EXTRA);

        if payload.len() > available {
            return Err(QueueError::InsufficientSpace {
                needed: payload.len(),
                available,
            });
        }
        debug_assert_reserve_respected!(PREFIX + payload.len() + EXTRA, raw_free);

        let data = self.data_mut();
        let len_prefix = (payload.len() as u32).to_le_bytes();
        layout::write_wrapping(data, w, &len_prefix);
        let payload_start = layout::advance(w, PREFIX, d);
        layout::write_wrapping(data, payload_start, payload);

        let new_w = layout::advance(w, PREFIX + payload.len(), d);
        debug_assert_index_in_range!("write_index", new_w, d);
        self.store_write_index(new_w as u64, Ordering::Release);

        if let Some(metrics) = &self.metrics {
            metrics.add_enqueued(1);
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // CONSUMER API
    // -------------------------------------------------------------------

    /// Dequeues the next frame into `buf`, returning the payload length.
    ///
    /// Fails with [`QueueError::Empty`] if the ring is empty, and with
    /// [`QueueError::BufferTooSmall`] if `buf` is shorter than the pending
    /// frame's payload (leaving `read_index` unchanged), so the caller may
    /// retry with a larger buffer.
    pub fn dequeue_into(&self, buf: &mut [u8]) -> Result<usize, QueueError> {
        let (r, d, len) = self.decode_pending_frame()?;

        if len > buf.len() {
            return Err(QueueError::BufferTooSmall {
                buffer_len: buf.len(),
                frame_len: len,
            });
        }

        self.finish_dequeue(&mut buf[..len], r, d, len);
        Ok(len)
    }

    /// Dequeues the next frame as a freshly allocated `Vec<u8>`.
    ///
    /// Equivalent to [`Self::dequeue_into`] sized exactly to the frame's
    /// payload length.
    pub fn dequeue(&self) -> Result<Vec<u8>, QueueError> {
        let (r, d, len) = self.decode_pending_frame()?;
        let mut buf = vec![0u8; len];
        self.finish_dequeue(&mut buf, r, d, len);
        Ok(buf)
    }

    /// Decodes the pending frame's length-prefix without copying the
    /// payload or publishing `read_index`. Returns `(r, d, len)` so the
    /// caller can finish the dequeue with a single additional decode-free
    /// copy, shared by [`Self::dequeue_into`] and [`Self::dequeue`].
    fn decode_pending_frame(&self) -> Result<(usize, usize, usize), QueueError> {
        let d = self.data_len();
        let r = self.load_read_index(Ordering::Relaxed) as usize;
        let w = self.load_write_index(Ordering::Acquire) as usize;
        if r == w {
            return Err(QueueError::Empty);
        }

        let data = self.data();
        let mut len_prefix = [0u8; PREFIX];
        layout::read_wrapping(data, r, PREFIX, &mut len_prefix);
        let len = u32::from_le_bytes(len_prefix);

        if len == 0 || len as usize > MAX_MSG {
            if let Some(metrics) = &self.metrics {
                metrics.add_corrupt_frame();
            }
            return Err(QueueError::CorruptFrame(len));
        }
        debug_assert_frame_len!(len as usize, MAX_MSG);
        Ok((r, d, len as usize))
    }

    /// Copies the payload bytes out, publishes the new `read_index`, and
    /// bumps metrics. `buf` must be exactly `len` bytes.
    fn finish_dequeue(&self, buf: &mut [u8], r: usize, d: usize, len: usize) {
        let data = self.data();
        let payload_start = layout::advance(r, PREFIX, d);
        layout::read_wrapping(data, payload_start, len, buf);

        let new_r = layout::advance(r, PREFIX + len, d);
        debug_assert_index_in_range!("read_index", new_r, d);
        self.store_read_index(new_r as u64, Ordering::Release);

        if let Some(metrics) = &self.metrics {
            metrics.add_dequeued(1);
        }
    }

    // -------------------------------------------------------------------
    // RAW REGION ACCESS
    // -------------------------------------------------------------------

    #[inline]
    fn read_index_atomic(&self) -> &AtomicU64 {
        // SAFETY: `ptr` points at a region of at least `HEADER_SIZE` bytes,
        // 8-byte aligned (checked in `from_region`); bytes `0..8` are
        // reserved for `read_index` and touched only through this cast.
        unsafe { &*self.ptr.as_ptr().cast::<AtomicU64>() }
    }

    #[inline]
    fn write_index_atomic(&self) -> &AtomicU64 {
        // SAFETY: bytes `8..16` are reserved for `write_index`; `len >=
        // MIN_REGION_SIZE > 16` is guaranteed by construction.
        unsafe { &*self.ptr.as_ptr().add(8).cast::<AtomicU64>() }
    }

    #[inline]
    fn load_read_index(&self, order: Ordering) -> u64 {
        self.read_index_atomic().load(order)
    }

    #[inline]
    fn load_write_index(&self, order: Ordering) -> u64 {
        self.write_index_atomic().load(order)
    }

    #[inline]
    fn store_read_index(&self, value: u64, order: Ordering) {
        self.read_index_atomic().store(value, order);
    }

    #[inline]
    fn store_write_index(&self, value: u64, order: Ordering) {
        self.write_index_atomic().store(value, order);
    }

    #[inline]
    fn data(&self) -> &[u8] {
        // SAFETY: bytes `HEADER_SIZE..len` are the data region.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr().add(HEADER_SIZE), self.data_len()) }
    }

    /// Mutable view of the data region.
    ///
    /// # Safety (discipline, not enforced)
    ///
    /// Only sound because the caller upholds SPSC discipline: at any given
    /// instant the producer owns `[w, w + PREFIX + len)` (wrapped) while an
    /// enqueue is in flight, the consumer owns `[r, r + PREFIX + len)`
    /// while a dequeue is in flight, and the 5-byte reserve keeps those two
    /// intervals from ever overlapping.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn data_mut(&self) -> &mut [u8] {
        // SAFETY: see above; bytes `HEADER_SIZE..len` are the data region.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr().add(HEADER_SIZE), self.data_len()) }
    }
}

impl std::fmt::Debug for ShmQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmQueue")
            .field("region_len", &self.len)
            .field("read_index", &self.load_read_index(Ordering::Relaxed))
            .field("write_index", &self.load_write_index(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(size: usize) -> Vec<u8> {
        vec![0u8; size]
    }

    #[test]
    fn create_zeroes_indices_and_reports_free_space() {
        let mut mem = region(MIN_REGION_SIZE);
        let q = ShmQueue::create(&mut mem).unwrap();
        assert!(q.empty());
        assert_eq!(q.space_left(), MIN_REGION_SIZE - HEADER_SIZE - (PREFIX + EXTRA));
    }

    #[test]
    fn create_rejects_small_region() {
        let mut mem = region(MIN_REGION_SIZE - 1);
        let err = ShmQueue::create(&mut mem).unwrap_err();
        assert_eq!(
            err,
            QueueError::RegionTooSmall {
                actual: MIN_REGION_SIZE - 1,
                required: MIN_REGION_SIZE,
            }
        );
    }

    #[test]
    fn enqueue_dequeue_small_message_round_trips() {
        let mut mem = region(MIN_REGION_SIZE);
        let q = ShmQueue::create(&mut mem).unwrap();

        q.enqueue(&[0x41, 0x42, 0x43]).unwrap();
        assert!(!q.empty());

        let out = q.dequeue().unwrap();
        assert_eq!(out, vec![0x41, 0x42, 0x43]);
        assert!(q.empty());
    }

    #[test]
    fn dequeue_on_empty_queue_errors() {
        let mut mem = region(MIN_REGION_SIZE);
        let q = ShmQueue::create(&mut mem).unwrap();
        assert_eq!(q.dequeue().unwrap_err(), QueueError::Empty);
        assert_eq!(q.dequeue_into(&mut [0u8; 4]).unwrap_err(), QueueError::Empty);
    }

    #[test]
    fn enqueue_rejects_empty_payload() {
        let mut mem = region(MIN_REGION_SIZE);
        let q = ShmQueue::create(&mut mem).unwrap();
        assert_eq!(q.enqueue(&[]).unwrap_err(), QueueError::EmptyPayload);
    }

    #[test]
    fn enqueue_rejects_oversized_payload() {
        let mut mem = region(MIN_REGION_SIZE);
        let q = ShmQueue::create(&mut mem).unwrap();
        let payload = vec![0u8; MAX_MSG + 1];
        assert_eq!(
            q.enqueue(&payload).unwrap_err(),
            QueueError::PayloadTooLarge {
                len: MAX_MSG + 1,
                max: MAX_MSG,
            }
        );
    }

    #[test]
    fn max_size_message_needs_five_extra_bytes_of_region() {
        let mut mem = region(MIN_REGION_SIZE);
        let q = ShmQueue::create(&mut mem).unwrap();
        let payload = vec![0xAB; MAX_MSG];

        let err = q.enqueue(&payload).unwrap_err();
        assert!(matches!(err, QueueError::InsufficientSpace { .. }));

        let mut mem = region(MIN_REGION_SIZE + PREFIX + EXTRA);
        let q = ShmQueue::create(&mut mem).unwrap();
        q.enqueue(&payload).unwrap();
        assert_eq!(q.dequeue().unwrap(), payload);
    }

    #[test]
    fn buffer_too_small_does_not_advance_read_index() {
        let mut mem = region(MIN_REGION_SIZE);
        let q = ShmQueue::create(&mut mem).unwrap();
        let payload = vec![7u8; 100];
        q.enqueue(&payload).unwrap();

        let mut small = [0u8; 50];
        let err = q.dequeue_into(&mut small).unwrap_err();
        assert_eq!(
            err,
            QueueError::BufferTooSmall {
                buffer_len: 50,
                frame_len: 100,
            }
        );
        assert!(!q.empty());

        let mut big = [0u8; 100];
        let n = q.dequeue_into(&mut big).unwrap();
        assert_eq!(n, 100);
        assert_eq!(&big[..], &payload[..]);
    }

    #[test]
    fn restore_sees_previously_enqueued_payload() {
        let mut mem = region(MIN_REGION_SIZE);
        {
            let producer = ShmQueue::create(&mut mem).unwrap();
            producer.enqueue(b"hello").unwrap();
        }

        // SAFETY: `producer` above has been dropped; it held no lifetime on
        // `mem`'s borrow beyond the call that constructed it, and no alias
        // exists at this point. This mirrors two OS processes independently
        // mapping the same backing file.
        let consumer = ShmQueue::restore(&mut mem).unwrap();
        assert!(!consumer.empty());
        assert_eq!(consumer.dequeue().unwrap(), b"hello");
    }

    #[test]
    fn restore_rejects_corrupt_indices() {
        let mut mem = region(MIN_REGION_SIZE);
        let d = layout::data_len(mem.len());
        mem[0..8].copy_from_slice(&((d as u64) + 1).to_le_bytes());

        let err = ShmQueue::restore(&mut mem).unwrap_err();
        assert_eq!(
            err,
            QueueError::CorruptIndex {
                index: d as u64 + 1,
                data_len: d,
            }
        );
    }

    #[test]
    fn restore_rejects_index_equal_to_data_len() {
        // Valid indices occupy [0, D); D itself is out of range, not just D+1.
        let mut mem = region(MIN_REGION_SIZE);
        let d = layout::data_len(mem.len());
        mem[8..16].copy_from_slice(&(d as u64).to_le_bytes());

        let err = ShmQueue::restore(&mut mem).unwrap_err();
        assert_eq!(
            err,
            QueueError::CorruptIndex {
                index: d as u64,
                data_len: d,
            }
        );
    }

    #[test]
    fn corrupt_frame_length_surfaces_as_error_not_panic() {
        let mut mem = region(MIN_REGION_SIZE);
        let q = ShmQueue::create(&mut mem).unwrap();
        // Hand-craft a frame whose length prefix is 0 (disallowed).
        mem[HEADER_SIZE..HEADER_SIZE + PREFIX].copy_from_slice(&0u32.to_le_bytes());
        mem[8..16].copy_from_slice(&(PREFIX as u64).to_le_bytes());

        let q = ShmQueue::restore(&mut mem).unwrap();
        assert_eq!(q.dequeue().unwrap_err(), QueueError::CorruptFrame(0));
    }

    #[test]
    fn wrap_of_length_field_round_trips() {
        let d = MIN_REGION_SIZE - HEADER_SIZE;
        let mut mem = region(MIN_REGION_SIZE);
        let q = ShmQueue::create(&mut mem).unwrap();

        // Push write_index to within 2 bytes of the data-region end so the
        // next frame's 4-byte length prefix straddles the wrap boundary.
        let filler = d - 2 - PREFIX - EXTRA;
        q.enqueue(&vec![0u8; filler]).unwrap();
        assert_eq!(q.dequeue().unwrap().len(), filler);
        q.enqueue(&vec![0u8; d - PREFIX - EXTRA - 1]).unwrap();
        let _ = q.dequeue().unwrap();

        // Now drive both indices to d - 2 deterministically via direct
        // writes, so the ring is empty right at the boundary rather than
        // nearly full.
        let mut mem2 = region(MIN_REGION_SIZE);
        let q2 = ShmQueue::create(&mut mem2).unwrap();
        mem2[0..8].copy_from_slice(&((d - 2) as u64).to_le_bytes());
        mem2[8..16].copy_from_slice(&((d - 2) as u64).to_le_bytes());
        let q2 = ShmQueue::restore(&mut mem2).unwrap();
        q2.enqueue(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(q2.dequeue().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn wrap_of_payload_round_trips() {
        // Drive write_index close enough to the data-region end that the
        // length field fits before the boundary but the payload itself
        // straddles it.
        let d = MIN_REGION_SIZE - HEADER_SIZE;
        let mut mem = region(MIN_REGION_SIZE);
        let boundary = (d - PREFIX - 6) as u64;
        mem[0..8].copy_from_slice(&boundary.to_le_bytes());
        mem[8..16].copy_from_slice(&boundary.to_le_bytes());
        let q = ShmQueue::restore(&mut mem).unwrap();

        let payload: Vec<u8> = (0..20u8).collect();
        q.enqueue(&payload).unwrap();
        assert_eq!(q.dequeue().unwrap(), payload);
    }
}
