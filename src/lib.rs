//! shmring - a lock-free SPSC framed byte queue over shared memory
//!
//! A single producer and a single consumer exchange variable-length
//! messages through a fixed-size byte region they both have access to,
//! typically a memory-mapped file, but any `&mut [u8]` the caller can
//! guarantee outlives the queue will do. The region's layout is a stable
//! on-disk/on-wire contract: a 16-byte header holding `read_index` and
//! `write_index`, followed by the data region itself.
//!
//! # Example
//!
//! ```
//! use shmring_rs::ShmQueue;
//!
//! let mut region = vec![0u8; shmring_rs::MIN_REGION_SIZE];
//! let queue = ShmQueue::create(&mut region).unwrap();
//!
//! queue.enqueue(b"hello").unwrap();
//! assert_eq!(queue.dequeue().unwrap(), b"hello");
//! ```
//!
//! For two independent handles sharing a region through an actual file, see
//! [`MappedQueue`].

mod backoff;
mod error;
mod invariants;
mod layout;
mod mapping;
mod metrics;
mod ring;

pub use backoff::Backoff;
pub use error::QueueError;
pub use layout::{HEADER_SIZE, MAX_MSG, MIN_REGION_SIZE};
pub use mapping::{MappedQueue, MappingError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use ring::ShmQueue;
