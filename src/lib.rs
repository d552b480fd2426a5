//! A single-threaded user-space memory allocator with an address-ordered
//! freelist and eager coalescing.
//!
//! # Usage
//! ```no_run
//! use umalloc::growers::BrkGrower;
//! use umalloc::UMalloc;
//!
//! let mut heap = unsafe { UMalloc::with_grower(BrkGrower::new(0)) };
//! heap.init().expect("initial heap growth failed");
//!
//! let p = heap.allocate(100).expect("out of memory");
//! unsafe { heap.deallocate(p) };
//! assert_eq!(heap.check_heap(), Ok(()));
//! ```
//!
//! # Mode of operation
//! The heap is a single contiguous region divided into blocks, each a
//! [header](#headers) followed by its payload. The allocator keeps every
//! free block on a singly linked [freelist](#freelist) sorted by address:
//! - `allocate` walks the freelist in address order and takes the first
//!   block big enough (first fit, never best fit). A block with enough
//!   excess is split, the remainder staying free at its shifted address.
//! - When no block fits, the allocator asks its [grower](#growers) to commit
//!   one more growth unit and folds it in as a single free block.
//! - `deallocate` marks the block free and eagerly merges it with any free
//!   physical neighbor before reinserting it, so no two adjacent blocks are
//!   ever left both free.
//!
//! `check_heap` validates the whole structure (flags, freelist/heap
//! agreement, range disjointness) and is meant for tests and diagnostics,
//! not the allocation path.
//!
//! ## Headers
//! Each block starts with a [`HEADER_SIZE`]-byte header holding the payload
//! size with the allocation flag packed into its low bit, plus the free link
//! used while the block is on the freelist.
//!
//! ## Freelist
//! The freelist is embedded in the free blocks themselves and is kept
//! strictly sorted by block address. The ordering is load-bearing:
//! coalescing finds a block's physical predecessor by its freelist position.
//!
//! ## Growers
//! A grower is the external primitive that commits memory. [`UMalloc`] is
//! generic over [`Grower`](growers::Grower), so the same engine runs over
//! the process data segment ([`BrkGrower`](growers::BrkGrower)) or a fixed
//! caller-provided buffer ([`ArenaGrower`](growers::ArenaGrower)).
//!
//! # Scope
//! The allocator is single-threaded by design: no locking, no atomics. A
//! multi-threaded host must serialize all calls into one instance (or give
//! each thread its own instance over a disjoint region). The heap only ever
//! grows; memory is never returned to the operating system.

pub use crate::alloc::{InitError, UMalloc, GROWTH_UNIT};
pub use crate::check::HeapCheckError;
pub use crate::header::{ALIGNMENT, HEADER_SIZE};

mod alloc;
mod check;
mod freelist;
pub mod growers;
mod header;
mod util;
