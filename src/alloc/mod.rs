//! The allocator engine: first-fit search, splitting, eager coalescing and
//! heap growth over an address-ordered freelist.
//!
//! # Block discipline
//! The heap is one contiguous run of blocks from `heap_start` to `heap_end`.
//! Every block starts with a [`Header`]; stepping by header plus payload size
//! always lands on the next header or exactly on the heap end. Free blocks
//! are additionally threaded onto the [`Freelist`] in strictly increasing
//! address order, which is what lets [`deallocate`](UMalloc::deallocate) find
//! the physical predecessor of a block by scanning the list.

use crate::freelist::Freelist;
use crate::growers::Grower;
use crate::header::{Header, ALIGNMENT, HEADER_SIZE};
use crate::util::{align_up, raw_ptr};

use core::fmt::Debug;
use core::ptr::{null_mut, NonNull};

use static_assertions::const_assert;
use tracing::{debug, error, instrument, Level};

pub(crate) const PAGE_SIZE: usize = 4096;

/// Bytes committed per heap growth. Requests that cannot fit in one unit
/// grow by whole multiples of it.
pub const GROWTH_UNIT: usize = 16 * PAGE_SIZE;

/// Smallest payload a split may leave behind; excess below
/// [`MIN_BLOCK_SIZE`] stays attached to the allocation as internal
/// fragmentation.
pub(crate) const MIN_PAYLOAD_SIZE: usize = ALIGNMENT;
pub(crate) const MIN_BLOCK_SIZE: usize = HEADER_SIZE + MIN_PAYLOAD_SIZE;

const_assert!(GROWTH_UNIT % ALIGNMENT == 0);
const_assert!(GROWTH_UNIT >= HEADER_SIZE + MIN_BLOCK_SIZE);

/// Error returned by [`UMalloc::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// `init` was called more than once.
    AlreadyInitialized,
    /// The growth primitive could not commit the initial unit.
    GrowthFailed,
}

/// A single-threaded allocator over a growable contiguous heap.
///
/// The allocator owns the freelist head and the heap boundaries; multiple
/// independent instances can coexist as long as each grower manages a
/// disjoint region. All calls must be externally serialized if the instance
/// is ever shared across threads; nothing here locks.
#[repr(C)]
pub struct UMalloc<G: Grower> {
    pub(crate) freelist: Freelist,
    pub(crate) heap_start: *mut u8,
    pub(crate) heap_end: *mut u8,
    grower: G,
}

impl<G: Grower> Debug for UMalloc<G> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UMalloc")
            .field("heap_start", &self.heap_start)
            .field("heap_end", &self.heap_end)
            .finish()
    }
}

impl<G: Grower> UMalloc<G> {
    /// Creates an allocator instance with the specified grower. Call
    /// [`init`](UMalloc::init) before allocating.
    ///
    /// # Safety
    /// Callers must make sure that the provided grower will be the only
    /// object managing its underlying buffer for the lifetime of the
    /// returned allocator.
    pub const unsafe fn with_grower(grower: G) -> Self {
        UMalloc {
            freelist: Freelist::new(),
            heap_start: null_mut(),
            heap_end: null_mut(),
            grower,
        }
    }

    /// Establishes the initial heap region as a single free block of one
    /// growth unit. Must be called exactly once, before any allocation.
    #[instrument(level = "info", ret(level = Level::INFO), err(Debug, level = Level::ERROR))]
    pub fn init(&mut self) -> Result<(), InitError> {
        if !self.heap_start.is_null() {
            return Err(InitError::AlreadyInitialized);
        }
        unsafe {
            self.grow_heap(GROWTH_UNIT - HEADER_SIZE)
                .map_err(|()| InitError::GrowthFailed)?;
        }
        Ok(())
    }

    /// Allocates `size` bytes and returns the payload address.
    ///
    /// Returns `None` for an empty request (`size == 0`, benign, no side
    /// effects) or when the heap cannot grow any further; in the latter case
    /// the heap is left valid and consistent.
    #[instrument(level = "info", ret(level = Level::INFO))]
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        debug_assert!(!self.heap_start.is_null(), "init() should be called first.");
        if size == 0 {
            debug!("Empty request.");
            return None;
        }
        let needed = align_up(size, ALIGNMENT)?;

        let block = match self.find_fit(needed) {
            Some(block) => {
                debug!(?block, needed, "Found free block to accomodate request.");
                block.as_ptr()
            }
            None => {
                debug!(needed, "No free block fits, requesting heap growth.");
                match unsafe { self.grow_heap(needed) } {
                    Ok(block) => block.as_ptr(),
                    Err(()) => {
                        error!("Heap growth failed, allocation fails.");
                        return None;
                    }
                }
            }
        };

        unsafe {
            self.place(block, needed);
            Some(NonNull::new_unchecked(Header::payload(block)))
        }
    }

    /// Frees the allocation at `payload`, merging it with any free physical
    /// neighbor before reinserting it into the freelist in address order.
    ///
    /// # Safety
    /// `payload` must be an address previously returned by
    /// [`allocate`](UMalloc::allocate) on this allocator and not freed since.
    /// Foreign, stale or doubly freed addresses are undefined behavior,
    /// caught only by debug assertions here and by
    /// [`check_heap`](UMalloc::check_heap) after the fact.
    #[instrument(level = "info")]
    pub unsafe fn deallocate(&mut self, payload: NonNull<u8>) {
        let block = Header::from_payload(payload.as_ptr());

        debug_assert_eq!(
            payload.as_ptr() as usize % ALIGNMENT,
            0,
            "All payloads should have ALIGNMENT."
        );
        debug_assert!(
            (*block).is_allocated(),
            "Block should be allocated; double free or foreign pointer."
        );

        (*block).mark_free();
        let merged = self.coalesce(block);
        self.freelist.insert_ordered(merged);
    }

    /// Returns the committed heap as a `(start, end)` address pair, or
    /// `None` before [`init`](UMalloc::init).
    #[inline]
    pub fn heap_range(&self) -> Option<(NonNull<u8>, NonNull<u8>)> {
        Some((NonNull::new(self.heap_start)?, NonNull::new(self.heap_end)?))
    }

    /// Returns the first freelisted block whose payload can hold `needed`
    /// bytes, scanning in address order (first fit).
    fn find_fit(&self, needed: usize) -> Option<NonNull<Header>> {
        unsafe { self.freelist.iter().find(|b| (*b.as_ptr()).size() >= needed) }
    }

    /// Carves an allocated block of `needed` bytes out of the free block at
    /// `block`. Excess large enough for a [`MIN_BLOCK_SIZE`] block is split
    /// off as a new free block at its shifted address; smaller excess stays
    /// attached to the allocation.
    ///
    /// # Safety
    /// `block` must be on the freelist, and `needed` must be a multiple of
    /// [`ALIGNMENT`] no larger than the block's payload size.
    #[instrument(level = "debug")]
    unsafe fn place(&mut self, block: *mut Header, needed: usize) {
        let size = (*block).size();
        debug_assert_eq!(needed % ALIGNMENT, 0);
        debug_assert!(needed <= size);

        self.freelist.remove(block);

        if size - needed >= MIN_BLOCK_SIZE {
            Header::init(block, needed, true);
            let remainder = Header::next_physical(block);
            Header::init(remainder, size - needed - HEADER_SIZE, false);
            self.freelist.insert_ordered(remainder);
            debug!(
                ?remainder,
                remainder_size = size - needed - HEADER_SIZE,
                "Split block, reinserted remainder."
            );
        } else {
            (*block).mark_allocated();
            debug!(excess = size - needed, "Taking block whole.");
        }
    }

    /// Merges the freshly freed block at `block` with its free physical
    /// neighbors and returns the surviving (lowest-address) block. Merged
    /// neighbors are removed from the freelist; `block` itself must not be
    /// on it yet.
    ///
    /// The physical successor comes from block arithmetic; the physical
    /// predecessor is the address-greatest freelisted block below `block`,
    /// which is adjacent iff stepping from it lands exactly on `block`.
    ///
    /// # Safety
    /// `block` must point to an initialized block inside the heap, marked
    /// free and not yet listed.
    #[instrument(level = "debug", ret(level = Level::DEBUG))]
    unsafe fn coalesce(&mut self, block: *mut Header) -> *mut Header {
        debug_assert!(!(*block).is_allocated());

        let next = Header::next_physical(block);
        if next.cast::<u8>() < self.heap_end && !(*next).is_allocated() {
            self.freelist.remove(next);
            Header::init(block, (*block).size() + HEADER_SIZE + (*next).size(), false);
            debug!(?next, "Merged with next physical block.");
        }

        let mut prev: *mut Header = null_mut();
        let mut p = raw_ptr(self.freelist.head());
        while !p.is_null() && p < block {
            prev = p;
            p = (*p).next_free;
        }
        if !prev.is_null() && Header::next_physical(prev) == block {
            self.freelist.remove(prev);
            Header::init(prev, (*prev).size() + HEADER_SIZE + (*block).size(), false);
            debug!(?prev, "Merged with previous physical block.");
            return prev;
        }

        block
    }

    /// Commits at least one growth unit (whole multiples for oversized
    /// requests) and folds it into the heap as one new free block with a
    /// payload of at least `min_payload` bytes, inserted in address order.
    /// On failure no state is modified.
    ///
    /// # Safety
    /// Callers must uphold the grower contract: the grown region follows the
    /// current heap end contiguously.
    #[instrument(level = "debug", ret(level = Level::DEBUG), err(Debug, level = Level::ERROR))]
    unsafe fn grow_heap(&mut self, min_payload: usize) -> Result<NonNull<Header>, ()> {
        let min_bytes = min_payload.checked_add(HEADER_SIZE).ok_or(())?;
        let request = align_up(min_bytes, GROWTH_UNIT).ok_or(())?;

        let (start, grown) = self.grower.grow(request)?;
        let start = start.as_ptr();
        debug_assert_eq!(start as usize % ALIGNMENT, 0);
        debug_assert_eq!(grown % ALIGNMENT, 0);
        debug_assert!(grown >= request);
        debug_assert!(
            self.heap_end.is_null() || start == self.heap_end,
            "Growths should be contiguous."
        );

        if self.heap_start.is_null() {
            self.heap_start = start;
        }
        self.heap_end = start.add(grown);

        let block: *mut Header = start.cast();
        Header::init(block, grown - HEADER_SIZE, false);
        self.freelist.insert_ordered(block);
        debug!(?block, payload = grown - HEADER_SIZE, "Grew heap by one region.");

        Ok(NonNull::new_unchecked(block))
    }
}

impl<G: Grower> PartialEq for UMalloc<G> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self, other)
    }
}

impl<G: Grower> Eq for UMalloc<G> {}

#[cfg(test)]
mod tests;
