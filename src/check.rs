//! Heap consistency checking, for tests and diagnostics.
//!
//! Never called from the allocation hot path; `allocate`/`deallocate` trust
//! their bookkeeping and this pass is how disagreements get surfaced after
//! the fact.

use crate::alloc::UMalloc;
use crate::growers::Grower;
use crate::header::Header;

use core::ptr::null_mut;

/// A structural invariant violation, one variant per violation class.
/// [`UMalloc::check_heap`] reports the first one found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapCheckError {
    /// A freelisted block has its allocation flag set.
    AllocatedInFreeList,
    /// Freelist addresses are not strictly increasing.
    UnorderedFreeList,
    /// Two freelisted blocks occupy overlapping byte ranges.
    FreeBlocksOverlap,
    /// A block with a clear allocation flag is not on the freelist.
    UnlistedFreeBlock,
    /// A freelisted block's range overlaps an allocated block's range.
    FreeAllocatedOverlap,
    /// Walking the heap block-by-block does not land exactly on the heap
    /// end; some header's size is corrupt.
    HeapWalkMismatch,
}

impl<G: Grower> UMalloc<G> {
    /// Validates the global heap invariants. Read-only.
    ///
    /// Walks the freelist checking flags, strict address order and pairwise
    /// range disjointness, then walks the physical heap checking that free
    /// blocks and freelist membership agree and that no free range overlaps
    /// an allocated one. Overlap is genuine `[start, end)` interval
    /// comparison over `address + header + size` ranges.
    ///
    /// Before [`init`](UMalloc::init) the heap is trivially consistent.
    pub fn check_heap(&self) -> Result<(), HeapCheckError> {
        if self.heap_start.is_null() {
            return Ok(());
        }

        unsafe {
            // Freelist pass. Strict ordering makes adjacent-pair range
            // checks sufficient for pairwise disjointness.
            let mut prev: *mut Header = null_mut();
            for block in self.freelist.iter() {
                let block = block.as_ptr();
                if (*block).is_allocated() {
                    return Err(HeapCheckError::AllocatedInFreeList);
                }
                if !prev.is_null() {
                    if block <= prev {
                        return Err(HeapCheckError::UnorderedFreeList);
                    }
                    if Header::next_physical(prev) > block {
                        return Err(HeapCheckError::FreeBlocksOverlap);
                    }
                }
                prev = block;
            }

            // Physical pass, from heap start to heap end.
            let mut block: *mut Header = self.heap_start.cast();
            while block.cast::<u8>() != self.heap_end {
                if block.cast::<u8>() > self.heap_end {
                    return Err(HeapCheckError::HeapWalkMismatch);
                }
                let start = block.cast::<u8>();
                let end = Header::next_physical(block).cast::<u8>();

                if (*block).is_allocated() {
                    for free in self.freelist.iter() {
                        let free_start = free.as_ptr().cast::<u8>();
                        let free_end = Header::next_physical(free.as_ptr()).cast::<u8>();
                        if free_start < end && start < free_end {
                            return Err(HeapCheckError::FreeAllocatedOverlap);
                        }
                    }
                } else if !self.freelist.iter().any(|f| f.as_ptr() == block) {
                    return Err(HeapCheckError::UnlistedFreeBlock);
                }

                block = end.cast();
            }
        }

        Ok(())
    }
}
