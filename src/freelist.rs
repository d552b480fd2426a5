//! Defines the [`Freelist`] struct: the address-ordered list of free blocks.

use core::marker::PhantomData;
use core::ptr::{null_mut, NonNull};

use tracing::error;

use super::header::Header;

/// A singly linked list of the currently free blocks, threaded through their
/// headers and kept strictly sorted by block address.
///
/// The address ordering is what makes coalescing's neighbor lookup work; every
/// mutator here preserves it by construction.
#[derive(Debug)]
#[repr(C)]
pub(crate) struct Freelist {
    head: *mut Header,
}

impl Freelist {
    /// Creates an empty Freelist.
    #[inline]
    pub const fn new() -> Self {
        Freelist { head: null_mut() }
    }

    /// Returns the first (lowest-address) free block, or `None` if the list
    /// is empty.
    #[inline]
    pub fn head(&self) -> Option<NonNull<Header>> {
        NonNull::new(self.head)
    }

    /// Splices `block` into the list at the position that keeps addresses
    /// strictly increasing. This operation has a time complexity of *O*(n).
    ///
    /// # Safety
    /// `block` must point to an initialized free block that is not already in
    /// the list and does not overlap any listed block.
    pub unsafe fn insert_ordered(&mut self, block: *mut Header) {
        debug_assert!(!block.is_null());
        debug_assert!(!(*block).is_allocated(), "listed blocks should be free.");
        debug_assert_ne!(block, self.head, "block is already listed.");

        if self.head.is_null() || block < self.head {
            (*block).next_free = self.head;
            self.head = block;
            return;
        }

        let mut prev = self.head;
        while !(*prev).next_free.is_null() && (*prev).next_free < block {
            prev = (*prev).next_free;
        }
        debug_assert_ne!((*prev).next_free, block, "block is already listed.");

        (*block).next_free = (*prev).next_free;
        (*prev).next_free = block;
    }

    /// Unlinks `block` from the list, updating the head if `block` was first.
    /// This operation has a time complexity of *O*(n).
    ///
    /// Asking to remove a block that is not listed is an internal consistency
    /// failure in the calling engine; it is reported and the list is left
    /// untouched.
    ///
    /// # Safety
    /// `block` must point to an initialized header.
    pub unsafe fn remove(&mut self, block: *mut Header) {
        if self.head == block {
            self.head = (*block).next_free;
            return;
        }

        let mut prev = self.head;
        while !prev.is_null() && (*prev).next_free != block {
            prev = (*prev).next_free;
        }
        match prev.is_null() {
            true => {
                error!(?block, "Block to remove is not on the freelist.");
                debug_assert!(false, "block should be on the freelist.");
            }
            false => (*prev).next_free = (*block).next_free,
        }
    }

    /// Iterates over the listed blocks in address order.
    ///
    /// # Safety
    /// Every link in the list must point to an initialized free block, and
    /// the list must not be mutated while the iterator is live.
    pub unsafe fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head,
            _list: PhantomData,
        }
    }
}

pub(crate) struct Iter<'a> {
    next: *mut Header,
    _list: PhantomData<&'a Freelist>,
}

impl Iterator for Iter<'_> {
    type Item = NonNull<Header>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = NonNull::new(self.next)?;
        self.next = unsafe { (*current.as_ptr()).next_free };
        Some(current)
    }
}
