//! Defines the [`Header`] struct and associated constants and functions.

use core::mem::size_of;
use core::ptr::null_mut;

use static_assertions::const_assert;

/// Alignment of block addresses and payload sizes, in bytes.
pub const ALIGNMENT: usize = 16;

/// Size of the metadata prefix of every block.
pub const HEADER_SIZE: usize = size_of::<Header>();

// Packing the allocation flag into the size word requires sizes to be even,
// and stepping block-to-block requires headers to preserve payload alignment.
const_assert!(ALIGNMENT.is_power_of_two());
const_assert!(ALIGNMENT >= 2);
const_assert!(HEADER_SIZE % ALIGNMENT == 0);

/// The metadata prefix of a block.
///
/// Stores the payload size in bytes and the allocation flag, plus the link to
/// the next free block in address order.
///
/// # Tagging
/// The allocation flag lives in the least significant bit of the size word.
/// This is safe because payload sizes are always multiples of [`ALIGNMENT`],
/// which leaves the low bits of the size word unused. [`size()`] masks the
/// flag back off.
///
/// `next_free` is only meaningful while the block is free; for an allocated
/// block its bytes are dead storage (they are *not* part of the payload,
/// which starts [`HEADER_SIZE`] bytes past the block address).
///
/// [`size()`]: Header::size
#[derive(Debug)]
#[repr(C)]
pub struct Header {
    size_alloc: usize,
    pub(crate) next_free: *mut Header,
}

impl Header {
    /// Writes a fresh header at `block` with the given payload size and
    /// allocation flag, and resets the free link.
    ///
    /// # Safety
    /// `block` must be valid for writes of [`HEADER_SIZE`] bytes and
    /// [`ALIGNMENT`]-aligned. `size` must be a multiple of [`ALIGNMENT`];
    /// this is checked with a debug assertion only.
    #[inline]
    pub unsafe fn init(block: *mut Header, size: usize, allocated: bool) {
        debug_assert_eq!(block as usize % ALIGNMENT, 0);
        debug_assert_eq!(size % ALIGNMENT, 0, "payload size should be aligned.");
        block.write(Header {
            size_alloc: size | allocated as usize,
            next_free: null_mut(),
        });
    }

    /// Returns whether the block is marked allocated.
    #[inline(always)]
    pub fn is_allocated(&self) -> bool {
        self.size_alloc & 1 != 0
    }

    /// Sets the allocation flag, leaving the size untouched.
    #[inline(always)]
    pub fn mark_allocated(&mut self) {
        self.size_alloc |= 1;
    }

    /// Clears the allocation flag, leaving the size untouched.
    #[inline(always)]
    pub fn mark_free(&mut self) {
        self.size_alloc &= !1;
    }

    /// Returns the payload size of the block, with the flag bit masked off.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size_alloc & !(ALIGNMENT - 1)
    }

    /// Returns the payload address of the block at `block`.
    ///
    /// # Safety
    /// `block` must point to an initialized header inside the heap.
    #[inline(always)]
    pub unsafe fn payload(block: *mut Header) -> *mut u8 {
        block.cast::<u8>().add(HEADER_SIZE)
    }

    /// Recovers the block address from a payload address. Inverse of
    /// [`payload`](Header::payload).
    ///
    /// # Safety
    /// `payload` must be an address previously produced by
    /// [`payload`](Header::payload).
    #[inline(always)]
    pub unsafe fn from_payload(payload: *mut u8) -> *mut Header {
        payload.sub(HEADER_SIZE).cast()
    }

    /// Returns the address of the block physically following `block`.
    ///
    /// # Safety
    /// `block` must point to an initialized header. The result is one past
    /// the block's last byte; callers must check it against the heap end
    /// before dereferencing.
    #[inline(always)]
    pub unsafe fn next_physical(block: *mut Header) -> *mut Header {
        block.cast::<u8>().add(HEADER_SIZE + (*block).size()).cast()
    }
}
