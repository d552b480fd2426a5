//! [`Grower`] trait and structures that implement it.
//!
//! A grower is the external primitive that commits additional contiguous
//! memory to the heap. The allocator in [`crate::alloc`] is generic over its
//! grower, so the same engine runs over the process data segment
//! ([`BrkGrower`]) or a caller-provided buffer ([`ArenaGrower`]).

use super::header::ALIGNMENT;
use super::util::{checked_add, find_aligned};

use core::ptr::NonNull;

use libc::{brk, sbrk};

/// A trait for types that act as if they were a contiguous growable buffer.
///
/// # Safety
/// * copying, cloning, or moving the grower must not invalidate any pointers
///   to the buffer managed by the grower. This generally means that growers
///   should not own but reference their underlying buffers.
/// * successive successful growths must return physically contiguous regions:
///   each growth starts exactly where the previous one ended.
pub unsafe trait Grower {
    /// Grows the underlying buffer with at least `size` bytes.
    /// Returns the old end of the buffer and the size of the growth
    /// or `Err(())` if the growth failed. On failure the buffer is left
    /// unchanged.
    ///
    /// # Safety
    /// Implementors should ensure that `grow(0)` does not grow the buffer and
    /// that the returned region start is [`ALIGNMENT`]-aligned.
    unsafe fn grow(&mut self, size: usize) -> Result<(NonNull<u8>, usize), ()>;
}

/// A grower that internally uses [`libc::brk`] to operate
/// on the end of the process's data segment.
#[derive(Debug)]
pub struct BrkGrower {
    heap_end: Option<NonNull<u8>>,
    min_increment: usize,
}

impl BrkGrower {
    /// Creates a grower whose growths are at least `min_increment` bytes.
    /// `min_increment` must be a multiple of [`ALIGNMENT`].
    #[inline(always)]
    pub const fn new(min_increment: usize) -> Self {
        debug_assert!(min_increment % ALIGNMENT == 0);
        BrkGrower { heap_end: None, min_increment }
    }

    /// Tries to initialize the grower by calling `sbrk(0)` to get the initial
    /// heap end, rounded up to [`ALIGNMENT`].
    /// Returns `Err(())` if the grower could not be initialized.
    ///
    /// # Safety
    /// This function is unsafe since it assumes that the grower
    /// wasn't previously initialized and that there aren't any other
    /// objects (growers or not) managing the program brake.
    unsafe fn try_init(&mut self) -> Result<(), ()> {
        debug_assert!(self.heap_end.is_none());
        let heap_end = unsafe { sbrk(0) };
        debug_assert_ne!(heap_end as isize, -1, "Calling sbrk(0) should never fail.");
        debug_assert_ne!(heap_end as usize, 0);
        unsafe {
            self.heap_end = Some(NonNull::new_unchecked(
                find_aligned(heap_end.cast(), ALIGNMENT).ok_or(())? as *mut u8,
            ))
        };
        Ok(())
    }
}

unsafe impl Grower for BrkGrower {
    unsafe fn grow(&mut self, size: usize) -> Result<(NonNull<u8>, usize), ()> {
        if self.heap_end.is_none() {
            unsafe { self.try_init()? };
        }
        let heap_end = self.heap_end.unwrap();
        if size == 0 {
            return Ok((heap_end, 0));
        }
        debug_assert_eq!(size % ALIGNMENT, 0);
        let size = size.max(self.min_increment);
        let new_heap_end: *mut u8 = checked_add(heap_end.as_ptr(), size).ok_or(())? as _;
        if unsafe { brk(new_heap_end.cast()) == -1 } {
            return Err(());
        }
        self.heap_end = unsafe { Some(NonNull::new_unchecked(new_heap_end)) };
        Ok((heap_end, size))
    }
}

/// A grower that hands out slices of a fixed caller-provided buffer, failing
/// once the buffer is exhausted. Useful for tests and for embedding the
/// allocator over preallocated memory.
///
/// The buffer start is rounded up to [`ALIGNMENT`]; the capacity shrinks
/// accordingly.
#[derive(Debug)]
pub struct ArenaGrower {
    heap_end: *mut u8,
    arena_end: *mut u8,
    min_increment: usize,
}

impl ArenaGrower {
    /// Creates a new arena that operates on the provided buffer.
    /// `min_increment` must be a multiple of [`ALIGNMENT`].
    ///
    /// # Safety
    /// `buf` must be valid for reads and writes of `size` bytes for the
    /// lifetime of the arena, and must not be accessed through any other
    /// pointer while the arena (or an allocator using it) is live.
    pub unsafe fn new(buf: *mut u8, size: usize, min_increment: usize) -> Self {
        debug_assert_eq!(min_increment % ALIGNMENT, 0);
        let arena_end = unsafe { buf.add(size) };
        let heap_end = match find_aligned(buf, ALIGNMENT) {
            Some(p) if (p as usize) <= arena_end as usize => p as *mut u8,
            _ => arena_end,
        };
        ArenaGrower {
            heap_end,
            arena_end,
            min_increment,
        }
    }
}

unsafe impl Grower for ArenaGrower {
    unsafe fn grow(&mut self, size: usize) -> Result<(NonNull<u8>, usize), ()> {
        let heap_end = self.heap_end;
        if size == 0 {
            return Ok((NonNull::new(heap_end).unwrap(), 0));
        }
        debug_assert_eq!(size % ALIGNMENT, 0);
        let size = size.max(self.min_increment);
        let new_heap_end = checked_add(heap_end, size).ok_or(())? as *mut u8;
        if new_heap_end > self.arena_end {
            return Err(());
        }
        self.heap_end = new_heap_end;
        Ok((NonNull::new(heap_end).unwrap(), size))
    }
}

unsafe impl<T: Grower + ?Sized> Grower for &mut T {
    unsafe fn grow(&mut self, size: usize) -> Result<(NonNull<u8>, usize), ()> {
        (*self).grow(size)
    }
}
