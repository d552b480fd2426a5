//! Utility functions.

use core::ptr::NonNull;

/// Returns the smallest multiple of `align` that is greater or equal to `x`,
/// or `None` if that value would overflow a `usize`.
///
/// # Panics
/// Panics if `align` is 0.
#[inline]
pub(crate) fn align_up(x: usize, align: usize) -> Option<usize> {
    match x % align {
        0 => Some(x),
        rem => x.checked_add(align - rem),
    }
}

/// Returns the smallest (in address) `align`-aligned pointer
/// with an address greater or equal to that of `ptr`
/// or `None` if no such pointer exists.
///
/// # Panics
/// Panics if `align` is not a power-of-two.
#[inline]
pub(crate) fn find_aligned(ptr: *const u8, align: usize) -> Option<*const u8> {
    unsafe {
        let offset = ptr.align_offset(align);
        debug_assert_ne!(
            offset,
            usize::MAX,
            "align_offset() on a *const u8 should never fail."
        );
        if usize::MAX - offset < ptr as usize {
            return None;
        }
        Some(ptr.add(offset))
    }
}

#[inline(always)]
pub(crate) fn checked_add(ptr: *const u8, offset: usize) -> Option<*const u8> {
    unsafe { (ptr as usize <= usize::MAX - offset).then_some(ptr.add(offset)) }
}

#[inline(always)]
pub(crate) fn raw_ptr<T>(p: Option<NonNull<T>>) -> *mut T {
    p.map_or(core::ptr::null_mut(), |p| p.as_ptr())
}
