use super::*;
use crate::growers::ArenaGrower;

/// An initialized allocator over a fresh zeroed buffer of `units` growth
/// units. The buffer is returned alongside so it outlives the allocator.
fn arena_alloc(units: usize) -> (UMalloc<ArenaGrower>, Vec<u8>) {
    let mut buf = vec![0u8; units * GROWTH_UNIT + ALIGNMENT];
    let grower = unsafe { ArenaGrower::new(buf.as_mut_ptr(), buf.len(), 0) };
    let mut heap = unsafe { UMalloc::with_grower(grower) };
    heap.init().unwrap();
    (heap, buf)
}

fn free_blocks(heap: &UMalloc<ArenaGrower>) -> Vec<(*mut Header, usize)> {
    unsafe {
        heap.freelist
            .iter()
            .map(|b| (b.as_ptr(), (*b.as_ptr()).size()))
            .collect()
    }
}

/// Walks the heap and returns whether any two physically adjacent blocks are
/// both free.
fn has_adjacent_free(heap: &UMalloc<ArenaGrower>) -> bool {
    unsafe {
        let mut block: *mut Header = heap.heap_start.cast();
        let mut prev_free = false;
        while block.cast::<u8>() < heap.heap_end {
            let free = !(*block).is_allocated();
            if free && prev_free {
                return true;
            }
            prev_free = free;
            block = Header::next_physical(block);
        }
        false
    }
}

#[test]
fn test_init_creates_single_free_block() {
    let (mut heap, _buf) = arena_alloc(1);

    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].0.cast::<u8>(), heap.heap_start);
    assert_eq!(blocks[0].1, GROWTH_UNIT - HEADER_SIZE);

    let (start, end) = heap.heap_range().unwrap();
    assert_eq!(end.as_ptr() as usize - start.as_ptr() as usize, GROWTH_UNIT);
    assert_eq!(heap.check_heap(), Ok(()));

    assert_eq!(heap.init(), Err(InitError::AlreadyInitialized));
}

#[test]
fn test_allocate_zero_is_benign() {
    let (mut heap, _buf) = arena_alloc(1);
    let before = free_blocks(&heap);

    assert!(heap.allocate(0).is_none());
    assert_eq!(free_blocks(&heap), before);
    assert_eq!(heap.check_heap(), Ok(()));
}

#[test]
#[cfg(debug_assertions)]
#[should_panic]
fn test_allocate_before_init_is_a_bug() {
    let mut buf = vec![0u8; GROWTH_UNIT + ALIGNMENT];
    let grower = unsafe { ArenaGrower::new(buf.as_mut_ptr(), buf.len(), 0) };
    let mut heap = unsafe { UMalloc::with_grower(grower) };
    let _ = heap.allocate(16);
}

#[test]
fn test_single_alloc_leaves_one_remainder() {
    let (mut heap, _buf) = arena_alloc(1);

    let p = heap.allocate(32).unwrap();
    assert_eq!(p.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(
        p.as_ptr() as usize,
        heap.heap_start as usize + HEADER_SIZE,
        "First fit should carve from the front of the heap."
    );
    assert_eq!(heap.check_heap(), Ok(()));

    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 1);
    assert_eq!(
        blocks[0].0 as usize,
        heap.heap_start as usize + HEADER_SIZE + 32
    );
    assert_eq!(blocks[0].1, GROWTH_UNIT - 2 * HEADER_SIZE - 32);
}

#[test]
fn test_free_middle_then_left_merges() {
    let (mut heap, _buf) = arena_alloc(1);

    let a = heap.allocate(64).unwrap();
    let b = heap.allocate(64).unwrap();
    let c = heap.allocate(64).unwrap();
    assert_eq!(
        b.as_ptr() as usize - a.as_ptr() as usize,
        64 + HEADER_SIZE,
        "Sequential allocations should be contiguous."
    );
    assert_eq!(c.as_ptr() as usize - b.as_ptr() as usize, 64 + HEADER_SIZE);

    // Free the middle block: both neighbors are allocated, no merge.
    unsafe { heap.deallocate(b) };
    assert_eq!(heap.check_heap(), Ok(()));
    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 2, "B's block plus the tail remainder.");
    assert_eq!(unsafe { Header::from_payload(b.as_ptr()) }, blocks[0].0);
    assert_eq!(blocks[0].1, 64);
    unsafe {
        assert!((*Header::from_payload(a.as_ptr())).is_allocated());
        assert!((*Header::from_payload(c.as_ptr())).is_allocated());
    }

    // Free A: it must absorb B into one block spanning both, no gap.
    unsafe { heap.deallocate(a) };
    assert_eq!(heap.check_heap(), Ok(()));
    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 2);
    assert_eq!(unsafe { Header::from_payload(a.as_ptr()) }, blocks[0].0);
    assert_eq!(blocks[0].1, 64 + HEADER_SIZE + 64);

    // Free C: everything merges back into the initial single block.
    unsafe { heap.deallocate(c) };
    assert_eq!(heap.check_heap(), Ok(()));
    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].1, GROWTH_UNIT - HEADER_SIZE);
}

#[test]
fn test_round_trip_reuses_block() {
    let (mut heap, _buf) = arena_alloc(1);

    let p = heap.allocate(100).unwrap();
    unsafe { heap.deallocate(p) };
    assert_eq!(heap.check_heap(), Ok(()));

    let q = heap.allocate(100).unwrap();
    assert_eq!(q, p, "First fit should hand the lowest block back.");
    // The payload must hold all 100 bytes.
    unsafe {
        q.as_ptr().write_bytes(0xa5, 100);
        assert_eq!(*q.as_ptr(), 0xa5);
        assert_eq!(*q.as_ptr().add(99), 0xa5);
    }
    assert_eq!(heap.check_heap(), Ok(()));
}

#[test]
fn test_first_fit_prefers_lowest_address() {
    let (mut heap, _buf) = arena_alloc(1);

    let ptrs: Vec<_> = (0..5).map(|_| heap.allocate(64).unwrap()).collect();
    unsafe {
        heap.deallocate(ptrs[3]);
        heap.deallocate(ptrs[1]);
    }
    assert_eq!(heap.check_heap(), Ok(()));

    // Two equally sized holes; the lower-address one must win.
    assert_eq!(heap.allocate(64), Some(ptrs[1]));
    assert_eq!(heap.allocate(64), Some(ptrs[3]));
}

#[test]
fn test_small_excess_is_not_split() {
    let (mut heap, _buf) = arena_alloc(1);

    let a = heap.allocate(64).unwrap();
    let _b = heap.allocate(64).unwrap();
    unsafe { heap.deallocate(a) };

    // 33 rounds up to 48; the 16-byte excess is below the minimum block
    // size, so the whole 64-byte block is taken.
    let p = heap.allocate(33).unwrap();
    assert_eq!(p, a);
    unsafe {
        assert_eq!((*Header::from_payload(p.as_ptr())).size(), 64);
    }
    assert_eq!(free_blocks(&heap).len(), 1, "Only the tail remainder left.");
    assert_eq!(heap.check_heap(), Ok(()));
}

#[test]
fn test_no_adjacent_free_after_deallocate() {
    let (mut heap, _buf) = arena_alloc(1);

    let ptrs: Vec<_> = (0..5).map(|_| heap.allocate(64).unwrap()).collect();
    for &i in &[1, 3, 2, 0, 4] {
        unsafe { heap.deallocate(ptrs[i]) };
        assert!(!has_adjacent_free(&heap), "missed merge after freeing #{i}");
        assert_eq!(heap.check_heap(), Ok(()));
    }
    assert_eq!(free_blocks(&heap).len(), 1);
}

#[test]
fn test_growth_across_unit_boundary() {
    let (mut heap, _buf) = arena_alloc(2);
    let quarter = GROWTH_UNIT / 4;

    // Three quarters fit in the initial unit; the fourth one must trigger a
    // growth because each allocation also consumed a header.
    let mut ptrs = Vec::new();
    for _ in 0..3 {
        ptrs.push(heap.allocate(quarter).unwrap());
        assert_eq!(heap.check_heap(), Ok(()));
    }
    let (start, end) = heap.heap_range().unwrap();
    assert_eq!(end.as_ptr() as usize - start.as_ptr() as usize, GROWTH_UNIT);

    ptrs.push(heap.allocate(quarter).unwrap());
    let (start, end) = heap.heap_range().unwrap();
    assert_eq!(
        end.as_ptr() as usize - start.as_ptr() as usize,
        2 * GROWTH_UNIT,
        "Fourth allocation should have grown the heap by one unit."
    );
    assert_eq!(heap.check_heap(), Ok(()));

    // The grown region is really usable.
    unsafe {
        ptrs[3].as_ptr().write_bytes(0x5a, quarter);
        assert_eq!(*ptrs[3].as_ptr().add(quarter - 1), 0x5a);
    }

    for p in ptrs {
        unsafe { heap.deallocate(p) };
        assert_eq!(heap.check_heap(), Ok(()));
    }
    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 1, "A fully freed heap coalesces completely.");
    assert_eq!(blocks[0].1, 2 * GROWTH_UNIT - HEADER_SIZE);
}

#[test]
fn test_failed_growth_leaves_heap_consistent() {
    let (mut heap, _buf) = arena_alloc(1);

    let before = free_blocks(&heap);
    assert!(
        heap.allocate(GROWTH_UNIT).is_none(),
        "The arena has no second unit to grow into."
    );
    assert_eq!(free_blocks(&heap), before);
    assert_eq!(heap.check_heap(), Ok(()));

    // The heap still serves requests that fit.
    assert!(heap.allocate(64).is_some());
    assert_eq!(heap.check_heap(), Ok(()));
}

#[test]
fn test_payloads_are_disjoint() {
    let (mut heap, _buf) = arena_alloc(1);

    let sizes = [16, 120, 48, 200, 16, 72];
    let ptrs: Vec<_> = sizes
        .iter()
        .map(|&s| {
            let p = heap.allocate(s).unwrap();
            unsafe { p.as_ptr().write_bytes(s as u8, s) };
            (p, s)
        })
        .collect();

    // Freeing every other allocation must not disturb the survivors.
    for (p, _) in ptrs.iter().step_by(2) {
        unsafe { heap.deallocate(*p) };
    }
    assert_eq!(heap.check_heap(), Ok(()));
    for (p, s) in ptrs.iter().skip(1).step_by(2) {
        unsafe {
            assert_eq!(*p.as_ptr(), *s as u8);
            assert_eq!(*p.as_ptr().add(s - 1), *s as u8);
        }
    }
}
