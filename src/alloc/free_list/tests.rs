use rust_alloc::vec::Vec;

use super::FreeListArena;
use crate::alloc::ArenaError;

#[test]
fn out_of_order_frees_coalesce_back_to_one_block() {
    let mut arena = FreeListArena::new(1024);
    assert_eq!(arena.available_memory(), 1024);

    let a = arena.allocate(100, 1, 4).unwrap();
    let b = arena.allocate(100, 1, 4).unwrap();
    let c = arena.allocate(100, 1, 4).unwrap();

    // SAFETY: all three are live allocations of this arena
    unsafe {
        arena.deallocate(b);
        arena.deallocate(a);
        arena.deallocate(c);
    }

    assert_eq!(arena.memory_usage(), 0);
    assert_eq!(
        arena.available_memory(),
        1024,
        "a drained buffer must coalesce to a single full-size block"
    );
}

#[test]
fn resize_grows_in_place_into_adjacent_free_space() {
    let mut arena = FreeListArena::new(1024);

    let p = arena.allocate(100, 1, 4).unwrap();
    // SAFETY: p is live
    let grown = unsafe { arena.resize(p, 200, 1, 4) }.unwrap().unwrap();

    assert_eq!(grown, p, "adjacent free space must allow growth in place");
}

#[test]
fn resize_moves_and_preserves_contents() {
    let mut arena = FreeListArena::new(1024);

    let p = arena.allocate(100, 1, 4).unwrap();
    let _q = arena.allocate(100, 1, 4).unwrap();

    // SAFETY: p addresses 100 live bytes
    unsafe {
        for i in 0..100 {
            p.add(i).write(i as u8);
        }
    }

    // SAFETY: p is live
    let moved = unsafe { arena.resize(p, 300, 1, 4) }.unwrap().unwrap();
    assert_ne!(moved, p, "a blocked tail must force a move");

    // SAFETY: moved addresses at least 300 live bytes
    let bytes = unsafe { core::slice::from_raw_parts(moved.as_ptr(), 100) };
    for (i, &byte) in bytes.iter().enumerate() {
        assert_eq!(byte, i as u8, "byte {i} lost in the move");
    }
}

#[test]
fn resize_to_zero_deallocates() {
    let mut arena = FreeListArena::new(512);

    let p = arena.allocate(64, 1, 8).unwrap();
    assert!(arena.memory_usage() > 0);

    // SAFETY: p is live and not used after this
    let result = unsafe { arena.resize(p, 0, 1, 8) }.unwrap();
    assert!(result.is_none());
    assert_eq!(arena.memory_usage(), 0);
}

#[test]
fn resize_shrink_releases_the_tail() {
    let mut arena = FreeListArena::new(512);

    let p = arena.allocate(256, 1, 8).unwrap();
    let used_full = arena.memory_usage();

    // SAFETY: p is live
    let shrunk = unsafe { arena.resize(p, 64, 1, 8) }.unwrap().unwrap();
    assert_eq!(shrunk, p);
    assert!(arena.memory_usage() < used_full);

    // SAFETY: p is live
    unsafe { arena.deallocate(p) };
    assert_eq!(arena.memory_usage(), 0);
    assert_eq!(arena.available_memory(), 512);
}

#[test]
fn balanced_sequences_end_empty() {
    let mut arena = FreeListArena::new(2048);
    let mut live = Vec::new();

    for round in 0..4 {
        for size in [8usize, 40, 100, 24, 333] {
            live.push(arena.allocate(size, 1, 8).unwrap());
        }

        // free in a round-dependent order
        if round % 2 == 0 {
            live.reverse();
        }

        for ptr in live.drain(..) {
            // SAFETY: every pointer in `live` is a live allocation
            unsafe { arena.deallocate(ptr) };
        }

        assert_eq!(arena.memory_usage(), 0, "round {round} leaked");
    }
}

#[test]
fn allocations_honor_large_alignments() {
    let mut arena = FreeListArena::new(4096);

    for align in [8usize, 16, 32, 64, 128] {
        let ptr = arena.allocate(24, 1, align).unwrap();
        assert_eq!(ptr.as_ptr() as usize % align, 0, "align {align}");
    }
}

#[test]
fn live_allocations_do_not_alias() {
    let mut arena = FreeListArena::new(1024);

    let a = arena.allocate(64, 1, 8).unwrap();
    let b = arena.allocate(64, 1, 8).unwrap();

    // SAFETY: both regions are live and 64 bytes long
    unsafe {
        core::ptr::write_bytes(a.as_ptr(), 0x11, 64);
        core::ptr::write_bytes(b.as_ptr(), 0xFD, 64);

        let a_bytes = core::slice::from_raw_parts(a.as_ptr(), 64);
        assert!(a_bytes.iter().all(|&byte| byte == 0x11));
    }
}

#[test]
fn returned_memory_is_zeroed_even_when_recycled() {
    let mut arena = FreeListArena::new(512);

    let p = arena.allocate(128, 1, 8).unwrap();
    // SAFETY: p addresses 128 live bytes
    unsafe {
        core::ptr::write_bytes(p.as_ptr(), 0xEE, 128);
        arena.deallocate(p);
    }

    let p = arena.allocate(128, 1, 8).unwrap();
    // SAFETY: fresh 128-byte allocation
    let bytes = unsafe { core::slice::from_raw_parts(p.as_ptr(), 128) };
    assert!(bytes.iter().all(|&byte| byte == 0));
}

#[test]
fn exhaustion_appends_a_buffer() {
    let mut arena = FreeListArena::new(256);
    assert_eq!(arena.buffer_count(), 1);

    let _a = arena.allocate(200, 1, 8).unwrap();
    let _b = arena.allocate(200, 1, 8).unwrap();

    assert_eq!(arena.buffer_count(), 2);
    assert!(arena.memory_usage() >= 400);
}

#[test]
fn multiplicative_overflow_fails_softly() {
    let mut arena = FreeListArena::new(256);

    assert!(matches!(
        arena.allocate(usize::MAX, 8, 8),
        Err(ArenaError::SizeOverflow)
    ));

    let p = arena.allocate(16, 1, 8).unwrap();
    // SAFETY: p is live
    let resized = unsafe { arena.resize(p, usize::MAX, 8, 8) };
    assert!(matches!(resized, Err(ArenaError::SizeOverflow)));
}
