use super::LinearArena;
use crate::alloc::ArenaError;

#[test]
fn growth_chains_blocks_and_reset_rewinds() {
    let mut arena = LinearArena::new(64);

    let a = arena.alloc_bytes(60, 1, 1).unwrap();
    let b = arena.alloc_bytes(60, 1, 1).unwrap();
    let c = arena.alloc_bytes(60, 1, 1).unwrap();

    let (a, b, c) = (a.as_ptr() as usize, b.as_ptr() as usize, c.as_ptr() as usize);
    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_ne!(a, c);

    // 60-byte regions from distinct blocks must not overlap
    for (x, y) in [(a, b), (b, c), (a, c)] {
        assert!(x + 60 <= y || y + 60 <= x, "regions overlap");
    }

    assert!(arena.memory_usage() >= 180);

    arena.reset();
    assert_eq!(arena.memory_usage(), 0);

    let again = arena.alloc_bytes(1, 1, 1).unwrap();
    assert_eq!(
        again.as_ptr() as usize,
        a,
        "reset must re-yield the first pointer"
    );
}

#[test]
fn returned_regions_are_aligned() {
    let mut arena = LinearArena::new(256);

    for align in [1usize, 2, 4, 8, 16] {
        let ptr = arena.alloc_bytes(3, 1, align).unwrap();
        assert_eq!(ptr.as_ptr() as usize % align, 0, "align {align}");
    }
}

#[test]
fn returned_regions_are_zeroed_after_reuse() {
    let mut arena = LinearArena::new(128);

    let ptr = arena.alloc_bytes(64, 1, 1).unwrap();
    // SAFETY: the region is 64 live bytes we exclusively own
    unsafe {
        core::ptr::write_bytes(ptr.as_ptr(), 0xAB, 64);
    }

    arena.reset();

    let ptr = arena.alloc_bytes(64, 1, 1).unwrap();
    // SAFETY: freshly allocated 64-byte region
    let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 64) };
    assert!(bytes.iter().all(|&b| b == 0), "recycled memory must be zeroed");
}

#[test]
fn usage_covers_every_allocation() {
    let mut arena = LinearArena::new(64);

    let mut requested = 0;
    for size in [1usize, 7, 24, 3, 100, 60] {
        arena.alloc_bytes(size, 1, 8).unwrap();
        requested += size;
    }

    assert!(arena.memory_usage() >= requested);
}

#[test]
fn multiplicative_overflow_fails_softly() {
    let mut arena = LinearArena::new(64);

    let result = arena.alloc_bytes(usize::MAX, 16, 8);
    assert!(matches!(result, Err(ArenaError::SizeOverflow)));

    // the arena stays usable afterwards
    assert!(arena.alloc_bytes(8, 1, 8).is_ok());
}

#[test]
fn copy_slice_round_trips() {
    let mut arena = LinearArena::new(64);

    let src = [3u32, 1, 4, 1, 5, 9, 2, 6];
    let copied = arena.copy_slice(&src).unwrap();

    // SAFETY: copy_slice initialized src.len() items at the pointer
    let copied = unsafe { core::slice::from_raw_parts(copied.as_ptr(), src.len()) };
    assert_eq!(copied, &src);
}
