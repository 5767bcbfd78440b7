//! `allocator-api2` bridge over a frame scratch arena.
//!
//! Lets standard containers draw from the per-frame linear arena: grow
//! by bumping, never free (the whole arena is reset once per tick).
//! Single-threaded by construction; the `RefCell` panics on aliasing.

use core::cell::RefCell;
use core::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator, Layout};
use hashbrown::HashMap;

use crate::alloc::LinearArena;

/// The linear arena's block alignment floor caps what the bridge can
/// serve.
pub const MAX_SCRATCH_ALIGN: usize = 16;

/// [`Allocator`] handle tied to a frame's scratch arena.
///
/// `deallocate` is a no-op: scratch memory only comes back when the
/// arena is reset between frames, so containers that shrink simply
/// strand their old region until then.
pub struct ScratchAllocator<'frame> {
    inner: &'frame RefCell<LinearArena>,
    // (address -> size) of live allocations, for leak diagnostics
    records: RefCell<HashMap<usize, usize>>,
}

impl<'frame> ScratchAllocator<'frame> {
    pub fn new(arena: &'frame RefCell<LinearArena>) -> Self {
        Self {
            inner: arena,
            records: RefCell::new(HashMap::new()),
        }
    }

    /// Allocations handed out and not yet deallocated by their container.
    pub fn outstanding_allocs(&self) -> usize {
        self.records.borrow().len()
    }

    /// Total bytes currently tracked across live allocations. O(n), meant
    /// for debugging.
    pub fn total_allocated_bytes(&self) -> usize {
        self.records.borrow().values().sum()
    }
}

// SAFETY: the arena returns distinct, correctly aligned regions that
// stay valid until it is reset, which the 'frame borrow prevents while
// this handle lives.
unsafe impl Allocator for ScratchAllocator<'_> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        // ZSTs: dangling but aligned, without touching the arena.
        // SAFETY: any valid Layout has a non-zero power-of-two align
        if layout.size() == 0 {
            let dangling = unsafe { NonNull::new_unchecked(layout.align() as *mut u8) };
            return Ok(NonNull::slice_from_raw_parts(dangling, 0));
        }

        if layout.align() > MAX_SCRATCH_ALIGN {
            return Err(AllocError);
        }

        // borrow the arena, allocate, drop the borrow before touching
        // `records` so the two RefCells never overlap
        let ptr = self
            .inner
            .borrow_mut()
            .alloc_bytes(layout.size(), 1, layout.align())
            .map_err(|_| AllocError)?;

        self.records
            .borrow_mut()
            .insert(ptr.as_ptr() as usize, layout.size());

        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        // the arena zeroes every region it returns
        self.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // memory itself comes back on arena reset
        self.records.borrow_mut().remove(&(ptr.as_ptr() as usize));
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;

    use allocator_api2::alloc::{Allocator, Layout};
    use allocator_api2::vec::Vec;

    use super::ScratchAllocator;
    use crate::alloc::LinearArena;

    #[test]
    fn containers_grow_out_of_the_arena() {
        let arena = RefCell::new(LinearArena::new(4096));
        let scratch = ScratchAllocator::new(&arena);

        let mut values: Vec<u64, &ScratchAllocator<'_>> = Vec::new_in(&scratch);
        for i in 0..100u64 {
            values.push(i);
        }

        assert_eq!(values.iter().sum::<u64>(), 4950);
        assert!(scratch.outstanding_allocs() >= 1);
        assert!(arena.borrow().memory_usage() >= 100 * size_of::<u64>());
    }

    #[test]
    fn records_track_explicit_deallocation() {
        let arena = RefCell::new(LinearArena::new(1024));
        let scratch = ScratchAllocator::new(&arena);

        let layout = Layout::from_size_align(64, 8).unwrap();
        let ptr = scratch.allocate(layout).unwrap();
        assert_eq!(scratch.outstanding_allocs(), 1);
        assert_eq!(scratch.total_allocated_bytes(), 64);

        // SAFETY: ptr came from this allocator with this layout
        unsafe { scratch.deallocate(ptr.cast(), layout) };
        assert_eq!(scratch.outstanding_allocs(), 0);
    }

    #[test]
    fn oversized_alignment_is_rejected() {
        let arena = RefCell::new(LinearArena::new(1024));
        let scratch = ScratchAllocator::new(&arena);

        let layout = Layout::from_size_align(64, 64).unwrap();
        assert!(scratch.allocate(layout).is_err());
    }
}
