//! Intrusive block storage for the linear arena.
//!
//! Each parent allocation is `[BlockHeader | pad to ALIGN_FLOOR | bytes]`.
//! The header chains blocks together and carries the bump cursor, so the
//! arena needs no side storage of its own.

use core::ptr::NonNull;

use rust_alloc::alloc::Layout;

use crate::alloc::{ArenaError, Parent, align_up};

/// Every allocation in a block satisfies alignments up to this floor.
pub(crate) const ALIGN_FLOOR: usize = 16;

pub(crate) struct BlockHeader {
    pub(crate) next: Option<NonNull<BlockHeader>>,
    /// Bump cursor: bytes of the data region consumed so far.
    pub(crate) used: usize,
    pub(crate) capacity: usize,
}

/// Offset from the block base to the start of the data region.
pub(crate) const fn data_offset() -> usize {
    align_up(size_of::<BlockHeader>(), ALIGN_FLOOR)
}

impl BlockHeader {
    pub(crate) fn layout(capacity: usize) -> Result<Layout, ArenaError> {
        let total = data_offset()
            .checked_add(capacity)
            .ok_or(ArenaError::SizeOverflow)?;

        Ok(Layout::from_size_align(total, ALIGN_FLOOR)?)
    }

    /// Allocate a block of exactly `capacity` usable bytes through `parent`.
    pub(crate) fn allocate<P: Parent>(
        parent: &P,
        capacity: usize,
    ) -> Result<NonNull<BlockHeader>, ArenaError> {
        let layout = Self::layout(capacity)?;
        let raw = parent.alloc_zeroed(layout).cast::<BlockHeader>();

        // SAFETY: freshly vended memory, aligned to ALIGN_FLOOR which is at
        // least the alignment of BlockHeader
        unsafe {
            raw.write(BlockHeader {
                next: None,
                used: 0,
                capacity,
            });
        }

        Ok(raw)
    }

    /// Pointer to the first byte of this block's data region.
    #[inline]
    pub(crate) fn data_base(block: NonNull<BlockHeader>) -> NonNull<u8> {
        // SAFETY: data_offset() is within the parent allocation backing the
        // block, which was sized as data_offset() + capacity
        unsafe { block.cast::<u8>().add(data_offset()) }
    }

    /// Try to carve `byte_count` bytes at `align` out of this block.
    ///
    /// The data base is aligned to `ALIGN_FLOOR`, so aligning the cursor
    /// offset aligns the returned address for any `align <= ALIGN_FLOOR`.
    pub(crate) fn try_alloc(
        mut block: NonNull<BlockHeader>,
        byte_count: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        // SAFETY: block headers are only created by `allocate` and stay
        // valid until the owning arena is dropped
        let header = unsafe { block.as_mut() };

        let aligned = align_up(header.used, align);
        let end = aligned.checked_add(byte_count)?;

        if end > header.capacity {
            return None;
        }

        header.used = end;

        // SAFETY: aligned + byte_count <= capacity, so the region is inside
        // the data area of this block
        let ptr = unsafe { Self::data_base(block).add(aligned) };

        debug_assert!(ptr.as_ptr() as usize % align == 0);

        // Blocks are vended zeroed but reset does not scrub, so the region
        // must be re-zeroed here.
        // SAFETY: the region is in bounds and exclusively ours
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0, byte_count);
        }

        Some(ptr)
    }
}
