//! On-memory layout of the free-list arena.
//!
//! A buffer is one parent allocation: `[BufferHeader | pad | usable]`.
//! Free regions inside the usable area carry a `FreeBlock` header at
//! their start and are chained in ascending address order. Live
//! allocations carry an `AllocationHeader` immediately before the user
//! pointer.

use core::ptr::NonNull;

use crate::alloc::align_up;

/// Granularity of the arena: allocation sizes and free-block addresses
/// are always multiples of this, so the tail of any allocation is a
/// valid free-block base.
pub(crate) const FREE_ALIGN: usize = align_of::<FreeBlock>();

/// Smallest region worth tracking as a free block.
pub(crate) const MIN_FREE_BLOCK: usize = size_of::<FreeBlock>();

pub(crate) const HEADER_SIZE: usize = size_of::<AllocationHeader>();

/// Lives at the start of every free region. `total_size` includes this
/// header. Links only ever point at blocks in the same buffer.
#[repr(C)]
pub(crate) struct FreeBlock {
    pub(crate) next: Option<NonNull<FreeBlock>>,
    pub(crate) prev: Option<NonNull<FreeBlock>>,
    pub(crate) total_size: usize,
}

/// Sits immediately before the user pointer of a live allocation.
///
/// `free_block_addr` records where the containing free block originally
/// started (the user pointer may have been offset up for alignment);
/// `allocation_size` is the rounded byte count, absorbed slivers
/// included.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct AllocationHeader {
    pub(crate) free_block_addr: usize,
    pub(crate) allocation_size: usize,
}

impl AllocationHeader {
    /// # Safety
    ///
    /// `user_ptr` must be a live allocation of this arena, so that a
    /// header sits `HEADER_SIZE` bytes before it.
    #[inline]
    pub(crate) unsafe fn before(user_ptr: NonNull<u8>) -> NonNull<AllocationHeader> {
        debug_assert!(user_ptr.as_ptr() as usize % align_of::<AllocationHeader>() == 0);

        // SAFETY: caller contract puts a header right before the pointer
        unsafe { user_ptr.sub(HEADER_SIZE).cast() }
    }
}

#[repr(C)]
pub(crate) struct BufferHeader {
    pub(crate) next: Option<NonNull<BufferHeader>>,
    pub(crate) prev: Option<NonNull<BufferHeader>>,
    pub(crate) head: Option<NonNull<FreeBlock>>,
    pub(crate) tail: Option<NonNull<FreeBlock>>,
    pub(crate) usable_size: usize,
}

/// Offset from a buffer base to its usable area.
pub(crate) const fn usable_offset() -> usize {
    align_up(size_of::<BufferHeader>(), FREE_ALIGN)
}

impl BufferHeader {
    /// Address of the first usable byte.
    #[inline]
    pub(crate) fn usable_base(buffer: NonNull<BufferHeader>) -> usize {
        buffer.as_ptr() as usize + usable_offset()
    }

    /// Whether `addr` falls inside this buffer's usable area.
    pub(crate) fn contains(buffer: NonNull<BufferHeader>, addr: usize) -> bool {
        let base = Self::usable_base(buffer);
        // SAFETY: buffer headers stay valid until the arena drops them
        let usable = unsafe { buffer.as_ref() }.usable_size;

        base <= addr && addr < base + usable
    }
}

/// Stamp a `FreeBlock` header onto free memory. Links are set by the
/// insertion that follows.
///
/// # Safety
///
/// `[addr, addr + total_size)` must be free memory inside one buffer of
/// the arena, with `addr` aligned to `FREE_ALIGN`.
pub(crate) unsafe fn write_free_block(addr: usize, total_size: usize) -> NonNull<FreeBlock> {
    debug_assert!(addr % FREE_ALIGN == 0);
    debug_assert!(total_size >= MIN_FREE_BLOCK);

    let block = addr as *mut FreeBlock;

    // SAFETY: caller contract. The region is free, in bounds, aligned
    unsafe {
        block.write(FreeBlock {
            next: None,
            prev: None,
            total_size,
        });
        NonNull::new_unchecked(block)
    }
}

// Free-list surgery. All of these require `buffer` to own every block
// involved and all pointers to be live; the arena upholds that by only
// ever linking blocks into the buffer they were carved from.

pub(crate) unsafe fn push_front(buffer: NonNull<BufferHeader>, mut node: NonNull<FreeBlock>) {
    // SAFETY: caller contract, see module note above
    unsafe {
        let buffer = &mut *buffer.as_ptr();
        node.as_mut().prev = None;
        node.as_mut().next = buffer.head;

        match buffer.head {
            Some(mut head) => head.as_mut().prev = Some(node),
            None => buffer.tail = Some(node),
        }

        buffer.head = Some(node);
    }
}

pub(crate) unsafe fn insert_after(
    buffer: NonNull<BufferHeader>,
    mut node: NonNull<FreeBlock>,
    mut after: NonNull<FreeBlock>,
) {
    // SAFETY: caller contract
    unsafe {
        let next = after.as_ref().next;
        node.as_mut().prev = Some(after);
        node.as_mut().next = next;
        after.as_mut().next = Some(node);

        match next {
            Some(mut next) => next.as_mut().prev = Some(node),
            None => (*buffer.as_ptr()).tail = Some(node),
        }
    }
}

pub(crate) unsafe fn remove(buffer: NonNull<BufferHeader>, node: NonNull<FreeBlock>) {
    // SAFETY: caller contract
    unsafe {
        let next = node.as_ref().next;
        let prev = node.as_ref().prev;

        match prev {
            Some(mut prev) => prev.as_mut().next = next,
            None => (*buffer.as_ptr()).head = next,
        }

        match next {
            Some(mut next) => next.as_mut().prev = prev,
            None => (*buffer.as_ptr()).tail = prev,
        }
    }
}

/// Split `block` at `offset` bytes: the block keeps `offset` bytes, a new
/// free block holding the remainder is linked right after it.
///
/// # Safety
///
/// `block` must be linked into `buffer`'s free list and
/// `block.total_size - offset` must be at least `MIN_FREE_BLOCK`.
pub(crate) unsafe fn split(
    buffer: NonNull<BufferHeader>,
    mut block: NonNull<FreeBlock>,
    offset: usize,
) {
    debug_assert!(offset % FREE_ALIGN == 0);
    debug_assert!(offset > 0);

    // SAFETY: caller contract. The remainder region is free memory of
    // this buffer
    unsafe {
        let total = block.as_ref().total_size;
        debug_assert!(offset < total);
        debug_assert!(total - offset >= MIN_FREE_BLOCK);

        let remainder = write_free_block(block.as_ptr() as usize + offset, total - offset);
        block.as_mut().total_size = offset;
        insert_after(buffer, remainder, block);
    }
}

/// Merge `middle` with whichever of its list neighbors is contiguous
/// with it in memory. Coalescing is maximal: both sides are tried.
///
/// # Safety
///
/// `middle` must be linked into `buffer`'s free list.
pub(crate) unsafe fn coalesce(buffer: NonNull<BufferHeader>, middle: NonNull<FreeBlock>) {
    // SAFETY: caller contract; merged blocks are adjacent by the address
    // check, so the combined region is one contiguous free run
    unsafe {
        let mut middle = middle;

        if let Some(mut left) = middle.as_ref().prev {
            if left.as_ptr() as usize + left.as_ref().total_size == middle.as_ptr() as usize {
                left.as_mut().total_size += middle.as_ref().total_size;
                remove(buffer, middle);
                middle = left;
            }
        }

        if let Some(mut right) = middle.as_ref().next {
            if middle.as_ptr() as usize + middle.as_ref().total_size == right.as_ptr() as usize {
                middle.as_mut().total_size += right.as_ref().total_size;
                remove(buffer, right);
            }
        }
    }
}
