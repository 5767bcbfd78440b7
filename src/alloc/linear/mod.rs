//! A linear (bump) arena with chained growth.
//!
//! Allocation only moves a cursor forward; memory comes back in bulk via
//! [`LinearArena::reset`] or by dropping the arena. Every returned region
//! is zeroed, so two equally shaped allocations always start out
//! bit-identical.

use core::ptr::NonNull;

use log::trace;

use crate::alloc::{ArenaError, Heap, Parent};

mod block;

use block::{ALIGN_FLOOR, BlockHeader};

#[cfg(test)]
mod tests;

pub struct LinearArena<P: Parent = Heap> {
    parent: P,
    first: NonNull<BlockHeader>,
    /// Block the next allocation is attempted in first. Advanced on
    /// growth, rewound to `first` on reset.
    top: NonNull<BlockHeader>,
}

impl LinearArena {
    /// Arena with one heap-backed block of exactly `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self::with_parent(Heap, capacity)
    }
}

impl<P: Parent> LinearArena<P> {
    pub fn with_parent(parent: P, capacity: usize) -> Self {
        assert!(capacity > 0, "linear arena capacity must be non-zero");

        let first = match BlockHeader::allocate(&parent, capacity) {
            Ok(block) => block,
            Err(_) => panic!("linear arena capacity does not fit a Layout"),
        };

        Self {
            parent,
            first,
            top: first,
        }
    }

    /// Allocate `count * item_size` zeroed bytes at `align`.
    ///
    /// Fails softly on multiplicative overflow. `align` must be a power
    /// of two no larger than the 16-byte block floor.
    pub fn alloc_bytes(
        &mut self,
        count: usize,
        item_size: usize,
        align: usize,
    ) -> Result<NonNull<u8>, ArenaError> {
        debug_assert!(align.is_power_of_two());
        debug_assert!(align <= ALIGN_FLOOR);

        let byte_count = count
            .checked_mul(item_size)
            .ok_or(ArenaError::SizeOverflow)?;

        let mut cursor = Some(self.top);
        while let Some(block) = cursor {
            if let Some(ptr) = BlockHeader::try_alloc(block, byte_count, align) {
                return Ok(ptr);
            }

            // SAFETY: block pointers only come from BlockHeader::allocate
            // and stay valid until Drop
            cursor = unsafe { block.as_ref() }.next;
        }

        self.grow_and_alloc(byte_count, align)
    }

    /// Allocate zeroed storage for `count` items of `T`.
    ///
    /// The memory is zeroed, not initialized: reading a `T` through the
    /// pointer is only defined once the caller has written one (or `T`
    /// is valid as all-zeroes).
    pub fn alloc_array<T>(&mut self, count: usize) -> Result<NonNull<T>, ArenaError> {
        Ok(self
            .alloc_bytes(count, size_of::<T>(), align_of::<T>())?
            .cast())
    }

    pub fn alloc_item<T>(&mut self) -> Result<NonNull<T>, ArenaError> {
        self.alloc_array(1)
    }

    /// Allocate and fill from `src`; the returned pointer addresses
    /// `src.len()` initialized items.
    pub fn copy_slice<T: Copy>(&mut self, src: &[T]) -> Result<NonNull<T>, ArenaError> {
        let dst = self.alloc_array::<T>(src.len())?;

        // SAFETY: dst was just allocated with room for src.len() items and
        // cannot overlap a live borrow of src
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), src.len());
        }

        Ok(dst)
    }

    fn grow_and_alloc(&mut self, byte_count: usize, align: usize) -> Result<NonNull<u8>, ArenaError> {
        // SAFETY: top is always a valid block header
        let top_capacity = unsafe { self.top.as_ref() }.capacity;
        let new_capacity = top_capacity.max(byte_count);

        let new_block = BlockHeader::allocate(&self.parent, new_capacity)?;
        trace!("linear arena grew by a {new_capacity} byte block");

        // Append at the end of the chain and make the fresh block the top.
        let mut last = self.top;
        // SAFETY: the chain is a well-formed singly linked list of live
        // block headers
        unsafe {
            while let Some(next) = last.as_ref().next {
                last = next;
            }
            last.as_mut().next = Some(new_block);
        }
        self.top = new_block;

        let ptr = BlockHeader::try_alloc(new_block, byte_count, align)
            .expect("a freshly grown block fits the request that grew it");

        Ok(ptr)
    }

    /// Bytes consumed across all blocks, alignment padding included.
    pub fn memory_usage(&self) -> usize {
        let mut sum = 0;
        let mut cursor = Some(self.first);

        while let Some(block) = cursor {
            // SAFETY: chain of live block headers
            let header = unsafe { block.as_ref() };
            sum += header.used;
            cursor = header.next;
        }

        sum
    }

    /// Rewind every cursor to zero. Keeps all blocks.
    pub fn reset(&mut self) {
        let mut cursor = Some(self.first);

        while let Some(mut block) = cursor {
            // SAFETY: chain of live block headers, exclusively ours
            let header = unsafe { block.as_mut() };
            header.used = 0;
            cursor = header.next;
        }

        self.top = self.first;
    }
}

impl<P: Parent> Drop for LinearArena<P> {
    fn drop(&mut self) {
        let mut cursor = Some(self.first);

        while let Some(block) = cursor {
            // SAFETY: every block was vended by the parent with the layout
            // recomputed here from its recorded capacity
            unsafe {
                let header = block.as_ref();
                let next = header.next;
                let layout = BlockHeader::layout(header.capacity)
                    .expect("layout was valid when the block was allocated");

                self.parent.dealloc(block.cast(), layout);
                cursor = next;
            }
        }
    }
}
