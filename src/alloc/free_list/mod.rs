//! A free-list arena: variable-size allocations with free, coalescing,
//! and resize-in-place, built over parent-vended buffers.
//!
//! Buffers chain as the arena grows; inside each buffer the free blocks
//! form an address-ordered doubly linked list. First fit wins. Freed
//! regions are merged with any contiguous free neighbor, so a fully
//! drained buffer always collapses back to a single free block.

use core::ptr::NonNull;

use log::trace;

use crate::alloc::{ArenaError, Heap, Parent, align_up, checked_align_up};

mod layout;

use layout::{
    AllocationHeader, BufferHeader, FREE_ALIGN, FreeBlock, HEADER_SIZE, MIN_FREE_BLOCK, coalesce,
    insert_after, push_front, remove, split, usable_offset, write_free_block,
};

#[cfg(test)]
mod tests;

pub struct FreeListArena<P: Parent = Heap> {
    parent: P,
    head: Option<NonNull<BufferHeader>>,
    tail: Option<NonNull<BufferHeader>>,
}

struct Fit {
    buffer: NonNull<BufferHeader>,
    block: NonNull<FreeBlock>,
    user_ptr: NonNull<u8>,
}

impl FreeListArena {
    /// Arena with one heap-backed buffer of at least `capacity` usable
    /// bytes.
    pub fn new(capacity: usize) -> Self {
        Self::with_parent(Heap, capacity)
    }
}

impl<P: Parent> FreeListArena<P> {
    pub fn with_parent(parent: P, capacity: usize) -> Self {
        assert!(capacity > 0, "free-list arena capacity must be non-zero");

        let mut arena = Self {
            parent,
            head: None,
            tail: None,
        };

        arena
            .allocate_buffer(capacity)
            .expect("free-list arena capacity does not fit a Layout");

        arena
    }

    /// Allocate `count * item_size` zeroed bytes at `requested_align`.
    ///
    /// Sizes are rounded up to free-block granularity; zero-sized
    /// requests consume one granule so every allocation has a distinct
    /// header. Fails softly on multiplicative overflow.
    pub fn allocate(
        &mut self,
        count: usize,
        item_size: usize,
        requested_align: usize,
    ) -> Result<NonNull<u8>, ArenaError> {
        debug_assert!(requested_align.is_power_of_two());

        let byte_count = count
            .checked_mul(item_size)
            .ok_or(ArenaError::SizeOverflow)?;

        let alloc_size = checked_align_up(byte_count.max(1), FREE_ALIGN)?;
        // The header is written right before the user pointer, so the
        // pointer must also satisfy the header's alignment.
        let alignment = requested_align.max(align_of::<AllocationHeader>());

        let fit = match self.find_fit(alloc_size, alignment) {
            Some(fit) => fit,
            None => {
                let grown = self.grow_for(alloc_size, alignment)?;
                self.fit_in_buffer(grown, alloc_size, alignment)
                    .expect("a freshly grown buffer fits the request that grew it")
            }
        };

        // SAFETY: find_fit returned a block linked into `fit.buffer` with
        // room for the user region at `fit.user_ptr`
        let ptr = unsafe { self.commit(fit, alloc_size) };

        Ok(ptr)
    }

    /// Allocate zeroed storage for `count` items of `T`.
    ///
    /// As with [`LinearArena::alloc_array`](crate::alloc::LinearArena::alloc_array),
    /// reading a `T` back is only defined once one has been written.
    pub fn alloc_array<T>(&mut self, count: usize) -> Result<NonNull<T>, ArenaError> {
        Ok(self
            .allocate(count, size_of::<T>(), align_of::<T>())?
            .cast())
    }

    pub fn alloc_item<T>(&mut self) -> Result<NonNull<T>, ArenaError> {
        self.alloc_array(1)
    }

    /// Return an allocation to the arena, merging it with any contiguous
    /// free neighbor.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live allocation of this arena and must not be
    /// used afterwards.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        // SAFETY: ptr is a live allocation, so its header precedes it
        let header = unsafe { AllocationHeader::before(ptr).read() };

        let offset = ptr.as_ptr() as usize - header.free_block_addr;
        let freed_size = header.allocation_size + offset;

        // SAFETY: the freed region spans the original block base through
        // the allocation tail; nothing live remains inside it
        let block = unsafe { write_free_block(header.free_block_addr, freed_size) };

        let buffer = self
            .buffer_containing(header.free_block_addr)
            .expect("pointer does not belong to this arena");

        // SAFETY: block lies inside `buffer` and is not yet linked
        unsafe {
            self.insert_by_address(buffer, block);
            coalesce(buffer, block);
        }

        #[cfg(debug_assertions)]
        self.check_fully_coalesced();
    }

    /// Resize an allocation, in place when the neighboring free space
    /// allows it, otherwise by move.
    ///
    /// Returns `Ok(None)` when the new size is zero (the allocation was
    /// freed); otherwise the pointer to use from now on. The first
    /// `min(old, new)` bytes are preserved; grown bytes are zeroed.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live allocation of this arena. On success the old
    /// pointer is invalid unless it is the one returned.
    pub unsafe fn resize(
        &mut self,
        ptr: NonNull<u8>,
        new_count: usize,
        item_size: usize,
        requested_align: usize,
    ) -> Result<Option<NonNull<u8>>, ArenaError> {
        let new_bytes = new_count
            .checked_mul(item_size)
            .ok_or(ArenaError::SizeOverflow)?;

        let new_size = checked_align_up(new_bytes, FREE_ALIGN)?;

        // SAFETY: ptr is a live allocation
        let header_ptr = unsafe { AllocationHeader::before(ptr) };
        // SAFETY: header_ptr addresses this allocation's header
        let old_size = unsafe { header_ptr.as_ref() }.allocation_size;
        debug_assert!(old_size > 0);

        if new_size == 0 {
            // SAFETY: forwarded caller contract
            unsafe { self.deallocate(ptr) };
            return Ok(None);
        }

        if new_size == old_size {
            return Ok(Some(ptr));
        }

        if new_size < old_size {
            // SAFETY: the allocation tail past new_size belongs to us
            unsafe { self.shrink_in_place(ptr, header_ptr, old_size, new_size) };
            return Ok(Some(ptr));
        }

        // SAFETY: forwarded caller contract
        if unsafe { self.try_grow_in_place(ptr, header_ptr, old_size, new_size) } {
            #[cfg(debug_assertions)]
            self.check_fully_coalesced();
            return Ok(Some(ptr));
        }

        let new_ptr = self.allocate(new_count, item_size, requested_align)?;

        // SAFETY: both regions are live and distinct; old_size bytes are
        // readable at ptr and writable at new_ptr (new_size > old_size)
        unsafe {
            core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_size);
            self.deallocate(ptr);
        }

        Ok(Some(new_ptr))
    }

    /// Bytes currently handed out (total usable minus free).
    pub fn memory_usage(&self) -> usize {
        let mut usable = 0;
        let mut cursor = self.head;

        while let Some(buffer) = cursor {
            // SAFETY: buffer headers are live until Drop
            let header = unsafe { buffer.as_ref() };
            usable += header.usable_size;
            cursor = header.next;
        }

        usable - self.available_memory()
    }

    /// Bytes sitting in free blocks across all buffers.
    pub fn available_memory(&self) -> usize {
        let mut sum = 0;
        let mut cursor = self.head;

        while let Some(buffer) = cursor {
            // SAFETY: buffer headers and their free lists are live
            let header = unsafe { buffer.as_ref() };
            let mut block = header.head;

            while let Some(b) = block {
                // SAFETY: linked free blocks are live
                let b = unsafe { b.as_ref() };
                sum += b.total_size;
                block = b.next;
            }

            cursor = header.next;
        }

        sum
    }

    pub fn buffer_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head;

        while let Some(buffer) = cursor {
            count += 1;
            // SAFETY: buffer headers are live until Drop
            cursor = unsafe { buffer.as_ref() }.next;
        }

        count
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn allocate_buffer(&mut self, capacity: usize) -> Result<NonNull<BufferHeader>, ArenaError> {
        let usable = checked_align_up(capacity, FREE_ALIGN)?;
        let total = usable_offset()
            .checked_add(usable)
            .ok_or(ArenaError::SizeOverflow)?;

        let layout = rust_alloc::alloc::Layout::from_size_align(
            total,
            align_of::<BufferHeader>().max(FREE_ALIGN),
        )?;

        let raw = self.parent.alloc_zeroed(layout).cast::<BufferHeader>();

        // SAFETY: freshly vended memory sized usable_offset() + usable;
        // the first free block spans the whole usable area
        unsafe {
            let first_block = write_free_block(BufferHeader::usable_base(raw), usable);

            raw.write(BufferHeader {
                next: None,
                prev: self.tail,
                head: Some(first_block),
                tail: Some(first_block),
                usable_size: usable,
            });
        }

        match self.tail {
            // SAFETY: tail is a live buffer header
            Some(mut tail) => unsafe { tail.as_mut().next = Some(raw) },
            None => self.head = Some(raw),
        }
        self.tail = Some(raw);

        Ok(raw)
    }

    fn grow_for(
        &mut self,
        alloc_size: usize,
        alignment: usize,
    ) -> Result<NonNull<BufferHeader>, ArenaError> {
        // SAFETY: the arena always holds at least one buffer
        let last_usable = unsafe { self.tail.expect("arena has a buffer").as_ref() }.usable_size;

        let wanted = alloc_size
            .checked_mul(2)
            .and_then(|doubled| doubled.checked_add(HEADER_SIZE))
            .and_then(|padded| padded.checked_add(alignment))
            .ok_or(ArenaError::SizeOverflow)?;

        let capacity = last_usable.max(wanted);
        trace!("free-list arena grew by a {capacity} byte buffer");

        self.allocate_buffer(capacity)
    }

    fn find_fit(&self, alloc_size: usize, alignment: usize) -> Option<Fit> {
        let mut cursor = self.head;

        while let Some(buffer) = cursor {
            if let Some(fit) = self.fit_in_buffer(buffer, alloc_size, alignment) {
                return Some(fit);
            }

            // SAFETY: buffer headers are live until Drop
            cursor = unsafe { buffer.as_ref() }.next;
        }

        None
    }

    fn fit_in_buffer(
        &self,
        buffer: NonNull<BufferHeader>,
        alloc_size: usize,
        alignment: usize,
    ) -> Option<Fit> {
        // SAFETY: buffer header and its free list are live
        let mut block = unsafe { buffer.as_ref() }.head;

        while let Some(candidate) = block {
            let base = candidate.as_ptr() as usize;
            // SAFETY: linked free blocks are live
            let total = unsafe { candidate.as_ref() }.total_size;

            let user = align_up(base + HEADER_SIZE, alignment);
            let fits = user
                .checked_add(alloc_size)
                .is_some_and(|end| end <= base + total);

            if fits {
                return Some(Fit {
                    buffer,
                    block: candidate,
                    // SAFETY: user lies strictly inside the buffer, hence
                    // non-null
                    user_ptr: unsafe { NonNull::new_unchecked(user as *mut u8) },
                });
            }

            // SAFETY: linked free blocks are live
            block = unsafe { candidate.as_ref() }.next;
        }

        None
    }

    /// Carve the committed region out of the fit's block: split off the
    /// remainder when it is worth tracking, absorb it otherwise, stamp
    /// the allocation header, zero the user region.
    ///
    /// # Safety
    ///
    /// `fit` must come from `find_fit`/`fit_in_buffer` on the current
    /// free-list state.
    unsafe fn commit(&mut self, fit: Fit, alloc_size: usize) -> NonNull<u8> {
        let block_base = fit.block.as_ptr() as usize;
        let user = fit.user_ptr.as_ptr() as usize;

        // SAFETY: fit.block is linked into fit.buffer
        unsafe {
            let total = fit.block.as_ref().total_size;
            let consumed = (user - block_base) + alloc_size;
            let remainder = total - consumed;

            let recorded_size = if remainder >= MIN_FREE_BLOCK {
                split(fit.buffer, fit.block, consumed);
                alloc_size
            } else {
                alloc_size + remainder
            };

            remove(fit.buffer, fit.block);

            AllocationHeader::before(fit.user_ptr).write(AllocationHeader {
                free_block_addr: block_base,
                allocation_size: recorded_size,
            });

            core::ptr::write_bytes(fit.user_ptr.as_ptr(), 0, recorded_size);
        }

        fit.user_ptr
    }

    /// # Safety
    ///
    /// `new_size < old_size`, both multiples of `FREE_ALIGN`, and
    /// `header_ptr` is the header of the live allocation at `ptr`.
    unsafe fn shrink_in_place(
        &mut self,
        ptr: NonNull<u8>,
        mut header_ptr: NonNull<AllocationHeader>,
        old_size: usize,
        new_size: usize,
    ) {
        let shrink_by = old_size - new_size;

        // Too small to carry a free-block header: the sliver stays part
        // of the allocation.
        if shrink_by < MIN_FREE_BLOCK {
            return;
        }

        let tail_addr = ptr.as_ptr() as usize + new_size;

        // SAFETY: the tail region belonged to this allocation and is
        // being released; it lies inside the containing buffer
        unsafe {
            let block = write_free_block(tail_addr, shrink_by);
            let buffer = self
                .buffer_containing(tail_addr)
                .expect("pointer does not belong to this arena");

            self.insert_by_address(buffer, block);
            coalesce(buffer, block);

            header_ptr.as_mut().allocation_size = new_size;
        }

        #[cfg(debug_assertions)]
        self.check_fully_coalesced();
    }

    /// Try to extend the allocation into an adjacent successor free
    /// block. Returns false when no adjacent block can cover the growth.
    ///
    /// # Safety
    ///
    /// `new_size > old_size`, both multiples of `FREE_ALIGN`, and
    /// `header_ptr` is the header of the live allocation at `ptr`.
    unsafe fn try_grow_in_place(
        &mut self,
        ptr: NonNull<u8>,
        mut header_ptr: NonNull<AllocationHeader>,
        old_size: usize,
        new_size: usize,
    ) -> bool {
        let addr = ptr.as_ptr() as usize;
        let need = new_size - old_size;

        let buffer = self
            .buffer_containing(addr)
            .expect("pointer does not belong to this arena");

        let Some(successor) = self.free_block_after(buffer, addr) else {
            return false;
        };

        let successor_addr = successor.as_ptr() as usize;
        // SAFETY: successor is a linked free block of `buffer`
        let successor_size = unsafe { successor.as_ref() }.total_size;

        if addr + old_size != successor_addr || need > successor_size {
            return false;
        }

        // SAFETY: successor is adjacent to the allocation tail; either
        // its head `need` bytes or the whole block are absorbed
        unsafe {
            let grown_size = if successor_size - need >= MIN_FREE_BLOCK {
                split(buffer, successor, need);
                remove(buffer, successor);
                new_size
            } else {
                remove(buffer, successor);
                old_size + successor_size
            };

            header_ptr.as_mut().allocation_size = grown_size;

            // Keep the zeroing discipline for the absorbed bytes, which
            // previously held free-list links.
            core::ptr::write_bytes((addr + old_size) as *mut u8, 0, grown_size - old_size);
        }

        true
    }

    fn buffer_containing(&self, addr: usize) -> Option<NonNull<BufferHeader>> {
        let mut cursor = self.head;

        while let Some(buffer) = cursor {
            if BufferHeader::contains(buffer, addr) {
                return Some(buffer);
            }

            // SAFETY: buffer headers are live until Drop
            cursor = unsafe { buffer.as_ref() }.next;
        }

        None
    }

    fn free_block_after(
        &self,
        buffer: NonNull<BufferHeader>,
        addr: usize,
    ) -> Option<NonNull<FreeBlock>> {
        // SAFETY: buffer header and its free list are live; the list is
        // address-sorted, so the first block past `addr` is the successor
        let mut block = unsafe { buffer.as_ref() }.head;

        while let Some(candidate) = block {
            if candidate.as_ptr() as usize > addr {
                return Some(candidate);
            }

            // SAFETY: linked free blocks are live
            block = unsafe { candidate.as_ref() }.next;
        }

        None
    }

    /// Link `block` into the address-sorted free list of `buffer`.
    ///
    /// # Safety
    ///
    /// `block` must lie inside `buffer` and not be linked anywhere.
    unsafe fn insert_by_address(&mut self, buffer: NonNull<BufferHeader>, block: NonNull<FreeBlock>) {
        let addr = block.as_ptr() as usize;

        // SAFETY: walking live links of `buffer`
        let mut predecessor = None;
        let mut cursor = unsafe { buffer.as_ref() }.head;

        while let Some(candidate) = cursor {
            if candidate.as_ptr() as usize > addr {
                break;
            }

            predecessor = Some(candidate);
            // SAFETY: linked free blocks are live
            cursor = unsafe { candidate.as_ref() }.next;
        }

        // SAFETY: forwarded caller contract
        unsafe {
            match predecessor {
                Some(predecessor) => insert_after(buffer, block, predecessor),
                None => push_front(buffer, block),
            }
        }
    }

    /// With nothing handed out, every buffer must hold exactly one free
    /// block spanning its whole usable area.
    #[cfg(debug_assertions)]
    fn check_fully_coalesced(&self) {
        if self.memory_usage() != 0 {
            return;
        }

        let mut cursor = self.head;

        while let Some(buffer) = cursor {
            // SAFETY: buffer headers and free lists are live
            let header = unsafe { buffer.as_ref() };
            debug_assert!(header.head == header.tail);

            if let Some(block) = header.head {
                // SAFETY: linked free block is live
                debug_assert!(unsafe { block.as_ref() }.total_size == header.usable_size);
            }

            cursor = header.next;
        }
    }
}

impl<P: Parent> Drop for FreeListArena<P> {
    fn drop(&mut self) {
        // newest buffer first, following the back links
        let mut cursor = self.tail;

        while let Some(buffer) = cursor {
            // SAFETY: every buffer was vended by the parent with the
            // layout recomputed here from its recorded usable size
            unsafe {
                let header = buffer.as_ref();
                let prev = header.prev;
                let layout = rust_alloc::alloc::Layout::from_size_align(
                    usable_offset() + header.usable_size,
                    align_of::<BufferHeader>().max(FREE_ALIGN),
                )
                .expect("layout was valid when the buffer was allocated");

                self.parent.dealloc(buffer.cast(), layout);
                cursor = prev;
            }
        }
    }
}
