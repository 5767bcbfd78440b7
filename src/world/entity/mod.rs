//! Generational-id entity store.
//!
//! A fixed-capacity slot table: ids are (slot, generation) pairs and the
//! generation bumps every time a slot is released, so a stale id is
//! indistinguishable from one that never existed. Free slots are
//! threaded through the table itself; the backing array lives in the
//! world arena and is released with it.

use core::ptr::NonNull;

use log::error;

use crate::alloc::FreeListArena;

pub(crate) mod components;
mod scratch;

pub use components::{
    Collider, Component, ComponentKind, ComponentSet, DamageField, Entity, Faction, Health,
    Lifetime, Stats,
};
pub use scratch::{SCRATCH_CAPACITY, ScratchArena, ScratchIndex};

const FIRST_GENERATION: i32 = 1;
const LAST_GENERATION: i32 = i32::MAX;

/// Handle to an entity. `default()` is never valid: generations start
/// at 1 and wrap back to 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    pub slot: i32,
    pub generation: i32,
}

pub struct EntitySlot {
    entity: Entity,
    generation: i32,
    prev_free: i32,
    next_free: i32,
}

pub struct EntityStore<const N: usize> {
    slots: NonNull<EntitySlot>,
    first_free: i32,
}

impl<const N: usize> EntityStore<N> {
    /// Build the slot table inside `arena`. The store must not outlive
    /// the arena; the world guarantees that by owning both.
    pub fn new(arena: &mut FreeListArena) -> Self {
        let slots = arena
            .alloc_array::<EntitySlot>(N)
            .expect("entity slot table size cannot overflow");

        // Thread every slot onto the free list in index order.
        for i in 0..N {
            // SAFETY: the array holds N slots and we write each exactly once
            unsafe {
                slots.add(i).write(EntitySlot {
                    entity: Entity::default(),
                    generation: FIRST_GENERATION,
                    prev_free: i as i32 - 1,
                    next_free: if i == N - 1 { -1 } else { i as i32 + 1 },
                });
            }
        }

        Self {
            slots,
            first_free: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Claim a fresh entity. Slot capacity is a compile-time decision,
    /// so running out is fatal.
    pub fn create(&mut self, faction: Faction) -> (EntityId, &mut Entity) {
        if self.first_free < 0 {
            error!("entity store exhausted all {N} slots");
            panic!("out of entity slots");
        }

        let index = self.first_free;
        let slot = self.slot_mut(index);
        debug_assert!(slot.prev_free == -1, "free-list head has a predecessor");

        let next = slot.next_free;
        slot.next_free = -1;
        slot.entity = Entity::default();
        slot.entity.faction = faction;
        debug_assert!(slot.entity.scratch.memory_usage() == 0);

        let id = EntityId {
            slot: index,
            generation: slot.generation,
        };

        self.first_free = next;
        if next >= 0 {
            self.slot_mut(next).prev_free = -1;
        }

        (id, &mut self.slot_mut(index).entity)
    }

    /// Release an entity's slot: bump the generation (wrapping back to 1
    /// at saturation), reset its scratch arena, push the slot onto the
    /// free list. Removing through a stale id is a caller bug.
    pub fn remove(&mut self, id: EntityId) {
        debug_assert!(self.contains(id), "removing an invalid entity id");
        if !self.contains(id) {
            return;
        }

        let first_free = self.first_free;
        let slot = self.slot_mut(id.slot);

        // a live slot is never threaded; a threaded slot means the id was
        // forged or already released
        if slot.next_free != -1 || slot.prev_free != -1 {
            debug_assert!(false, "removing a slot that is already free");
            return;
        }

        slot.generation = if slot.generation == LAST_GENERATION {
            FIRST_GENERATION
        } else {
            slot.generation + 1
        };

        slot.entity.scratch.reset();

        slot.prev_free = -1;
        slot.next_free = first_free;

        if first_free >= 0 {
            self.slot_mut(first_free).prev_free = id.slot;
        }
        self.first_free = id.slot;
    }

    pub fn contains(&self, id: EntityId) -> bool {
        id.generation >= FIRST_GENERATION
            && (0..N as i32).contains(&id.slot)
            && self.slot(id.slot).generation == id.generation
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.contains(id).then(|| &self.slot(id.slot).entity)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        if !self.contains(id) {
            return None;
        }

        Some(&mut self.slot_mut(id.slot).entity)
    }

    /// Exclusive access to two distinct entities at once, for pairwise
    /// interactions.
    pub fn get2_mut(&mut self, a: EntityId, b: EntityId) -> Option<(&mut Entity, &mut Entity)> {
        debug_assert!(a.slot != b.slot, "pairwise access to one slot");
        if a.slot == b.slot || !self.contains(a) || !self.contains(b) {
            return None;
        }

        // SAFETY: distinct in-range slots, so the two borrows are disjoint
        unsafe {
            let a = &mut (*self.slots.as_ptr().add(a.slot as usize)).entity;
            let b = &mut (*self.slots.as_ptr().add(b.slot as usize)).entity;
            Some((a, b))
        }
    }

    fn slot(&self, index: i32) -> &EntitySlot {
        debug_assert!((0..N as i32).contains(&index));

        // SAFETY: index is in range and the table lives as long as self
        unsafe { &*self.slots.as_ptr().add(index as usize) }
    }

    fn slot_mut(&mut self, index: i32) -> &mut EntitySlot {
        debug_assert!((0..N as i32).contains(&index));

        // SAFETY: index is in range; &mut self gives exclusive access
        unsafe { &mut *self.slots.as_ptr().add(index as usize) }
    }
}

impl Entity {
    pub fn has(&self, kind: ComponentKind) -> bool {
        self.components.contains(kind)
    }

    pub fn has_all(&self, set: ComponentSet) -> bool {
        self.components.contains_all(set)
    }

    pub fn components(&self) -> ComponentSet {
        self.components
    }

    pub fn get<C: Component>(&self) -> Option<&C> {
        self.has(C::KIND).then(|| C::slot(self))
    }

    pub fn get_mut<C: Component>(&mut self) -> Option<&mut C> {
        self.has(C::KIND).then(|| C::slot_mut(self))
    }

    /// Attach a component, zeroing its storage. Adding a component twice
    /// is a caller bug.
    pub fn add<C: Component>(&mut self) -> &mut C {
        debug_assert!(!self.has(C::KIND), "component added twice");

        self.components.insert(C::KIND);
        let slot = C::slot_mut(self);
        *slot = C::default();

        slot
    }

    pub fn get_or_add<C: Component>(&mut self) -> &mut C {
        if !self.has(C::KIND) {
            return self.add::<C>();
        }

        C::slot_mut(self)
    }

    /// Detach a component. The storage keeps its bytes but becomes
    /// unobservable; re-adding zeroes it again.
    pub fn remove_component<C: Component>(&mut self) {
        debug_assert!(self.has(C::KIND), "removing an absent component");
        self.components.remove(C::KIND);
    }

    /// Mark for removal at end of frame. The store never acts on this by
    /// itself; the world sweeps flagged entities once per tick.
    pub fn schedule_for_removal(&mut self) {
        self.is_inactive = true;
    }

    pub fn is_inactive(&self) -> bool {
        self.is_inactive
    }

    pub fn faction(&self) -> Faction {
        self.faction
    }

    pub fn scratch(&self) -> &ScratchArena {
        &self.scratch
    }

    pub fn scratch_mut(&mut self) -> &mut ScratchArena {
        &mut self.scratch
    }
}
