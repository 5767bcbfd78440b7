//! The world: one arena, everything in it.
//!
//! Composes the entity store, the quadtree broadphase, and the
//! collision/cooldown tables over a single dedicated free-list arena.
//! All per-world state is carved from that arena and released with it;
//! cross-references between the pieces are handles, never pointers.

use core::ptr::NonNull;

use log::{debug, trace};

use crate::alloc::{FreeListArena, LinearArena};
use crate::geom::{Rect, Vec2};

pub mod collision;
pub mod entity;
pub mod spatial;


use collision::{CollisionEventTable, Retrigger, TriggerCooldownTable};
use entity::{Collider, ComponentKind, DamageField, Entity, EntityId, EntityStore, Faction, Health,
    Lifetime, Stats};
use spatial::{EntityIdList, QuadTree, QuadTreeLocation};

pub const MAX_ENTITIES: usize = 1024;

/// Entities with no collider still occupy a minimal bounding box in the
/// broadphase.
const MIN_BOUNDS: f32 = 4.0;

pub struct World {
    arena: FreeListArena,
    entities: EntityStore<MAX_ENTITIES>,
    quad_tree: QuadTree,
    trigger_cooldowns: TriggerCooldownTable,
    current_frame_collisions: CollisionEventTable,
    previous_frame_collisions: CollisionEventTable,
    alive_ids: NonNull<EntityId>,
    alive_locations: NonNull<Option<QuadTreeLocation>>,
    alive_count: usize,
}

impl World {
    /// Build a world covering `region`, with all long-lived state inside
    /// a dedicated arena of `arena_capacity` bytes.
    ///
    /// Hosts that carve worlds out of a larger arena conventionally give
    /// each world at least a quarter of it; the arena chains further
    /// buffers on demand either way.
    pub fn new(region: Rect, arena_capacity: usize) -> Self {
        let mut arena = FreeListArena::new(arena_capacity);

        let entities = EntityStore::new(&mut arena);
        let quad_tree = QuadTree::new(region, &mut arena);
        let trigger_cooldowns = TriggerCooldownTable::new(&mut arena);
        let current_frame_collisions = CollisionEventTable::new(&mut arena);
        let previous_frame_collisions = CollisionEventTable::new(&mut arena);

        let alive_ids = arena
            .alloc_array::<EntityId>(MAX_ENTITIES)
            .expect("alive id array size cannot overflow");
        let alive_locations = arena
            .alloc_array::<Option<QuadTreeLocation>>(MAX_ENTITIES)
            .expect("alive location array size cannot overflow");

        for i in 0..MAX_ENTITIES {
            // SAFETY: both arrays hold MAX_ENTITIES entries
            unsafe {
                alive_ids.add(i).write(EntityId::default());
                alive_locations.add(i).write(None);
            }
        }

        debug!("world created: region {region:?}, arena capacity {arena_capacity}");

        Self {
            arena,
            entities,
            quad_tree,
            trigger_cooldowns,
            current_frame_collisions,
            previous_frame_collisions,
            alive_ids,
            alive_locations,
            alive_count: 0,
        }
    }

    /// Spawn a fresh entity into the alive set. It enters the broadphase
    /// on the next tick.
    pub fn spawn(&mut self, faction: Faction) -> EntityId {
        assert!(self.alive_count < MAX_ENTITIES, "world is full");

        let (id, _) = self.entities.create(faction);

        // SAFETY: alive_count < MAX_ENTITIES, so the slot exists
        unsafe {
            self.alive_ids.add(self.alive_count).write(id);
            self.alive_locations.add(self.alive_count).write(None);
        }
        self.alive_count += 1;

        trace!("spawned entity {id:?} ({faction:?})");

        id
    }

    /// Schedule an entity for removal at end of frame.
    pub fn kill(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get_mut(id) {
            entity.schedule_for_removal();
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Broadphase query over the world's quadtree; the result list lives
    /// in `scratch`.
    pub fn entities_in_area<'s>(
        &self,
        area: Rect,
        scratch: &'s mut LinearArena,
    ) -> EntityIdList<'s> {
        self.quad_tree.entities_in_area(area, scratch)
    }

    pub fn entities_intersected_this_frame(&self, a: EntityId, b: EntityId) -> bool {
        self.current_frame_collisions.contains(a, b)
    }

    pub fn entities_intersected_previous_frame(&self, a: EntityId, b: EntityId) -> bool {
        self.previous_frame_collisions.contains(a, b)
    }

    pub fn trigger_is_on_cooldown(
        &self,
        owner: EntityId,
        other: EntityId,
        kind: ComponentKind,
    ) -> bool {
        self.trigger_cooldowns.is_on_cooldown(owner, other, kind)
    }

    /// Record a cooldown for a triggerable interaction the host fired
    /// itself.
    pub fn add_trigger_cooldown(
        &mut self,
        owner: EntityId,
        other: EntityId,
        kind: ComponentKind,
        retrigger: Retrigger,
    ) {
        self.trigger_cooldowns
            .add(owner, other, kind, retrigger, &mut self.arena);
    }

    /// Advance the world by one frame. `scratch` is the frame arena: the
    /// tick allocates broadphase results from it and nothing allocated
    /// there survives the caller's reset.
    pub fn update(&mut self, dt: f32, scratch: &mut LinearArena) {
        for i in 0..self.alive_count {
            self.update_entity(i, dt);
        }

        self.collision_pass(dt, scratch);

        self.trigger_cooldowns
            .tick(dt, &self.entities, &self.current_frame_collisions);

        self.remove_inactive();

        core::mem::swap(
            &mut self.current_frame_collisions,
            &mut self.previous_frame_collisions,
        );
        self.current_frame_collisions.clear();
    }

    // ------------------------------------------------------------------
    // Tick phases
    // ------------------------------------------------------------------

    fn update_entity(&mut self, alive_index: usize, dt: f32) {
        let id = self.alive_id(alive_index);
        let entity = self
            .entities
            .get_mut(id)
            .expect("alive ids stay valid until the end-of-frame sweep");

        entity.position += entity.velocity * dt;

        let mut dead = false;

        if let Some(lifetime) = entity.get_mut::<Lifetime>() {
            lifetime.time_to_live -= dt;
            dead |= lifetime.time_to_live <= 0.0;
        }

        if let Some(health) = entity.get::<Health>() {
            dead |= health.hitpoints <= 0.0;
        }

        if dead {
            entity.schedule_for_removal();
        }

        let bounds = Self::entity_bounds(entity);
        let old_location = self.alive_location(alive_index);
        let new_location = self
            .quad_tree
            .set_entity_area(id, old_location, bounds, &mut self.arena);

        self.set_alive_location(alive_index, Some(new_location));
    }

    fn collision_pass(&mut self, dt: f32, scratch: &mut LinearArena) {
        for i in 0..self.alive_count {
            let id_a = self.alive_id(i);
            let Some(a) = self.entities.get(id_a) else {
                continue;
            };
            let Some(collider_a) = a.get::<Collider>().copied() else {
                continue;
            };

            let rect_a = Rect::new(a.position, collider_a.size);
            let query_area = rect_a.swept_by(a.velocity * dt);

            let hits = self.quad_tree.entities_in_area(query_area, scratch);

            for id_b in hits.iter() {
                if id_b == id_a {
                    continue;
                }

                let Some(b) = self.entities.get(id_b) else {
                    continue;
                };
                let Some(collider_b) = b.get::<Collider>().copied() else {
                    continue;
                };

                if !rect_a.intersects(Rect::new(b.position, collider_b.size)) {
                    continue;
                }

                // Later encounters of the pair this frame find it
                // recorded and skip; the exchange runs once per frame,
                // once in each direction.
                if self.current_frame_collisions.contains(id_a, id_b) {
                    continue;
                }

                self.run_trigger_exchange(id_a, id_b);
                self.run_trigger_exchange(id_b, id_a);

                self.current_frame_collisions.insert(id_a, id_b);
            }
        }
    }

    /// One direction of a contact: the owner's damage field against the
    /// other entity, gated by faction and the cooldown table.
    fn run_trigger_exchange(&mut self, owner_id: EntityId, other_id: EntityId) {
        let Some((owner, other)) = self.entities.get2_mut(owner_id, other_id) else {
            return;
        };

        if owner.faction() == other.faction() {
            return;
        }

        let Some(field) = owner.get::<DamageField>().copied() else {
            return;
        };

        if self
            .trigger_cooldowns
            .is_on_cooldown(owner_id, other_id, ComponentKind::DamageField)
        {
            return;
        }

        let armor = other.get::<Stats>().map_or(0.0, |stats| stats.armor);
        if let Some(health) = other.get_mut::<Health>() {
            health.hitpoints -= (field.damage - armor).max(0.0);
        }

        self.trigger_cooldowns.add(
            owner_id,
            other_id,
            ComponentKind::DamageField,
            field.retrigger,
            &mut self.arena,
        );
    }

    fn remove_inactive(&mut self) {
        let mut i = 0;

        while i < self.alive_count {
            let id = self.alive_id(i);
            let inactive = self
                .entities
                .get(id)
                .is_none_or(|entity| entity.is_inactive());

            if !inactive {
                i += 1;
                continue;
            }

            if let Some(location) = self.alive_location(i) {
                self.quad_tree.remove(id, location);
            }

            // releases the slot, bumps the generation, resets the
            // entity's scratch arena
            self.entities.remove(id);
            trace!("removed entity {id:?}");

            let last = self.alive_count - 1;

            // SAFETY: i <= last < MAX_ENTITIES; plain swap-remove
            unsafe {
                let ids = self.alive_ids.as_ptr();
                ids.add(i).write(ids.add(last).read());

                let locations = self.alive_locations.as_ptr();
                locations.add(i).write(locations.add(last).read());
            }

            self.alive_count = last;
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn entity_bounds(entity: &Entity) -> Rect {
        let mut size = Vec2::new(MIN_BOUNDS, MIN_BOUNDS);

        if let Some(collider) = entity.get::<Collider>() {
            size = size.max(collider.size);
        }

        Rect::new(entity.position, size)
    }

    fn alive_id(&self, index: usize) -> EntityId {
        debug_assert!(index < self.alive_count);

        // SAFETY: index < alive_count <= MAX_ENTITIES and the slot was
        // written by spawn
        unsafe { self.alive_ids.add(index).read() }
    }

    fn alive_location(&self, index: usize) -> Option<QuadTreeLocation> {
        debug_assert!(index < self.alive_count);

        // SAFETY: as in alive_id
        unsafe { self.alive_locations.add(index).read() }
    }

    fn set_alive_location(&mut self, index: usize, location: Option<QuadTreeLocation>) {
        debug_assert!(index < self.alive_count);

        // SAFETY: as in alive_id
        unsafe { self.alive_locations.add(index).write(location) }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        // the arena drop returns every buffer to the parent; handles into
        // it die with the world
        debug!("world destroyed with {} entities alive", self.alive_count);
    }
}
