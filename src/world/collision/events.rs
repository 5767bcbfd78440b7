//! Frame-scoped collision event table.
//!
//! Records which unordered entity pairs touched this frame. Entries are
//! carved from a table-local linear arena and the buckets are relinked
//! from scratch each frame, so clearing is one arena reset plus a bucket
//! sweep. The world keeps two tables and swaps them at end of frame to
//! expose "this frame" and "previous frame".

use core::hash::{Hash, Hasher};
use core::ptr::NonNull;

use rustc_hash::FxHasher;

use crate::alloc::{FreeListArena, LinearArena};
use crate::world::entity::EntityId;

pub(crate) const TABLE_BUCKETS: usize = 512;

const _: () = assert!(TABLE_BUCKETS.is_power_of_two());

/// Node storage for one frame's worth of events; sized to hold two
/// tables' typical load before the arena has to chain.
const EVENT_ARENA_SIZE: usize = TABLE_BUCKETS * size_of::<EventNode>() * 2;

/// An unordered entity pair, canonicalized smaller-id-first so both
/// orderings hash and compare identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityPair {
    lo: EntityId,
    hi: EntityId,
}

impl EntityPair {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b { Self { lo: a, hi: b } } else { Self { lo: b, hi: a } }
    }

    fn hash(self) -> u64 {
        let mut hasher = FxHasher::default();
        self.lo.hash(&mut hasher);
        self.hi.hash(&mut hasher);
        hasher.finish()
    }

    fn bucket(self) -> usize {
        self.hash() as usize & (TABLE_BUCKETS - 1)
    }
}

struct EventNode {
    pair: EntityPair,
    next: Option<NonNull<EventNode>>,
}

#[derive(Clone, Copy)]
struct Bucket {
    head: Option<NonNull<EventNode>>,
    tail: Option<NonNull<EventNode>>,
}

impl Bucket {
    const EMPTY: Bucket = Bucket {
        head: None,
        tail: None,
    };
}

pub struct CollisionEventTable {
    buckets: NonNull<Bucket>,
    arena: LinearArena,
}

impl CollisionEventTable {
    /// Bucket array comes from the world arena; node storage is a
    /// private linear arena reset on every clear.
    pub(crate) fn new(world_arena: &mut FreeListArena) -> Self {
        let buckets = world_arena
            .alloc_array::<Bucket>(TABLE_BUCKETS)
            .expect("bucket array size cannot overflow");

        for i in 0..TABLE_BUCKETS {
            // SAFETY: the array holds TABLE_BUCKETS entries
            unsafe { buckets.add(i).write(Bucket::EMPTY) };
        }

        Self {
            buckets,
            arena: LinearArena::new(EVENT_ARENA_SIZE),
        }
    }

    pub fn contains(&self, a: EntityId, b: EntityId) -> bool {
        self.find(EntityPair::new(a, b)).is_some()
    }

    /// Record a pair. Inserting a pair that is already present is a
    /// caller bug; in release the duplicate is simply kept.
    pub(crate) fn insert(&mut self, a: EntityId, b: EntityId) {
        let pair = EntityPair::new(a, b);
        debug_assert!(self.find(pair).is_none(), "collision pair inserted twice");

        let node = self
            .arena
            .alloc_item::<EventNode>()
            .expect("a single event node allocation cannot overflow");

        // SAFETY: freshly allocated, sized and aligned for EventNode
        unsafe {
            node.write(EventNode { pair, next: None });
        }

        // SAFETY: the bucket index is in range and nodes are live arena
        // memory until the next clear
        unsafe {
            let bucket = &mut *self.buckets.as_ptr().add(pair.bucket());

            match bucket.tail {
                Some(tail) => (*tail.as_ptr()).next = Some(node),
                None => bucket.head = Some(node),
            }

            bucket.tail = Some(node);
        }
    }

    /// Drop every recorded pair: reset the node arena, empty the buckets.
    pub(crate) fn clear(&mut self) {
        self.arena.reset();

        for i in 0..TABLE_BUCKETS {
            // SAFETY: the array holds TABLE_BUCKETS entries
            unsafe { self.buckets.add(i).write(Bucket::EMPTY) };
        }
    }

    fn find(&self, pair: EntityPair) -> Option<NonNull<EventNode>> {
        // SAFETY: bucket index in range; linked nodes are live until the
        // next clear
        unsafe {
            let bucket = &*self.buckets.as_ptr().add(pair.bucket());

            let mut cursor = bucket.head;
            while let Some(node) = cursor {
                if node.as_ref().pair == pair {
                    return Some(node);
                }
                cursor = node.as_ref().next;
            }
        }

        None
    }
}
