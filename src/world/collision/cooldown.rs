//! Trigger cooldown table.
//!
//! A recorded interaction between two entities for one component kind,
//! suppressing that interaction until its retrigger policy lets go. The
//! key is the *ordered* (owner, other, kind) triple: the same pair seen
//! from the other side is an independent entry. Rows are carved from the
//! world arena and recycled through a free list.

use core::hash::{Hash, Hasher};
use core::ptr::NonNull;

use rustc_hash::FxHasher;

use crate::alloc::FreeListArena;
use crate::world::entity::{ComponentKind, EntityId, EntityStore};

use super::events::{CollisionEventTable, TABLE_BUCKETS};

/// When a recorded trigger may fire again.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Retrigger {
    /// Fires every frame; never recorded in the table at all.
    #[default]
    Whenever,
    /// Stays recorded while both participants live.
    Never,
    /// Dropped by the first tick in which the pair did not touch.
    AfterNonContact,
    /// Dropped once the carried seconds run out.
    AfterDuration(f32),
}

struct CooldownNode {
    next: Option<NonNull<CooldownNode>>,
    prev: Option<NonNull<CooldownNode>>,
    owner: EntityId,
    other: EntityId,
    kind: ComponentKind,
    retrigger: Retrigger,
}

#[derive(Clone, Copy)]
struct Bucket {
    head: Option<NonNull<CooldownNode>>,
    tail: Option<NonNull<CooldownNode>>,
}

impl Bucket {
    const EMPTY: Bucket = Bucket {
        head: None,
        tail: None,
    };
}

pub struct TriggerCooldownTable {
    buckets: NonNull<Bucket>,
    free_head: Option<NonNull<CooldownNode>>,
}

fn bucket_index(owner: EntityId, other: EntityId, kind: ComponentKind) -> usize {
    let mut hasher = FxHasher::default();
    owner.hash(&mut hasher);
    other.hash(&mut hasher);
    kind.hash(&mut hasher);

    hasher.finish() as usize & (TABLE_BUCKETS - 1)
}

impl TriggerCooldownTable {
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
            free_head: None,
        }
    }

    pub fn is_on_cooldown(&self, owner: EntityId, other: EntityId, kind: ComponentKind) -> bool {
        self.find(owner, other, kind).is_some()
    }

    /// Record a cooldown row. `Whenever` never records; an existing row
    /// for the triple is left untouched.
    pub(crate) fn add(
        &mut self,
        owner: EntityId,
        other: EntityId,
        kind: ComponentKind,
        retrigger: Retrigger,
        world_arena: &mut FreeListArena,
    ) {
        debug_assert!(owner != other, "an entity cannot trigger against itself");

        if retrigger == Retrigger::Whenever {
            return;
        }

        if self.find(owner, other, kind).is_some() {
            return;
        }

        let node = match self.free_head {
            Some(recycled) => {
                // SAFETY: free-listed nodes are live, detached rows
                self.free_head = unsafe { recycled.as_ref() }.next;
                recycled
            }
            None => world_arena
                .alloc_item::<CooldownNode>()
                .expect("a single cooldown row allocation cannot overflow"),
        };

        // SAFETY: node is detached and exclusively ours
        unsafe {
            node.write(CooldownNode {
                next: None,
                prev: None,
                owner,
                other,
                kind,
                retrigger,
            });
        }

        // SAFETY: bucket index in range; rows are live until recycled
        unsafe {
            let bucket = &mut *self.buckets.as_ptr().add(bucket_index(owner, other, kind));

            let mut node = node;
            node.as_mut().prev = bucket.tail;

            match bucket.tail {
                Some(tail) => (*tail.as_ptr()).next = Some(node),
                None => bucket.head = Some(node),
            }

            bucket.tail = Some(node);
        }
    }

    /// Advance every row by `dt` and drop the ones whose policy allows
    /// it: a dead or inactive participant always releases the row;
    /// `AfterNonContact` releases on the first frame without touch;
    /// `AfterDuration` releases once its clock runs out.
    pub(crate) fn tick<const N: usize>(
        &mut self,
        dt: f32,
        entities: &EntityStore<N>,
        current_frame: &CollisionEventTable,
    ) {
        for i in 0..TABLE_BUCKETS {
            // SAFETY: bucket index in range; rows and links are live
            unsafe {
                let mut cursor = (*self.buckets.as_ptr().add(i)).head;

                while let Some(mut node) = cursor {
                    let next = node.as_ref().next;

                    if let Retrigger::AfterDuration(remaining) = &mut node.as_mut().retrigger {
                        *remaining -= dt;
                    }

                    let row = node.as_ref();
                    debug_assert!(
                        row.retrigger != Retrigger::Whenever,
                        "a fire-whenever trigger must never be recorded"
                    );

                    let participant_gone = |id: EntityId| {
                        entities.get(id).is_none_or(|entity| entity.is_inactive())
                    };

                    let should_remove = participant_gone(row.owner)
                        || participant_gone(row.other)
                        || match row.retrigger {
                            Retrigger::Whenever | Retrigger::Never => false,
                            Retrigger::AfterNonContact => {
                                !current_frame.contains(row.owner, row.other)
                            }
                            Retrigger::AfterDuration(remaining) => remaining <= 0.0,
                        };

                    if should_remove {
                        self.unlink(i, node);

                        node.as_mut().prev = None;
                        node.as_mut().next = self.free_head;
                        self.free_head = Some(node);
                    }

                    cursor = next;
                }
            }
        }
    }

    fn find(
        &self,
        owner: EntityId,
        other: EntityId,
        kind: ComponentKind,
    ) -> Option<NonNull<CooldownNode>> {
        // SAFETY: bucket index in range; rows are live until recycled
        unsafe {
            let bucket = &*self.buckets.as_ptr().add(bucket_index(owner, other, kind));

            let mut cursor = bucket.head;
            while let Some(node) = cursor {
                let row = node.as_ref();
                if row.owner == owner && row.other == other && row.kind == kind {
                    return Some(node);
                }

                cursor = row.next;
            }
        }

        None
    }

    /// # Safety
    ///
    /// `node` must be linked into bucket `index`.
    unsafe fn unlink(&mut self, index: usize, node: NonNull<CooldownNode>) {
        // SAFETY: forwarded caller contract
        unsafe {
            let bucket = &mut *self.buckets.as_ptr().add(index);
            let next = node.as_ref().next;
            let prev = node.as_ref().prev;

            match prev {
                Some(mut prev) => prev.as_mut().next = next,
                None => bucket.head = next,
            }

            match next {
                Some(mut next) => next.as_mut().prev = prev,
                None => bucket.tail = prev,
            }
        }
    }
}
