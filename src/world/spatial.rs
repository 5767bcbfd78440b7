//! Point-region quadtree broadphase.
//!
//! Nodes subdivide lazily to a fixed depth; an entry lives at the
//! smallest descendant whose region fully contains its AABB, so entries
//! straddling a split line stay at the nearest fully-containing
//! ancestor. Nodes and elements are carved from the world arena;
//! detached elements are recycled through a per-tree free list rather
//! than going back to the allocator.

use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::alloc::{FreeListArena, LinearArena};
use crate::geom::{Rect, Vec2};
use crate::world::entity::EntityId;

pub const MAX_DEPTH: usize = 4;

struct Node {
    region: Rect,
    top_left: Option<NonNull<Node>>,
    top_right: Option<NonNull<Node>>,
    bottom_right: Option<NonNull<Node>>,
    bottom_left: Option<NonNull<Node>>,
    head: Option<NonNull<Element>>,
    tail: Option<NonNull<Element>>,
}

struct Element {
    next: Option<NonNull<Element>>,
    prev: Option<NonNull<Element>>,
    id: EntityId,
    area: Rect,
}

/// Opaque handle returned from every insert; required input to move and
/// remove, invalidated by the next of either on the same id.
#[derive(Clone, Copy)]
pub struct QuadTreeLocation {
    node: NonNull<Node>,
    element: NonNull<Element>,
}

pub struct QuadTree {
    root: NonNull<Node>,
    free_head: Option<NonNull<Element>>,
}

impl QuadTree {
    /// Build a tree covering `region`, with its root carved from
    /// `arena`. The tree must not outlive the arena; the world owns
    /// both.
    pub fn new(region: Rect, arena: &mut FreeListArena) -> Self {
        let root = Self::alloc_node(region, arena);

        Self {
            root,
            free_head: None,
        }
    }

    /// Index `id` under `area`. The tree region must fully contain
    /// `area`; zero or negative extents are caller bugs.
    pub fn insert(
        &mut self,
        id: EntityId,
        area: Rect,
        arena: &mut FreeListArena,
    ) -> QuadTreeLocation {
        debug_assert!(area.size.x > 0.0 && area.size.y > 0.0);

        self.insert_at(self.root, id, area, 0, arena)
    }

    /// Re-index `id` under a new area: detach the old location when
    /// there is one, then insert from the root.
    pub fn set_entity_area(
        &mut self,
        id: EntityId,
        location: Option<QuadTreeLocation>,
        area: Rect,
        arena: &mut FreeListArena,
    ) -> QuadTreeLocation {
        if let Some(location) = location {
            self.remove(id, location);
        }

        self.insert(id, area, arena)
    }

    /// Re-index `id` at a new position, keeping its stored size.
    pub fn move_entity(
        &mut self,
        id: EntityId,
        location: QuadTreeLocation,
        new_position: Vec2,
        arena: &mut FreeListArena,
    ) -> QuadTreeLocation {
        // SAFETY: locations are only handed out for live elements and
        // stay valid until the next set_entity_area/move/remove
        let size = unsafe { location.element.as_ref() }.area.size;

        self.set_entity_area(id, Some(location), Rect::new(new_position, size), arena)
    }

    /// Detach `id` from the tree and recycle its element.
    pub fn remove(&mut self, id: EntityId, location: QuadTreeLocation) {
        // SAFETY: see move_entity; the location's node and element are
        // live tree memory
        unsafe {
            debug_assert!(location.element.as_ref().id == id, "location does not match id");

            Self::unlink(location.node, location.element);

            // recycle through the free list, linked by `next` only
            let mut element = location.element;
            element.as_mut().prev = None;
            element.as_mut().next = self.free_head;
            self.free_head = Some(element);
        }
    }

    /// Collect the ids of all entries whose AABB intersects `area` into
    /// a list carved from `scratch`. Entries at a node are yielded in
    /// insertion order.
    pub fn entities_in_area<'s>(
        &self,
        area: Rect,
        scratch: &'s mut LinearArena,
    ) -> EntityIdList<'s> {
        let mut list = EntityIdList {
            head: None,
            tail: None,
            _scratch: PhantomData,
        };

        Self::collect(Some(self.root), area, scratch, &mut list);

        list
    }

    /// Nodes currently materialized, the root included.
    pub fn node_count(&self) -> usize {
        Self::count_nodes(Some(self.root))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn alloc_node(region: Rect, arena: &mut FreeListArena) -> NonNull<Node> {
        let node = arena
            .alloc_item::<Node>()
            .expect("a single node allocation cannot overflow");

        // SAFETY: freshly allocated, sized and aligned for Node
        unsafe {
            node.write(Node {
                region,
                top_left: None,
                top_right: None,
                bottom_right: None,
                bottom_left: None,
                head: None,
                tail: None,
            });
        }

        node
    }

    fn insert_at(
        &mut self,
        node: NonNull<Node>,
        id: EntityId,
        area: Rect,
        depth: usize,
        arena: &mut FreeListArena,
    ) -> QuadTreeLocation {
        // SAFETY: tree nodes are live until the world arena is released
        let region = unsafe { node.as_ref() }.region;
        debug_assert!(region.intersects(area));

        if depth < MAX_DEPTH - 1 {
            let quadrants = region.quadrants();

            // fixed probe order: tl, tr, br, bl
            let target = if quadrants.top_left.contains_rect(area) {
                Some(quadrants.top_left)
            } else if quadrants.top_right.contains_rect(area) {
                Some(quadrants.top_right)
            } else if quadrants.bottom_right.contains_rect(area) {
                Some(quadrants.bottom_right)
            } else if quadrants.bottom_left.contains_rect(area) {
                Some(quadrants.bottom_left)
            } else {
                None
            };

            if let Some(target) = target {
                let child = self.child_for(node, target, arena);
                return self.insert_at(child, id, area, depth + 1, arena);
            }
        }

        // no child fully contains the area (or max depth): it lives here
        let element = self.alloc_element(id, area, arena);

        // SAFETY: node and element are live; push_back only touches them
        unsafe {
            Self::push_back(node, element);
        }

        QuadTreeLocation { node, element }
    }

    /// Child of `node` covering `quadrant`, subdividing lazily on first
    /// descent.
    fn child_for(
        &mut self,
        mut node: NonNull<Node>,
        quadrant: Rect,
        arena: &mut FreeListArena,
    ) -> NonNull<Node> {
        // SAFETY: tree nodes are live; subdividing writes fresh children
        unsafe {
            if node.as_ref().top_left.is_none() {
                let quadrants = node.as_ref().region.quadrants();

                node.as_mut().top_left = Some(Self::alloc_node(quadrants.top_left, arena));
                node.as_mut().top_right = Some(Self::alloc_node(quadrants.top_right, arena));
                node.as_mut().bottom_right = Some(Self::alloc_node(quadrants.bottom_right, arena));
                node.as_mut().bottom_left = Some(Self::alloc_node(quadrants.bottom_left, arena));
            }

            let node = node.as_ref();
            for child in [
                node.top_left,
                node.top_right,
                node.bottom_right,
                node.bottom_left,
            ] {
                let child = child.expect("all four children exist after subdivision");
                if child.as_ref().region == quadrant {
                    return child;
                }
            }

            unreachable!("quadrant is one of the node's four subdivisions")
        }
    }

    fn alloc_element(
        &mut self,
        id: EntityId,
        area: Rect,
        arena: &mut FreeListArena,
    ) -> NonNull<Element> {
        let element = match self.free_head {
            Some(recycled) => {
                // SAFETY: free-listed elements are live, detached tree memory
                self.free_head = unsafe { recycled.as_ref() }.next;
                recycled
            }
            None => arena
                .alloc_item::<Element>()
                .expect("a single element allocation cannot overflow"),
        };

        // SAFETY: element is detached and exclusively ours
        unsafe {
            element.write(Element {
                next: None,
                prev: None,
                id,
                area,
            });
        }

        element
    }

    /// # Safety
    ///
    /// `node` and `element` must be live; `element` must be detached.
    unsafe fn push_back(node: NonNull<Node>, mut element: NonNull<Element>) {
        // SAFETY: forwarded caller contract
        unsafe {
            let node = &mut *node.as_ptr();
            element.as_mut().prev = node.tail;
            element.as_mut().next = None;

            match node.tail {
                Some(mut tail) => tail.as_mut().next = Some(element),
                None => node.head = Some(element),
            }

            node.tail = Some(element);
        }
    }

    /// # Safety
    ///
    /// `element` must be linked into `node`'s element list.
    unsafe fn unlink(node: NonNull<Node>, element: NonNull<Element>) {
        // SAFETY: forwarded caller contract
        unsafe {
            let node = &mut *node.as_ptr();
            let next = element.as_ref().next;
            let prev = element.as_ref().prev;

            match prev {
                Some(mut prev) => prev.as_mut().next = next,
                None => node.head = next,
            }

            match next {
                Some(mut next) => next.as_mut().prev = prev,
                None => node.tail = prev,
            }
        }
    }

    fn collect(
        node: Option<NonNull<Node>>,
        area: Rect,
        scratch: &mut LinearArena,
        list: &mut EntityIdList<'_>,
    ) {
        let Some(node) = node else {
            return;
        };

        // SAFETY: tree nodes and their element lists are live
        let node = unsafe { node.as_ref() };

        if !node.region.intersects(area) {
            return;
        }

        let mut cursor = node.head;
        while let Some(element) = cursor {
            // SAFETY: linked elements are live
            let element = unsafe { element.as_ref() };

            if element.area.intersects(area) {
                list.push(element.id, scratch);
            }

            cursor = element.next;
        }

        Self::collect(node.top_left, area, scratch, list);
        Self::collect(node.top_right, area, scratch, list);
        Self::collect(node.bottom_right, area, scratch, list);
        Self::collect(node.bottom_left, area, scratch, list);
    }

    fn count_nodes(node: Option<NonNull<Node>>) -> usize {
        let Some(node) = node else {
            return 0;
        };

        // SAFETY: tree nodes are live
        let node = unsafe { node.as_ref() };

        1 + Self::count_nodes(node.top_left)
            + Self::count_nodes(node.top_right)
            + Self::count_nodes(node.bottom_right)
            + Self::count_nodes(node.bottom_left)
    }
}

struct IdNode {
    id: EntityId,
    next: Option<NonNull<IdNode>>,
}

/// Query result: ids linked through scratch-arena nodes. Borrows the
/// scratch arena, so it cannot outlive a reset.
pub struct EntityIdList<'s> {
    head: Option<NonNull<IdNode>>,
    tail: Option<NonNull<IdNode>>,
    _scratch: PhantomData<&'s ()>,
}

impl<'s> EntityIdList<'s> {
    fn push(&mut self, id: EntityId, scratch: &mut LinearArena) {
        let node = scratch
            .alloc_item::<IdNode>()
            .expect("a single id node allocation cannot overflow");

        // SAFETY: freshly allocated, sized and aligned for IdNode
        unsafe {
            node.write(IdNode { id, next: None });
        }

        match self.tail {
            // SAFETY: list nodes are live scratch memory
            Some(tail) => unsafe { (*tail.as_ptr()).next = Some(node) },
            None => self.head = Some(node),
        }

        self.tail = Some(node);
    }

    pub fn iter(&self) -> EntityIdIter<'_> {
        EntityIdIter {
            cursor: self.head,
            _list: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.iter().any(|candidate| candidate == id)
    }
}

pub struct EntityIdIter<'l> {
    cursor: Option<NonNull<IdNode>>,
    _list: PhantomData<&'l ()>,
}

impl Iterator for EntityIdIter<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let node = self.cursor?;

        // SAFETY: list nodes live in the scratch arena the list borrows
        let node = unsafe { node.as_ref() };
        self.cursor = node.next;

        Some(node.id)
    }
}
