//! The closed set of component kinds and the registry derived from it.
//!
//! `components!` is invoked exactly once: it generates the kind enum,
//! the bitset weights, the inline storage fields of [`Entity`], and a
//! [`Component`] impl per type so store-level access is a generic `O(1)`
//! field projection. Presence is governed solely by the bitset; a
//! cleared bit leaves the field untouched but unobservable.

use crate::geom::Vec2;
use crate::world::collision::Retrigger;
use crate::world::entity::scratch::ScratchArena;

/// A component type with a fixed slot in every entity.
pub trait Component: Default + Sized {
    const KIND: ComponentKind;

    #[doc(hidden)]
    fn slot(entity: &Entity) -> &Self;

    #[doc(hidden)]
    fn slot_mut(entity: &mut Entity) -> &mut Self;
}

/// Set of component kinds, one bit per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentSet(u64);

impl ComponentSet {
    pub const EMPTY: ComponentSet = ComponentSet(0);

    pub const fn of(kind: ComponentKind) -> Self {
        Self(kind.bit())
    }

    pub const fn with(self, kind: ComponentKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub fn insert(&mut self, kind: ComponentKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: ComponentKind) {
        self.0 &= !kind.bit();
    }

    pub const fn contains(self, kind: ComponentKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub const fn contains_all(self, other: ComponentSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Which side of the fence an entity stands on. Triggerable interactions
/// only fire across factions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Faction {
    #[default]
    Neutral,
    Player,
    Enemy,
}

macro_rules! components {
    ($( $kind:ident => $field:ident: $ty:ty ),+ $(,)?) => {
        /// Every component kind an entity can carry. Closed set, matched
        /// exhaustively wherever kinds are dispatched on.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum ComponentKind {
            $($kind),+
        }

        impl ComponentKind {
            pub const COUNT: usize = [$(ComponentKind::$kind),+].len();

            /// Bitset weight of this kind.
            pub const fn bit(self) -> u64 {
                1u64 << (self as u32)
            }

            /// Byte size of the kind's inline storage.
            pub const fn storage_size(self) -> usize {
                match self {
                    $(ComponentKind::$kind => size_of::<$ty>()),+
                }
            }
        }

        const _: () = assert!(ComponentKind::COUNT <= 64, "component bitset is a u64");

        /// One record per live entity: bookkeeping plus inline storage
        /// for every component kind.
        #[derive(Debug, Default)]
        pub struct Entity {
            pub(crate) components: ComponentSet,
            pub(crate) is_inactive: bool,
            pub(crate) faction: Faction,
            pub position: Vec2,
            pub velocity: Vec2,
            pub(crate) scratch: ScratchArena,
            $( pub(crate) $field: $ty, )+
        }

        $(
            impl Component for $ty {
                const KIND: ComponentKind = ComponentKind::$kind;

                #[inline]
                fn slot(entity: &Entity) -> &Self {
                    &entity.$field
                }

                #[inline]
                fn slot_mut(entity: &mut Entity) -> &mut Self {
                    &mut entity.$field
                }
            }
        )+
    };
}

components! {
    Collider => collider: Collider,
    Health => health: Health,
    Lifetime => lifetime: Lifetime,
    DamageField => damage_field: DamageField,
    Stats => stats: Stats,
}

/// Axis-aligned collision box, anchored at the entity position.
#[derive(Debug, Clone, Copy, Default)]
pub struct Collider {
    pub size: Vec2,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Health {
    pub hitpoints: f32,
}

/// Entities with a lifetime are scheduled for removal when it runs out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lifetime {
    pub time_to_live: f32,
}

/// Damages hostile entities it overlaps, subject to its retrigger
/// policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DamageField {
    pub damage: f32,
    pub retrigger: Retrigger,
}

/// Flat damage reduction applied before hitpoints are touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub armor: f32,
}
