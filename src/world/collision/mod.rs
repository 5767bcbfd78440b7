//! Frame-batched collision bookkeeping.
//!
//! Two structures give interactions their at-most-once-per-frame
//! semantics: the event table records which pairs touched in the
//! current and previous frame, and the cooldown table suppresses
//! triggerable interactions according to their retrigger policy.

mod cooldown;
mod events;

pub use cooldown::{Retrigger, TriggerCooldownTable};
pub use events::{CollisionEventTable, EntityPair};
