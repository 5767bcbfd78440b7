//! The runtime substrate a 2D action game sits on.
//!
//! Things contained herein: arena allocators, a generational-id entity
//! store, a quadtree broadphase, and the frame-scoped tables that give
//! entity interactions their at-most-once-per-frame semantics.

#![no_std]

extern crate alloc as rust_alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod alloc;
pub mod geom;
pub mod ring;
pub mod world;
