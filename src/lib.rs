//! Rein 2D physics core
//!
//! A 2D rigid-body simulation library: dynamic AABB tree broad phase, contact
//! manifolds for boxes, circles and edges, and an iterative sequential-impulse
//! solver with warm starting and island sleeping.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **geometry** - Plain 2D primitives (AABBs, rotations, poses, overlap tests)
//! 2. **physics** - Bodies, colliders, broad/narrow phase, solver and the
//!    [`PhysicsWorld`] that drives them
//!
//! ```
//! use rein2d::{BodyDef, ColliderDef, PhysicsWorld, Shape};
//! use rein2d::glam::Vec2;
//!
//! let mut world = PhysicsWorld::default();
//! let ground = world.create_body(&BodyDef::new_static());
//! world.add_collider(Some(ground), &ColliderDef::new(Shape::cuboid(10.0, 0.5))).unwrap();
//!
//! let ball = world.create_body(&BodyDef::new_dynamic().with_position(Vec2::new(0.0, 4.0)));
//! world.add_collider(Some(ball), &ColliderDef::new(Shape::circle(0.5))).unwrap();
//!
//! for _ in 0..60 {
//!     world.update(1.0 / 60.0);
//! }
//! assert!(world.body(ball).unwrap().position().y < 4.0);
//! ```

pub mod geometry;
pub mod physics;

// Re-export commonly used types
pub use geometry::{Aabb, Rotation, Transform2d};

pub use physics::{
    BodyDef, BodyHandle, BodyType, Collider, ColliderDef, ColliderHandle, CollisionFilter,
    ContactEvent, ContactInfo, ContactKey, ContactListener, ForceGenerator, ForceHandle,
    PhysicsConfig, PhysicsError, PhysicsMaterial, PhysicsWorld, RigidBody, Shape,
};

// Re-export glam for convenience
pub use glam;
