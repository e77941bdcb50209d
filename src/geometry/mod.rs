//! 2D geometry primitives shared by the physics pipeline.
//!
//! Everything in here is plain data and pure functions: bounding boxes, poses and
//! the overlap tests the broad and narrow phases build on.

pub mod aabb;
pub mod intersect;
pub mod transform;

pub use aabb::Aabb;
pub use intersect::{circles_overlap, closest_point_on_segment};
pub use transform::{Rotation, Transform2d};
