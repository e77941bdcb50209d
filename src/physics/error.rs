//! Error types for the physics core.

use thiserror::Error;

use super::{BodyHandle, ColliderHandle, ForceHandle};

/// Errors reported for API misuse at the world boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("rigid body not found: {0:?}")]
    BodyNotFound(BodyHandle),

    #[error("collider not found: {0:?}")]
    ColliderNotFound(ColliderHandle),

    #[error("force generator not found: {0:?}")]
    ForceNotFound(ForceHandle),

    #[error("invalid collider shape: {0}")]
    InvalidShape(String),

    #[error("invalid physics material: {0}")]
    InvalidMaterial(String),

    /// Edge endpoints supplied in 3D must lie in one plane of constant depth.
    #[error("edge endpoints must share the same depth (z = {start_z} vs {end_z})")]
    NonPlanarEdge { start_z: f32, end_z: f32 },
}

/// Result type for physics operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
