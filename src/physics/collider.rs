//! Collider shapes, surface materials and collision filtering.

use glam::{Vec2, Vec3};

use crate::geometry::{Aabb, Transform2d};

use super::bvh::ProxyId;
use super::error::{PhysicsError, Result};
use super::BodyHandle;

/// Discriminant used to index the contact dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Circle = 0,
    Box = 1,
    Edge = 2,
}

impl ShapeType {
    pub const COUNT: usize = 3;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Collider geometry in body-local coordinates.
///
/// Free-floating colliders (not attached to a body) interpret these coordinates
/// as world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Box { center: Vec2, half_extents: Vec2 },
    Circle { center: Vec2, radius: f32 },
    Edge { start: Vec2, end: Vec2 },
}

/// Mass, centroid and rotational inertia of a shape.
///
/// `inertia` is taken about the body origin, so contributions can be summed
/// before shifting to the combined center of mass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassProperties {
    pub mass: f32,
    pub center: Vec2,
    pub inertia: f32,
}

impl Shape {
    /// Box centered on the body origin.
    pub fn cuboid(half_width: f32, half_height: f32) -> Self {
        Shape::Box {
            center: Vec2::ZERO,
            half_extents: Vec2::new(half_width, half_height),
        }
    }

    /// Circle centered on the body origin.
    pub fn circle(radius: f32) -> Self {
        Shape::Circle {
            center: Vec2::ZERO,
            radius,
        }
    }

    pub fn edge(start: Vec2, end: Vec2) -> Self {
        Shape::Edge { start, end }
    }

    /// Build an edge from 3D endpoints, which must lie at the same depth.
    pub fn edge_from_points(start: Vec3, end: Vec3) -> Result<Self> {
        if start.z != end.z {
            return Err(PhysicsError::NonPlanarEdge {
                start_z: start.z,
                end_z: end.z,
            });
        }
        Ok(Shape::Edge {
            start: start.truncate(),
            end: end.truncate(),
        })
    }

    #[inline]
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Box { .. } => ShapeType::Box,
            Shape::Circle { .. } => ShapeType::Circle,
            Shape::Edge { .. } => ShapeType::Edge,
        }
    }

    /// Reject degenerate or non-finite geometry.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Shape::Box {
                center,
                half_extents,
            } => {
                if !center.is_finite() || !half_extents.is_finite() {
                    return Err(PhysicsError::InvalidShape("box is not finite".into()));
                }
                if half_extents.x <= 0.0 || half_extents.y <= 0.0 {
                    return Err(PhysicsError::InvalidShape(format!(
                        "box half extents must be positive, got {half_extents}"
                    )));
                }
            }
            Shape::Circle { center, radius } => {
                if !center.is_finite() || !radius.is_finite() || radius <= 0.0 {
                    return Err(PhysicsError::InvalidShape(format!(
                        "circle radius must be positive and finite, got {radius}"
                    )));
                }
            }
            Shape::Edge { start, end } => {
                if !start.is_finite() || !end.is_finite() {
                    return Err(PhysicsError::InvalidShape("edge is not finite".into()));
                }
                if start.distance_squared(end) <= f32::EPSILON {
                    return Err(PhysicsError::InvalidShape("edge has zero length".into()));
                }
            }
        }
        Ok(())
    }

    /// Local centroid of the shape.
    pub fn centroid(&self) -> Vec2 {
        match *self {
            Shape::Box { center, .. } => center,
            Shape::Circle { center, .. } => center,
            Shape::Edge { start, end } => (start + end) * 0.5,
        }
    }

    /// Compute the world-space AABB for this shape.
    pub fn compute_aabb(&self, xf: &Transform2d) -> Aabb {
        match *self {
            Shape::Box {
                center,
                half_extents,
            } => {
                let c = xf.transform_point(center);
                let (cos, sin) = (xf.rotation.cos.abs(), xf.rotation.sin.abs());
                let extent = Vec2::new(
                    cos * half_extents.x + sin * half_extents.y,
                    sin * half_extents.x + cos * half_extents.y,
                );
                Aabb::from_center_half_extents(c, extent)
            }
            Shape::Circle { center, radius } => {
                Aabb::from_center_half_extents(xf.transform_point(center), Vec2::splat(radius))
            }
            Shape::Edge { start, end } => {
                let a = xf.transform_point(start);
                let b = xf.transform_point(end);
                Aabb::new(a.min(b), a.max(b))
            }
        }
    }

    /// Mass properties for the given density. Edges are massless.
    pub fn mass_properties(&self, density: f32) -> MassProperties {
        match *self {
            Shape::Box {
                center,
                half_extents,
            } => {
                let mass = density * 4.0 * half_extents.x * half_extents.y;
                let inertia_center = mass * half_extents.length_squared() / 3.0;
                MassProperties {
                    mass,
                    center,
                    inertia: inertia_center + mass * center.length_squared(),
                }
            }
            Shape::Circle { center, radius } => {
                let mass = density * std::f32::consts::PI * radius * radius;
                MassProperties {
                    mass,
                    center,
                    inertia: mass * (0.5 * radius * radius + center.length_squared()),
                }
            }
            Shape::Edge { start, end } => MassProperties {
                mass: 0.0,
                center: (start + end) * 0.5,
                inertia: 0.0,
            },
        }
    }
}

/// Surface properties of a collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsMaterial {
    /// Coulomb friction coefficient (0 = frictionless).
    pub friction: f32,
    /// Restitution (0 = no bounce, 1 = perfectly elastic).
    pub restitution: f32,
    /// Mass per unit area.
    pub density: f32,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            friction: 0.5,
            restitution: 0.0,
            density: 1.0,
        }
    }
}

impl PhysicsMaterial {
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction,
            restitution,
            ..Default::default()
        }
    }

    /// Frictionless, perfectly elastic material.
    pub fn elastic() -> Self {
        Self {
            friction: 0.0,
            restitution: 1.0,
            density: 1.0,
        }
    }

    /// Low-friction ice-like material.
    pub fn ice() -> Self {
        Self {
            friction: 0.05,
            restitution: 0.0,
            density: 0.9,
        }
    }

    /// Bouncy rubber-like material.
    pub fn rubber() -> Self {
        Self {
            friction: 0.8,
            restitution: 0.8,
            density: 1.1,
        }
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let ok = |v: f32| v.is_finite() && v >= 0.0;
        if !ok(self.friction) {
            return Err(PhysicsError::InvalidMaterial(format!(
                "friction must be non-negative, got {}",
                self.friction
            )));
        }
        if !ok(self.restitution) {
            return Err(PhysicsError::InvalidMaterial(format!(
                "restitution must be non-negative, got {}",
                self.restitution
            )));
        }
        if !ok(self.density) {
            return Err(PhysicsError::InvalidMaterial(format!(
                "density must be non-negative, got {}",
                self.density
            )));
        }
        Ok(())
    }
}

/// Bitmask filtering deciding which colliders may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionFilter {
    /// Groups this collider belongs to.
    pub memberships: u32,
    /// Groups this collider collides with.
    pub filter: u32,
}

impl CollisionFilter {
    pub const ALL: Self = Self {
        memberships: u32::MAX,
        filter: u32::MAX,
    };

    pub const NONE: Self = Self {
        memberships: 0,
        filter: 0,
    };

    pub fn new(memberships: u32, filter: u32) -> Self {
        Self {
            memberships,
            filter,
        }
    }

    /// Both sides must accept each other.
    #[inline]
    pub fn can_collide(&self, other: &CollisionFilter) -> bool {
        (self.memberships & other.filter) != 0 && (other.memberships & self.filter) != 0
    }
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self::ALL
    }
}

/// Template a collider is cloned from.
#[derive(Debug, Clone, PartialEq)]
pub struct ColliderDef {
    pub shape: Shape,
    pub material: PhysicsMaterial,
    /// If true, generates contact events but no physics response.
    pub is_sensor: bool,
    pub filter: CollisionFilter,
    pub user_data: u64,
}

impl ColliderDef {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            material: PhysicsMaterial::default(),
            is_sensor: false,
            filter: CollisionFilter::ALL,
            user_data: 0,
        }
    }

    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.material.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.material.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.material.restitution = restitution;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.shape.validate()?;
        self.material.validate()
    }
}

/// A shape attached to a body (or floating freely) and registered in the broad phase.
#[derive(Debug, Clone)]
pub struct Collider {
    shape: Shape,
    material: PhysicsMaterial,
    is_sensor: bool,
    filter: CollisionFilter,
    user_data: u64,
    body: Option<BodyHandle>,
    pub(crate) proxy: Option<ProxyId>,
    pub(crate) pending_removal: bool,
}

impl Collider {
    /// Clone a collider out of its definition.
    pub fn from_def(def: &ColliderDef, body: Option<BodyHandle>) -> Self {
        Self {
            shape: def.shape,
            material: def.material,
            is_sensor: def.is_sensor,
            filter: def.filter,
            user_data: def.user_data,
            body,
            proxy: None,
            pending_removal: false,
        }
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }

    #[inline]
    pub fn material(&self) -> &PhysicsMaterial {
        &self.material
    }

    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn set_sensor(&mut self, is_sensor: bool) {
        self.is_sensor = is_sensor;
    }

    #[inline]
    pub fn filter(&self) -> &CollisionFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: CollisionFilter) {
        self.filter = filter;
    }

    #[inline]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    /// Owning body, or `None` for a free-floating collider.
    #[inline]
    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    /// Broad-phase proxy id while the collider is registered.
    #[inline]
    pub fn proxy(&self) -> Option<ProxyId> {
        self.proxy
    }

    /// True once the collider is queued for removal at the start of the next step.
    #[inline]
    pub fn is_pending_removal(&self) -> bool {
        self.pending_removal
    }

    #[inline]
    pub fn compute_aabb(&self, xf: &Transform2d) -> Aabb {
        self.shape.compute_aabb(xf)
    }
}
