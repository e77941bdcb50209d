//! Contact data structures for collision response.

use glam::Vec2;

use super::bvh::ProxyId;
use super::collide::CollideFn;
use super::{BodyHandle, ColliderHandle, ContactKey};

/// Most points a 2D manifold can hold.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum distance squared for matching contacts across frames.
const CONTACT_MATCH_THRESHOLD_SQ: f32 = 0.02 * 0.02;

/// A single contact point with accumulated impulse data.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManifoldPoint {
    /// World position, midway between the two surfaces.
    pub position: Vec2,
    /// Penetration depth (>= 0).
    pub penetration: f32,
    /// Accumulated normal impulse.
    pub normal_impulse: f32,
    /// Accumulated friction impulse.
    pub tangent_impulse: f32,
    /// Packed id of the features that produced this point.
    pub id: u32,
}

/// Contact points between two shapes sharing one normal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Manifold {
    /// Unit normal pointing from shape B toward shape A.
    pub normal: Vec2,
    points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    point_count: usize,
}

impl Manifold {
    /// A manifold with no points: the shapes do not touch.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_normal(normal: Vec2) -> Self {
        Self {
            normal,
            ..Default::default()
        }
    }

    /// Append a point. Points beyond capacity are dropped.
    pub fn push(&mut self, position: Vec2, penetration: f32, id: u32) {
        if self.point_count == MAX_MANIFOLD_POINTS {
            return;
        }
        self.points[self.point_count] = ManifoldPoint {
            position,
            penetration: penetration.max(0.0),
            id,
            ..Default::default()
        };
        self.point_count += 1;
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    #[inline]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    #[inline]
    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.point_count]
    }

    /// Deepest penetration over all points.
    pub fn max_penetration(&self) -> f32 {
        self.points().iter().map(|p| p.penetration).fold(0.0, f32::max)
    }

    /// Carry accumulated impulses over from last frame's manifold.
    ///
    /// Points are matched by feature id first, then by proximity.
    pub fn inherit_impulses(&mut self, old: &Manifold) {
        for point in self.points_mut() {
            let matched = old.points().iter().find(|o| o.id == point.id).or_else(|| {
                old.points()
                    .iter()
                    .map(|o| (o, o.position.distance_squared(point.position)))
                    .filter(|(_, d)| *d < CONTACT_MATCH_THRESHOLD_SQ)
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(o, _)| o)
            });
            if let Some(old_point) = matched {
                point.normal_impulse = old_point.normal_impulse;
                point.tangent_impulse = old_point.tangent_impulse;
            }
        }
    }
}

/// A potential or actual contact between two colliders.
///
/// Records live in an arena owned by the narrow phase and are threaded into a
/// doubly linked list through `prev`/`next`.
#[derive(Debug, Clone)]
pub struct ContactInfo {
    pub(crate) collider_a: ColliderHandle,
    pub(crate) collider_b: ColliderHandle,
    pub(crate) body_a: Option<BodyHandle>,
    pub(crate) body_b: Option<BodyHandle>,
    pub(crate) proxy_a: ProxyId,
    pub(crate) proxy_b: ProxyId,
    pub(crate) touching: bool,
    pub(crate) is_sensor: bool,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) user_data_a: u64,
    pub(crate) user_data_b: u64,
    pub(crate) manifold: Option<Manifold>,
    pub(crate) collide: CollideFn,
    pub(crate) prev: Option<ContactKey>,
    pub(crate) next: Option<ContactKey>,
}

impl ContactInfo {
    #[inline]
    pub fn collider_a(&self) -> ColliderHandle {
        self.collider_a
    }

    #[inline]
    pub fn collider_b(&self) -> ColliderHandle {
        self.collider_b
    }

    #[inline]
    pub fn body_a(&self) -> Option<BodyHandle> {
        self.body_a
    }

    #[inline]
    pub fn body_b(&self) -> Option<BodyHandle> {
        self.body_b
    }

    #[inline]
    pub fn proxies(&self) -> (ProxyId, ProxyId) {
        (self.proxy_a, self.proxy_b)
    }

    /// True while the shapes have at least one contact point.
    #[inline]
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    /// Combined friction (the larger of the two).
    #[inline]
    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Combined restitution (the larger of the two).
    #[inline]
    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    #[inline]
    pub fn user_data(&self) -> (u64, u64) {
        (self.user_data_a, self.user_data_b)
    }

    /// Latest manifold, once the pair has been collided at least once.
    #[inline]
    pub fn manifold(&self) -> Option<&Manifold> {
        self.manifold.as_ref()
    }

    pub(crate) fn pair(&self) -> ContactPair {
        ContactPair {
            collider_a: self.collider_a,
            collider_b: self.collider_b,
            body_a: self.body_a,
            body_b: self.body_b,
            is_sensor: self.is_sensor,
        }
    }
}

/// The two sides of a contact as reported in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactPair {
    pub collider_a: ColliderHandle,
    pub collider_b: ColliderHandle,
    pub body_a: Option<BodyHandle>,
    pub body_b: Option<BodyHandle>,
    pub is_sensor: bool,
}

impl ContactPair {
    /// Does this pair involve `collider`?
    pub fn involves(&self, collider: ColliderHandle) -> bool {
        self.collider_a == collider || self.collider_b == collider
    }
}

/// Touch transitions, queued for polling with `drain_contact_events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEvent {
    Begin(ContactPair),
    End(ContactPair),
}

impl ContactEvent {
    #[inline]
    pub fn pair(&self) -> &ContactPair {
        match self {
            ContactEvent::Begin(pair) | ContactEvent::End(pair) => pair,
        }
    }
}

/// Callback interface for touch transitions.
///
/// Each method fires exactly once per transition, during `update`.
pub trait ContactListener {
    fn on_contact_begin(&mut self, _contact: &ContactInfo) {}
    fn on_contact_end(&mut self, _contact: &ContactInfo) {}
}
