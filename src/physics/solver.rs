//! Sequential impulse contact solver.
//!
//! Works on [`SolverBody`] snapshots: velocities are solved with accumulated,
//! clamped impulses, then positions are nudged apart with Baumgarte-scaled
//! pseudo impulses that never touch velocity.

use glam::Vec2;
use slotmap::{SecondaryMap, SlotMap};

use crate::geometry::Rotation;

use super::contact::{ContactInfo, MAX_MANIFOLD_POINTS};
use super::rigid_body::{cross_sv, SolverBody};
use super::{BodyHandle, ContactKey, PhysicsConfig};

#[derive(Debug, Clone, Copy, Default)]
struct VelocityPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct PositionPoint {
    /// Surface point of A relative to A's center, in A's frame.
    local_anchor_a: Vec2,
    /// Surface point of B relative to B's center, in B's frame.
    local_anchor_b: Vec2,
}

#[derive(Debug, Clone)]
struct ContactConstraint {
    key: ContactKey,
    index_a: usize,
    index_b: usize,
    /// World normal, pointing from B toward A.
    normal: Vec2,
    /// Normal in A's frame, for the position phase.
    local_normal: Vec2,
    friction: f32,
    inv_mass_a: f32,
    inv_i_a: f32,
    inv_mass_b: f32,
    inv_i_b: f32,
    points: [VelocityPoint; MAX_MANIFOLD_POINTS],
    anchors: [PositionPoint; MAX_MANIFOLD_POINTS],
    point_count: usize,
}

/// Per-step contact solver. Built fresh every step from the touching contacts.
#[derive(Debug, Default)]
pub struct ContactSolver {
    constraints: Vec<ContactConstraint>,
}

/// Maps an owning body to its solver slot; free colliders use the ground slot 0.
#[inline]
pub fn solver_index(index: &SecondaryMap<BodyHandle, usize>, body: Option<BodyHandle>) -> usize {
    body.and_then(|h| index.get(h).copied()).unwrap_or(0)
}

#[inline]
fn cross(a: Vec2, b: Vec2) -> f32 {
    a.perp_dot(b)
}

impl ContactSolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Build constraints: anchors, effective masses and restitution bias.
    pub fn pre_solve(
        &mut self,
        contacts: &SlotMap<ContactKey, ContactInfo>,
        keys: &[ContactKey],
        bodies: &[SolverBody],
        index: &SecondaryMap<BodyHandle, usize>,
        config: &PhysicsConfig,
    ) {
        self.constraints.clear();
        self.constraints.reserve(keys.len());

        for &key in keys {
            let Some(contact) = contacts.get(key) else {
                continue;
            };
            let Some(manifold) = contact.manifold() else {
                continue;
            };
            if manifold.is_empty() {
                continue;
            }

            let index_a = solver_index(index, contact.body_a);
            let index_b = solver_index(index, contact.body_b);
            let body_a = &bodies[index_a];
            let body_b = &bodies[index_b];

            let (m_a, i_a) = (body_a.inv_mass, body_a.inv_inertia);
            let (m_b, i_b) = (body_b.inv_mass, body_b.inv_inertia);
            if m_a == 0.0 && i_a == 0.0 && m_b == 0.0 && i_b == 0.0 {
                continue;
            }

            let normal = manifold.normal;
            let tangent = Vec2::new(normal.y, -normal.x);
            let mut constraint = ContactConstraint {
                key,
                index_a,
                index_b,
                normal,
                local_normal: body_a.rotation.inv_rotate(normal),
                friction: contact.friction(),
                inv_mass_a: m_a,
                inv_i_a: i_a,
                inv_mass_b: m_b,
                inv_i_b: i_b,
                points: [VelocityPoint::default(); MAX_MANIFOLD_POINTS],
                anchors: [PositionPoint::default(); MAX_MANIFOLD_POINTS],
                point_count: manifold.point_count(),
            };

            for (j, mp) in manifold.points().iter().enumerate() {
                let r_a = mp.position - body_a.center;
                let r_b = mp.position - body_b.center;

                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;

                let rt_a = cross(r_a, tangent);
                let rt_b = cross(r_b, tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;

                // Bounce only above the threshold to let stacks come to rest.
                let dv = body_a.linear_velocity + cross_sv(body_a.angular_velocity, r_a)
                    - body_b.linear_velocity
                    - cross_sv(body_b.angular_velocity, r_b);
                let vn = dv.dot(normal);
                let velocity_bias = if vn < -config.restitution_threshold {
                    -contact.restitution() * vn
                } else {
                    0.0
                };

                constraint.points[j] = VelocityPoint {
                    r_a,
                    r_b,
                    normal_impulse: mp.normal_impulse,
                    tangent_impulse: mp.tangent_impulse,
                    normal_mass: if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 },
                    tangent_mass: if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 },
                    velocity_bias,
                };

                let half = normal * (0.5 * mp.penetration);
                constraint.anchors[j] = PositionPoint {
                    local_anchor_a: body_a.rotation.inv_rotate(mp.position - half - body_a.center),
                    local_anchor_b: body_b.rotation.inv_rotate(mp.position + half - body_b.center),
                };
            }

            self.constraints.push(constraint);
        }
    }

    /// Apply last step's impulses, or zero them when warm starting is off.
    pub fn warm_start(&mut self, bodies: &mut [SolverBody], enabled: bool) {
        for c in &mut self.constraints {
            let tangent = Vec2::new(c.normal.y, -c.normal.x);
            for j in 0..c.point_count {
                if !enabled {
                    c.points[j].normal_impulse = 0.0;
                    c.points[j].tangent_impulse = 0.0;
                    continue;
                }
                let p = c.points[j];
                let impulse = c.normal * p.normal_impulse + tangent * p.tangent_impulse;
                apply_impulse(bodies, c, p.r_a, p.r_b, impulse);
            }
        }
    }

    /// One velocity iteration over all constraints.
    pub fn solve_velocity_constraints(&mut self, bodies: &mut [SolverBody]) {
        for c in &mut self.constraints {
            let normal = c.normal;
            let tangent = Vec2::new(normal.y, -normal.x);

            for j in 0..c.point_count {
                let p = c.points[j];
                let dv = relative_velocity(bodies, c, p.r_a, p.r_b);

                // Friction, bounded by the current normal impulse.
                let vt = dv.dot(tangent);
                let max_friction = c.friction * p.normal_impulse;
                let new_tangent =
                    (p.tangent_impulse - p.tangent_mass * vt).clamp(-max_friction, max_friction);
                let lambda = new_tangent - p.tangent_impulse;
                c.points[j].tangent_impulse = new_tangent;
                apply_impulse(bodies, c, p.r_a, p.r_b, tangent * lambda);

                // Normal, kept non-negative so contacts only push.
                let dv = relative_velocity(bodies, c, p.r_a, p.r_b);
                let vn = dv.dot(normal);
                let lambda = -p.normal_mass * (vn - p.velocity_bias);
                let new_normal = (p.normal_impulse + lambda).max(0.0);
                let lambda = new_normal - p.normal_impulse;
                c.points[j].normal_impulse = new_normal;
                apply_impulse(bodies, c, p.r_a, p.r_b, normal * lambda);
            }
        }
    }

    /// Copy accumulated impulses back into the manifolds for next step.
    pub fn store_impulses(&self, contacts: &mut SlotMap<ContactKey, ContactInfo>) {
        for c in &self.constraints {
            let Some(manifold) = contacts.get_mut(c.key).and_then(|ci| ci.manifold.as_mut()) else {
                continue;
            };
            for (mp, p) in manifold.points_mut().iter_mut().zip(&c.points[..c.point_count]) {
                mp.normal_impulse = p.normal_impulse;
                mp.tangent_impulse = p.tangent_impulse;
            }
        }
    }

    /// One position iteration. Returns true once every contact is within
    /// `3 * linear_slop` of resting.
    pub fn solve_position_constraints(&self, bodies: &mut [SolverBody], config: &PhysicsConfig) -> bool {
        let mut min_separation = 0.0f32;

        for c in &self.constraints {
            for anchor in &c.anchors[..c.point_count] {
                let a = &bodies[c.index_a];
                let b = &bodies[c.index_b];

                let normal = a.rotation.rotate(c.local_normal);
                let point_a = a.center + a.rotation.rotate(anchor.local_anchor_a);
                let point_b = b.center + b.rotation.rotate(anchor.local_anchor_b);
                let separation = (point_a - point_b).dot(normal);
                min_separation = min_separation.min(separation);

                let point = (point_a + point_b) * 0.5;
                let r_a = point - a.center;
                let r_b = point - b.center;

                let correction = (config.baumgarte * (separation + config.linear_slop))
                    .clamp(-config.max_linear_correction, 0.0);

                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k = c.inv_mass_a + c.inv_mass_b + c.inv_i_a * rn_a * rn_a + c.inv_i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -correction / k } else { 0.0 };
                let p = normal * impulse;

                let a = &mut bodies[c.index_a];
                a.center += p * c.inv_mass_a;
                a.rotation = Rotation::from_angle(c.inv_i_a * cross(r_a, p)) * a.rotation;

                let b = &mut bodies[c.index_b];
                b.center -= p * c.inv_mass_b;
                b.rotation = Rotation::from_angle(-c.inv_i_b * cross(r_b, p)) * b.rotation;
            }
        }

        min_separation >= -3.0 * config.linear_slop
    }
}

/// Velocity of A's contact point relative to B's.
#[inline]
fn relative_velocity(bodies: &[SolverBody], c: &ContactConstraint, r_a: Vec2, r_b: Vec2) -> Vec2 {
    let a = &bodies[c.index_a];
    let b = &bodies[c.index_b];
    a.linear_velocity + cross_sv(a.angular_velocity, r_a)
        - b.linear_velocity
        - cross_sv(b.angular_velocity, r_b)
}

/// Push A along `impulse`, B against it.
#[inline]
fn apply_impulse(bodies: &mut [SolverBody], c: &ContactConstraint, r_a: Vec2, r_b: Vec2, impulse: Vec2) {
    let a = &mut bodies[c.index_a];
    a.linear_velocity += impulse * c.inv_mass_a;
    a.angular_velocity += c.inv_i_a * cross(r_a, impulse);

    let b = &mut bodies[c.index_b];
    b.linear_velocity -= impulse * c.inv_mass_b;
    b.angular_velocity -= c.inv_i_b * cross(r_b, impulse);
}
