//! Rigid bodies and the integration helpers the step pipeline runs on them.

use glam::Vec2;

use crate::geometry::{Rotation, Transform2d};

use super::collider::MassProperties;
use super::{BodyHandle, ColliderHandle};

/// Rigid body type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    /// Affected by forces and collisions.
    #[default]
    Dynamic,
    /// Position controlled by user velocity, pushes dynamic bodies, never pushed back.
    Kinematic,
    /// Immovable.
    Static,
}

/// Creation parameters for a rigid body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    /// Rotation in radians.
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    /// Linear damping factor (default: 0.0).
    pub linear_damping: f32,
    /// Angular damping factor (default: 0.01).
    pub angular_damping: f32,
    /// Gravity scale (default: 1.0).
    pub gravity_scale: f32,
    /// Prevents rotation by giving the body zero inverse inertia.
    pub fixed_rotation: bool,
    pub allow_sleep: bool,
    pub awake: bool,
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.01,
            gravity_scale: 1.0,
            fixed_rotation: false,
            allow_sleep: true,
            awake: true,
            user_data: 0,
        }
    }
}

impl BodyDef {
    pub fn new_dynamic() -> Self {
        Self::default()
    }

    pub fn new_static() -> Self {
        Self {
            body_type: BodyType::Static,
            angular_damping: 0.0,
            gravity_scale: 0.0,
            ..Default::default()
        }
    }

    pub fn new_kinematic() -> Self {
        Self {
            body_type: BodyType::Kinematic,
            angular_damping: 0.0,
            gravity_scale: 0.0,
            ..Default::default()
        }
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_linear_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, velocity: f32) -> Self {
        self.angular_velocity = velocity;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn with_allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// A simulated rigid body. Created and destroyed only through the world.
#[derive(Debug, Clone)]
pub struct RigidBody {
    body_type: BodyType,
    /// Pose of the body origin.
    transform: Transform2d,
    /// World-space center of mass.
    center: Vec2,
    local_center: Vec2,
    linear_velocity: Vec2,
    angular_velocity: f32,
    force: Vec2,
    torque: f32,
    mass: f32,
    inv_mass: f32,
    /// Rotational inertia about the center of mass.
    inertia: f32,
    inv_inertia: f32,
    linear_damping: f32,
    angular_damping: f32,
    gravity_scale: f32,
    fixed_rotation: bool,
    allow_sleep: bool,
    awake: bool,
    sleep_time: f32,
    user_data: u64,
    pub(crate) colliders: Vec<ColliderHandle>,
    /// Set when the user teleports the body; forces a broad-phase resync.
    pub(crate) needs_sync: bool,
    /// Origin position at the last broad-phase synchronisation.
    pub(crate) synced_position: Vec2,
}

impl RigidBody {
    pub(crate) fn from_def(def: &BodyDef) -> Self {
        let transform = Transform2d::new(def.position, def.angle);
        let dynamic = def.body_type == BodyType::Dynamic;
        let is_static = def.body_type == BodyType::Static;
        Self {
            body_type: def.body_type,
            transform,
            center: def.position,
            local_center: Vec2::ZERO,
            linear_velocity: if is_static {
                Vec2::ZERO
            } else {
                def.linear_velocity
            },
            angular_velocity: if is_static { 0.0 } else { def.angular_velocity },
            force: Vec2::ZERO,
            torque: 0.0,
            mass: if dynamic { 1.0 } else { 0.0 },
            inv_mass: if dynamic { 1.0 } else { 0.0 },
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            fixed_rotation: def.fixed_rotation,
            allow_sleep: def.allow_sleep,
            awake: def.awake || !def.allow_sleep,
            sleep_time: 0.0,
            user_data: def.user_data,
            colliders: Vec::new(),
            needs_sync: false,
            synced_position: def.position,
        }
    }

    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    #[inline]
    pub fn transform(&self) -> &Transform2d {
        &self.transform
    }

    /// Position of the body origin.
    #[inline]
    pub fn position(&self) -> Vec2 {
        self.transform.position
    }

    #[inline]
    pub fn rotation(&self) -> Rotation {
        self.transform.rotation
    }

    #[inline]
    pub fn angle(&self) -> f32 {
        self.transform.rotation.angle()
    }

    /// Teleport the body origin. The broad phase catches up on the next update.
    pub fn set_position(&mut self, position: Vec2) {
        let angle = self.angle();
        self.set_transform(position, angle);
    }

    pub fn set_angle(&mut self, angle: f32) {
        let position = self.position();
        self.set_transform(position, angle);
    }

    pub fn set_transform(&mut self, position: Vec2, angle: f32) {
        self.transform = Transform2d::new(position, angle);
        self.center = self.transform.transform_point(self.local_center);
        self.needs_sync = true;
        self.wake();
    }

    /// World-space center of mass.
    #[inline]
    pub fn world_center(&self) -> Vec2 {
        self.center
    }

    /// Center of mass relative to the body origin.
    #[inline]
    pub fn local_center(&self) -> Vec2 {
        self.local_center
    }

    #[inline]
    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.transform.transform_point(local_point)
    }

    #[inline]
    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.transform.inv_transform_point(world_point)
    }

    #[inline]
    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec2) {
        if self.is_static() {
            return;
        }
        if velocity.length_squared() > 0.0 {
            self.wake();
        }
        self.linear_velocity = velocity;
    }

    #[inline]
    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn set_angular_velocity(&mut self, velocity: f32) {
        if self.is_static() {
            return;
        }
        if velocity != 0.0 {
            self.wake();
        }
        self.angular_velocity = velocity;
    }

    /// Velocity of a world point rigidly attached to this body.
    #[inline]
    pub fn linear_velocity_at_point(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + cross_sv(self.angular_velocity, world_point - self.center)
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[inline]
    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Override the mass of a dynamic body. Ignored for other body types.
    pub fn set_mass(&mut self, mass: f32) {
        if !self.is_dynamic() || !mass.is_finite() || mass <= 0.0 {
            return;
        }
        self.mass = mass;
        self.inv_mass = 1.0 / mass;
    }

    /// Rotational inertia about the center of mass.
    #[inline]
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    #[inline]
    pub fn inv_inertia(&self) -> f32 {
        self.inv_inertia
    }

    /// Override the rotational inertia (about the center of mass) of a dynamic body.
    pub fn set_inertia(&mut self, inertia: f32) {
        if !self.is_dynamic() || self.fixed_rotation || !inertia.is_finite() || inertia < 0.0 {
            return;
        }
        self.inertia = inertia;
        self.inv_inertia = if inertia > 0.0 { 1.0 / inertia } else { 0.0 };
    }

    #[inline]
    pub fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    pub fn set_linear_damping(&mut self, damping: f32) {
        self.linear_damping = damping.max(0.0);
    }

    #[inline]
    pub fn angular_damping(&self) -> f32 {
        self.angular_damping
    }

    pub fn set_angular_damping(&mut self, damping: f32) {
        self.angular_damping = damping.max(0.0);
    }

    #[inline]
    pub fn gravity_scale(&self) -> f32 {
        self.gravity_scale
    }

    pub fn set_gravity_scale(&mut self, scale: f32) {
        self.gravity_scale = scale;
    }

    #[inline]
    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    #[inline]
    pub fn force(&self) -> Vec2 {
        self.force
    }

    #[inline]
    pub fn torque(&self) -> f32 {
        self.torque
    }

    /// Apply a force at a world point. Off-center forces also produce torque.
    pub fn apply_force(&mut self, force: Vec2, world_point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.wake();
        self.force += force;
        self.torque += (world_point - self.center).perp_dot(force);
    }

    /// Apply a world-space force at a point given in body-local coordinates.
    pub fn apply_force_local(&mut self, force: Vec2, local_point: Vec2) {
        let world_point = self.world_point(local_point);
        self.apply_force(force, world_point);
    }

    pub fn apply_force_to_center(&mut self, force: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.wake();
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if !self.is_dynamic() {
            return;
        }
        self.wake();
        self.torque += torque;
    }

    /// Immediately change velocity by an impulse applied at a world point.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, world_point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.wake();
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * (world_point - self.center).perp_dot(impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32) {
        if !self.is_dynamic() {
            return;
        }
        self.wake();
        self.angular_velocity += self.inv_inertia * impulse;
    }

    #[inline]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Put the body to sleep (zeroing its motion) or wake it up.
    pub fn set_awake(&mut self, awake: bool) {
        if self.is_static() {
            return;
        }
        if awake {
            self.awake = true;
            self.sleep_time = 0.0;
        } else if self.allow_sleep {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    #[inline]
    pub fn wake(&mut self) {
        if !self.awake && !self.is_static() {
            self.set_awake(true);
        }
    }

    #[inline]
    pub fn allows_sleep(&self) -> bool {
        self.allow_sleep
    }

    pub fn set_allow_sleep(&mut self, allow: bool) {
        self.allow_sleep = allow;
        if !allow {
            self.wake();
        }
    }

    #[inline]
    pub fn sleep_time(&self) -> f32 {
        self.sleep_time
    }

    #[inline]
    pub fn colliders(&self) -> &[ColliderHandle] {
        &self.colliders
    }

    #[inline]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    pub fn set_user_data(&mut self, user_data: u64) {
        self.user_data = user_data;
    }

    /// Install aggregated mass data from the attached colliders.
    ///
    /// `total` carries the summed mass, the mass-weighted centroid and the inertia
    /// about the body origin.
    pub(crate) fn set_mass_data(&mut self, total: MassProperties) {
        self.local_center = Vec2::ZERO;
        if !self.is_dynamic() {
            self.mass = 0.0;
            self.inv_mass = 0.0;
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
            self.center = self.transform.position;
            return;
        }

        if total.mass > 0.0 {
            self.mass = total.mass;
            self.inv_mass = 1.0 / total.mass;
            self.local_center = total.center;
        } else {
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        let inertia = total.inertia - self.mass * self.local_center.length_squared();
        if inertia > 0.0 && !self.fixed_rotation {
            self.inertia = inertia;
            self.inv_inertia = 1.0 / inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        // Keep the origin fixed; the center of mass moves with the new local center.
        let old_center = self.center;
        self.center = self.transform.transform_point(self.local_center);
        self.linear_velocity += cross_sv(self.angular_velocity, self.center - old_center);
    }

    /// Pull integrated state back from the solver.
    pub(crate) fn apply_solver_state(&mut self, state: &SolverBody) {
        self.center = state.center;
        self.transform.rotation = state.rotation;
        self.transform.position = state.center - state.rotation.rotate(self.local_center);
        self.linear_velocity = state.linear_velocity;
        self.angular_velocity = state.angular_velocity;
    }
}

/// Scalar-vector cross product `w x r` in 2D.
#[inline]
pub(crate) fn cross_sv(w: f32, r: Vec2) -> Vec2 {
    Vec2::new(-w * r.y, w * r.x)
}

/// Snapshot of a body used by the contact solver and position integration.
#[derive(Debug, Clone, Copy)]
pub struct SolverBody {
    pub handle: Option<BodyHandle>,
    pub center: Vec2,
    pub rotation: Rotation,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub inv_mass: f32,
    pub inv_inertia: f32,
    /// Only dynamic and kinematic awake bodies move during position integration.
    pub movable: bool,
}

impl SolverBody {
    /// Stand-in for free-floating colliders: infinite mass, never moves.
    pub const GROUND: SolverBody = SolverBody {
        handle: None,
        center: Vec2::ZERO,
        rotation: Rotation::IDENTITY,
        linear_velocity: Vec2::ZERO,
        angular_velocity: 0.0,
        inv_mass: 0.0,
        inv_inertia: 0.0,
        movable: false,
    };

    pub fn from_body(handle: BodyHandle, body: &RigidBody) -> Self {
        let awake_dynamic = body.is_dynamic() && body.awake;
        Self {
            handle: Some(handle),
            center: body.center,
            rotation: body.transform.rotation,
            linear_velocity: body.linear_velocity,
            angular_velocity: body.angular_velocity,
            inv_mass: if awake_dynamic { body.inv_mass } else { 0.0 },
            inv_inertia: if awake_dynamic { body.inv_inertia } else { 0.0 },
            movable: !body.is_static() && body.awake,
        }
    }
}

/// Apply gravity as a force on an awake dynamic body.
pub fn apply_gravity(body: &mut RigidBody, gravity: Vec2) {
    if body.is_dynamic() && body.awake && body.mass > 0.0 {
        body.force += gravity * body.mass * body.gravity_scale;
    }
}

/// Integrate velocity using semi-implicit Euler: v += (F/m) * dt, then damping.
pub fn integrate_velocity(body: &mut RigidBody, dt: f32) {
    if !body.is_dynamic() || !body.awake {
        return;
    }

    body.linear_velocity += body.force * body.inv_mass * dt;
    body.angular_velocity += body.torque * body.inv_inertia * dt;

    // Pade approximation of exp(-c * dt), stable for any damping.
    body.linear_velocity *= 1.0 / (1.0 + dt * body.linear_damping);
    body.angular_velocity *= 1.0 / (1.0 + dt * body.angular_damping);
}

/// Clear force and torque accumulators.
pub fn clear_forces(body: &mut RigidBody) {
    body.force = Vec2::ZERO;
    body.torque = 0.0;
}

/// Integrate positions: c += v * dt, q advanced by w * dt.
///
/// Per-step motion is clamped to `max_translation` and `max_rotation` to keep a
/// runaway body from tunneling through the whole scene in one step.
pub fn integrate_positions(
    bodies: &mut [SolverBody],
    dt: f32,
    max_translation: f32,
    max_rotation: f32,
) {
    for body in bodies.iter_mut().filter(|b| b.movable) {
        let translation = body.linear_velocity * dt;
        let len_sq = translation.length_squared();
        if len_sq > max_translation * max_translation {
            body.linear_velocity *= max_translation / len_sq.sqrt();
        }

        let rotation = body.angular_velocity * dt;
        if rotation.abs() > max_rotation {
            body.angular_velocity *= max_rotation / rotation.abs();
        }

        body.center += body.linear_velocity * dt;
        body.rotation = body.rotation.integrate(body.angular_velocity * dt);
    }
}

/// Advance a body's sleep timer. Returns the time it has been resting.
pub fn update_sleep_timer(
    body: &mut RigidBody,
    dt: f32,
    linear_tolerance: f32,
    angular_tolerance: f32,
) -> f32 {
    if body.is_static() {
        return f32::MAX;
    }
    let resting = body.allow_sleep
        && body.linear_velocity.length_squared() <= linear_tolerance * linear_tolerance
        && body.angular_velocity.abs() <= angular_tolerance;
    if resting {
        body.sleep_time += dt;
    } else {
        body.sleep_time = 0.0;
    }
    body.sleep_time
}
