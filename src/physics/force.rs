//! Force generators applied at the start of every step.

use glam::Vec2;

use super::rigid_body::RigidBody;

/// Something that pushes on bodies each step.
///
/// A generator registered globally runs once per awake dynamic body; one bound to
/// a body runs only for that body. Forces accumulate and are cleared after the step.
pub trait ForceGenerator {
    fn apply_force(&mut self, body: &mut RigidBody, dt: f32);
}

/// Extra gravity-like acceleration, scaled by the body's gravity scale.
#[derive(Debug, Clone, Copy)]
pub struct Gravity {
    pub acceleration: Vec2,
}

impl Gravity {
    pub fn new(acceleration: Vec2) -> Self {
        Self { acceleration }
    }
}

impl ForceGenerator for Gravity {
    fn apply_force(&mut self, body: &mut RigidBody, _dt: f32) {
        let force = self.acceleration * body.mass() * body.gravity_scale();
        body.apply_force_to_center(force);
    }
}

/// Drag opposing motion: `-(k1 * |v| + k2 * |v|^2) * v_hat`.
#[derive(Debug, Clone, Copy)]
pub struct LinearDrag {
    pub k1: f32,
    pub k2: f32,
}

impl LinearDrag {
    pub fn new(k1: f32, k2: f32) -> Self {
        Self { k1, k2 }
    }
}

impl ForceGenerator for LinearDrag {
    fn apply_force(&mut self, body: &mut RigidBody, _dt: f32) {
        let v = body.linear_velocity();
        let speed = v.length();
        if speed <= f32::EPSILON {
            return;
        }
        let magnitude = self.k1 * speed + self.k2 * speed * speed;
        body.apply_force_to_center(-v / speed * magnitude);
    }
}

/// A constant world-space force, optionally applied at a body-local point.
#[derive(Debug, Clone, Copy)]
pub struct ConstantForce {
    pub force: Vec2,
    pub local_point: Option<Vec2>,
}

impl ConstantForce {
    pub fn new(force: Vec2) -> Self {
        Self {
            force,
            local_point: None,
        }
    }

    pub fn at_local_point(mut self, point: Vec2) -> Self {
        self.local_point = Some(point);
        self
    }
}

impl ForceGenerator for ConstantForce {
    fn apply_force(&mut self, body: &mut RigidBody, _dt: f32) {
        match self.local_point {
            Some(p) => body.apply_force_local(self.force, p),
            None => body.apply_force_to_center(self.force),
        }
    }
}

/// Damped spring pulling a body-local point toward a fixed world anchor.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredSpring {
    pub anchor: Vec2,
    pub local_point: Vec2,
    pub stiffness: f32,
    pub damping: f32,
    pub rest_length: f32,
}

impl AnchoredSpring {
    pub fn new(anchor: Vec2, stiffness: f32, rest_length: f32) -> Self {
        Self {
            anchor,
            local_point: Vec2::ZERO,
            stiffness,
            damping: 0.0,
            rest_length,
        }
    }

    pub fn with_local_point(mut self, point: Vec2) -> Self {
        self.local_point = point;
        self
    }

    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping;
        self
    }
}

impl ForceGenerator for AnchoredSpring {
    fn apply_force(&mut self, body: &mut RigidBody, _dt: f32) {
        let point = body.world_point(self.local_point);
        let d = point - self.anchor;
        let length = d.length();
        if length <= f32::EPSILON {
            return;
        }
        let dir = d / length;
        let stretch = length - self.rest_length;
        let closing = body.linear_velocity_at_point(point).dot(dir);
        let magnitude = -self.stiffness * stretch - self.damping * closing;
        body.apply_force(dir * magnitude, point);
    }
}
