//! 2D rigid-body physics: dynamic-tree broad phase, contact generation and a
//! sequential-impulse solver with warm starting.
//!
//! All simulation state lives in arenas owned by [`PhysicsWorld`]. Callers hold
//! generation-checked handles and drive the world with [`PhysicsWorld::update`]
//! (one step of `dt`) or [`PhysicsWorld::step`] (fixed-timestep accumulator).

pub mod broadphase;
pub mod bvh;
pub mod collide;
pub mod collider;
pub mod contact;
pub mod error;
pub mod force;
pub mod narrowphase;
pub mod rigid_body;
pub mod solver;

use glam::Vec2;
use slotmap::{new_key_type, SecondaryMap, SlotMap};

use crate::geometry::Aabb;

pub use broadphase::{BroadPhase, PairEntry, ProxyData};
pub use bvh::{DynamicTree, ProxyId, TreeNodeInfo, TreeViolation};
pub use collide::{CollideFn, ContactFeature, ContactRegistry, FeatureType};
pub use collider::{
    Collider, ColliderDef, CollisionFilter, MassProperties, PhysicsMaterial, Shape, ShapeType,
};
pub use contact::{
    ContactEvent, ContactInfo, ContactListener, ContactPair, Manifold, ManifoldPoint,
    MAX_MANIFOLD_POINTS,
};
pub use error::{PhysicsError, Result};
pub use force::{AnchoredSpring, ConstantForce, ForceGenerator, Gravity, LinearDrag};
pub use narrowphase::{ContactIter, ListenerSlot, NarrowPhase};
pub use rigid_body::{BodyDef, BodyType, RigidBody, SolverBody};
pub use solver::ContactSolver;

new_key_type! {
    /// Handle to a rigid body owned by a [`PhysicsWorld`].
    pub struct BodyHandle;
    /// Handle to a collider owned by a [`PhysicsWorld`].
    pub struct ColliderHandle;
    /// Key of a contact record in the narrow phase.
    pub struct ContactKey;
    /// Handle to a registered force generator.
    pub struct ForceHandle;
}

/// Physics simulation configuration.
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    /// Gravity acceleration. Default: (0, -10).
    pub gravity: Vec2,
    /// Fixed timestep used by [`PhysicsWorld::step`] in seconds. Default: 1/60.
    pub fixed_timestep: f64,
    /// Maximum number of sub-steps per `step` call. Default: 4.
    pub max_substeps: u32,
    /// Number of velocity constraint iterations. Default: 8.
    pub velocity_iterations: u32,
    /// Maximum number of position correction iterations. Default: 10.
    pub position_iterations: u32,
    /// Fraction of positional error corrected per position iteration. Default: 0.2.
    pub baumgarte: f32,
    /// Penetration allowed before position correction kicks in. Default: 0.005.
    pub linear_slop: f32,
    /// Largest positional correction applied to one point in one iteration. Default: 0.2.
    pub max_linear_correction: f32,
    /// Closing speeds below this do not bounce. Default: 1.0.
    pub restitution_threshold: f32,
    /// Seed the solver with last step's impulses. Default: true.
    pub warm_starting: bool,
    /// Let resting islands fall asleep. Default: true.
    pub sleep_enabled: bool,
    /// Linear speed below which a body counts as resting. Default: 0.05.
    pub linear_sleep_tolerance: f32,
    /// Angular speed below which a body counts as resting. Default: 0.05.
    pub angular_sleep_tolerance: f32,
    /// Seconds an island must rest before it falls asleep. Default: 0.5.
    pub time_to_sleep: f32,
    /// Fat AABB margin added around every proxy. Default: 0.1.
    pub aabb_margin: f32,
    /// Scale applied to per-step displacement when predicting proxy motion. Default: 4.
    pub displacement_multiplier: f32,
    /// Maximum translation of a body in one step. Default: 2.
    pub max_translation: f32,
    /// Maximum rotation of a body in one step, in radians. Default: pi/2.
    pub max_rotation: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -10.0),
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 4,
            velocity_iterations: 8,
            position_iterations: 10,
            baumgarte: 0.2,
            linear_slop: 0.005,
            max_linear_correction: 0.2,
            restitution_threshold: 1.0,
            warm_starting: true,
            sleep_enabled: true,
            linear_sleep_tolerance: 0.05,
            angular_sleep_tolerance: 0.05,
            time_to_sleep: 0.5,
            aabb_margin: 0.1,
            displacement_multiplier: 4.0,
            max_translation: 2.0,
            max_rotation: std::f32::consts::FRAC_PI_2,
        }
    }
}

impl PhysicsConfig {
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_fixed_timestep(mut self, timestep: f64) -> Self {
        self.fixed_timestep = timestep;
        self
    }

    pub fn with_iterations(mut self, velocity: u32, position: u32) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    pub fn with_warm_starting(mut self, enabled: bool) -> Self {
        self.warm_starting = enabled;
        self
    }

    pub fn with_sleeping(mut self, enabled: bool) -> Self {
        self.sleep_enabled = enabled;
        self
    }
}

struct ForceEntry {
    generator: Box<dyn ForceGenerator>,
    /// `None` applies the generator to every awake dynamic body.
    body: Option<BodyHandle>,
}

/// Physics world that owns every body, collider and contact.
pub struct PhysicsWorld {
    config: PhysicsConfig,
    accumulator: f64,
    bodies: SlotMap<BodyHandle, RigidBody>,
    colliders: SlotMap<ColliderHandle, Collider>,
    /// Colliders not attached to any body.
    free_colliders: Vec<ColliderHandle>,
    pending_removals: Vec<ColliderHandle>,
    forces: SlotMap<ForceHandle, ForceEntry>,
    broad_phase: BroadPhase<ContactKey>,
    narrow_phase: NarrowPhase,
    solver: ContactSolver,
    listener: ListenerSlot,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Self {
        tracing::debug!(
            gravity = ?config.gravity,
            velocity_iterations = config.velocity_iterations,
            position_iterations = config.position_iterations,
            "creating physics world"
        );
        let broad_phase = BroadPhase::new(config.aabb_margin, config.displacement_multiplier);
        Self {
            config,
            accumulator: 0.0,
            bodies: SlotMap::with_key(),
            colliders: SlotMap::with_key(),
            free_colliders: Vec::new(),
            pending_removals: Vec::new(),
            forces: SlotMap::with_key(),
            broad_phase,
            narrow_phase: NarrowPhase::new(),
            solver: ContactSolver::new(),
            listener: None,
        }
    }

    // ---- bodies ----

    pub fn create_body(&mut self, def: &BodyDef) -> BodyHandle {
        let handle = self.bodies.insert(RigidBody::from_def(def));
        tracing::debug!(body = ?handle, body_type = ?def.body_type, "created body");
        handle
    }

    /// Destroy a body together with its colliders and bound force generators.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<()> {
        let colliders = self
            .bodies
            .get(handle)
            .ok_or(PhysicsError::BodyNotFound(handle))?
            .colliders
            .clone();

        for collider in colliders {
            self.destroy_collider(collider);
        }
        self.forces.retain(|_, entry| entry.body != Some(handle));
        self.bodies.remove(handle);
        tracing::debug!(body = ?handle, "removed body");
        Ok(())
    }

    #[inline]
    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    #[inline]
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> {
        self.bodies.iter()
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    // ---- colliders ----

    /// Attach a collider to `body`, or float it freely in world space when `body` is `None`.
    pub fn add_collider(
        &mut self,
        body: Option<BodyHandle>,
        def: &ColliderDef,
    ) -> Result<ColliderHandle> {
        def.validate()?;
        let xf = match body {
            Some(h) => *self
                .bodies
                .get(h)
                .ok_or(PhysicsError::BodyNotFound(h))?
                .transform(),
            None => crate::geometry::Transform2d::IDENTITY,
        };

        let handle = self.colliders.insert(Collider::from_def(def, body));
        let aabb = def.shape.compute_aabb(&xf);
        let proxy = self.broad_phase.create_proxy(
            aabb,
            ProxyData {
                collider: handle,
                body,
            },
        );
        if let Some(collider) = self.colliders.get_mut(handle) {
            collider.proxy = Some(proxy);
        }

        match body {
            Some(h) => {
                if let Some(b) = self.bodies.get_mut(h) {
                    b.colliders.push(handle);
                    b.wake();
                }
                self.reset_mass_data(h);
            }
            None => self.free_colliders.push(handle),
        }

        tracing::debug!(collider = ?handle, body = ?body, shape = ?def.shape.shape_type(), "added collider");
        Ok(handle)
    }

    /// Queue a collider for removal at the start of the next update.
    pub fn remove_collider(&mut self, handle: ColliderHandle) -> Result<()> {
        let collider = self
            .colliders
            .get_mut(handle)
            .ok_or(PhysicsError::ColliderNotFound(handle))?;
        if !collider.pending_removal {
            collider.pending_removal = true;
            self.pending_removals.push(handle);
        }
        Ok(())
    }

    /// Destroy a collider right away, ending its contacts.
    pub fn delete_collider(&mut self, handle: ColliderHandle) -> Result<()> {
        if !self.colliders.contains_key(handle) {
            return Err(PhysicsError::ColliderNotFound(handle));
        }
        if let Some(body) = self.destroy_collider(handle) {
            self.reset_mass_data(body);
        }
        Ok(())
    }

    #[inline]
    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.colliders.get(handle)
    }

    pub fn colliders(&self) -> impl Iterator<Item = (ColliderHandle, &Collider)> {
        self.colliders.iter()
    }

    #[inline]
    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    /// Colliders not attached to any body.
    #[inline]
    pub fn free_colliders(&self) -> &[ColliderHandle] {
        &self.free_colliders
    }

    /// Change a collider's filter. Existing contacts are re-filtered on the next update.
    pub fn set_collider_filter(
        &mut self,
        handle: ColliderHandle,
        filter: CollisionFilter,
    ) -> Result<()> {
        let collider = self
            .colliders
            .get_mut(handle)
            .ok_or(PhysicsError::ColliderNotFound(handle))?;
        collider.set_filter(filter);
        if let Some(proxy) = collider.proxy {
            self.broad_phase.touch_proxy(proxy);
        }
        if let Some(body) = collider.body().and_then(|h| self.bodies.get_mut(h)) {
            body.wake();
        }
        Ok(())
    }

    pub fn set_collider_sensor(&mut self, handle: ColliderHandle, is_sensor: bool) -> Result<()> {
        let collider = self
            .colliders
            .get_mut(handle)
            .ok_or(PhysicsError::ColliderNotFound(handle))?;
        collider.set_sensor(is_sensor);
        if let Some(body) = collider.body().and_then(|h| self.bodies.get_mut(h)) {
            body.wake();
        }
        Ok(())
    }

    /// Visit every collider whose fat AABB overlaps `aabb`. Return `false` to stop.
    pub fn query_aabb<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(ColliderHandle) -> bool,
    {
        let tree = self.broad_phase.tree();
        tree.query(aabb, |proxy| match tree.payload(proxy) {
            Some(data) => callback(data.collider),
            None => true,
        });
    }

    // ---- forces ----

    /// Register a generator that acts on every awake dynamic body.
    pub fn add_force(&mut self, generator: Box<dyn ForceGenerator>) -> ForceHandle {
        self.forces.insert(ForceEntry {
            generator,
            body: None,
        })
    }

    /// Register a generator bound to a single body.
    pub fn add_body_force(
        &mut self,
        generator: Box<dyn ForceGenerator>,
        body: BodyHandle,
    ) -> Result<ForceHandle> {
        if !self.bodies.contains_key(body) {
            return Err(PhysicsError::BodyNotFound(body));
        }
        Ok(self.forces.insert(ForceEntry {
            generator,
            body: Some(body),
        }))
    }

    pub fn remove_force(&mut self, handle: ForceHandle) -> Result<()> {
        self.forces
            .remove(handle)
            .map(|_| ())
            .ok_or(PhysicsError::ForceNotFound(handle))
    }

    // ---- contacts ----

    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.listener = Some(listener);
    }

    pub fn clear_contact_listener(&mut self) {
        self.listener = None;
    }

    /// Begin/end events queued since the last drain.
    ///
    /// Undrained events live through one more update and are then dropped, so
    /// the queue holds at most the last update's events plus anything queued
    /// since.
    pub fn drain_contact_events(&mut self) -> std::vec::Drain<'_, ContactEvent> {
        self.narrow_phase.drain_events()
    }

    pub fn contacts(&self) -> ContactIter<'_> {
        self.narrow_phase.iter()
    }

    #[inline]
    pub fn contact(&self, key: ContactKey) -> Option<&ContactInfo> {
        self.narrow_phase.get(key)
    }

    #[inline]
    pub fn contact_count(&self) -> usize {
        self.narrow_phase.len()
    }

    #[inline]
    pub fn broad_phase(&self) -> &BroadPhase<ContactKey> {
        &self.broad_phase
    }

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    #[inline]
    pub fn config_mut(&mut self) -> &mut PhysicsConfig {
        &mut self.config
    }

    // ---- stepping ----

    /// Advance the fixed-timestep accumulator by `delta_time` seconds.
    ///
    /// Runs at most `max_substeps` updates of `fixed_timestep` each and returns
    /// how many ran. Leftover time carries over to the next call.
    pub fn step(&mut self, delta_time: f64) -> u32 {
        let max_accumulation = self.config.fixed_timestep * self.config.max_substeps as f64;
        self.accumulator = (self.accumulator + delta_time).min(max_accumulation);

        let mut substeps = 0;
        while self.accumulator >= self.config.fixed_timestep
            && substeps < self.config.max_substeps
        {
            self.update(self.config.fixed_timestep as f32);
            self.accumulator -= self.config.fixed_timestep;
            substeps += 1;
        }
        substeps
    }

    /// Simulate one step of `dt` seconds with the configured iteration counts.
    pub fn update(&mut self, dt: f32) {
        let (v, p) = (
            self.config.velocity_iterations,
            self.config.position_iterations,
        );
        self.update_with_iterations(dt, v, p);
    }

    pub fn update_with_iterations(
        &mut self,
        dt: f32,
        velocity_iterations: u32,
        position_iterations: u32,
    ) {
        if !(dt > 0.0 && dt.is_finite()) {
            tracing::warn!(dt, "ignoring non-positive time step");
            return;
        }

        self.narrow_phase.expire_events();
        self.flush_removals();
        self.apply_forces(dt);
        self.synchronize_proxies();

        let (bodies, colliders, narrow_phase) =
            (&self.bodies, &self.colliders, &mut self.narrow_phase);
        self.broad_phase.find_contacts(|proxy_a, data_a, proxy_b, data_b| {
            narrow_phase.create_contact(bodies, colliders, proxy_a, data_a, proxy_b, data_b)
        });

        let first_event = self.narrow_phase.events().len();
        self.narrow_phase.collide(
            &self.bodies,
            &self.colliders,
            &mut self.broad_phase,
            &mut self.listener,
        );
        self.wake_touched(first_event);

        self.solve(dt, velocity_iterations, position_iterations);

        if self.config.sleep_enabled {
            self.update_sleep(dt);
        }
        for body in self.bodies.values_mut() {
            rigid_body::clear_forces(body);
        }
        self.narrow_phase.mark_events();
    }

    fn flush_removals(&mut self) {
        let pending = std::mem::take(&mut self.pending_removals);
        for handle in pending {
            if let Some(body) = self.destroy_collider(handle) {
                self.reset_mass_data(body);
            }
        }
    }

    fn apply_forces(&mut self, dt: f32) {
        for entry in self.forces.values_mut() {
            match entry.body {
                Some(handle) => {
                    if let Some(body) = self.bodies.get_mut(handle) {
                        if body.is_dynamic() && body.is_awake() {
                            entry.generator.apply_force(body, dt);
                        }
                    }
                }
                None => {
                    for body in self.bodies.values_mut() {
                        if body.is_dynamic() && body.is_awake() {
                            entry.generator.apply_force(body, dt);
                        }
                    }
                }
            }
        }

        let gravity = self.config.gravity;
        for body in self.bodies.values_mut() {
            rigid_body::apply_gravity(body, gravity);
            rigid_body::integrate_velocity(body, dt);
        }
    }

    /// Move the proxies of every body that moved since the last sync.
    fn synchronize_proxies(&mut self) {
        for body in self.bodies.values_mut() {
            let moving = body.is_awake() && !body.is_static();
            if !moving && !body.needs_sync {
                continue;
            }

            let xf = *body.transform();
            // Teleports carry no velocity to predict from.
            let displacement = if body.needs_sync {
                Vec2::ZERO
            } else {
                xf.position - body.synced_position
            };

            for &handle in &body.colliders {
                let Some(collider) = self.colliders.get(handle) else {
                    continue;
                };
                if let Some(proxy) = collider.proxy {
                    self.broad_phase
                        .move_proxy(proxy, collider.compute_aabb(&xf), displacement);
                }
            }
            body.synced_position = xf.position;
            body.needs_sync = false;
        }
    }

    /// Wake both sides of every solid touch that started or ended this step, then
    /// let awake bodies wake the sleeping bodies resting on them.
    fn wake_touched(&mut self, first_event: usize) {
        let mut to_wake: Vec<BodyHandle> = self.narrow_phase.events()[first_event..]
            .iter()
            .map(ContactEvent::pair)
            .filter(|pair| !pair.is_sensor)
            .flat_map(|pair| [pair.body_a, pair.body_b])
            .flatten()
            .collect();

        let wakes = |h: Option<BodyHandle>| {
            h.and_then(|h| self.bodies.get(h)).is_some_and(wakes_neighbours)
        };
        for (_, contact) in self.narrow_phase.iter() {
            if !contact.is_touching() || contact.is_sensor() {
                continue;
            }
            if wakes(contact.body_a) {
                to_wake.extend(contact.body_b);
            }
            if wakes(contact.body_b) {
                to_wake.extend(contact.body_a);
            }
        }

        for handle in to_wake {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.wake();
            }
        }
    }

    fn solve(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32) {
        let mut index = SecondaryMap::with_capacity(self.bodies.len());
        let mut solver_bodies = Vec::with_capacity(self.bodies.len() + 1);
        solver_bodies.push(SolverBody::GROUND);
        for (handle, body) in &self.bodies {
            index.insert(handle, solver_bodies.len());
            solver_bodies.push(SolverBody::from_body(handle, body));
        }

        let awake_dynamic = |h: Option<BodyHandle>| {
            h.and_then(|h| self.bodies.get(h))
                .is_some_and(|b| b.is_dynamic() && b.is_awake())
        };
        let active: Vec<ContactKey> = self
            .narrow_phase
            .iter()
            .filter(|(_, c)| c.is_touching() && !c.is_sensor())
            .filter(|(_, c)| awake_dynamic(c.body_a) || awake_dynamic(c.body_b))
            .map(|(key, _)| key)
            .collect();

        self.solver.pre_solve(
            self.narrow_phase.arena(),
            &active,
            &solver_bodies,
            &index,
            &self.config,
        );
        self.solver
            .warm_start(&mut solver_bodies, self.config.warm_starting);
        for _ in 0..velocity_iterations {
            self.solver.solve_velocity_constraints(&mut solver_bodies);
        }
        self.solver.store_impulses(self.narrow_phase.arena_mut());

        rigid_body::integrate_positions(
            &mut solver_bodies,
            dt,
            self.config.max_translation,
            self.config.max_rotation,
        );

        let mut iterations = 0;
        while iterations < position_iterations {
            iterations += 1;
            if self
                .solver
                .solve_position_constraints(&mut solver_bodies, &self.config)
            {
                break;
            }
        }

        for (handle, body) in self.bodies.iter_mut() {
            let Some(&slot) = index.get(handle) else {
                continue;
            };
            let state = &solver_bodies[slot];
            if state.movable {
                body.apply_solver_state(state);
            }
        }

        tracing::trace!(
            bodies = self.bodies.len(),
            contacts = self.narrow_phase.len(),
            constraints = self.solver.constraint_count(),
            position_iterations = iterations,
            "physics step"
        );
    }

    /// Put to sleep every island of touching bodies that has rested long enough.
    fn update_sleep(&mut self, dt: f32) {
        let config = &self.config;
        let mut slots: SecondaryMap<BodyHandle, usize> = SecondaryMap::new();
        let mut handles = Vec::new();
        let mut rest_times = Vec::new();

        for (handle, body) in self.bodies.iter_mut() {
            if body.is_static() || !body.is_awake() {
                continue;
            }
            let rest = rigid_body::update_sleep_timer(
                body,
                dt,
                config.linear_sleep_tolerance,
                config.angular_sleep_tolerance,
            );
            slots.insert(handle, handles.len());
            handles.push(handle);
            rest_times.push(rest);
        }

        let mut parent: Vec<usize> = (0..handles.len()).collect();
        for (_, contact) in self.narrow_phase.iter() {
            if !contact.is_touching() || contact.is_sensor() {
                continue;
            }
            let slot = |h: Option<BodyHandle>| h.and_then(|h| slots.get(h).copied());
            if let (Some(a), Some(b)) = (slot(contact.body_a), slot(contact.body_b)) {
                let (ra, rb) = (find_root(&mut parent, a), find_root(&mut parent, b));
                if ra != rb {
                    parent[ra] = rb;
                }
            }
        }

        let mut island_rest = vec![f32::MAX; handles.len()];
        for i in 0..handles.len() {
            let root = find_root(&mut parent, i);
            island_rest[root] = island_rest[root].min(rest_times[i]);
        }

        let mut slept = 0usize;
        for (i, &handle) in handles.iter().enumerate() {
            let root = find_root(&mut parent, i);
            if island_rest[root] >= config.time_to_sleep {
                if let Some(body) = self.bodies.get_mut(handle) {
                    body.set_awake(false);
                    slept += 1;
                }
            }
        }
        if slept > 0 {
            tracing::trace!(bodies = slept, "bodies fell asleep");
        }
    }

    /// Remove a collider from every structure. Returns the owning body.
    fn destroy_collider(&mut self, handle: ColliderHandle) -> Option<BodyHandle> {
        let collider = self.colliders.remove(handle)?;

        if let Some(proxy) = collider.proxy {
            let mut keys = Vec::new();
            self.broad_phase.destroy_proxy(proxy, |key| keys.push(key));
            for key in keys {
                let Some(contact) = self.narrow_phase.destroy_contact(key, &mut self.listener)
                else {
                    continue;
                };
                // Whatever rested on this collider must fall.
                if contact.is_touching() && !contact.is_sensor() {
                    for body in [contact.body_a, contact.body_b].into_iter().flatten() {
                        if let Some(b) = self.bodies.get_mut(body) {
                            b.wake();
                        }
                    }
                }
            }
        }

        match collider.body() {
            Some(body) => {
                if let Some(b) = self.bodies.get_mut(body) {
                    b.colliders.retain(|&c| c != handle);
                }
            }
            None => self.free_colliders.retain(|&c| c != handle),
        }
        self.pending_removals.retain(|&c| c != handle);

        tracing::debug!(collider = ?handle, "destroyed collider");
        collider.body()
    }

    /// Recompute a body's mass, center of mass and inertia from its colliders.
    fn reset_mass_data(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get(handle) else {
            return;
        };

        let mut total = MassProperties::default();
        let mut weighted_center = Vec2::ZERO;
        for collider in body.colliders.iter().filter_map(|&c| self.colliders.get(c)) {
            let props = collider
                .shape()
                .mass_properties(collider.material().density);
            total.mass += props.mass;
            weighted_center += props.center * props.mass;
            total.inertia += props.inertia;
        }
        if total.mass > 0.0 {
            total.center = weighted_center / total.mass;
        }

        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_mass_data(total);
        }
    }
}

/// Awake dynamic bodies, and kinematic bodies while they move, wake what they touch.
fn wakes_neighbours(body: &RigidBody) -> bool {
    if !body.is_awake() || body.is_static() {
        return false;
    }
    body.is_dynamic() || body.linear_velocity() != Vec2::ZERO || body.angular_velocity() != 0.0
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const DT: f32 = 1.0 / 60.0;

    fn world_without_gravity() -> PhysicsWorld {
        PhysicsWorld::new(PhysicsConfig::default().with_gravity(Vec2::ZERO))
    }

    fn add_ground(world: &mut PhysicsWorld) -> BodyHandle {
        let ground = world.create_body(&BodyDef::new_static());
        world
            .add_collider(Some(ground), &ColliderDef::new(Shape::cuboid(10.0, 0.5)))
            .unwrap();
        ground
    }

    fn add_ball(world: &mut PhysicsWorld, position: Vec2, def: ColliderDef) -> BodyHandle {
        let body = world.create_body(&BodyDef::new_dynamic().with_position(position));
        world.add_collider(Some(body), &def).unwrap();
        body
    }

    #[test]
    fn test_physics_config_default() {
        let config = PhysicsConfig::default();
        assert_eq!(config.gravity, Vec2::new(0.0, -10.0));
        assert_eq!(config.velocity_iterations, 8);
        assert_eq!(config.position_iterations, 10);
        assert!((config.fixed_timestep - 1.0 / 60.0).abs() < 1e-12);
        assert!(config.warm_starting && config.sleep_enabled);
        assert_eq!(config.linear_sleep_tolerance, 0.05);
        assert_eq!(config.angular_sleep_tolerance, 0.05);
        assert_eq!(config.time_to_sleep, 0.5);
        assert_eq!(config.max_substeps, 4);
    }

    #[test]
    fn test_free_fall() {
        let mut world = PhysicsWorld::default();
        let body = add_ball(
            &mut world,
            Vec2::new(0.0, 10.0),
            ColliderDef::new(Shape::circle(0.5)),
        );

        for _ in 0..60 {
            world.update(DT);
        }

        let b = world.body(body).unwrap();
        // Semi-implicit Euler: v = g * t, y = y0 - g * dt^2 * n(n+1)/2
        assert!((b.linear_velocity().y + 10.0).abs() < 1e-3, "vy = {}", b.linear_velocity().y);
        let expected = 10.0 - 10.0 * DT * DT * (60.0 * 61.0) / 2.0;
        assert!((b.position().y - expected).abs() < 1e-3, "y = {}", b.position().y);
    }

    #[test]
    fn test_mass_from_colliders() {
        let mut world = PhysicsWorld::default();
        let body = world.create_body(&BodyDef::new_dynamic());
        assert_eq!(world.body(body).unwrap().mass(), 1.0, "massless dynamic body defaults to 1");

        world
            .add_collider(Some(body), &ColliderDef::new(Shape::cuboid(1.0, 0.5)).with_density(2.0))
            .unwrap();
        let b = world.body(body).unwrap();
        assert!((b.mass() - 4.0).abs() < 1e-5, "mass = {}", b.mass());
        // m (hx^2 + hy^2) / 3
        assert!((b.inertia() - 4.0 * 1.25 / 3.0).abs() < 1e-4, "inertia = {}", b.inertia());
    }

    #[test]
    fn test_circle_contact_depth_and_normal() {
        let mut world = world_without_gravity();
        let a = add_ball(&mut world, Vec2::ZERO, ColliderDef::new(Shape::circle(1.0)));
        let b = add_ball(&mut world, Vec2::new(1.5, 0.0), ColliderDef::new(Shape::circle(1.0)));
        let collider_a = world.body(a).unwrap().colliders()[0];

        world.update(DT);

        let (_, contact) = world.contacts().next().expect("contact created");
        assert!(contact.is_touching());
        let manifold = contact.manifold().unwrap();
        assert_eq!(manifold.point_count(), 1);
        assert!((manifold.points()[0].penetration - 0.5).abs() < 1e-5);

        // Normal points from B toward A.
        let expected = if contact.collider_a() == collider_a {
            Vec2::new(-1.0, 0.0)
        } else {
            Vec2::new(1.0, 0.0)
        };
        assert!((manifold.normal - expected).length() < 1e-5, "normal = {:?}", manifold.normal);

        // Position correction pushed them apart.
        assert!(world.body(a).unwrap().position().x < 0.0);
        assert!(world.body(b).unwrap().position().x > 1.5);
    }

    #[test]
    fn test_elastic_collision_exchanges_velocity() {
        let mut world = world_without_gravity();
        let def = ColliderDef::new(Shape::circle(0.5)).with_material(PhysicsMaterial::elastic());
        let a = world.create_body(
            &BodyDef::new_dynamic()
                .with_position(Vec2::new(-1.0, 0.0))
                .with_linear_velocity(Vec2::new(5.0, 0.0)),
        );
        let b = world.create_body(
            &BodyDef::new_dynamic()
                .with_position(Vec2::new(1.0, 0.0))
                .with_linear_velocity(Vec2::new(-5.0, 0.0)),
        );
        world.add_collider(Some(a), &def).unwrap();
        world.add_collider(Some(b), &def).unwrap();

        for _ in 0..30 {
            world.update(DT);
        }

        let va = world.body(a).unwrap().linear_velocity();
        let vb = world.body(b).unwrap().linear_velocity();
        assert!((va.x + 5.0).abs() < 0.05, "va = {va:?}");
        assert!((vb.x - 5.0).abs() < 0.05, "vb = {vb:?}");
        assert!((va + vb).length() < 1e-3, "momentum not conserved: {:?}", va + vb);
    }

    #[test]
    fn test_resting_box_settles_near_slop() {
        let mut world = PhysicsWorld::default();
        let ground = add_ground(&mut world);
        let ground_pos = world.body(ground).unwrap().position();
        let body = world.create_body(&BodyDef::new_dynamic().with_position(Vec2::new(0.0, 1.2)));
        world
            .add_collider(Some(body), &ColliderDef::new(Shape::cuboid(0.5, 0.5)))
            .unwrap();

        for _ in 0..300 {
            world.update(DT);
        }

        let b = world.body(body).unwrap();
        assert!((b.position().y - 1.0).abs() < 0.02, "y = {}", b.position().y);
        assert!(b.angle().abs() < 1e-2, "angle = {}", b.angle());
        assert!(!b.is_awake(), "resting box should fall asleep");
        assert_eq!(world.body(ground).unwrap().position(), ground_pos);

        let slop = world.config().linear_slop;
        let (_, contact) = world.contacts().next().expect("resting contact");
        let depth = contact.manifold().unwrap().max_penetration();
        assert!(depth <= slop + 1e-3, "penetration {depth} exceeds slop");
        for point in contact.manifold().unwrap().points() {
            assert!(point.normal_impulse >= 0.0, "impulse must push, never pull");
        }
    }

    #[test]
    fn test_static_body_is_immovable() {
        let mut world = PhysicsWorld::default();
        let wall = world.create_body(&BodyDef::new_static().with_position(Vec2::new(2.0, 0.0)));
        world
            .add_collider(Some(wall), &ColliderDef::new(Shape::cuboid(0.5, 2.0)))
            .unwrap();
        world.config_mut().gravity = Vec2::ZERO;
        let ball = world.create_body(&BodyDef::new_dynamic().with_linear_velocity(Vec2::new(8.0, 0.0)));
        world
            .add_collider(Some(ball), &ColliderDef::new(Shape::circle(0.5)))
            .unwrap();

        for _ in 0..60 {
            world.update(DT);
        }

        let w = world.body(wall).unwrap();
        assert_eq!(w.position(), Vec2::new(2.0, 0.0));
        assert_eq!(w.linear_velocity(), Vec2::ZERO);
        assert_eq!(w.inv_mass(), 0.0);
        assert!(world.body(ball).unwrap().position().x < 1.5, "ball passed through the wall");
    }

    #[test]
    fn test_sensor_reports_without_response() {
        let mut world = PhysicsWorld::default();
        world
            .add_collider(None, &ColliderDef::new(Shape::cuboid(5.0, 0.5)).sensor())
            .unwrap();
        let falling = add_ball(&mut world, Vec2::new(0.0, 2.0), ColliderDef::new(Shape::circle(0.25)));
        let reference = add_ball(&mut world, Vec2::new(50.0, 2.0), ColliderDef::new(Shape::circle(0.25)));

        let mut begins = 0;
        let mut ends = 0;
        for _ in 0..90 {
            world.update(DT);
            for event in world.drain_contact_events() {
                assert!(event.pair().is_sensor);
                match event {
                    ContactEvent::Begin(_) => begins += 1,
                    ContactEvent::End(_) => ends += 1,
                }
            }
        }

        assert_eq!((begins, ends), (1, 1), "sensor crossing fires begin and end once");
        let vy = world.body(falling).unwrap().linear_velocity().y;
        let vy_ref = world.body(reference).unwrap().linear_velocity().y;
        assert!((vy - vy_ref).abs() < 1e-5, "sensor changed velocity: {vy} vs {vy_ref}");
    }

    #[derive(Default)]
    struct Recorder {
        begins: Vec<(ColliderHandle, ColliderHandle)>,
        ends: Vec<(ColliderHandle, ColliderHandle)>,
    }

    struct SharedRecorder(Rc<RefCell<Recorder>>);

    impl ContactListener for SharedRecorder {
        fn on_contact_begin(&mut self, contact: &ContactInfo) {
            self.0
                .borrow_mut()
                .begins
                .push((contact.collider_a(), contact.collider_b()));
        }

        fn on_contact_end(&mut self, contact: &ContactInfo) {
            self.0
                .borrow_mut()
                .ends
                .push((contact.collider_a(), contact.collider_b()));
        }
    }

    #[test]
    fn test_listener_sees_begin_once_while_touching() {
        let mut world = PhysicsWorld::default();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        world.set_contact_listener(Box::new(SharedRecorder(recorder.clone())));
        add_ground(&mut world);
        add_ball(&mut world, Vec2::new(0.0, 1.0), ColliderDef::new(Shape::circle(0.5)));

        for _ in 0..120 {
            world.update(DT);
        }

        assert_eq!(recorder.borrow().begins.len(), 1);
        assert!(recorder.borrow().ends.is_empty());

        world.clear_contact_listener();
        world.update(DT);
        assert_eq!(recorder.borrow().begins.len(), 1);
    }

    #[test]
    fn test_remove_collider_is_deferred() {
        let mut world = PhysicsWorld::default();
        add_ground(&mut world);
        let ball = add_ball(&mut world, Vec2::new(0.0, 1.0), ColliderDef::new(Shape::circle(0.5)));
        for _ in 0..10 {
            world.update(DT);
        }
        world.drain_contact_events().for_each(drop);
        let collider = world.body(ball).unwrap().colliders()[0];

        world.remove_collider(collider).unwrap();
        assert!(world.collider(collider).unwrap().is_pending_removal());
        assert_eq!(world.contact_count(), 1, "contacts survive until the next update");

        world.update(DT);
        assert!(world.collider(collider).is_none());
        assert_eq!(world.contact_count(), 0);
        assert!(world.body(ball).unwrap().colliders().is_empty());
        let events: Vec<_> = world.drain_contact_events().collect();
        assert!(matches!(events.as_slice(), [ContactEvent::End(pair)] if pair.involves(collider)));
    }

    #[test]
    fn test_delete_collider_is_immediate() {
        let mut world = PhysicsWorld::default();
        add_ground(&mut world);
        let ball = add_ball(&mut world, Vec2::new(0.0, 1.0), ColliderDef::new(Shape::circle(0.5)));
        for _ in 0..10 {
            world.update(DT);
        }
        world.drain_contact_events().for_each(drop);
        let collider = world.body(ball).unwrap().colliders()[0];

        world.delete_collider(collider).unwrap();
        assert!(world.collider(collider).is_none());
        assert_eq!(world.contact_count(), 0);
        assert_eq!(world.broad_phase().proxy_count(), 1);
        assert_eq!(world.drain_contact_events().count(), 1);
        assert_eq!(world.body(ball).unwrap().mass(), 1.0);
        assert!(world.delete_collider(collider).is_err());
    }

    #[test]
    fn test_remove_body_cleans_up() {
        let mut world = PhysicsWorld::default();
        add_ground(&mut world);
        let ball = add_ball(&mut world, Vec2::new(0.0, 1.0), ColliderDef::new(Shape::circle(0.5)));
        world
            .add_body_force(Box::new(ConstantForce::new(Vec2::X)), ball)
            .unwrap();
        world.update(DT);

        world.remove_body(ball).unwrap();
        assert!(world.body(ball).is_none());
        assert_eq!(world.collider_count(), 1);
        assert_eq!(world.contact_count(), 0);
        assert_eq!(world.broad_phase().proxy_count(), 1);

        assert_eq!(world.remove_body(ball), Err(PhysicsError::BodyNotFound(ball)));
        assert!(matches!(
            world.add_collider(Some(ball), &ColliderDef::new(Shape::circle(1.0))),
            Err(PhysicsError::BodyNotFound(_))
        ));
        assert!(world.add_body_force(Box::new(Gravity::new(Vec2::Y)), ball).is_err());
        world.update(DT);
    }

    #[test]
    fn test_invalid_collider_rejected() {
        let mut world = PhysicsWorld::default();
        let body = world.create_body(&BodyDef::new_dynamic());
        let result = world.add_collider(Some(body), &ColliderDef::new(Shape::circle(-1.0)));
        assert!(matches!(result, Err(PhysicsError::InvalidShape(_))));
        assert_eq!(world.collider_count(), 0);
        assert_eq!(world.broad_phase().proxy_count(), 0);
    }

    #[test]
    fn test_non_positive_dt_is_ignored() {
        let mut world = PhysicsWorld::default();
        let ball = add_ball(&mut world, Vec2::new(0.0, 5.0), ColliderDef::new(Shape::circle(0.5)));
        world.update(0.0);
        world.update(-1.0);
        world.update(f32::NAN);
        assert_eq!(world.body(ball).unwrap().position(), Vec2::new(0.0, 5.0));
    }

    #[test]
    fn test_step_accumulator() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default().with_fixed_timestep(0.25));
        assert_eq!(world.step(0.5), 2);
        assert_eq!(world.step(0.125), 0);
        assert_eq!(world.step(0.125), 1);
        // Long frames are capped at max_substeps.
        assert_eq!(world.step(10.0), 4);
        assert_eq!(world.step(0.0), 0);
    }

    #[test]
    fn test_force_generators() {
        let mut world = world_without_gravity();
        let pushed = add_ball(&mut world, Vec2::ZERO, ColliderDef::new(Shape::circle(0.5)));
        let idle = add_ball(&mut world, Vec2::new(10.0, 0.0), ColliderDef::new(Shape::circle(0.5)));

        let push = world
            .add_body_force(Box::new(ConstantForce::new(Vec2::new(1.0, 0.0))), pushed)
            .unwrap();
        let lift = world.add_force(Box::new(Gravity::new(Vec2::new(0.0, 2.0))));
        world.update(DT);

        let vp = world.body(pushed).unwrap().linear_velocity();
        let vi = world.body(idle).unwrap().linear_velocity();
        assert!(vp.x > 0.0 && vi.x == 0.0);
        assert!((vp.y - 2.0 * DT).abs() < 1e-5 && (vi.y - 2.0 * DT).abs() < 1e-5);

        world.remove_force(push).unwrap();
        world.remove_force(lift).unwrap();
        assert_eq!(world.remove_force(lift), Err(PhysicsError::ForceNotFound(lift)));
        let before = world.body(pushed).unwrap().linear_velocity();
        world.update(DT);
        assert_eq!(world.body(pushed).unwrap().linear_velocity(), before);
    }

    #[test]
    fn test_sleeping_body_wakes_on_impulse() {
        let mut world = PhysicsWorld::default();
        add_ground(&mut world);
        let ball = add_ball(&mut world, Vec2::new(0.0, 1.0), ColliderDef::new(Shape::circle(0.5)));
        for _ in 0..120 {
            world.update(DT);
        }
        assert!(!world.body(ball).unwrap().is_awake());

        let b = world.body_mut(ball).unwrap();
        let center = b.world_center();
        b.apply_linear_impulse(Vec2::new(0.0, 5.0), center);
        assert!(b.is_awake());
        world.update(DT);
        assert!(world.body(ball).unwrap().position().y > 1.0);
    }

    #[test]
    fn test_falling_body_wakes_sleeping_stack() {
        let mut world = PhysicsWorld::default();
        add_ground(&mut world);
        let bottom = add_ball(&mut world, Vec2::new(0.0, 1.0), ColliderDef::new(Shape::cuboid(0.5, 0.5)));
        for _ in 0..120 {
            world.update(DT);
        }
        assert!(!world.body(bottom).unwrap().is_awake());

        add_ball(&mut world, Vec2::new(0.0, 4.0), ColliderDef::new(Shape::circle(0.5)));
        let mut woke = false;
        for _ in 0..120 {
            world.update(DT);
            woke |= world.body(bottom).unwrap().is_awake();
        }
        assert!(woke, "impact should wake the resting box");
    }

    #[test]
    fn test_moving_kinematic_wakes_sleeping_passenger() {
        let mut world = PhysicsWorld::default();
        let lift = world.create_body(&BodyDef::new_kinematic());
        world
            .add_collider(Some(lift), &ColliderDef::new(Shape::cuboid(2.0, 0.5)))
            .unwrap();
        let crate_box = add_ball(&mut world, Vec2::new(0.0, 1.0), ColliderDef::new(Shape::cuboid(0.5, 0.5)));
        for _ in 0..120 {
            world.update(DT);
        }
        assert!(!world.body(crate_box).unwrap().is_awake());

        world.body_mut(lift).unwrap().set_linear_velocity(Vec2::new(0.0, 2.0));
        for _ in 0..60 {
            world.update(DT);
        }

        let lift_y = world.body(lift).unwrap().position().y;
        let box_y = world.body(crate_box).unwrap().position().y;
        assert!((lift_y - 2.0).abs() < 1e-3, "lift at {lift_y}");
        assert!(world.body(crate_box).unwrap().is_awake());
        assert!((box_y - lift_y - 1.0).abs() < 0.1, "box at {box_y}, lift at {lift_y}");
    }

    #[test]
    fn test_undrained_events_expire() {
        let mut world = world_without_gravity();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        world.set_contact_listener(Box::new(SharedRecorder(recorder.clone())));
        world
            .add_collider(None, &ColliderDef::new(Shape::circle(1.0)).sensor())
            .unwrap();
        let ball = add_ball(&mut world, Vec2::ZERO, ColliderDef::new(Shape::circle(0.5)));

        for i in 0..200 {
            if i % 10 == 0 {
                let target = if i % 20 == 0 { Vec2::ZERO } else { Vec2::new(10.0, 0.0) };
                world.body_mut(ball).unwrap().set_position(target);
            }
            world.update(DT);
            let queued = world.narrow_phase.events().len();
            assert!(queued <= 2, "{queued} events queued after update {i}");
        }

        assert_eq!(recorder.borrow().begins.len(), 10);
        assert_eq!(recorder.borrow().ends.len(), 10);
    }

    #[test]
    fn test_events_queued_between_updates_survive_one_update() {
        let mut world = PhysicsWorld::default();
        add_ground(&mut world);
        let ball = add_ball(&mut world, Vec2::new(0.0, 1.0), ColliderDef::new(Shape::circle(0.5)));
        for _ in 0..10 {
            world.update(DT);
        }
        let collider = world.body(ball).unwrap().colliders()[0];

        world.delete_collider(collider).unwrap();
        world.update(DT);
        let events: Vec<_> = world.drain_contact_events().collect();
        assert!(matches!(events.as_slice(), [ContactEvent::End(pair)] if pair.involves(collider)));
    }

    #[test]
    fn test_filtered_pair_never_touches() {
        let mut world = PhysicsWorld::default();
        let ground = world.create_body(&BodyDef::new_static());
        world
            .add_collider(
                Some(ground),
                &ColliderDef::new(Shape::cuboid(10.0, 0.5)).with_filter(CollisionFilter::new(0b01, 0b01)),
            )
            .unwrap();
        let ball = add_ball(
            &mut world,
            Vec2::new(0.0, 1.0),
            ColliderDef::new(Shape::circle(0.5)).with_filter(CollisionFilter::new(0b10, 0b10)),
        );

        for _ in 0..60 {
            world.update(DT);
        }
        assert_eq!(world.contact_count(), 0);
        assert!(world.body(ball).unwrap().position().y < 0.0, "ball should fall through");
    }

    #[test]
    fn test_query_aabb_finds_colliders() {
        let mut world = PhysicsWorld::default();
        add_ground(&mut world);
        let free = world
            .add_collider(None, &ColliderDef::new(Shape::circle(1.0)).sensor())
            .unwrap();
        assert_eq!(world.free_colliders(), &[free]);

        let mut found = Vec::new();
        world.query_aabb(&Aabb::new(Vec2::splat(-0.1), Vec2::splat(0.1)), |c| {
            found.push(c);
            true
        });
        assert_eq!(found.len(), 2);
        assert!(found.contains(&free));
    }
}
