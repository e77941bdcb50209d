//! Narrowphase: owns contact records and keeps their manifolds current.

use slotmap::SlotMap;

use crate::geometry::Transform2d;

use super::broadphase::{BroadPhase, ProxyData};
use super::bvh::ProxyId;
use super::collide::ContactRegistry;
use super::collider::Collider;
use super::contact::{ContactEvent, ContactInfo, ContactListener};
use super::rigid_body::RigidBody;
use super::{BodyHandle, ColliderHandle, ContactKey};

/// Optional user listener, as stored by the world.
pub type ListenerSlot = Option<Box<dyn ContactListener>>;

/// Contact records threaded into a doubly linked list, plus the dispatch table.
pub struct NarrowPhase {
    contacts: SlotMap<ContactKey, ContactInfo>,
    head: Option<ContactKey>,
    registry: ContactRegistry,
    events: Vec<ContactEvent>,
    /// Events older than the last update, dropped at the start of the next one.
    stale: usize,
}

impl Default for NarrowPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl NarrowPhase {
    pub fn new() -> Self {
        Self {
            contacts: SlotMap::with_key(),
            head: None,
            registry: ContactRegistry::new(),
            events: Vec::new(),
            stale: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    #[inline]
    pub fn get(&self, key: ContactKey) -> Option<&ContactInfo> {
        self.contacts.get(key)
    }

    /// Backing arena, for the solver.
    #[inline]
    pub(crate) fn arena(&self) -> &SlotMap<ContactKey, ContactInfo> {
        &self.contacts
    }

    #[inline]
    pub(crate) fn arena_mut(&mut self) -> &mut SlotMap<ContactKey, ContactInfo> {
        &mut self.contacts
    }

    #[inline]
    pub fn registry(&self) -> &ContactRegistry {
        &self.registry
    }

    /// Walk the contact list, newest first.
    pub fn iter(&self) -> ContactIter<'_> {
        ContactIter {
            contacts: &self.contacts,
            cursor: self.head,
        }
    }

    /// Events queued since the last drain.
    #[inline]
    pub fn events(&self) -> &[ContactEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> std::vec::Drain<'_, ContactEvent> {
        self.stale = 0;
        self.events.drain(..)
    }

    /// Drop events that were already queued when the previous update ended.
    pub(crate) fn expire_events(&mut self) {
        let stale = self.stale.min(self.events.len());
        self.events.drain(..stale);
        self.stale = 0;
    }

    /// Mark everything queued so far as expiring at the next update.
    pub(crate) fn mark_events(&mut self) {
        self.stale = self.events.len();
    }

    /// Create a contact record for a new broad-phase pair.
    ///
    /// Returns `None` when the pair can never touch: unknown colliders, filter
    /// rejection, no routine for the shape pair, or no dynamic body involved.
    pub fn create_contact(
        &mut self,
        bodies: &SlotMap<BodyHandle, RigidBody>,
        colliders: &SlotMap<ColliderHandle, Collider>,
        proxy_a: ProxyId,
        data_a: ProxyData,
        proxy_b: ProxyId,
        data_b: ProxyData,
    ) -> Option<ContactKey> {
        let collider_a = colliders.get(data_a.collider)?;
        let collider_b = colliders.get(data_b.collider)?;

        if !collider_a.filter().can_collide(collider_b.filter())
            || !should_collide(bodies, data_a.body, data_b.body)
        {
            return None;
        }

        let registration = self
            .registry
            .lookup(collider_a.shape_type(), collider_b.shape_type())?;

        // Put the colliders in the order the routine expects.
        let ((pa, da, ca), (pb, db, cb)) = if registration.primary {
            ((proxy_a, data_a, collider_a), (proxy_b, data_b, collider_b))
        } else {
            ((proxy_b, data_b, collider_b), (proxy_a, data_a, collider_a))
        };

        let contact = ContactInfo {
            collider_a: da.collider,
            collider_b: db.collider,
            body_a: da.body,
            body_b: db.body,
            proxy_a: pa,
            proxy_b: pb,
            touching: false,
            is_sensor: ca.is_sensor() || cb.is_sensor(),
            friction: ca.material().friction.max(cb.material().friction),
            restitution: ca.material().restitution.max(cb.material().restitution),
            user_data_a: ca.user_data(),
            user_data_b: cb.user_data(),
            manifold: None,
            collide: registration.collide,
            prev: None,
            next: self.head,
        };

        let key = self.contacts.insert(contact);
        if let Some(old_head) = self.head {
            if let Some(head) = self.contacts.get_mut(old_head) {
                head.prev = Some(key);
            }
        }
        self.head = Some(key);
        Some(key)
    }

    /// Unlink and drop a record. Fires an end event if it was touching.
    pub fn destroy_contact(
        &mut self,
        key: ContactKey,
        listener: &mut ListenerSlot,
    ) -> Option<ContactInfo> {
        let contact = self.contacts.remove(key)?;

        match contact.prev {
            Some(prev) => {
                if let Some(p) = self.contacts.get_mut(prev) {
                    p.next = contact.next;
                }
            }
            None => self.head = contact.next,
        }
        if let Some(next) = contact.next {
            if let Some(n) = self.contacts.get_mut(next) {
                n.prev = contact.prev;
            }
        }

        if contact.touching {
            fire(&mut self.events, listener, &contact, false);
        }
        Some(contact)
    }

    /// Update every contact whose pair involves an awake body.
    ///
    /// Pairs whose fat boxes separated or whose filters now reject each other are
    /// removed from the broad phase and destroyed. The rest get a fresh manifold.
    pub fn collide(
        &mut self,
        bodies: &SlotMap<BodyHandle, RigidBody>,
        colliders: &SlotMap<ColliderHandle, Collider>,
        broad_phase: &mut BroadPhase<ContactKey>,
        listener: &mut ListenerSlot,
    ) {
        let mut cursor = self.head;
        while let Some(key) = cursor {
            let Some(contact) = self.contacts.get(key) else {
                break;
            };
            cursor = contact.next;

            let (Some(collider_a), Some(collider_b)) = (
                colliders.get(contact.collider_a),
                colliders.get(contact.collider_b),
            ) else {
                debug_assert!(false, "contact outlived its colliders");
                self.destroy_contact(key, listener);
                continue;
            };

            if !is_awake_mover(bodies, contact.body_a) && !is_awake_mover(bodies, contact.body_b) {
                continue;
            }

            let (proxy_a, proxy_b) = (contact.proxy_a, contact.proxy_b);
            let keep = collider_a.filter().can_collide(collider_b.filter())
                && should_collide(bodies, contact.body_a, contact.body_b)
                && broad_phase.test_overlap(proxy_a, proxy_b);
            if !keep {
                broad_phase.remove_pair(proxy_a, proxy_b);
                self.destroy_contact(key, listener);
                continue;
            }

            self.update_contact(key, bodies, collider_a, collider_b, listener);
        }
    }

    fn update_contact(
        &mut self,
        key: ContactKey,
        bodies: &SlotMap<BodyHandle, RigidBody>,
        collider_a: &Collider,
        collider_b: &Collider,
        listener: &mut ListenerSlot,
    ) {
        let Some(contact) = self.contacts.get_mut(key) else {
            return;
        };

        let xf_a = transform_of(bodies, contact.body_a);
        let xf_b = transform_of(bodies, contact.body_b);
        let mut manifold = (contact.collide)(collider_a.shape(), &xf_a, collider_b.shape(), &xf_b);
        let touching = !manifold.is_empty();

        contact.is_sensor = collider_a.is_sensor() || collider_b.is_sensor();
        if !contact.is_sensor {
            if let Some(old) = &contact.manifold {
                manifold.inherit_impulses(old);
            }
        }
        contact.manifold = Some(manifold);

        let was_touching = contact.touching;
        contact.touching = touching;
        if touching != was_touching {
            fire(&mut self.events, listener, contact, touching);
        }
    }
}

fn fire(
    events: &mut Vec<ContactEvent>,
    listener: &mut ListenerSlot,
    contact: &ContactInfo,
    begin: bool,
) {
    let pair = contact.pair();
    tracing::trace!(
        collider_a = ?pair.collider_a,
        collider_b = ?pair.collider_b,
        sensor = pair.is_sensor,
        "contact {}",
        if begin { "begin" } else { "end" }
    );
    if begin {
        events.push(ContactEvent::Begin(pair));
        if let Some(l) = listener.as_mut() {
            l.on_contact_begin(contact);
        }
    } else {
        events.push(ContactEvent::End(pair));
        if let Some(l) = listener.as_mut() {
            l.on_contact_end(contact);
        }
    }
}

/// World pose of a collider's owner; free colliders live in world space.
#[inline]
pub(crate) fn transform_of(
    bodies: &SlotMap<BodyHandle, RigidBody>,
    body: Option<BodyHandle>,
) -> Transform2d {
    body.and_then(|h| bodies.get(h))
        .map(|b| *b.transform())
        .unwrap_or(Transform2d::IDENTITY)
}

#[inline]
fn is_awake_mover(bodies: &SlotMap<BodyHandle, RigidBody>, body: Option<BodyHandle>) -> bool {
    body.and_then(|h| bodies.get(h))
        .is_some_and(|b| b.is_awake() && !b.is_static())
}

/// At least one side must be a dynamic body.
#[inline]
fn should_collide(
    bodies: &SlotMap<BodyHandle, RigidBody>,
    body_a: Option<BodyHandle>,
    body_b: Option<BodyHandle>,
) -> bool {
    let dynamic = |h: Option<BodyHandle>| {
        h.and_then(|h| bodies.get(h))
            .is_some_and(|b| b.is_dynamic())
    };
    dynamic(body_a) || dynamic(body_b)
}

/// Iterator over the contact list.
pub struct ContactIter<'a> {
    contacts: &'a SlotMap<ContactKey, ContactInfo>,
    cursor: Option<ContactKey>,
}

impl<'a> Iterator for ContactIter<'a> {
    type Item = (ContactKey, &'a ContactInfo);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cursor?;
        let contact = self.contacts.get(key)?;
        self.cursor = contact.next;
        Some((key, contact))
    }
}
