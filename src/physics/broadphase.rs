//! Broadphase collision detection over the dynamic AABB tree.
//!
//! Proxies whose fat box changed are buffered; `find_contacts` queries only those
//! and records every new overlapping pair exactly once, along with the contact
//! handle the narrow phase created for it.

use std::collections::HashMap;

use glam::Vec2;

use crate::geometry::Aabb;

use super::bvh::{DynamicTree, ProxyId};
use super::{BodyHandle, ColliderHandle};

/// What the broad phase knows about a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyData {
    pub collider: ColliderHandle,
    pub body: Option<BodyHandle>,
}

/// One direction of a recorded pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairEntry {
    pub other: ProxyId,
    /// Exactly one of the two entries of a pair is primary.
    pub primary: bool,
}

#[inline]
fn pair_key(a: ProxyId, b: ProxyId) -> (ProxyId, ProxyId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Pair manager on top of [`DynamicTree`]. `K` is the narrow-phase contact handle.
#[derive(Debug, Clone)]
pub struct BroadPhase<K> {
    tree: DynamicTree<ProxyData>,
    move_buffer: Vec<ProxyId>,
    pairs: HashMap<ProxyId, Vec<PairEntry>>,
    contacts: HashMap<(ProxyId, ProxyId), K>,
}

impl<K: Copy> Default for BroadPhase<K> {
    fn default() -> Self {
        Self::new(0.1, 4.0)
    }
}

impl<K: Copy> BroadPhase<K> {
    pub fn new(margin: f32, displacement_multiplier: f32) -> Self {
        Self {
            tree: DynamicTree::new(margin, displacement_multiplier),
            move_buffer: Vec::new(),
            pairs: HashMap::new(),
            contacts: HashMap::new(),
        }
    }

    /// Register a proxy for a tight `aabb`. New proxies are queried on the next pass.
    pub fn create_proxy(&mut self, aabb: Aabb, data: ProxyData) -> ProxyId {
        let id = self.tree.insert(data, aabb);
        self.move_buffer.push(id);
        id
    }

    /// Remove a proxy and every pair it takes part in. `on_pair_destroy` receives
    /// the contact handle of each dropped pair.
    pub fn destroy_proxy<F>(&mut self, id: ProxyId, mut on_pair_destroy: F) -> Option<ProxyData>
    where
        F: FnMut(K),
    {
        if let Some(entries) = self.pairs.remove(&id) {
            for entry in entries {
                if let Some(list) = self.pairs.get_mut(&entry.other) {
                    list.retain(|e| e.other != id);
                    if list.is_empty() {
                        self.pairs.remove(&entry.other);
                    }
                }
                if let Some(key) = self.contacts.remove(&pair_key(id, entry.other)) {
                    on_pair_destroy(key);
                }
            }
        }
        self.move_buffer.retain(|&m| m != id);
        self.tree.remove(id)
    }

    /// Update a proxy for its new tight box. Buffers the proxy when its fat box changed.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: Aabb, displacement: Vec2) -> bool {
        let moved = self.tree.move_proxy(id, aabb, displacement);
        if moved {
            self.move_buffer.push(id);
        }
        moved
    }

    /// Force a proxy to be re-queried without moving it, e.g. after a filter change.
    pub fn touch_proxy(&mut self, id: ProxyId) {
        self.move_buffer.push(id);
    }

    /// Query every buffered proxy and hand each new pair to `on_pair_create`.
    ///
    /// Self pairs, pairs already recorded and pairs on the same body are skipped.
    /// A pair is recorded only if the callback returns a contact handle for it.
    pub fn find_contacts<F>(&mut self, mut on_pair_create: F)
    where
        F: FnMut(ProxyId, ProxyData, ProxyId, ProxyData) -> Option<K>,
    {
        let mut moved = std::mem::take(&mut self.move_buffer);

        let mut candidates = Vec::new();
        for &id in &moved {
            let Some(fat) = self.tree.fat_aabb(id) else {
                continue;
            };
            self.tree.query(&fat, |other| {
                if other != id {
                    candidates.push((id, other));
                }
                true
            });
        }

        for (a, b) in candidates {
            if self.contacts.contains_key(&pair_key(a, b)) {
                continue;
            }
            let (Some(&data_a), Some(&data_b)) = (self.tree.payload(a), self.tree.payload(b))
            else {
                continue;
            };
            if data_a.body.is_some() && data_a.body == data_b.body {
                continue;
            }
            if let Some(key) = on_pair_create(a, data_a, b, data_b) {
                self.add_pair(a, b, key);
            }
        }

        moved.clear();
        self.move_buffer = moved;
    }

    fn add_pair(&mut self, a: ProxyId, b: ProxyId, key: K) {
        self.pairs.entry(a).or_default().push(PairEntry {
            other: b,
            primary: true,
        });
        self.pairs.entry(b).or_default().push(PairEntry {
            other: a,
            primary: false,
        });
        self.contacts.insert(pair_key(a, b), key);
    }

    /// Forget a pair, returning its contact handle.
    pub fn remove_pair(&mut self, a: ProxyId, b: ProxyId) -> Option<K> {
        let key = self.contacts.remove(&pair_key(a, b));
        debug_assert!(key.is_some(), "removing unknown pair {a:?}-{b:?}");
        for (from, to) in [(a, b), (b, a)] {
            if let Some(list) = self.pairs.get_mut(&from) {
                list.retain(|e| e.other != to);
                if list.is_empty() {
                    self.pairs.remove(&from);
                }
            }
        }
        key
    }

    /// Do the fat boxes of two proxies overlap?
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        match (self.tree.fat_aabb(a), self.tree.fat_aabb(b)) {
            (Some(fa), Some(fb)) => fa.overlaps(&fb),
            _ => false,
        }
    }

    pub fn contact_key(&self, a: ProxyId, b: ProxyId) -> Option<K> {
        self.contacts.get(&pair_key(a, b)).copied()
    }

    /// Pairs a proxy takes part in.
    pub fn pairs_of(&self, id: ProxyId) -> &[PairEntry] {
        self.pairs.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn pair_count(&self) -> usize {
        self.contacts.len()
    }

    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    #[inline]
    pub fn fat_aabb(&self, id: ProxyId) -> Option<Aabb> {
        self.tree.fat_aabb(id)
    }

    #[inline]
    pub fn proxy_data(&self, id: ProxyId) -> Option<&ProxyData> {
        self.tree.payload(id)
    }

    #[inline]
    pub fn tree(&self) -> &DynamicTree<ProxyData> {
        &self.tree
    }
}
