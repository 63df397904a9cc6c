//! `DynamicRegistry` (§4.C): owns user-defined force/constraint objects,
//! maps body → set of dynamics for constraint-based ownership infection
//! (§4.F), and applies/removes them on the world.
//!
//! Guarded by a reentrant mutex (§5 "DynamicRegistry is protected by a
//! recursive mutex because dynamics may be added/removed from a script
//! thread") — `add`/`remove` can be called while a `for_each` callback
//! higher on the same thread's stack still holds the lock. All
//! **application** of dynamics happens on the simulation thread while the
//! mutex is not held: callers drain a snapshot, release the lock, then run.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use parking_lot::ReentrantMutex;
use rapier3d::prelude::RigidBodyHandle;
use uuid::Uuid;

use super::{Dynamic, DynamicId};

struct Inner {
    dynamics: HashMap<DynamicId, (Dynamic, Uuid, Option<Uuid>)>,
    dynamics_by_body: HashMap<RigidBodyHandle, HashSet<DynamicId>>,
    owner_to_body: HashMap<Uuid, RigidBodyHandle>,
}

pub struct DynamicRegistry {
    inner: ReentrantMutex<RefCell<Inner>>,
}

impl DynamicRegistry {
    pub fn new() -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Inner {
                dynamics: HashMap::new(),
                dynamics_by_body: HashMap::new(),
                owner_to_body: HashMap::new(),
            })),
        }
    }

    pub fn bind_body(&self, owner_entity: Uuid, body: RigidBodyHandle) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.owner_to_body.insert(owner_entity, body);
    }

    pub fn unbind_body(&self, owner_entity: Uuid) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.owner_to_body.remove(&owner_entity);
    }

    pub fn add(&self, id: DynamicId, owner_entity: Uuid, other_entity: Option<Uuid>, dynamic: Dynamic) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if let Some(&body) = inner.owner_to_body.get(&owner_entity) {
            inner.dynamics_by_body.entry(body).or_default().insert(id);
        }
        inner.dynamics.insert(id, (dynamic, owner_entity, other_entity));
    }

    pub fn remove(&self, id: DynamicId) -> Option<Dynamic> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let (dynamic, owner_entity, _other) = inner.dynamics.remove(&id)?;
        if let Some(&body) = inner.owner_to_body.get(&owner_entity) {
            if let Some(set) = inner.dynamics_by_body.get_mut(&body) {
                set.remove(&id);
                if set.is_empty() {
                    inner.dynamics_by_body.remove(&body);
                }
            }
        }
        Some(dynamic)
    }

    pub fn get_by_id(&self, id: DynamicId) -> Option<Dynamic> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        inner.dynamics.get(&id).map(|(d, _, _)| d.clone())
    }

    /// Bodies that share at least one dynamic with `body` (§4.F ownership
    /// infection for constraints: "walk all bodies sharing a dynamic").
    pub fn bodies_sharing_a_dynamic_with(&self, body: RigidBodyHandle) -> Vec<RigidBodyHandle> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        let Some(ids) = inner.dynamics_by_body.get(&body) else {
            return Vec::new();
        };
        let mut others = HashSet::new();
        for id in ids {
            if let Some((_, owner, other)) = inner.dynamics.get(id) {
                if let Some(owner_body) = inner.owner_to_body.get(owner) {
                    if *owner_body != body {
                        others.insert(*owner_body);
                    }
                }
                if let Some(other_id) = other {
                    if let Some(other_body) = inner.owner_to_body.get(other_id) {
                        if *other_body != body {
                            others.insert(*other_body);
                        }
                    }
                }
            }
        }
        others.into_iter().collect()
    }

    pub fn ids_for_body(&self, body: RigidBodyHandle) -> Vec<DynamicId> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        inner.dynamics_by_body.get(&body).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    /// Snapshot-then-release: the closure never runs while the lock is held.
    pub fn for_each(&self, mut f: impl FnMut(DynamicId, &Dynamic)) {
        let snapshot: Vec<(DynamicId, Dynamic)> = {
            let guard = self.inner.lock();
            let inner = guard.borrow();
            inner.dynamics.iter().map(|(id, (d, _, _))| (*id, d.clone())).collect()
        };
        for (id, dynamic) in &snapshot {
            f(*id, dynamic);
        }
    }

    pub fn replace(&self, id: DynamicId, dynamic: Dynamic) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if let Some(entry) = inner.dynamics.get_mut(&id) {
            entry.0 = dynamic;
        }
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.lock();
        guard.borrow().dynamics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every dynamic whose lifetime has ended (§3.3, §7
    /// `TimeoutExpiredDynamic`). Call once per tick.
    pub fn expire(&self, now_us: u64, expiry_of: impl Fn(DynamicId) -> Option<u64>) -> Vec<DynamicId> {
        let expired: Vec<DynamicId> = {
            let guard = self.inner.lock();
            let inner = guard.borrow();
            inner
                .dynamics
                .keys()
                .copied()
                .filter(|id| expiry_of(*id).is_some_and(|expiry| now_us >= expiry))
                .collect()
        };
        for id in &expired {
            self.remove(*id);
        }
        expired
    }
}

impl Default for DynamicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::offset::OffsetState;

    fn handle(raw: u64) -> RigidBodyHandle {
        RigidBodyHandle::from_raw_parts(raw as u32, 0)
    }

    #[test]
    fn add_then_remove_clears_body_index() {
        let registry = DynamicRegistry::new();
        let owner = Uuid::new_v4();
        registry.bind_body(owner, handle(1));
        let id = Uuid::new_v4();
        registry.add(id, owner, None, Dynamic::Offset(OffsetState::default()));
        assert_eq!(registry.ids_for_body(handle(1)), vec![id]);
        registry.remove(id);
        assert!(registry.ids_for_body(handle(1)).is_empty());
    }

    #[test]
    fn bodies_sharing_a_dynamic_finds_the_other_side() {
        let registry = DynamicRegistry::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        registry.bind_body(owner, handle(1));
        registry.bind_body(other, handle(2));
        let id = Uuid::new_v4();
        registry.add(id, owner, Some(other), Dynamic::Offset(OffsetState::default()));
        let shared = registry.bodies_sharing_a_dynamic_with(handle(1));
        assert_eq!(shared, vec![handle(2)]);
    }

    #[test]
    fn for_each_does_not_deadlock_when_registry_mutated_inside_callback() {
        let registry = DynamicRegistry::new();
        let owner = Uuid::new_v4();
        registry.bind_body(owner, handle(1));
        registry.add(Uuid::new_v4(), owner, None, Dynamic::Offset(OffsetState::default()));
        registry.for_each(|_, _| {
            // Mutating while iterating is fine: for_each already released the
            // lock before invoking the callback.
            registry.add(Uuid::new_v4(), owner, None, Dynamic::Offset(OffsetState::default()));
        });
        assert_eq!(registry.len(), 2);
    }
}
