//! Contact tracking and collision-event derivation (§3.1, §4.F, grounded on
//! `ContactInfo.h` and `PhysicsEngine.cpp::computeCollisionEvents`).

use std::collections::HashMap;

use nalgebra::Vector3;
use rapier3d::prelude::RigidBodyHandle;

use crate::constants::{CONTACT_CONTINUE_MIN_SUBSTEPS, CONTACT_PENETRATION_GATE};

/// Unordered pair of bodies; two contacts between the same pair collapse to
/// one key regardless of which side reported first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactKey(RigidBodyHandle, RigidBodyHandle);

impl ContactKey {
    pub fn new(a: RigidBodyHandle, b: RigidBodyHandle) -> Self {
        // Order by the handle's raw parts so (a, b) and (b, a) collapse.
        let (ra, _) = a.into_raw_parts();
        let (rb, _) = b.into_raw_parts();
        if ra <= rb {
            ContactKey(a, b)
        } else {
            ContactKey(b, a)
        }
    }

    pub fn a(&self) -> RigidBodyHandle {
        self.0
    }

    pub fn b(&self) -> RigidBodyHandle {
        self.1
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContactInfo {
    pub last_step: u32,
    pub continue_expiry_step: u32,
    pub position_world_on_b: Vector3<f32>,
    pub normal_world_on_b: Vector3<f32>,
    pub distance: f32,
    pub type_just_initialized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionEventType {
    Start,
    Continue,
    End,
}

#[derive(Debug, Clone, Copy)]
pub struct CollisionEvent {
    pub event_type: CollisionEventType,
    pub id_a: RigidBodyHandle,
    pub id_b: Option<RigidBodyHandle>,
    pub position_world: Vector3<f32>,
    pub penetration_world: Vector3<f32>,
    pub velocity_change_world: Vector3<f32>,
}

#[derive(Default)]
pub struct ContactMap {
    contacts: HashMap<ContactKey, ContactInfo>,
}

impl ContactMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.F `update_contact_map`: upsert keyed by `(a, b)` with the current
    /// step. Manifolds with zero contact points never reach this call.
    pub fn upsert(
        &mut self,
        a: RigidBodyHandle,
        b: RigidBodyHandle,
        step: u32,
        position_world_on_b: Vector3<f32>,
        normal_world_on_b: Vector3<f32>,
        distance: f32,
    ) {
        let key = ContactKey::new(a, b);
        match self.contacts.get_mut(&key) {
            Some(info) => {
                info.last_step = step;
                info.position_world_on_b = position_world_on_b;
                info.normal_world_on_b = normal_world_on_b;
                info.distance = distance;
                info.type_just_initialized = false;
            }
            None => {
                self.contacts.insert(
                    key,
                    ContactInfo {
                        last_step: step,
                        // Matches the convention `derive_events` uses when a Continue
                        // fires (it stamps `continue_expiry_step = current_step`, not
                        // `+ CONTACT_CONTINUE_MIN_SUBSTEPS`): seeding with the creation
                        // step gives a contact its full cooldown before its first Continue.
                        continue_expiry_step: step,
                        position_world_on_b,
                        normal_world_on_b,
                        distance,
                        type_just_initialized: true,
                    },
                );
            }
        }
    }

    pub fn get(&self, a: RigidBodyHandle, b: RigidBodyHandle) -> Option<&ContactInfo> {
        self.contacts.get(&ContactKey::new(a, b))
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// §4.F contact-event derivation, §3.2 invariant 6. `is_owned_side`
    /// decides which bodies count as "locally owned or should be" for the
    /// emission gate; `velocity_change_of` supplies per-pair impulse data
    /// the backend narrow-phase tracked this step.
    pub fn derive_events(
        &mut self,
        current_step: u32,
        is_owned_side: impl Fn(RigidBodyHandle) -> bool,
        velocity_change_of: impl Fn(RigidBodyHandle, RigidBodyHandle) -> Vector3<f32>,
    ) -> Vec<CollisionEvent> {
        let mut events = Vec::new();
        let mut ended = Vec::new();

        for (key, info) in self.contacts.iter_mut() {
            if info.last_step < current_step {
                ended.push(*key);
                continue;
            }

            let event_type = if info.type_just_initialized {
                Some(CollisionEventType::Start)
            } else if info.distance < CONTACT_PENETRATION_GATE && current_step.saturating_sub(info.continue_expiry_step) >= CONTACT_CONTINUE_MIN_SUBSTEPS {
                info.continue_expiry_step = current_step;
                Some(CollisionEventType::Continue)
            } else {
                None
            };

            let Some(event_type) = event_type else { continue };

            if !is_owned_side(key.a()) && !is_owned_side(key.b()) {
                continue;
            }

            let (id_a, id_b, position_world, penetration_world) = if is_owned_side(key.a()) {
                (key.a(), Some(key.b()), info.position_world_on_b, info.normal_world_on_b * info.distance)
            } else {
                (key.b(), Some(key.a()), info.position_world_on_b, -(info.normal_world_on_b * info.distance))
            };

            events.push(CollisionEvent {
                event_type,
                id_a,
                id_b,
                position_world,
                penetration_world,
                velocity_change_world: velocity_change_of(id_a, id_b.unwrap_or(id_a)),
            });
        }

        for key in ended {
            if let Some(info) = self.contacts.remove(&key) {
                if is_owned_side(key.a()) || is_owned_side(key.b()) {
                    let (id_a, id_b, position_world, penetration_world) = if is_owned_side(key.a()) {
                        (key.a(), Some(key.b()), info.position_world_on_b, info.normal_world_on_b * info.distance)
                    } else {
                        (key.b(), Some(key.a()), info.position_world_on_b, -(info.normal_world_on_b * info.distance))
                    };
                    events.push(CollisionEvent {
                        event_type: CollisionEventType::End,
                        id_a,
                        id_b,
                        position_world,
                        penetration_world,
                        velocity_change_world: Vector3::zeros(),
                    });
                }
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(raw: u64) -> RigidBodyHandle {
        RigidBodyHandle::from_raw_parts(raw as u32, 0)
    }

    #[test]
    fn contact_key_is_order_independent() {
        assert_eq!(ContactKey::new(handle(1), handle(2)), ContactKey::new(handle(2), handle(1)));
    }

    #[test]
    fn new_contact_emits_start() {
        let mut map = ContactMap::new();
        map.upsert(handle(1), handle(2), 0, Vector3::zeros(), Vector3::y(), -0.01);
        let events = map.derive_events(0, |_| true, |_, _| Vector3::zeros());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, CollisionEventType::Start);
    }

    #[test]
    fn distance_exactly_at_gate_does_not_continue() {
        let mut map = ContactMap::new();
        map.upsert(handle(1), handle(2), 0, Vector3::zeros(), Vector3::y(), -0.01);
        map.derive_events(0, |_| true, |_, _| Vector3::zeros());
        for step in 1..=CONTACT_CONTINUE_MIN_SUBSTEPS {
            map.upsert(handle(1), handle(2), step, Vector3::zeros(), Vector3::y(), CONTACT_PENETRATION_GATE);
        }
        let events = map.derive_events(CONTACT_CONTINUE_MIN_SUBSTEPS, |_| true, |_, _| Vector3::zeros());
        assert!(events.is_empty(), "strict < required, not <=");
    }

    #[test]
    fn unrefreshed_contact_emits_end_and_is_removed() {
        let mut map = ContactMap::new();
        map.upsert(handle(1), handle(2), 0, Vector3::zeros(), Vector3::y(), -0.01);
        map.derive_events(0, |_| true, |_, _| Vector3::zeros());
        let events = map.derive_events(1, |_| true, |_, _| Vector3::zeros());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, CollisionEventType::End);
        assert!(map.is_empty());
    }

    #[test]
    fn contact_created_after_step_zero_still_waits_the_full_cooldown() {
        let mut map = ContactMap::new();
        let creation_step = 20;
        map.upsert(handle(1), handle(2), creation_step, Vector3::zeros(), Vector3::y(), -0.01);
        map.derive_events(creation_step, |_| true, |_, _| Vector3::zeros());
        for step in (creation_step + 1)..(creation_step + CONTACT_CONTINUE_MIN_SUBSTEPS) {
            map.upsert(handle(1), handle(2), step, Vector3::zeros(), Vector3::y(), CONTACT_PENETRATION_GATE);
            let events = map.derive_events(step, |_| true, |_, _| Vector3::zeros());
            assert!(events.is_empty(), "no Continue before the cooldown elapses, at step {step}");
        }
        let final_step = creation_step + CONTACT_CONTINUE_MIN_SUBSTEPS;
        map.upsert(handle(1), handle(2), final_step, Vector3::zeros(), Vector3::y(), CONTACT_PENETRATION_GATE);
        let events = map.derive_events(final_step, |_| true, |_, _| Vector3::zeros());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, CollisionEventType::Continue);
    }

    #[test]
    fn event_with_neither_side_owned_is_suppressed() {
        let mut map = ContactMap::new();
        map.upsert(handle(1), handle(2), 0, Vector3::zeros(), Vector3::y(), -0.01);
        let events = map.derive_events(0, |_| false, |_, _| Vector3::zeros());
        assert!(events.is_empty());
    }
}
