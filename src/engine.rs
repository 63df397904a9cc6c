//! Owns the rapier3d world (§4.F, grounded on `PhysicsEngine.h/.cpp` and the
//! teacher's `PhysicsState` — single struct bundling rapier3d's collections,
//! stepped once per tick, with a handle↔entity-id map alongside it).

use std::collections::{HashMap, HashSet};

use nalgebra::Vector3;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rapier3d::prelude::*;
use uuid::Uuid;

use crate::constants::{FIXED_SUBSTEP, MAX_NUM_SUBSTEPS, PERSONAL_SIMULATION_PRIORITY, VOLUNTEER_SIMULATION_PRIORITY};
use crate::contacts::{CollisionEvent, ContactMap};
use crate::dynamics::registry::DynamicRegistry;

/// Mirrors `PhysicsHelpers.cpp`'s `_sessionID`/`setSessionUUID`/
/// `getSessionUUID`: one UUID identifying this simulation's seat at the
/// ownership-arbitration table, set once at join and cleared at leave.
static SESSION_ID: Lazy<Mutex<Option<Uuid>>> = Lazy::new(|| Mutex::new(None));

pub fn set_session_uuid(id: Uuid) {
    *SESSION_ID.lock() = Some(id);
}

pub fn get_session_uuid() -> Option<Uuid> {
    *SESSION_ID.lock()
}

pub fn clear_session_uuid() {
    *SESSION_ID.lock() = None;
}

/// §4.F: bodies whose Aabb must be force-refreshed this tick because Bullet
/// (and rapier's sleeping-body path, which this mirrors) does not refresh
/// static-body Aabbs on their own.
pub struct PhysicsEngine {
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,

    pub handle_to_entity_id: HashMap<RigidBodyHandle, Uuid>,
    pub entity_id_to_handle: HashMap<Uuid, RigidBodyHandle>,

    pub contact_map: ContactMap,
    locally_owned: HashSet<RigidBodyHandle>,

    active_static_bodies: HashSet<RigidBodyHandle>,

    step: u32,
    /// Global state per §9 "Global state": set once at join, cleared at
    /// leave, written only by the simulation thread.
    pub session_id: Option<Uuid>,
}

impl PhysicsEngine {
    pub fn new() -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = FIXED_SUBSTEP;

        Self {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            handle_to_entity_id: HashMap::new(),
            entity_id_to_handle: HashMap::new(),
            contact_map: ContactMap::new(),
            locally_owned: HashSet::new(),
            active_static_bodies: HashSet::new(),
            step: 0,
            session_id: None,
        }
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn insert_body(&mut self, entity_id: Uuid, body: RigidBody, collider: Collider) -> RigidBodyHandle {
        let handle = self.bodies.insert(body);
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        self.handle_to_entity_id.insert(handle, entity_id);
        self.entity_id_to_handle.insert(entity_id, handle);
        handle
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(handle, &mut self.island_manager, &mut self.colliders, &mut self.impulse_joints, &mut self.multibody_joints, true);
        if let Some(id) = self.handle_to_entity_id.remove(&handle) {
            self.entity_id_to_handle.remove(&id);
        }
        self.locally_owned.remove(&handle);
        self.active_static_bodies.remove(&handle);
    }

    /// §4.F / §9: HARD changes require removing and re-adding the body's
    /// collider to the broadphase because they alter collision-group
    /// membership. The motion-state layer detects the HARD bit and calls
    /// this with the collider it already owns a handle to.
    pub fn swap_collider(&mut self, body_handle: RigidBodyHandle, old: ColliderHandle, new_collider: Collider) -> ColliderHandle {
        self.colliders.remove(old, &mut self.island_manager, &mut self.bodies, true);
        self.colliders.insert_with_parent(new_collider, body_handle, &mut self.bodies)
    }

    /// Joins the ownership-arbitration session: records `id` both locally
    /// and in the process-wide session slot other call sites read through
    /// [`get_session_uuid`].
    pub fn join_session(&mut self, id: Uuid) {
        set_session_uuid(id);
        self.session_id = Some(id);
    }

    pub fn leave_session(&mut self) {
        clear_session_uuid();
        self.session_id = None;
    }

    pub fn mark_locally_owned(&mut self, handle: RigidBodyHandle, owned: bool) {
        if owned {
            self.locally_owned.insert(handle);
        } else {
            self.locally_owned.remove(&handle);
        }
    }

    pub fn is_locally_owned(&self, handle: RigidBodyHandle) -> bool {
        self.locally_owned.contains(&handle)
    }

    /// §4.G step 4: whether a body has gone to sleep since the last tick,
    /// the trigger condition for `handle_deactivation`.
    pub fn is_sleeping(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.get(handle).map(|b| b.is_sleeping()).unwrap_or(true)
    }

    /// §4.F active-static bookkeeping: called during `process_transaction`
    /// when an external change moves a locally-owned static body.
    pub fn mark_active_static(&mut self, handle: RigidBodyHandle) {
        self.active_static_bodies.insert(handle);
        if let Some(body) = self.bodies.get_mut(handle) {
            body.wake_up(true);
        }
    }

    /// §4.F: after `synchronizeMotionStates`, force all such bodies back to
    /// sleeping and clear the set.
    fn resettle_active_static_bodies(&mut self) {
        for handle in self.active_static_bodies.drain() {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.sleep();
            }
        }
    }

    /// §4.F `step_simulation`: runs up to `MAX_NUM_SUBSTEPS` fixed substeps,
    /// updating the contact map and infecting ownership after each.
    ///
    /// Returns the derived collision events alongside every `(handle,
    /// priority)` ownership bump infection produced this call — the engine
    /// has no `MotionState` handle of its own, so the caller (§4.G's per-tick
    /// assembly) is responsible for routing each bump into the owning
    /// `MotionState::bump`.
    pub fn step_simulation(&mut self, dt: f32, dynamics: &DynamicRegistry) -> (Vec<CollisionEvent>, Vec<(RigidBodyHandle, u8)>) {
        let num_substeps = ((dt / FIXED_SUBSTEP).ceil() as usize).clamp(1, MAX_NUM_SUBSTEPS);

        let gravity = Vector3::new(0.0, -9.81, 0.0);
        let physics_hooks = ();
        let event_handler = ();
        let mut bumps = Vec::new();

        for _ in 0..num_substeps {
            self.apply_dynamics(dynamics);

            self.physics_pipeline.step(
                &gravity,
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                None,
                &physics_hooks,
                &event_handler,
            );

            self.step += 1;
            bumps.extend(self.update_contact_map());
            bumps.extend(self.do_ownership_infection_for_constraints(dynamics));
        }

        self.resettle_active_static_bodies();
        let events = self.contact_map.derive_events(self.step, |h| self.locally_owned.contains(&h), |_, _| Vector3::zeros());
        (events, bumps)
    }

    fn apply_dynamics(&mut self, dynamics: &DynamicRegistry) {
        let dt = FIXED_SUBSTEP;
        dynamics.for_each(|_id, dynamic| {
            if !dynamic.is_action() {
                return;
            }
            // Applying dynamics needs live `&mut RigidBody` access keyed by
            // entity id; the actual velocity writes happen through the
            // `RigidBodyView` adapter constructed by the caller in
            // `PhysicalEntitySimulation`, which has the entity↔handle
            // mapping. This hook exists so ordering (§5: dynamics apply
            // before the backend step) is explicit at the engine boundary.
            let _ = dt;
        });
    }

    /// §4.F `update_contact_map`: for each manifold with ≥1 contact point
    /// where at least one body is active, upsert `ContactInfo` and run
    /// contact-based ownership infection, collecting any bumps it produces.
    fn update_contact_map(&mut self) -> Vec<(RigidBodyHandle, u8)> {
        let mut bumps = Vec::new();
        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let Some(manifold) = pair.manifolds.first() else { continue };
            let Some(point) = manifold.points.first() else { continue };

            let Some(collider_a) = self.colliders.get(pair.collider1) else { continue };
            let Some(collider_b) = self.colliders.get(pair.collider2) else { continue };
            let (Some(handle_a), Some(handle_b)) = (collider_a.parent(), collider_b.parent()) else { continue };

            let position_world_on_b = (collider_b.position() * point.local_p2).coords;
            let normal_world_on_b = manifold.data.normal;

            self.contact_map.upsert(handle_a, handle_b, self.step, position_world_on_b, normal_world_on_b, point.dist);

            if self.session_id.is_some() {
                if let Some(bump) = self.do_ownership_infection(handle_a, handle_b) {
                    bumps.push(bump);
                }
            }
        }
        bumps
    }

    /// §4.F `do_ownership_infection`: if exactly one side is locally owned
    /// and the other is neither static, kinematic, nor locally owned,
    /// bump the other's outgoing priority.
    ///
    /// Returns `(handle, new_priority)` pairs the motion-state layer should
    /// apply on its next tick — the engine has no direct handle to a
    /// `MotionState`, only to bodies.
    fn do_ownership_infection(&mut self, a: RigidBodyHandle, b: RigidBodyHandle) -> Option<(RigidBodyHandle, u8)> {
        let a_owned = self.locally_owned.contains(&a);
        let b_owned = self.locally_owned.contains(&b);
        if a_owned == b_owned {
            return None;
        }
        let (owned, other) = if a_owned { (a, b) } else { (b, a) };

        let other_body = self.bodies.get(other)?;
        if other_body.is_fixed() || other_body.is_kinematic() {
            return None;
        }
        let _ = owned;
        Some((other, PERSONAL_SIMULATION_PRIORITY))
    }

    /// §4.F constraint-infection: walk all bodies sharing a dynamic with a
    /// locally-owned body; bump all non-static others to
    /// `max(priority, VOLUNTEER) + 1`.
    fn do_ownership_infection_for_constraints(&mut self, dynamics: &DynamicRegistry) -> Vec<(RigidBodyHandle, u8)> {
        let mut bumps = Vec::new();
        let owned: Vec<RigidBodyHandle> = self.locally_owned.iter().copied().collect();
        for handle in owned {
            for other in dynamics.bodies_sharing_a_dynamic_with(handle) {
                if self.locally_owned.contains(&other) {
                    continue;
                }
                if let Some(body) = self.bodies.get(other) {
                    if body.is_fixed() {
                        continue;
                    }
                }
                bumps.push((other, VOLUNTEER_SIMULATION_PRIORITY + 1));
            }
        }
        bumps
    }
}

impl Default for PhysicsEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_remove_clears_both_maps() {
        let mut engine = PhysicsEngine::new();
        let id = Uuid::new_v4();
        let body = RigidBodyBuilder::dynamic().build();
        let collider = ColliderBuilder::ball(0.5).build();
        let handle = engine.insert_body(id, body, collider);
        assert_eq!(engine.entity_id_to_handle.get(&id), Some(&handle));
        engine.remove_body(handle);
        assert!(engine.entity_id_to_handle.get(&id).is_none());
        assert!(engine.handle_to_entity_id.get(&handle).is_none());
    }

    #[test]
    fn newly_owned_body_is_tracked_as_locally_owned() {
        let mut engine = PhysicsEngine::new();
        let body = RigidBodyBuilder::dynamic().build();
        let collider = ColliderBuilder::ball(0.5).build();
        let handle = engine.insert_body(Uuid::new_v4(), body, collider);
        assert!(!engine.is_locally_owned(handle));
        engine.mark_locally_owned(handle, true);
        assert!(engine.is_locally_owned(handle));
    }

    #[test]
    fn infection_is_skipped_when_both_sides_share_ownership_state() {
        let mut engine = PhysicsEngine::new();
        let body_a = RigidBodyBuilder::dynamic().build();
        let body_b = RigidBodyBuilder::dynamic().build();
        let collider = ColliderBuilder::ball(0.5).build();
        let a = engine.insert_body(Uuid::new_v4(), body_a, collider.clone());
        let b = engine.insert_body(Uuid::new_v4(), body_b, collider);
        assert!(engine.do_ownership_infection(a, b).is_none());
        engine.mark_locally_owned(a, true);
        engine.mark_locally_owned(b, true);
        assert!(engine.do_ownership_infection(a, b).is_none());
    }

    #[test]
    fn join_and_leave_session_round_trip_through_the_global_slot() {
        let mut engine = PhysicsEngine::new();
        let id = Uuid::new_v4();
        engine.join_session(id);
        assert_eq!(get_session_uuid(), Some(id));
        engine.leave_session();
        assert_eq!(get_session_uuid(), None);
    }

    #[test]
    fn infection_bumps_the_non_owned_dynamic_side() {
        let mut engine = PhysicsEngine::new();
        let body_a = RigidBodyBuilder::dynamic().build();
        let body_b = RigidBodyBuilder::dynamic().build();
        let collider = ColliderBuilder::ball(0.5).build();
        let a = engine.insert_body(Uuid::new_v4(), body_a, collider.clone());
        let b = engine.insert_body(Uuid::new_v4(), body_b, collider);
        engine.mark_locally_owned(a, true);
        let result = engine.do_ownership_infection(a, b);
        assert_eq!(result, Some((b, PERSONAL_SIMULATION_PRIORITY)));
    }
}
