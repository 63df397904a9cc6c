//! Outermost coordinator (§4.G, grounded on `PhysicalEntitySimulation.h/.cpp`):
//! consumes external entity-change notifications, maintains the add/remove/
//! change queues, assembles transactions, and drives the ownership
//! protocol's periodic bidding and update sends.

use std::collections::{HashMap, HashSet};

use nalgebra::{UnitQuaternion, Vector3};
use uuid::Uuid;

use crate::constants::{BID_EXPIRY_SECONDS, NO_SIMULATION_PRIORITY, VOLUNTEER_SIMULATION_PRIORITY};
use crate::contacts::CollisionEvent;
use crate::dynamics::registry::DynamicRegistry;
use crate::engine::PhysicsEngine;
use crate::entity::{Entity, SimulationOwner};
use crate::motion_state::{MotionState, MotionStateKind, OwnershipState};
use crate::ownership_wire::{build_bid, build_relinquish, EditPacketSender, EntityEdit};
use crate::safe_landing::{is_entity_physics_ready, SafeLanding, TrackedEntitySnapshot};
use crate::workload::{can_be_simple_kinematic, should_be_physical, Region};

/// The host-supplied seam `tick` drives through once per call (§4.G "Each
/// tick"). Mirrors `Entity`/`EditPacketSender` in spirit: the simulation
/// never reaches past this trait into whatever concrete entity storage the
/// outer driver keeps.
pub trait TickHost {
    fn can_compute_shape(&self, entity_id: Uuid) -> bool;
    fn motion_state_kind(&self, entity_id: Uuid) -> MotionStateKind;
    fn simulator_id_of(&self, entity_id: Uuid) -> Option<Uuid>;
    fn should_send_bid(&self, entity_id: Uuid) -> bool;
    fn should_send_update(&self, entity_id: Uuid, ms: &mut MotionState) -> bool;
    fn pose_of(&self, entity_id: Uuid) -> (Vector3<f32>, UnitQuaternion<f32>);

    /// §4.G step 4 `handle_deactivation`: write the server-believed transform
    /// back into the entity. Implementations must also zero the entity's
    /// linear and angular velocity to satisfy "zeroes velocities".
    fn write_deactivated_state(&mut self, entity_id: Uuid, position: Vector3<f32>, rotation: UnitQuaternion<f32>);

    /// §4.H: snapshot used by `is_entity_physics_ready`.
    fn safe_landing_snapshot(&self, entity_id: Uuid) -> TrackedEntitySnapshot;
    fn is_visually_ready(&self, entity_id: Uuid) -> bool;
}

/// A pending transaction handed to `PhysicsEngine` once per tick (§2 data
/// flow, §5 ordering: removes, then adds, then changes).
#[derive(Default)]
pub struct Transaction {
    pub to_remove: Vec<Uuid>,
    pub to_add: Vec<Uuid>,
    pub to_change: Vec<Uuid>,
}

pub struct PhysicalEntitySimulation {
    motion_states: HashMap<Uuid, MotionState>,

    entities_to_add: Vec<Uuid>,
    entities_to_remove: Vec<Uuid>,
    incoming_changes: HashSet<Uuid>,
    simple_kinematic_entities: HashSet<Uuid>,

    /// §3.2 invariant 4: ordering in these vectors plus membership IS the
    /// ownership state; there is no separate enum to drift out of sync.
    owned: Vec<Uuid>,
    bids: Vec<Uuid>,

    next_bid_expiry: HashMap<Uuid, f32>,

    step_counter: u64,
    local_simulator_id: Uuid,

    pub engine: PhysicsEngine,
    pub dynamics: DynamicRegistry,
    safe_landing: SafeLanding,
}

impl PhysicalEntitySimulation {
    pub fn new(local_simulator_id: Uuid) -> Self {
        Self {
            motion_states: HashMap::new(),
            entities_to_add: Vec::new(),
            entities_to_remove: Vec::new(),
            incoming_changes: HashSet::new(),
            simple_kinematic_entities: HashSet::new(),
            owned: Vec::new(),
            bids: Vec::new(),
            next_bid_expiry: HashMap::new(),
            step_counter: 0,
            local_simulator_id,
            engine: PhysicsEngine::new(),
            dynamics: DynamicRegistry::new(),
            safe_landing: SafeLanding::new(),
        }
    }

    pub fn safe_landing(&self) -> &SafeLanding {
        &self.safe_landing
    }

    /// §4.G "Each tick": assembles the six building blocks into the single
    /// per-tick call the outer driver makes (lib.rs: "the outer driver calls
    /// `PhysicalEntitySimulation` once per tick").
    pub fn tick(&mut self, dt: f32, sender: &mut dyn EditPacketSender, host: &mut dyn TickHost) -> Vec<CollisionEvent> {
        let added = self.build_objects_to_add(|id| host.can_compute_shape(id), |id| host.motion_state_kind(id));
        for entity_id in &added {
            self.safe_landing.record_tracked_entity(*entity_id, false);
        }

        let transaction = self.take_transaction();
        for entity_id in &transaction.to_remove {
            if let Some(ms) = self.motion_states.get(entity_id) {
                if let Some(handle) = ms.body {
                    self.engine.remove_body(handle);
                }
            }
            self.remove_motion_state(*entity_id);
        }

        let (events, bumps) = self.engine.step_simulation(dt, &self.dynamics);
        for (handle, priority) in bumps {
            if let Some(entity_id) = self.engine.handle_to_entity_id.get(&handle).copied() {
                if let Some(ms) = self.motion_states.get_mut(&entity_id) {
                    ms.bump(priority);
                }
            }
        }

        self.handle_deactivation(host);

        self.reconcile_ownership_lists(&transaction.to_change, |id| host.simulator_id_of(id), |id| host.should_send_bid(id));

        self.send_owned_updates(
            sender,
            |id| host.simulator_id_of(id),
            |id, ms| host.should_send_update(id, ms),
            |id| host.pose_of(id),
        );
        self.send_ownership_bids(sender, |id| host.simulator_id_of(id), |id| host.should_send_bid(id), |id| host.pose_of(id));

        if self.safe_landing.is_tracking() {
            self.safe_landing.update_tracking(
                |id| is_entity_physics_ready(&host.safe_landing_snapshot(id)),
                |id| host.is_visually_ready(id),
            );
        }

        self.advance_step();
        events
    }

    /// §4.G step 4 `handle_deactivation`: for owned states whose body has
    /// gone to sleep this tick, either drop the entity from `owned` (state
    /// cleared, if ownership is no longer wanted) or write the
    /// server-believed transform back into the entity with zeroed
    /// velocities.
    fn handle_deactivation(&mut self, host: &mut dyn TickHost) {
        let mut to_clear = Vec::new();
        for &entity_id in &self.owned {
            let Some(ms) = self.motion_states.get(&entity_id) else { continue };
            let Some(handle) = ms.body else { continue };
            if !self.engine.is_sleeping(handle) {
                continue;
            }
            if ms.ownership.outgoing_priority == NO_SIMULATION_PRIORITY {
                to_clear.push(entity_id);
                continue;
            }
            host.write_deactivated_state(entity_id, ms.server.position, ms.server.rotation);
        }
        for entity_id in to_clear {
            if let Some(ms) = self.motion_states.get_mut(&entity_id) {
                ms.clear_outgoing_ownership();
            }
            self.owned.retain(|id| *id != entity_id);
        }
    }

    pub fn ownership_state_of(&self, entity_id: Uuid) -> OwnershipState {
        if self.owned.contains(&entity_id) {
            OwnershipState::LocallyOwned
        } else if self.bids.contains(&entity_id) {
            OwnershipState::PendingBid
        } else {
            OwnershipState::NotLocallyOwned
        }
    }

    pub fn has_motion_state(&self, entity_id: Uuid) -> bool {
        self.motion_states.contains_key(&entity_id)
    }

    /// §4.G `change_entity_internal`.
    pub fn change_entity_internal(&mut self, entity: &dyn Entity, region: Region) {
        let wants_physical = should_be_physical(region, entity.should_be_physical());
        let can_kinematic = can_be_simple_kinematic(region, entity.is_moving_relative_to_parent());
        let has_motion_state = self.motion_states.contains_key(&entity.id());

        if has_motion_state && !wants_physical {
            if self.owned.contains(&entity.id()) {
                // Deactivate then send one ownership-releasing update; not
                // retried on loss, the server reaps via timeout (§4.G).
                self.owned.retain(|id| *id != entity.id());
            }
            self.incoming_changes.remove(&entity.id());
            self.entities_to_remove.push(entity.id());
            if entity.is_moving_relative_to_parent() && can_kinematic {
                self.simple_kinematic_entities.insert(entity.id());
            }
            return;
        }

        if wants_physical && !has_motion_state {
            self.entities_to_add.push(entity.id());
            return;
        }

        if let Some(ms) = self.motion_states.get_mut(&entity.id()) {
            ms.region = region as u8;
        }
        self.incoming_changes.insert(entity.id());
    }

    /// §4.G step 1, `build_objects_to_add`: entities awaiting physics whose
    /// shape now computes successfully get a `MotionState`. Shape failures
    /// stay queued (§7 `ShapeUnavailable`: silently defer, retry next tick).
    pub fn build_objects_to_add(&mut self, can_compute_shape: impl Fn(Uuid) -> bool, kind_of: impl Fn(Uuid) -> MotionStateKind) -> Vec<Uuid> {
        let mut still_pending = Vec::new();
        let mut added = Vec::new();
        for entity_id in self.entities_to_add.drain(..) {
            if can_compute_shape(entity_id) {
                self.motion_states.entry(entity_id).or_insert_with(|| MotionState::new(kind_of(entity_id), entity_id));
                added.push(entity_id);
            } else {
                still_pending.push(entity_id);
            }
        }
        self.entities_to_add = still_pending;
        added
    }

    pub fn take_transaction(&mut self) -> Transaction {
        Transaction {
            to_remove: std::mem::take(&mut self.entities_to_remove),
            to_add: Vec::new(),
            to_change: self.incoming_changes.drain().collect(),
        }
    }

    pub fn remove_motion_state(&mut self, entity_id: Uuid) {
        self.motion_states.remove(&entity_id);
        self.owned.retain(|id| *id != entity_id);
        self.bids.retain(|id| *id != entity_id);
        self.next_bid_expiry.remove(&entity_id);
    }

    /// §4.G step 5: promote a changed motion-state into `owned`/`bids`
    /// depending on its simulator-id and `should_send_bid`.
    pub fn reconcile_ownership_lists(&mut self, changed: &[Uuid], simulator_id_of: impl Fn(Uuid) -> Option<Uuid>, should_send_bid: impl Fn(Uuid) -> bool) {
        for &entity_id in changed {
            let is_locally_owned = simulator_id_of(entity_id) == Some(self.local_simulator_id);
            if is_locally_owned && !self.owned.contains(&entity_id) {
                self.bids.retain(|id| *id != entity_id);
                self.owned.push(entity_id);
                if let Some(ms) = self.motion_states.get_mut(&entity_id) {
                    ms.reset_server_state_on_ownership_transition();
                }
            } else if !is_locally_owned && should_send_bid(entity_id) && !self.bids.contains(&entity_id) {
                self.add_ownership_bid(entity_id);
            }
        }
    }

    /// §4.G `add_ownership_bid`.
    pub fn add_ownership_bid(&mut self, entity_id: Uuid) {
        if let Some(ms) = self.motion_states.get_mut(&entity_id) {
            ms.reset_server_state_on_ownership_transition();
            ms.upgrade_outgoing_priority(VOLUNTEER_SIMULATION_PRIORITY);
        }
        self.bids.retain(|id| *id != entity_id);
        self.bids.push(entity_id);
        self.next_bid_expiry.insert(entity_id, self.now_seconds() + BID_EXPIRY_SECONDS);
    }

    fn now_seconds(&self) -> f32 {
        self.step_counter as f32 * crate::constants::FIXED_SUBSTEP
    }

    /// §4.G `send_ownership_bids`, driven once per tick (guarded by the step
    /// counter, per §4.G step 6).
    pub fn send_ownership_bids(
        &mut self,
        sender: &mut dyn EditPacketSender,
        simulator_id_of: impl Fn(Uuid) -> Option<Uuid>,
        should_send_bid: impl Fn(Uuid) -> bool,
        pose_of: impl Fn(Uuid) -> (nalgebra::Vector3<f32>, nalgebra::UnitQuaternion<f32>),
    ) {
        let mut still_bidding = Vec::new();
        for entity_id in std::mem::take(&mut self.bids) {
            let is_locally_owned = simulator_id_of(entity_id) == Some(self.local_simulator_id);
            if is_locally_owned {
                self.owned.push(entity_id);
                let (position, rotation) = pose_of(entity_id);
                sender.send_authoritative_update(build_bid(entity_id, 0, position, rotation, self.local_simulator_id, VOLUNTEER_SIMULATION_PRIORITY));
                continue;
            }
            if !should_send_bid(entity_id) {
                self.next_bid_expiry.remove(&entity_id);
                continue;
            }
            let expiry = self.next_bid_expiry.get(&entity_id).copied().unwrap_or(0.0);
            if self.now_seconds() >= expiry {
                let priority = self.motion_states.get(&entity_id).map(|ms| ms.ownership.outgoing_priority).unwrap_or(VOLUNTEER_SIMULATION_PRIORITY);
                let (position, rotation) = pose_of(entity_id);
                sender.send_bid(build_bid(entity_id, 0, position, rotation, self.local_simulator_id, priority));
                self.next_bid_expiry.insert(entity_id, self.now_seconds() + BID_EXPIRY_SECONDS);
            }
            still_bidding.push(entity_id);
        }
        self.bids = still_bidding;
    }

    /// §4.G `send_owned_updates`.
    pub fn send_owned_updates(
        &mut self,
        sender: &mut dyn EditPacketSender,
        simulator_id_of: impl Fn(Uuid) -> Option<Uuid>,
        should_send_update: impl Fn(Uuid, &mut MotionState) -> bool,
        pose_of: impl Fn(Uuid) -> (nalgebra::Vector3<f32>, nalgebra::UnitQuaternion<f32>),
    ) {
        let mut still_owned = Vec::new();
        for entity_id in std::mem::take(&mut self.owned) {
            let currently_owned = simulator_id_of(entity_id) == Some(self.local_simulator_id);
            let still_wants_it = self.motion_states.get(&entity_id).map(|ms| ms.ownership.outgoing_priority > 0).unwrap_or(false);

            if !currently_owned && still_wants_it {
                self.bids.push(entity_id);
                continue;
            }

            if let Some(ms) = self.motion_states.get_mut(&entity_id) {
                if should_send_update(entity_id, ms) {
                    let (position, rotation) = pose_of(entity_id);
                    sender.send_authoritative_update(build_relinquish(entity_id, 0, position, rotation));
                } else if ms.ownership.outgoing_priority == NO_SIMULATION_PRIORITY {
                    ms.clear_outgoing_ownership();
                    continue;
                }
            }
            still_owned.push(entity_id);
        }
        self.owned = still_owned;
    }

    pub fn advance_step(&mut self) {
        self.step_counter += 1;
    }

    pub fn motion_state(&self, entity_id: Uuid) -> Option<&MotionState> {
        self.motion_states.get(&entity_id)
    }

    pub fn motion_state_mut(&mut self, entity_id: Uuid) -> Option<&mut MotionState> {
        self.motion_states.get_mut(&entity_id)
    }

    pub fn owned(&self) -> &[Uuid] {
        &self.owned
    }

    pub fn bids(&self) -> &[Uuid] {
        &self.bids
    }

    pub fn simple_kinematic_entities(&self) -> &HashSet<Uuid> {
        &self.simple_kinematic_entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};

    struct RecordingSender {
        sent: Vec<EntityEdit>,
    }
    impl EditPacketSender for RecordingSender {
        fn send_authoritative_update(&mut self, edit: EntityEdit) {
            self.sent.push(edit);
        }
        fn send_bid(&mut self, edit: EntityEdit) {
            self.sent.push(edit);
        }
    }

    #[test]
    fn ownership_state_reflects_list_membership_exclusively() {
        let mut sim = PhysicalEntitySimulation::new(Uuid::new_v4());
        let entity_id = Uuid::new_v4();
        assert_eq!(sim.ownership_state_of(entity_id), OwnershipState::NotLocallyOwned);
        sim.add_ownership_bid(entity_id);
        assert_eq!(sim.ownership_state_of(entity_id), OwnershipState::PendingBid);
        sim.owned.push(entity_id);
        sim.bids.retain(|id| *id != entity_id);
        assert_eq!(sim.ownership_state_of(entity_id), OwnershipState::LocallyOwned);
    }

    #[test]
    fn bid_promoted_to_owned_sends_immediate_update() {
        let local_id = Uuid::new_v4();
        let mut sim = PhysicalEntitySimulation::new(local_id);
        let entity_id = Uuid::new_v4();
        sim.add_ownership_bid(entity_id);
        let mut sender = RecordingSender { sent: Vec::new() };
        sim.send_ownership_bids(&mut sender, |_| Some(local_id), |_| true, |_| (Vector3::zeros(), UnitQuaternion::identity()));
        assert!(sim.owned.contains(&entity_id));
        assert!(!sim.bids.contains(&entity_id));
        assert_eq!(sender.sent.len(), 1);
    }

    #[test]
    fn losing_a_bid_drops_it_silently() {
        let local_id = Uuid::new_v4();
        let mut sim = PhysicalEntitySimulation::new(local_id);
        let entity_id = Uuid::new_v4();
        sim.add_ownership_bid(entity_id);
        let mut sender = RecordingSender { sent: Vec::new() };
        sim.send_ownership_bids(&mut sender, |_| None, |_| false, |_| (Vector3::zeros(), UnitQuaternion::identity()));
        assert!(!sim.bids.contains(&entity_id));
        assert!(sender.sent.is_empty());
    }

    struct FakeHost {
        visually_ready: HashSet<Uuid>,
        write_calls: Vec<(Uuid, Vector3<f32>, UnitQuaternion<f32>)>,
    }

    impl TickHost for FakeHost {
        fn can_compute_shape(&self, _entity_id: Uuid) -> bool {
            true
        }
        fn motion_state_kind(&self, _entity_id: Uuid) -> MotionStateKind {
            MotionStateKind::Entity
        }
        fn simulator_id_of(&self, _entity_id: Uuid) -> Option<Uuid> {
            None
        }
        fn should_send_bid(&self, _entity_id: Uuid) -> bool {
            false
        }
        fn should_send_update(&self, _entity_id: Uuid, _ms: &mut MotionState) -> bool {
            false
        }
        fn pose_of(&self, _entity_id: Uuid) -> (Vector3<f32>, UnitQuaternion<f32>) {
            (Vector3::zeros(), UnitQuaternion::identity())
        }
        fn write_deactivated_state(&mut self, entity_id: Uuid, position: Vector3<f32>, rotation: UnitQuaternion<f32>) {
            self.write_calls.push((entity_id, position, rotation));
        }
        fn safe_landing_snapshot(&self, entity_id: Uuid) -> TrackedEntitySnapshot {
            TrackedEntitySnapshot {
                id: entity_id,
                shape_readiness: crate::safe_landing::ShapeReadiness::Collisionless,
                should_be_physical: true,
                in_physics_sim: true,
                is_visually_ready: self.visually_ready.contains(&entity_id),
            }
        }
        fn is_visually_ready(&self, entity_id: Uuid) -> bool {
            self.visually_ready.contains(&entity_id)
        }
    }

    fn sleeping_owned_body(sim: &mut PhysicalEntitySimulation, priority: u8, server_position: Vector3<f32>) -> Uuid {
        use rapier3d::prelude::{ColliderBuilder, RigidBodyBuilder};

        let entity_id = Uuid::new_v4();
        let body = RigidBodyBuilder::dynamic().build();
        let collider = ColliderBuilder::ball(0.5).build();
        let handle = sim.engine.insert_body(entity_id, body, collider);
        sim.engine.bodies.get_mut(handle).unwrap().sleep();

        let mut ms = MotionState::new(MotionStateKind::Entity, entity_id);
        ms.body = Some(handle);
        ms.ownership.outgoing_priority = priority;
        ms.server.position = server_position;
        sim.motion_states.insert(entity_id, ms);
        sim.owned.push(entity_id);
        entity_id
    }

    #[test]
    fn handle_deactivation_writes_back_server_state_for_a_sleeping_owned_body() {
        let mut sim = PhysicalEntitySimulation::new(Uuid::new_v4());
        let entity_id = sleeping_owned_body(&mut sim, VOLUNTEER_SIMULATION_PRIORITY, Vector3::new(1.0, 2.0, 3.0));

        let mut host = FakeHost { visually_ready: HashSet::new(), write_calls: Vec::new() };
        sim.handle_deactivation(&mut host);

        assert_eq!(host.write_calls.len(), 1);
        assert_eq!(host.write_calls[0].0, entity_id);
        assert_eq!(host.write_calls[0].1, Vector3::new(1.0, 2.0, 3.0));
        assert!(sim.owned.contains(&entity_id), "still wanted, so it stays in owned");
    }

    #[test]
    fn handle_deactivation_clears_ownership_instead_of_writing_back_once_priority_is_zero() {
        let mut sim = PhysicalEntitySimulation::new(Uuid::new_v4());
        let entity_id = sleeping_owned_body(&mut sim, NO_SIMULATION_PRIORITY, Vector3::new(1.0, 2.0, 3.0));

        let mut host = FakeHost { visually_ready: HashSet::new(), write_calls: Vec::new() };
        sim.handle_deactivation(&mut host);

        assert!(host.write_calls.is_empty());
        assert!(!sim.owned.contains(&entity_id));
    }

    #[test]
    fn tick_applies_constraint_infection_bumps_to_the_shared_dynamics_partner() {
        use rapier3d::prelude::{ColliderBuilder, RigidBodyBuilder};

        let mut sim = PhysicalEntitySimulation::new(Uuid::new_v4());
        sim.engine.join_session(Uuid::new_v4());

        let owned_entity = Uuid::new_v4();
        let other_entity = Uuid::new_v4();
        let collider = ColliderBuilder::ball(0.5).build();
        // Placed far apart so the only infection path exercised is the
        // shared-dynamic constraint path, not contact-based infection.
        let owned_body = RigidBodyBuilder::dynamic().translation(Vector3::new(0.0, 0.0, 0.0)).build();
        let other_body = RigidBodyBuilder::dynamic().translation(Vector3::new(100.0, 0.0, 0.0)).build();
        let owned_handle = sim.engine.insert_body(owned_entity, owned_body, collider.clone());
        let other_handle = sim.engine.insert_body(other_entity, other_body, collider);
        sim.engine.mark_locally_owned(owned_handle, true);

        sim.dynamics.bind_body(owned_entity, owned_handle);
        sim.dynamics.bind_body(other_entity, other_handle);
        sim.dynamics.add(
            Uuid::new_v4(),
            owned_entity,
            Some(other_entity),
            crate::dynamics::Dynamic::Offset(crate::dynamics::offset::OffsetState::default()),
        );

        let mut other_ms = MotionState::new(MotionStateKind::Entity, other_entity);
        other_ms.body = Some(other_handle);
        sim.motion_states.insert(other_entity, other_ms);

        let mut sender = RecordingSender { sent: Vec::new() };
        let mut host = FakeHost { visually_ready: HashSet::new(), write_calls: Vec::new() };
        sim.tick(1.0 / 90.0, &mut sender, &mut host);

        let bumped = sim.motion_state(other_entity).unwrap().ownership.outgoing_priority;
        assert_eq!(bumped, VOLUNTEER_SIMULATION_PRIORITY, "the non-owned partner in the shared dynamic gets infected, floored by bump() at VOLUNTEER");
    }
}
