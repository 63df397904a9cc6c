//! Per-body adapter mediating between entity state and the physics backend
//! (§3.1, §4.D). `MotionState` is one consolidated struct carrying a `kind`
//! tag rather than a base class with three subclasses, since the three
//! variants differ only in `get_world_transform`/`set_world_transform`/
//! `is_moving` (§4.D), which are dispatched through `kind`-specific free
//! functions in the sibling `entity_motion_state`/`avatar_motion_state`/
//! `detailed_motion_state` modules.

pub mod avatar_motion_state;
pub mod detailed_motion_state;
pub mod entity_motion_state;

use nalgebra::{UnitQuaternion, Vector3};
use uuid::Uuid;

use crate::constants::*;
use crate::entity::{self, DirtyFlags, Entity};
use crate::shape_cache::ShapeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionStateKind {
    Entity,
    Avatar,
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysMotionType {
    Static,
    Kinematic,
    Dynamic,
}

/// §3.2 invariant 4: membership in exactly one of these lists *is* the
/// state, not a separately-tracked enum that could drift from the lists.
/// This type exists only as the return value of `ownership_state_for`,
/// computed by `PhysicalEntitySimulation` from actual list membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipState {
    NotLocallyOwned,
    PendingBid,
    LocallyOwned,
}

#[derive(Debug, Clone, Copy)]
pub struct ServerBelievedState {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub acceleration: Vector3<f32>,
    pub last_step: u32,
    pub seeded: bool,
}

impl Default for ServerBelievedState {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            last_step: 0,
            seeded: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MeasuredState {
    pub last_velocity: Vector3<f32>,
    pub measured_acceleration: Vector3<f32>,
    pub measured_delta_time: f32,
    pub last_measure_step: u32,
    pub acceleration_nearly_gravity_count: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipRuntime {
    pub outgoing_priority: u8,
    pub next_ownership_bid_us: u64,
    pub loops_without_owner: u8,
    pub num_inactive_updates: u8,
    pub last_kinematic_step: u32,
}

pub struct MotionState {
    pub kind: MotionStateKind,
    pub entity_id: Uuid,
    pub phys_motion_type: PhysMotionType,
    pub shape: Option<ShapeHandle>,
    pub body: Option<rapier3d::prelude::RigidBodyHandle>,
    pub mass: f32,
    pub offset: Vector3<f32>,
    pub region: u8,

    pub server: ServerBelievedState,
    pub measured: MeasuredState,
    pub ownership: OwnershipRuntime,

    /// Set when the entity wants physics but the shape failed to build
    /// (§7 `ShapeBuildFailure` policy) — counted as "ready" by SafeLanding.
    pub shape_load_failed: bool,
}

impl MotionState {
    pub fn new(kind: MotionStateKind, entity_id: Uuid) -> Self {
        Self {
            kind,
            entity_id,
            phys_motion_type: PhysMotionType::Dynamic,
            shape: None,
            body: None,
            mass: 1.0,
            offset: Vector3::zeros(),
            region: 0,
            server: ServerBelievedState::default(),
            measured: MeasuredState::default(),
            ownership: OwnershipRuntime::default(),
            shape_load_failed: false,
        }
    }

    /// §4.D.1 `compute_physics_motion_type`.
    pub fn compute_physics_motion_type(entity: &dyn Entity, is_triangle_mesh: bool) -> PhysMotionType {
        if is_triangle_mesh {
            return PhysMotionType::Static;
        }
        let moving = entity.is_moving_relative_to_parent()
            || entity.linear_velocity().norm() > 0.0
            || entity.angular_velocity().norm() > 0.0;

        if entity.is_locked() && !moving {
            return PhysMotionType::Static;
        }
        if !entity.is_dynamic() && !moving && !entity.has_dynamics() && !entity.has_avatar_ancestor() {
            return PhysMotionType::Static;
        }

        if entity.is_dynamic() && entity.parent_id().is_some() {
            return PhysMotionType::Kinematic;
        }
        if entity.is_locked() && moving {
            return PhysMotionType::Kinematic;
        }
        if moving || entity.has_dynamics() || entity.has_avatar_ancestor() {
            return PhysMotionType::Kinematic;
        }
        PhysMotionType::Dynamic
    }

    /// §4.D `handle_easy_changes`: applies EASY-flagged fields and ORs in
    /// `DIRTY_PHYSICS_ACTIVATION` if the change crosses an activation
    /// threshold. Returns the (possibly augmented) flags; the caller is
    /// responsible for actually waking the body.
    pub fn handle_easy_changes(
        &mut self,
        entity: &dyn Entity,
        mut flags: DirtyFlags,
        body_position: Vector3<f32>,
        body_rotation: UnitQuaternion<f32>,
        body_linear_velocity: Vector3<f32>,
        body_angular_velocity: Vector3<f32>,
        body_gravity: Vector3<f32>,
    ) -> DirtyFlags {
        let mut needs_activation = false;

        if flags & entity::DIRTY_POSITION != 0 {
            let delta = (entity.position() - body_position).norm();
            if delta > ACTIVATION_POSITION_DELTA {
                needs_activation = true;
            }
        }
        if flags & entity::DIRTY_ROTATION != 0 {
            let dot = entity.rotation().coords.dot(&body_rotation.coords).abs();
            if dot < ACTIVATION_ALIGNMENT_DOT {
                needs_activation = true;
            }
        }
        if flags & entity::DIRTY_LINEAR_VELOCITY != 0 {
            let delta = (entity.linear_velocity() - body_linear_velocity).norm();
            if delta > ACTIVATION_LINEAR_DELTA {
                needs_activation = true;
            }
        }
        if flags & entity::DIRTY_ANGULAR_VELOCITY != 0 {
            let delta = (entity.angular_velocity() - body_angular_velocity).norm();
            if delta > ACTIVATION_ANGULAR_DELTA {
                needs_activation = true;
            }
        }
        if flags & entity::DIRTY_GRAVITY != 0 {
            let delta = (entity.gravity() - body_gravity).norm();
            if delta > ACTIVATION_GRAVITY_DELTA {
                needs_activation = true;
            }
        }

        if needs_activation {
            flags |= entity::DIRTY_PHYSICS_ACTIVATION;
        }
        flags
    }

    /// §4.D `handle_hard_and_easy_changes`. `has_shape` tells us whether the
    /// caller already confirmed the entity `isReadyToComputeShape`.
    /// Returns `true` if the engine must reinsert this body into the world.
    pub fn handle_hard_and_easy_changes(&mut self, flags: &mut DirtyFlags, can_compute_shape: bool) -> bool {
        if *flags & entity::DIRTY_SHAPE != 0 && !can_compute_shape {
            *flags &= !entity::DIRTY_SHAPE;
        }
        entity::is_hard(*flags)
    }

    /// §4.D `measure_body_acceleration`.
    pub fn measure_body_acceleration(&mut self, velocity: Vector3<f32>, dt: f32, damping: f32, gravity: Vector3<f32>) {
        if dt <= 0.0 {
            return;
        }
        let damped = (1.0 - damping).max(0.0).powf(dt);
        let undamped_v0 = if damped > 1e-6 { self.measured.last_velocity / damped } else { self.measured.last_velocity };
        let acceleration = (velocity / damped.max(1e-6) - undamped_v0) / dt;
        self.measured.measured_acceleration = acceleration;
        self.measured.last_velocity = velocity;
        self.measured.measured_delta_time = dt;

        let gravity_magnitude = gravity.norm().max(1e-6);
        if (acceleration - gravity).norm() < ACCELERATION_NEARLY_GRAVITY_RATIO * gravity_magnitude {
            self.measured.acceleration_nearly_gravity_count =
                self.measured.acceleration_nearly_gravity_count.saturating_add(1);
        } else {
            self.measured.acceleration_nearly_gravity_count = 0;
        }
    }

    pub fn resets_measured_acceleration(&mut self) {
        self.measured.measured_acceleration = Vector3::zeros();
        self.measured.acceleration_nearly_gravity_count = 0;
    }

    /// §4.D `remote_simulation_out_of_sync`. Only meaningful while we own
    /// the simulation. Returns whether an authoritative update should be
    /// sent, and (via `out_priority`) the priority to advertise if so.
    pub fn remote_simulation_out_of_sync(
        &mut self,
        step: u32,
        body_position: Vector3<f32>,
        body_rotation: UnitQuaternion<f32>,
        body_velocity: Vector3<f32>,
        linear_damping: f32,
        angular_damping: f32,
        is_inactive: bool,
        dynamic_data_needs_transmit: bool,
        has_grab_actions: bool,
        out_priority: &mut Option<u8>,
    ) -> bool {
        if !self.server.seeded {
            self.server.position = body_position;
            self.server.rotation = body_rotation;
            self.server.velocity = body_velocity;
            self.server.last_step = step;
            self.server.seeded = true;
            return false;
        }

        let num_steps = step.saturating_sub(self.server.last_step);
        let dt = num_steps as f32 * FIXED_SUBSTEP;
        self.server.last_step = step;

        if dt > 0.0 {
            self.server.position += self.server.velocity * dt;
            self.server.velocity += self.server.acceleration * dt;
            self.server.velocity *= (1.0 - linear_damping).max(0.0).powf(dt);
            let rotation_step = entity::bullet_rotation_step(self.server.angular_velocity, FIXED_SUBSTEP);
            let mut accumulated = UnitQuaternion::identity();
            for _ in 0..num_steps {
                accumulated = rotation_step * accumulated;
            }
            self.server.rotation = accumulated * self.server.rotation;
            self.server.angular_velocity *= (1.0 - angular_damping).max(0.0).powf(dt);
        }

        if is_inactive {
            self.ownership.num_inactive_updates = self.ownership.num_inactive_updates.saturating_add(1);
            if self.ownership.num_inactive_updates > MAX_INACTIVE_UPDATES {
                return false;
            }
            return true;
        }
        self.ownership.num_inactive_updates = 0;

        if dynamic_data_needs_transmit {
            *out_priority = Some(if has_grab_actions {
                SCRIPT_GRAB_SIMULATION_PRIORITY
            } else {
                SCRIPT_POKE_SIMULATION_PRIORITY
            });
            return true;
        }

        let position_error_squared = (body_position - self.server.position).norm_squared();
        if position_error_squared > POSITION_ERROR_SQUARED {
            let speed_squared = body_velocity.norm_squared();
            if speed_squared < KINEMATIC_LINEAR_SPEED_SQUARED
                || position_error_squared / speed_squared.max(1e-9) > POSITION_ERROR_RELATIVE_SQUARED
            {
                return true;
            }
        }

        let rotation_dot = body_rotation.coords.dot(&self.server.rotation.coords).abs();
        if rotation_dot < ROTATION_ERROR_DOT_THRESHOLD {
            return true;
        }

        false
    }

    /// Flips `server*`'s meaning on an ownership transition (§3.2 invariant
    /// 5, §9): call on every `Bid -> Owned` transition, *before* any further
    /// integration, so the next `remote_simulation_out_of_sync` call re-seeds
    /// from "what we told the server" instead of stale "what we heard".
    pub fn reset_server_state_on_ownership_transition(&mut self) {
        self.server = ServerBelievedState::default();
    }

    /// `Owned -> Not` transition (§9).
    pub fn clear_outgoing_ownership(&mut self) {
        self.ownership.outgoing_priority = NO_SIMULATION_PRIORITY;
        self.ownership.next_ownership_bid_us = 0;
    }

    /// `bump`: increments outgoing priority in response to ownership
    /// infection (§4.F `do_ownership_infection`).
    pub fn bump(&mut self, priority: u8) {
        let proposed = priority.saturating_sub(1).max(VOLUNTEER_SIMULATION_PRIORITY);
        if proposed > self.ownership.outgoing_priority {
            self.ownership.outgoing_priority = proposed;
        }
    }

    pub fn upgrade_outgoing_priority(&mut self, priority: u8) {
        if priority > self.ownership.outgoing_priority {
            self.ownership.outgoing_priority = priority;
        }
    }
}
