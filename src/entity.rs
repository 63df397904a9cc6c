//! The `Entity` the core sees through a narrow interface, and the dirty-flag
//! bitset that describes what changed on it (§3.1, §6, §9).

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use uuid::Uuid;

use crate::shape_info::ShapeInfo;

pub type DirtyFlags = u16;

pub const DIRTY_POSITION: DirtyFlags = 1 << 0;
pub const DIRTY_ROTATION: DirtyFlags = 1 << 1;
pub const DIRTY_LINEAR_VELOCITY: DirtyFlags = 1 << 2;
pub const DIRTY_ANGULAR_VELOCITY: DirtyFlags = 1 << 3;
pub const DIRTY_GRAVITY: DirtyFlags = 1 << 4;
pub const DIRTY_MASS: DirtyFlags = 1 << 5;
pub const DIRTY_MATERIAL: DirtyFlags = 1 << 6;
pub const DIRTY_SHAPE: DirtyFlags = 1 << 7;
pub const DIRTY_COLLISION_GROUP: DirtyFlags = 1 << 8;
pub const DIRTY_MOTION_TYPE: DirtyFlags = 1 << 9;
pub const DIRTY_SIMULATOR_ID: DirtyFlags = 1 << 10;
pub const DIRTY_SIMULATION_OWNERSHIP_PRIORITY: DirtyFlags = 1 << 11;
pub const DIRTY_PHYSICS_ACTIVATION: DirtyFlags = 1 << 12;
pub const DIRTY_TRANSFORM: DirtyFlags = DIRTY_POSITION | DIRTY_ROTATION;
pub const DIRTY_VELOCITIES: DirtyFlags = DIRTY_LINEAR_VELOCITY | DIRTY_ANGULAR_VELOCITY;

/// HARD changes require removing and re-adding the body to the broadphase
/// because they alter collision-group membership (§9).
pub const HARD_FLAGS: DirtyFlags = DIRTY_MOTION_TYPE | DIRTY_SHAPE | DIRTY_COLLISION_GROUP;

pub const EASY_FLAGS: DirtyFlags = DIRTY_POSITION
    | DIRTY_ROTATION
    | DIRTY_LINEAR_VELOCITY
    | DIRTY_ANGULAR_VELOCITY
    | DIRTY_MATERIAL
    | DIRTY_MASS
    | DIRTY_SIMULATOR_ID
    | DIRTY_SIMULATION_OWNERSHIP_PRIORITY
    | DIRTY_PHYSICS_ACTIVATION;

pub fn is_hard(flags: DirtyFlags) -> bool {
    flags & HARD_FLAGS != 0
}

/// `(uuid, priority)` pair the ownership protocol advertises per entity
/// (§3.1, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimulationOwner {
    pub simulator_id: Option<Uuid>,
    pub priority: u8,
}

impl SimulationOwner {
    pub const NONE: SimulationOwner = SimulationOwner { simulator_id: None, priority: 0 };

    pub fn is_null(&self) -> bool {
        self.simulator_id.is_none()
    }
}

impl Default for SimulationOwner {
    fn default() -> Self {
        Self::NONE
    }
}

/// The subset of an `Entity`'s fields the physics core reads and writes.
/// The real entity (avatar pose, scripting, rendering) lives entirely
/// outside this crate; this trait is the seam.
pub trait Entity {
    fn id(&self) -> Uuid;

    fn position(&self) -> Vector3<f32>;
    fn set_position(&mut self, position: Vector3<f32>);

    fn rotation(&self) -> UnitQuaternion<f32>;
    fn set_rotation(&mut self, rotation: UnitQuaternion<f32>);

    fn linear_velocity(&self) -> Vector3<f32>;
    fn set_linear_velocity(&mut self, velocity: Vector3<f32>);

    fn angular_velocity(&self) -> Vector3<f32>;
    fn set_angular_velocity(&mut self, velocity: Vector3<f32>);

    fn gravity(&self) -> Vector3<f32>;
    fn acceleration(&self) -> Vector3<f32>;
    fn set_acceleration(&mut self, acceleration: Vector3<f32>);

    fn mass(&self) -> f32;
    fn damping(&self) -> f32;
    fn angular_damping(&self) -> f32;
    fn restitution(&self) -> f32;
    fn friction(&self) -> f32;

    fn collision_group(&self) -> i16;
    fn collision_mask(&self) -> i16;

    fn shape_info(&self) -> ShapeInfo;
    fn is_dynamic(&self) -> bool;
    fn is_locked(&self) -> bool;
    fn is_collisionless(&self) -> bool;

    fn parent_id(&self) -> Option<Uuid>;
    fn has_avatar_ancestor(&self) -> bool;
    fn is_moving_relative_to_parent(&self) -> bool;

    fn dynamics_blob(&self) -> Option<Vec<u8>>;
    fn has_dynamics(&self) -> bool;
    fn has_grab_actions(&self) -> bool;

    fn simulator_id(&self) -> Option<Uuid>;
    fn simulation_priority(&self) -> u8;
    fn set_simulation_owner(&mut self, owner: SimulationOwner);

    fn should_be_physical(&self) -> bool;

    fn dirty_flags(&self) -> DirtyFlags;
    fn clear_dirty_flags(&mut self, flags: DirtyFlags);
}

/// Returns the incremental rotation (Bullet-style exponential map) caused by
/// `angular_velocity` over `time_step` (§4.D.1, ported from
/// `PhysicsHelpers.cpp::computeBulletRotationStep`).
pub fn bullet_rotation_step(angular_velocity: Vector3<f32>, time_step: f32) -> UnitQuaternion<f32> {
    let mut speed = angular_velocity.norm();
    let angular_motion_threshold = 0.5 * std::f32::consts::FRAC_PI_2;
    if speed * time_step > angular_motion_threshold {
        speed = angular_motion_threshold / time_step;
    }

    let axis = if speed < 1e-3 {
        angular_velocity * (0.5 * time_step - (time_step.powi(3)) * (0.020833333333 * speed * speed))
    } else {
        angular_velocity * ((0.5 * speed * time_step).sin() / speed)
    };

    let w = (0.5 * speed * time_step).cos();
    UnitQuaternion::new_normalize(Quaternion::new(w, axis.x, axis.y, axis.z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn hard_flags_trigger_reinsertion() {
        assert!(is_hard(DIRTY_SHAPE));
        assert!(is_hard(DIRTY_MOTION_TYPE));
        assert!(is_hard(DIRTY_COLLISION_GROUP));
        assert!(!is_hard(DIRTY_POSITION));
        assert!(!is_hard(EASY_FLAGS));
    }

    #[test]
    fn zero_angular_velocity_is_identity_rotation() {
        let q = bullet_rotation_step(Vector3::zeros(), FIXED_SUBSTEP_FOR_TEST);
        assert_relative_eq!(q.angle(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn rotation_step_is_approximately_additive_for_small_angles() {
        let omega = Vector3::new(0.0, 1.0, 0.0);
        let dt = 0.01;
        let full = bullet_rotation_step(omega, 2.0 * dt);
        let half = bullet_rotation_step(omega, dt);
        let composed = half * half;
        assert_relative_eq!(full.angle(), composed.angle(), epsilon = 1e-5);
    }

    const FIXED_SUBSTEP_FOR_TEST: f32 = 1.0 / 90.0;
}
