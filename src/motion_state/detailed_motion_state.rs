//! Detailed (sub-mesh / attachment-level) `MotionState` overrides (§4.D,
//! grounded on the `DetailedMotionState` split out of `AvatarMotionState` in
//! the original: per-joint collision proxies that ride along with an
//! avatar's skeleton but are individually collidable).
//!
//! These never own the simulation (they always mirror whatever the parent
//! avatar body is doing) and never bid; they exist purely so other dynamic
//! bodies can collide with an avatar's limbs instead of one coarse capsule.

use nalgebra::{UnitQuaternion, Vector3};

/// A detailed motion state's world pose is always the avatar skeleton joint
/// pose composed with a fixed per-joint local offset; there is no physics
/// simulation authority to reconcile, so this is a pure transform, not an
/// override of any activation/sync logic.
pub fn joint_world_pose(
    avatar_position: Vector3<f32>,
    avatar_rotation: UnitQuaternion<f32>,
    joint_local_position: Vector3<f32>,
    joint_local_rotation: UnitQuaternion<f32>,
) -> (Vector3<f32>, UnitQuaternion<f32>) {
    let world_position = avatar_position + avatar_rotation * joint_local_position;
    let world_rotation = avatar_rotation * joint_local_rotation;
    (world_position, world_rotation)
}

/// Detailed motion states are always kinematic-driven; they are never
/// candidates for ownership bidding (§3.2, §4.D).
pub fn can_bid_for_ownership() -> bool {
    false
}
