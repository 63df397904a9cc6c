//! Entity-flavored `MotionState` overrides (§4.D, grounded on
//! `EntityMotionState.h/.cpp`). Entities have no parent-chain special case
//! in `get_world_transform`/`set_world_transform`: the body's pose *is* the
//! entity's world pose, offset by `MotionState::offset`.

use nalgebra::{UnitQuaternion, Vector3};

use super::MotionState;

/// World position the body should be placed at, given the entity's own
/// position/rotation and the motion state's collision-shape offset.
pub fn get_world_position(entity_position: Vector3<f32>, entity_rotation: UnitQuaternion<f32>, state: &MotionState) -> Vector3<f32> {
    entity_position + entity_rotation * state.offset
}

pub fn get_world_rotation(entity_rotation: UnitQuaternion<f32>) -> UnitQuaternion<f32> {
    entity_rotation
}

/// Inverse of `get_world_position`: recovers the entity-space position an
/// observed body pose implies.
pub fn set_world_transform(body_position: Vector3<f32>, body_rotation: UnitQuaternion<f32>, state: &MotionState) -> (Vector3<f32>, UnitQuaternion<f32>) {
    let entity_position = body_position - body_rotation * state.offset;
    (entity_position, body_rotation)
}
