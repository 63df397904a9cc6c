//! Avatar-flavored `MotionState` overrides (§4.D, grounded on
//! `AvatarMotionState.h/.cpp`).
//!
//! Preserves a quirk of the original: `get_object_angular_velocity` derives
//! an angular velocity from the avatar's *linear* velocity and facing
//! direction rather than reading a true angular-velocity channel, because
//! avatars only ever yaw in place and the original never plumbed a separate
//! angular-velocity field through to physics. This is visibly odd but is
//! kept literally rather than "fixed" (DESIGN.md, Open Question #2): fixing
//! it would change how the character controller reconciles kinematic
//! avatar bodies with the rest of the world, which is out of scope here.

use nalgebra::{UnitQuaternion, Vector3};

/// `other_entity_forward` is the avatar's current forward-facing direction;
/// `linear_velocity` is its translational velocity. Returns the angular
/// velocity a downstream kinematic body should be given to *look like* it
/// is turning toward its direction of travel, which is all the original
/// ever produced for avatars.
pub fn derive_angular_velocity_from_linear(linear_velocity: Vector3<f32>, forward: Vector3<f32>) -> Vector3<f32> {
    let speed = linear_velocity.norm();
    if speed < 1e-4 {
        return Vector3::zeros();
    }
    let travel_direction = linear_velocity / speed;
    let axis = forward.cross(&travel_direction);
    let axis_norm = axis.norm();
    if axis_norm < 1e-6 {
        return Vector3::zeros();
    }
    let angle = forward.dot(&travel_direction).clamp(-1.0, 1.0).acos();
    axis.normalize() * angle
}

/// Avatars with a non-null `parent_id` (seated on a vehicle, say) report the
/// parent's pose composed with their own local offset; otherwise identical
/// to the entity case.
pub fn get_world_position(
    entity_position: Vector3<f32>,
    entity_rotation: UnitQuaternion<f32>,
    offset: Vector3<f32>,
    parent_world: Option<(Vector3<f32>, UnitQuaternion<f32>)>,
) -> Vector3<f32> {
    match parent_world {
        Some((parent_position, parent_rotation)) => parent_position + parent_rotation * (entity_position + entity_rotation * offset),
        None => entity_position + entity_rotation * offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stationary_avatar_has_zero_derived_angular_velocity() {
        let v = derive_angular_velocity_from_linear(Vector3::zeros(), -Vector3::z());
        assert_eq!(v, Vector3::zeros());
    }

    #[test]
    fn avatar_turning_toward_travel_direction_yields_yaw_about_up() {
        let forward = -Vector3::z();
        let travel = Vector3::new(1.0, 0.0, 0.0) * 2.0;
        let omega = derive_angular_velocity_from_linear(travel, forward);
        // Rotation axis should be close to the world up axis (or its
        // negation) since both vectors lie in the horizontal plane.
        assert!(omega.x.abs() < 1e-3 && omega.z.abs() < 1e-3);
        assert!(omega.y.abs() > 0.1);
    }

    #[test]
    fn no_parent_falls_back_to_entity_behavior() {
        let p = get_world_position(Vector3::new(1.0, 0.0, 0.0), UnitQuaternion::identity(), Vector3::zeros(), None);
        assert_eq!(p, Vector3::new(1.0, 0.0, 0.0));
    }
}
