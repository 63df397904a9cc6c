//! Tractor / FarGrab / Hold (§4.C). These share one implementation: a
//! positional and rotational target, optionally expressed relative to a
//! second entity's pose, pulled toward at a timescale. They **defeat**
//! existing velocity rather than accumulating with it.

use nalgebra::{UnitQuaternion, Vector3};

use super::RigidBodyView;
use crate::constants::{
    TRACTOR_MAX_CORRECTIVE_SPEED, TRACTOR_ROTATION_DOT_SKIP_THRESHOLD,
    TRACTOR_VELOCITY_BLEND_COEFFICIENT,
};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TractorState {
    pub positional_target: Vector3<f32>,
    pub rotational_target: UnitQuaternion<f32>,
    pub linear_timescale: f32,
    pub angular_timescale: f32,
    /// If set, `positional_target`/`rotational_target` are expressed in this
    /// other entity's local frame instead of world space.
    pub relative_to_other: bool,
    #[serde(skip)]
    last_position_target: Option<Vector3<f32>>,
    #[serde(skip)]
    has_seeded: bool,
}

impl Default for TractorState {
    fn default() -> Self {
        Self {
            positional_target: Vector3::zeros(),
            rotational_target: UnitQuaternion::identity(),
            linear_timescale: 0.2,
            angular_timescale: 0.2,
            relative_to_other: false,
            last_position_target: None,
            has_seeded: false,
        }
    }
}

impl TractorState {
    fn world_target(&self, other: Option<&dyn RigidBodyView>) -> (Vector3<f32>, UnitQuaternion<f32>) {
        if self.relative_to_other {
            if let Some(other) = other {
                let position = other.position() + other.rotation() * self.positional_target;
                let rotation = other.rotation() * self.rotational_target;
                return (position, rotation);
            }
        }
        (self.positional_target, self.rotational_target)
    }

    pub fn update_worker(&mut self, dt: f32, body: &mut dyn RigidBodyView, other: Option<&dyn RigidBodyView>) {
        let (target_position, target_rotation) = self.world_target(other);

        if !self.has_seeded {
            self.last_position_target = Some(target_position);
            self.has_seeded = true;
        }

        let position_error = target_position - body.position();
        let mut corrective_linear = position_error / self.linear_timescale.max(1e-4);

        // Blend in a target-velocity estimate from how the target itself
        // moved this frame, so a moving target (e.g. a held object dragged
        // by its holder) doesn't lag a full timescale behind.
        if let Some(last_target) = self.last_position_target {
            if dt > 0.0 {
                let target_velocity = (target_position - last_target) / dt;
                corrective_linear = corrective_linear * (1.0 - TRACTOR_VELOCITY_BLEND_COEFFICIENT)
                    + target_velocity * TRACTOR_VELOCITY_BLEND_COEFFICIENT;
            }
        }
        self.last_position_target = Some(target_position);

        let speed = corrective_linear.norm();
        if speed > TRACTOR_MAX_CORRECTIVE_SPEED {
            corrective_linear *= TRACTOR_MAX_CORRECTIVE_SPEED / speed;
        }
        body.set_linear_velocity(corrective_linear);

        let current_rotation = body.rotation();
        let dot = current_rotation.coords.dot(&target_rotation.coords).abs();
        if dot <= TRACTOR_ROTATION_DOT_SKIP_THRESHOLD {
            let delta = target_rotation * current_rotation.inverse();
            if let Some((axis, angle)) = delta.axis_angle() {
                let corrective_angular = axis.into_inner() * (angle / self.angular_timescale.max(1e-4));
                body.set_angular_velocity(corrective_angular);
            } else {
                body.set_angular_velocity(Vector3::zeros());
            }
        } else {
            body.set_angular_velocity(Vector3::zeros());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBody {
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        linear_velocity: Vector3<f32>,
        angular_velocity: Vector3<f32>,
    }

    impl RigidBodyView for FakeBody {
        fn position(&self) -> Vector3<f32> {
            self.position
        }
        fn rotation(&self) -> UnitQuaternion<f32> {
            self.rotation
        }
        fn linear_velocity(&self) -> Vector3<f32> {
            self.linear_velocity
        }
        fn angular_velocity(&self) -> Vector3<f32> {
            self.angular_velocity
        }
        fn set_linear_velocity(&mut self, velocity: Vector3<f32>) {
            self.linear_velocity = velocity;
        }
        fn set_angular_velocity(&mut self, velocity: Vector3<f32>) {
            self.angular_velocity = velocity;
        }
    }

    #[test]
    fn corrective_velocity_is_capped_at_10_meters_per_second() {
        let mut tractor = TractorState { positional_target: Vector3::new(1000.0, 0.0, 0.0), linear_timescale: 0.01, ..Default::default() };
        let mut body = FakeBody {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        };
        tractor.update_worker(1.0 / 90.0, &mut body, None);
        assert!(body.linear_velocity.norm() <= TRACTOR_MAX_CORRECTIVE_SPEED + 1e-4);
    }

    #[test]
    fn aligned_rotation_skips_angular_correction() {
        let mut tractor = TractorState::default();
        let mut body = FakeBody {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        };
        tractor.update_worker(1.0 / 90.0, &mut body, None);
        assert_eq!(body.angular_velocity, Vector3::zeros());
    }

    #[test]
    fn first_frame_seeds_last_position_target() {
        let mut tractor = TractorState { positional_target: Vector3::new(1.0, 0.0, 0.0), ..Default::default() };
        assert!(!tractor.has_seeded);
        let mut body = FakeBody {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        };
        tractor.update_worker(1.0 / 90.0, &mut body, None);
        assert!(tractor.has_seeded);
    }
}
