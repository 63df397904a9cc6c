//! TravelOriented dynamic (§4.C): rotates the body so its local `forward`
//! vector aligns with its current linear velocity. Skipped below 1 mm/s.

use nalgebra::{UnitQuaternion, Vector3};

use super::RigidBodyView;
use crate::constants::TRAVEL_ORIENTED_MIN_SPEED;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TravelOrientedState {
    pub local_forward: Vector3<f32>,
}

impl Default for TravelOrientedState {
    fn default() -> Self {
        Self { local_forward: -Vector3::z() }
    }
}

impl TravelOrientedState {
    pub fn update_worker(&mut self, dt: f32, body: &mut dyn RigidBodyView) {
        let velocity = body.linear_velocity();
        let speed = velocity.norm();
        if speed < TRAVEL_ORIENTED_MIN_SPEED {
            return;
        }

        let current_forward = body.rotation() * self.local_forward;
        let travel_direction = velocity / speed;
        if let Some(rotation) = UnitQuaternion::rotation_between(&current_forward, &travel_direction) {
            // There is no direct "set rotation" on a RigidBodyView (angular
            // velocity is the only lever a Dynamic has each substep); express
            // the correction as an angular velocity that realizes it over
            // one substep of length `dt`.
            if let Some((axis, angle)) = rotation.axis_angle() {
                body.set_angular_velocity(axis.into_inner() * (angle / dt.max(1e-6)));
            } else {
                body.set_angular_velocity(Vector3::zeros());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBody {
        rotation: UnitQuaternion<f32>,
        linear_velocity: Vector3<f32>,
        angular_velocity: Vector3<f32>,
    }

    impl RigidBodyView for FakeBody {
        fn position(&self) -> Vector3<f32> {
            Vector3::zeros()
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
        fn set_linear_velocity(&mut self, _velocity: Vector3<f32>) {}
        fn set_angular_velocity(&mut self, velocity: Vector3<f32>) {
            self.angular_velocity = velocity;
        }
    }

    #[test]
    fn below_minimum_speed_is_skipped() {
        let mut travel = TravelOrientedState::default();
        let mut body = FakeBody {
            rotation: UnitQuaternion::identity(),
            linear_velocity: Vector3::new(0.0, 0.0, 0.0001),
            angular_velocity: Vector3::new(5.0, 5.0, 5.0),
        };
        travel.update_worker(1.0 / 90.0, &mut body);
        assert_eq!(body.angular_velocity, Vector3::new(5.0, 5.0, 5.0));
    }

    #[test]
    fn already_aligned_produces_no_rotation() {
        let mut travel = TravelOrientedState::default();
        let mut body = FakeBody {
            rotation: UnitQuaternion::identity(),
            linear_velocity: -Vector3::z() * 2.0,
            angular_velocity: Vector3::zeros(),
        };
        travel.update_worker(1.0 / 90.0, &mut body);
        assert!(body.angular_velocity.norm() < 1e-3);
    }
}
