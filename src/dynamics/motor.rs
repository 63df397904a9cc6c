//! Motor dynamic (§4.C): angular-only, slaves angular velocity toward a
//! target, expressed in the other entity's frame if one is set.

use nalgebra::{UnitQuaternion, Vector3};

use super::RigidBodyView;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MotorState {
    pub target_angular_velocity: Vector3<f32>,
    pub timescale: f32,
}

impl Default for MotorState {
    fn default() -> Self {
        Self { target_angular_velocity: Vector3::zeros(), timescale: 0.2 }
    }
}

impl MotorState {
    pub fn update_worker(&mut self, dt: f32, body: &mut dyn RigidBodyView, other: Option<&dyn RigidBodyView>) {
        let target = match other {
            Some(other) => other.rotation() * self.target_angular_velocity,
            None => self.target_angular_velocity,
        };
        let blend = (dt / self.timescale.max(1e-4)).min(1.0);
        let current = body.angular_velocity();
        body.set_angular_velocity(current * (1.0 - blend) + target * blend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBody {
        angular_velocity: Vector3<f32>,
    }

    impl RigidBodyView for FakeBody {
        fn position(&self) -> Vector3<f32> {
            Vector3::zeros()
        }
        fn rotation(&self) -> UnitQuaternion<f32> {
            UnitQuaternion::identity()
        }
        fn linear_velocity(&self) -> Vector3<f32> {
            Vector3::zeros()
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
    fn converges_to_target_over_several_substeps() {
        let mut motor = MotorState { target_angular_velocity: Vector3::new(0.0, 1.0, 0.0), timescale: 0.2 };
        let mut body = FakeBody { angular_velocity: Vector3::zeros() };
        for _ in 0..200 {
            motor.update_worker(1.0 / 90.0, &mut body, None);
        }
        assert!((body.angular_velocity - Vector3::new(0.0, 1.0, 0.0)).norm() < 0.01);
    }
}
