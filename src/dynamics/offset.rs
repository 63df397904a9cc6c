//! Offset dynamic (§4.C): pulls the object toward a world point at a given
//! distance, critically damped by a timescale.

use nalgebra::Vector3;

use super::RigidBodyView;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OffsetState {
    pub point: Vector3<f32>,
    pub linear_distance: f32,
    pub linear_timescale: f32,
}

impl Default for OffsetState {
    fn default() -> Self {
        Self { point: Vector3::zeros(), linear_distance: 0.0, linear_timescale: 0.2 }
    }
}

impl OffsetState {
    pub fn update_worker(&mut self, dt: f32, body: &mut dyn RigidBodyView) {
        let to_point = self.point - body.position();
        let distance = to_point.norm();
        if distance < 1e-6 {
            return;
        }
        let direction = to_point / distance;
        let target_distance_error = distance - self.linear_distance;

        let blend = (dt / self.linear_timescale.max(1e-4)).min(1.0);
        let parallel_speed = target_distance_error / self.linear_timescale.max(1e-4);

        let current = body.linear_velocity();
        let current_parallel = current.dot(&direction);
        let new_parallel = current_parallel * (1.0 - blend) + parallel_speed * blend;

        let perpendicular = current - direction * current_parallel;
        body.set_linear_velocity(perpendicular + direction * new_parallel);
    }
}
