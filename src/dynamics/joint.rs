//! Hinge / Slider / BallSocket / ConeTwist (§4.C): persistent constraints.
//! Parameters are stored verbatim; the core registers/unregisters them with
//! the backend but does not alter them per-step.

use nalgebra::{Unit, Vector3};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JointParams {
    pub pivot_in_self: Vector3<f32>,
    pub pivot_in_other: Vector3<f32>,
    pub axis_in_self: Vector3<f32>,
    pub axis_in_other: Vector3<f32>,
    pub limit_lower: f32,
    pub limit_upper: f32,
}

impl Default for JointParams {
    fn default() -> Self {
        Self {
            pivot_in_self: Vector3::zeros(),
            pivot_in_other: Vector3::zeros(),
            axis_in_self: Vector3::x(),
            axis_in_other: Vector3::x(),
            limit_lower: 0.0,
            limit_upper: 0.0,
        }
    }
}

impl JointParams {
    pub fn unit_axis_in_self(&self) -> Unit<Vector3<f32>> {
        Unit::new_normalize(self.axis_in_self)
    }
}
