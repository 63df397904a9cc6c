//! User-defined forces/constraints (§3.1, §4.C, §9). Represented as a tagged
//! variant rather than trait objects with inheritance: a dispatch table over
//! the tag is enough, and it keeps `(de)serialize` and `lifetime_is_over`
//! exhaustive-matchable instead of virtual.

pub mod joint;
pub mod motor;
pub mod offset;
pub mod registry;
pub mod tractor;
pub mod travel_oriented;

use nalgebra::{UnitQuaternion, Vector3};
use uuid::Uuid;

pub use joint::JointParams;
pub use motor::MotorState;
pub use offset::OffsetState;
pub use registry::DynamicRegistry;
pub use tractor::TractorState;
pub use travel_oriented::TravelOrientedState;

pub type DynamicId = Uuid;

/// A read/write view of the rigid body a dynamic acts on. `MotionState`
/// implementations and test doubles both implement this; `Dynamic` never
/// touches the backend directly.
pub trait RigidBodyView {
    fn position(&self) -> Vector3<f32>;
    fn rotation(&self) -> UnitQuaternion<f32>;
    fn linear_velocity(&self) -> Vector3<f32>;
    fn angular_velocity(&self) -> Vector3<f32>;
    fn set_linear_velocity(&mut self, velocity: Vector3<f32>);
    fn set_angular_velocity(&mut self, velocity: Vector3<f32>);
}

/// The wire tag. `Spring` is deserialized as an alias for `Tractor` (§9 open
/// question: both kinds exist in the source, one deprecated but still read).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DynamicKind {
    Offset,
    Tractor,
    Spring,
    TravelOriented,
    Hold,
    FarGrab,
    Hinge,
    Slider,
    BallSocket,
    ConeTwist,
    Motor,
}

#[derive(Debug, Clone)]
pub enum Dynamic {
    Offset(OffsetState),
    Tractor(TractorState),
    TravelOriented(TravelOrientedState),
    Hold(TractorState),
    FarGrab(TractorState),
    Hinge(JointParams),
    Slider(JointParams),
    BallSocket(JointParams),
    ConeTwist(JointParams),
    Motor(MotorState),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DynamicRecord {
    pub id: DynamicId,
    pub owner_entity: Uuid,
    pub other_entity: Option<Uuid>,
    pub expiry_us: Option<u64>,
    pub tag: String,
    pub kind: DynamicKind,
    pub params: Vec<u8>,
}

impl Dynamic {
    pub fn is_action(&self) -> bool {
        !self.is_constraint()
    }

    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            Dynamic::Hinge(_) | Dynamic::Slider(_) | Dynamic::BallSocket(_) | Dynamic::ConeTwist(_)
        )
    }

    /// Applies impulses / sets target velocities for one substep. No-op for
    /// persistent constraints (§4.C: "the core registers/unregisters them
    /// with the backend but does not alter them per-step").
    pub fn update_worker(
        &mut self,
        dt: f32,
        body: &mut dyn RigidBodyView,
        other: Option<&dyn RigidBodyView>,
    ) {
        match self {
            Dynamic::Offset(state) => state.update_worker(dt, body),
            Dynamic::Tractor(state) | Dynamic::Hold(state) | Dynamic::FarGrab(state) => {
                state.update_worker(dt, body, other)
            }
            Dynamic::TravelOriented(state) => state.update_worker(dt, body),
            Dynamic::Motor(state) => state.update_worker(dt, body, other),
            Dynamic::Hinge(_) | Dynamic::Slider(_) | Dynamic::BallSocket(_) | Dynamic::ConeTwist(_) => {}
        }
    }

    pub fn kind(&self) -> DynamicKind {
        match self {
            Dynamic::Offset(_) => DynamicKind::Offset,
            Dynamic::Tractor(_) => DynamicKind::Tractor,
            Dynamic::TravelOriented(_) => DynamicKind::TravelOriented,
            Dynamic::Hold(_) => DynamicKind::Hold,
            Dynamic::FarGrab(_) => DynamicKind::FarGrab,
            Dynamic::Hinge(_) => DynamicKind::Hinge,
            Dynamic::Slider(_) => DynamicKind::Slider,
            Dynamic::BallSocket(_) => DynamicKind::BallSocket,
            Dynamic::ConeTwist(_) => DynamicKind::ConeTwist,
            Dynamic::Motor(_) => DynamicKind::Motor,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Dynamic::Offset(s) => bincode_encode(s),
            Dynamic::Tractor(s) | Dynamic::Hold(s) | Dynamic::FarGrab(s) => bincode_encode(s),
            Dynamic::TravelOriented(s) => bincode_encode(s),
            Dynamic::Hinge(s) | Dynamic::Slider(s) | Dynamic::BallSocket(s) | Dynamic::ConeTwist(s) => {
                bincode_encode(s)
            }
            Dynamic::Motor(s) => bincode_encode(s),
        }
    }

    pub fn deserialize(record: &DynamicRecord) -> Option<Dynamic> {
        let kind = match record.kind {
            // Spring is read as an alias for Tractor (§9).
            DynamicKind::Spring => DynamicKind::Tractor,
            other => other,
        };
        Some(match kind {
            DynamicKind::Offset => Dynamic::Offset(bincode_decode(&record.params)?),
            DynamicKind::Tractor => Dynamic::Tractor(bincode_decode(&record.params)?),
            DynamicKind::Hold => Dynamic::Hold(bincode_decode(&record.params)?),
            DynamicKind::FarGrab => Dynamic::FarGrab(bincode_decode(&record.params)?),
            DynamicKind::TravelOriented => Dynamic::TravelOriented(bincode_decode(&record.params)?),
            DynamicKind::Hinge => Dynamic::Hinge(bincode_decode(&record.params)?),
            DynamicKind::Slider => Dynamic::Slider(bincode_decode(&record.params)?),
            DynamicKind::BallSocket => Dynamic::BallSocket(bincode_decode(&record.params)?),
            DynamicKind::ConeTwist => Dynamic::ConeTwist(bincode_decode(&record.params)?),
            DynamicKind::Motor => Dynamic::Motor(bincode_decode(&record.params)?),
            DynamicKind::Spring => unreachable!("aliased above"),
        })
    }

    pub fn lifetime_is_over(&self, now_us: u64, expiry_us: Option<u64>) -> bool {
        expiry_us.is_some_and(|expiry| now_us >= expiry)
    }
}

fn bincode_encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    // A minimal, dependency-free "bincode-shaped" encoder would duplicate a
    // whole crate; the wire format itself is explicitly out of scope
    // (§1 "Non-goals" names wire codec details as an external concern), so
    // this crate only needs round-trip fidelity for its own tests.
    serde_json::to_vec(value).unwrap_or_default()
}

fn bincode_decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    serde_json::from_slice(bytes).ok()
}
