//! Stateless wire-projection helpers (§4.J): building authoritative-update
//! and bid packets, and skew-corrected expiry timestamp translation.
//! Grounded on `EntityMotionState::getAndClearShouldSendUpdate` +
//! `EntityItem::getQueryAACube` packet-assembly pattern; the byte-level
//! codec itself is out of scope (§1), so these build structured values that
//! an external `EditPacketSender` serializes.

use nalgebra::{UnitQuaternion, Vector3};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AaBox {
    pub corner: Vector3<f32>,
    pub scale: f32,
}

/// §6 edit-packet surface. Identical in shape for both authoritative
/// updates and bids; the bid variant always carries `dynamics_blob: None`
/// and `query_aabox: None`.
#[derive(Debug, Clone)]
pub struct EntityEdit {
    pub entity_id: Uuid,
    pub last_edited_us: u64,
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub acceleration: Vector3<f32>,
    pub dynamics_blob: Option<Vec<u8>>,
    pub query_aabox: Option<AaBox>,
    pub simulation_owner: (Option<Uuid>, u8),
}

/// Interface the core hands built packets to; the network layer provides a
/// concrete sender (§1 "the core only builds a structured `EntityEdit` and
/// hands it to an `EditPacketSender` interface").
pub trait EditPacketSender {
    fn send_authoritative_update(&mut self, edit: EntityEdit);
    fn send_bid(&mut self, edit: EntityEdit);
}

pub struct BuildUpdateArgs {
    pub entity_id: Uuid,
    pub last_edited_us: u64,
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub acceleration: Vector3<f32>,
    pub acceleration_is_gravity: bool,
    pub gravity: Vector3<f32>,
    pub dynamics_blob: Option<Vec<u8>>,
    pub needs_transmit: bool,
    pub query_aabox: Option<AaBox>,
    pub query_aabox_changed: bool,
    pub owner: Option<Uuid>,
    pub priority: u8,
}

/// §4.J: acceleration is emitted as gravity iff `acceleration_nearly_gravity_count ≥ 4`
/// (`ACCELERATION_NEARLY_GRAVITY_CONFIRM_COUNT`), conveyed here by the caller
/// pre-deciding via `acceleration_is_gravity`.
pub fn build_authoritative_update(args: BuildUpdateArgs) -> EntityEdit {
    EntityEdit {
        entity_id: args.entity_id,
        last_edited_us: args.last_edited_us,
        position: args.position,
        rotation: args.rotation,
        linear_velocity: args.linear_velocity,
        angular_velocity: args.angular_velocity,
        acceleration: if args.acceleration_is_gravity { args.gravity } else { args.acceleration },
        dynamics_blob: if args.needs_transmit { args.dynamics_blob } else { None },
        query_aabox: if args.query_aabox_changed { args.query_aabox } else { None },
        simulation_owner: (args.owner, args.priority),
    }
}

/// Bid packets are identical in structure; the priority field conveys the
/// bid value and no dynamics/query data is ever attached (§6).
pub fn build_bid(entity_id: Uuid, last_edited_us: u64, position: Vector3<f32>, rotation: UnitQuaternion<f32>, owner: Uuid, priority: u8) -> EntityEdit {
    EntityEdit {
        entity_id,
        last_edited_us,
        position,
        rotation,
        linear_velocity: Vector3::zeros(),
        angular_velocity: Vector3::zeros(),
        acceleration: Vector3::zeros(),
        dynamics_blob: None,
        query_aabox: None,
        simulation_owner: (Some(owner), priority),
    }
}

/// Relinquishing ownership is a packet with zero-uuid owner and zero
/// priority (§6).
pub fn build_relinquish(entity_id: Uuid, last_edited_us: u64, position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> EntityEdit {
    EntityEdit {
        entity_id,
        last_edited_us,
        position,
        rotation,
        linear_velocity: Vector3::zeros(),
        angular_velocity: Vector3::zeros(),
        acceleration: Vector3::zeros(),
        dynamics_blob: None,
        query_aabox: None,
        simulation_owner: (None, 0),
    }
}

/// §4.J, L3: `localToServer = t + skew`, floored at 1 to dodge a negative or
/// zero rollover when skew is large and negative.
pub fn local_to_server(local_us: i64, skew_us: i64) -> i64 {
    (local_us + skew_us).max(1)
}

/// Inverse translation, floored the same way.
pub fn server_to_local(server_us: i64, skew_us: i64) -> i64 {
    (server_us - skew_us).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skew_round_trips_under_normal_conditions() {
        assert_eq!(server_to_local(local_to_server(1_000_000, 500), 500), 1_000_000);
    }

    #[test]
    fn local_to_server_floors_at_one_on_rollover() {
        assert_eq!(local_to_server(10, -1_000_000), 1);
    }

    #[test]
    fn server_to_local_floors_at_one_on_rollover() {
        assert_eq!(server_to_local(10, 1_000_000), 1);
    }

    #[test]
    fn authoritative_update_omits_dynamics_blob_when_not_needed() {
        let edit = build_authoritative_update(BuildUpdateArgs {
            entity_id: Uuid::new_v4(),
            last_edited_us: 0,
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            acceleration: Vector3::new(0.0, -9.8, 0.0),
            acceleration_is_gravity: false,
            gravity: Vector3::new(0.0, -9.8, 0.0),
            dynamics_blob: Some(vec![1, 2, 3]),
            needs_transmit: false,
            query_aabox: None,
            query_aabox_changed: false,
            owner: Some(Uuid::new_v4()),
            priority: 5,
        });
        assert!(edit.dynamics_blob.is_none());
    }

    #[test]
    fn relinquish_packet_has_zero_owner_and_priority() {
        let edit = build_relinquish(Uuid::new_v4(), 0, Vector3::zeros(), UnitQuaternion::identity());
        assert_eq!(edit.simulation_owner, (None, 0));
    }
}
