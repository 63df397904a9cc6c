//! Typed error kinds (§7). These are outcomes of individual operations, not
//! exceptions: nothing propagates out of `PhysicsEngine::step_simulation` or
//! `PhysicalEntitySimulation::tick`. Callers that do get a `Result` (shape
//! building, dynamic deserialization, registry lookups) should log and
//! recover per the policy documented on each variant.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PhysicsCoreError {
    /// Shape cannot yet be computed (mesh still loading, model missing,
    /// degenerate dimensions). Policy: silently defer, retry next tick.
    #[error("shape for entity {entity_id} is not yet available")]
    ShapeUnavailable { entity_id: Uuid },

    /// The shape builder rejected the descriptor outright (e.g. a hull with
    /// zero points). Policy: do not insert a body; mark the entity
    /// shape-failed so SafeLanding counts it as ready.
    #[error("shape build failed for entity {entity_id}: {reason}")]
    ShapeBuildFailure { entity_id: Uuid, reason: String },

    /// Our bid was overridden by a higher-priority bidder. Policy: demote to
    /// `NotLocallyOwned`, clear outgoing priority, resume integrating from
    /// the received server-believed state.
    #[error("ownership contention on entity {entity_id}: lost to priority {winning_priority}")]
    OwnershipContention { entity_id: Uuid, winning_priority: u8 },

    /// A dynamic reached its expiry. Policy: drop at factory time if already
    /// expired during deserialization, else remove at end of next tick.
    #[error("dynamic {dynamic_id} lifetime has expired")]
    TimeoutExpiredDynamic { dynamic_id: Uuid },

    /// Contact manifold indicates the character is wedged. Policy: latch
    /// `is_stuck`; the outer avatar system decides how to escape.
    #[error("character controller appears stuck")]
    StuckCharacter,

    /// Domain sequence numbers from the initial load are not contiguous yet.
    /// Policy: keep waiting until contiguous or the outer layer declares no
    /// more sequences are missing.
    #[error("safe-landing sequence gap: missing numbers between loaded entities")]
    SequenceGap,
}

pub type Result<T> = std::result::Result<T, PhysicsCoreError>;
