//! SafeLanding gate (§4.H, grounded on `SafeLanding.h/.cpp`): holds a
//! physics-readiness barrier during initial world load.

use std::collections::HashMap;

use uuid::Uuid;

use crate::constants::SAFE_LANDING_STABILITY_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeReadiness {
    Collisionless,
    NotYetLoaded,
    LoadFailed,
    Loaded,
}

pub struct TrackedEntitySnapshot {
    pub id: Uuid,
    pub shape_readiness: ShapeReadiness,
    pub should_be_physical: bool,
    pub in_physics_sim: bool,
    pub is_visually_ready: bool,
}

/// §4.H `is_entity_physics_ready`: collisionless entities are always ready;
/// otherwise the shape must have finished loading (or failed, per §7
/// `ShapeBuildFailure` policy) AND the entity is either non-physical,
/// already in the sim, or marked shape-failed.
pub fn is_entity_physics_ready(entity: &TrackedEntitySnapshot) -> bool {
    if entity.shape_readiness == ShapeReadiness::Collisionless {
        return true;
    }
    match entity.shape_readiness {
        ShapeReadiness::NotYetLoaded => false,
        ShapeReadiness::LoadFailed => true,
        ShapeReadiness::Loaded => !entity.should_be_physical || entity.in_physics_sim,
        ShapeReadiness::Collisionless => true,
    }
}

pub struct SafeLanding {
    tracked: HashMap<Uuid, bool>,
    max_tracked: usize,
    first_seq: Option<u32>,
    last_seq: Option<u32>,
    seen_sequences: Vec<u32>,
    tracking_started: bool,
    stable_updates_with_no_new_peak: u32,
    peak_remaining: usize,
    settled_progress: f32,
}

impl SafeLanding {
    pub fn new() -> Self {
        Self {
            tracked: HashMap::new(),
            max_tracked: 0,
            first_seq: None,
            last_seq: None,
            seen_sequences: Vec::new(),
            tracking_started: false,
            stable_updates_with_no_new_peak: 0,
            peak_remaining: 0,
            settled_progress: 0.0,
        }
    }

    pub fn start_tracking(&mut self) {
        self.tracking_started = true;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking_started
    }

    /// Records an entity seen before the load's `start_time` cutoff.
    pub fn record_tracked_entity(&mut self, id: Uuid, ready: bool) {
        if !self.tracking_started {
            return;
        }
        self.tracked.insert(id, ready);
        self.max_tracked = self.max_tracked.max(self.tracked.len());
        self.peak_remaining = self.peak_remaining.max(self.tracked.len());
    }

    pub fn add_to_sequence(&mut self, n: u32) {
        self.seen_sequences.push(n);
    }

    pub fn finish_sequence(&mut self, first_seq: u32, last_seq: u32) {
        self.first_seq = Some(first_seq);
        self.last_seq = Some(last_seq);
    }

    fn is_missing_sequence_numbers(&self) -> bool {
        let (Some(first), Some(last)) = (self.first_seq, self.last_seq) else {
            return true;
        };
        let mut sorted = self.seen_sequences.clone();
        sorted.sort_unstable();
        sorted.dedup();
        let expected = last.wrapping_sub(first).wrapping_add(1) as usize;
        sorted.len() != expected
    }

    /// §4.H `update_tracking`: drops entities that became ready; stops
    /// tracking once empty and the sequence range is accounted for. An entity
    /// only drops when it is both physics-ready AND visually ready — neither
    /// condition alone is sufficient (§4.H, spec line on `update_tracking`).
    pub fn update_tracking(&mut self, physics_ready: impl Fn(Uuid) -> bool, visually_ready: impl Fn(Uuid) -> bool) {
        if !self.tracking_started {
            return;
        }
        let ready_ids: Vec<Uuid> = self.tracked.keys().copied().filter(|id| physics_ready(*id) && visually_ready(*id)).collect();
        for id in ready_ids {
            self.tracked.remove(&id);
        }

        let remaining = self.tracked.len();
        if remaining < self.peak_remaining {
            self.stable_updates_with_no_new_peak += 1;
        } else if remaining > self.peak_remaining {
            self.peak_remaining = remaining;
            self.stable_updates_with_no_new_peak = 0;
        }

        if self.tracked.is_empty() && !self.is_missing_sequence_numbers() {
            self.stop_tracking();
        }
    }

    pub fn stop_tracking(&mut self) {
        self.tracking_started = false;
        self.settled_progress = 1.0;
    }

    pub fn remaining_count(&self) -> usize {
        self.tracked.len()
    }

    /// §4.H `loading_progress_percentage`: `(max_tracked - remaining) /
    /// max_tracked`, dampened by 0.2 until `SAFE_LANDING_STABILITY_COUNT`
    /// consecutive updates pass without a new peak in `remaining`.
    pub fn loading_progress_percentage(&self) -> f32 {
        if !self.tracking_started {
            return 1.0;
        }
        if self.max_tracked == 0 {
            return 1.0;
        }
        let raw = (self.max_tracked - self.remaining_count()) as f32 / self.max_tracked as f32;
        if self.stable_updates_with_no_new_peak >= SAFE_LANDING_STABILITY_COUNT {
            raw
        } else {
            raw * crate::constants::SAFE_LANDING_DAMPING
        }
    }
}

impl Default for SafeLanding {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collisionless_entity_is_always_ready() {
        let entity = TrackedEntitySnapshot {
            id: Uuid::new_v4(),
            shape_readiness: ShapeReadiness::Collisionless,
            should_be_physical: true,
            in_physics_sim: false,
            is_visually_ready: false,
        };
        assert!(is_entity_physics_ready(&entity));
    }

    #[test]
    fn load_failed_entity_counts_as_ready() {
        let entity = TrackedEntitySnapshot {
            id: Uuid::new_v4(),
            shape_readiness: ShapeReadiness::LoadFailed,
            should_be_physical: true,
            in_physics_sim: false,
            is_visually_ready: false,
        };
        assert!(is_entity_physics_ready(&entity));
    }

    #[test]
    fn scenario_s5_empties_and_stops_tracking() {
        let mut gate = SafeLanding::new();
        gate.start_tracking();
        let ids: Vec<Uuid> = (0..300).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            gate.record_tracked_entity(*id, false);
        }
        gate.finish_sequence(0, 9);
        for n in 0..=9 {
            gate.add_to_sequence(n);
        }

        // 297 become ready, 3 fail to load (still "ready" per policy).
        let ready: std::collections::HashSet<Uuid> = ids.iter().copied().collect();
        gate.update_tracking(|id| ready.contains(&id), |_| true);

        assert!(!gate.is_tracking());
        assert_eq!(gate.loading_progress_percentage(), 1.0);
    }

    #[test]
    fn missing_sequence_numbers_keep_the_gate_open() {
        let mut gate = SafeLanding::new();
        gate.start_tracking();
        let id = Uuid::new_v4();
        gate.record_tracked_entity(id, false);
        gate.finish_sequence(0, 9);
        gate.add_to_sequence(0);
        // Sequences 1..9 never arrive.
        gate.update_tracking(|_| true, |_| true);
        assert!(gate.is_tracking());
    }

    #[test]
    fn visual_readiness_alone_does_not_drop_a_tracked_entity() {
        let mut gate = SafeLanding::new();
        gate.start_tracking();
        let id = Uuid::new_v4();
        gate.record_tracked_entity(id, false);
        gate.finish_sequence(0, 0);
        gate.add_to_sequence(0);
        gate.update_tracking(|_| false, |_| true);
        assert_eq!(gate.remaining_count(), 1, "physics readiness is required, not just visual readiness");
        gate.update_tracking(|_| true, |_| false);
        assert_eq!(gate.remaining_count(), 1, "visual readiness is required, not just physics readiness");
        gate.update_tracking(|_| true, |_| true);
        assert_eq!(gate.remaining_count(), 0);
    }
}
