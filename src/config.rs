//! Ambient configuration surface (SPEC_FULL.md §A.3). Nothing here is read
//! from a file by this crate; the outer driver is expected to populate a
//! `PhysicsCoreConfig` (from CLI flags, a config file via its own `serde`
//! deserialization, or hardcoded defaults) and pass it in at construction.

use serde::{Deserialize, Serialize};

use crate::constants::{CHARACTER_DEFAULT_GRAVITY, FIXED_SUBSTEP, MAX_NUM_SUBSTEPS};

/// §6 character-controller configuration struct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterControllerConfig {
    pub flying_allowed: bool,
    pub collisionless_allowed: bool,
    pub gravity: f32,
    pub scale_factor: f32,
    pub step_up_enabled: bool,
    pub seated: bool,
}

impl Default for CharacterControllerConfig {
    fn default() -> Self {
        Self {
            flying_allowed: true,
            collisionless_allowed: false,
            gravity: CHARACTER_DEFAULT_GRAVITY,
            scale_factor: 1.0,
            step_up_enabled: true,
            seated: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsCoreConfig {
    pub fixed_substep: f32,
    pub max_num_substeps: usize,
    pub character_controller: CharacterControllerConfig,
}

impl Default for PhysicsCoreConfig {
    fn default() -> Self {
        Self {
            fixed_substep: FIXED_SUBSTEP,
            max_num_substeps: MAX_NUM_SUBSTEPS,
            character_controller: CharacterControllerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = PhysicsCoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PhysicsCoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_num_substeps, config.max_num_substeps);
    }

    #[test]
    fn partial_json_fills_remaining_fields_from_default() {
        let parsed: PhysicsCoreConfig = serde_json::from_str(r#"{"fixed_substep": 0.02}"#).unwrap();
        assert_eq!(parsed.fixed_substep, 0.02);
        assert_eq!(parsed.max_num_substeps, MAX_NUM_SUBSTEPS);
    }
}
