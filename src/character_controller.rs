//! Avatar locomotion state machine (§4.E, grounded on
//! `CharacterController.h/.cpp` and `DynamicCharacterController.cpp`).
//!
//! Floor detection and manifold search are abstracted behind `FloorSensor`
//! so the state machine itself stays a pure function of timestamps and
//! sensor readings, testable without a live rapier3d world — the same seam
//! pattern as `RigidBodyView` in `dynamics`.

use nalgebra::Vector3;

use crate::config::CharacterControllerConfig;
use crate::constants::{
    GROUND_TO_IN_AIR_FLOOR_DISTANCE_RATIO, HOVER_ASCEND_TIMEOUT_SECONDS, IN_AIR_TO_GROUND_FLOOR_DISTANCE_RATIO, MIN_TARGET_SPEED,
    STUCK_CONTACT_DISTANCE, STUCK_CONTACT_IMPULSE, STUCK_CONTACT_LIFETIME_STEPS, TAKEOFF_DURATION_SECONDS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Ground,
    Takeoff,
    InAir,
    Hover,
    Seated,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloorHit {
    pub distance: f32,
    pub has_support_manifold: bool,
}

pub trait FloorSensor {
    /// Casts a ray from the body origin minus `half_height` along `-up`,
    /// with length `radius + mode_dependent_extra` (§4.E floor probe); `None`
    /// means no hit within range.
    fn probe_floor(&self, up: Vector3<f32>, radius: f32, half_height: f32) -> Option<FloorHit>;
}

#[derive(Debug, Clone, Copy)]
pub struct ContactSample {
    pub distance: f32,
    pub applied_impulse: f32,
    pub lifetime_steps: u32,
}

pub struct CharacterController {
    pub state: ControllerState,
    pub config: CharacterControllerConfig,
    pub radius: f32,
    pub half_height: f32,
    pub current_up: Vector3<f32>,

    jump_button_held: bool,
    jump_button_just_pressed: bool,
    takeoff_started_at: Option<f32>,
    airborne_jump_press_seen: bool,
    time_since_jump_press: f32,

    cached_floor_hit: Option<FloorHit>,
    floor_cache_age: f32,

    is_stuck: bool,
    stuck_normal: Option<Vector3<f32>>,

    pub follow_transform: Option<(Vector3<f32>, nalgebra::UnitQuaternion<f32>)>,
    pub follow_time_remaining: f32,
}

impl CharacterController {
    pub fn new(config: CharacterControllerConfig, radius: f32, half_height: f32) -> Self {
        let state = if config.seated { ControllerState::Seated } else { ControllerState::Ground };
        Self {
            state,
            config,
            radius,
            half_height,
            current_up: Vector3::y(),
            jump_button_held: false,
            jump_button_just_pressed: false,
            takeoff_started_at: None,
            airborne_jump_press_seen: false,
            time_since_jump_press: f32::MAX,
            cached_floor_hit: None,
            floor_cache_age: f32::MAX,
            is_stuck: false,
            stuck_normal: None,
            follow_transform: None,
            follow_time_remaining: 0.0,
        }
    }

    pub fn press_jump(&mut self) {
        self.jump_button_just_pressed = true;
        self.jump_button_held = true;
        self.time_since_jump_press = 0.0;
    }

    pub fn release_jump(&mut self) {
        self.jump_button_held = false;
    }

    /// §4.E gravity rule: zero in Hover and Collisionless, else configured
    /// default along `current_up`.
    pub fn gravity(&self, is_collisionless: bool) -> Vector3<f32> {
        if self.state == ControllerState::Hover || (is_collisionless && self.config.collisionless_allowed) {
            Vector3::zeros()
        } else {
            self.current_up * self.config.gravity
        }
    }

    fn floor_distance_ratio(&self) -> f32 {
        self.radius + self.half_height
    }

    /// §4.E floor probe: casts fresh unless the cache is younger than
    /// `FLOOR_PROBE_CACHE_SECONDS`.
    fn floor_hit(&mut self, sensor: &dyn FloorSensor, dt: f32) -> Option<FloorHit> {
        self.floor_cache_age += dt;
        if self.floor_cache_age > crate::constants::FLOOR_PROBE_CACHE_SECONDS || self.cached_floor_hit.is_none() {
            self.cached_floor_hit = sensor.probe_floor(self.current_up, self.radius, self.half_height);
            self.floor_cache_age = 0.0;
        }
        self.cached_floor_hit
    }

    /// §4.E transition table, evaluated once per `preSimulation`.
    ///
    /// `desired_vertical_speed` is the player's commanded velocity dotted
    /// with `current_up` (e.g. flying straight up) — a signal distinct from
    /// the jump button, per `CharacterController.cpp`'s `vertTargetSpeedIsNonZero`.
    pub fn pre_simulation(
        &mut self,
        dt: f32,
        vertical_speed: f32,
        jump_speed: f32,
        horizontal_speed: f32,
        flying_fast_threshold: f32,
        desired_vertical_speed: f32,
        sensor: &dyn FloorSensor,
    ) -> Option<Vector3<f32>> {
        if self.state == ControllerState::Seated {
            return None;
        }

        self.time_since_jump_press += dt;
        let hit = self.floor_hit(sensor, dt);
        let has_hit = hit.is_some();
        let has_support = hit.map(|h| h.has_support_manifold).unwrap_or(false);
        let floor_distance = hit.map(|h| h.distance).unwrap_or(f32::MAX);
        let flying_fast = horizontal_speed > flying_fast_threshold;
        let vertical_target_nonzero = desired_vertical_speed > MIN_TARGET_SPEED;

        let mut jump_impulse = None;

        match self.state {
            ControllerState::Ground => {
                if !has_hit && !has_support {
                    self.state = ControllerState::Hover;
                } else if self.jump_button_just_pressed {
                    self.state = ControllerState::Takeoff;
                    self.takeoff_started_at = Some(0.0);
                } else if has_hit && !has_support && floor_distance > GROUND_TO_IN_AIR_FLOOR_DISTANCE_RATIO * self.floor_distance_ratio() {
                    self.state = ControllerState::InAir;
                }
            }
            ControllerState::Takeoff => {
                let elapsed = self.takeoff_started_at.map(|t| t + dt).unwrap_or(dt);
                self.takeoff_started_at = Some(elapsed);
                if !has_hit && !has_support {
                    self.state = ControllerState::Hover;
                } else if elapsed >= TAKEOFF_DURATION_SECONDS {
                    self.state = ControllerState::InAir;
                    jump_impulse = Some(self.current_up * jump_speed);
                }
            }
            ControllerState::InAir => {
                if vertical_speed <= jump_speed * 0.5 && (floor_distance < IN_AIR_TO_GROUND_FLOOR_DISTANCE_RATIO * self.floor_distance_ratio() || has_support) {
                    self.state = ControllerState::Ground;
                } else if self.jump_button_just_pressed && self.airborne_jump_press_seen {
                    self.state = ControllerState::Hover;
                } else if self.jump_button_just_pressed {
                    self.airborne_jump_press_seen = true;
                } else if (self.jump_button_held || vertical_target_nonzero) && self.time_since_jump_press > HOVER_ASCEND_TIMEOUT_SECONDS {
                    self.state = ControllerState::Hover;
                }
            }
            ControllerState::Hover => {
                let min_hover_distance = IN_AIR_TO_GROUND_FLOOR_DISTANCE_RATIO * self.floor_distance_ratio();
                if floor_distance < min_hover_distance && !self.jump_button_held && !flying_fast {
                    self.state = ControllerState::InAir;
                } else if (floor_distance < min_hover_distance || has_support) && !flying_fast {
                    self.state = ControllerState::Ground;
                }
            }
            ControllerState::Seated => unreachable!(),
        }

        if self.state != ControllerState::InAir {
            self.airborne_jump_press_seen = false;
        }
        self.jump_button_just_pressed = false;
        jump_impulse
    }

    /// §4.E stuck detection: latches; only the caller (outer avatar system)
    /// clears it by calling `clear_stuck_if_normal_gone`.
    pub fn observe_contact(&mut self, sample: ContactSample, normal: Vector3<f32>) {
        if sample.distance < STUCK_CONTACT_DISTANCE && sample.applied_impulse > STUCK_CONTACT_IMPULSE && sample.lifetime_steps > STUCK_CONTACT_LIFETIME_STEPS {
            self.is_stuck = true;
            self.stuck_normal = Some(normal);
        }
    }

    pub fn is_stuck(&self) -> bool {
        self.is_stuck
    }

    pub fn clear_stuck_if_normal_gone(&mut self, present_normals: &[Vector3<f32>]) {
        if let Some(stuck_normal) = self.stuck_normal {
            let still_present = present_normals.iter().any(|n| (n - stuck_normal).norm() < 1e-3);
            if !still_present {
                self.is_stuck = false;
                self.stuck_normal = None;
            }
        }
    }

    /// §4.E step-up: `stepUpSpeed = min(stepHeight / stepTime, 0.65 ×
    /// horizontalTargetSpeed)`; caller supplies `step_time` (how long the
    /// step-up ramp should take, typically `stepHeight / horizontalSpeed`).
    pub fn step_up_vertical_speed(&self, step_height: f32, step_time: f32, horizontal_target_speed: f32) -> f32 {
        if !self.config.step_up_enabled || step_time <= 0.0 {
            return 0.0;
        }
        (step_height / step_time).min(0.65 * horizontal_target_speed)
    }

    /// §4.E follow-target: linear displacement clamped to `0.5 × radius`,
    /// angular displacement at `angle / followTime` per second.
    pub fn follow_target_step(&mut self, dt: f32, current_position: Vector3<f32>) -> Option<Vector3<f32>> {
        let (target_position, _target_rotation) = self.follow_transform?;
        if self.follow_time_remaining <= 0.0 {
            return None;
        }
        let max_linear = 0.5 * self.radius;
        let displacement = (target_position - current_position) * (dt / self.follow_time_remaining);
        let clamped = if displacement.norm() > max_linear { displacement.normalize() * max_linear } else { displacement };
        self.follow_time_remaining = (self.follow_time_remaining - dt).max(0.0);
        if self.follow_time_remaining <= 0.0 {
            self.follow_transform = None;
        }
        Some(clamped)
    }
}
