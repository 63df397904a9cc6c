//! Named numeric constants. Every magic number the spec calls out by value
//! lives here instead of at its call site.

/// Bullet "loses time" below ~10 FPS; six substeps covers down to 15 FPS.
pub const MAX_NUM_SUBSTEPS: usize = 6;
pub const FIXED_SUBSTEP: f32 = 1.0 / 90.0;

// --- MotionState::handleEasyChanges activation thresholds (§4.D) ---
pub const ACTIVATION_POSITION_DELTA: f32 = 0.005;
pub const ACTIVATION_ALIGNMENT_DOT: f32 = 0.99990;
pub const ACTIVATION_LINEAR_DELTA: f32 = 0.01;
pub const ACTIVATION_ANGULAR_DELTA: f32 = 0.03;
pub const ACTIVATION_GRAVITY_DELTA: f32 = 0.1;

// --- remote_simulation_out_of_sync thresholds (§4.D.5) ---
pub const POSITION_ERROR_SQUARED: f32 = 0.002 * 0.002;
pub const KINEMATIC_LINEAR_SPEED_SQUARED: f32 = 0.001 * 0.001;
pub const POSITION_ERROR_RELATIVE_SQUARED: f32 = 0.05 * 0.05;
pub const ROTATION_ERROR_DOT_THRESHOLD: f32 = 0.99999;

// --- acceleration-near-gravity measurement (§4.D) ---
pub const ACCELERATION_NEARLY_GRAVITY_RATIO: f32 = 0.1;
pub const ACCELERATION_NEARLY_GRAVITY_CONFIRM_COUNT: u8 = 4;

// --- ownership bidding / inactivity (§4.G, §5) ---
pub const BID_EXPIRY_SECONDS: f32 = 0.2;
pub const INACTIVE_UPDATE_BASE_SECONDS: f32 = 0.5;
pub const MAX_INACTIVE_UPDATES: u8 = 20;
pub const LOOPS_WITHOUT_OWNER_BEFORE_VOLUNTEER: u8 = 50;

/// Simulation-priority convention. Only `VOLUNTEER` is pinned numerically by
/// the spec; the rest preserve the spec's stated orderings (see DESIGN.md
/// "Open Question decisions" #4).
pub const NO_SIMULATION_PRIORITY: u8 = 0;
pub const RECRUIT_SIMULATION_PRIORITY: u8 = 1;
pub const VOLUNTEER_SIMULATION_PRIORITY: u8 = 2;
pub const SCRIPT_POKE_SIMULATION_PRIORITY: u8 = 3;
pub const SCRIPT_GRAB_SIMULATION_PRIORITY: u8 = 5;
pub const PERSONAL_SIMULATION_PRIORITY: u8 = 100;

// --- ShapeCache (§4.A) ---
pub const SHAPE_GARBAGE_RING_CAPACITY: usize = 256;
pub const ORPHAN_SHAPE_EXPIRY_SECONDS: f32 = 1.0;

// --- ShapeFactory (§4.B) ---
/// One canonical direction per face-center/edge-midpoint of a duodecahedron.
pub const CANONICAL_HULL_DIRECTIONS: usize = 42;
pub const HULL_REDUCTION_POINT_THRESHOLD: usize = CANONICAL_HULL_DIRECTIONS;

// --- Dynamics (§4.C) ---
pub const TRACTOR_MAX_CORRECTIVE_SPEED: f32 = 10.0;
pub const TRACTOR_ROTATION_DOT_SKIP_THRESHOLD: f32 = 0.99999;
pub const TRACTOR_VELOCITY_BLEND_COEFFICIENT: f32 = 0.25;
pub const TRAVEL_ORIENTED_MIN_SPEED: f32 = 0.001;

// --- CharacterController (§4.E) ---
pub const CHARACTER_DEFAULT_GRAVITY: f32 = -5.0;
pub const FLOOR_PROBE_CACHE_SECONDS: f32 = 0.5;
pub const TAKEOFF_DURATION_SECONDS: f32 = 0.25;
pub const HOVER_ASCEND_TIMEOUT_SECONDS: f32 = 1.1;
pub const IN_AIR_TO_GROUND_FLOOR_DISTANCE_RATIO: f32 = 0.1;
pub const GROUND_TO_IN_AIR_FLOOR_DISTANCE_RATIO: f32 = 0.8;
pub const STUCK_CONTACT_DISTANCE: f32 = -0.05;
pub const STUCK_CONTACT_IMPULSE: f32 = 500.0;
pub const STUCK_CONTACT_LIFETIME_STEPS: u32 = 3;
/// Below this, a desired-velocity component counts as zero (§4.E InAir->Hover).
pub const MIN_TARGET_SPEED: f32 = 0.001;

// --- PhysicsEngine contact/collision event derivation (§4.F) ---
pub const CONTACT_PENETRATION_GATE: f32 = -0.002;
pub const CONTACT_CONTINUE_MIN_SUBSTEPS: u32 = 9;

// --- SafeLanding (§4.H) ---
pub const SAFE_LANDING_STABILITY_COUNT: u32 = 15;
pub const SAFE_LANDING_DAMPING: f32 = 0.2;
