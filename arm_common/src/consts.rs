//! System-wide constants for the arm workspace.
//!
//! Single source of truth for capacities, sample intervals and the
//! manual-knob mapping. Imported by all crates.

use static_assertions::const_assert;

/// Maximum number of actuator slots.
pub const MAX_ACTUATORS: usize = 7;

/// Maximum number of stepper drives.
pub const MAX_STEPPERS: usize = 5;

/// Maximum number of rotary encoders.
pub const MAX_ENCODERS: usize = 5;

/// Maximum number of smart servos.
pub const MAX_SERVOS: usize = 2;

/// Number of I2C buses carrying encoders.
pub const BUS_COUNT: usize = 2;

/// Default I2C transaction timeout [ms].
pub const BUS_TIMEOUT_MS: u32 = 1000;

/// Default I2C bus rate [Hz].
pub const BUS_RATE_HZ: u32 = 400_000;

// ─── Sample intervals ───────────────────────────────────────────────

/// Interval between servo rounds [ms].
pub const SERVO_SAMPLE_INTERVAL_MS: u32 = 20;

/// Interval between encoder resyncs of one stepper [ms].
pub const ENCODER_SAMPLE_INTERVAL_MS: u32 = 10;

/// Interval between knob samples [ms].
pub const KNOB_SAMPLE_INTERVAL_MS: u32 = 100;

/// Lower bound for any configurable sample interval [ms].
pub const SAMPLE_INTERVAL_MS_MIN: u32 = 1;

/// Upper bound for any configurable sample interval [ms].
pub const SAMPLE_INTERVAL_MS_MAX: u32 = 10_000;

// ─── Power sequencing ───────────────────────────────────────────────

/// Settle time after switching the servo rail on [ms].
pub const SERVO_POWER_SETTLE_MS: u32 = 50;

/// Hold time after enabling all actuators [ms].
pub const ENABLE_SETTLE_MS: u32 = 200;

/// Pacing delay between disabling consecutive actuators [ms].
pub const DISABLE_PACING_MS: u32 = 5;

// ─── Encoder validation ─────────────────────────────────────────────

/// Samples taken by one encoder variance check.
pub const ENCODER_CHECK_SAMPLES: usize = 8;

/// Maximum accepted sample variance during the check [deg²].
pub const ENCODER_MAX_VARIANCE: f32 = 1.0;

/// Default maximum distance between an encoder reading and the stepper
/// estimate [deg].
pub const ENCODER_MAX_JUMP_DEG: f32 = 30.0;

/// Consecutive rejected but mutually consistent readings after which the
/// encoder is trusted again.
pub const ENCODER_REANCHOR_READS: u32 = 5;

// ─── Manual knob ────────────────────────────────────────────────────

/// ADC value of the knob's mechanical center (10-bit ADC).
pub const KNOB_ADC_CENTER: i32 = 512;

/// Deviations from center at or beyond this are treated as a stuck sensor.
pub const KNOB_MAX_DEVIATION: i32 = 500;

/// Full mechanical sweep of the knob potentiometer [deg].
pub const KNOB_SWEEP_DEG: f32 = 270.0;

/// Knob angle changes larger than this get logged [deg].
pub const KNOB_LOG_THRESHOLD_DEG: f32 = 0.3;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/arm.toml";

const_assert!(MAX_STEPPERS <= MAX_ACTUATORS);
const_assert!(MAX_SERVOS <= MAX_ACTUATORS);
const_assert!(MAX_ENCODERS >= MAX_STEPPERS);
const_assert!(MAX_ACTUATORS <= u8::MAX as usize);
const_assert!(KNOB_MAX_DEVIATION < KNOB_ADC_CENTER);
