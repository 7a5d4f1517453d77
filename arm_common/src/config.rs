//! Configuration loading traits and types.
//!
//! The persisted arm configuration is a single TOML file: a `[shared]`
//! section, optional `[timing]` and `[diagnostics]` sections, and one
//! `[[actuators]]` entry per actuator slot, indexed by identifier.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! service_name = "arm-01"
//!
//! [[actuators]]
//! id = 0
//! name = "hip"
//! type = "stepper_with_encoder"
//!
//! [actuators.stepper]
//! pins = { enable = 2, direction = 3, clock = 4 }
//! gear_ratio = 9.0
//!
//! [actuators.encoder]
//! bus = "bus1"
//! address = 0x40
//!
//! [[actuators]]
//! id = 1
//! name = "gripper"
//! type = "servo"
//!
//! [actuators.servo]
//! servo_id = 1
//! ```
//!
//! Loading only checks shape and numeric bounds. Whether a slot's
//! sub-configs match its declared type is decided by controller setup,
//! which reports it through the error accumulator.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::consts::{
    BUS_RATE_HZ, BUS_TIMEOUT_MS, ENCODER_MAX_JUMP_DEG, ENCODER_SAMPLE_INTERVAL_MS,
    KNOB_SAMPLE_INTERVAL_MS, MAX_ACTUATORS, SAMPLE_INTERVAL_MS_MAX, SAMPLE_INTERVAL_MS_MIN,
    SERVO_SAMPLE_INTERVAL_MS,
};
use crate::hal::{BusId, StepPins};
use crate::id::ActuatorId;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Controller instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: service_name.into(),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML.
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax or shape is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Arm Config ─────────────────────────────────────────────────────

/// Complete persisted configuration of the arm.
///
/// Read once at setup; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmConfig {
    pub shared: SharedConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// One entry per actuator slot; entry `i` must carry `id = i`.
    #[serde(default)]
    pub actuators: Vec<ActuatorConfig>,
}

impl ArmConfig {
    pub fn new(shared: SharedConfig, actuators: Vec<ActuatorConfig>) -> Self {
        Self {
            shared,
            timing: TimingConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            actuators,
        }
    }

    /// Load from a file and validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from TOML text and validate.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config = Self::from_toml_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate shape and numeric bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.timing.validate()?;

        if self.actuators.len() > MAX_ACTUATORS {
            return Err(ConfigError::ValidationError(format!(
                "{} actuators configured, at most {MAX_ACTUATORS} supported",
                self.actuators.len()
            )));
        }

        for (index, actuator) in self.actuators.iter().enumerate() {
            if actuator.id.index() != index {
                return Err(ConfigError::ValidationError(format!(
                    "actuator entry {index} has id {}, entries must be indexed by id",
                    actuator.id.0
                )));
            }
            actuator.validate()?;
        }
        Ok(())
    }
}

// ─── Timing ─────────────────────────────────────────────────────────

/// Order in which the step-emission pass visits steppers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepOrdering {
    /// Registry order, never reordered.
    #[default]
    Identity,
    /// After each pass the stepper with the nearest pulse moves to the front.
    SoonestDue,
}

/// Sample intervals and bus parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_servo_sample_ms")]
    pub servo_sample_ms: u32,

    #[serde(default = "default_encoder_sample_ms")]
    pub encoder_sample_ms: u32,

    #[serde(default = "default_knob_sample_ms")]
    pub knob_sample_ms: u32,

    #[serde(default = "default_bus_timeout_ms")]
    pub bus_timeout_ms: u32,

    #[serde(default = "default_bus_rate_hz")]
    pub bus_rate_hz: u32,

    #[serde(default)]
    pub step_ordering: StepOrdering,
}

fn default_servo_sample_ms() -> u32 {
    SERVO_SAMPLE_INTERVAL_MS
}
fn default_encoder_sample_ms() -> u32 {
    ENCODER_SAMPLE_INTERVAL_MS
}
fn default_knob_sample_ms() -> u32 {
    KNOB_SAMPLE_INTERVAL_MS
}
fn default_bus_timeout_ms() -> u32 {
    BUS_TIMEOUT_MS
}
fn default_bus_rate_hz() -> u32 {
    BUS_RATE_HZ
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            servo_sample_ms: SERVO_SAMPLE_INTERVAL_MS,
            encoder_sample_ms: ENCODER_SAMPLE_INTERVAL_MS,
            knob_sample_ms: KNOB_SAMPLE_INTERVAL_MS,
            bus_timeout_ms: BUS_TIMEOUT_MS,
            bus_rate_hz: BUS_RATE_HZ,
            step_ordering: StepOrdering::default(),
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("servo_sample_ms", self.servo_sample_ms),
            ("encoder_sample_ms", self.encoder_sample_ms),
            ("knob_sample_ms", self.knob_sample_ms),
        ] {
            if !(SAMPLE_INTERVAL_MS_MIN..=SAMPLE_INTERVAL_MS_MAX).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} {value} out of range [{SAMPLE_INTERVAL_MS_MIN}, {SAMPLE_INTERVAL_MS_MAX}]"
                )));
            }
        }
        if self.bus_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "bus_timeout_ms must be positive".to_string(),
            ));
        }
        if self.bus_rate_hz == 0 {
            return Err(ConfigError::ValidationError(
                "bus_rate_hz must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Diagnostic output switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Log every setup step.
    #[serde(default)]
    pub log_setup: bool,

    /// Dump all actuator angles after every cycle.
    #[serde(default)]
    pub log_angles: bool,
}

// ─── Actuators ──────────────────────────────────────────────────────

/// Declared backend kind of an actuator slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorType {
    /// Integrated smart servo on the servo bus.
    Servo,
    /// Geared stepper with an absolute rotary encoder.
    StepperWithEncoder,
    /// Any other value found in the persisted configuration.
    #[serde(other)]
    Unsupported,
}

/// Descriptor of one actuator slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub id: ActuatorId,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub actuator_type: ActuatorType,

    #[serde(default)]
    pub servo: Option<ServoConfig>,

    #[serde(default)]
    pub stepper: Option<StepperConfig>,

    #[serde(default)]
    pub encoder: Option<EncoderConfig>,
}

impl ActuatorConfig {
    /// Servo-backed slot.
    pub fn servo(id: ActuatorId, name: impl Into<String>, servo: ServoConfig) -> Self {
        Self {
            id,
            name: name.into(),
            actuator_type: ActuatorType::Servo,
            servo: Some(servo),
            stepper: None,
            encoder: None,
        }
    }

    /// Stepper + encoder slot.
    pub fn stepper_with_encoder(
        id: ActuatorId,
        name: impl Into<String>,
        stepper: StepperConfig,
        encoder: EncoderConfig,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            actuator_type: ActuatorType::StepperWithEncoder,
            servo: None,
            stepper: Some(stepper),
            encoder: Some(encoder),
        }
    }

    /// Human-readable label for logs.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            format!("{}({})", self.name, self.id)
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref stepper) = self.stepper {
            stepper
                .validate()
                .map_err(|e| ConfigError::ValidationError(format!("{}: {e}", self.label())))?;
        }
        if let Some(ref servo) = self.servo {
            servo
                .validate()
                .map_err(|e| ConfigError::ValidationError(format!("{}: {e}", self.label())))?;
        }
        if let Some(ref encoder) = self.encoder {
            if !(encoder.max_jump_deg > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{}: encoder max_jump_deg must be positive",
                    self.label()
                )));
            }
        }
        Ok(())
    }
}

/// Geared stepper parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepperConfig {
    /// Identifier the stepper reports; defaults to its slot id.
    #[serde(default)]
    pub id: Option<ActuatorId>,

    pub pins: StepPins,

    #[serde(default = "default_steps_per_rev")]
    pub steps_per_rev: u16,

    #[serde(default = "default_microsteps")]
    pub microsteps: u16,

    /// Motor revolutions per joint revolution.
    pub gear_ratio: f32,

    /// Maximum joint speed [deg/s].
    #[serde(default = "default_max_speed")]
    pub max_speed: f32,

    /// Maximum joint acceleration [deg/s²].
    #[serde(default = "default_max_acceleration")]
    pub max_acceleration: f32,

    #[serde(default = "default_min_angle")]
    pub min_angle: f32,

    #[serde(default = "default_max_angle")]
    pub max_angle: f32,

    /// Invert the direction line.
    #[serde(default)]
    pub reverse: bool,
}

fn default_steps_per_rev() -> u16 {
    200
}
fn default_microsteps() -> u16 {
    16
}
fn default_max_speed() -> f32 {
    90.0
}
fn default_max_acceleration() -> f32 {
    300.0
}
fn default_min_angle() -> f32 {
    -180.0
}
fn default_max_angle() -> f32 {
    180.0
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            id: None,
            pins: StepPins::default(),
            steps_per_rev: default_steps_per_rev(),
            microsteps: default_microsteps(),
            gear_ratio: 1.0,
            max_speed: default_max_speed(),
            max_acceleration: default_max_acceleration(),
            min_angle: default_min_angle(),
            max_angle: default_max_angle(),
            reverse: false,
        }
    }
}

impl StepperConfig {
    /// Joint angle covered by one (micro)step [deg].
    pub fn degrees_per_step(&self) -> f32 {
        360.0 / (self.steps_per_rev as f32 * self.microsteps as f32 * self.gear_ratio)
    }

    fn validate(&self) -> Result<(), String> {
        if self.steps_per_rev == 0 || self.microsteps == 0 {
            return Err("stepper steps_per_rev and microsteps must be positive".to_string());
        }
        if !(self.gear_ratio > 0.0) {
            return Err(format!("stepper gear_ratio {} must be positive", self.gear_ratio));
        }
        if !(self.max_speed > 0.0) || !(self.max_acceleration > 0.0) {
            return Err("stepper max_speed and max_acceleration must be positive".to_string());
        }
        if !(self.min_angle < self.max_angle) {
            return Err(format!(
                "stepper angle limits [{}, {}] are not ordered",
                self.min_angle, self.max_angle
            ));
        }
        Ok(())
    }
}

/// Absolute rotary encoder parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Identifier the encoder reports; defaults to its slot id.
    #[serde(default)]
    pub id: Option<ActuatorId>,

    #[serde(default)]
    pub bus: BusId,

    /// 7-bit I2C address.
    pub address: u8,

    /// Raw sensor angle corresponding to joint angle 0 [deg].
    #[serde(default)]
    pub null_angle: f32,

    /// Sensor counts opposite to the joint's positive direction.
    #[serde(default)]
    pub reverse: bool,

    /// Readings jumping further than this are rejected [deg].
    #[serde(default = "default_max_jump")]
    pub max_jump_deg: f32,
}

fn default_max_jump() -> f32 {
    ENCODER_MAX_JUMP_DEG
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            id: None,
            bus: BusId::default(),
            address: 0x40,
            null_angle: 0.0,
            reverse: false,
            max_jump_deg: ENCODER_MAX_JUMP_DEG,
        }
    }
}

/// Smart servo parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServoConfig {
    /// Address on the servo bus.
    pub servo_id: u8,

    /// Raw servo angle corresponding to joint angle 0 [deg].
    #[serde(default)]
    pub null_angle: f32,

    #[serde(default)]
    pub reverse: bool,

    #[serde(default = "default_servo_min_angle")]
    pub min_angle: f32,

    #[serde(default = "default_servo_max_angle")]
    pub max_angle: f32,
}

fn default_servo_min_angle() -> f32 {
    -150.0
}
fn default_servo_max_angle() -> f32 {
    150.0
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            servo_id: 0,
            null_angle: 0.0,
            reverse: false,
            min_angle: default_servo_min_angle(),
            max_angle: default_servo_max_angle(),
        }
    }
}

impl ServoConfig {
    fn validate(&self) -> Result<(), String> {
        if !(self.min_angle < self.max_angle) {
            return Err(format!(
                "servo angle limits [{}, {}] are not ordered",
                self.min_angle, self.max_angle
            ));
        }
        Ok(())
    }
}
