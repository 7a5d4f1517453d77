//! Prelude module for common re-exports.
//!
//! Consumers can do `use arm_common::prelude::*;` and get the most
//! important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use arm_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ActuatorConfig, ActuatorType, ArmConfig, ConfigError, ConfigLoader, DiagnosticsConfig,
    EncoderConfig, ServoConfig, SharedConfig, StepOrdering, StepperConfig, TimingConfig,
};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{ControllerError, SetupFailed};

// ─── Identifiers ────────────────────────────────────────────────────
pub use crate::id::ActuatorId;

// ─── Hardware Seams ─────────────────────────────────────────────────
pub use crate::hal::{
    Board, BusError, BusId, Clock, EncoderBus, OutputLine, Peripherals, ServoBus, StepOutput,
    StepPins,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{MAX_ACTUATORS, MAX_ENCODERS, MAX_SERVOS, MAX_STEPPERS};
