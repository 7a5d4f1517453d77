//! Controller error accumulator.
//!
//! Every error kind the controller can raise is one flag of
//! [`ControllerError`]. The accumulator is monotonic: flags are only ever
//! inserted, and cleared solely by an explicit reset.
//!
//! Flags in [`ControllerError::FATAL_MASK`] make setup fail and leave the
//! affected actuator unusable. `ENCODER_CHECK_FAILED` is the only soft kind:
//! recorded, but the remaining actuators keep initializing.

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Accumulated controller error kinds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControllerError: u16 {
        /// Servo slot whose actuator lacks servo capability. **FATAL**.
        const MISCONFIG_SERVO                 = 0x0001;
        /// Servo slot carrying a stepper sub-config. **FATAL**.
        const MISCONFIG_SERVO_WITH_STEPPER    = 0x0002;
        /// Servo slot carrying an encoder sub-config. **FATAL**.
        const MISCONFIG_SERVO_WITH_ENCODER    = 0x0004;
        /// Stepper slot carrying a servo sub-config. **FATAL**.
        const MISCONFIG_STEPPER_WITH_SERVO    = 0x0008;
        /// Stepper slot without a stepper sub-config. **FATAL**.
        const MISCONFIG_NO_STEPPER            = 0x0010;
        /// Stepper slot without an encoder sub-config. **FATAL**.
        const MISCONFIG_NO_ENCODER            = 0x0020;
        /// More servo slots than `MAX_SERVOS`. **FATAL**.
        const TOO_MANY_SERVOS                 = 0x0040;
        /// More stepper slots than `MAX_STEPPERS`. **FATAL**.
        const TOO_MANY_STEPPERS               = 0x0080;
        /// More encoders than `MAX_ENCODERS`. **FATAL**.
        const TOO_MANY_ENCODERS               = 0x0100;
        /// Stepper and encoder of one slot carry different identifiers. **FATAL**.
        const ENCODER_STEPPER_MISMATCH        = 0x0200;
        /// Encoder present without a paired stepper. **FATAL**.
        const ENCODER_WITHOUT_STEPPER         = 0x0400;
        /// Slot declares an unsupported actuator type. **FATAL**.
        const UNKNOWN_ACTUATOR_TYPE           = 0x0800;
        /// Encoder variance check failed (soft).
        const ENCODER_CHECK_FAILED            = 0x1000;
        /// Encoder unusable while seeding its stepper. **FATAL**.
        const ENCODER_CALL_FAILED             = 0x2000;
        /// Stepper looked up for an encoder reports another id. **FATAL**.
        const WRONG_STEPPER                   = 0x4000;
        /// Slot identifier beyond `MAX_ACTUATORS`. **FATAL**.
        const SLOT_OUT_OF_RANGE               = 0x8000;
    }
}

impl ControllerError {
    /// Mask of all soft kinds (recorded, processing continues).
    pub const SOFT_MASK: Self = Self::from_bits_truncate(Self::ENCODER_CHECK_FAILED.bits());

    /// Mask of all FATAL kinds.
    pub const FATAL_MASK: Self = Self::from_bits_truncate(Self::all().bits() & !Self::SOFT_MASK.bits());

    /// Returns true if any FATAL flag is set.
    #[inline]
    pub const fn has_fatal(&self) -> bool {
        self.intersects(Self::FATAL_MASK)
    }

    /// Returns true if any flag at all is set.
    #[inline]
    pub const fn is_set(&self) -> bool {
        !self.is_empty()
    }
}

impl Default for ControllerError {
    fn default() -> Self {
        Self::empty()
    }
}

/// Returned by `Controller::setup` when any error was accumulated.
///
/// Carries the full accumulator so callers can tell a soft encoder failure
/// (rest of the arm usable) from a fatal misconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("actuator setup failed: {errors:?}")]
pub struct SetupFailed {
    pub errors: ControllerError,
}

impl SetupFailed {
    /// Whether the failure includes at least one fatal kind.
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        self.errors.has_fatal()
    }
}
