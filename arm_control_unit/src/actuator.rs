//! Capability-tagged joint abstraction.

use arm_common::error::ControllerError;
use arm_common::hal::BusError;
use arm_common::id::ActuatorId;
use bitflags::bitflags;

use crate::encoder::Encoder;
use crate::io::DriveIo;
use crate::servo::ServoDrive;
use crate::stepper::StepperDrive;

bitflags! {
    /// Backends an actuator exposes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const SERVO   = 0x01;
        const STEPPER = 0x02;
        const ENCODER = 0x04;
    }
}

/// One controllable joint.
///
/// A joint is either a smart servo or a stepper paired with its encoder;
/// no other combination can be represented.
#[derive(Debug, Clone)]
pub enum Actuator {
    Servo(ServoDrive),
    StepperEncoder(StepperDrive, Encoder),
}

impl Actuator {
    pub fn new_servo(drive: ServoDrive) -> Self {
        Self::Servo(drive)
    }

    /// Pair a stepper with its encoder.
    ///
    /// Both must report the same identifier, otherwise
    /// `ENCODER_STEPPER_MISMATCH` is returned.
    pub fn new_stepper_encoder(stepper: StepperDrive, encoder: Encoder) -> Result<Self, ControllerError> {
        if stepper.id() != encoder.id() {
            return Err(ControllerError::ENCODER_STEPPER_MISMATCH);
        }
        Ok(Self::StepperEncoder(stepper, encoder))
    }

    pub fn id(&self) -> ActuatorId {
        match self {
            Self::Servo(servo) => servo.id(),
            Self::StepperEncoder(stepper, _) => stepper.id(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Servo(_) => Capabilities::SERVO,
            Self::StepperEncoder(..) => Capabilities::STEPPER | Capabilities::ENCODER,
        }
    }

    #[inline]
    pub fn has_servo(&self) -> bool {
        matches!(self, Self::Servo(_))
    }

    #[inline]
    pub fn has_stepper(&self) -> bool {
        matches!(self, Self::StepperEncoder(..))
    }

    #[inline]
    pub fn has_encoder(&self) -> bool {
        matches!(self, Self::StepperEncoder(..))
    }

    /// Whether absolute targets can be trusted: a servo, or a stepper whose
    /// encoder passed its last check.
    pub fn is_closed_loop(&self) -> bool {
        match self {
            Self::Servo(_) => true,
            Self::StepperEncoder(_, encoder) => encoder.is_ok(),
        }
    }

    pub fn servo(&self) -> Option<&ServoDrive> {
        match self {
            Self::Servo(servo) => Some(servo),
            Self::StepperEncoder(..) => None,
        }
    }

    pub fn servo_mut(&mut self) -> Option<&mut ServoDrive> {
        match self {
            Self::Servo(servo) => Some(servo),
            Self::StepperEncoder(..) => None,
        }
    }

    pub fn stepper(&self) -> Option<&StepperDrive> {
        match self {
            Self::StepperEncoder(stepper, _) => Some(stepper),
            Self::Servo(_) => None,
        }
    }

    pub fn stepper_mut(&mut self) -> Option<&mut StepperDrive> {
        match self {
            Self::StepperEncoder(stepper, _) => Some(stepper),
            Self::Servo(_) => None,
        }
    }

    pub fn encoder(&self) -> Option<&Encoder> {
        match self {
            Self::StepperEncoder(_, encoder) => Some(encoder),
            Self::Servo(_) => None,
        }
    }

    pub fn encoder_mut(&mut self) -> Option<&mut Encoder> {
        match self {
            Self::StepperEncoder(_, encoder) => Some(encoder),
            Self::Servo(_) => None,
        }
    }

    pub fn set_angle(&mut self, angle: f32, duration_ms: u32, now_us: u64) {
        match self {
            Self::Servo(servo) => servo.set_angle(angle, duration_ms, now_us),
            Self::StepperEncoder(stepper, _) => stepper.set_angle(angle, duration_ms, now_us),
        }
    }

    pub fn change_angle(&mut self, delta: f32, duration_ms: u32, now_us: u64) {
        match self {
            Self::Servo(servo) => servo.change_angle(delta, duration_ms, now_us),
            Self::StepperEncoder(stepper, _) => stepper.change_angle(delta, duration_ms, now_us),
        }
    }

    pub fn current_angle(&self) -> f32 {
        match self {
            Self::Servo(servo) => servo.current_angle(),
            Self::StepperEncoder(stepper, _) => stepper.current_angle(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Servo(servo) => servo.is_enabled(),
            Self::StepperEncoder(stepper, _) => stepper.is_enabled(),
        }
    }

    pub fn enable(&mut self, io: &mut dyn DriveIo) -> Result<(), BusError> {
        match self {
            Self::Servo(servo) => servo.enable(io),
            Self::StepperEncoder(stepper, _) => {
                stepper.enable(io.steps());
                Ok(())
            }
        }
    }

    pub fn disable(&mut self, io: &mut dyn DriveIo) -> Result<(), BusError> {
        match self {
            Self::Servo(servo) => servo.disable(io),
            Self::StepperEncoder(stepper, _) => {
                stepper.disable(io.steps());
                Ok(())
            }
        }
    }
}
