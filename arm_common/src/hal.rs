//! Hardware-seam traits and error types.
//!
//! This module defines:
//! - `Clock` - Monotonic time source with a cooperative relax hook
//! - `Board` - Power rails, auxiliary lines, knob ADC, watchdog
//! - `StepOutput` - Stepper enable/direction/clock lines
//! - `EncoderBus` - I2C bus carrying absolute rotary encoders
//! - `ServoBus` - Command bus of the smart servos
//! - `Peripherals` - The bundle the controller owns exclusively
//!
//! # Yield Contract
//!
//! Every bus method that may wait receives `yield_now`. Implementations
//! MUST call it repeatedly while waiting (transaction in flight, timeout
//! pending). The controller passes its step-emission pass as the hook, so
//! a bus that blocks without yielding makes steppers miss pulses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::BUS_COUNT;

/// Error types for bus transactions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    /// No answer within the configured timeout.
    #[error("bus timeout after {timeout_ms} ms")]
    Timeout { timeout_ms: u32 },

    /// Device did not acknowledge its address.
    #[error("no acknowledge from device 0x{address:02x}")]
    Nack { address: u8 },

    /// Bus used before `begin()`.
    #[error("bus not initialized")]
    NotInitialized,

    /// Device answered with a malformed frame.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One of the two I2C buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusId {
    /// Encoders of upper arm, elbow, forearm and wrist.
    #[default]
    Bus0,
    /// Hip encoder and peripherals outside this core.
    Bus1,
}

impl BusId {
    pub const ALL: [BusId; BUS_COUNT] = [BusId::Bus0, BusId::Bus1];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Bus0 => 0,
            Self::Bus1 => 1,
        }
    }
}

/// Digital output lines driven by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputLine {
    /// Relay of the stepper power rail.
    StepperPower,
    /// Relay of the smart-servo power rail.
    ServoPower,
    /// Bus 0 data line, held high during setup.
    Sda0,
    /// Bus 0 clock line, held high during setup.
    Scl0,
    /// Bus 1 data line, held high during setup.
    Sda1,
    /// Bus 1 clock line, held high during setup.
    Scl1,
}

impl OutputLine {
    /// Lines pulled high before the buses come up.
    pub const AUXILIARY: [OutputLine; 4] = [Self::Sda0, Self::Scl0, Self::Sda1, Self::Scl1];
}

/// Pin assignment of one stepper driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct StepPins {
    pub enable: u8,
    pub direction: u8,
    pub clock: u8,
}

/// Monotonic time source.
pub trait Clock {
    /// Microseconds since an arbitrary epoch. Never decreases.
    fn now_us(&self) -> u64;

    /// Milliseconds since the same epoch.
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }

    /// Called from busy waits between two step passes.
    fn relax(&mut self) {
        core::hint::spin_loop();
    }
}

/// Board-level I/O outside the buses.
pub trait Board {
    /// Drive a digital output line.
    fn set_line(&mut self, line: OutputLine, high: bool);

    /// Sample the manual knob (10-bit, center at 512).
    fn read_knob(&mut self) -> u16;

    /// Select the analog reference used by the knob ADC.
    fn init_analog_reference(&mut self);

    /// Kick the hardware watchdog.
    fn watchdog_reset(&mut self);
}

/// Stepper driver lines.
pub trait StepOutput {
    fn set_enabled(&mut self, pins: &StepPins, enabled: bool);

    fn set_direction(&mut self, pins: &StepPins, forward: bool);

    /// Emit one clock pulse. Must not block longer than a few microseconds.
    fn pulse(&mut self, pins: &StepPins);
}

/// I2C bus carrying absolute rotary encoders.
pub trait EncoderBus {
    /// Initialize the bus with its transaction timeout and rate.
    fn begin(&mut self, timeout_ms: u32, rate_hz: u32);

    /// Read the raw angle [deg, 0..360) of the encoder at `address`.
    fn read_angle(&mut self, address: u8, yield_now: &mut dyn FnMut()) -> Result<f32, BusError>;
}

/// Command bus of the smart servos.
pub trait ServoBus {
    /// Bring up the servo protocol layer (baud rate, reboot, clear errors).
    fn setup_communication(&mut self, yield_now: &mut dyn FnMut()) -> Result<(), BusError>;

    /// Switch holding torque of one servo.
    fn set_torque(&mut self, servo_id: u8, on: bool, yield_now: &mut dyn FnMut()) -> Result<(), BusError>;

    /// Command a move to `raw_angle` [deg] completing within `duration_ms`.
    fn move_to(
        &mut self,
        servo_id: u8,
        raw_angle: f32,
        duration_ms: u32,
        yield_now: &mut dyn FnMut(),
    ) -> Result<(), BusError>;

    /// Read back the servo's reported raw angle [deg].
    fn read_angle(&mut self, servo_id: u8, yield_now: &mut dyn FnMut()) -> Result<f32, BusError>;
}

/// All hardware the controller owns.
pub struct Peripherals {
    pub clock: Box<dyn Clock>,
    pub board: Box<dyn Board>,
    pub steps: Box<dyn StepOutput>,
    pub encoder_buses: [Box<dyn EncoderBus>; BUS_COUNT],
    pub servo_bus: Box<dyn ServoBus>,
}

impl Peripherals {
    /// Encoder bus by identifier.
    #[inline]
    pub fn encoder_bus(&mut self, bus: BusId) -> &mut dyn EncoderBus {
        self.encoder_buses[bus.index()].as_mut()
    }
}
