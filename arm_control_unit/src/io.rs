//! Hardware access handed to actuator backends.
//!
//! Backends never hold a bus. Whenever they need one the controller lends
//! them a [`DriveIo`], whose bus methods keep the step-emission pass
//! running while the transaction is in flight.

use arm_common::hal::{BusError, BusId, StepOutput};

/// Hardware access for one backend operation.
pub trait DriveIo {
    /// Stepper driver lines. Non-blocking.
    fn steps(&mut self) -> &mut dyn StepOutput;

    /// Raw angle of the encoder at `address` on `bus` [deg].
    fn read_encoder(&mut self, bus: BusId, address: u8) -> Result<f32, BusError>;

    fn set_servo_torque(&mut self, servo_id: u8, on: bool) -> Result<(), BusError>;

    fn move_servo(&mut self, servo_id: u8, raw_angle: f32, duration_ms: u32) -> Result<(), BusError>;

    fn read_servo(&mut self, servo_id: u8) -> Result<f32, BusError>;
}
