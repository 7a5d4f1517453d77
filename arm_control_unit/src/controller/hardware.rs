//! Bus access that keeps steppers pulsing.
//!
//! [`Hardware`] is assembled from disjoint borrows of the controller: the
//! registry and step output go into the [`StepPass`], the buses stay
//! beside it. Every bus call receives the step pass as its yield hook.

use arm_common::consts::BUS_COUNT;
use arm_common::hal::{BusError, BusId, Clock, EncoderBus, ServoBus, StepOutput};

use crate::io::DriveIo;
use crate::registry::Registry;

/// The step-emission pass bound to the hardware it drives.
pub(crate) struct StepPass<'a> {
    pub registry: &'a mut Registry,
    pub clock: &'a dyn Clock,
    pub steps: &'a mut dyn StepOutput,
    /// False until setup has run; the pass is then a no-op.
    pub live: bool,
    pub pulses: &'a mut u64,
}

impl StepPass<'_> {
    pub fn run(&mut self) {
        if self.live {
            let emitted = self.registry.step_pass(self.clock.now_us(), &mut *self.steps);
            *self.pulses += u64::from(emitted);
        }
    }
}

pub(crate) struct Hardware<'a> {
    pub pass: StepPass<'a>,
    pub encoder_buses: &'a mut [Box<dyn EncoderBus>; BUS_COUNT],
    pub servo_bus: &'a mut dyn ServoBus,
}

impl Hardware<'_> {
    pub fn setup_servo_bus(&mut self) -> Result<(), BusError> {
        let pass = &mut self.pass;
        self.servo_bus.setup_communication(&mut || pass.run())
    }
}

impl DriveIo for Hardware<'_> {
    fn steps(&mut self) -> &mut dyn StepOutput {
        &mut *self.pass.steps
    }

    fn read_encoder(&mut self, bus: BusId, address: u8) -> Result<f32, BusError> {
        let pass = &mut self.pass;
        self.encoder_buses[bus.index()].read_angle(address, &mut || pass.run())
    }

    fn set_servo_torque(&mut self, servo_id: u8, on: bool) -> Result<(), BusError> {
        let pass = &mut self.pass;
        self.servo_bus.set_torque(servo_id, on, &mut || pass.run())
    }

    fn move_servo(&mut self, servo_id: u8, raw_angle: f32, duration_ms: u32) -> Result<(), BusError> {
        let pass = &mut self.pass;
        self.servo_bus
            .move_to(servo_id, raw_angle, duration_ms, &mut || pass.run())
    }

    fn read_servo(&mut self, servo_id: u8) -> Result<f32, BusError> {
        let pass = &mut self.pass;
        self.servo_bus.read_angle(servo_id, &mut || pass.run())
    }
}
