//! Simulation driver module.
//!
//! Software stand-ins for every hardware seam, for development and
//! testing without the arm attached.

mod board;
mod clock;
mod encoder_bus;
mod servo_bus;
mod steps;

pub use board::SimBoard;
pub use clock::{DEFAULT_RELAX_STEP_US, SimClock};
pub use encoder_bus::{READ_TRANSACTION_US, SimEncoderBus, YIELD_SLICE_US};
pub use servo_bus::{SERVO_TRANSACTION_US, SimServo, SimServoBus};
pub use steps::{DriverState, SimStepOutput};

use arm_common::config::{ActuatorType, ArmConfig};
use arm_common::consts::BUS_COUNT;
use arm_common::hal::{BusId, Peripherals};
use tracing::info;

/// Inspection handles onto a simulated arm.
///
/// Every field shares state with the boxed component inside the
/// `Peripherals` returned alongside it.
#[derive(Debug, Clone)]
pub struct SimRig {
    pub clock: SimClock,
    pub board: SimBoard,
    pub steps: SimStepOutput,
    pub encoder_buses: [SimEncoderBus; BUS_COUNT],
    pub servo_bus: SimServoBus,
}

impl SimRig {
    /// Bare rig with no devices attached.
    pub fn new() -> Self {
        let clock = SimClock::new();
        Self {
            board: SimBoard::new(),
            steps: SimStepOutput::new(),
            encoder_buses: [
                SimEncoderBus::new(BusId::Bus0, clock.clone()),
                SimEncoderBus::new(BusId::Bus1, clock.clone()),
            ],
            servo_bus: SimServoBus::new(clock.clone()),
            clock,
        }
    }

    pub fn encoder_bus(&self, bus: BusId) -> &SimEncoderBus {
        &self.encoder_buses[bus.index()]
    }

    /// Attach the devices described by `config`, every joint at angle 0.
    ///
    /// Encoders are coupled to their stepper's rotor so closed-loop
    /// corrections observe the steps the controller emits.
    pub fn populate(&self, config: &ArmConfig) {
        for actuator in &config.actuators {
            match actuator.actuator_type {
                ActuatorType::Servo => {
                    if let Some(ref servo) = actuator.servo {
                        self.servo_bus.add_servo(servo.servo_id, servo.null_angle);
                    }
                }
                ActuatorType::StepperWithEncoder => {
                    let Some(ref encoder) = actuator.encoder else {
                        continue;
                    };
                    let bus = self.encoder_bus(encoder.bus);
                    bus.add_encoder(encoder.address, encoder.null_angle);
                    if let Some(ref stepper) = actuator.stepper {
                        let sign = if stepper.reverse == encoder.reverse { 1.0 } else { -1.0 };
                        bus.couple(
                            encoder.address,
                            self.steps.clone(),
                            stepper.pins.clock,
                            sign * stepper.degrees_per_step(),
                        );
                    }
                }
                ActuatorType::Unsupported => {}
            }
        }
    }

    /// Boxed components for the controller.
    pub fn peripherals(&self) -> Peripherals {
        Peripherals {
            clock: Box::new(self.clock.clone()),
            board: Box::new(self.board.clone()),
            steps: Box::new(self.steps.clone()),
            encoder_buses: [
                Box::new(self.encoder_buses[0].clone()),
                Box::new(self.encoder_buses[1].clone()),
            ],
            servo_bus: Box::new(self.servo_bus.clone()),
        }
    }
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory function creating a populated simulated arm.
pub fn create_peripherals(config: &ArmConfig) -> (Peripherals, SimRig) {
    let rig = SimRig::new();
    rig.populate(config);
    info!(
        actuators = config.actuators.len(),
        "Simulation driver initialized"
    );
    (rig.peripherals(), rig)
}
