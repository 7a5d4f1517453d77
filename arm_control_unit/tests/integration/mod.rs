//! Shared fixtures for the integration tests.

mod knob;
mod power;
mod scheduling;
mod startup;

use arm_common::config::{
    ActuatorConfig, ArmConfig, EncoderConfig, ServoConfig, SharedConfig, StepperConfig,
};
use arm_common::hal::{BusId, StepPins};
use arm_common::id::ActuatorId;
use arm_control_unit::Controller;
use arm_hal::{SimRig, create_peripherals};

/// Default gearing: 360° / (200 · 16) per step.
pub const DEG_PER_STEP: f32 = 0.1125;

/// Stepper slot whose driver clock pin is `clock`.
pub fn stepper_joint(slot: u8, clock: u8, bus: BusId, address: u8) -> ActuatorConfig {
    ActuatorConfig::stepper_with_encoder(
        ActuatorId::new(slot),
        format!("joint{slot}"),
        StepperConfig {
            pins: StepPins {
                enable: clock + 20,
                direction: clock + 10,
                clock,
            },
            ..StepperConfig::default()
        },
        EncoderConfig {
            bus,
            address,
            ..EncoderConfig::default()
        },
    )
}

pub fn servo_joint(slot: u8, servo_id: u8) -> ActuatorConfig {
    ActuatorConfig::servo(
        ActuatorId::new(slot),
        format!("servo{servo_id}"),
        ServoConfig {
            servo_id,
            null_angle: 150.0,
            ..ServoConfig::default()
        },
    )
}

/// {Stepper+Encoder, Stepper+Encoder, Servo, Stepper+Encoder}.
pub fn four_joints() -> ArmConfig {
    ArmConfig::new(
        SharedConfig::new("arm-test"),
        vec![
            stepper_joint(0, 4, BusId::Bus0, 0x40),
            stepper_joint(1, 7, BusId::Bus0, 0x41),
            servo_joint(2, 1),
            stepper_joint(3, 10, BusId::Bus1, 0x40),
        ],
    )
}

pub fn build(config: ArmConfig) -> (Controller, SimRig) {
    let (peripherals, rig) = create_peripherals(&config);
    (Controller::new(config, peripherals), rig)
}

/// Controller over `config` whose setup succeeded, powered and enabled.
pub fn running(config: ArmConfig) -> (Controller, SimRig) {
    let (mut controller, rig) = build(config);
    controller.setup().unwrap();
    controller.power_actuators(true);
    controller.enable();
    (controller, rig)
}

/// Cycle for `ms` of simulated time, advancing `step_us` between cycles.
pub fn run_for(controller: &mut Controller, rig: &SimRig, ms: u64, step_us: u64) {
    let deadline = controller.now_ms() + ms;
    while controller.now_ms() < deadline {
        controller.cycle(controller.now_ms());
        rig.clock.advance_us(step_us);
    }
}

pub fn id(slot: u8) -> ActuatorId {
    ActuatorId::new(slot)
}
