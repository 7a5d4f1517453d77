//! Integration test: power sequencing and cooperative waits.
//!
//! Validates rail ordering, settle and pacing delays, and that steppers
//! keep pulsing while the controller waits.

use arm_common::config::{ArmConfig, SharedConfig};
use arm_common::consts::{DISABLE_PACING_MS, SERVO_POWER_SETTLE_MS};
use arm_common::hal::{BusId, Clock, OutputLine};

use super::{DEG_PER_STEP, build, four_joints, id, running, stepper_joint};

fn rail_changes(log: &[(OutputLine, bool)]) -> Vec<(OutputLine, bool)> {
    log.iter()
        .copied()
        .filter(|(line, _)| matches!(line, OutputLine::StepperPower | OutputLine::ServoPower))
        .collect()
}

#[test]
fn rails_switch_in_order() {
    let (mut controller, rig) = build(four_joints());
    controller.setup().unwrap();
    rig.board.clear_line_log();

    controller.power_actuators(true);
    assert!(controller.is_powered());
    assert!(controller.is_servo_powered());
    assert_eq!(
        rail_changes(&rig.board.line_log()),
        vec![(OutputLine::StepperPower, true), (OutputLine::ServoPower, true)]
    );

    rig.board.clear_line_log();
    controller.power_actuators(false);
    assert!(!controller.is_powered());
    assert!(!controller.is_servo_powered());
    assert_eq!(
        rail_changes(&rig.board.line_log()),
        vec![(OutputLine::ServoPower, false), (OutputLine::StepperPower, false)]
    );
    assert!(!rig.board.line(OutputLine::StepperPower));
    assert!(!rig.board.line(OutputLine::ServoPower));
}

#[test]
fn servo_rail_settles_before_returning() {
    let (mut controller, rig) = build(four_joints());
    let start = rig.clock.now_us();
    controller.switch_servo_power(true);
    assert!(rig.clock.now_us() - start >= u64::from(SERVO_POWER_SETTLE_MS) * 1000);
    assert!(rig.board.line(OutputLine::ServoPower));

    let start = rig.clock.now_us();
    controller.switch_servo_power(false);
    assert_eq!(rig.clock.now_us(), start);
    assert!(!rig.board.line(OutputLine::ServoPower));
}

#[test]
fn disable_paces_consecutive_actuators() {
    let (mut controller, rig) = running(four_joints());
    let start = rig.clock.now_us();
    controller.disable();
    let elapsed = rig.clock.now_us() - start;
    assert!(elapsed >= 4 * u64::from(DISABLE_PACING_MS) * 1000);
}

#[test]
fn steppers_keep_moving_while_waiting() {
    let (mut controller, rig) = running(four_joints());
    controller.set_angle(id(0), 10.0, 300);

    controller.wait_ms(1000);

    assert!(rig.steps.position(4) > 0);
    let angle = controller.actuator(id(0)).unwrap().current_angle();
    assert!((angle - 10.0).abs() < DEG_PER_STEP);
}

#[test]
fn steppers_keep_moving_during_encoder_timeouts() {
    let config = ArmConfig::new(
        SharedConfig::new("arm-test"),
        vec![
            stepper_joint(0, 4, BusId::Bus0, 0x40),
            stepper_joint(1, 7, BusId::Bus1, 0x40),
        ],
    );
    let (mut controller, rig) = running(config);
    controller.set_angle(id(0), 10.0, 300);
    rig.encoder_bus(BusId::Bus1).set_failing(0x40, true);

    // One cycle: the second joint's read blocks for the full bus timeout.
    rig.clock.advance_ms(20);
    controller.cycle(controller.now_ms());

    let angle = controller.actuator(id(0)).unwrap().current_angle();
    assert!((angle - 10.0).abs() < DEG_PER_STEP);
}

#[test]
fn fatal_setup_leaves_servo_rail_off() {
    let mut config = four_joints();
    config.actuators[2].servo = None;
    let (mut controller, rig) = build(config);

    assert!(controller.setup().is_err());
    assert!(!rig.board.line(OutputLine::ServoPower));
    assert!(rig
        .board
        .line_log()
        .contains(&(OutputLine::ServoPower, true)));
}
