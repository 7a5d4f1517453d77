//! Integration test: scheduling cycle.
//!
//! Validates closed-loop stepper moves with encoder fusion, servo
//! round-robin, the step pass idempotence, graceful encoder read failure
//! and the per-slot identity check.

use arm_common::config::{ArmConfig, SharedConfig, StepOrdering};
use arm_common::consts::ENCODER_REANCHOR_READS;
use arm_common::error::ControllerError;
use arm_common::hal::BusId;

use super::{DEG_PER_STEP, build, four_joints, id, run_for, running, servo_joint, stepper_joint};

#[test]
fn closed_loop_move_reaches_target() {
    let (mut controller, rig) = running(four_joints());
    assert!(controller.set_angle(id(0), 10.0, 500));

    run_for(&mut controller, &rig, 1500, 200);

    let stepper = controller.actuator(id(0)).unwrap().stepper().unwrap();
    assert!((stepper.current_angle() - 10.0).abs() < DEG_PER_STEP);
    let rotor_angle = rig.steps.position(4) as f32 * DEG_PER_STEP;
    assert!((rotor_angle - 10.0).abs() < DEG_PER_STEP);

    assert!(rig.encoder_bus(BusId::Bus0).reads(0x40) > 50);
    assert!(controller.stats().encoder_reads > 0);
    assert_eq!(controller.stats().encoder_rejects, 0);
    assert!(!controller.is_error());

    // Untouched joints hold still.
    assert_eq!(rig.steps.position(7), 0);
    assert_eq!(rig.steps.position(10), 0);
}

#[test]
fn reversed_stepper_drives_the_rotor_backwards() {
    let mut config = ArmConfig::new(
        SharedConfig::new("arm-test"),
        vec![stepper_joint(0, 4, BusId::Bus0, 0x40)],
    );
    config.actuators[0].stepper.as_mut().unwrap().reverse = true;
    config.actuators[0].encoder.as_mut().unwrap().reverse = true;
    let (mut controller, rig) = running(config);

    controller.set_angle(id(0), -15.0, 400);
    run_for(&mut controller, &rig, 1500, 200);

    let stepper = controller.actuator(id(0)).unwrap().stepper().unwrap();
    assert!((stepper.current_angle() + 15.0).abs() < DEG_PER_STEP);
    assert!(rig.steps.position(4) > 0);
}

#[test]
fn encoder_corrects_stepper_drift() {
    let (mut controller, rig) = running(four_joints());

    // Shaft slipped by 2° without any pulse.
    rig.encoder_bus(BusId::Bus0).set_angle(0x40, 2.0);
    run_for(&mut controller, &rig, 500, 200);

    let stepper = controller.actuator(id(0)).unwrap().stepper().unwrap();
    assert!(stepper.current_angle().abs() < DEG_PER_STEP);
    assert!((-19..=-17).contains(&rig.steps.position(4)));
}

#[test]
fn step_pass_is_idempotent() {
    let (mut controller, rig) = running(four_joints());
    controller.set_angle(id(0), 20.0, 200);
    rig.clock.advance_ms(50);

    let first = controller.step_pass();
    let second = controller.step_pass();
    assert!(first > 0);
    assert_eq!(second, 0);
    assert_eq!(rig.steps.pulses(4), u64::from(first));
}

#[test]
fn step_pass_is_inert_before_setup() {
    let (mut controller, rig) = build(four_joints());
    rig.clock.advance_ms(10);
    assert_eq!(controller.step_pass(), 0);
    controller.cycle(controller.now_ms());
    assert_eq!(rig.steps.total_pulses(), 0);
}

#[test]
fn servo_follows_commanded_angle() {
    let (mut controller, rig) = running(four_joints());
    controller.set_angle(id(2), 30.0, 200);

    run_for(&mut controller, &rig, 600, 200);

    let sim = rig.servo_bus.servo(1).unwrap();
    assert!((sim.angle - 180.0).abs() < 1e-3);
    assert!(sim.moves > 0);
    assert_eq!(sim.last_duration_ms, controller.config().timing.servo_sample_ms);

    let servo = controller.actuator(id(2)).unwrap().servo().unwrap();
    assert!((servo.current_angle() - 30.0).abs() < 1e-3);
    assert!((servo.raw_angle() - 180.0).abs() < 1e-3);
    assert!(controller.stats().servo_updates > 0);
}

#[test]
fn one_servo_per_cycle() {
    let config = ArmConfig::new(
        SharedConfig::new("arm-test"),
        vec![
            servo_joint(0, 1),
            servo_joint(1, 2),
            stepper_joint(2, 4, BusId::Bus0, 0x40),
        ],
    );
    let (mut controller, rig) = running(config);
    let reads = |servo_id| rig.servo_bus.servo(servo_id).unwrap().reads;
    let (first_before, second_before) = (reads(1), reads(2));

    controller.cycle(controller.now_ms());
    assert_eq!(controller.stats().servo_updates, 1);
    assert_eq!(reads(1), first_before + 1);
    assert_eq!(reads(2), second_before);

    controller.cycle(controller.now_ms());
    assert_eq!(controller.stats().servo_updates, 2);
    assert_eq!(reads(2), second_before + 1);

    // Round done, interval not yet elapsed.
    controller.cycle(controller.now_ms());
    assert_eq!(controller.stats().servo_updates, 2);

    rig.clock.advance_ms(20);
    controller.cycle(controller.now_ms());
    assert_eq!(controller.stats().servo_updates, 3);
    assert_eq!(reads(1), first_before + 2);
}

#[test]
fn failing_servo_is_counted_not_fatal() {
    let (mut controller, rig) = running(four_joints());
    rig.servo_bus.set_failing(1, true);

    run_for(&mut controller, &rig, 100, 500);

    assert!(controller.stats().servo_failures > 0);
    assert!(controller.actuator(id(2)).unwrap().servo().unwrap().comm_failures() > 0);
    assert!(!controller.is_error());
}

#[test]
fn failed_encoder_read_falls_back_to_estimate() {
    let (mut controller, rig) = running(four_joints());
    let before = controller.actuator(id(3)).unwrap().current_angle();
    rig.encoder_bus(BusId::Bus1).set_failing(0x40, true);

    run_for(&mut controller, &rig, 50, 200);

    let actuator = controller.actuator(id(3)).unwrap();
    let encoder = actuator.encoder().unwrap();
    assert!(encoder.is_ok());
    assert!(encoder.read_failures() > 0);
    assert_eq!(actuator.current_angle(), before);
    assert!(controller.stats().encoder_rejects > 0);
    assert!(!controller.is_error());
}

#[test]
fn implausible_encoder_jump_is_rejected_until_it_persists() {
    let (mut controller, rig) = running(four_joints());
    rig.encoder_bus(BusId::Bus0).set_angle(0x40, 90.0);

    run_for(&mut controller, &rig, 25, 200);

    let actuator = controller.actuator(id(0)).unwrap();
    let encoder = actuator.encoder().unwrap();
    assert!(encoder.angle().abs() < 1e-3);
    assert!((1..ENCODER_REANCHOR_READS).contains(&encoder.read_failures()));
    assert!(actuator.current_angle().abs() < 1e-3);
    assert_eq!(rig.steps.position(4), 0);

    // Still there on every read: the shaft really moved.
    run_for(&mut controller, &rig, 75, 200);

    let encoder = controller.actuator(id(0)).unwrap().encoder().unwrap();
    assert!(encoder.angle() > 45.0);
    assert!(rig.steps.position(4) < 0);
}

#[test]
fn encoder_outage_during_move_recovers() {
    let (mut controller, rig) = running(four_joints());
    controller.set_angle(id(0), 60.0, 1000);
    rig.encoder_bus(BusId::Bus0).set_failing(0x40, true);

    // Long enough for the joint to travel past the plausibility window.
    run_for(&mut controller, &rig, 700, 200);
    let failures = controller.actuator(id(0)).unwrap().encoder().unwrap().read_failures();
    assert!(controller.actuator(id(0)).unwrap().current_angle() > 35.0);

    rig.encoder_bus(BusId::Bus0).set_failing(0x40, false);
    run_for(&mut controller, &rig, 100, 200);

    let actuator = controller.actuator(id(0)).unwrap();
    let encoder = actuator.encoder().unwrap();
    assert_eq!(encoder.read_failures(), failures);
    assert!((encoder.angle() - actuator.current_angle()).abs() < 1.0);
    assert!(encoder.angle() > 35.0);
}

#[test]
fn foreign_stepper_id_in_slot_is_flagged() {
    let mut config = four_joints();
    config.actuators[0].stepper.as_mut().unwrap().id = Some(id(5));
    config.actuators[0].encoder.as_mut().unwrap().id = Some(id(5));
    let (mut controller, rig) = build(config);
    controller.setup().unwrap();
    assert!(!controller.is_error());

    rig.clock.advance_ms(20);
    controller.cycle(controller.now_ms());

    assert!(controller.errors().contains(ControllerError::WRONG_STEPPER));
    assert!(controller.errors().has_fatal());

    controller.reset_error();
    assert!(!controller.is_error());
}

#[test]
fn soonest_due_ordering_still_reaches_targets() {
    let mut config = four_joints();
    config.timing.step_ordering = StepOrdering::SoonestDue;
    let (mut controller, rig) = running(config);
    assert_eq!(controller.step_ordering(), StepOrdering::SoonestDue);

    controller.set_angle(id(0), 5.0, 300);
    controller.set_angle(id(1), -8.0, 600);
    controller.set_angle(id(3), 12.0, 400);
    run_for(&mut controller, &rig, 1500, 200);

    for (slot, target) in [(0, 5.0), (1, -8.0), (3, 12.0)] {
        let angle = controller.actuator(id(slot)).unwrap().current_angle();
        assert!((angle - target).abs() < DEG_PER_STEP, "A{slot} at {angle}");
    }
}

#[test]
fn angle_dump_does_not_disturb_the_cycle() {
    let mut config = four_joints();
    config.diagnostics.log_angles = true;
    let (mut controller, rig) = running(config);
    controller.set_angle(id(0), 3.0, 100);

    run_for(&mut controller, &rig, 800, 200);

    assert!((controller.actuator(id(0)).unwrap().current_angle() - 3.0).abs() < DEG_PER_STEP);
    assert!(controller.stats().cycles > 0);
}
