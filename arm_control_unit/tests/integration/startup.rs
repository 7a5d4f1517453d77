//! Integration test: setup sequence.
//!
//! Validates actuator assembly from configuration, encoder checks with
//! stepper seeding, fatal and soft error handling, and the enable gate.

use std::fs;
use std::path::Path;

use arm_common::config::ArmConfig;
use arm_common::consts::{BUS_RATE_HZ, BUS_TIMEOUT_MS, DEFAULT_CONFIG_PATH};
use arm_common::error::ControllerError;
use arm_common::hal::{BusId, OutputLine};

use super::{build, four_joints, id, running, servo_joint, stepper_joint};

#[test]
fn shipped_configuration_sets_up_cleanly() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(DEFAULT_CONFIG_PATH);
    let config = ArmConfig::from_file(&path).unwrap();
    let (mut controller, _rig) = build(config);

    assert!(controller.setup().is_ok());
    assert_eq!(controller.registry().len(), 4);
    assert_eq!(controller.registry().step_order(), &[id(0), id(1), id(3)]);
}

#[test]
fn configuration_file_drives_setup() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("arm.toml");
    fs::write(
        &path,
        r#"
[shared]
service_name = "arm-file"

[[actuators]]
id = 0
type = "servo"

[actuators.servo]
servo_id = 4
"#,
    )
    .unwrap();

    let (mut controller, rig) = build(ArmConfig::from_file(&path).unwrap());
    assert!(controller.setup().is_ok());
    assert!(controller.actuator(id(0)).unwrap().has_servo());
    assert!(rig.servo_bus.servo(4).is_some());
}

#[test]
fn setup_builds_every_configured_actuator() {
    let (mut controller, rig) = build(four_joints());
    assert!(controller.setup().is_ok());

    assert!(controller.is_setup());
    assert!(!controller.is_error());
    let registry = controller.registry();
    assert_eq!(registry.len(), 4);
    assert_eq!(registry.servo_count(), 1);
    assert_eq!(registry.stepper_count(), 3);
    assert_eq!(registry.encoder_count(), 3);

    for (slot, actuator) in registry.iter() {
        assert_eq!(actuator.id(), slot);
        assert_ne!(actuator.has_servo(), actuator.has_stepper());
        if actuator.has_stepper() {
            assert!(actuator.has_encoder());
            assert!(actuator.encoder().unwrap().is_ok());
        }
    }

    for bus in BusId::ALL {
        assert_eq!(
            rig.encoder_bus(bus).begin_params(),
            Some((BUS_TIMEOUT_MS, BUS_RATE_HZ))
        );
    }
    assert!(rig.servo_bus.is_ready());
    assert!(rig.board.analog_reference_initialized());
    assert_eq!(rig.board.watchdog_kicks(), 4);
    for line in OutputLine::AUXILIARY {
        assert!(rig.board.line(line), "{line:?} should be held high");
    }
    assert!(rig.board.line(OutputLine::ServoPower));
}

#[test]
fn steppers_are_seeded_from_their_encoders() {
    let (mut controller, rig) = build(four_joints());
    rig.encoder_bus(BusId::Bus0).set_angle(0x40, 25.0);
    rig.encoder_bus(BusId::Bus1).set_angle(0x40, 340.0);
    controller.setup().unwrap();

    let hip = controller.actuator(id(0)).unwrap().stepper().unwrap();
    assert!((hip.current_angle() - 25.0).abs() < 1e-3);
    assert!((hip.target_angle() - 25.0).abs() < 1e-3);
    assert!(hip.last_measured_ms().is_some());

    // 340° raw is -20° on the joint.
    let wrist = controller.actuator(id(3)).unwrap().stepper().unwrap();
    assert!((wrist.current_angle() + 20.0).abs() < 1e-3);
}

#[test]
fn stepper_encoder_id_mismatch_fails_setup() {
    let mut config = four_joints();
    config.actuators[0].stepper.as_mut().unwrap().id = Some(id(3));
    let (mut controller, rig) = build(config);

    let err = controller.setup().unwrap_err();
    assert!(err.is_fatal());
    assert!(err.errors.contains(ControllerError::ENCODER_STEPPER_MISMATCH));
    assert!(controller.errors().contains(ControllerError::ENCODER_STEPPER_MISMATCH));

    // The broken slot stays empty, the rest is assembled.
    assert!(controller.actuator(id(0)).is_none());
    assert_eq!(controller.registry().len(), 3);
    assert!(!rig.board.line(OutputLine::ServoPower));
}

#[test]
fn noisy_encoder_degrades_one_joint_and_powers_servos_down() {
    let (mut controller, rig) = build(four_joints());
    rig.encoder_bus(BusId::Bus0)
        .set_noise(0x41, vec![0.0, 6.0, -6.0, 12.0]);

    let err = controller.setup().unwrap_err();
    assert!(err.errors.contains(ControllerError::ENCODER_CHECK_FAILED));
    assert!(err.errors.contains(ControllerError::ENCODER_CALL_FAILED));
    assert!(!controller.is_setup());

    // Registry fully populated.
    assert_eq!(controller.registry().len(), 4);

    let noisy = controller.actuator(id(1)).unwrap().encoder().unwrap();
    assert!(!noisy.is_ok());
    assert!(noisy.last_variance().unwrap() > 1.0);

    for slot in [0, 3] {
        let actuator = controller.actuator(id(slot)).unwrap();
        assert!(actuator.encoder().unwrap().is_ok());
        assert!(actuator.stepper().unwrap().last_measured_ms().is_some());
    }
    assert!(controller.actuator(id(2)).unwrap().servo().is_some());
    assert!(!rig.board.line(OutputLine::ServoPower));
    assert!(!controller.is_servo_powered());

    // Healthy encoders keep resynchronizing; the noisy one is left alone.
    let healthy_reads = rig.encoder_bus(BusId::Bus0).reads(0x40);
    let noisy_reads = rig.encoder_bus(BusId::Bus0).reads(0x41);
    for _ in 0..20 {
        controller.cycle(controller.now_ms());
        rig.clock.advance_ms(5);
    }
    assert!(rig.encoder_bus(BusId::Bus0).reads(0x40) > healthy_reads);
    assert_eq!(rig.encoder_bus(BusId::Bus0).reads(0x41), noisy_reads);
}

#[test]
fn unknown_actuator_type_is_fatal() {
    let config = ArmConfig::parse(
        r#"
[shared]
service_name = "arm-test"

[[actuators]]
id = 0
type = "linear_motor"
"#,
    )
    .unwrap();
    let (mut controller, rig) = build(config);

    let err = controller.setup().unwrap_err();
    assert_eq!(err.errors, ControllerError::UNKNOWN_ACTUATOR_TYPE);
    assert!(controller.registry().is_empty());
    assert!(!rig.board.line(OutputLine::ServoPower));
}

#[test]
fn servo_capacity_is_enforced() {
    let config = ArmConfig::new(
        arm_common::config::SharedConfig::new("arm-test"),
        vec![servo_joint(0, 1), servo_joint(1, 2), servo_joint(2, 3)],
    );
    let (mut controller, _rig) = build(config);

    let err = controller.setup().unwrap_err();
    assert!(err.errors.contains(ControllerError::TOO_MANY_SERVOS));
    assert_eq!(controller.registry().servo_count(), 2);
}

#[test]
fn slot_past_the_registry_is_reported_as_such() {
    let config = ArmConfig::new(
        arm_common::config::SharedConfig::new("arm-test"),
        vec![servo_joint(0, 1), servo_joint(9, 2)],
    );
    let (mut controller, _rig) = build(config);

    let err = controller.setup().unwrap_err();
    assert_eq!(err.errors, ControllerError::SLOT_OUT_OF_RANGE);
    assert!(err.is_fatal());
    assert_eq!(controller.registry().len(), 1);
}

#[test]
fn enable_is_refused_before_setup() {
    let (mut controller, rig) = build(four_joints());
    controller.enable();

    assert!(!controller.is_enabled());
    assert_eq!(rig.steps.total_pulses(), 0);
    for clock in [4, 7, 10] {
        assert!(!rig.steps.is_enabled(clock));
    }
}

#[test]
fn enable_is_refused_after_failed_setup() {
    let (mut controller, rig) = build(four_joints());
    rig.encoder_bus(BusId::Bus1).set_failing(0x40, true);
    assert!(controller.setup().is_err());

    controller.enable();
    assert!(!controller.is_enabled());
    for (_, actuator) in controller.registry().iter() {
        assert!(!actuator.is_enabled());
    }
    for clock in [4, 7, 10] {
        assert!(!rig.steps.is_enabled(clock));
    }
}

#[test]
fn disable_then_enable_restores_every_actuator() {
    let (mut controller, rig) = running(four_joints());
    assert!(controller.is_enabled());

    controller.disable();
    assert!(!controller.is_enabled());
    for (_, actuator) in controller.registry().iter() {
        assert!(!actuator.is_enabled());
    }
    assert!(!rig.servo_bus.servo(1).unwrap().torque);

    controller.enable();
    assert!(controller.is_enabled());
    for (_, actuator) in controller.registry().iter() {
        assert!(actuator.is_enabled());
    }
    for clock in [4, 7, 10] {
        assert!(rig.steps.is_enabled(clock));
    }
    assert!(rig.servo_bus.servo(1).unwrap().torque);
}

#[test]
fn selection_handles_missing_and_out_of_range_ids() {
    let mut config = four_joints();
    config.actuators.push(stepper_joint(4, 13, BusId::Bus1, 0x41));
    let (mut controller, _rig) = build(config);
    controller.setup().unwrap();

    controller.select_actuator(id(9));
    assert!(controller.current_actuator().is_none());

    controller.select_actuator(id(5));
    assert!(controller.current_actuator().is_none());

    controller.select_actuator(id(0));
    assert_eq!(controller.current_actuator().unwrap().id(), id(0));
    assert!(controller.actuator(id(0)).unwrap().is_enabled());

    controller.select_actuator(id(4));
    assert_eq!(controller.selected_id(), Some(id(4)));
    assert!(!controller.actuator(id(0)).unwrap().is_enabled());
    assert!(controller.actuator(id(4)).unwrap().is_enabled());

    controller.select_actuator(id(7));
    assert!(controller.current_actuator().is_none());
    assert!(!controller.actuator(id(4)).unwrap().is_enabled());
}

#[test]
fn setup_can_be_repeated() {
    let (mut controller, _rig) = running(four_joints());
    controller.set_angle(id(0), 10.0, 100);

    assert!(controller.setup().is_ok());
    assert!(!controller.is_enabled());
    assert_eq!(controller.registry().len(), 4);
    assert_eq!(controller.registry().step_order(), &[id(0), id(1), id(3)]);
}
