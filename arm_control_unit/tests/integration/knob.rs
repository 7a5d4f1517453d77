//! Integration test: manual knob input.
//!
//! Validates absolute targets for closed-loop joints, relative jogging of
//! open-loop steppers, the out-of-band failsafe and mode gating.

use arm_common::hal::BusId;
use arm_control_unit::AdjustMode;
use arm_control_unit::knob::knob_to_angle;

use super::{build, four_joints, id, running};

const TOLERANCE: f32 = 1e-3;

#[test]
fn knob_sets_absolute_angle_with_healthy_encoder() {
    let (mut controller, rig) = running(four_joints());
    controller.select_actuator(id(0));
    controller.adjust_by(AdjustMode::ByKnob);

    rig.board.set_knob(600);
    controller.cycle(controller.now_ms());
    let target = controller.current_actuator().unwrap().stepper().unwrap().target_angle();
    assert!((target - knob_to_angle(600)).abs() < TOLERANCE);

    rig.clock.advance_ms(100);
    rig.board.set_knob(700);
    controller.cycle(controller.now_ms());
    let target = controller.current_actuator().unwrap().stepper().unwrap().target_angle();
    assert!((target - knob_to_angle(700)).abs() < TOLERANCE);
}

#[test]
fn knob_jogs_open_loop_stepper_by_delta() {
    let (mut controller, rig) = build(four_joints());
    rig.encoder_bus(BusId::Bus0).set_failing(0x41, true);
    assert!(controller.setup().is_err());
    assert!(!controller.actuator(id(1)).unwrap().is_closed_loop());

    controller.select_actuator(id(1));
    controller.adjust_by(AdjustMode::ByKnob);

    rig.board.set_knob(600);
    controller.cycle(controller.now_ms());
    let first = controller.current_actuator().unwrap().stepper().unwrap().target_angle();

    rig.clock.advance_ms(100);
    rig.board.set_knob(700);
    controller.cycle(controller.now_ms());
    let second = controller.current_actuator().unwrap().stepper().unwrap().target_angle();

    let expected = knob_to_angle(700) - knob_to_angle(600);
    assert!((second - first - expected).abs() < TOLERANCE);
}

#[test]
fn knob_sets_servo_target() {
    let (mut controller, rig) = running(four_joints());
    controller.select_actuator(id(2));
    controller.adjust_by(AdjustMode::ByKnob);

    rig.board.set_knob(400);
    controller.cycle(controller.now_ms());
    let target = controller.current_actuator().unwrap().servo().unwrap().target_angle();
    assert!((target - knob_to_angle(400)).abs() < TOLERANCE);
}

#[test]
fn out_of_band_samples_are_ignored() {
    let (mut controller, rig) = running(four_joints());
    controller.select_actuator(id(0));
    controller.adjust_by(AdjustMode::ByKnob);

    rig.board.set_knob(1023);
    controller.cycle(controller.now_ms());
    assert_eq!(controller.current_actuator().unwrap().stepper().unwrap().target_angle(), 0.0);

    rig.clock.advance_ms(100);
    rig.board.set_knob(5);
    controller.cycle(controller.now_ms());
    assert_eq!(controller.current_actuator().unwrap().stepper().unwrap().target_angle(), 0.0);

    rig.clock.advance_ms(100);
    rig.board.set_knob(600);
    controller.cycle(controller.now_ms());
    let target = controller.current_actuator().unwrap().stepper().unwrap().target_angle();
    assert!((target - knob_to_angle(600)).abs() < TOLERANCE);
}

#[test]
fn knob_is_sampled_at_its_own_rate() {
    let (mut controller, rig) = running(four_joints());
    controller.select_actuator(id(0));
    controller.adjust_by(AdjustMode::ByKnob);

    rig.board.set_knob(600);
    controller.cycle(controller.now_ms());

    rig.board.set_knob(700);
    rig.clock.advance_ms(10);
    controller.cycle(controller.now_ms());
    let target = controller.current_actuator().unwrap().stepper().unwrap().target_angle();
    assert!((target - knob_to_angle(600)).abs() < TOLERANCE);
}

#[test]
fn manual_mode_ignores_knob() {
    let (mut controller, rig) = running(four_joints());
    controller.select_actuator(id(0));
    assert_eq!(controller.adjust_mode(), AdjustMode::Manually);

    rig.board.set_knob(700);
    controller.cycle(controller.now_ms());
    assert_eq!(controller.current_actuator().unwrap().stepper().unwrap().target_angle(), 0.0);

    controller.adjust_by(AdjustMode::ByKnob);
    controller.adjust_by(AdjustMode::Manually);
    rig.clock.advance_ms(100);
    controller.cycle(controller.now_ms());
    assert_eq!(controller.current_actuator().unwrap().stepper().unwrap().target_angle(), 0.0);
}

#[test]
fn knob_without_selection_is_harmless() {
    let (mut controller, rig) = running(four_joints());
    controller.adjust_by(AdjustMode::ByKnob);
    rig.board.set_knob(700);
    controller.cycle(controller.now_ms());

    for (_, actuator) in controller.registry().iter() {
        assert_eq!(actuator.current_angle(), 0.0);
    }
}

#[test]
fn change_angle_moves_the_selected_actuator() {
    let (mut controller, _rig) = running(four_joints());

    controller.change_angle(5.0, 100);
    for (_, actuator) in controller.registry().iter() {
        let target = match actuator.stepper() {
            Some(stepper) => stepper.target_angle(),
            None => actuator.servo().unwrap().target_angle(),
        };
        assert_eq!(target, 0.0);
    }

    controller.select_actuator(id(3));
    controller.change_angle(5.0, 100);
    controller.change_angle(-2.0, 100);
    let target = controller.current_actuator().unwrap().stepper().unwrap().target_angle();
    assert!((target - 3.0).abs() < TOLERANCE);
}
