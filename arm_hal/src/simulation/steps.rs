//! Simulated stepper drivers.
//!
//! Drivers are keyed by their clock pin. Each pulse moves the simulated
//! rotor one step in the direction currently latched on the direction
//! line; pulses while the driver is disabled are counted but do not move
//! the rotor.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use arm_common::hal::{StepOutput, StepPins};

/// Observable state of one simulated driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverState {
    pub enabled: bool,
    pub forward: bool,
    /// Rotor position [steps].
    pub position: i64,
    /// Pulses received, including ones while disabled.
    pub pulses: u64,
    pub direction_changes: u64,
}

/// Stepper output simulator handle.
#[derive(Debug, Clone, Default)]
pub struct SimStepOutput {
    drivers: Rc<RefCell<HashMap<u8, DriverState>>>,
}

impl SimStepOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of the driver whose clock pin is `clock_pin`.
    pub fn driver(&self, clock_pin: u8) -> DriverState {
        self.drivers
            .borrow()
            .get(&clock_pin)
            .copied()
            .unwrap_or_default()
    }

    pub fn position(&self, clock_pin: u8) -> i64 {
        self.driver(clock_pin).position
    }

    pub fn pulses(&self, clock_pin: u8) -> u64 {
        self.driver(clock_pin).pulses
    }

    pub fn is_enabled(&self, clock_pin: u8) -> bool {
        self.driver(clock_pin).enabled
    }

    /// Pulses across all drivers.
    pub fn total_pulses(&self) -> u64 {
        self.drivers.borrow().values().map(|d| d.pulses).sum()
    }

    fn with_driver(&self, pins: &StepPins, f: impl FnOnce(&mut DriverState)) {
        let mut drivers = self.drivers.borrow_mut();
        f(drivers.entry(pins.clock).or_default());
    }
}

impl StepOutput for SimStepOutput {
    fn set_enabled(&mut self, pins: &StepPins, enabled: bool) {
        self.with_driver(pins, |d| d.enabled = enabled);
    }

    fn set_direction(&mut self, pins: &StepPins, forward: bool) {
        self.with_driver(pins, |d| {
            if d.forward != forward {
                d.direction_changes += 1;
            }
            d.forward = forward;
        });
    }

    fn pulse(&mut self, pins: &StepPins) {
        self.with_driver(pins, |d| {
            d.pulses += 1;
            if d.enabled {
                d.position += if d.forward { 1 } else { -1 };
            }
        });
    }
}
