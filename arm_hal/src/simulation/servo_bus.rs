//! Simulated smart-servo command bus.
//!
//! Servos reach a commanded position instantly. Commands and reads cost
//! simulated time and yield like the encoder bus does.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use arm_common::hal::{BusError, ServoBus};
use tracing::{debug, trace};

use super::clock::SimClock;

/// Duration of one servo transaction [µs].
pub const SERVO_TRANSACTION_US: u64 = 300;

const YIELD_SLICE_US: u64 = 100;

/// Observable state of one simulated servo.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimServo {
    /// Raw position [deg].
    pub angle: f32,
    pub torque: bool,
    pub moves: u32,
    pub reads: u32,
    /// Duration of the last accepted move [ms].
    pub last_duration_ms: u32,
    pub failing: bool,
}

#[derive(Debug, Default)]
struct BusState {
    ready: bool,
    servos: HashMap<u8, SimServo>,
}

/// Servo bus simulator handle.
#[derive(Debug, Clone)]
pub struct SimServoBus {
    clock: SimClock,
    state: Rc<RefCell<BusState>>,
}

impl SimServoBus {
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(BusState::default())),
        }
    }

    pub fn add_servo(&self, servo_id: u8, raw_angle: f32) {
        self.state.borrow_mut().servos.insert(
            servo_id,
            SimServo {
                angle: raw_angle,
                ..SimServo::default()
            },
        );
    }

    pub fn set_failing(&self, servo_id: u8, failing: bool) {
        if let Some(servo) = self.state.borrow_mut().servos.get_mut(&servo_id) {
            servo.failing = failing;
        }
    }

    pub fn servo(&self, servo_id: u8) -> Option<SimServo> {
        self.state.borrow().servos.get(&servo_id).copied()
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().ready
    }

    fn spend(&self, yield_now: &mut dyn FnMut()) {
        let mut remaining = SERVO_TRANSACTION_US;
        while remaining > 0 {
            let slice = remaining.min(YIELD_SLICE_US);
            self.clock.advance_us(slice);
            remaining -= slice;
            yield_now();
        }
    }

    /// Run one transaction against `servo_id`.
    fn transact<T>(
        &self,
        servo_id: u8,
        yield_now: &mut dyn FnMut(),
        f: impl FnOnce(&mut SimServo) -> T,
    ) -> Result<T, BusError> {
        if !self.state.borrow().ready {
            return Err(BusError::NotInitialized);
        }
        self.spend(yield_now);

        let mut state = self.state.borrow_mut();
        match state.servos.get_mut(&servo_id) {
            Some(servo) if servo.failing => Err(BusError::Malformed(format!(
                "servo {servo_id} returned checksum error"
            ))),
            Some(servo) => Ok(f(servo)),
            None => Err(BusError::Nack { address: servo_id }),
        }
    }
}

impl ServoBus for SimServoBus {
    fn setup_communication(&mut self, yield_now: &mut dyn FnMut()) -> Result<(), BusError> {
        self.spend(yield_now);
        self.state.borrow_mut().ready = true;
        debug!("Servo bus ready");
        Ok(())
    }

    fn set_torque(
        &mut self,
        servo_id: u8,
        on: bool,
        yield_now: &mut dyn FnMut(),
    ) -> Result<(), BusError> {
        self.transact(servo_id, yield_now, |servo| servo.torque = on)
    }

    fn move_to(
        &mut self,
        servo_id: u8,
        raw_angle: f32,
        duration_ms: u32,
        yield_now: &mut dyn FnMut(),
    ) -> Result<(), BusError> {
        self.transact(servo_id, yield_now, |servo| {
            servo.moves += 1;
            servo.last_duration_ms = duration_ms;
            if servo.torque {
                servo.angle = raw_angle;
            }
        })?;
        trace!(servo_id, raw_angle, duration_ms, "Servo move");
        Ok(())
    }

    fn read_angle(&mut self, servo_id: u8, yield_now: &mut dyn FnMut()) -> Result<f32, BusError> {
        self.transact(servo_id, yield_now, |servo| {
            servo.reads += 1;
            servo.angle
        })
    }
}
