//! Simulated I2C bus carrying absolute rotary encoders.
//!
//! Each transaction consumes simulated time in short slices and calls the
//! caller's yield hook after every slice, the way a real bus driver must
//! while it waits for the hardware.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use arm_common::hal::{BusError, BusId, EncoderBus};
use tracing::{debug, trace};

use super::clock::SimClock;
use super::steps::SimStepOutput;

/// Duration of one successful read [µs].
pub const READ_TRANSACTION_US: u64 = 400;

/// Simulated time between two yield calls inside a transaction [µs].
pub const YIELD_SLICE_US: u64 = 100;

/// Encoder shaft coupled to a simulated stepper rotor.
#[derive(Debug, Clone)]
struct Coupling {
    steps: SimStepOutput,
    clock_pin: u8,
    degrees_per_step: f32,
}

#[derive(Debug, Clone, Default)]
struct SimEncoder {
    /// Raw shaft angle when uncoupled, offset when coupled [deg].
    angle: f32,
    /// Offsets added to successive reads, cycled.
    noise: Vec<f32>,
    noise_cursor: usize,
    failing: bool,
    reads: u32,
    coupling: Option<Coupling>,
}

impl SimEncoder {
    fn sample(&mut self) -> f32 {
        let mut angle = self.angle;
        if let Some(ref c) = self.coupling {
            angle += c.steps.position(c.clock_pin) as f32 * c.degrees_per_step;
        }
        if !self.noise.is_empty() {
            angle += self.noise[self.noise_cursor % self.noise.len()];
            self.noise_cursor += 1;
        }
        angle.rem_euclid(360.0)
    }
}

#[derive(Debug, Default)]
struct BusState {
    begun: Option<(u32, u32)>,
    devices: HashMap<u8, SimEncoder>,
}

/// Encoder bus simulator handle.
#[derive(Debug, Clone)]
pub struct SimEncoderBus {
    bus: BusId,
    clock: SimClock,
    state: Rc<RefCell<BusState>>,
}

impl SimEncoderBus {
    pub fn new(bus: BusId, clock: SimClock) -> Self {
        Self {
            bus,
            clock,
            state: Rc::new(RefCell::new(BusState::default())),
        }
    }

    /// Attach an encoder reporting a fixed raw angle.
    pub fn add_encoder(&self, address: u8, raw_angle: f32) {
        self.state.borrow_mut().devices.insert(
            address,
            SimEncoder {
                angle: raw_angle,
                ..SimEncoder::default()
            },
        );
    }

    /// Move the shaft of an attached encoder.
    pub fn set_angle(&self, address: u8, raw_angle: f32) {
        self.with_device(address, |d| d.angle = raw_angle);
    }

    /// Add `offsets` to successive reads, cycling through them.
    pub fn set_noise(&self, address: u8, offsets: Vec<f32>) {
        self.with_device(address, |d| {
            d.noise = offsets;
            d.noise_cursor = 0;
        });
    }

    /// A failing encoder never answers; reads time out.
    pub fn set_failing(&self, address: u8, failing: bool) {
        self.with_device(address, |d| d.failing = failing);
    }

    /// Couple the encoder shaft to a simulated stepper rotor.
    ///
    /// Reads then return the configured angle plus the rotor position
    /// converted to degrees.
    pub fn couple(&self, address: u8, steps: SimStepOutput, clock_pin: u8, degrees_per_step: f32) {
        self.with_device(address, |d| {
            d.coupling = Some(Coupling {
                steps,
                clock_pin,
                degrees_per_step,
            })
        });
    }

    /// Reads attempted at `address`, successful or not.
    pub fn reads(&self, address: u8) -> u32 {
        self.state
            .borrow()
            .devices
            .get(&address)
            .map_or(0, |d| d.reads)
    }

    /// Timeout and rate passed to `begin()`, if it was called.
    pub fn begin_params(&self) -> Option<(u32, u32)> {
        self.state.borrow().begun
    }

    fn with_device(&self, address: u8, f: impl FnOnce(&mut SimEncoder)) {
        let mut state = self.state.borrow_mut();
        f(state.devices.entry(address).or_default());
    }

    /// Let `us` of simulated time pass, yielding every slice.
    fn spend(&self, us: u64, yield_now: &mut dyn FnMut()) {
        let mut remaining = us;
        while remaining > 0 {
            let slice = remaining.min(YIELD_SLICE_US);
            self.clock.advance_us(slice);
            remaining -= slice;
            yield_now();
        }
    }
}

impl EncoderBus for SimEncoderBus {
    fn begin(&mut self, timeout_ms: u32, rate_hz: u32) {
        debug!(bus = ?self.bus, timeout_ms, rate_hz, "Encoder bus initialized");
        self.state.borrow_mut().begun = Some((timeout_ms, rate_hz));
    }

    fn read_angle(&mut self, address: u8, yield_now: &mut dyn FnMut()) -> Result<f32, BusError> {
        let Some((timeout_ms, _)) = self.state.borrow().begun else {
            return Err(BusError::NotInitialized);
        };

        let failing = {
            let mut state = self.state.borrow_mut();
            match state.devices.get_mut(&address) {
                Some(device) => {
                    device.reads += 1;
                    device.failing
                }
                None => return Err(BusError::Nack { address }),
            }
        };

        if failing {
            self.spend(u64::from(timeout_ms) * 1000, yield_now);
            debug!(bus = ?self.bus, address, "Encoder read timed out");
            return Err(BusError::Timeout { timeout_ms });
        }

        // Device state is not borrowed while the caller's hook runs.
        self.spend(READ_TRANSACTION_US, yield_now);

        let mut state = self.state.borrow_mut();
        let angle = state
            .devices
            .get_mut(&address)
            .map(SimEncoder::sample)
            .ok_or(BusError::Nack { address })?;
        trace!(bus = ?self.bus, address, angle, "Encoder read");
        Ok(angle)
    }
}
