//! Open-loop stepper drive with encoder position fusion.

use arm_common::config::StepperConfig;
use arm_common::hal::{StepOutput, StepPins};
use arm_common::id::ActuatorId;

use crate::motion::{MotionLimits, Movement};

/// Geared stepper driven by timed clock pulses.
///
/// The position estimate is an origin angle plus a signed step count, so
/// it accumulates no rounding drift between two measurements. Each tick
/// emits the pulses needed to bring the estimate within half a step of
/// the movement's setpoint, paced so the joint never exceeds `max_speed`.
/// Calling `tick` again at the same instant emits nothing.
#[derive(Debug, Clone)]
pub struct StepperDrive {
    id: ActuatorId,
    pins: StepPins,
    degrees_per_step: f32,
    /// Shortest spacing between two pulses at `max_speed` [µs].
    step_interval_us: u64,
    reverse: bool,
    limits: MotionLimits,

    origin_angle: f32,
    step_offset: i64,
    movement: Movement,

    enabled: bool,
    forward: Option<bool>,

    sample_interval_ms: u32,
    measured_at_ms: Option<u64>,
    last_tick_us: u64,
    last_step_us: Option<u64>,
}

impl StepperDrive {
    /// Stepper of slot `slot`; the configured id overrides the slot id.
    /// `sample_interval_ms` is how often it wants an encoder measurement.
    pub fn new(slot: ActuatorId, config: &StepperConfig, sample_interval_ms: u32) -> Self {
        Self {
            id: config.id.unwrap_or(slot),
            pins: config.pins,
            degrees_per_step: config.degrees_per_step(),
            step_interval_us: step_interval_us(config),
            reverse: config.reverse,
            limits: MotionLimits {
                min_angle: config.min_angle,
                max_angle: config.max_angle,
                max_speed: config.max_speed,
                max_acceleration: config.max_acceleration,
            },
            origin_angle: 0.0,
            step_offset: 0,
            movement: Movement::hold(0.0, 0),
            enabled: false,
            forward: None,
            sample_interval_ms,
            measured_at_ms: None,
            last_tick_us: 0,
            last_step_us: None,
        }
    }

    #[inline]
    pub fn id(&self) -> ActuatorId {
        self.id
    }

    #[inline]
    pub fn pins(&self) -> &StepPins {
        &self.pins
    }

    #[inline]
    pub fn degrees_per_step(&self) -> f32 {
        self.degrees_per_step
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self, steps: &mut dyn StepOutput) {
        steps.set_enabled(&self.pins, true);
        self.enabled = true;
    }

    /// De-energize the driver and drop any move in progress.
    pub fn disable(&mut self, steps: &mut dyn StepOutput) {
        steps.set_enabled(&self.pins, false);
        self.enabled = false;
        self.movement = Movement::hold(self.current_angle(), self.last_tick_us);
    }

    /// Best estimate of the joint angle [deg].
    #[inline]
    pub fn current_angle(&self) -> f32 {
        self.origin_angle + self.step_offset as f32 * self.degrees_per_step
    }

    /// Where the active move ends [deg].
    #[inline]
    pub fn target_angle(&self) -> f32 {
        self.movement.end_angle()
    }

    /// Move to `angle` within at least `duration_ms`, replacing any active move.
    pub fn set_angle(&mut self, angle: f32, duration_ms: u32, now_us: u64) {
        self.movement = Movement::plan(
            self.current_angle(),
            angle,
            now_us,
            duration_ms,
            &self.limits,
        );
    }

    /// Move by `delta` relative to the current target.
    pub fn change_angle(&mut self, delta: f32, duration_ms: u32, now_us: u64) {
        self.set_angle(self.target_angle() + delta, duration_ms, now_us);
    }

    /// Overwrite the estimate without recording a measurement.
    ///
    /// The active move is untouched; follow with `set_angle` to hold here.
    pub fn set_current_angle(&mut self, angle: f32) {
        self.origin_angle = angle;
        self.step_offset = 0;
    }

    /// Fuse an encoder measurement taken at `now_ms`.
    pub fn set_measured_angle(&mut self, angle: f32, now_ms: u64) {
        self.set_current_angle(angle);
        self.measured_at_ms = Some(now_ms);
    }

    /// Whether the next encoder measurement is due.
    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.measured_at_ms {
            None => true,
            Some(at) => now_ms.saturating_sub(at) >= u64::from(self.sample_interval_ms),
        }
    }

    #[inline]
    pub fn last_measured_ms(&self) -> Option<u64> {
        self.measured_at_ms
    }

    /// Scheduled time of the last pulse [µs].
    #[inline]
    pub fn last_step_us(&self) -> Option<u64> {
        self.last_step_us
    }

    #[inline]
    pub fn step_interval_us(&self) -> u64 {
        self.step_interval_us
    }

    /// Earliest time the next pulse may go out. The schedule never lags
    /// `now_us` by more than one interval, so a late tick catches up by at
    /// most one extra pulse.
    fn next_slot_us(&self, now_us: u64) -> u64 {
        let earliest = now_us.saturating_sub(self.step_interval_us);
        self.last_step_us
            .map_or(now_us, |last| last.saturating_add(self.step_interval_us))
            .max(earliest)
    }

    /// Emit the pulses due at `now_us`. Returns how many were emitted.
    pub fn tick(&mut self, now_us: u64, steps: &mut dyn StepOutput) -> u32 {
        self.last_tick_us = now_us;
        if !self.enabled {
            return 0;
        }

        let setpoint = self.movement.setpoint(now_us);
        let half_step = self.degrees_per_step / 2.0;
        let mut slot_us = self.next_slot_us(now_us);
        let mut emitted = 0;
        while slot_us <= now_us {
            let error = setpoint - self.current_angle();
            // Written so a NaN error stops rather than spins.
            if !(error.abs() > half_step) {
                break;
            }
            let forward = error > 0.0;
            if self.forward != Some(forward) {
                steps.set_direction(&self.pins, forward != self.reverse);
                self.forward = Some(forward);
            }
            steps.pulse(&self.pins);
            self.step_offset += if forward { 1 } else { -1 };
            self.last_step_us = Some(slot_us);
            slot_us = slot_us.saturating_add(self.step_interval_us);
            emitted += 1;
        }
        emitted
    }

    /// Estimated time until the next pulse [µs]; `None` when idle.
    pub fn next_pulse_in_us(&self, now_us: u64) -> Option<u64> {
        if !self.enabled {
            return None;
        }
        let error = (self.movement.setpoint(now_us) - self.current_angle()).abs();
        let remaining = self.degrees_per_step / 2.0 - error;
        if remaining <= 0.0 {
            return Some(self.next_slot_us(now_us).saturating_sub(now_us));
        }
        if self.movement.is_finished(now_us) {
            return None;
        }
        let speed = self.movement.speed(now_us);
        if speed <= 0.0 {
            return Some(0);
        }
        Some((remaining / speed * 1e6) as u64)
    }
}

fn step_interval_us(config: &StepperConfig) -> u64 {
    let interval = config.degrees_per_step() / config.max_speed * 1e6;
    (interval.round() as u64).max(1)
}
