//! Smart-servo drive.

use arm_common::config::ServoConfig;
use arm_common::hal::BusError;
use arm_common::id::ActuatorId;

use crate::encoder::normalize_angle;
use crate::io::DriveIo;
use crate::motion::{MotionLimits, Movement};

/// Integrated servo commanded over the servo bus.
///
/// The servo closes its own position loop. The drive only feeds it the
/// setpoint of the active move once per update, one sample interval ahead,
/// and reads the reported position back.
#[derive(Debug, Clone)]
pub struct ServoDrive {
    id: ActuatorId,
    servo_id: u8,
    null_angle: f32,
    reverse: bool,
    limits: MotionLimits,
    sample_interval_ms: u32,

    movement: Movement,
    current_angle: f32,
    raw_angle: f32,
    enabled: bool,
    synced: bool,
    last_update_us: Option<u64>,
    comm_failures: u32,
}

impl ServoDrive {
    pub fn new(slot: ActuatorId, config: &ServoConfig, sample_interval_ms: u32) -> Self {
        Self {
            id: slot,
            servo_id: config.servo_id,
            null_angle: config.null_angle,
            reverse: config.reverse,
            limits: MotionLimits {
                min_angle: config.min_angle,
                max_angle: config.max_angle,
                max_speed: f32::INFINITY,
                max_acceleration: f32::INFINITY,
            },
            sample_interval_ms,
            movement: Movement::hold(0.0, 0),
            current_angle: 0.0,
            raw_angle: config.null_angle,
            enabled: false,
            synced: false,
            last_update_us: None,
            comm_failures: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> ActuatorId {
        self.id
    }

    /// Address on the servo bus.
    #[inline]
    pub fn servo_id(&self) -> u8 {
        self.servo_id
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Joint angle last reported by the servo [deg].
    #[inline]
    pub fn current_angle(&self) -> f32 {
        self.current_angle
    }

    /// Raw position last reported by the servo [deg].
    #[inline]
    pub fn raw_angle(&self) -> f32 {
        self.raw_angle
    }

    #[inline]
    pub fn target_angle(&self) -> f32 {
        self.movement.end_angle()
    }

    #[inline]
    pub fn last_update_us(&self) -> Option<u64> {
        self.last_update_us
    }

    #[inline]
    pub fn comm_failures(&self) -> u32 {
        self.comm_failures
    }

    pub fn to_raw(&self, angle: f32) -> f32 {
        let angle = if self.reverse { -angle } else { angle };
        self.null_angle + angle
    }

    pub fn from_raw(&self, raw: f32) -> f32 {
        let angle = normalize_angle(raw - self.null_angle);
        if self.reverse { -angle } else { angle }
    }

    /// Switch torque on and adopt the reported position as the hold target.
    pub fn enable(&mut self, io: &mut dyn DriveIo) -> Result<(), BusError> {
        self.track(io.set_servo_torque(self.servo_id, true))?;
        self.enabled = true;
        self.sync(io)
    }

    pub fn disable(&mut self, io: &mut dyn DriveIo) -> Result<(), BusError> {
        self.enabled = false;
        self.movement = Movement::hold(self.current_angle, 0);
        self.track(io.set_servo_torque(self.servo_id, false))
    }

    pub fn set_angle(&mut self, angle: f32, duration_ms: u32, now_us: u64) {
        let from = self.movement.setpoint(now_us);
        self.movement = Movement::plan(from, angle, now_us, duration_ms, &self.limits);
    }

    /// Move by `delta` relative to the current target.
    pub fn change_angle(&mut self, delta: f32, duration_ms: u32, now_us: u64) {
        self.set_angle(self.target_angle() + delta, duration_ms, now_us);
    }

    /// One servo exchange: send the setpoint (when enabled), read back.
    ///
    /// The first exchange only reads, so a servo is never commanded
    /// before its real position is known.
    pub fn update(&mut self, now_us: u64, io: &mut dyn DriveIo) -> Result<(), BusError> {
        if !self.synced {
            return self.sync(io);
        }

        if self.enabled {
            let ahead_us = now_us + u64::from(self.sample_interval_ms) * 1000;
            let raw = self.to_raw(self.movement.setpoint(ahead_us));
            self.track(io.move_servo(self.servo_id, raw, self.sample_interval_ms))?;
        }

        self.read_back(io)?;
        self.last_update_us = Some(now_us);
        Ok(())
    }

    fn sync(&mut self, io: &mut dyn DriveIo) -> Result<(), BusError> {
        self.read_back(io)?;
        self.movement = Movement::hold(self.current_angle, 0);
        self.synced = true;
        Ok(())
    }

    fn read_back(&mut self, io: &mut dyn DriveIo) -> Result<(), BusError> {
        let raw = self.track(io.read_servo(self.servo_id))?;
        self.raw_angle = raw;
        self.current_angle = self.from_raw(raw);
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T, BusError>) -> Result<T, BusError> {
        if result.is_err() {
            self.comm_failures += 1;
        }
        result
    }
}
