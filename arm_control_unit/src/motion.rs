//! Time-scaled point-to-point move profile.
//!
//! A [`Movement`] interpolates between a start and an end angle over a
//! fixed duration with a trapezoidal velocity profile: constant
//! acceleration for the first [`RAMP_FRACTION`] of the duration, cruise,
//! then symmetric deceleration. The requested duration is stretched
//! whenever it would exceed the joint's speed or acceleration limit.

/// Share of the duration spent accelerating (and again decelerating).
pub const RAMP_FRACTION: f64 = 0.25;

/// Cruise speed relative to the average speed of the whole move.
const PEAK_FACTOR: f64 = 1.0 / (1.0 - RAMP_FRACTION);

/// Per-joint kinematic limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionLimits {
    pub min_angle: f32,
    pub max_angle: f32,
    /// [deg/s]
    pub max_speed: f32,
    /// [deg/s²]
    pub max_acceleration: f32,
}

impl MotionLimits {
    #[inline]
    pub fn clamp(&self, angle: f32) -> f32 {
        angle.clamp(self.min_angle, self.max_angle)
    }

    /// Shortest duration covering `distance` degrees within both limits [µs].
    pub fn min_duration_us(&self, distance: f32) -> u64 {
        let distance = f64::from(distance.abs());
        if distance == 0.0 {
            return 0;
        }
        let by_speed = distance * PEAK_FACTOR / f64::from(self.max_speed);
        let by_accel =
            (distance * PEAK_FACTOR / (RAMP_FRACTION * f64::from(self.max_acceleration))).sqrt();
        (by_speed.max(by_accel) * 1e6).ceil() as u64
    }
}

/// One bounded-time move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Movement {
    start_angle: f32,
    end_angle: f32,
    start_us: u64,
    duration_us: u64,
}

impl Movement {
    /// Stand still at `angle`.
    pub const fn hold(angle: f32, now_us: u64) -> Self {
        Self {
            start_angle: angle,
            end_angle: angle,
            start_us: now_us,
            duration_us: 0,
        }
    }

    /// Move from `from` to `to` (clamped into the limits), taking at least
    /// `duration_ms`.
    pub fn plan(from: f32, to: f32, now_us: u64, duration_ms: u32, limits: &MotionLimits) -> Self {
        let to = limits.clamp(to);
        let requested_us = u64::from(duration_ms) * 1000;
        Self {
            start_angle: from,
            end_angle: to,
            start_us: now_us,
            duration_us: requested_us.max(limits.min_duration_us(to - from)),
        }
    }

    #[inline]
    pub fn end_angle(&self) -> f32 {
        self.end_angle
    }

    #[inline]
    pub fn duration_us(&self) -> u64 {
        self.duration_us
    }

    pub fn is_finished(&self, now_us: u64) -> bool {
        now_us.saturating_sub(self.start_us) >= self.duration_us
    }

    /// Normalized progress in `[0, 1]`.
    fn progress(&self, now_us: u64) -> f64 {
        if self.duration_us == 0 {
            return 1.0;
        }
        let elapsed = now_us.saturating_sub(self.start_us).min(self.duration_us);
        elapsed as f64 / self.duration_us as f64
    }

    /// Angle the joint should be at [deg].
    pub fn setpoint(&self, now_us: u64) -> f32 {
        let u = self.progress(now_us);
        let r = RAMP_FRACTION;
        let s = if u < r {
            PEAK_FACTOR * u * u / (2.0 * r)
        } else if u <= 1.0 - r {
            PEAK_FACTOR * (u - r / 2.0)
        } else {
            1.0 - PEAK_FACTOR * (1.0 - u) * (1.0 - u) / (2.0 * r)
        };
        let span = f64::from(self.end_angle - self.start_angle);
        (f64::from(self.start_angle) + span * s) as f32
    }

    /// Magnitude of the profile speed [deg/s].
    pub fn speed(&self, now_us: u64) -> f32 {
        if self.duration_us == 0 || self.is_finished(now_us) {
            return 0.0;
        }
        let u = self.progress(now_us);
        let r = RAMP_FRACTION;
        let ds = if u < r {
            PEAK_FACTOR * u / r
        } else if u <= 1.0 - r {
            PEAK_FACTOR
        } else {
            PEAK_FACTOR * (1.0 - u) / r
        };
        let seconds = self.duration_us as f64 / 1e6;
        (f64::from((self.end_angle - self.start_angle).abs()) * ds / seconds) as f32
    }
}
