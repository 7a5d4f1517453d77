//! Absolute rotary encoder: calibration, signal-quality check, read validation.

use arm_common::config::EncoderConfig;
use arm_common::consts::{ENCODER_CHECK_SAMPLES, ENCODER_MAX_VARIANCE, ENCODER_REANCHOR_READS};
use arm_common::hal::{BusError, BusId};
use arm_common::id::ActuatorId;
use heapless::Vec;
use tracing::{debug, warn};

use crate::io::DriveIo;

/// Wrap an angle into `(-180, 180]`.
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

/// Encoder paired with a stepper.
///
/// `is_ok()` is only changed by [`Encoder::check_variance`]. Per-tick
/// reads that fail or jump implausibly are rejected without touching it.
#[derive(Debug, Clone)]
pub struct Encoder {
    id: ActuatorId,
    bus: BusId,
    address: u8,
    null_angle: f32,
    reverse: bool,
    max_jump_deg: f32,

    raw_angle: f32,
    angle: f32,
    ok: bool,
    read_failures: u32,
    /// Last rejected angle and how many consistent rejections led to it.
    rejected: Option<(f32, u32)>,
    last_variance: Option<f32>,
    samples: Vec<f32, ENCODER_CHECK_SAMPLES>,
}

impl Encoder {
    /// Encoder of slot `slot`; the configured id overrides the slot id.
    pub fn new(slot: ActuatorId, config: &EncoderConfig) -> Self {
        Self {
            id: config.id.unwrap_or(slot),
            bus: config.bus,
            address: config.address,
            null_angle: config.null_angle,
            reverse: config.reverse,
            max_jump_deg: config.max_jump_deg,
            raw_angle: 0.0,
            angle: 0.0,
            ok: false,
            read_failures: 0,
            rejected: None,
            last_variance: None,
            samples: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ActuatorId {
        self.id
    }

    /// Bus and address the encoder answers on.
    #[inline]
    pub fn location(&self) -> (BusId, u8) {
        (self.bus, self.address)
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Last accepted joint angle [deg].
    #[inline]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Last raw sensor angle [deg].
    #[inline]
    pub fn raw_angle(&self) -> f32 {
        self.raw_angle
    }

    /// Rejected per-tick reads since creation.
    #[inline]
    pub fn read_failures(&self) -> u32 {
        self.read_failures
    }

    /// Variance of the last completed check [deg²].
    #[inline]
    pub fn last_variance(&self) -> Option<f32> {
        self.last_variance
    }

    /// Joint angle for a raw sensor angle.
    pub fn calibrate(&self, raw: f32) -> f32 {
        let angle = normalize_angle(raw - self.null_angle);
        if self.reverse { -angle } else { angle }
    }

    /// Sample a short burst and mark the encoder ok only if the spread is
    /// within tolerance. A communication failure fails the check.
    pub fn check_variance(&mut self, io: &mut dyn DriveIo) -> bool {
        self.samples.clear();
        while !self.samples.is_full() {
            match io.read_encoder(self.bus, self.address) {
                Ok(raw) => {
                    self.raw_angle = raw;
                    let angle = self.calibrate(raw);
                    if self.samples.push(angle).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(encoder = %self.id, bus = ?self.bus, address = self.address, "Encoder check read failed: {e}");
                    self.ok = false;
                    self.last_variance = None;
                    return false;
                }
            }
        }

        // Spread is measured relative to the first sample so a joint
        // sitting on the ±180° seam is not mistaken for noise.
        let reference = self.samples[0];
        let n = self.samples.len() as f32;
        let offsets = self.samples.iter().map(|s| normalize_angle(s - reference));
        let mean_offset = offsets.clone().sum::<f32>() / n;
        let variance = offsets.map(|d| (d - mean_offset).powi(2)).sum::<f32>() / n;

        self.last_variance = Some(variance);
        self.ok = variance <= ENCODER_MAX_VARIANCE;
        if self.ok {
            self.angle = normalize_angle(reference + mean_offset);
        }
        debug!(
            encoder = %self.id,
            variance,
            ok = self.ok,
            angle = self.angle,
            "Encoder variance check"
        );
        self.ok
    }

    /// Validate one per-tick reading against `expected`, the paired
    /// stepper's estimate, and adopt it when plausible.
    ///
    /// Returns `false` for a failed read or a reading further than the
    /// configured maximum from `expected`; the previous angle is kept.
    /// A run of [`ENCODER_REANCHOR_READS`] rejected readings that agree
    /// with each other is adopted anyway, so a slipped joint resyncs.
    pub fn accept_reading(&mut self, reading: Result<f32, BusError>, expected: f32) -> bool {
        let raw = match reading {
            Ok(raw) => raw,
            Err(e) => {
                self.read_failures += 1;
                debug!(encoder = %self.id, "Encoder read failed: {e}");
                return false;
            }
        };

        let angle = self.calibrate(raw);
        let jump = normalize_angle(angle - expected).abs();
        if jump > self.max_jump_deg {
            self.read_failures += 1;
            let run = match self.rejected {
                Some((last, run)) if normalize_angle(angle - last).abs() <= self.max_jump_deg => {
                    run + 1
                }
                _ => 1,
            };
            if run < ENCODER_REANCHOR_READS {
                self.rejected = Some((angle, run));
                debug!(encoder = %self.id, angle, expected, "Encoder reading rejected");
                return false;
            }
            warn!(
                encoder = %self.id,
                angle,
                expected,
                "Encoder re-anchored after {run} consistent rejected readings"
            );
        }

        self.rejected = None;
        self.raw_angle = raw;
        self.angle = angle;
        true
    }
}
