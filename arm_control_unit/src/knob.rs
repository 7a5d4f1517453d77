//! Manual knob input mapping.

use arm_common::consts::{KNOB_ADC_CENTER, KNOB_MAX_DEVIATION, KNOB_SWEEP_DEG};

/// Map a raw knob sample to an angle in `[-135°, +135°]`.
pub fn knob_to_angle(sample: u16) -> f32 {
    let center = KNOB_ADC_CENTER as f32;
    (f32::from(sample) - center) / center * (KNOB_SWEEP_DEG / 2.0)
}

/// Whether a sample deflects so far that the potentiometer is more likely
/// disconnected or stuck than turned.
pub fn is_out_of_band(sample: u16) -> bool {
    (i32::from(sample) - KNOB_ADC_CENTER).abs() >= KNOB_MAX_DEVIATION
}

/// What a knob sample asks of the selected actuator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KnobCommand {
    /// Go to this angle [deg].
    Absolute(f32),
    /// Move by this much [deg].
    Relative(f32),
}

impl KnobCommand {
    /// Size of the requested change relative to `current` [deg].
    pub fn magnitude(&self, current: f32) -> f32 {
        match *self {
            Self::Absolute(angle) => (angle - current).abs(),
            Self::Relative(delta) => delta.abs(),
        }
    }
}

/// Knob sampling state carried between samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct KnobState {
    last_angle: f32,
}

impl KnobState {
    pub const fn new() -> Self {
        Self { last_angle: 0.0 }
    }

    #[inline]
    pub fn last_angle(&self) -> f32 {
        self.last_angle
    }

    /// Turn one sample into a command.
    ///
    /// With feedback (`closed_loop`) the knob position is the target;
    /// without it only the change since the previous sample is applied.
    /// Out-of-band samples produce nothing, but still become the
    /// reference for the next relative change.
    pub fn sample(&mut self, raw: u16, closed_loop: bool) -> Option<KnobCommand> {
        let angle = knob_to_angle(raw);
        let previous = core::mem::replace(&mut self.last_angle, angle);
        if is_out_of_band(raw) {
            return None;
        }
        Some(if closed_loop {
            KnobCommand::Absolute(angle)
        } else {
            KnobCommand::Relative(angle - previous)
        })
    }
}
