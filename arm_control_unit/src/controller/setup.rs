//! Bring-up sequence: power, buses, actuator assembly, encoder checks and
//! stepper seeding.

use arm_common::config::{ActuatorConfig, ActuatorType, TimingConfig};
use arm_common::error::{ControllerError, SetupFailed};
use arm_common::hal::{Board, BusId, Clock, EncoderBus, OutputLine};
use tracing::{debug, error, info, warn};

use super::Controller;
use crate::actuator::{Actuator, Capabilities};
use crate::encoder::Encoder;
use crate::servo::ServoDrive;
use crate::stepper::StepperDrive;

impl Controller {
    /// Build every configured actuator and bring the hardware up.
    ///
    /// Fatal kinds leave the affected slot empty and the servo rail off.
    /// A failed encoder variance check is soft on its own, but the
    /// stepper behind it cannot be seeded, which is fatal for that slot.
    /// Either way the remaining slots are assembled, and any recorded
    /// error makes the call fail with the whole accumulator.
    pub fn setup(&mut self) -> Result<(), SetupFailed> {
        let log_setup = self.config.diagnostics.log_setup;

        // 1. Error state
        self.reset_error();
        self.setup_ok = false;
        self.stepping = false;

        // 2. Actuators inert
        self.disable();
        self.selected = None;
        self.pending_servos.clear();
        self.registry.clear();

        // 3. Auxiliary lines stabilize bus signaling
        for line in OutputLine::AUXILIARY {
            self.peripherals.board.set_line(line, true);
        }

        // 4. Servo rail
        self.switch_servo_power(true);

        // 5. Buses
        let TimingConfig {
            bus_timeout_ms,
            bus_rate_hz,
            ..
        } = self.config.timing;
        for bus in BusId::ALL {
            self.peripherals
                .encoder_bus(bus)
                .begin(bus_timeout_ms, bus_rate_hz);
        }
        if log_setup {
            info!(timeout_ms = bus_timeout_ms, rate_hz = bus_rate_hz, "Buses initialized");
        }

        // 6. Servo link
        if let Err(e) = self.hardware().setup_servo_bus() {
            warn!("Servo bus setup failed: {e}");
        }

        // 7. Actuators
        let timing = self.config.timing.clone();
        for index in 0..self.config.actuators.len() {
            self.peripherals.board.watchdog_reset();
            let entry = &self.config.actuators[index];
            let slot = entry.id;
            let label = entry.label();
            if log_setup {
                info!(actuator = %label, kind = ?entry.actuator_type, "Setting up actuator");
            }

            let assembled = assemble(entry, &timing)
                .and_then(|actuator| self.registry.insert(slot, actuator));
            if let Err(kinds) = assembled {
                self.record(kinds, &label);
            }
        }

        // 8. Encoder signal quality
        for id in self.registry.step_order().to_vec() {
            let passed = self.with_actuator(id, |actuator, io| {
                actuator.encoder_mut().map(|encoder| encoder.check_variance(io))
            });
            match passed.flatten() {
                Some(true) => {
                    if log_setup {
                        info!(actuator = %self.label(id), "Encoder check passed");
                    }
                }
                Some(false) => {
                    let label = self.label(id);
                    self.record(ControllerError::ENCODER_CHECK_FAILED, &label);
                }
                None => {}
            }
        }

        // 9. Seed steppers from their encoders
        let now_ms = self.peripherals.clock.now_ms();
        let now_us = self.peripherals.clock.now_us();
        for id in self.registry.step_order().to_vec() {
            let outcome = match self.registry.get_mut(id) {
                Some(Actuator::StepperEncoder(stepper, encoder)) => {
                    if stepper.id() != encoder.id() {
                        Err(ControllerError::ENCODER_STEPPER_MISMATCH)
                    } else if encoder.is_ok() {
                        let angle = encoder.angle();
                        stepper.set_current_angle(angle);
                        stepper.set_measured_angle(angle, now_ms);
                        stepper.set_angle(angle, 1, now_us);
                        Ok(angle)
                    } else {
                        Err(ControllerError::ENCODER_CALL_FAILED)
                    }
                }
                _ => continue,
            };
            match outcome {
                Ok(angle) if log_setup => {
                    info!(actuator = %self.label(id), angle, "Stepper seeded from encoder");
                }
                Ok(_) => {}
                Err(kind) => {
                    let label = self.label(id);
                    self.record(kind, &label);
                }
            }
        }

        // 10. Knob
        self.peripherals.board.init_analog_reference();

        // 11. Leave the servo rail off after a fatal error
        if self.errors.has_fatal() {
            self.switch_servo_power(false);
        }

        self.stepping = true;
        self.setup_ok = self.errors.is_empty();
        self.log_configuration();

        if self.setup_ok {
            info!(actuators = self.registry.len(), "Setup complete");
            Ok(())
        } else {
            Err(SetupFailed {
                errors: self.errors,
            })
        }
    }

    /// Accumulate `kinds` raised for actuator `label`.
    fn record(&mut self, kinds: ControllerError, label: &str) {
        self.errors |= kinds;
        if kinds.has_fatal() {
            error!(actuator = %label, ?kinds, "Actuator setup failed");
        } else {
            warn!(actuator = %label, ?kinds, "Actuator degraded");
        }
    }
}

/// Build the actuator a config entry describes.
///
/// Sub-configs that contradict the declared type are rejected here, so
/// no slot ever holds a half-built actuator.
fn assemble(entry: &ActuatorConfig, timing: &TimingConfig) -> Result<Actuator, ControllerError> {
    let slot = entry.id;
    match entry.actuator_type {
        ActuatorType::Servo => {
            let mut kinds = ControllerError::empty();
            if entry.stepper.is_some() {
                kinds |= ControllerError::MISCONFIG_SERVO_WITH_STEPPER;
            }
            if entry.encoder.is_some() {
                kinds |= ControllerError::MISCONFIG_SERVO_WITH_ENCODER;
            }
            let Some(servo) = entry.servo.as_ref() else {
                return Err(kinds | ControllerError::MISCONFIG_SERVO);
            };
            if !kinds.is_empty() {
                return Err(kinds);
            }

            let actuator = Actuator::new_servo(ServoDrive::new(slot, servo, timing.servo_sample_ms));
            check_capabilities(&actuator, Capabilities::SERVO)?;
            Ok(actuator)
        }
        ActuatorType::StepperWithEncoder => {
            if entry.servo.is_some() {
                return Err(ControllerError::MISCONFIG_STEPPER_WITH_SERVO);
            }
            let (stepper, encoder) = match (entry.stepper.as_ref(), entry.encoder.as_ref()) {
                (Some(stepper), Some(encoder)) => (stepper, encoder),
                (None, Some(_)) => return Err(ControllerError::ENCODER_WITHOUT_STEPPER),
                (None, None) => return Err(ControllerError::MISCONFIG_NO_STEPPER),
                (Some(_), None) => return Err(ControllerError::MISCONFIG_NO_ENCODER),
            };

            let stepper = StepperDrive::new(slot, stepper, timing.encoder_sample_ms);
            let encoder = Encoder::new(slot, encoder);
            if stepper.id() != encoder.id() {
                error!(
                    slot = %slot,
                    stepper = %stepper.id(),
                    encoder = %encoder.id(),
                    "Stepper and encoder identifiers differ"
                );
            }
            let actuator = Actuator::new_stepper_encoder(stepper, encoder)?;
            check_capabilities(&actuator, Capabilities::STEPPER | Capabilities::ENCODER)?;
            debug!(actuator = %slot, "Stepper and encoder paired");
            Ok(actuator)
        }
        ActuatorType::Unsupported => Err(ControllerError::UNKNOWN_ACTUATOR_TYPE),
    }
}

fn check_capabilities(actuator: &Actuator, expected: Capabilities) -> Result<(), ControllerError> {
    let actual = actuator.capabilities();
    if actual == expected {
        return Ok(());
    }
    if expected.contains(Capabilities::SERVO) {
        let mut kinds = ControllerError::MISCONFIG_SERVO;
        if actual.contains(Capabilities::STEPPER) {
            kinds |= ControllerError::MISCONFIG_SERVO_WITH_STEPPER;
        }
        if actual.contains(Capabilities::ENCODER) {
            kinds |= ControllerError::MISCONFIG_SERVO_WITH_ENCODER;
        }
        Err(kinds)
    } else if actual.contains(Capabilities::SERVO) {
        Err(ControllerError::MISCONFIG_STEPPER_WITH_SERVO)
    } else if !actual.contains(Capabilities::STEPPER) {
        Err(ControllerError::MISCONFIG_NO_STEPPER)
    } else {
        Err(ControllerError::MISCONFIG_NO_ENCODER)
    }
}
