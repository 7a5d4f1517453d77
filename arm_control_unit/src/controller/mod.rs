//! Actuator controller: setup, power sequencing, selection and the
//! cooperative scheduling cycle.
//!
//! ## Scheduling
//!
//! There is no timer interrupt behind stepper pulses. The step-emission
//! pass runs at the start of every [`Controller::cycle`], between every
//! unit of slower work inside it, from every [`Controller::wait_ms`] loop
//! iteration and from inside every bus transaction via the yield hook.
//!
//! ## Cycle Body
//! 1. Step pass.
//! 2. Knob sample, when adjusting by knob and the knob interval elapsed.
//! 3. At most one servo exchange of the pending servo round.
//! 4. Encoder resync of every stepper whose measurement is due.
//! 5. Optional angle dump.
//!
//! ## Error Accumulator
//! Every error kind lands in one [`ControllerError`] that only
//! [`Controller::reset_error`] clears.

mod hardware;
mod setup;

use arm_common::config::{ArmConfig, StepOrdering};
use arm_common::consts::{
    DISABLE_PACING_MS, ENABLE_SETTLE_MS, KNOB_LOG_THRESHOLD_DEG, MAX_SERVOS, MAX_STEPPERS,
    SERVO_POWER_SETTLE_MS,
};
use arm_common::error::ControllerError;
use arm_common::hal::{Board, Clock, OutputLine, Peripherals};
use arm_common::id::ActuatorId;
use heapless::Vec;
use tracing::{debug, error, info, warn};

use crate::actuator::Actuator;
use crate::io::DriveIo;
use crate::knob::{KnobCommand, KnobState};
use crate::registry::Registry;
use crate::timing::IntervalTimer;

use hardware::{Hardware, StepPass};

/// What the knob currently drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdjustMode {
    /// Knob ignored; angles come from callers only.
    #[default]
    Manually,
    /// Knob jogs the selected actuator.
    ByKnob,
}

// ─── Cycle Statistics ───────────────────────────────────────────────

/// Counters updated by the cycle. No allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Cycles executed.
    pub cycles: u64,
    /// Stepper pulses emitted by all step passes.
    pub pulses: u64,
    /// Per-tick encoder reads attempted.
    pub encoder_reads: u64,
    /// Per-tick encoder reads rejected or failed.
    pub encoder_rejects: u64,
    /// Servo exchanges completed.
    pub servo_updates: u64,
    /// Servo exchanges that failed.
    pub servo_failures: u64,
}

// ─── Controller ─────────────────────────────────────────────────────

/// Owner of the actuator registry and all hardware.
pub struct Controller {
    config: ArmConfig,
    peripherals: Peripherals,
    registry: Registry,
    errors: ControllerError,

    /// Setup has run; the step pass is live.
    stepping: bool,
    /// Setup ran without recording any error.
    setup_ok: bool,
    enabled: bool,
    powered: bool,
    servo_powered: bool,

    selected: Option<ActuatorId>,
    adjust_mode: AdjustMode,
    knob: KnobState,
    knob_timer: IntervalTimer,
    servo_timer: IntervalTimer,
    /// Servos still to be serviced in the current round, last first.
    pending_servos: Vec<ActuatorId, MAX_SERVOS>,

    stats: CycleStats,
}

impl Controller {
    /// Controller over `peripherals`. Nothing touches hardware until
    /// [`Controller::setup`].
    pub fn new(config: ArmConfig, peripherals: Peripherals) -> Self {
        let ordering = config.timing.step_ordering;
        Self {
            config,
            peripherals,
            registry: Registry::new(ordering),
            errors: ControllerError::empty(),
            stepping: false,
            setup_ok: false,
            enabled: false,
            powered: false,
            servo_powered: false,
            selected: None,
            adjust_mode: AdjustMode::default(),
            knob: KnobState::new(),
            knob_timer: IntervalTimer::new(),
            servo_timer: IntervalTimer::new(),
            pending_servos: Vec::new(),
            stats: CycleStats::default(),
        }
    }

    // ─── Queries ────────────────────────────────────────────────────

    #[inline]
    pub fn config(&self) -> &ArmConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn actuator(&self, id: ActuatorId) -> Option<&Actuator> {
        self.registry.get(id)
    }

    /// The actuator selected for manual interaction.
    pub fn current_actuator(&self) -> Option<&Actuator> {
        self.selected.and_then(|id| self.registry.get(id))
    }

    #[inline]
    pub fn selected_id(&self) -> Option<ActuatorId> {
        self.selected
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.errors.is_set()
    }

    #[inline]
    pub fn errors(&self) -> ControllerError {
        self.errors
    }

    pub fn reset_error(&mut self) {
        self.errors = ControllerError::empty();
    }

    /// Setup ran and recorded no error.
    #[inline]
    pub fn is_setup(&self) -> bool {
        self.setup_ok
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Both rails switched on by [`Controller::power_actuators`].
    #[inline]
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    #[inline]
    pub fn is_servo_powered(&self) -> bool {
        self.servo_powered
    }

    #[inline]
    pub fn adjust_mode(&self) -> AdjustMode {
        self.adjust_mode
    }

    #[inline]
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.peripherals.clock.now_ms()
    }

    // ─── Step emission ──────────────────────────────────────────────

    /// Run the step-emission pass once. Returns pulses emitted.
    ///
    /// Does nothing before setup has run.
    pub fn step_pass(&mut self) -> u32 {
        if !self.stepping {
            return 0;
        }
        let now_us = self.peripherals.clock.now_us();
        let emitted = self
            .registry
            .step_pass(now_us, &mut *self.peripherals.steps);
        self.stats.pulses += u64::from(emitted);
        emitted
    }

    /// Wait `ms` while keeping the step pass running.
    pub fn wait_ms(&mut self, ms: u32) {
        let deadline = self
            .peripherals
            .clock
            .now_us()
            .saturating_add(u64::from(ms) * 1000);
        loop {
            self.step_pass();
            if self.peripherals.clock.now_us() >= deadline {
                break;
            }
            self.peripherals.clock.relax();
        }
    }

    /// Borrow the hardware with the step pass wired in as yield hook.
    fn hardware(&mut self) -> Hardware<'_> {
        let Peripherals {
            clock,
            steps,
            encoder_buses,
            servo_bus,
            ..
        } = &mut self.peripherals;
        Hardware {
            pass: StepPass {
                registry: &mut self.registry,
                clock: &**clock,
                steps: &mut **steps,
                live: self.stepping,
                pulses: &mut self.stats.pulses,
            },
            encoder_buses,
            servo_bus: &mut **servo_bus,
        }
    }

    /// Lend the actuator at `id` out of the registry for `f`.
    ///
    /// Only servos may yield while lent; a lent stepper misses the step
    /// passes run meanwhile.
    fn with_actuator<R>(
        &mut self,
        id: ActuatorId,
        f: impl FnOnce(&mut Actuator, &mut dyn DriveIo) -> R,
    ) -> Option<R> {
        let mut actuator = self.registry.take(id)?;
        let result = f(&mut actuator, &mut self.hardware());
        self.registry.restore(id, actuator);
        Some(result)
    }

    fn label(&self, id: ActuatorId) -> String {
        self.config
            .actuators
            .get(id.index())
            .map_or_else(|| id.to_string(), |c| c.label())
    }

    // ─── Enable / disable / select ──────────────────────────────────

    /// Enable every actuator, then hold while the supply settles.
    ///
    /// Refused unless setup succeeded.
    pub fn enable(&mut self) {
        if !self.setup_ok {
            warn!("Enable refused: setup has not succeeded");
            return;
        }
        for id in self.registry.ids() {
            if let Some(Err(e)) = self.with_actuator(id, |a, io| a.enable(io)) {
                warn!(actuator = %self.label(id), "Enable failed: {e}");
            }
        }
        self.enabled = true;
        info!("Actuators enabled");
        self.wait_ms(ENABLE_SETTLE_MS);
    }

    /// Disable every actuator, pacing consecutive ones.
    pub fn disable(&mut self) {
        for id in self.registry.ids() {
            if let Some(Err(e)) = self.with_actuator(id, |a, io| a.disable(io)) {
                warn!(actuator = %self.label(id), "Disable failed: {e}");
            }
            self.wait_ms(DISABLE_PACING_MS);
        }
        if self.enabled {
            info!("Actuators disabled");
        }
        self.enabled = false;
    }

    /// Make `id` the actuator for manual interaction.
    ///
    /// The previous selection is disabled. An id without an actuator
    /// leaves nothing selected.
    pub fn select_actuator(&mut self, id: ActuatorId) {
        if let Some(previous) = self.selected.take() {
            if let Some(Err(e)) = self.with_actuator(previous, |a, io| a.disable(io)) {
                warn!(actuator = %self.label(previous), "Disable failed: {e}");
            }
        }

        if !id.in_range() || self.registry.get(id).is_none() {
            warn!(actuator = %id, "No actuator to select");
            return;
        }

        if self.setup_ok {
            if let Some(Err(e)) = self.with_actuator(id, |a, io| a.enable(io)) {
                warn!(actuator = %self.label(id), "Enable failed: {e}");
            }
        } else {
            warn!(actuator = %id, "Selected without enabling: setup has not succeeded");
        }
        self.selected = Some(id);
        self.knob_timer.reset();
        info!(actuator = %self.label(id), "Actuator selected");
    }

    pub fn adjust_by(&mut self, mode: AdjustMode) {
        if mode != self.adjust_mode {
            debug!(?mode, "Adjust mode");
        }
        self.adjust_mode = mode;
    }

    /// Move the selected actuator by `delta` degrees. No-op without selection.
    pub fn change_angle(&mut self, delta: f32, duration_ms: u32) {
        let now_us = self.peripherals.clock.now_us();
        if let Some(actuator) = self.selected.and_then(|id| self.registry.get_mut(id)) {
            actuator.change_angle(delta, duration_ms, now_us);
        }
    }

    /// Command actuator `id` to `angle`. Returns `false` if there is none.
    pub fn set_angle(&mut self, id: ActuatorId, angle: f32, duration_ms: u32) -> bool {
        let now_us = self.peripherals.clock.now_us();
        match self.registry.get_mut(id) {
            Some(actuator) => {
                actuator.set_angle(angle, duration_ms, now_us);
                true
            }
            None => false,
        }
    }

    // ─── Power ──────────────────────────────────────────────────────

    /// Switch both rails: steppers before servos on the way up, servos
    /// before steppers on the way down.
    pub fn power_actuators(&mut self, on: bool) {
        if on {
            self.peripherals.board.set_line(OutputLine::StepperPower, true);
            self.switch_servo_power(true);
        } else {
            self.switch_servo_power(false);
            self.peripherals.board.set_line(OutputLine::StepperPower, false);
        }
        self.powered = on;
        info!(on, "Actuator power");
    }

    /// Switch the servo rail; switching on waits for it to settle.
    pub fn switch_servo_power(&mut self, on: bool) {
        self.peripherals.board.set_line(OutputLine::ServoPower, on);
        self.servo_powered = on;
        if on {
            self.wait_ms(SERVO_POWER_SETTLE_MS);
        }
    }

    // ─── Cycle ──────────────────────────────────────────────────────

    /// One scheduling cycle. `now_ms` drives the rate timers.
    pub fn cycle(&mut self, now_ms: u64) {
        self.stats.cycles += 1;

        self.step_pass();
        self.service_knob(now_ms);
        self.service_servo(now_ms);
        self.resync_steppers(now_ms);

        if self.config.diagnostics.log_angles {
            self.log_angles();
        }
    }

    fn service_knob(&mut self, now_ms: u64) {
        if self.adjust_mode != AdjustMode::ByKnob {
            return;
        }
        let Some(id) = self.selected else {
            return;
        };
        let interval_ms = self.config.timing.knob_sample_ms;
        if !self.knob_timer.is_due(interval_ms, now_ms) {
            return;
        }

        let raw = self.peripherals.board.read_knob();
        let now_us = self.peripherals.clock.now_us();
        let Some(actuator) = self.registry.get_mut(id) else {
            return;
        };
        let Some(command) = self.knob.sample(raw, actuator.is_closed_loop()) else {
            return;
        };

        if command.magnitude(actuator.current_angle()) > KNOB_LOG_THRESHOLD_DEG {
            info!(actuator = %id, raw, ?command, "Knob adjust");
        }
        match command {
            KnobCommand::Absolute(angle) => actuator.set_angle(angle, interval_ms, now_us),
            KnobCommand::Relative(delta) => actuator.change_angle(delta, interval_ms, now_us),
        }
    }

    /// Service at most one servo; arm a new round when the interval elapsed.
    fn service_servo(&mut self, now_ms: u64) {
        if self.pending_servos.is_empty()
            && self.registry.servo_count() > 0
            && self
                .servo_timer
                .is_due(self.config.timing.servo_sample_ms, now_ms)
        {
            for id in self.registry.servo_ids().iter().rev() {
                // Capacity equals the servo limit.
                let _ = self.pending_servos.push(*id);
            }
        }

        let Some(id) = self.pending_servos.pop() else {
            return;
        };
        let now_us = self.peripherals.clock.now_us();
        let outcome = self.with_actuator(id, |actuator, io| match actuator.servo_mut() {
            Some(servo) => servo.update(now_us, io),
            None => Ok(()),
        });
        match outcome {
            Some(Ok(())) => self.stats.servo_updates += 1,
            Some(Err(e)) => {
                self.stats.servo_failures += 1;
                debug!(actuator = %id, "Servo update failed: {e}");
            }
            None => {}
        }
        self.step_pass();
    }

    /// Resynchronize due steppers from their encoders.
    fn resync_steppers(&mut self, now_ms: u64) {
        let order: Vec<ActuatorId, MAX_STEPPERS> =
            self.registry.step_order().iter().copied().collect();

        for id in order {
            self.step_pass();

            let location = {
                let Some(actuator) = self.registry.get(id) else {
                    continue;
                };
                let (Some(stepper), Some(encoder)) = (actuator.stepper(), actuator.encoder())
                else {
                    continue;
                };
                if !stepper.is_due(now_ms) {
                    continue;
                }
                if stepper.id() != id || encoder.id() != id {
                    self.errors.insert(ControllerError::WRONG_STEPPER);
                    error!(
                        slot = %id,
                        stepper = %stepper.id(),
                        encoder = %encoder.id(),
                        "Stepper does not belong to its slot"
                    );
                    continue;
                }
                encoder.is_ok().then(|| encoder.location())
            };

            let reading = location.map(|(bus, address)| self.hardware().read_encoder(bus, address));

            if let Some(Actuator::StepperEncoder(stepper, encoder)) = self.registry.get_mut(id) {
                let angle = match reading {
                    Some(reading) => {
                        self.stats.encoder_reads += 1;
                        if encoder.accept_reading(reading, stepper.current_angle()) {
                            encoder.angle()
                        } else {
                            self.stats.encoder_rejects += 1;
                            stepper.current_angle()
                        }
                    }
                    None => stepper.current_angle(),
                };
                stepper.set_measured_angle(angle, now_ms);
            }

            self.step_pass();
        }
    }

    // ─── Diagnostics ────────────────────────────────────────────────

    /// One line per configured actuator and backend.
    pub fn log_configuration(&self) {
        info!(
            service = %self.config.shared.service_name,
            actuators = self.registry.len(),
            servos = self.registry.servo_count(),
            steppers = self.registry.stepper_count(),
            encoders = self.registry.encoder_count(),
            "Actuator configuration"
        );
        for (id, actuator) in self.registry.iter() {
            let label = self.label(id);
            match actuator {
                Actuator::Servo(servo) => {
                    info!(actuator = %label, servo_id = servo.servo_id(), "  servo");
                }
                Actuator::StepperEncoder(stepper, encoder) => {
                    let (bus, address) = encoder.location();
                    info!(
                        actuator = %label,
                        pins = ?stepper.pins(),
                        degrees_per_step = stepper.degrees_per_step(),
                        "  stepper"
                    );
                    info!(
                        actuator = %label,
                        ?bus,
                        address = format_args!("0x{address:02x}"),
                        ok = encoder.is_ok(),
                        "  encoder"
                    );
                }
            }
        }
    }

    /// Angle snapshot of every actuator at DEBUG level.
    pub fn log_angles(&self) {
        for (id, actuator) in self.registry.iter() {
            match actuator {
                Actuator::Servo(servo) => debug!(
                    actuator = %id,
                    angle = servo.current_angle(),
                    raw = servo.raw_angle(),
                    target = servo.target_angle(),
                    "servo"
                ),
                Actuator::StepperEncoder(stepper, encoder) => debug!(
                    actuator = %id,
                    angle = stepper.current_angle(),
                    target = stepper.target_angle(),
                    encoder = encoder.angle(),
                    raw = encoder.raw_angle(),
                    ok = encoder.is_ok(),
                    "stepper"
                ),
            }
        }
    }

    /// Step ordering policy in effect.
    #[inline]
    pub fn step_ordering(&self) -> StepOrdering {
        self.registry.ordering()
    }
}
