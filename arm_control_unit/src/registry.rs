//! Fixed arena of actuator slots and the step-emission pass.

use arm_common::config::StepOrdering;
use arm_common::consts::{MAX_ACTUATORS, MAX_ENCODERS, MAX_SERVOS, MAX_STEPPERS};
use arm_common::error::ControllerError;
use arm_common::hal::StepOutput;
use arm_common::id::ActuatorId;
use heapless::Vec;
use static_assertions::const_assert;

use crate::actuator::Actuator;

// Every slot can hold an actuator of some kind.
const_assert!(MAX_SERVOS + MAX_STEPPERS >= MAX_ACTUATORS);

/// Actuator slots addressed by [`ActuatorId`].
///
/// Steppers are additionally listed in `step_order`, the order in which
/// the step-emission pass visits them. Per-kind counts include actuators
/// currently lent out with [`Registry::take`].
#[derive(Debug)]
pub struct Registry {
    slots: [Option<Actuator>; MAX_ACTUATORS],
    step_order: Vec<ActuatorId, MAX_STEPPERS>,
    ordering: StepOrdering,
    servo_count: usize,
    stepper_count: usize,
    encoder_count: usize,
}

impl Registry {
    pub fn new(ordering: StepOrdering) -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            step_order: Vec::new(),
            ordering,
            servo_count: 0,
            stepper_count: 0,
            encoder_count: 0,
        }
    }

    /// Drop every actuator.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.step_order.clear();
        self.servo_count = 0;
        self.stepper_count = 0;
        self.encoder_count = 0;
    }

    /// Place `actuator` into `slot`.
    ///
    /// Fails with `SLOT_OUT_OF_RANGE` for a slot past the arena, or with
    /// the matching `TOO_MANY_*` kinds when its backend kind is already at
    /// capacity; the registry is then unchanged.
    pub fn insert(&mut self, slot: ActuatorId, actuator: Actuator) -> Result<(), ControllerError> {
        if !slot.in_range() {
            return Err(ControllerError::SLOT_OUT_OF_RANGE);
        }

        let mut overflow = ControllerError::empty();
        match &actuator {
            Actuator::Servo(_) => {
                if self.servo_count >= MAX_SERVOS {
                    overflow |= ControllerError::TOO_MANY_SERVOS;
                }
            }
            Actuator::StepperEncoder(..) => {
                if self.stepper_count >= MAX_STEPPERS {
                    overflow |= ControllerError::TOO_MANY_STEPPERS;
                }
                if self.encoder_count >= MAX_ENCODERS {
                    overflow |= ControllerError::TOO_MANY_ENCODERS;
                }
            }
        }
        if !overflow.is_empty() {
            return Err(overflow);
        }

        self.remove(slot);
        if actuator.has_stepper() {
            if self.step_order.push(slot).is_err() {
                return Err(ControllerError::TOO_MANY_STEPPERS);
            }
            self.stepper_count += 1;
            self.encoder_count += 1;
        } else {
            self.servo_count += 1;
        }
        self.slots[slot.index()] = Some(actuator);
        Ok(())
    }

    /// Remove the actuator in `slot` for good.
    pub fn remove(&mut self, slot: ActuatorId) -> Option<Actuator> {
        let actuator = self.slots.get_mut(slot.index())?.take()?;
        if actuator.has_stepper() {
            self.step_order.retain(|id| *id != slot);
            self.stepper_count -= 1;
            self.encoder_count -= 1;
        } else {
            self.servo_count -= 1;
        }
        Some(actuator)
    }

    /// Lend the actuator out; the step pass skips the empty slot until
    /// [`Registry::restore`] puts it back.
    pub fn take(&mut self, slot: ActuatorId) -> Option<Actuator> {
        self.slots.get_mut(slot.index())?.take()
    }

    pub fn restore(&mut self, slot: ActuatorId, actuator: Actuator) {
        if let Some(entry) = self.slots.get_mut(slot.index()) {
            *entry = Some(actuator);
        }
    }

    pub fn get(&self, slot: ActuatorId) -> Option<&Actuator> {
        self.slots.get(slot.index())?.as_ref()
    }

    pub fn get_mut(&mut self, slot: ActuatorId) -> Option<&mut Actuator> {
        self.slots.get_mut(slot.index())?.as_mut()
    }

    /// Present actuators in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ActuatorId, &Actuator)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|a| (ActuatorId::new(i as u8), a)))
    }

    /// Identifiers of present actuators in slot order.
    pub fn ids(&self) -> Vec<ActuatorId, MAX_ACTUATORS> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Identifiers of servo actuators in slot order.
    pub fn servo_ids(&self) -> Vec<ActuatorId, MAX_SERVOS> {
        self.iter()
            .filter(|(_, a)| a.has_servo())
            .map(|(id, _)| id)
            .take(MAX_SERVOS)
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.servo_count + self.stepper_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn servo_count(&self) -> usize {
        self.servo_count
    }

    #[inline]
    pub fn stepper_count(&self) -> usize {
        self.stepper_count
    }

    #[inline]
    pub fn encoder_count(&self) -> usize {
        self.encoder_count
    }

    /// Current visiting order of the step-emission pass.
    #[inline]
    pub fn step_order(&self) -> &[ActuatorId] {
        &self.step_order
    }

    #[inline]
    pub fn ordering(&self) -> StepOrdering {
        self.ordering
    }

    /// Step-emission pass: tick every stepper once, in step order.
    ///
    /// Cheap, and idempotent when no time has passed. Returns the number
    /// of pulses emitted.
    pub fn step_pass(&mut self, now_us: u64, steps: &mut dyn StepOutput) -> u32 {
        let mut emitted = 0;
        for id in self.step_order.iter() {
            if let Some(Some(Actuator::StepperEncoder(stepper, _))) = self.slots.get_mut(id.index()) {
                emitted += stepper.tick(now_us, steps);
            }
        }
        if self.ordering == StepOrdering::SoonestDue {
            self.promote_soonest(now_us);
        }
        emitted
    }

    /// Move the stepper with the nearest pulse to the front of the order.
    fn promote_soonest(&mut self, now_us: u64) {
        let soonest = self
            .step_order
            .iter()
            .enumerate()
            .min_by_key(|(_, id)| {
                self.get(**id)
                    .and_then(Actuator::stepper)
                    .and_then(|s| s.next_pulse_in_us(now_us))
                    .unwrap_or(u64::MAX)
            })
            .map(|(pos, _)| pos);
        if let Some(pos) = soonest.filter(|pos| *pos > 0) {
            self.step_order.swap(0, pos);
        }
    }
}
