//! Actuator identifier.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::MAX_ACTUATORS;

/// Identifier of one actuator slot (0-based, `< MAX_ACTUATORS`).
///
/// Doubles as the index into the controller's actuator arena, which is
/// why it is a newtype rather than a bare `u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActuatorId(pub u8);

impl ActuatorId {
    #[inline]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Arena index of this actuator.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether the identifier addresses a slot within capacity.
    #[inline]
    pub const fn in_range(self) -> bool {
        (self.0 as usize) < MAX_ACTUATORS
    }
}

impl From<u8> for ActuatorId {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}
