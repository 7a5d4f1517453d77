//! # Arm Control Unit Library
//!
//! Cooperative real-time control core for a multi-joint arm driven by a
//! mix of stepper motors with absolute encoders and smart servos.
//!
//! ## Layers
//!
//! 1. **Controller** - setup, power sequencing, selection, scheduling cycle
//! 2. **Registry** - fixed arena of actuator slots plus the step-emission pass
//! 3. **Actuator** - a servo, or a stepper paired with its encoder
//! 4. **Backends** - [`stepper`], [`encoder`], [`servo`] over the [`io`] seam
//! 5. **Motion** - time-scaled move profiles and angle limits
//!
//! ## Single Thread
//!
//! Nothing here spawns a thread or takes a lock. Stepper pulses are
//! emitted by a pass the controller runs between every unit of slower
//! work and from inside every bus wait, so a slow encoder or servo
//! exchange never starves the steppers. All state is pre-allocated at
//! setup; the cycle does not allocate.

pub mod actuator;
pub mod controller;
pub mod encoder;
pub mod io;
pub mod knob;
pub mod motion;
pub mod registry;
pub mod servo;
pub mod stepper;
pub mod timing;

pub use actuator::{Actuator, Capabilities};
pub use controller::{AdjustMode, Controller, CycleStats};
