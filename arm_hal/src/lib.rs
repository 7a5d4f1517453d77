//! Arm HAL - hardware implementations of the controller's seam traits.
//!
//! Only a software simulation is provided. It models the clock, board
//! lines, knob ADC, watchdog, stepper drivers, the two encoder buses and
//! the smart-servo bus closely enough to exercise the controller without
//! hardware. Every simulated component is a cheap cloneable handle, so
//! a test keeps one clone for inspection while the controller owns the
//! boxed one.

pub mod simulation;

pub use simulation::{SimRig, create_peripherals};
