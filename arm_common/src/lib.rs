//! Arm Common Library
//!
//! Shared constants, identifiers, configuration loading and hardware-seam
//! traits for the arm actuator controller workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Capacity limits, sample intervals and knob constants
//! - [`id`] - Strongly-typed actuator identifier
//! - [`config`] - TOML configuration structures and loader
//! - [`error`] - Controller error accumulator bitflags
//! - [`hal`] - Traits the control core drives hardware through
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use arm_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod error;
pub mod hal;
pub mod id;
pub mod prelude;
