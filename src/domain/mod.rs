//! Domain layer for loopwarden
//!
//! Pure types shared by every layer: steps, decisions, configuration,
//! failure signatures, and the capability ports external providers implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{GuardError, GuardResult};
