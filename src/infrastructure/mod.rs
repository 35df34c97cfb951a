//! Infrastructure layer module
//!
//! Ambient concerns shared by the library and the CLI:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;
