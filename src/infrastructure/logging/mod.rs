//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output (stderr, so replay output stays clean)
//! - Optional rotated JSON log files via tracing-appender

pub mod logger;

pub use logger::{LogFormat, LoggerImpl, RotationPolicy};
