//! Process-level wiring: telemetry bootstrap and binary error reporting.

pub mod error;
pub mod telemetry;
