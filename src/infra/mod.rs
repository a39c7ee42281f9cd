//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod katex;
pub mod telemetry;
