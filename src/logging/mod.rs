//! Structured logging: tracing subscriber setup and raw JSON line output.

mod format;

pub use format::{LogInitError, StructuredLogger};
