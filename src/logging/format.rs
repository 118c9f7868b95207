//! JSON log lines: one JSON object per line (ndjson) for ingestion and audit.

use crate::config::LogConfig;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
#[error("failed to install log subscriber: {0}")]
pub struct LogInitError(String);

pub struct StructuredLogger;

impl StructuredLogger {
    /// Install the global subscriber on stderr. `RUST_LOG` overrides the
    /// configured level.
    pub fn init(config: &LogConfig) -> Result<(), LogInitError> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
        let registry = tracing_subscriber::registry().with(filter);
        let result = if config.json {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_span_events(FmtSpan::NONE)
                        .with_current_span(false)
                        .with_thread_names(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_thread_names(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()
        };
        result.map_err(|e| LogInitError(e.to_string()))
    }

    /// Write `event` as a single JSON line, bypassing tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) -> std::io::Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(w, "{}", line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emit_json_writes_one_line() {
        let mut buf = Vec::new();
        StructuredLogger::emit_json(&json!({"batch_index": 3, "severity": "high"}), &mut buf).unwrap();
        StructuredLogger::emit_json(&json!({"batch_index": 4}), &mut buf).unwrap();

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"batch_index":3,"severity":"high"}"#);
    }

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let config = LogConfig {
            level: "warn".into(),
            json: false,
        };
        let first = StructuredLogger::init(&config);
        let second = StructuredLogger::init(&config);
        // Another test may have installed a subscriber first
        assert!(first.is_err() || second.is_err());
    }
}
