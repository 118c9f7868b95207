//! Alert delivery. Publishing is fire-and-forget: failures are logged and
//! never reach the pipeline.

use super::AlertRecord;
use crate::logging::StructuredLogger;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

pub trait Notifier: Send + Sync {
    fn publish(&self, record: &AlertRecord);
}

/// Emits a warn-level log line per alert
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, record: &AlertRecord) {
        warn!(
            batch_index = record.batch_index,
            severity = record.severity.as_str(),
            artifact = %record.artifact_path.display(),
            "{}",
            record.message
        );
    }
}

/// Appends one JSON object per alert to a file (tailed by dashboards)
pub struct NdjsonNotifier {
    file: Mutex<File>,
}

impl NdjsonNotifier {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Notifier for NdjsonNotifier {
    fn publish(&self, record: &AlertRecord) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let written = StructuredLogger::emit_json(record, &mut *file).and_then(|_| file.flush());
        if let Err(e) = written {
            warn!(batch_index = record.batch_index, error = %e, "failed to append alert feed");
        }
    }
}

/// POSTs each alert as JSON to an HTTP endpoint
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout_secs: u64) -> Option<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .ok()?;
        Some(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    fn post(&self, record: &AlertRecord) -> Result<(), String> {
        let res = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().unwrap_or_default();
            return Err(format!("{} {}", status, text));
        }
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn publish(&self, record: &AlertRecord) {
        match self.post(record) {
            Ok(()) => debug!(batch_index = record.batch_index, url = %self.url, "alert delivered"),
            Err(e) => warn!(batch_index = record.batch_index, url = %self.url, error = %e, "alert webhook failed"),
        }
    }
}

/// Publishes to every inner notifier in order
#[derive(Default)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: Arc<dyn Notifier>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Notifier for FanoutNotifier {
    fn publish(&self, record: &AlertRecord) {
        for t in &self.targets {
            t.publish(record);
        }
    }
}
