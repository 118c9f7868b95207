//! Alerts for anomalous batches: evidence pcap, bounded history, notification.

mod notify;

pub use notify::{FanoutNotifier, LogNotifier, NdjsonNotifier, Notifier, WebhookNotifier};

use crate::batch::Batch;
use crate::capture::{write_pcap_to, CaptureError};
use crate::model::Verdict;
use crate::storage::AlertJournal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}

impl Severity {
    /// High once the error reaches `high_ratio` times the threshold
    pub fn from_verdict(verdict: &Verdict, high_ratio: f64) -> Self {
        if verdict.reconstruction_error >= verdict.threshold * high_ratio {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub batch_index: u64,
    /// Retained pcap of the whole batch
    pub artifact_path: PathBuf,
    pub artifact_sha256: String,
    pub severity: Severity,
    pub message: String,
    pub reconstruction_error: f64,
    pub packets: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("failed to write alert evidence: {0}")]
    Evidence(#[from] CaptureError),
    #[error("alert io: {0}")]
    Io(#[from] std::io::Error),
}

struct SinkState {
    /// Records still in `history`, by batch index
    emitted: HashMap<u64, AlertRecord>,
    /// Indices whose evidence is being written
    in_flight: HashSet<u64>,
    history: VecDeque<AlertRecord>,
}

/// Passes bytes through to `inner` while hashing exactly what was accepted
struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

pub struct AlertSink {
    artifact_dir: PathBuf,
    linktype: u32,
    high_severity_ratio: f64,
    history_capacity: usize,
    state: Mutex<SinkState>,
    settled: Condvar,
    notifier: Arc<dyn Notifier>,
    journal: Option<AlertJournal>,
}

impl AlertSink {
    /// Evidence goes to `artifact_dir`, which is created if needed.
    pub fn new(
        artifact_dir: PathBuf,
        linktype: u32,
        high_severity_ratio: f64,
        history_capacity: usize,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AlertError> {
        std::fs::create_dir_all(&artifact_dir)?;
        Ok(Self {
            artifact_dir,
            linktype,
            high_severity_ratio,
            history_capacity: history_capacity.max(1),
            state: Mutex::new(SinkState {
                emitted: HashMap::new(),
                in_flight: HashSet::new(),
                history: VecDeque::new(),
            }),
            settled: Condvar::new(),
            notifier,
            journal: None,
        })
    }

    /// Per-run evidence directory under `alert_dir`, so batch indices restarting
    /// at 0 never overwrite an earlier run's evidence.
    pub fn session_dir(alert_dir: &Path) -> PathBuf {
        alert_dir.join(format!("session_{}", Utc::now().format("%Y%m%dT%H%M%SZ")))
    }

    pub fn with_journal(mut self, journal: AlertJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Persist evidence and raise an alert for `batch`. Emitting again for a
    /// batch index still in history returns the original record and has no
    /// side effects. Evidence is written outside the lock; a concurrent emit
    /// for the same index waits for the first one to settle.
    pub fn emit(&self, batch: &Batch, verdict: &Verdict) -> Result<AlertRecord, AlertError> {
        let index = batch.index();
        {
            let mut state = self.lock();
            loop {
                if let Some(existing) = state.emitted.get(&index) {
                    debug!(batch_index = index, "alert already emitted for batch");
                    return Ok(existing.clone());
                }
                if !state.in_flight.contains(&index) {
                    break;
                }
                state = self.settled.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
            state.in_flight.insert(index);
        }

        let written = self.write_evidence(batch);
        let mut state = self.lock();
        state.in_flight.remove(&index);
        let (path, digest) = match written {
            Ok(done) => done,
            Err(e) => {
                drop(state);
                self.settled.notify_all();
                return Err(e);
            }
        };

        let severity = Severity::from_verdict(verdict, self.high_severity_ratio);
        let record = AlertRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            batch_index: index,
            artifact_path: path,
            artifact_sha256: digest,
            severity,
            message: format!(
                "anomalous traffic in batch {}: reconstruction error {:.5} exceeds threshold {}",
                index, verdict.reconstruction_error, verdict.threshold
            ),
            reconstruction_error: verdict.reconstruction_error,
            packets: batch.len(),
        };

        state.emitted.insert(index, record.clone());
        state.history.push_back(record.clone());
        while state.history.len() > self.history_capacity {
            if let Some(evicted) = state.history.pop_front() {
                state.emitted.remove(&evicted.batch_index);
            }
        }
        drop(state);
        self.settled.notify_all();

        info!(
            batch_index = index,
            severity = severity.as_str(),
            error = verdict.reconstruction_error,
            artifact = %record.artifact_path.display(),
            "intrusion alert"
        );
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.insert_alert(&record) {
                warn!(batch_index = index, error = %e, "failed to journal alert");
            }
        }
        self.notifier.publish(&record);
        Ok(record)
    }

    /// Write `alert_<index>.pcap`, hashing the bytes on the way to disk
    fn write_evidence(&self, batch: &Batch) -> Result<(PathBuf, String), AlertError> {
        let path = self.artifact_dir.join(format!("alert_{}.pcap", batch.index()));
        let sink = DigestWriter {
            inner: BufWriter::new(File::create(&path)?),
            hasher: Sha256::new(),
        };
        let mut sink = write_pcap_to(sink, batch.packets(), self.linktype)?;
        sink.flush()?;
        Ok((path, format!("{:x}", sink.hasher.finalize())))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The `k` most recently emitted alerts, oldest first
    pub fn recent(&self, k: usize) -> Vec<AlertRecord> {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(k);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Retained history in capture order. Completion order is not capture order
    /// when several workers run, so use this to reconstruct the sequence.
    pub fn by_batch_index(&self) -> Vec<AlertRecord> {
        let state = self.lock();
        let mut out: Vec<AlertRecord> = state.history.iter().cloned().collect();
        out.sort_by_key(|r| r.batch_index);
        out
    }

    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Collects every published record
    #[derive(Default)]
    pub struct Recorder(pub Mutex<Vec<AlertRecord>>);

    impl Notifier for Recorder {
        fn publish(&self, record: &AlertRecord) {
            self.0.lock().unwrap().push(record.clone());
        }
    }
}
