//! Per-batch processing: capture file → flow extraction → aggregation →
//! scoring → alert. Every stage failure is logged and ends the batch; the
//! batch workspace (capture file and flow table) is removed on every path.

use crate::alert::{AlertError, AlertRecord, AlertSink};
use crate::batch::{Batch, BatchHandler};
use crate::capture::{write_pcap, CaptureError};
use crate::features::{AggregationError, FeatureAggregator};
use crate::flows::{ExternalFlowExtractor, ExtractionError, FlowTable, FlowTableError};
use crate::model::{AnomalyScorer, ScoringError, Verdict};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Progress of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Captured,
    Extracted,
    Aggregated,
    Scored,
    Alerted,
    Clean,
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("batch workspace: {0}")]
    Workspace(#[source] std::io::Error),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    FlowTable(#[from] FlowTableError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Alert(#[from] AlertError),
}

impl StageError {
    pub fn stage(&self) -> &'static str {
        match self {
            StageError::Workspace(_) | StageError::Capture(_) => "capture",
            StageError::Extraction(_) => "extract",
            StageError::FlowTable(_) => "load",
            StageError::Aggregation(_) => "aggregate",
            StageError::Scoring(_) => "score",
            StageError::Alert(_) => "alert",
        }
    }
}

#[derive(Debug)]
pub enum BatchOutcome {
    Clean(Verdict),
    Alerted(AlertRecord),
    Failed {
        stage: &'static str,
        error: StageError,
    },
}

impl BatchOutcome {
    pub fn is_alert(&self) -> bool {
        matches!(self, BatchOutcome::Alerted(_))
    }
}

/// Scratch directory for one batch, removed when dropped
struct BatchWorkspace {
    root: PathBuf,
    index: u64,
}

impl BatchWorkspace {
    fn create(root: PathBuf, index: u64) -> std::io::Result<Self> {
        if root.exists() {
            // Leftover from an earlier run that reused this index
            std::fs::remove_dir_all(&root)?;
        }
        std::fs::create_dir_all(root.join("flows"))?;
        Ok(Self { root, index })
    }

    fn capture_path(&self) -> PathBuf {
        self.root.join(format!("capture_{}.pcap", self.index))
    }

    fn flows_dir(&self) -> PathBuf {
        self.root.join("flows")
    }
}

impl Drop for BatchWorkspace {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(batch_index = self.index, "batch workspace removed"),
            Err(e) => warn!(
                batch_index = self.index,
                path = %self.root.display(),
                error = %e,
                "failed to remove batch workspace"
            ),
        }
    }
}

pub struct BatchPipeline {
    work_dir: PathBuf,
    linktype: u32,
    extractor: ExternalFlowExtractor,
    aggregator: FeatureAggregator,
    scorer: AnomalyScorer,
    alerts: Arc<AlertSink>,
}

impl BatchPipeline {
    pub fn new(
        work_dir: PathBuf,
        linktype: u32,
        extractor: ExternalFlowExtractor,
        aggregator: FeatureAggregator,
        scorer: AnomalyScorer,
        alerts: Arc<AlertSink>,
    ) -> Self {
        Self {
            work_dir,
            linktype,
            extractor,
            aggregator,
            scorer,
            alerts,
        }
    }

    pub fn alerts(&self) -> &Arc<AlertSink> {
        &self.alerts
    }

    /// Where batch `index` keeps its intermediates while it runs
    pub fn workspace_path(&self, index: u64) -> PathBuf {
        self.work_dir.join(format!("batch_{}", index))
    }

    /// Run one batch to completion. Never fails: stage errors come back as
    /// [`BatchOutcome::Failed`] after cleanup.
    pub fn run(&self, batch: Batch) -> BatchOutcome {
        let index = batch.index();
        let started = Instant::now();
        let outcome = match self.process(&batch) {
            Ok(outcome) => outcome,
            Err(error) => {
                let stage = error.stage();
                warn!(batch_index = index, stage, error = %error, "batch processing failed");
                BatchOutcome::Failed { stage, error }
            }
        };
        debug!(
            batch_index = index,
            state = ?BatchState::Done,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch done"
        );
        outcome
    }

    fn process(&self, batch: &Batch) -> Result<BatchOutcome, StageError> {
        let index = batch.index();
        let workspace =
            BatchWorkspace::create(self.workspace_path(index), index).map_err(StageError::Workspace)?;

        let capture = workspace.capture_path();
        write_pcap(&capture, batch.packets(), self.linktype)?;
        transition(index, BatchState::Captured, &capture);

        let table_path = self.extractor.extract(&capture, &workspace.flows_dir())?;
        transition(index, BatchState::Extracted, &table_path);

        let table = FlowTable::from_path(&table_path)?;
        let vector = self.aggregator.aggregate(&table)?;
        debug!(batch_index = index, state = ?BatchState::Aggregated, flows = table.len(), "features aggregated");

        let verdict = self.scorer.score(index, &vector)?;
        info!(
            batch_index = index,
            state = ?BatchState::Scored,
            flows = table.len(),
            error = verdict.reconstruction_error,
            anomalous = verdict.is_anomalous,
            "batch scored"
        );

        if verdict.is_anomalous {
            let record = self.alerts.emit(batch, &verdict)?;
            debug!(batch_index = index, state = ?BatchState::Alerted, "alert raised");
            Ok(BatchOutcome::Alerted(record))
        } else {
            debug!(batch_index = index, state = ?BatchState::Clean, "batch clean");
            Ok(BatchOutcome::Clean(verdict))
        }
    }
}

fn transition(index: u64, state: BatchState, path: &Path) {
    debug!(batch_index = index, state = ?state, path = %path.display(), "batch stage complete");
}

impl BatchHandler for BatchPipeline {
    fn handle(&self, batch: Batch) {
        self.run(batch);
    }
}
