//! NIDS Agent: batch-streaming network intrusion detector.
//!
//! Modular structure:
//! - [`capture`]: Packet sources (pcap replay, live libpcap) and pcap writing
//! - [`batch`]: Packet accumulator and bounded worker pool
//! - [`flows`]: External flow extractor adapter and flow tables
//! - [`features`]: Flow schema and statistical feature aggregation
//! - [`model`]: Scaler + ONNX autoencoder anomaly scoring
//! - [`pipeline`]: Per-batch processing state machine
//! - [`alert`]: Alert evidence, history and notification
//! - [`storage`]: SQLite alert journal
//! - [`logging`]: Structured JSON logging

pub mod config;
pub mod capture;
pub mod batch;
pub mod flows;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod alert;
pub mod storage;
pub mod logging;

pub use config::NidsConfig;
pub use capture::{CaptureSource, RawPacket};
pub use batch::{Batch, BatchAccumulator, BatchHandler, StatusSnapshot, WorkerPool};
pub use flows::{ExternalFlowExtractor, FlowTable};
pub use features::{FeatureAggregator, FeatureVector, FlowSchema};
pub use model::{AnomalyScorer, Verdict};
pub use pipeline::{BatchOutcome, BatchPipeline};
pub use alert::{AlertRecord, AlertSink, Severity};
pub use storage::AlertJournal;
pub use logging::StructuredLogger;
