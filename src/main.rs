//! NIDS agent entrypoint: capture packets (live or replayed), seal them into
//! fixed-size batches, and score each batch on a worker pool. Anomalous
//! batches are kept as pcap evidence and reported through the configured
//! notifiers.

use nids_agent::{
    alert::{AlertSink, FanoutNotifier, LogNotifier, NdjsonNotifier, WebhookNotifier},
    batch::{Batch, BatchAccumulator, SubmitOutcome, WorkerPool},
    capture::{CaptureError, CaptureSource, PcapFileSource, RawPacket},
    config::{AlertConfig, CaptureConfig, NidsConfig},
    features::FeatureAggregator,
    flows::ExternalFlowExtractor,
    logging::StructuredLogger,
    model::AnomalyScorer,
    pipeline::BatchPipeline,
    storage::AlertJournal,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[cfg(feature = "live-capture")]
fn open_live(interface: &str, config: &CaptureConfig) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Ok(Box::new(nids_agent::capture::LiveSource::open(interface, config)?))
}

#[cfg(not(feature = "live-capture"))]
fn open_live(interface: &str, _config: &CaptureConfig) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Err(CaptureError::Live(format!(
        "cannot capture on {}: built without the live-capture feature",
        interface
    )))
}

/// Replay file wins over interface when both are set
fn open_source(config: &CaptureConfig) -> Result<Box<dyn CaptureSource>, CaptureError> {
    if let Some(path) = &config.replay_file {
        return Ok(Box::new(PcapFileSource::open(path)?));
    }
    if let Some(interface) = &config.interface {
        return open_live(interface, config);
    }
    Err(CaptureError::Unconfigured)
}

fn build_notifier(config: &AlertConfig) -> Result<FanoutNotifier, BoxError> {
    let mut fanout = FanoutNotifier::new().with(Arc::new(LogNotifier));
    if let Some(path) = &config.ndjson_path {
        fanout = fanout.with(Arc::new(NdjsonNotifier::open(path)?));
    }
    if let Some(url) = &config.webhook_url {
        match WebhookNotifier::new(url, config.webhook_timeout_secs) {
            Some(webhook) => fanout = fanout.with(Arc::new(webhook)),
            None => warn!(url = %url, "could not build webhook client; webhook alerts disabled"),
        }
    }
    Ok(fanout)
}

fn open_journal(config: &AlertConfig) -> Result<Option<AlertJournal>, BoxError> {
    let Some(path) = &config.journal_path else {
        return Ok(None);
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let journal = AlertJournal::open(path)?;
    match journal.prune_retention(config.retention_days)? {
        Some(pruned) if pruned > 0 => {
            info!(pruned, retention_days = config.retention_days, "pruned old alerts from journal")
        }
        None if config.retention_days > 0 => warn!(
            retention_days = config.retention_days,
            "retention window out of range; journal not pruned"
        ),
        _ => {}
    }
    Ok(Some(journal))
}

fn submit(pool: &WorkerPool, batch: Batch) {
    let index = batch.index();
    match pool.submit(batch) {
        SubmitOutcome::Queued => debug!(batch_index = index, "batch queued"),
        SubmitOutcome::DroppedOldest(dropped) => {
            debug!(batch_index = index, dropped_batch = dropped, "batch queued after eviction")
        }
        SubmitOutcome::Rejected => warn!(batch_index = index, "pool closed; batch discarded"),
    }
}

fn log_status(accumulator: &BatchAccumulator, pool: &WorkerPool) {
    let status = accumulator.status();
    let stats = pool.stats();
    info!(
        packets = status.packet_count,
        buffered = status.buffered,
        batch_size = status.batch_size,
        last_batch = ?status.last_batch_index,
        queued = pool.pending(),
        completed = stats.completed.load(Ordering::Relaxed),
        dropped = stats.dropped.load(Ordering::Relaxed),
        "capture status"
    );
}

fn main() -> Result<(), BoxError> {
    let config_path = std::env::var("NIDS_CONFIG_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let config = NidsConfig::load(&config_path)?;

    if let Err(e) = StructuredLogger::init(&config.log) {
        eprintln!("{}", e);
    }
    info!(config = %config_path.display(), work_dir = %config.work_dir.display(), "NIDS agent starting");

    std::fs::create_dir_all(&config.work_dir)?;

    let scorer = AnomalyScorer::load(&config.model)?;
    let schema = config.features.schema.clone();
    scorer.check_schema(&schema)?;
    info!(
        features = schema.len(),
        threshold = scorer.threshold(),
        "anomaly model loaded"
    );

    let mut source = open_source(&config.capture)?;
    let linktype = source.linktype();

    let mut sink = AlertSink::new(
        AlertSink::session_dir(&config.alerts.alert_dir),
        linktype,
        config.model.high_severity_ratio,
        config.alerts.history_capacity,
        Arc::new(build_notifier(&config.alerts)?),
    )?;
    if let Some(journal) = open_journal(&config.alerts)? {
        sink = sink.with_journal(journal);
    }
    let alerts = Arc::new(sink);
    info!(evidence_dir = %alerts.artifact_dir().display(), "alert sink ready");

    let pipeline = Arc::new(BatchPipeline::new(
        config.work_dir.clone(),
        linktype,
        ExternalFlowExtractor::new(&config.extractor),
        FeatureAggregator::new(schema),
        scorer,
        Arc::clone(&alerts),
    ));
    let pool = WorkerPool::new(
        config.pool.workers,
        config.pool.queue_capacity,
        config.pool.overload,
        pipeline,
    )?;
    let accumulator = BatchAccumulator::new(config.batch.batch_size);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            warn!(error = %e, "could not install Ctrl+C handler");
        }
    }

    info!(
        batch_size = accumulator.batch_size(),
        workers = config.pool.workers,
        "capturing (Ctrl+C to stop)"
    );
    let status_every = Duration::from_secs(config.status_interval_secs);
    let mut last_status = Instant::now();
    let mut on_packet = |packet: RawPacket| {
        if let Some(batch) = accumulator.offer(packet) {
            submit(&pool, batch);
        }
        if !status_every.is_zero() && last_status.elapsed() >= status_every {
            log_status(&accumulator, &pool);
            last_status = Instant::now();
        }
    };
    let captured = source.run(&stop, &mut on_packet);

    if config.batch.flush_partial_on_shutdown {
        if let Some(batch) = accumulator.drain() {
            info!(batch_index = batch.index(), packets = batch.len(), "flushing partial batch");
            submit(&pool, batch);
        }
    }
    log_status(&accumulator, &pool);
    pool.shutdown();

    let stats = captured?;
    info!(
        packets = stats.packets,
        bytes = stats.bytes,
        alerts = alerts.len(),
        "NIDS agent stopped"
    );
    Ok(())
}
