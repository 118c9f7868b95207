//! Fixed-size worker pool fed through a bounded queue.

use super::{Batch, BatchHandler};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

/// What `submit` does when every worker is busy and the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverloadPolicy {
    /// Discard the oldest queued batch; the producer never waits
    DropOldest,
    /// Block the producer until a worker frees a slot
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// Queued after evicting the batch with this index
    DroppedOldest(u64),
    /// Pool is shutting down; the batch was discarded
    Rejected,
}

#[derive(Debug, Default)]
pub struct PoolStats {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub dropped: AtomicU64,
    pub panicked: AtomicU64,
}

pub struct WorkerPool {
    sender: Option<Sender<Batch>>,
    /// Receiver end kept by the pool itself so `DropOldest` can evict
    backlog: Receiver<Batch>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
    policy: OverloadPolicy,
}

impl WorkerPool {
    pub fn new(
        workers: usize,
        queue_capacity: usize,
        policy: OverloadPolicy,
        handler: Arc<dyn BatchHandler>,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = bounded::<Batch>(queue_capacity.max(1));
        let stats = Arc::new(PoolStats::default());

        let mut handles = Vec::with_capacity(workers.max(1));
        for id in 0..workers.max(1) {
            let rx = receiver.clone();
            let handler = Arc::clone(&handler);
            let stats = Arc::clone(&stats);
            let handle = std::thread::Builder::new()
                .name(format!("batch-worker-{}", id))
                .spawn(move || worker_loop(rx, handler, stats))?;
            handles.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            backlog: receiver,
            workers: handles,
            stats,
            policy,
        })
    }

    /// Hand a sealed batch to the pool. Never blocks under `DropOldest`.
    pub fn submit(&self, batch: Batch) -> SubmitOutcome {
        let Some(sender) = self.sender.as_ref() else {
            return SubmitOutcome::Rejected;
        };
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        match self.policy {
            OverloadPolicy::Block => match sender.send(batch) {
                Ok(()) => SubmitOutcome::Queued,
                Err(_) => SubmitOutcome::Rejected,
            },
            OverloadPolicy::DropOldest => {
                let mut pending = batch;
                let mut evicted = None;
                loop {
                    match sender.try_send(pending) {
                        Ok(()) => {
                            return match evicted {
                                Some(index) => SubmitOutcome::DroppedOldest(index),
                                None => SubmitOutcome::Queued,
                            };
                        }
                        Err(TrySendError::Full(back)) => {
                            pending = back;
                            // A worker may have taken the slot meanwhile; then just retry
                            if let Ok(oldest) = self.backlog.try_recv() {
                                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                                warn!(
                                    batch_index = oldest.index(),
                                    packets = oldest.len(),
                                    "worker pool saturated; dropped oldest pending batch"
                                );
                                evicted = Some(oldest.index());
                            }
                        }
                        Err(TrySendError::Disconnected(_)) => return SubmitOutcome::Rejected,
                    }
                }
            }
        }
    }

    /// Batches waiting for a worker
    pub fn pending(&self) -> usize {
        self.backlog.len()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Stop accepting work, let workers finish everything queued, and join them.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.sender = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("batch worker thread exited abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(rx: Receiver<Batch>, handler: Arc<dyn BatchHandler>, stats: Arc<PoolStats>) {
    for batch in rx.iter() {
        let index = batch.index();
        debug!(batch_index = index, "worker picked up batch");
        match catch_unwind(AssertUnwindSafe(|| handler.handle(batch))) {
            Ok(()) => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                stats.panicked.fetch_add(1, Ordering::Relaxed);
                error!(batch_index = index, "batch handler panicked; worker continues");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchAccumulator;
    use crate::capture::RawPacket;
    use std::sync::Mutex;
    use std::time::Duration;

    fn batches(n: usize) -> Vec<Batch> {
        let acc = BatchAccumulator::new(1);
        (0..n)
            .filter_map(|i| acc.offer(RawPacket::new(Duration::from_secs(i as u64), vec![0; 4])))
            .collect()
    }

    #[test]
    fn every_submitted_batch_is_handled() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn BatchHandler> = Arc::new(move |b: Batch| {
            sink.lock().unwrap().push(b.index());
        });
        let pool = WorkerPool::new(4, 8, OverloadPolicy::Block, handler).unwrap();
        for b in batches(50) {
            assert_eq!(pool.submit(b), SubmitOutcome::Queued);
        }
        pool.shutdown();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn drop_oldest_evicts_queued_batch_without_blocking() {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let handled = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&handled);
        let handler: Arc<dyn BatchHandler> = Arc::new(move |b: Batch| {
            // Hold the single worker until the test releases it
            let _ = gate_rx.recv();
            sink.lock().unwrap().push(b.index());
        });
        let pool = WorkerPool::new(1, 2, OverloadPolicy::DropOldest, handler).unwrap();
        let mut it = batches(4).into_iter();

        pool.submit(it.next().unwrap());
        // Wait until the worker has taken batch 0 off the queue
        while pool.pending() > 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pool.submit(it.next().unwrap()), SubmitOutcome::Queued);
        assert_eq!(pool.submit(it.next().unwrap()), SubmitOutcome::Queued);
        assert_eq!(pool.submit(it.next().unwrap()), SubmitOutcome::DroppedOldest(1));
        assert_eq!(pool.stats().dropped.load(Ordering::Relaxed), 1);

        for _ in 0..3 {
            gate_tx.send(()).unwrap();
        }
        pool.shutdown();
        assert_eq!(*handled.lock().unwrap(), vec![0, 2, 3]);
    }

    #[test]
    fn panicking_handler_does_not_kill_worker() {
        let ok = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ok);
        let handler: Arc<dyn BatchHandler> = Arc::new(move |b: Batch| {
            if b.index() == 1 {
                panic!("boom");
            }
            counter.fetch_add(1, Ordering::Relaxed);
        });
        let pool = WorkerPool::new(1, 4, OverloadPolicy::Block, handler).unwrap();
        for b in batches(3) {
            pool.submit(b);
        }
        let stats = Arc::clone(&pool.stats);
        pool.shutdown();

        assert_eq!(ok.load(Ordering::Relaxed), 2);
        assert_eq!(stats.panicked.load(Ordering::Relaxed), 1);
        assert_eq!(stats.completed.load(Ordering::Relaxed), 2);
    }
}
