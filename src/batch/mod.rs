//! Packet batching: a lock-guarded accumulator seals fixed-size batches, and a
//! bounded worker pool runs them through a [`BatchHandler`] off the capture thread.

mod accumulator;
mod pool;

use crate::capture::RawPacket;

pub use accumulator::{BatchAccumulator, StatusSnapshot};
pub use pool::{OverloadPolicy, PoolStats, SubmitOutcome, WorkerPool};

/// A sealed, immutable group of packets with its capture-order index.
#[derive(Debug)]
pub struct Batch {
    index: u64,
    packets: Vec<RawPacket>,
}

impl Batch {
    pub(crate) fn seal(index: u64, packets: Vec<RawPacket>) -> Self {
        Self { index, packets }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn packets(&self) -> &[RawPacket] {
        &self.packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

/// Consumes sealed batches on a worker thread. Implementations must not panic
/// on bad input; the pool survives panics but counts them.
pub trait BatchHandler: Send + Sync {
    fn handle(&self, batch: Batch);
}

impl<F> BatchHandler for F
where
    F: Fn(Batch) + Send + Sync,
{
    fn handle(&self, batch: Batch) {
        self(batch)
    }
}
