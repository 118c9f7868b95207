use super::Batch;
use crate::capture::RawPacket;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Read-only view of accumulator progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Packets offered since start
    pub packet_count: u64,
    /// Packets waiting in the unsealed buffer
    pub buffered: usize,
    /// Index of the most recently sealed batch
    pub last_batch_index: Option<u64>,
    pub batch_size: usize,
}

struct State {
    buffer: Vec<RawPacket>,
    next_index: u64,
}

/// Collects packets from the capture thread and seals a [`Batch`] every
/// `batch_size` packets. The lock covers only the append and seal check;
/// downstream processing happens on whoever receives the returned batch.
pub struct BatchAccumulator {
    batch_size: usize,
    state: Mutex<State>,
    packet_count: AtomicU64,
}

impl BatchAccumulator {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            state: Mutex::new(State {
                buffer: Vec::with_capacity(batch_size),
                next_index: 0,
            }),
            packet_count: AtomicU64::new(0),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Append a packet; returns the sealed batch when this packet completes one.
    pub fn offer(&self, packet: RawPacket) -> Option<Batch> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.buffer.push(packet);
        self.packet_count.fetch_add(1, Ordering::Relaxed);
        if state.buffer.len() < self.batch_size {
            return None;
        }
        Some(Self::seal(&mut state, self.batch_size))
    }

    /// Seal whatever is buffered, even if short of `batch_size`.
    pub fn drain(&self) -> Option<Batch> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.buffer.is_empty() {
            return None;
        }
        Some(Self::seal(&mut state, self.batch_size))
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        StatusSnapshot {
            packet_count: self.packet_count.load(Ordering::Relaxed),
            buffered: state.buffer.len(),
            last_batch_index: state.next_index.checked_sub(1),
            batch_size: self.batch_size,
        }
    }

    fn seal(state: &mut State, capacity: usize) -> Batch {
        let packets = std::mem::replace(&mut state.buffer, Vec::with_capacity(capacity));
        let index = state.next_index;
        state.next_index += 1;
        Batch::seal(index, packets)
    }
}
