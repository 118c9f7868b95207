//! Packet sources and pcap artifacts.
//!
//! The detector does not parse packets: a [`RawPacket`] is a timestamp plus
//! wire bytes, produced by a [`CaptureSource`] and written back out as pcap
//! when a batch is handed to the flow extractor or retained as alert evidence.

mod replay;
mod writer;
#[cfg(feature = "live-capture")]
mod live;

use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use replay::PcapFileSource;
pub use writer::{write_pcap, write_pcap_to};
#[cfg(feature = "live-capture")]
pub use live::LiveSource;

/// One captured frame, uninterpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// Capture time since the UNIX epoch
    pub timestamp: Duration,
    /// Length on the wire (may exceed `data.len()` when truncated by snaplen)
    pub orig_len: u32,
    pub data: Vec<u8>,
}

impl RawPacket {
    pub fn new(timestamp: Duration, data: Vec<u8>) -> Self {
        Self {
            timestamp,
            orig_len: data.len() as u32,
            data,
        }
    }

    /// Packet stamped with the current wall clock
    pub fn now(data: Vec<u8>) -> Self {
        let ts = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self::new(ts, data)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture io: {0}")]
    Io(#[from] std::io::Error),
    #[error("pcap file: {0}")]
    PcapFile(#[from] pcap_file::PcapError),
    #[error("live capture: {0}")]
    Live(String),
    #[error("no capture source configured (set capture.interface or capture.replay_file)")]
    Unconfigured,
}

/// Totals reported when a source stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStats {
    pub packets: u64,
    pub bytes: u64,
}

/// Produces packets on the calling thread until exhausted or `stop` is set.
pub trait CaptureSource {
    /// Link-layer type of the produced frames (pcap LINKTYPE_* value)
    fn linktype(&self) -> u32;

    fn run(
        &mut self,
        stop: &AtomicBool,
        on_packet: &mut dyn FnMut(RawPacket),
    ) -> Result<CaptureStats, CaptureError>;
}
