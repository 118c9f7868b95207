//! Live capture from a network interface through libpcap.

use super::{CaptureError, CaptureSource, CaptureStats, RawPacket};
use crate::config::CaptureConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

pub struct LiveSource {
    interface: String,
    cap: pcap::Capture<pcap::Active>,
}

impl LiveSource {
    pub fn open(interface: &str, config: &CaptureConfig) -> Result<Self, CaptureError> {
        let cap = pcap::Capture::from_device(interface)
            .map_err(|e| CaptureError::Live(e.to_string()))?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(config.timeout_ms)
            .open()
            .map_err(|e| CaptureError::Live(e.to_string()))?;
        Ok(Self {
            interface: interface.to_string(),
            cap,
        })
    }
}

impl CaptureSource for LiveSource {
    fn linktype(&self) -> u32 {
        self.cap.get_datalink().0 as u32
    }

    fn run(
        &mut self,
        stop: &AtomicBool,
        on_packet: &mut dyn FnMut(RawPacket),
    ) -> Result<CaptureStats, CaptureError> {
        info!(interface = %self.interface, "live capture started");
        let mut stats = CaptureStats::default();
        while !stop.load(Ordering::Relaxed) {
            match self.cap.next_packet() {
                Ok(packet) => {
                    let ts = Duration::new(
                        packet.header.ts.tv_sec as u64,
                        (packet.header.ts.tv_usec as u32).saturating_mul(1_000),
                    );
                    stats.packets += 1;
                    stats.bytes += packet.data.len() as u64;
                    on_packet(RawPacket {
                        timestamp: ts,
                        orig_len: packet.header.len,
                        data: packet.data.to_vec(),
                    });
                }
                // Read timeout: loop around to observe `stop`
                Err(pcap::Error::TimeoutExpired) => {}
                Err(e) => return Err(CaptureError::Live(e.to_string())),
            }
        }
        Ok(stats)
    }
}
