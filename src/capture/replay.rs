//! Offline source: replays a pcap file through the same callback as live capture.

use super::{CaptureError, CaptureSource, CaptureStats, RawPacket};
use pcap_file::pcap::PcapReader;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

pub struct PcapFileSource {
    path: PathBuf,
    reader: PcapReader<BufReader<File>>,
}

impl PcapFileSource {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let file = BufReader::new(File::open(path)?);
        let reader = PcapReader::new(file)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
        })
    }
}

impl CaptureSource for PcapFileSource {
    fn linktype(&self) -> u32 {
        u32::from(self.reader.header().datalink)
    }

    fn run(
        &mut self,
        stop: &AtomicBool,
        on_packet: &mut dyn FnMut(RawPacket),
    ) -> Result<CaptureStats, CaptureError> {
        info!(path = %self.path.display(), "replaying pcap file");
        let mut stats = CaptureStats::default();
        while !stop.load(Ordering::Relaxed) {
            let Some(next) = self.reader.next_packet() else {
                break;
            };
            let pkt = next?;
            stats.packets += 1;
            stats.bytes += pkt.data.len() as u64;
            on_packet(RawPacket {
                timestamp: pkt.timestamp,
                orig_len: pkt.orig_len,
                data: pkt.data.into_owned(),
            });
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::write_pcap;
    use std::time::Duration;

    #[test]
    fn replays_every_packet_then_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.pcap");
        let packets: Vec<RawPacket> = (0..10u8)
            .map(|i| RawPacket::new(Duration::from_secs(i as u64), vec![i; 40]))
            .collect();
        write_pcap(&path, &packets, 1).unwrap();

        let mut source = PcapFileSource::open(&path).unwrap();
        assert_eq!(source.linktype(), 1);
        let stop = AtomicBool::new(false);
        let mut got = Vec::new();
        let stats = source.run(&stop, &mut |p| got.push(p)).unwrap();

        assert_eq!(stats.packets, 10);
        assert_eq!(stats.bytes, 400);
        assert_eq!(got, packets);
    }

    #[test]
    fn stop_flag_ends_replay_early() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.pcap");
        let packets: Vec<RawPacket> = (0..5u8)
            .map(|i| RawPacket::new(Duration::from_secs(i as u64), vec![i; 10]))
            .collect();
        write_pcap(&path, &packets, 1).unwrap();

        let mut source = PcapFileSource::open(&path).unwrap();
        let stop = AtomicBool::new(false);
        let mut count = 0;
        source
            .run(&stop, &mut |_| {
                count += 1;
                if count == 2 {
                    stop.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();
        assert_eq!(count, 2);
    }
}
