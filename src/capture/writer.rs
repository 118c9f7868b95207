use super::{CaptureError, RawPacket};
use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};
use pcap_file::DataLink;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const MIN_SNAPLEN: u32 = 65535;

/// Write packets to a new pcap file at `path` (truncating any existing file).
pub fn write_pcap(path: &Path, packets: &[RawPacket], linktype: u32) -> Result<(), CaptureError> {
    let mut file = write_pcap_to(BufWriter::new(File::create(path)?), packets, linktype)?;
    file.flush()?;
    Ok(())
}

/// Write a complete pcap stream into `sink` and hand it back unflushed.
pub fn write_pcap_to<W: Write>(sink: W, packets: &[RawPacket], linktype: u32) -> Result<W, CaptureError> {
    // Header snaplen must cover the largest stored frame or the writer rejects it
    let snaplen = packets
        .iter()
        .map(|p| p.data.len() as u32)
        .max()
        .unwrap_or(0)
        .max(MIN_SNAPLEN);
    let header = PcapHeader {
        snaplen,
        datalink: DataLink::from(linktype),
        ..Default::default()
    };

    let mut writer = PcapWriter::with_header(sink, header)?;
    for p in packets {
        let orig_len = p.orig_len.max(p.data.len() as u32);
        writer.write_packet(&PcapPacket::new(p.timestamp, orig_len, &p.data))?;
    }
    Ok(writer.into_writer())
}
