use tracing::{debug, info};

use crate::capture::{split_records, CaptureHeader, RecordHeader};
use crate::error::DecodeError;
use crate::ethernet::{decode_frames, EthernetHeader, Ethertype, VlanTagHeader};
use crate::ip::{decode_datagrams, Ipv4Header, ProtocolNumber};
use crate::payload::extract_payload;
use crate::reassembly::{DuplicatePolicy, Reassembler, ReassemblyStats, DEFAULT_SERVER_PORT};
use crate::stats::CaptureSummary;
use crate::tcp::{decode_segments, Segment, TcpHeader};


#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DecodeOptions {
    /// Source port of the direction to reassemble.
    pub server_port: u16,
    pub duplicate_policy: DuplicatePolicy,
}
impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_SERVER_PORT,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}


/// One record, decoded through every layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Packet<'a> {
    pub index: usize,
    pub record: RecordHeader,
    pub ethernet: EthernetHeader,
    pub vlan: Option<VlanTagHeader>,
    pub ipv4: Ipv4Header,
    pub tcp: TcpHeader,
    pub payload: &'a [u8],
}
impl<'a> Packet<'a> {
    pub fn segment(&self) -> Segment<'a> {
        Segment { header: self.tcp, payload: self.payload }
    }
}


#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedPackets<'a> {
    pub header: CaptureHeader,
    pub ethertype: Ethertype,
    pub ip_protocol: u8,
    pub packets: Vec<Packet<'a>>,
}


/// Decodes every record of a capture down to its TCP payload, layer by layer.
///
/// Each layer's cross-record invariant is checked before the next layer is decoded.
pub fn decode_packets(bytes: &[u8]) -> Result<DecodedPackets<'_>, DecodeError> {
    let (header, _) = CaptureHeader::try_take(bytes)?;
    header.ensure_ethernet()?;

    let records = split_records(bytes)?;
    debug!("{} records", records.len());

    let (ethertype, frames) = decode_frames(records.iter().map(|r| r.data))?;
    let (ip_protocol, datagrams) = decode_datagrams(frames.iter().map(|f| f.payload))?;
    let segments = decode_segments(datagrams.iter().map(|d| d.payload))?;

    let packets = records.iter()
        .zip(frames.iter())
        .zip(datagrams.iter())
        .zip(segments.iter())
        .map(|(((record, frame), datagram), segment)| Packet {
            index: record.index,
            record: record.header,
            ethernet: frame.header,
            vlan: frame.vlan,
            ipv4: datagram.header,
            tcp: segment.header,
            payload: segment.payload,
        })
        .collect();

    Ok(DecodedPackets {
        header,
        ethertype,
        ip_protocol,
        packets,
    })
}


/// The result of carving a payload out of a capture.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Decoded {
    pub header: CaptureHeader,
    pub summary: CaptureSummary,
    pub reassembly: ReassemblyStats,
    /// The reassembled stream of the monitored direction.
    pub stream: Vec<u8>,
    pub payload_offset: usize,
}
impl Decoded {
    /// The HTTP header section, delimiter included.
    pub fn headers(&self) -> &[u8] {
        &self.stream[..self.payload_offset]
    }

    pub fn payload(&self) -> &[u8] {
        &self.stream[self.payload_offset..]
    }
}


pub fn summarize(decoded: &DecodedPackets<'_>) -> CaptureSummary {
    let mut summary = CaptureSummary::new(decoded.ethertype, decoded.ip_protocol);
    for packet in &decoded.packets {
        summary.add_packet(
            packet.record.timestamp(),
            packet.record.captured_length as usize,
            packet.ethernet.source,
            packet.ethernet.destination,
            (packet.ipv4.source_address, packet.ipv4.destination_address),
        );
    }
    summary
}


/// Runs the whole pipeline over an in-memory capture.
pub fn decode(bytes: &[u8], options: &DecodeOptions) -> Result<Decoded, DecodeError> {
    let decoded = decode_packets(bytes)?;
    let summary = summarize(&decoded);
    info!(
        "{} packets, ethertype {}, protocol {}",
        summary.packet_count,
        decoded.ethertype,
        ProtocolNumber(decoded.ip_protocol),
    );

    let segments: Vec<Segment> = decoded.packets.iter()
        .map(|p| p.segment())
        .collect();
    let reassembler = Reassembler::new(options.server_port, options.duplicate_policy);
    let stream = reassembler.reassemble(&segments)?;
    let offset = stream.bytes.len() - extract_payload(&stream.bytes)?.len();

    Ok(Decoded {
        header: decoded.header,
        summary,
        reassembly: stream.stats,
        stream: stream.bytes,
        payload_offset: offset,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FormatMismatch, LengthMismatch, ProtocolMismatch};
    use crate::testutil::{CaptureBuilder, TcpPacket};

    const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\n\r\n\xff\xd8\xff\xe0JFIF";

    fn http_capture() -> Vec<u8> {
        let (first, second) = RESPONSE.split_at(20);
        let (second, third) = second.split_at(15);
        CaptureBuilder::new()
            .packet(TcpPacket::client(1000, b"GET /cat.jpg HTTP/1.1\r\n\r\n"))
            .packet(TcpPacket::server(5000 + 35, third))
            .packet(TcpPacket::server(5000, first))
            .packet(TcpPacket::server(5000 + 20, second))
            .packet(TcpPacket::server(5000, first))
            .build()
    }

    #[test]
    fn carves_the_body_out_of_a_reordered_flow() {
        let decoded = decode(&http_capture(), &DecodeOptions::default()).unwrap();
        assert_eq!(decoded.stream, RESPONSE);
        assert_eq!(decoded.payload(), b"\xff\xd8\xff\xe0JFIF");
        assert!(decoded.headers().ends_with(b"\r\n\r\n"));
        assert_eq!(decoded.reassembly.segments_seen, 5);
        assert_eq!(decoded.reassembly.segments_matched, 4);
        assert_eq!(decoded.reassembly.duplicates_dropped, 1);
        assert_eq!(decoded.summary.packet_count, 5);
        assert_eq!(decoded.summary.ethertype, Some(Ethertype::Ipv4));
        assert_eq!(decoded.summary.ip_protocol, Some(6));
        assert_eq!(decoded.summary.common_source(), Some(TcpPacket::SERVER_MAC));
        assert_eq!(decoded.summary.common_destination(), Some(TcpPacket::CLIENT_MAC));
    }

    #[test]
    fn summary_counts_every_record_byte() {
        let bytes = http_capture();
        let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
        let record_data = bytes.len() - CaptureHeader::LENGTH - 5 * RecordHeader::LENGTH;
        assert_eq!(decoded.summary.byte_count, record_data as u64);
    }

    #[test]
    fn decoding_is_deterministic() {
        let bytes = http_capture();
        let options = DecodeOptions::default();
        assert_eq!(decode(&bytes, &options).unwrap(), decode(&bytes, &options).unwrap());
    }

    #[test]
    fn one_packet_per_record_in_file_order() {
        let bytes = http_capture();
        let decoded = decode_packets(&bytes).unwrap();
        let sequence_numbers: Vec<u32> = decoded.packets.iter()
            .map(|p| p.tcp.sequence_number)
            .collect();
        assert_eq!(sequence_numbers, vec![1000, 5035, 5000, 5020, 5000]);
        let indices: Vec<usize> = decoded.packets.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(decoded.packets[0].tcp.destination_port, 80);
    }

    #[test]
    fn ethernet_padding_is_not_payload() {
        let bytes = CaptureBuilder::new()
            .packet(TcpPacket::server(1, b"HTTP/1.1 200 OK\r\n\r\nX").padding(12))
            .build();
        let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
        assert_eq!(decoded.payload(), b"X");
    }

    #[test]
    fn other_port_selects_the_other_direction() {
        let options = DecodeOptions { server_port: TcpPacket::CLIENT_PORT, ..Default::default() };
        let decoded = decode(&http_capture(), &options).unwrap();
        assert_eq!(decoded.stream, b"GET /cat.jpg HTTP/1.1\r\n\r\n");
        assert!(decoded.payload().is_empty());
    }

    #[test]
    fn magic_mismatch_before_any_record() {
        let mut bytes = http_capture();
        bytes[0..4].copy_from_slice(&[0, 0, 0, 0]);
        let err = decode(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_eq!(err, DecodeError::Format(FormatMismatch::Magic { found: vec![0, 0, 0, 0] }));
    }

    #[test]
    fn truncated_record_stops_the_pipeline() {
        let bytes = CaptureBuilder::new()
            .packet(TcpPacket::server(1, b"HTTP/1.1 200 OK\r\n\r\nX"))
            .raw_record(50, 40, &[0u8; 50])
            .packet(TcpPacket::server(100, b"more"))
            .build();
        let err = decode(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_eq!(err, DecodeError::Length(LengthMismatch::Truncated { index: 1, captured: 50, original: 40 }));
    }

    #[test]
    fn arp_among_ipv4_fails_at_the_frame_layer() {
        // the second frame is not valid IPv4 either
        let bytes = CaptureBuilder::new()
            .packet(TcpPacket::server(1, b"HTTP/1.1 200 OK\r\n\r\nX"))
            .packet(TcpPacket::server(2, b"Y").ethertype(0x0806).ip_version(6))
            .build();
        let err = decode(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_eq!(err, DecodeError::Format(FormatMismatch::Ethertype {
            index: 1,
            expected: Ethertype::Ipv4,
            found: Ethertype::Arp,
        }));
    }

    #[test]
    fn mixed_ip_protocols() {
        let bytes = CaptureBuilder::new()
            .packet(TcpPacket::server(1, b"HTTP/1.1 200 OK\r\n\r\nX"))
            .packet(TcpPacket::server(2, b"Y").protocol(17))
            .build();
        let err = decode(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_eq!(err, DecodeError::Protocol(ProtocolMismatch::Protocol { index: 1, expected: 6, found: 17 }));
    }

    #[test]
    fn ipv6_version_nibble() {
        let bytes = CaptureBuilder::new()
            .packet(TcpPacket::server(1, b"X").ip_version(6))
            .build();
        let err = decode(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_eq!(err, DecodeError::Protocol(ProtocolMismatch::Version { version: 6 }));
    }

    #[test]
    fn unsupported_link_type() {
        let bytes = CaptureBuilder::new()
            .link_type(113)
            .packet(TcpPacket::server(1, b"X"))
            .build();
        let err = decode(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_eq!(err, DecodeError::Format(FormatMismatch::LinkType { link_type: 113 }));
    }

    #[test]
    fn stream_without_headers() {
        let bytes = CaptureBuilder::new()
            .packet(TcpPacket::server(1, b"no delimiter here"))
            .build();
        let err = decode(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_eq!(err, DecodeError::PayloadNotFound { stream_length: 17 });
    }

    #[test]
    fn vlan_tagged_flow() {
        let bytes = CaptureBuilder::new()
            .packet(TcpPacket::server(1, b"HTTP/1.1 200 OK\r\n\r\nX").vlan(7))
            .packet(TcpPacket::server(21, b"YZ").vlan(7))
            .build();
        let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
        assert_eq!(decoded.summary.ethertype, Some(Ethertype::VlanTag));
        assert_eq!(decoded.payload(), b"XYZ");
    }
}
