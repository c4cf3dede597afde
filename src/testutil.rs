use std::net::Ipv4Addr;

use macaddr::MacAddr6;

use crate::capture::{LINKTYPE_ETHERNET, MAGIC};
use crate::ethernet::{ETHERTYPE_IPV4, ETHERTYPE_VLAN_TAG};


/// Builds a synthetic Ethernet/IPv4/TCP packet.
#[derive(Clone, Debug)]
pub struct TcpPacket {
    source_mac: MacAddr6,
    destination_mac: MacAddr6,
    vlan_id: Option<u16>,
    ethertype: u16,
    ip_version: u8,
    protocol: u8,
    source_address: Ipv4Addr,
    destination_address: Ipv4Addr,
    source_port: u16,
    destination_port: u16,
    sequence_number: u32,
    payload: Vec<u8>,
    padding: usize,
}
impl TcpPacket {
    pub const SERVER_MAC: MacAddr6 = MacAddr6::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
    pub const CLIENT_MAC: MacAddr6 = MacAddr6::new(0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb);
    pub const SERVER_PORT: u16 = 80;
    pub const CLIENT_PORT: u16 = 51234;

    pub fn server(sequence_number: u32, payload: &[u8]) -> Self {
        Self {
            source_mac: Self::SERVER_MAC,
            destination_mac: Self::CLIENT_MAC,
            vlan_id: None,
            ethertype: ETHERTYPE_IPV4,
            ip_version: 4,
            protocol: 6,
            source_address: Ipv4Addr::new(192, 0, 2, 80),
            destination_address: Ipv4Addr::new(192, 0, 2, 10),
            source_port: Self::SERVER_PORT,
            destination_port: Self::CLIENT_PORT,
            sequence_number,
            payload: payload.to_vec(),
            padding: 0,
        }
    }

    pub fn client(sequence_number: u32, payload: &[u8]) -> Self {
        Self {
            source_mac: Self::CLIENT_MAC,
            destination_mac: Self::SERVER_MAC,
            source_address: Ipv4Addr::new(192, 0, 2, 10),
            destination_address: Ipv4Addr::new(192, 0, 2, 80),
            source_port: Self::CLIENT_PORT,
            destination_port: Self::SERVER_PORT,
            ..Self::server(sequence_number, payload)
        }
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = ethertype;
        self
    }

    pub fn vlan(mut self, vlan_id: u16) -> Self {
        self.vlan_id = Some(vlan_id);
        self
    }

    pub fn ip_version(mut self, version: u8) -> Self {
        self.ip_version = version;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut tcp = Vec::new();
        tcp.extend_from_slice(&self.source_port.to_be_bytes());
        tcp.extend_from_slice(&self.destination_port.to_be_bytes());
        tcp.extend_from_slice(&self.sequence_number.to_be_bytes());
        tcp.extend_from_slice(&0u32.to_be_bytes());
        tcp.push(0x50);
        tcp.push(0x18);
        tcp.extend_from_slice(&0xFFFFu16.to_be_bytes());
        tcp.extend_from_slice(&[0, 0, 0, 0]);
        tcp.extend_from_slice(&self.payload);

        let total_length = (20 + tcp.len()) as u16;
        let mut ip = vec![(self.ip_version << 4) | 5, 0];
        ip.extend_from_slice(&total_length.to_be_bytes());
        ip.extend_from_slice(&[0, 0, 0x40, 0, 64, self.protocol, 0, 0]);
        ip.extend_from_slice(&self.source_address.octets());
        ip.extend_from_slice(&self.destination_address.octets());
        ip.extend_from_slice(&tcp);

        let mut frame = Vec::new();
        frame.extend_from_slice(self.destination_mac.as_bytes());
        frame.extend_from_slice(self.source_mac.as_bytes());
        if let Some(vlan_id) = self.vlan_id {
            frame.extend_from_slice(&ETHERTYPE_VLAN_TAG.to_be_bytes());
            frame.extend_from_slice(&vlan_id.to_be_bytes());
        }
        frame.extend_from_slice(&self.ethertype.to_be_bytes());
        frame.extend_from_slice(&ip);
        frame.resize(frame.len() + self.padding, 0);
        frame
    }
}


/// Builds a little-endian, microsecond capture file.
#[derive(Clone, Debug)]
pub struct CaptureBuilder {
    link_type: u32,
    records: Vec<(u32, u32, Vec<u8>)>,
}
impl CaptureBuilder {
    pub fn new() -> Self {
        Self {
            link_type: LINKTYPE_ETHERNET,
            records: Vec::new(),
        }
    }

    pub fn link_type(mut self, link_type: u32) -> Self {
        self.link_type = link_type;
        self
    }

    pub fn packet(self, packet: TcpPacket) -> Self {
        let data = packet.to_bytes();
        let length = data.len() as u32;
        self.raw_record(length, length, &data)
    }

    pub fn raw_record(mut self, captured: u32, original: u32, data: &[u8]) -> Self {
        self.records.push((captured, original, data.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&65535u32.to_le_bytes());
        bytes.extend_from_slice(&self.link_type.to_le_bytes());

        for (i, (captured, original, data)) in self.records.iter().enumerate() {
            bytes.extend_from_slice(&(1_600_000_000 + i as i32).to_le_bytes());
            bytes.extend_from_slice(&0i32.to_le_bytes());
            bytes.extend_from_slice(&captured.to_le_bytes());
            bytes.extend_from_slice(&original.to_le_bytes());
            bytes.extend_from_slice(data);
        }
        bytes
    }
}
