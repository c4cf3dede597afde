use std::fmt;
use std::net::Ipv4Addr;

use from_to_repr::FromToRepr;
use tracing::debug;

use crate::bytes::{decode_fields, Field, FieldKind};
use crate::error::{DecodeError, FormatMismatch, LengthMismatch, ProtocolMismatch};


// managed by IANA: https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml
#[derive(Clone, Copy, Debug, Eq, FromToRepr, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum IpProtocol {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
}


/// Renders a protocol number with its name if it is one we know.
pub struct ProtocolNumber(pub u8);
impl fmt::Display for ProtocolNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match IpProtocol::try_from(self.0) {
            Ok(IpProtocol::Icmp) => write!(f, "ICMP ({})", self.0),
            Ok(IpProtocol::Tcp) => write!(f, "TCP ({})", self.0),
            Ok(IpProtocol::Udp) => write!(f, "UDP ({})", self.0),
            Err(_) => write!(f, "{}", self.0),
        }
    }
}


static IPV4_SCHEMA: [Field; 10] = [
    Field::new("version_ihl", FieldKind::NibblePair, 0, 1),
    Field::new("type_of_service", FieldKind::Ube, 1, 2),
    Field::new("total_length", FieldKind::Ube, 2, 4),
    Field::new("identification", FieldKind::Ube, 4, 6),
    Field::new("flags_and_fragment_offset", FieldKind::Ube, 6, 8),
    Field::new("time_to_live", FieldKind::Ube, 8, 9),
    Field::new("protocol", FieldKind::Ube, 9, 10),
    Field::new("header_checksum", FieldKind::Ube, 10, 12),
    Field::new("source_address", FieldKind::Ipv4, 12, 16),
    Field::new("destination_address", FieldKind::Ipv4, 16, 20),
];


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
// as defined in RFC791 section 3.1
pub struct Ipv4Header {
    pub version: u8,
    // stored in bytes; on the wire it is the number of 32-bit words
    pub header_length: usize,
    pub type_of_service: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags_and_fragment_offset: u16,
    pub time_to_live: u8,
    pub protocol: u8,
    pub header_checksum: u16, // not verified
    pub source_address: Ipv4Addr,
    pub destination_address: Ipv4Addr,
}
impl Default for Ipv4Header {
    fn default() -> Self {
        Self {
            version: 4,
            header_length: Self::MIN_LENGTH,
            type_of_service: Default::default(),
            total_length: Default::default(),
            identification: Default::default(),
            flags_and_fragment_offset: Default::default(),
            time_to_live: Default::default(),
            protocol: Default::default(),
            header_checksum: Default::default(),
            source_address: Ipv4Addr::UNSPECIFIED,
            destination_address: Ipv4Addr::UNSPECIFIED,
        }
    }
}
impl Ipv4Header {
    pub const MIN_LENGTH: usize = 20;

    /// Takes the header and returns the payload bounded by `total_length`, dropping link-layer padding.
    pub fn try_take(bytes: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let fields = decode_fields(bytes, 0, &IPV4_SCHEMA[..1])?;
        let (version, ihl_w32) = fields.nibbles("version_ihl")?;
        if version != 4 {
            return Err(ProtocolMismatch::Version { version }.into());
        }
        let header_length = usize::from(ihl_w32) * 4;
        if header_length < Self::MIN_LENGTH {
            return Err(LengthMismatch::ShortHeader {
                layer: "IPv4",
                declared: header_length,
                minimum: Self::MIN_LENGTH,
            }.into());
        }

        let fields = decode_fields(bytes, 0, &IPV4_SCHEMA[1..])?;
        let total_length = fields.unsigned("total_length")? as u16;
        let header = Self {
            version,
            header_length,
            type_of_service: fields.unsigned("type_of_service")? as u8,
            total_length,
            identification: fields.unsigned("identification")? as u16,
            flags_and_fragment_offset: fields.unsigned("flags_and_fragment_offset")? as u16,
            time_to_live: fields.unsigned("time_to_live")? as u8,
            protocol: fields.unsigned("protocol")? as u8,
            header_checksum: fields.unsigned("header_checksum")? as u16,
            source_address: fields.ipv4("source_address")?,
            destination_address: fields.ipv4("destination_address")?,
        };

        let end = usize::from(total_length);
        let payload = bytes.get(header_length..end)
            .ok_or(DecodeError::OutOfBounds {
                field: "payload",
                start: header_length,
                end,
                length: bytes.len(),
            })?;
        Ok((header, payload))
    }
}


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Datagram<'a> {
    pub header: Ipv4Header,
    pub payload: &'a [u8],
}


/// Checks that every datagram carries the first datagram's protocol.
pub fn uniform_protocol(headers: &[Ipv4Header]) -> Result<Option<u8>, DecodeError> {
    let first = match headers.first() {
        Some(h) => h.protocol,
        None => return Ok(None),
    };
    for (index, header) in headers.iter().enumerate().skip(1) {
        if header.protocol != first {
            return Err(ProtocolMismatch::Protocol { index, expected: first, found: header.protocol }.into());
        }
    }
    Ok(Some(first))
}


/// Decodes every datagram, enforces a uniform protocol and requires it to be TCP.
pub fn decode_datagrams<'a, I: IntoIterator<Item = &'a [u8]>>(frames: I) -> Result<(u8, Vec<Datagram<'a>>), DecodeError> {
    let mut datagrams = Vec::new();
    for bytes in frames {
        let (header, payload) = Ipv4Header::try_take(bytes)?;
        datagrams.push(Datagram { header, payload });
    }

    let headers: Vec<Ipv4Header> = datagrams.iter().map(|d| d.header).collect();
    let protocol = match uniform_protocol(&headers)? {
        Some(p) => p,
        None => return Err(FormatMismatch::NoRecords.into()),
    };
    debug!("all {} datagrams carry protocol {}", datagrams.len(), ProtocolNumber(protocol));
    if protocol != IpProtocol::Tcp as u8 {
        return Err(ProtocolMismatch::NotTcp(protocol).into());
    }
    Ok((protocol, datagrams))
}
