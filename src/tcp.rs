use bitflags::bitflags;

use crate::bytes::{decode_fields, Field, FieldKind};
use crate::error::{DecodeError, LengthMismatch};


static TCP_SCHEMA: [Field; 7] = [
    Field::new("source_port", FieldKind::Ube, 0, 2),
    Field::new("destination_port", FieldKind::Ube, 2, 4),
    Field::new("sequence_number", FieldKind::Ube, 4, 8),
    Field::new("acknowledgement_number", FieldKind::Ube, 8, 12),
    Field::new("data_offset", FieldKind::NibblePair, 12, 13),
    Field::new("flags", FieldKind::Ube, 13, 14),
    Field::new("window", FieldKind::Ube, 14, 16),
];


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
// as defined in RFC9293 section 3.1; options are skipped, not decoded
pub struct TcpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: u32,
    pub acknowledgement_number: u32,
    // stored in bytes; on the wire it is the number of 32-bit words
    pub header_length: usize,
    pub flags: TcpFlags,
    pub window: u16,
}
impl TcpHeader {
    pub const MIN_LENGTH: usize = 20;

    pub fn try_take(bytes: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let fields = decode_fields(bytes, 0, &TCP_SCHEMA)?;

        let (data_offset_w32, _reserved) = fields.nibbles("data_offset")?;
        let header_length = usize::from(data_offset_w32) * 4;
        if header_length < Self::MIN_LENGTH {
            return Err(LengthMismatch::ShortHeader {
                layer: "TCP",
                declared: header_length,
                minimum: Self::MIN_LENGTH,
            }.into());
        }

        let header = Self {
            source_port: fields.unsigned("source_port")? as u16,
            destination_port: fields.unsigned("destination_port")? as u16,
            sequence_number: fields.unsigned("sequence_number")? as u32,
            acknowledgement_number: fields.unsigned("acknowledgement_number")? as u32,
            header_length,
            flags: TcpFlags::from_bits_truncate(fields.unsigned("flags")? as u8),
            window: fields.unsigned("window")? as u16,
        };
        let payload = bytes.get(header_length..)
            .ok_or(DecodeError::OutOfBounds {
                field: "options",
                start: Self::MIN_LENGTH,
                end: header_length,
                length: bytes.len(),
            })?;
        Ok((header, payload))
    }
}


bitflags! {
    #[derive(Default)]
    // managed by IANA: https://www.iana.org/assignments/tcp-parameters/tcp-parameters.xhtml (section "TCP Header Flags")
    pub struct TcpFlags: u8 {
        const FIN = 0b0000_0001;
        const SYN = 0b0000_0010;
        const RST = 0b0000_0100;
        const PSH = 0b0000_1000;
        const ACK = 0b0001_0000;
        const URG = 0b0010_0000;
        const ECE = 0b0100_0000;
        const CWR = 0b1000_0000;
    }
}


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Segment<'a> {
    pub header: TcpHeader,
    pub payload: &'a [u8],
}


pub fn decode_segments<'a, I: IntoIterator<Item = &'a [u8]>>(datagrams: I) -> Result<Vec<Segment<'a>>, DecodeError> {
    let mut segments = Vec::new();
    for bytes in datagrams {
        let (header, payload) = TcpHeader::try_take(bytes)?;
        segments.push(Segment { header, payload });
    }
    Ok(segments)
}
