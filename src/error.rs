use thiserror::Error;

use crate::ethernet::Ethertype;


#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum DecodeError {
    #[error("format mismatch: {0}")]
    Format(#[from] FormatMismatch),

    #[error("length mismatch: {0}")]
    Length(#[from] LengthMismatch),

    #[error("protocol mismatch: {0}")]
    Protocol(#[from] ProtocolMismatch),

    #[error("payload not found: no \\r\\n\\r\\n delimiter in {stream_length} bytes of reassembled stream")]
    PayloadNotFound { stream_length: usize },

    #[error("field {field:?} at bytes {start}..{end} is out of range (buffer holds {length} bytes)")]
    OutOfBounds { field: &'static str, start: usize, end: usize, length: usize },

    #[error("conflicting duplicate: two segments with sequence number {sequence_number} carry different payloads")]
    ConflictingDuplicate { sequence_number: u32 },

    #[error("schema error: field {field:?} is missing or of the wrong kind")]
    Schema { field: &'static str },
}


#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum FormatMismatch {
    #[error("file is not a recognized capture (magic number {found:02x?})")]
    Magic { found: Vec<u8> },

    #[error("capture contains no records")]
    NoRecords,

    #[error("unsupported link-layer type {link_type} (only Ethernet is supported)")]
    LinkType { link_type: u32 },

    #[error("the first frame carries an unrecognized ethertype {0}")]
    UnrecognizedEthertype(Ethertype),

    #[error("formats do not match: frame {index} has ethertype {found}, the first frame has {expected}")]
    Ethertype { index: usize, expected: Ethertype, found: Ethertype },

    #[error("no decoding path for ethertype {0}")]
    NoNetworkDecoder(Ethertype),
}


#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum LengthMismatch {
    #[error("record {index} has captured length {captured} but original length {original}")]
    Truncated { index: usize, captured: u32, original: u32 },

    #[error("record {index} declares {declared} bytes at offset {offset}, but only {available} remain")]
    Overrun { index: usize, offset: usize, declared: u32, available: usize },

    #[error("{layer} header declares {declared} bytes, less than the minimum of {minimum}")]
    ShortHeader { layer: &'static str, declared: usize, minimum: usize },
}


#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ProtocolMismatch {
    #[error("version mismatch: datagram has IP version {version}, expected 4")]
    Version { version: u8 },

    #[error("protocols do not match: datagram {index} carries protocol {found}, the first datagram carries {expected}")]
    Protocol { index: usize, expected: u8, found: u8 },

    #[error("no decoding path for IP protocol {0} (only TCP is supported)")]
    NotTcp(u8),
}
