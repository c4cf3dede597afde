use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::bytes::{decode_fields, Field, FieldKind};
use crate::error::{DecodeError, FormatMismatch, LengthMismatch};


// the microsecond-resolution, little-endian variant of the libpcap save file
pub const MAGIC: [u8; 4] = [0xD4, 0xC3, 0xB2, 0xA1];

// managed by tcpdump.org: https://www.tcpdump.org/linktypes.html
pub const LINKTYPE_ETHERNET: u32 = 1;


/*
 * Global header, as described in pcap-savefile(5):
 *
 * +------------------------------+
 * |        Magic number          |
 * +--------------+---------------+
 * |Major version | Minor version |
 * +--------------+---------------+
 * |      Time zone offset        |
 * +------------------------------+
 * |     Time stamp accuracy      |
 * +------------------------------+
 * |       Snapshot length        |
 * +------------------------------+
 * |   Link-layer header type     |
 * +------------------------------+
 */
static CAPTURE_HEADER_SCHEMA: [Field; 7] = [
    Field::new("magic_number", FieldKind::Magic(&MAGIC), 0, 4),
    Field::new("major_version", FieldKind::Ule, 4, 6),
    Field::new("minor_version", FieldKind::Ule, 6, 8),
    Field::new("time_zone_offset", FieldKind::Le, 8, 12),
    Field::new("timestamp_accuracy", FieldKind::Ule, 12, 16),
    Field::new("snapshot_length", FieldKind::Ule, 16, 20),
    Field::new("link_type", FieldKind::Ule, 20, 24),
];


#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct CaptureHeader {
    pub major_version: u16,
    pub minor_version: u16,
    pub time_zone_offset: i32,
    pub timestamp_accuracy: u32,
    pub snapshot_length: u32,
    pub link_type: u32,
}
impl CaptureHeader {
    pub const LENGTH: usize = 24;

    pub fn try_take(bytes: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let fields = decode_fields(bytes, 0, &CAPTURE_HEADER_SCHEMA)?;
        debug!("capture header: {}", fields);

        let header = Self {
            major_version: fields.unsigned("major_version")? as u16,
            minor_version: fields.unsigned("minor_version")? as u16,
            time_zone_offset: fields.signed("time_zone_offset")? as i32,
            timestamp_accuracy: fields.unsigned("timestamp_accuracy")? as u32,
            snapshot_length: fields.unsigned("snapshot_length")? as u32,
            link_type: fields.unsigned("link_type")? as u32,
        };
        Ok((header, &bytes[Self::LENGTH..]))
    }

    pub fn ensure_ethernet(&self) -> Result<(), DecodeError> {
        if self.link_type == LINKTYPE_ETHERNET {
            Ok(())
        } else {
            Err(FormatMismatch::LinkType { link_type: self.link_type }.into())
        }
    }
}


/*
 * Record header:
 *
 * +----------------------------------------------+
 * |          Time stamp, seconds value           |
 * +----------------------------------------------+
 * |        Time stamp, microseconds value        |
 * +----------------------------------------------+
 * |       Length of captured packet data         |
 * +----------------------------------------------+
 * |   Un-truncated length of the packet data     |
 * +----------------------------------------------+
 */
static RECORD_HEADER_SCHEMA: [Field; 4] = [
    Field::new("timestamp_seconds", FieldKind::Le, 0, 4),
    Field::new("timestamp_fraction", FieldKind::Le, 4, 8),
    Field::new("captured_length", FieldKind::Ule, 8, 12),
    Field::new("original_length", FieldKind::Ule, 12, 16),
];


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RecordHeader {
    pub timestamp_seconds: i32,
    pub timestamp_fraction: i32,
    pub captured_length: u32,
    pub original_length: u32,
}
impl RecordHeader {
    pub const LENGTH: usize = 16;

    pub fn decode(bytes: &[u8], offset: usize) -> Result<Self, DecodeError> {
        let fields = decode_fields(bytes, offset, &RECORD_HEADER_SCHEMA)?;
        Ok(Self {
            timestamp_seconds: fields.signed("timestamp_seconds")? as i32,
            timestamp_fraction: fields.signed("timestamp_fraction")? as i32,
            captured_length: fields.unsigned("captured_length")? as u32,
            original_length: fields.unsigned("original_length")? as u32,
        })
    }

    /// The capture time, or `None` if the fractional part is not a valid microsecond count.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let micros = u32::try_from(self.timestamp_fraction).ok()
            .filter(|m| *m < 1_000_000)?;
        Utc.timestamp_opt(i64::from(self.timestamp_seconds), micros * 1_000)
            .single()
    }
}


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Record<'a> {
    pub index: usize,
    pub header: RecordHeader,
    pub data: &'a [u8],
}


/// Walks the records of a capture buffer in file order.
///
/// Yields at most one error, after which iteration stops.
#[derive(Clone, Debug)]
pub struct Records<'a> {
    bytes: &'a [u8],
    cursor: usize,
    index: usize,
    failed: bool,
}
impl<'a> Records<'a> {
    /// Starts right after the global header of `bytes`, which must be the whole capture.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            cursor: CaptureHeader::LENGTH,
            index: 0,
            failed: false,
        }
    }

    fn take_record(&mut self) -> Result<Record<'a>, DecodeError> {
        let header = RecordHeader::decode(self.bytes, self.cursor)?;
        if header.captured_length != header.original_length {
            return Err(LengthMismatch::Truncated {
                index: self.index,
                captured: header.captured_length,
                original: header.original_length,
            }.into());
        }

        let start = self.cursor + RecordHeader::LENGTH;
        let available = self.bytes.len() - start;
        let overrun = LengthMismatch::Overrun {
            index: self.index,
            offset: self.cursor,
            declared: header.captured_length,
            available,
        };
        let length = usize::try_from(header.captured_length).map_err(|_| overrun)?;
        if length > available {
            return Err(overrun.into());
        }

        let record = Record {
            index: self.index,
            header,
            data: &self.bytes[start..start + length],
        };
        debug!("record {} at offset {}: {} bytes", self.index, self.cursor, length);
        self.cursor = start + length;
        self.index += 1;
        Ok(record)
    }
}
impl<'a> Iterator for Records<'a> {
    type Item = Result<Record<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.bytes.len() {
            return None;
        }
        let result = self.take_record();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}
impl<'a> std::iter::FusedIterator for Records<'a> {}


/// Splits a whole capture buffer into its records; the first bad record aborts.
pub fn split_records(bytes: &[u8]) -> Result<Vec<Record<'_>>, DecodeError> {
    Records::new(bytes).collect()
}
