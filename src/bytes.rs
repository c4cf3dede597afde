use std::fmt;
use std::net::Ipv4Addr;

use macaddr::MacAddr6;

use crate::error::{DecodeError, FormatMismatch};
use crate::ethernet::Ethertype;


pub trait TryFromBytes : Sized {
    fn try_from_bytes(bytes: &[u8]) -> Option<Self>;
}

impl TryFromBytes for Ipv4Addr {
    fn try_from_bytes(bytes: &[u8]) -> Option<Self> {
        let bs: [u8; 4] = bytes.get(0..4)?.try_into().ok()?;
        Some(Self::from(bs))
    }
}

impl TryFromBytes for MacAddr6 {
    fn try_from_bytes(bytes: &[u8]) -> Option<Self> {
        let bs: [u8; 6] = bytes.get(0..6)?.try_into().ok()?;
        Some(Self::from(bs))
    }
}


/// How the bytes of a field are interpreted.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FieldKind {
    /// Must match these bytes exactly; no numeric conversion.
    Magic(&'static [u8]),
    /// Signed little-endian integer, 1 to 8 bytes.
    Le,
    /// Signed big-endian integer, 1 to 8 bytes.
    #[allow(dead_code)]
    Be,
    /// Unsigned little-endian integer, 1 to 8 bytes.
    Ule,
    /// Unsigned big-endian integer, 1 to 8 bytes.
    Ube,
    #[allow(dead_code)]
    Raw,
    /// 6-byte hardware address.
    Mac,
    /// 4-byte IPv4 address.
    Ipv4,
    /// 2-byte big-endian ethertype.
    Ethertype,
    /// One byte split into (high, low) nibbles.
    NibblePair,
}


/// A named field at a fixed byte range, relative to the offset it is decoded at.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub start: usize,
    pub end: usize,
}
impl Field {
    pub const fn new(name: &'static str, kind: FieldKind, start: usize, end: usize) -> Self {
        Self { name, kind, start, end }
    }
}


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldValue<'a> {
    Magic,
    Signed(i64),
    Unsigned(u64),
    Raw(&'a [u8]),
    Mac(MacAddr6),
    Ipv4(Ipv4Addr),
    Ethertype(Ethertype),
    Nibbles(u8, u8),
}
impl<'a> fmt::Display for FieldValue<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Magic => write!(f, "ok"),
            Self::Signed(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
            Self::Raw(bs) => {
                for b in bs.iter() {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            },
            Self::Mac(mac) => write!(f, "{}", mac),
            Self::Ipv4(addr) => write!(f, "{}", addr),
            Self::Ethertype(et) => write!(f, "{}", et),
            Self::Nibbles(high, low) => write!(f, "{}/{}", high, low),
        }
    }
}


fn integer_bytes(field: &Field, bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.is_empty() || bytes.len() > 8 {
        Err(DecodeError::Schema { field: field.name })
    } else {
        Ok(())
    }
}

fn fold_unsigned<'b, I: Iterator<Item = &'b u8>>(bytes: I) -> u64 {
    bytes.fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn sign_extend(value: u64, width: usize) -> i64 {
    let shift = 64 - 8 * width;
    ((value << shift) as i64) >> shift
}


/// Decodes a single field located at `offset + field.start .. offset + field.end`.
pub fn decode_field<'a>(bytes: &'a [u8], offset: usize, field: &Field) -> Result<FieldValue<'a>, DecodeError> {
    let out_of_bounds = || DecodeError::OutOfBounds {
        field: field.name,
        start: offset.saturating_add(field.start),
        end: offset.saturating_add(field.end),
        length: bytes.len(),
    };
    let start = offset.checked_add(field.start).ok_or_else(out_of_bounds)?;
    let end = offset.checked_add(field.end).ok_or_else(out_of_bounds)?;
    let slice = bytes.get(start..end).ok_or_else(out_of_bounds)?;

    let value = match field.kind {
        FieldKind::Magic(expected) => {
            if slice != expected {
                return Err(FormatMismatch::Magic { found: slice.to_vec() }.into());
            }
            FieldValue::Magic
        },
        FieldKind::Le => {
            integer_bytes(field, slice)?;
            FieldValue::Signed(sign_extend(fold_unsigned(slice.iter().rev()), slice.len()))
        },
        FieldKind::Be => {
            integer_bytes(field, slice)?;
            FieldValue::Signed(sign_extend(fold_unsigned(slice.iter()), slice.len()))
        },
        FieldKind::Ule => {
            integer_bytes(field, slice)?;
            FieldValue::Unsigned(fold_unsigned(slice.iter().rev()))
        },
        FieldKind::Ube => {
            integer_bytes(field, slice)?;
            FieldValue::Unsigned(fold_unsigned(slice.iter()))
        },
        FieldKind::Raw => FieldValue::Raw(slice),
        FieldKind::Mac => {
            if slice.len() != 6 {
                return Err(DecodeError::Schema { field: field.name });
            }
            let mac = MacAddr6::try_from_bytes(slice)
                .ok_or(DecodeError::Schema { field: field.name })?;
            FieldValue::Mac(mac)
        },
        FieldKind::Ipv4 => {
            if slice.len() != 4 {
                return Err(DecodeError::Schema { field: field.name });
            }
            let addr = Ipv4Addr::try_from_bytes(slice)
                .ok_or(DecodeError::Schema { field: field.name })?;
            FieldValue::Ipv4(addr)
        },
        FieldKind::Ethertype => {
            let bs: [u8; 2] = slice.try_into()
                .map_err(|_| DecodeError::Schema { field: field.name })?;
            FieldValue::Ethertype(Ethertype::from(u16::from_be_bytes(bs)))
        },
        FieldKind::NibblePair => {
            let [b]: [u8; 1] = slice.try_into()
                .map_err(|_| DecodeError::Schema { field: field.name })?;
            FieldValue::Nibbles((b & 0b1111_0000) >> 4, b & 0b0000_1111)
        },
    };
    Ok(value)
}


/// Decoded fields in the order their schema declares them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldMap<'a> {
    entries: Vec<(&'static str, FieldValue<'a>)>,
}
impl<'a> FieldMap<'a> {
    pub fn get(&self, name: &'static str) -> Option<&FieldValue<'a>> {
        self.entries.iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, FieldValue<'a>)> {
        self.entries.iter()
    }

    pub fn signed(&self, name: &'static str) -> Result<i64, DecodeError> {
        match self.get(name) {
            Some(FieldValue::Signed(v)) => Ok(*v),
            _ => Err(DecodeError::Schema { field: name }),
        }
    }

    pub fn unsigned(&self, name: &'static str) -> Result<u64, DecodeError> {
        match self.get(name) {
            Some(FieldValue::Unsigned(v)) => Ok(*v),
            _ => Err(DecodeError::Schema { field: name }),
        }
    }

    #[allow(dead_code)]
    pub fn raw(&self, name: &'static str) -> Result<&'a [u8], DecodeError> {
        match self.get(name) {
            Some(FieldValue::Raw(bs)) => Ok(*bs),
            _ => Err(DecodeError::Schema { field: name }),
        }
    }

    pub fn mac(&self, name: &'static str) -> Result<MacAddr6, DecodeError> {
        match self.get(name) {
            Some(FieldValue::Mac(mac)) => Ok(*mac),
            _ => Err(DecodeError::Schema { field: name }),
        }
    }

    pub fn ipv4(&self, name: &'static str) -> Result<Ipv4Addr, DecodeError> {
        match self.get(name) {
            Some(FieldValue::Ipv4(addr)) => Ok(*addr),
            _ => Err(DecodeError::Schema { field: name }),
        }
    }

    pub fn ethertype(&self, name: &'static str) -> Result<Ethertype, DecodeError> {
        match self.get(name) {
            Some(FieldValue::Ethertype(et)) => Ok(*et),
            _ => Err(DecodeError::Schema { field: name }),
        }
    }

    pub fn nibbles(&self, name: &'static str) -> Result<(u8, u8), DecodeError> {
        match self.get(name) {
            Some(FieldValue::Nibbles(high, low)) => Ok((*high, *low)),
            _ => Err(DecodeError::Schema { field: name }),
        }
    }
}
impl<'a> fmt::Display for FieldMap<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}


/// Decodes every field of `schema` relative to `offset`; the first failing field aborts.
pub fn decode_fields<'a>(bytes: &'a [u8], offset: usize, schema: &[Field]) -> Result<FieldMap<'a>, DecodeError> {
    let mut entries = Vec::with_capacity(schema.len());
    for field in schema {
        entries.push((field.name, decode_field(bytes, offset, field)?));
    }
    Ok(FieldMap { entries })
}
