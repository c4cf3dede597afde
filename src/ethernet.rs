use std::fmt;

use from_to_repr::FromToRepr;
use macaddr::MacAddr6;
use tracing::debug;

use crate::bytes::{decode_fields, Field, FieldKind};
use crate::error::{DecodeError, FormatMismatch};


// managed by IEEE: https://regauth.standards.ieee.org/standards-ra-web/pub/view.html ("Ethertype")
pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_VLAN_TAG: u16 = 0x8100;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Ethertype {
    Ipv4,
    Arp,
    Ipv6,
    VlanTag,
    Unrecognized(u16),
}
impl Ethertype {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}
impl From<u16> for Ethertype {
    fn from(value: u16) -> Self {
        match value {
            ETHERTYPE_IPV4 => Self::Ipv4,
            ETHERTYPE_ARP => Self::Arp,
            ETHERTYPE_IPV6 => Self::Ipv6,
            ETHERTYPE_VLAN_TAG => Self::VlanTag,
            other => Self::Unrecognized(other),
        }
    }
}
impl From<Ethertype> for u16 {
    fn from(value: Ethertype) -> Self {
        match value {
            Ethertype::Ipv4 => ETHERTYPE_IPV4,
            Ethertype::Arp => ETHERTYPE_ARP,
            Ethertype::Ipv6 => ETHERTYPE_IPV6,
            Ethertype::VlanTag => ETHERTYPE_VLAN_TAG,
            Ethertype::Unrecognized(other) => other,
        }
    }
}
impl fmt::Display for Ethertype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "IPv4"),
            Self::Arp => write!(f, "ARP"),
            Self::Ipv6 => write!(f, "IPv6"),
            Self::VlanTag => write!(f, "802.1Q"),
            Self::Unrecognized(other) => write!(f, "unrecognized (0x{:04X})", other),
        }
    }
}


static ETHERNET_SCHEMA: [Field; 3] = [
    Field::new("destination", FieldKind::Mac, 0, 6),
    Field::new("source", FieldKind::Mac, 6, 12),
    Field::new("ethertype", FieldKind::Ethertype, 12, 14),
];


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
// definition taken from Wikipedia because I'm not throwing money into IEEE's undeserving maw
pub struct EthernetHeader {
    pub destination: MacAddr6,
    pub source: MacAddr6,
    pub ethertype: Ethertype,
}
impl EthernetHeader {
    pub const LENGTH: usize = 14;

    pub fn try_take(bytes: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let fields = decode_fields(bytes, 0, &ETHERNET_SCHEMA)?;
        let header = Self {
            destination: fields.mac("destination")?,
            source: fields.mac("source")?,
            ethertype: fields.ethertype("ethertype")?,
        };
        Ok((header, &bytes[Self::LENGTH..]))
    }
}


static VLAN_TAG_SCHEMA: [Field; 2] = [
    Field::new("tci", FieldKind::Ube, 0, 2),
    Field::new("ethertype", FieldKind::Ethertype, 2, 4),
];


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VlanTagHeader {
    pub priority_code_point: PriorityCodePoint,
    pub drop_eligible_indicator: bool,
    pub vlan_id: u16,
    pub ethertype: Ethertype,
}
impl VlanTagHeader {
    pub const LENGTH: usize = 4;

    pub fn try_take(bytes: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let fields = decode_fields(bytes, 0, &VLAN_TAG_SCHEMA)?;
        let tci = fields.unsigned("tci")? as u16;
        let priority_code_point = PriorityCodePoint::try_from((tci & 0b1110_0000_0000_0000) >> 13)
            .unwrap_or_default();
        let drop_eligible_indicator = (tci & 0b0001_0000_0000_0000) != 0;
        let vlan_id = tci & 0b0000_1111_1111_1111;

        let header = Self {
            priority_code_point,
            drop_eligible_indicator,
            vlan_id,
            ethertype: fields.ethertype("ethertype")?,
        };
        Ok((header, &bytes[Self::LENGTH..]))
    }
}


#[derive(Clone, Copy, Debug, Eq, FromToRepr, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u16)]
pub enum PriorityCodePoint {
    BestEffort = 0b000,
    Background = 0b001,
    ExcellentEffort = 0b010,
    CriticalApplication = 0b011,
    Video = 0b100,
    Voice = 0b101,
    InternetworkControl = 0b110,
    NetworkControl = 0b111,
}
impl Default for PriorityCodePoint {
    fn default() -> Self { Self::BestEffort }
}


/// An Ethernet frame; `payload` is the network-layer data, still unbounded by the IP total length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Frame<'a> {
    pub header: EthernetHeader,
    pub vlan: Option<VlanTagHeader>,
    pub payload: &'a [u8],
}


/// Checks that every frame carries the first frame's ethertype and that the first one is recognized.
pub fn uniform_ethertype(headers: &[EthernetHeader]) -> Result<Ethertype, DecodeError> {
    let first = headers.first()
        .ok_or(FormatMismatch::NoRecords)?
        .ethertype;
    if !first.is_recognized() {
        return Err(FormatMismatch::UnrecognizedEthertype(first).into());
    }
    for (index, header) in headers.iter().enumerate().skip(1) {
        if header.ethertype != first {
            return Err(FormatMismatch::Ethertype { index, expected: first, found: header.ethertype }.into());
        }
    }
    Ok(first)
}


/// Decodes every frame, enforces a uniform ethertype and strips 802.1Q tags down to IPv4.
///
/// Returns the common (outer) ethertype along with the frames.
pub fn decode_frames<'a, I: IntoIterator<Item = &'a [u8]>>(records: I) -> Result<(Ethertype, Vec<Frame<'a>>), DecodeError> {
    let mut taken = Vec::new();
    for bytes in records {
        taken.push(EthernetHeader::try_take(bytes)?);
    }

    let headers: Vec<EthernetHeader> = taken.iter().map(|(h, _)| *h).collect();
    let ethertype = uniform_ethertype(&headers)?;
    debug!("all {} frames carry ethertype {}", headers.len(), ethertype);

    let mut frames = Vec::with_capacity(taken.len());
    for (header, rest) in taken {
        let frame = match ethertype {
            Ethertype::Ipv4 => Frame { header, vlan: None, payload: rest },
            Ethertype::VlanTag => {
                let (vlan, inner) = VlanTagHeader::try_take(rest)?;
                if vlan.ethertype != Ethertype::Ipv4 {
                    return Err(FormatMismatch::NoNetworkDecoder(vlan.ethertype).into());
                }
                Frame { header, vlan: Some(vlan), payload: inner }
            },
            other => return Err(FormatMismatch::NoNetworkDecoder(other).into()),
        };
        frames.push(frame);
    }
    Ok((ethertype, frames))
}
