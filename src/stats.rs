use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use macaddr::MacAddr6;

use crate::ethernet::Ethertype;


#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CaptureSummary {
    pub packet_count: u64,
    pub byte_count: u64,
    pub ethertype: Option<Ethertype>,
    pub ip_protocol: Option<u8>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub source_macs: BTreeMap<MacAddr6, u64>,
    pub destination_macs: BTreeMap<MacAddr6, u64>,
    pub address_pairs: BTreeMap<(Ipv4Addr, Ipv4Addr), u64>,
}
impl CaptureSummary {
    pub fn new(ethertype: Ethertype, ip_protocol: u8) -> Self {
        Self {
            ethertype: Some(ethertype),
            ip_protocol: Some(ip_protocol),
            ..Default::default()
        }
    }

    pub fn add_packet(
        &mut self,
        timestamp: Option<DateTime<Utc>>,
        length: usize,
        source: MacAddr6,
        destination: MacAddr6,
        addresses: (Ipv4Addr, Ipv4Addr),
    ) {
        self.packet_count += 1;
        self.byte_count += length as u64;

        if let Some(ts) = timestamp {
            if self.first_timestamp.map(|f| ts < f).unwrap_or(true) {
                self.first_timestamp = Some(ts);
            }
            if self.last_timestamp.map(|l| ts > l).unwrap_or(true) {
                self.last_timestamp = Some(ts);
            }
        }

        *self.source_macs.entry(source).or_insert(0) += 1;
        *self.destination_macs.entry(destination).or_insert(0) += 1;
        *self.address_pairs.entry(addresses).or_insert(0) += 1;
    }

    /// The source hardware address seen most often; ties go to the highest address.
    pub fn common_source(&self) -> Option<MacAddr6> {
        most_common(&self.source_macs)
    }

    pub fn common_destination(&self) -> Option<MacAddr6> {
        most_common(&self.destination_macs)
    }
}


fn most_common<K: Copy>(counts: &BTreeMap<K, u64>) -> Option<K> {
    counts.iter()
        .max_by_key(|(_, count)| **count)
        .map(|(key, _)| *key)
}
