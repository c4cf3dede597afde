use std::collections::btree_map::{BTreeMap, Entry};

use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::tcp::Segment;


pub const DEFAULT_SERVER_PORT: u16 = 80;


/// What to do with a segment whose sequence number was already seen.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DuplicatePolicy {
    /// Keep the first occurrence in file order and drop the rest unchecked.
    KeepFirst,
    /// Keep the first occurrence, but fail if a later one carries different bytes.
    RequireIdentical,
}
impl Default for DuplicatePolicy {
    fn default() -> Self { Self::KeepFirst }
}


#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ReassemblyStats {
    pub segments_seen: usize,
    pub segments_matched: usize,
    pub duplicates_dropped: usize,
    pub out_of_order: usize,
}


#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReassembledStream {
    pub bytes: Vec<u8>,
    pub stats: ReassemblyStats,
}


/// Rebuilds one direction of a TCP flow from a complete capture.
///
/// Sequence numbers are compared as plain integers, so a flow whose sequence
/// space wraps around 2^32 comes out in the wrong order.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Reassembler {
    pub server_port: u16,
    pub duplicate_policy: DuplicatePolicy,
}
impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_PORT, DuplicatePolicy::default())
    }
}
impl Reassembler {
    pub fn new(server_port: u16, duplicate_policy: DuplicatePolicy) -> Self {
        Self {
            server_port,
            duplicate_policy,
        }
    }

    /// Keeps the segments sent from `server_port`, one per sequence number, in ascending sequence order.
    pub fn select<'s, 'a, I>(&self, segments: I) -> Result<(Vec<&'s Segment<'a>>, ReassemblyStats), DecodeError>
        where I: IntoIterator<Item = &'s Segment<'a>>, 'a: 's
    {
        let mut stats = ReassemblyStats::default();
        let mut by_sequence: BTreeMap<u32, &'s Segment<'a>> = BTreeMap::new();
        let mut highest: Option<u32> = None;

        for segment in segments {
            stats.segments_seen += 1;
            if segment.header.source_port != self.server_port {
                continue;
            }
            stats.segments_matched += 1;

            let sequence_number = segment.header.sequence_number;
            match by_sequence.entry(sequence_number) {
                Entry::Vacant(v) => {
                    if highest.map(|h| sequence_number < h).unwrap_or(false) {
                        stats.out_of_order += 1;
                    }
                    highest = Some(highest.map_or(sequence_number, |h| h.max(sequence_number)));
                    v.insert(segment);
                },
                Entry::Occupied(o) => {
                    stats.duplicates_dropped += 1;
                    if o.get().payload != segment.payload {
                        match self.duplicate_policy {
                            DuplicatePolicy::RequireIdentical => {
                                return Err(DecodeError::ConflictingDuplicate { sequence_number });
                            },
                            DuplicatePolicy::KeepFirst => {
                                warn!("dropping segment {} whose payload differs from the one kept", sequence_number);
                            },
                        }
                    } else {
                        debug!("dropping retransmitted segment {}", sequence_number);
                    }
                },
            }
        }

        Ok((by_sequence.into_values().collect(), stats))
    }

    pub fn reassemble<'s, 'a, I>(&self, segments: I) -> Result<ReassembledStream, DecodeError>
        where I: IntoIterator<Item = &'s Segment<'a>>, 'a: 's
    {
        let (selected, stats) = self.select(segments)?;
        let length = selected.iter().map(|s| s.payload.len()).sum();
        let mut bytes = Vec::with_capacity(length);
        for segment in &selected {
            bytes.extend_from_slice(segment.payload);
        }
        debug!(
            "reassembled {} bytes from {} of {} segments ({} duplicates, {} out of order)",
            bytes.len(), selected.len(), stats.segments_seen, stats.duplicates_dropped, stats.out_of_order,
        );
        Ok(ReassembledStream { bytes, stats })
    }
}
