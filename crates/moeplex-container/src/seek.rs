//! Per-track seek tables.
//!
//! A seek table maps presentation timestamps to byte offsets of packet records,
//! relative to the start of the packet region. Serialized tables are plain
//! arrays of 16-byte little-endian `(timestamp, offset)` records.

use crate::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Bytes per serialized entry.
pub const RECORD_SIZE: usize = 16;

/// Default minimum timestamp gap between indexed packets of one track (µs).
pub const DEFAULT_INTERVAL_US: u64 = 100_000;

/// One index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SeekEntry {
    /// Presentation timestamp in microseconds.
    pub timestamp: u64,
    /// Offset of the packet record within the packet region.
    pub offset: u64,
}

impl SeekEntry {
    pub fn new(timestamp: u64, offset: u64) -> Self {
        Self { timestamp, offset }
    }
}

/// Ordered index of one track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SeekTable {
    entries: Vec<SeekEntry>,
}

impl SeekTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Ordering is the caller's obligation and is not checked.
    pub fn push(&mut self, timestamp: u64, offset: u64) {
        self.entries.push(SeekEntry { timestamp, offset });
    }

    pub fn entries(&self) -> &[SeekEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&SeekEntry> {
        self.entries.last()
    }

    /// Offset of the last entry with `timestamp <= target`, or 0 when the
    /// target precedes every entry.
    pub fn lookup(&self, target: u64) -> u64 {
        let idx = self.entries.partition_point(|e| e.timestamp <= target);
        if idx == 0 {
            0
        } else {
            self.entries[idx - 1].offset
        }
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        self.entries.len() * RECORD_SIZE
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        for entry in &self.entries {
            buf.put_u64_le(entry.timestamp);
            buf.put_u64_le(entry.offset);
        }
        buf.to_vec()
    }

    /// Parse a serialized table, validating record alignment and ordering.
    pub fn deserialize(stream: u8, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % RECORD_SIZE != 0 {
            return Err(Error::seek_table_corrupt(
                stream,
                format!(
                    "length {} is not a multiple of {RECORD_SIZE}",
                    bytes.len()
                ),
            ));
        }

        let mut entries: Vec<SeekEntry> = Vec::with_capacity(bytes.len() / RECORD_SIZE);
        let mut buf = bytes;
        while buf.has_remaining() {
            let entry = SeekEntry {
                timestamp: buf.get_u64_le(),
                offset: buf.get_u64_le(),
            };
            if let Some(prev) = entries.last() {
                if entry.timestamp < prev.timestamp {
                    return Err(Error::seek_table_corrupt(
                        stream,
                        format!(
                            "entry {}: timestamp {} before {}",
                            entries.len(),
                            entry.timestamp,
                            prev.timestamp
                        ),
                    ));
                }
                if entry.offset < prev.offset {
                    return Err(Error::seek_table_corrupt(
                        stream,
                        format!(
                            "entry {}: offset {} before {}",
                            entries.len(),
                            entry.offset,
                            prev.offset
                        ),
                    ));
                }
            }
            entries.push(entry);
        }
        Ok(Self { entries })
    }
}

impl FromIterator<(u64, u64)> for SeekTable {
    fn from_iter<I: IntoIterator<Item = (u64, u64)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(timestamp, offset)| SeekEntry { timestamp, offset })
                .collect(),
        }
    }
}

/// Index state of one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackIndex {
    /// Random access available.
    Indexed(SeekTable),
    /// Table missing or corrupt; only sequential reads are possible.
    SequentialOnly { reason: String },
}

impl TrackIndex {
    pub fn table(&self) -> Option<&SeekTable> {
        match self {
            Self::Indexed(table) => Some(table),
            Self::SequentialOnly { .. } => None,
        }
    }
}

/// Seek tables for every track of one container.
#[derive(Debug, Clone)]
pub struct SeekTableManager {
    tracks: BTreeMap<u8, TrackIndex>,
    interval_us: u64,
    last_indexed: BTreeMap<u8, u64>,
}

impl Default for SeekTableManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SeekTableManager {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_INTERVAL_US)
    }

    /// Manager whose [`record`](Self::record) keeps at most one entry per `interval_us`.
    pub fn with_interval(interval_us: u64) -> Self {
        Self {
            tracks: BTreeMap::new(),
            interval_us,
            last_indexed: BTreeMap::new(),
        }
    }

    /// Register a track with an empty table. Re-registering is a no-op.
    pub fn register(&mut self, stream: u8) {
        self.tracks
            .entry(stream)
            .or_insert_with(|| TrackIndex::Indexed(SeekTable::new()));
    }

    fn table_mut(&mut self, stream: u8) -> Result<&mut SeekTable> {
        match self.tracks.get_mut(&stream) {
            Some(TrackIndex::Indexed(table)) => Ok(table),
            Some(TrackIndex::SequentialOnly { reason }) => {
                Err(Error::seek_table_corrupt(stream, reason.clone()))
            }
            None => Err(Error::NoSuchTrack(stream)),
        }
    }

    /// Append an entry unconditionally.
    pub fn append(&mut self, stream: u8, timestamp: u64, offset: u64) -> Result<()> {
        self.table_mut(stream)?.push(timestamp, offset);
        self.last_indexed.insert(stream, timestamp);
        Ok(())
    }

    /// Append an entry if it is the track's first, or strictly later than and
    /// at least one interval past the previously indexed timestamp. Returns
    /// whether it was kept.
    ///
    /// A repeated timestamp is never indexed, so a floor lookup always lands
    /// on the first packet carrying that timestamp.
    pub fn record(&mut self, stream: u8, timestamp: u64, offset: u64) -> Result<bool> {
        let due = match self.last_indexed.get(&stream) {
            None => true,
            Some(&last) => last < timestamp && timestamp - last >= self.interval_us,
        };
        if due {
            self.append(stream, timestamp, offset)?;
        } else if !self.tracks.contains_key(&stream) {
            return Err(Error::NoSuchTrack(stream));
        }
        Ok(due)
    }

    pub fn serialize(&self, stream: u8) -> Result<Vec<u8>> {
        match self.tracks.get(&stream) {
            Some(TrackIndex::Indexed(table)) => Ok(table.serialize()),
            Some(TrackIndex::SequentialOnly { reason }) => {
                Err(Error::seek_table_corrupt(stream, reason.clone()))
            }
            None => Err(Error::NoSuchTrack(stream)),
        }
    }

    /// Load a serialized table. A corrupt table marks the track
    /// [`TrackIndex::SequentialOnly`] and the error is returned.
    pub fn load(&mut self, stream: u8, bytes: &[u8]) -> Result<()> {
        match SeekTable::deserialize(stream, bytes) {
            Ok(table) => {
                debug!(stream, entries = table.len(), "Loaded seek table");
                self.tracks.insert(stream, TrackIndex::Indexed(table));
                Ok(())
            }
            Err(e) => {
                warn!(stream, error = %e, "Seek table unusable, track is sequential-only");
                self.mark_sequential(stream, e.to_string());
                Err(e)
            }
        }
    }

    /// Disable random access for a track.
    pub fn mark_sequential(&mut self, stream: u8, reason: impl Into<String>) {
        self.tracks.insert(
            stream,
            TrackIndex::SequentialOnly {
                reason: reason.into(),
            },
        );
    }

    /// Floor lookup: offset of the greatest entry with timestamp ≤ `target`.
    pub fn lookup(&self, stream: u8, target: u64) -> Result<u64> {
        match self.tracks.get(&stream) {
            Some(TrackIndex::Indexed(table)) => Ok(table.lookup(target)),
            Some(TrackIndex::SequentialOnly { reason }) => {
                Err(Error::seek_table_corrupt(stream, reason.clone()))
            }
            None => Err(Error::NoSuchTrack(stream)),
        }
    }

    pub fn get(&self, stream: u8) -> Option<&TrackIndex> {
        self.tracks.get(&stream)
    }

    pub fn is_indexed(&self, stream: u8) -> bool {
        matches!(self.tracks.get(&stream), Some(TrackIndex::Indexed(_)))
    }

    pub fn contains(&self, stream: u8) -> bool {
        self.tracks.contains_key(&stream)
    }

    /// Registered stream indices in ascending order.
    pub fn tracks(&self) -> impl Iterator<Item = u8> + '_ {
        self.tracks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_table() -> SeekTable {
        [(0, 0), (1000, 120), (2000, 450), (5000, 900)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_floor_lookup() {
        let table = reference_table();
        assert_eq!(table.lookup(3000), 450);
        assert_eq!(table.lookup(500), 0);
        assert_eq!(table.lookup(10_000), 900);
        assert_eq!(table.lookup(2000), 450);
        assert_eq!(table.lookup(1999), 120);
    }

    #[test]
    fn test_lookup_before_first_entry() {
        let table: SeekTable = [(400, 64), (800, 128)].into_iter().collect();
        assert_eq!(table.lookup(100), 0);
        assert_eq!(SeekTable::new().lookup(100), 0);
    }

    #[test]
    fn test_lookup_with_repeated_timestamps() {
        let table: SeekTable = [(0, 0), (100, 10), (100, 20), (200, 30)].into_iter().collect();
        assert_eq!(table.lookup(100), 20);
        assert_eq!(table.lookup(150), 20);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let table = reference_table();
        let bytes = table.serialize();
        assert_eq!(bytes.len(), 4 * RECORD_SIZE);
        assert_eq!(&bytes[16..24], &1000u64.to_le_bytes());
        assert_eq!(SeekTable::deserialize(0, &bytes).unwrap(), table);
    }

    #[test]
    fn test_deserialize_rejects_misaligned() {
        let mut bytes = reference_table().serialize();
        bytes.pop();
        assert!(matches!(
            SeekTable::deserialize(3, &bytes),
            Err(Error::SeekTableCorrupt { stream: 3, .. })
        ));
    }

    #[test]
    fn test_deserialize_rejects_non_monotonic() {
        let table: SeekTable = [(1000, 0), (500, 10)].into_iter().collect();
        assert!(SeekTable::deserialize(0, &table.serialize()).is_err());

        let table: SeekTable = [(0, 100), (500, 10)].into_iter().collect();
        assert!(SeekTable::deserialize(0, &table.serialize()).is_err());
    }

    #[test]
    fn test_manager_unknown_track() {
        let mut manager = SeekTableManager::new();
        assert!(matches!(manager.lookup(4, 0), Err(Error::NoSuchTrack(4))));
        assert!(matches!(manager.append(4, 0, 0), Err(Error::NoSuchTrack(4))));
        assert!(matches!(manager.record(4, 0, 0), Err(Error::NoSuchTrack(4))));
    }

    #[test]
    fn test_manager_record_sampling() {
        let mut manager = SeekTableManager::with_interval(1000);
        manager.register(1);
        assert!(manager.record(1, 0, 0).unwrap());
        assert!(!manager.record(1, 400, 50).unwrap());
        assert!(!manager.record(1, 999, 90).unwrap());
        assert!(manager.record(1, 1000, 130).unwrap());
        assert!(manager.record(1, 2500, 200).unwrap());

        assert_eq!(manager.lookup(1, 1500).unwrap(), 130);
        assert_eq!(manager.lookup(1, 999).unwrap(), 0);
    }

    #[test]
    fn test_manager_interval_zero_indexes_each_distinct_timestamp() {
        let mut manager = SeekTableManager::with_interval(0);
        manager.register(0);
        let kept: Vec<bool> = [0u64, 0, 10, 10, 20]
            .into_iter()
            .enumerate()
            .map(|(i, ts)| manager.record(0, ts, i as u64 * 10).unwrap())
            .collect();
        assert_eq!(kept, vec![true, false, true, false, true]);
        assert_eq!(manager.serialize(0).unwrap().len(), 3 * RECORD_SIZE);

        // Floor lookups land on the first record of a repeated timestamp.
        assert_eq!(manager.lookup(0, 10).unwrap(), 20);
        assert_eq!(manager.lookup(0, 0).unwrap(), 0);
    }

    #[test]
    fn test_manager_record_skips_repeats_after_gap() {
        let mut manager = SeekTableManager::with_interval(100);
        manager.register(2);
        assert!(manager.record(2, 0, 0).unwrap());
        assert!(manager.record(2, 500, 40).unwrap());
        assert!(!manager.record(2, 500, 80).unwrap());
        assert!(!manager.record(2, 500, 120).unwrap());
        assert_eq!(manager.lookup(2, 500).unwrap(), 40);
    }

    #[test]
    fn test_manager_load_corrupt_degrades_track() {
        let mut manager = SeekTableManager::new();
        manager.load(0, &reference_table().serialize()).unwrap();
        assert!(manager.load(1, &[0u8; 7]).is_err());

        assert!(manager.is_indexed(0));
        assert!(!manager.is_indexed(1));
        assert!(manager.contains(1));
        assert_eq!(manager.lookup(0, 3000).unwrap(), 450);
        assert!(matches!(
            manager.lookup(1, 3000),
            Err(Error::SeekTableCorrupt { stream: 1, .. })
        ));
        assert_eq!(manager.tracks().collect::<Vec<_>>(), vec![0, 1]);
    }
}
