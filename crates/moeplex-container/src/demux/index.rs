//! Read-only container index shared between readers.

use crate::compression::TrackCodec;
use crate::metadata::FormatData;
use crate::seek::{SeekTableManager, TrackIndex};
use crate::wire;
use crate::Result;
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use tracing::{debug, warn};

/// Everything decoded ahead of the packet region.
#[derive(Debug, Clone)]
pub struct ContainerIndex {
    format: FormatData,
    seek: SeekTableManager,
    codecs: BTreeMap<u8, TrackCodec>,
    header_len: u64,
    packet_region: Range<u64>,
}

impl ContainerIndex {
    /// Read header and seek tables from the start of `source`.
    ///
    /// A malformed header or a declared length running past the end of the
    /// source is fatal. A corrupt seek table only degrades its track.
    pub fn read_from<R: Read + Seek>(source: &mut R) -> Result<Self> {
        let total_len = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        let header_len = wire::read_u64(source)?;
        let header = wire::read_vec(source, header_len, total_len.saturating_sub(8))?;
        let format = FormatData::decode(&header)?;
        debug!(
            format = %format.format_name,
            encoder = %format.encoder,
            tracks = format.tracks.len(),
            header_len,
            "Header read"
        );

        let mut pos = 8 + header_len;
        let count = wire::read_u8(source)?;
        pos += 1;

        let mut seek = SeekTableManager::new();
        for _ in 0..count {
            let stream = wire::read_u8(source)?;
            let table_len = wire::read_u64(source)?;
            pos += 9;
            let table = wire::read_vec(source, table_len, total_len.saturating_sub(pos))?;
            pos += table_len;

            if format.track(stream).is_none() {
                warn!(stream, "Seek table for undeclared stream ignored");
                continue;
            }
            if seek.contains(stream) {
                warn!(stream, "Duplicate seek table ignored");
                continue;
            }
            // A corrupt table is logged and leaves the track sequential-only.
            let _ = seek.load(stream, &table);
        }

        for track in &format.tracks {
            if !seek.contains(track.index) {
                debug!(stream = track.index, "No seek table, track is sequential-only");
                seek.mark_sequential(track.index, "no seek table");
            }
        }

        let codecs = format
            .tracks
            .iter()
            .map(|t| (t.index, TrackCodec::from_stream(t)))
            .collect();

        Ok(Self {
            format,
            seek,
            codecs,
            header_len,
            packet_region: pos..total_len,
        })
    }

    pub fn format(&self) -> &FormatData {
        &self.format
    }

    pub fn seek_tables(&self) -> &SeekTableManager {
        &self.seek
    }

    pub fn track_index(&self, stream: u8) -> Option<&TrackIndex> {
        self.seek.get(stream)
    }

    pub fn codec(&self, stream: u8) -> Option<&TrackCodec> {
        self.codecs.get(&stream)
    }

    pub fn header_len(&self) -> u64 {
        self.header_len
    }

    /// Absolute byte range of the packet region within the source.
    pub fn packet_region(&self) -> Range<u64> {
        self.packet_region.clone()
    }

    pub fn packet_region_len(&self) -> u64 {
        self.packet_region.end - self.packet_region.start
    }

    /// Tracks whose seek table could not be used.
    pub fn sequential_only(&self) -> impl Iterator<Item = u8> + '_ {
        self.format
            .tracks
            .iter()
            .map(|t| t.index)
            .filter(|&index| !self.seek.is_indexed(index))
    }
}
