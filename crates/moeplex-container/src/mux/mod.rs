//! Multiplexer: merges per-track packet streams into one container.
//!
//! Packets are interleaved, compressed and framed into a spool. Once every
//! packet has its final offset, [`Multiplexer::finalize`] writes the header,
//! the seek tables and then the spooled packet region.

mod interleave;
mod session;
mod spool;

pub use session::{TrackChannels, TrackProducer};

use crate::compression::TrackCodec;
use crate::config::MuxConfig;
use crate::metadata::{FormatData, Stream};
use crate::packet::{Packet, PacketHeader};
use crate::seek::SeekTableManager;
use crate::{Error, Result};
use bytes::BytesMut;
use interleave::Interleaver;
use rayon::prelude::*;
use spool::Spool;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use tracing::{debug, info, trace, warn};

/// Maximum tracks per container; the seek table count is a single byte.
pub const MAX_TRACKS: usize = u8::MAX as usize;

/// Multiplexer lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MuxState {
    /// Accepting tracks.
    Empty,
    /// Metadata frozen and encoded; accepting packets.
    HeaderWritten,
    SeekTablesWritten,
    WritingPackets,
    Finalized,
    /// Compression or framing failed part way. Terminal: the spooled packet
    /// region can no longer be completed.
    Failed,
}

impl MuxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::HeaderWritten => "header written",
            Self::SeekTablesWritten => "seek tables written",
            Self::WritingPackets => "writing packets",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MuxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sizes of a finalized container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxSummary {
    pub header_len: u64,
    pub seek_tables: usize,
    pub packets: u64,
    pub packet_region_len: u64,
    pub total_len: u64,
}

pub struct Multiplexer {
    config: MuxConfig,
    state: MuxState,
    format: FormatData,
    header: Vec<u8>,
    codecs: BTreeMap<u8, TrackCodec>,
    interleaver: Interleaver,
    seek_tables: SeekTableManager,
    spool: Option<Spool>,
    sequences: BTreeMap<u8, u64>,
    last_timestamps: BTreeMap<u8, u64>,
    batch: Vec<Packet>,
    packets_written: u64,
}

impl Multiplexer {
    pub fn new(format_name: impl Into<String>, encoder: impl Into<String>, config: MuxConfig) -> Self {
        Self {
            interleaver: Interleaver::new(config.interleave, config.queue_capacity),
            seek_tables: SeekTableManager::with_interval(config.seek_interval_us),
            config,
            state: MuxState::Empty,
            format: FormatData::new(format_name, encoder),
            header: Vec::new(),
            codecs: BTreeMap::new(),
            spool: None,
            sequences: BTreeMap::new(),
            last_timestamps: BTreeMap::new(),
            batch: Vec::new(),
            packets_written: 0,
        }
    }

    /// Multiplexer pre-populated with every track of `format`.
    pub fn from_format(format: FormatData, config: MuxConfig) -> Result<Self> {
        let mut mux = Self::new(format.format_name, format.encoder, config);
        for track in format.tracks {
            mux.add_track(track)?;
        }
        Ok(mux)
    }

    pub fn state(&self) -> MuxState {
        self.state
    }

    pub fn format(&self) -> &FormatData {
        &self.format
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Seek tables accumulated so far.
    pub fn seek_tables(&self) -> &SeekTableManager {
        &self.seek_tables
    }

    /// Declare a track. Only allowed before the header is written.
    pub fn add_track(&mut self, stream: Stream) -> Result<()> {
        if self.state != MuxState::Empty {
            return Err(Error::MetadataFrozen);
        }
        if self.format.track(stream.index).is_some() {
            return Err(Error::DuplicateTrack(stream.index));
        }
        if self.format.tracks.len() >= MAX_TRACKS {
            return Err(Error::TooManyEntries {
                what: "tracks",
                count: self.format.tracks.len() + 1,
            });
        }
        stream.validate()?;

        debug!(
            stream = stream.index,
            name = %stream.name,
            compression = %stream.compression_mode,
            "Track added"
        );
        self.codecs.insert(
            stream.index,
            TrackCodec::from_stream(&stream).with_level(self.config.compression_level),
        );
        self.interleaver.register(stream.index);
        self.format.tracks.push(stream);
        Ok(())
    }

    /// Freeze the metadata and encode the header. Emission happens in
    /// [`finalize`](Self::finalize).
    pub fn write_header(&mut self) -> Result<()> {
        self.expect_state(MuxState::Empty, "write the header")?;

        self.header = self.format.encode()?;
        for track in &self.format.tracks {
            self.seek_tables.register(track.index);
        }
        self.spool = Some(Spool::new(self.config.spool)?);
        self.state = MuxState::HeaderWritten;

        debug!(
            tracks = self.format.tracks.len(),
            header_len = self.header.len(),
            spool = ?self.config.spool,
            "Header frozen"
        );
        Ok(())
    }

    fn expect_state(&self, expected: MuxState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }

    fn ensure_header(&mut self) -> Result<()> {
        if self.state == MuxState::Empty {
            self.write_header()?;
        }
        Ok(())
    }

    /// Queue a packet. The header is frozen on the first packet if needed.
    pub fn push(&mut self, packet: Packet) -> Result<()> {
        self.ensure_header()?;
        self.expect_state(MuxState::HeaderWritten, "push a packet")?;

        if !self.codecs.contains_key(&packet.stream) {
            return Err(Error::NoSuchTrack(packet.stream));
        }
        if let Some(&previous) = self.last_timestamps.get(&packet.stream) {
            if packet.timestamp < previous {
                return Err(Error::NonMonotonic {
                    stream: packet.stream,
                    previous,
                    timestamp: packet.timestamp,
                });
            }
        }
        if let Some(side_data) = &packet.side_data {
            side_data.validate()?;
        }

        let (stream, timestamp) = (packet.stream, packet.timestamp);
        self.interleaver.enqueue(packet)?;
        self.last_timestamps.insert(stream, timestamp);
        self.pump()
    }

    /// Mark a track as finished so it no longer holds back the others.
    pub fn close_track(&mut self, stream: u8) -> Result<()> {
        self.ensure_header()?;
        self.expect_state(MuxState::HeaderWritten, "close a track")?;
        self.interleaver.close(stream)?;
        debug!(stream, "Track closed");
        self.pump()
    }

    /// Move every releasable packet into the compression batch.
    fn pump(&mut self) -> Result<()> {
        while let Some(packet) = self.interleaver.pop_ready() {
            self.stage(packet)?;
        }
        Ok(())
    }

    fn stage(&mut self, packet: Packet) -> Result<()> {
        self.batch.push(packet);
        if self.batch.len() >= self.config.batch_size.max(1) {
            self.flush_batch()?;
        }
        Ok(())
    }

    /// Compress the staged batch in parallel and frame it in release order.
    ///
    /// Nothing is framed unless every packet of the batch compressed. Any
    /// error moves the multiplexer to [`MuxState::Failed`].
    fn flush_batch(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let codecs = &self.codecs;
        let compressed: Result<Vec<Vec<u8>>> = self
            .batch
            .par_iter()
            .map(|packet| {
                codecs
                    .get(&packet.stream)
                    .ok_or(Error::NoSuchTrack(packet.stream))?
                    .compress(&packet.payload)
            })
            .collect();
        let payloads = compressed.map_err(|e| self.fail(e))?;

        let batch = std::mem::take(&mut self.batch);
        for (packet, payload) in batch.iter().zip(&payloads) {
            self.write_record(packet, payload).map_err(|e| self.fail(e))?;
        }
        Ok(())
    }

    fn fail(&mut self, error: Error) -> Error {
        if self.state != MuxState::Failed {
            warn!(state = %self.state, error = %error, "Multiplexer failed");
            self.state = MuxState::Failed;
        }
        error
    }

    fn write_record(&mut self, packet: &Packet, payload: &[u8]) -> Result<()> {
        let spool = self.spool.as_mut().ok_or(Error::InvalidState {
            operation: "write a packet",
            state: "no spool",
        })?;
        let offset = spool.len();
        let sequence = self.sequences.entry(packet.stream).or_insert(0);
        *sequence += 1;

        let header = PacketHeader::for_packet(packet, *sequence, payload.len() as u64);
        let mut buf = BytesMut::with_capacity(header.encoded_len());
        header.write_to(&mut buf)?;
        spool.write_all(&buf)?;
        spool.write_all(payload)?;

        let indexed = self
            .seek_tables
            .record(packet.stream, packet.timestamp, offset)?;
        self.packets_written += 1;

        trace!(
            stream = packet.stream,
            sequence = header.sequence,
            timestamp = packet.timestamp,
            offset,
            stored = payload.len(),
            indexed,
            "Packet framed"
        );
        Ok(())
    }

    /// Flush all pending packets and write the complete container to `sink`.
    ///
    /// A failure part way leaves the multiplexer in [`MuxState::Failed`].
    pub fn finalize<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<MuxSummary> {
        self.ensure_header()?;
        self.expect_state(MuxState::HeaderWritten, "finalize")?;
        self.write_container(sink).map_err(|e| self.fail(e))
    }

    fn write_container<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<MuxSummary> {
        self.interleaver.close_all();
        self.pump()?;
        self.flush_batch()?;
        debug_assert_eq!(self.interleaver.pending(), 0);

        let spool = self.spool.take().ok_or(Error::InvalidState {
            operation: "finalize",
            state: "no spool",
        })?;
        let packet_region_len = spool.len();

        sink.write_all(&(self.header.len() as u64).to_le_bytes())?;
        sink.write_all(&self.header)?;

        let tracks: Vec<u8> = self.seek_tables.tracks().collect();
        let mut seek_region_len = 1u64;
        sink.write_all(&[tracks.len() as u8])?;
        for &stream in &tracks {
            let table = self.seek_tables.serialize(stream)?;
            sink.write_all(&[stream])?;
            sink.write_all(&(table.len() as u64).to_le_bytes())?;
            sink.write_all(&table)?;
            seek_region_len += 9 + table.len() as u64;
        }
        self.state = MuxState::SeekTablesWritten;
        debug!(tables = tracks.len(), len = seek_region_len, "Seek tables written");

        self.state = MuxState::WritingPackets;
        spool.copy_into(sink)?;
        sink.flush()?;
        self.state = MuxState::Finalized;

        let header_len = self.header.len() as u64;
        let summary = MuxSummary {
            header_len,
            seek_tables: tracks.len(),
            packets: self.packets_written,
            packet_region_len,
            total_len: 8 + header_len + seek_region_len + packet_region_len,
        };
        info!(
            tracks = self.format.tracks.len(),
            packets = summary.packets,
            total_len = summary.total_len,
            "Container finalized"
        );
        Ok(summary)
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("state", &self.state)
            .field("tracks", &self.format.tracks.len())
            .field("pending", &self.interleaver.pending())
            .field("packets_written", &self.packets_written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CodecParameters, ColorMode, CompressionMode, SubtitleParameters, VideoParameters};

    fn video(index: u8) -> Stream {
        Stream::new(
            "video",
            index,
            CodecParameters::Video(VideoParameters::new(192, 108, ColorMode::Full)),
        )
    }

    fn subtitle(index: u8) -> Stream {
        Stream::new(
            "subs",
            index,
            CodecParameters::Subtitle(SubtitleParameters::new("eng", 192, 108)),
        )
    }

    fn mux() -> Multiplexer {
        let mut mux = Multiplexer::new("test", "unit", MuxConfig::default().seek_interval_us(0));
        mux.add_track(video(0)).unwrap();
        mux.add_track(subtitle(1)).unwrap();
        mux
    }

    #[test]
    fn test_state_machine() {
        let mut mux = mux();
        assert_eq!(mux.state(), MuxState::Empty);
        mux.write_header().unwrap();
        assert_eq!(mux.state(), MuxState::HeaderWritten);
        assert!(matches!(mux.add_track(video(2)), Err(Error::MetadataFrozen)));
        assert!(matches!(mux.write_header(), Err(Error::InvalidState { .. })));

        let mut out = Vec::new();
        mux.finalize(&mut out).unwrap();
        assert_eq!(mux.state(), MuxState::Finalized);
        assert!(matches!(
            mux.push(Packet::new(0, 0, vec![])),
            Err(Error::InvalidState { state: "finalized", .. })
        ));
        assert!(matches!(mux.finalize(&mut out), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_first_push_freezes_metadata() {
        let mut mux = mux();
        mux.push(Packet::new(0, 0, vec![1])).unwrap();
        assert_eq!(mux.state(), MuxState::HeaderWritten);
        assert!(matches!(mux.add_track(video(5)), Err(Error::MetadataFrozen)));
    }

    #[test]
    fn test_add_track_validation() {
        let mut mux = mux();
        assert!(matches!(mux.add_track(subtitle(0)), Err(Error::DuplicateTrack(0))));
        let bad = video(3).compression(CompressionMode::None, Some(vec![1, 2, 3]));
        assert!(matches!(mux.add_track(bad), Err(Error::InvalidTrack { index: 3, .. })));
    }

    #[test]
    fn test_track_limit() {
        let mut mux = Multiplexer::new("test", "unit", MuxConfig::default());
        for index in 0..=254u8 {
            mux.add_track(subtitle(index)).unwrap();
        }
        assert!(matches!(
            mux.add_track(subtitle(255)),
            Err(Error::TooManyEntries { what: "tracks", count: 256 })
        ));
    }

    #[test]
    fn test_push_errors() {
        let mut mux = mux();
        assert!(matches!(mux.push(Packet::new(9, 0, vec![])), Err(Error::NoSuchTrack(9))));
        mux.push(Packet::new(0, 100, vec![])).unwrap();
        assert!(matches!(
            mux.push(Packet::new(0, 50, vec![])),
            Err(Error::NonMonotonic { stream: 0, previous: 100, timestamp: 50 })
        ));
        // Equal timestamps are allowed.
        mux.push(Packet::new(0, 100, vec![])).unwrap();
    }

    #[test]
    fn test_rejected_push_leaves_timestamp_untouched() {
        let mut mux = mux();
        mux.close_track(0).unwrap();
        assert!(matches!(
            mux.push(Packet::new(0, 500, vec![1])),
            Err(Error::InvalidState { .. })
        ));
        assert!(mux.last_timestamps.get(&0).is_none());

        mux.push(Packet::new(1, 300, vec![2])).unwrap();
        assert!(mux.push(Packet::new(1, 200, vec![3])).is_err());
        assert_eq!(mux.last_timestamps.get(&1), Some(&300));
    }

    #[test]
    fn test_compression_failure_frames_nothing() {
        let mut mux = mux();
        mux.write_header().unwrap();
        // A packet with no codec fails in the middle of the batch.
        mux.batch = vec![
            Packet::new(0, 0, b"first".to_vec()),
            Packet::new(9, 10, b"orphan".to_vec()),
            Packet::new(0, 20, b"last".to_vec()),
        ];

        assert!(matches!(mux.flush_batch(), Err(Error::NoSuchTrack(9))));
        assert_eq!(mux.state(), MuxState::Failed);
        assert_eq!(mux.packets_written, 0);
        assert_eq!(mux.spool.as_ref().map(|s| s.len()), Some(0));
        assert!(mux.seek_tables().get(0).and_then(|t| t.table()).unwrap().is_empty());

        assert!(matches!(
            mux.push(Packet::new(1, 0, vec![])),
            Err(Error::InvalidState { state: "failed", .. })
        ));
        let mut out = Vec::new();
        assert!(matches!(
            mux.finalize(&mut out),
            Err(Error::InvalidState { state: "failed", .. })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_container_layout() {
        let mut mux = mux();
        mux.push(Packet::new(0, 0, b"frame0".to_vec())).unwrap();
        mux.push(Packet::new(1, 0, b"sub0".to_vec())).unwrap();
        mux.push(Packet::new(0, 40_000, b"frame1".to_vec())).unwrap();

        let mut out = Vec::new();
        let summary = mux.finalize(&mut out).unwrap();
        assert_eq!(summary.total_len, out.len() as u64);
        assert_eq!(summary.packets, 3);
        assert_eq!(summary.seek_tables, 2);

        let header_len = u64::from_le_bytes(out[..8].try_into().unwrap());
        assert_eq!(header_len, summary.header_len);
        let header = &out[8..8 + header_len as usize];
        assert_eq!(FormatData::decode(header).unwrap(), *mux.format());

        let seek = 8 + header_len as usize;
        assert_eq!(out[seek], 2);
        assert_eq!(out[seek + 1], 0);
        let table_len = u64::from_le_bytes(out[seek + 2..seek + 10].try_into().unwrap());
        assert_eq!(table_len, 32);

        // First record belongs to stream 0 (tie on timestamp 0 goes to the lower index).
        let region = out.len() - summary.packet_region_len as usize;
        assert_eq!(out[region], 0);
    }

    #[test]
    fn test_seek_interval_sampling() {
        let mut mux = Multiplexer::new("test", "unit", MuxConfig::default());
        mux.add_track(video(0)).unwrap();
        for i in 0..25u64 {
            mux.push(Packet::new(0, i * 40_000, vec![0; 8])).unwrap();
        }
        let mut out = Vec::new();
        mux.finalize(&mut out).unwrap();
        // 0, 120ms, 240ms, ... , 960ms
        let table = mux.seek_tables().get(0).and_then(|t| t.table()).unwrap();
        assert_eq!(table.len(), 9);
        assert_eq!(table.entries()[1].timestamp, 120_000);
    }

    #[test]
    fn test_empty_container() {
        let mut mux = Multiplexer::new("empty", "unit", MuxConfig::default());
        let mut out = Vec::new();
        let summary = mux.finalize(&mut out).unwrap();
        assert_eq!(summary.packets, 0);
        assert_eq!(summary.seek_tables, 0);
        assert_eq!(out.len() as u64, summary.total_len);
    }
}
