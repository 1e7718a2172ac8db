//! Demultiplexer: random access and sequential reads of a container.

mod index;

pub use index::ContainerIndex;

use crate::config::{DecompressionErrorPolicy, DemuxConfig};
use crate::packet::{Packet, PacketHeader, PacketRecord};
use crate::wire;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Demultiplexer lifecycle after [`Demultiplexer::open`].
///
/// Reading the header and the seek tables happens inside `open`; a failure
/// there yields no demultiplexer at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxState {
    /// Header and seek tables decoded, no packet read yet.
    IndexReady,
    /// Reading packets in container order.
    Streaming,
    /// Positioned by [`Demultiplexer::seek`].
    Seeking,
}

impl fmt::Display for DemuxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IndexReady => "index ready",
            Self::Streaming => "streaming",
            Self::Seeking => "seeking",
        })
    }
}

/// One cursor over a container. The decoded index is shared with every
/// reader created through [`Demultiplexer::reader`].
pub struct Demultiplexer<R> {
    source: R,
    index: Arc<ContainerIndex>,
    config: DemuxConfig,
    /// Next record offset, relative to the packet region.
    cursor: u64,
    /// Whether `source` may not be positioned at `cursor`.
    needs_reposition: bool,
    state: DemuxState,
    last_sequence: BTreeMap<u8, u64>,
}

impl Demultiplexer<BufReader<File>> {
    /// Open a container file.
    pub fn open_path<P: AsRef<Path>>(path: P, config: DemuxConfig) -> Result<Self> {
        let file = File::open(path)?;
        Self::open(BufReader::new(file), config)
    }
}

impl<R: Read + Seek> Demultiplexer<R> {
    /// Read the header and seek tables.
    pub fn open(mut source: R, config: DemuxConfig) -> Result<Self> {
        let index = ContainerIndex::read_from(&mut source)?;
        info!(
            format = %index.format().format_name,
            tracks = index.format().tracks.len(),
            sequential_only = index.sequential_only().count(),
            packet_bytes = index.packet_region_len(),
            "Container opened"
        );
        Ok(Self::from_parts(source, Arc::new(index), config))
    }

    pub fn open_default(source: R) -> Result<Self> {
        Self::open(source, DemuxConfig::default())
    }

    /// Reader over `source` using an index decoded earlier from the same container.
    pub fn with_index(mut source: R, index: Arc<ContainerIndex>, config: DemuxConfig) -> Result<Self> {
        let len = source.seek(SeekFrom::End(0))?;
        let end = index.packet_region().end;
        if len < end {
            return Err(Error::Truncated { need: end, have: len });
        }
        Ok(Self::from_parts(source, index, config))
    }

    fn from_parts(source: R, index: Arc<ContainerIndex>, config: DemuxConfig) -> Self {
        Self {
            source,
            index,
            config,
            cursor: 0,
            needs_reposition: true,
            state: DemuxState::IndexReady,
            last_sequence: BTreeMap::new(),
        }
    }

    /// Another reader with its own cursor over a second handle to the same container.
    pub fn reader<S: Read + Seek>(&self, source: S) -> Result<Demultiplexer<S>> {
        Demultiplexer::with_index(source, Arc::clone(&self.index), self.config.clone())
    }

    pub fn index(&self) -> &Arc<ContainerIndex> {
        &self.index
    }

    pub fn format(&self) -> &crate::metadata::FormatData {
        self.index.format()
    }

    pub fn state(&self) -> DemuxState {
        self.state
    }

    /// Current offset within the packet region.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Go back to the first packet.
    pub fn rewind(&mut self) {
        self.reposition(0);
        self.state = DemuxState::Streaming;
    }

    fn reposition(&mut self, offset: u64) {
        self.cursor = offset;
        self.needs_reposition = true;
        self.last_sequence.clear();
    }

    fn region_len(&self) -> u64 {
        self.index.packet_region_len()
    }

    /// Read the record header at the cursor without consuming it.
    fn read_header(&mut self) -> Result<PacketHeader> {
        let start = self.cursor;
        if self.needs_reposition {
            let absolute = self.index.packet_region().start + start;
            self.source.seek(SeekFrom::Start(absolute))?;
            self.needs_reposition = false;
        }

        let remaining = self.region_len() - start;
        let mut reader = (&mut self.source).take(remaining);
        let header = PacketHeader::read_from(&mut reader, start)?;
        let available = remaining - header.encoded_len() as u64;
        if header.payload_len > available {
            return Err(Error::Truncated {
                need: header.payload_len,
                have: available,
            });
        }
        Ok(header)
    }

    /// Read the full record at the cursor and advance past it.
    fn read_record(&mut self) -> Result<(PacketHeader, Vec<u8>)> {
        let start = self.cursor;
        let header = self.read_header()?;
        if header.payload_len > self.config.max_payload_len {
            return Err(Error::CorruptPacket {
                offset: start,
                reason: format!(
                    "payload of {} bytes exceeds limit {}",
                    header.payload_len, self.config.max_payload_len
                ),
            });
        }
        let stored = wire::read_vec(&mut self.source, header.payload_len, header.payload_len)?;
        self.cursor = start + header.record_len();
        Ok((header, stored))
    }

    /// Next packet in container order, or `None` at the end of the packet region.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        Ok(self.next_record()?.map(|record| record.packet))
    }

    /// Like [`next_packet`](Self::next_packet), with the record's position and sequence.
    pub fn next_record(&mut self) -> Result<Option<PacketRecord>> {
        self.state = DemuxState::Streaming;
        loop {
            if self.cursor >= self.region_len() {
                return Ok(None);
            }
            let start = self.cursor;

            let (header, stored) = match self.read_record() {
                Ok(record) => record,
                Err(e) => {
                    self.cursor = start;
                    self.needs_reposition = true;
                    return Err(e.in_packet(None, start));
                }
            };

            match self.decode_payload(&header, &stored, start) {
                Ok(payload) => {
                    self.check_sequence(&header);
                    trace!(
                        stream = header.stream,
                        timestamp = header.timestamp,
                        offset = start,
                        "Packet read"
                    );
                    return Ok(Some(PacketRecord {
                        offset: start,
                        sequence: header.sequence,
                        stored_len: header.payload_len,
                        packet: Packet {
                            stream: header.stream,
                            timestamp: header.timestamp,
                            duration: header.duration,
                            side_data: header.side_data,
                            payload,
                        },
                    }));
                }
                Err(e) => match self.config.on_decompression_error {
                    DecompressionErrorPolicy::Abort => return Err(e),
                    DecompressionErrorPolicy::Skip => {
                        warn!(error = %e, "Skipping unreadable packet");
                    }
                },
            }
        }
    }

    fn decode_payload(&self, header: &PacketHeader, stored: &[u8], offset: u64) -> Result<Vec<u8>> {
        let codec = self
            .index
            .codec(header.stream)
            .ok_or(Error::NoSuchTrack(header.stream))
            .map_err(|e| e.in_packet(Some(header.stream), offset))?;
        codec
            .decompress(stored, self.config.max_payload_len)
            .map_err(|e| e.in_packet(Some(header.stream), offset))
    }

    fn check_sequence(&mut self, header: &PacketHeader) {
        if let Some(previous) = self.last_sequence.insert(header.stream, header.sequence) {
            if header.sequence != previous + 1 {
                debug!(
                    stream = header.stream,
                    expected = previous + 1,
                    found = header.sequence,
                    "Sequence gap"
                );
            }
        }
    }

    /// Position the cursor at the first packet of `stream` with a timestamp
    /// at or after `timestamp`, returning that packet's timestamp.
    ///
    /// The seek table narrows the search; the remainder is a forward scan
    /// over record headers. Tracks without a usable table are scanned from
    /// the start of the packet region. `None` means no such packet exists and
    /// the cursor is at the end.
    pub fn seek(&mut self, stream: u8, timestamp: u64) -> Result<Option<u64>> {
        if self.index.format().track(stream).is_none() {
            return Err(Error::NoSuchTrack(stream));
        }
        self.state = DemuxState::Seeking;

        let start = match self.index.seek_tables().lookup(stream, timestamp) {
            Ok(offset) if offset <= self.region_len() => offset,
            Ok(offset) => {
                warn!(stream, offset, "Seek table points past the packet region, scanning");
                0
            }
            Err(e) => {
                warn!(stream, error = %e, "No usable seek table, scanning from the start");
                0
            }
        };
        debug!(stream, timestamp, start, "Seeking");
        self.reposition(start);

        loop {
            if self.cursor >= self.region_len() {
                return Ok(None);
            }
            let record_start = self.cursor;
            let header = match self.read_header() {
                Ok(header) => header,
                Err(e) => {
                    self.cursor = record_start;
                    self.needs_reposition = true;
                    return Err(e.in_packet(None, record_start));
                }
            };
            if header.stream == stream && header.timestamp >= timestamp {
                self.reposition(record_start);
                return Ok(Some(header.timestamp));
            }
            self.cursor = record_start + header.record_len();
            self.needs_reposition = true;
        }
    }

    /// Iterate over the remaining packets. Iteration stops after the first error.
    pub fn packets(&mut self) -> Packets<'_, R> {
        Packets {
            demux: self,
            failed: false,
        }
    }
}

impl<R> fmt::Debug for Demultiplexer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Demultiplexer")
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("tracks", &self.index.format().tracks.len())
            .finish()
    }
}

/// Iterator returned by [`Demultiplexer::packets`].
pub struct Packets<'a, R> {
    demux: &'a mut Demultiplexer<R>,
    failed: bool,
}

impl<R: Read + Seek> Iterator for Packets<'_, R> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.demux.next_packet().transpose();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}
