//! Packets and their framing in the packet region.
//!
//! Record layout (little-endian):
//!
//! ```text
//! u8   stream index
//! u64  sequence       (1-based, per track)
//! u64  timestamp      (µs)
//! u64  duration       (µs)
//! u8   flags          (bit 0: side data follows)
//! [side data table]
//! u64  payload length
//! payload
//! ```

use crate::side_data::SideData;
use crate::wire;
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::io::Read;
use std::time::Duration;

const FLAG_SIDE_DATA: u8 = 0x01;

/// Length of a record header without side data, payload length included.
pub const FIXED_HEADER_LEN: usize = 1 + 8 + 8 + 8 + 1 + 8;

/// One unit of track data.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Packet {
    pub stream: u8,
    /// Presentation timestamp in microseconds.
    pub timestamp: u64,
    /// Display duration in microseconds.
    pub duration: u64,
    pub side_data: Option<SideData>,
    /// Uncompressed payload.
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(stream: u8, timestamp: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            stream,
            timestamp,
            duration: 0,
            side_data: None,
            payload: payload.into(),
        }
    }

    pub fn with_duration(mut self, duration: u64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_side_data(mut self, side_data: SideData) -> Self {
        self.side_data = Some(side_data);
        self
    }

    pub fn presentation_time(&self) -> Duration {
        Duration::from_micros(self.timestamp)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stream {} @ {} (+{}) {} bytes",
            self.stream,
            FormatDuration::from_micros(self.timestamp),
            FormatDuration::from_micros(self.duration),
            self.payload.len()
        )?;
        if let Some(side_data) = &self.side_data {
            write!(f, " {side_data}")?;
        }
        Ok(())
    }
}

/// Framing of one record ahead of its stored payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub stream: u8,
    pub sequence: u64,
    pub timestamp: u64,
    pub duration: u64,
    pub side_data: Option<SideData>,
    /// Length of the payload as stored (after compression).
    pub payload_len: u64,
}

impl PacketHeader {
    /// Header for `packet` whose stored payload is `payload_len` bytes.
    pub fn for_packet(packet: &Packet, sequence: u64, payload_len: u64) -> Self {
        Self {
            stream: packet.stream,
            sequence,
            timestamp: packet.timestamp,
            duration: packet.duration,
            side_data: packet.side_data.clone(),
            payload_len,
        }
    }

    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_LEN + self.side_data.as_ref().map_or(0, SideData::encoded_len)
    }

    /// Total record length including the payload.
    pub fn record_len(&self) -> u64 {
        self.encoded_len() as u64 + self.payload_len
    }

    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(self.encoded_len());
        buf.put_u8(self.stream);
        buf.put_u64_le(self.sequence);
        buf.put_u64_le(self.timestamp);
        buf.put_u64_le(self.duration);
        match &self.side_data {
            Some(side_data) => {
                buf.put_u8(FLAG_SIDE_DATA);
                side_data.write_to(buf)?;
            }
            None => buf.put_u8(0),
        }
        buf.put_u64_le(self.payload_len);
        Ok(())
    }

    /// Read a header. `offset` is the record position, used for error context.
    pub fn read_from<R: Read>(reader: &mut R, offset: u64) -> Result<Self> {
        let stream = wire::read_u8(reader)?;
        let sequence = wire::read_u64(reader)?;
        let timestamp = wire::read_u64(reader)?;
        let duration = wire::read_u64(reader)?;
        let flags = wire::read_u8(reader)?;
        if flags & !FLAG_SIDE_DATA != 0 {
            return Err(Error::CorruptPacket {
                offset,
                reason: format!("unknown flags {flags:#04x}"),
            });
        }
        let side_data = if flags & FLAG_SIDE_DATA != 0 {
            Some(SideData::read_from(reader)?)
        } else {
            None
        };
        let payload_len = wire::read_u64(reader)?;

        Ok(Self {
            stream,
            sequence,
            timestamp,
            duration,
            side_data,
            payload_len,
        })
    }
}

/// A packet read back from a container with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    /// Record offset within the packet region.
    pub offset: u64,
    /// Per-track sequence number assigned by the multiplexer.
    pub sequence: u64,
    /// Stored payload length.
    pub stored_len: u64,
    pub packet: Packet,
}

/// `HH:MM:SS.mmm` rendering of a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDuration(pub Duration);

impl FormatDuration {
    pub fn from_micros(micros: u64) -> Self {
        Self(Duration::from_micros(micros))
    }
}

impl fmt::Display for FormatDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            self.0.subsec_millis()
        )
    }
}
