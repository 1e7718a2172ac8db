//! Error types for moeplex-container.

use std::io;
use thiserror::Error;

/// Result type for moeplex-container operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for moeplex-container operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed DER in the metadata header, including integers outside
    /// their declared range and unknown enumerated values.
    #[error("Header encoding error: {reason}")]
    Encoding { reason: String },

    /// A track's seek table could not be used.
    #[error("Seek table for stream {stream} is corrupt: {reason}")]
    SeekTableCorrupt { stream: u8, reason: String },

    /// Compression mode code not recognised.
    #[error("Unsupported compression mode: {0}")]
    UnsupportedCompressionMode(u8),

    /// Compressing a payload failed.
    #[error("Compression failed: {0}")]
    Compression(String),

    /// Compressed data was corrupt or truncated.
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// A declared length exceeds the bytes available.
    #[error("Truncated input: need {need} bytes, have {have}")]
    Truncated { need: u64, have: u64 },

    /// Count-prefixed collection would overflow its single-byte count.
    #[error("Too many {what}: {count} (max 255)")]
    TooManyEntries { what: &'static str, count: usize },

    /// Side data value longer than its single-byte length prefix allows.
    #[error("Side data value for {key} is {len} bytes (max 255)")]
    ValueTooLong { key: String, len: usize },

    /// Side data key that is not four printable ASCII bytes.
    #[error("Invalid side data key: {0:?}")]
    InvalidKey(Vec<u8>),

    /// Stream index not declared in the container metadata.
    #[error("No such track: {0}")]
    NoSuchTrack(u8),

    /// Stream index declared twice.
    #[error("Duplicate track index: {0}")]
    DuplicateTrack(u8),

    /// Track metadata violating a container invariant.
    #[error("Invalid track {index}: {reason}")]
    InvalidTrack { index: u8, reason: String },

    /// Tracks cannot be added once the header is frozen.
    #[error("Metadata is frozen once the header has been written")]
    MetadataFrozen,

    /// Operation not valid in the current state.
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Packet timestamp went backwards within one track.
    #[error("Non-monotonic timestamp on stream {stream}: {timestamp} after {previous}")]
    NonMonotonic {
        stream: u8,
        previous: u64,
        timestamp: u64,
    },

    /// Structurally invalid packet record.
    #[error("Corrupt packet record at offset {offset}: {reason}")]
    CorruptPacket { offset: u64, reason: String },

    /// Failure while reading one packet, with its position in the packet region.
    /// `stream` is unknown when the record header itself could not be read.
    #[error(
        "Packet error at offset {offset}{}: {source}",
        .stream.map(|s| format!(" on stream {s}")).unwrap_or_default()
    )]
    Packet {
        stream: Option<u8>,
        offset: u64,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a header encoding error.
    pub fn encoding(reason: impl std::fmt::Display) -> Self {
        Self::Encoding {
            reason: reason.to_string(),
        }
    }

    /// Create a decompression error.
    pub fn decompression(reason: impl std::fmt::Display) -> Self {
        Self::Decompression(reason.to_string())
    }

    /// Create a corrupt seek table error.
    pub fn seek_table_corrupt(stream: u8, reason: impl Into<String>) -> Self {
        Self::SeekTableCorrupt {
            stream,
            reason: reason.into(),
        }
    }

    /// Attach packet position context.
    pub fn in_packet(self, stream: Option<u8>, offset: u64) -> Self {
        Self::Packet {
            stream,
            offset,
            source: Box::new(self),
        }
    }

    /// Whether this error invalidates the whole container when it occurs in the header.
    pub fn is_fatal_to_container(&self) -> bool {
        matches!(
            self,
            Self::Encoding { .. } | Self::Truncated { .. } | Self::DuplicateTrack(_)
        )
    }

    /// Whether this is an interrupted or timed out read that may be retried.
    pub fn is_recoverable_io(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            Self::Packet { source, .. } => source.is_recoverable_io(),
            _ => false,
        }
    }
}
