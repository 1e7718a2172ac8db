//! Multiplexer and demultiplexer settings.

use crate::compression::{DEFAULT_MAX_PAYLOAD_LEN, DEFAULT_ZSTD_LEVEL};
use crate::seek::DEFAULT_INTERVAL_US;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How the multiplexer orders packets across tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum InterleaveMode {
    /// Wait for every open track; output is globally ordered by timestamp.
    #[default]
    Strict,
    /// Bound latency by emitting from ready tracks when another stalls.
    Live,
}

impl FromStr for InterleaveMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "live" => Ok(Self::Live),
            _ => Err(format!("Unknown interleave mode: {}", s)),
        }
    }
}

impl fmt::Display for InterleaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Live => "live",
        })
    }
}

/// Where the packet region is buffered until the seek tables are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum SpoolMode {
    #[default]
    Memory,
    /// Anonymous temporary file, removed when the multiplexer is dropped.
    TempFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct MuxConfig {
    pub interleave: InterleaveMode,
    /// Bounded per-track queue length.
    pub queue_capacity: usize,
    /// Live mode: how long to wait for a stalled track (ms).
    pub live_timeout_ms: u64,
    /// Minimum timestamp gap between seek entries of one track (µs).
    pub seek_interval_us: u64,
    /// zstd compression level.
    pub compression_level: i32,
    /// Packets compressed in parallel per batch.
    pub batch_size: usize,
    pub spool: SpoolMode,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            interleave: InterleaveMode::Strict,
            queue_capacity: 64,
            live_timeout_ms: 50,
            seek_interval_us: DEFAULT_INTERVAL_US,
            compression_level: DEFAULT_ZSTD_LEVEL,
            batch_size: 32,
            spool: SpoolMode::Memory,
        }
    }
}

impl MuxConfig {
    pub fn live_timeout(&self) -> Duration {
        Duration::from_millis(self.live_timeout_ms)
    }

    pub fn interleave(mut self, mode: InterleaveMode) -> Self {
        self.interleave = mode;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn seek_interval_us(mut self, interval: u64) -> Self {
        self.seek_interval_us = interval;
        self
    }

    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn spool(mut self, spool: SpoolMode) -> Self {
        self.spool = spool;
        self
    }
}

/// What the demultiplexer does with a payload that fails to decompress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum DecompressionErrorPolicy {
    /// Return the error to the caller.
    #[default]
    Abort,
    /// Log it and continue with the next packet.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct DemuxConfig {
    pub on_decompression_error: DecompressionErrorPolicy,
    /// Upper bound on stored and decompressed payload sizes.
    pub max_payload_len: u64,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            on_decompression_error: DecompressionErrorPolicy::Abort,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

impl DemuxConfig {
    pub fn on_decompression_error(mut self, policy: DecompressionErrorPolicy) -> Self {
        self.on_decompression_error = policy;
        self
    }

    pub fn max_payload_len(mut self, len: u64) -> Self {
        self.max_payload_len = len;
        self
    }
}
