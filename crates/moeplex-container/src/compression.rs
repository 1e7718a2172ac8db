//! Per-track payload compression.
//!
//! Compressed payloads (`zstd`, `lz4`) start with the uncompressed length as a
//! `u32` little-endian, followed by one zstd frame or one raw lz4 block. The
//! length is checked against a caller supplied bound before decompressing.
//! `none` is the identity.

use crate::metadata::{CompressionMode, Stream};
use crate::{Error, Result};
use std::sync::Arc;

/// Default zstd level.
pub const DEFAULT_ZSTD_LEVEL: i32 = zstd::DEFAULT_COMPRESSION_LEVEL;

/// Default bound on a single decompressed payload.
pub const DEFAULT_MAX_PAYLOAD_LEN: u64 = 256 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Compress at the default level.
pub fn compress(payload: &[u8], mode: CompressionMode, dict: Option<&[u8]>) -> Result<Vec<u8>> {
    compress_with_level(payload, mode, dict, DEFAULT_ZSTD_LEVEL)
}

/// Compress a payload. `level` only affects zstd; `dict` is ignored for `none`.
pub fn compress_with_level(
    payload: &[u8],
    mode: CompressionMode,
    dict: Option<&[u8]>,
    level: i32,
) -> Result<Vec<u8>> {
    if mode == CompressionMode::None {
        return Ok(payload.to_vec());
    }

    let len = u32::try_from(payload.len()).map_err(|_| {
        Error::Compression(format!(
            "payload of {} bytes exceeds the 4 GiB frame limit",
            payload.len()
        ))
    })?;
    let dict = dict.filter(|d| !d.is_empty());

    let body = match mode {
        CompressionMode::Zstd => match dict {
            Some(dict) => zstd::bulk::Compressor::with_dictionary(level, dict)
                .and_then(|mut c| c.compress(payload)),
            None => zstd::bulk::compress(payload, level),
        }
        .map_err(|e| Error::Compression(e.to_string()))?,
        CompressionMode::Lz4 => match dict {
            Some(dict) => lz4_flex::block::compress_with_dict(payload, dict),
            None => lz4_flex::block::compress(payload),
        },
        CompressionMode::None => unreachable!("handled above"),
    };

    let mut out = Vec::with_capacity(LEN_PREFIX + body.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decompress with the default payload bound.
pub fn decompress(data: &[u8], mode: CompressionMode, dict: Option<&[u8]>) -> Result<Vec<u8>> {
    decompress_bounded(data, mode, dict, DEFAULT_MAX_PAYLOAD_LEN)
}

/// Decompress a payload, refusing declared sizes above `max_len`.
pub fn decompress_bounded(
    data: &[u8],
    mode: CompressionMode,
    dict: Option<&[u8]>,
    max_len: u64,
) -> Result<Vec<u8>> {
    if mode == CompressionMode::None {
        return Ok(data.to_vec());
    }

    if data.len() < LEN_PREFIX {
        return Err(Error::decompression(format!(
            "{mode} payload of {} bytes is missing its length prefix",
            data.len()
        )));
    }
    let (prefix, body) = data.split_at(LEN_PREFIX);
    let declared = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if declared as u64 > max_len {
        return Err(Error::decompression(format!(
            "declared length {declared} exceeds limit {max_len}"
        )));
    }
    let dict = dict.filter(|d| !d.is_empty());

    let out = match mode {
        CompressionMode::Zstd => match dict {
            Some(dict) => zstd::bulk::Decompressor::with_dictionary(dict)
                .and_then(|mut d| d.decompress(body, declared)),
            None => zstd::bulk::decompress(body, declared),
        }
        .map_err(Error::decompression)?,
        CompressionMode::Lz4 => match dict {
            Some(dict) => lz4_flex::block::decompress_with_dict(body, declared, dict),
            None => lz4_flex::block::decompress(body, declared),
        }
        .map_err(Error::decompression)?,
        CompressionMode::None => unreachable!("handled above"),
    };

    if out.len() != declared {
        return Err(Error::decompression(format!(
            "decompressed {} bytes, expected {declared}",
            out.len()
        )));
    }
    Ok(out)
}

/// Train a zstd dictionary from sample payloads.
pub fn train_dictionary<S: AsRef<[u8]>>(samples: &[S], max_size: usize) -> Result<Vec<u8>> {
    zstd::dict::from_samples(samples, max_size).map_err(|e| Error::Compression(e.to_string()))
}

/// Compression settings of one track, with its dictionary shared across calls.
#[derive(Debug, Clone)]
pub struct TrackCodec {
    mode: CompressionMode,
    dict: Option<Arc<[u8]>>,
    level: i32,
}

impl TrackCodec {
    pub fn new(mode: CompressionMode, dict: Option<&[u8]>) -> Self {
        Self {
            mode,
            dict: dict
                .filter(|_| mode.supports_dictionary())
                .map(Arc::from),
            level: DEFAULT_ZSTD_LEVEL,
        }
    }

    /// Codec declared by a track's metadata.
    pub fn from_stream(stream: &Stream) -> Self {
        Self::new(stream.compression_mode, stream.compression_dict.as_deref())
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn mode(&self) -> CompressionMode {
        self.mode
    }

    pub fn dictionary(&self) -> Option<&[u8]> {
        self.dict.as_deref()
    }

    pub fn compress(&self, payload: &[u8]) -> Result<Vec<u8>> {
        compress_with_level(payload, self.mode, self.dictionary(), self.level)
    }

    pub fn decompress(&self, data: &[u8], max_len: u64) -> Result<Vec<u8>> {
        decompress_bounded(data, self.mode, self.dictionary(), max_len)
    }
}
