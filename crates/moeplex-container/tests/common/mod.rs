//! Shared fixtures for container integration tests.

#![allow(dead_code)]

use moeplex_container::{
    CodecParameters, ColorMode, CompressionMode, FormatData, Multiplexer, MuxConfig, Packet,
    SideData, Stream, SubtitleParameters, Tag, VideoParameters,
};
use std::ops::Range;

/// Offset of the payload within a record that carries no side data.
pub const PLAIN_RECORD_HEADER: u64 = 34;

pub fn video_track(index: u8, mode: CompressionMode) -> Stream {
    Stream::new(
        format!("video-{index}"),
        index,
        CodecParameters::Video(VideoParameters::new(192, 108, ColorMode::Full)),
    )
    .duration(10_000_000)
    .extradata(b"\x01avc".to_vec())
    .compression(mode, None)
}

pub fn subtitle_track(index: u8, mode: CompressionMode) -> Stream {
    Stream::new(
        format!("subs-{index}"),
        index,
        CodecParameters::Subtitle(SubtitleParameters::new("jpn", 192, 108)),
    )
    .compression(mode, None)
}

/// Deterministic generator for test data.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6364136223846793005).wrapping_add(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    pub fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }
}

/// Packets for one track with non-decreasing timestamps (repeats included),
/// varied payload sizes and occasional side data.
pub fn track_packets(stream: u8, count: usize, seed: u64) -> Vec<Packet> {
    let mut rng = Lcg::new(seed ^ u64::from(stream) << 32);
    let mut timestamp = rng.below(5_000);
    (0..count)
        .map(|i| {
            timestamp += rng.below(3) * rng.below(60_000);
            let len = 1 + rng.below(300) as usize;
            let fill = (i as u8).wrapping_mul(31) ^ stream;
            let payload: Vec<u8> = (0..len).map(|j| fill.wrapping_add((j % 7) as u8)).collect();
            let mut packet = Packet::new(stream, timestamp, payload).with_duration(41_708);
            if rng.below(5) == 0 {
                packet = packet.with_side_data(
                    SideData::new().with(Tag(*b"SEQN"), (i as u32).to_le_bytes()),
                );
            }
            packet
        })
        .collect()
}

/// Push per-track sequences in a scrambled cross-track order and finalize.
pub fn build_container(format: FormatData, config: MuxConfig, tracks: &[Vec<Packet>]) -> Vec<u8> {
    let mut mux = Multiplexer::from_format(format, config).unwrap();
    let mut cursors = vec![0usize; tracks.len()];
    let mut rng = Lcg::new(tracks.len() as u64);
    loop {
        let live: Vec<usize> = (0..tracks.len())
            .filter(|&t| cursors[t] < tracks[t].len())
            .collect();
        if live.is_empty() {
            break;
        }
        let t = live[rng.below(live.len() as u64) as usize];
        let burst = 1 + rng.below(4) as usize;
        for _ in 0..burst {
            if let Some(packet) = tracks[t].get(cursors[t]) {
                mux.push(packet.clone()).unwrap();
                cursors[t] += 1;
            }
        }
    }
    let mut out = Vec::new();
    mux.finalize(&mut out).unwrap();
    out
}

/// Byte range of the serialized seek table of `stream`.
pub fn seek_table_span(bytes: &[u8], stream: u8) -> Option<Range<usize>> {
    let header_len = u64::from_le_bytes(bytes[..8].try_into().ok()?) as usize;
    let mut pos = 8 + header_len;
    let count = bytes[pos];
    pos += 1;
    for _ in 0..count {
        let index = bytes[pos];
        let len = u64::from_le_bytes(bytes[pos + 1..pos + 9].try_into().ok()?) as usize;
        pos += 9;
        if index == stream {
            return Some(pos..pos + len);
        }
        pos += len;
    }
    None
}
