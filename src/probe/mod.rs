//! Container inspection for the `probe` command.

use anyhow::{Context, Result};
use moeplex_container::{
    CodecParameters, CompressionMode, DemuxConfig, Demultiplexer, FormatData, FormatDuration,
    SeekEntry, TrackIndex,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What to include beyond the header summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeOptions {
    pub seek_tables: bool,
    pub packets: bool,
}

#[derive(Debug, Serialize)]
pub struct ContainerReport {
    pub file: PathBuf,
    pub file_size: u64,
    pub header_len: u64,
    pub packet_region_len: u64,
    pub format: FormatData,
    pub tracks: Vec<TrackReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets: Option<Vec<PacketLine>>,
}

#[derive(Debug, Serialize)]
pub struct TrackReport {
    pub index: u8,
    pub name: String,
    pub kind: &'static str,
    pub compression: CompressionMode,
    pub dictionary_len: Option<usize>,
    /// `None` when the track has no usable seek table.
    pub seek_entries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequential_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seek_table: Option<Vec<SeekEntry>>,
    pub packet_count: u64,
    pub stored_bytes: u64,
    pub payload_bytes: u64,
    pub first_timestamp: Option<u64>,
    pub last_timestamp: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PacketLine {
    pub offset: u64,
    pub stream: u8,
    pub sequence: u64,
    pub timestamp: u64,
    pub duration: u64,
    pub stored_len: u64,
    pub payload_len: usize,
    pub side_data: Option<String>,
}

#[derive(Debug, Default)]
struct TrackStats {
    count: u64,
    stored: u64,
    payload: u64,
    first: Option<u64>,
    last: Option<u64>,
}

/// Read a container's index and walk every packet.
pub fn probe_container(path: &Path, options: ProbeOptions, config: &DemuxConfig) -> Result<ContainerReport> {
    let file_size = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {:?}", path))?
        .len();
    let mut demux = Demultiplexer::open_path(path, config.clone())
        .with_context(|| format!("Failed to open container {:?}", path))?;

    let mut stats: BTreeMap<u8, TrackStats> = BTreeMap::new();
    let mut lines = Vec::new();
    while let Some(record) = demux.next_record().context("Failed to read packet")? {
        let packet = &record.packet;
        let entry = stats.entry(packet.stream).or_default();
        entry.count += 1;
        entry.stored += record.stored_len;
        entry.payload += packet.payload.len() as u64;
        entry.first.get_or_insert(packet.timestamp);
        entry.last = Some(packet.timestamp);

        if options.packets {
            lines.push(PacketLine {
                offset: record.offset,
                stream: packet.stream,
                sequence: record.sequence,
                timestamp: packet.timestamp,
                duration: packet.duration,
                stored_len: record.stored_len,
                payload_len: packet.payload.len(),
                side_data: packet.side_data.as_ref().map(ToString::to_string),
            });
        }
    }

    let index = demux.index();
    let tracks = index
        .format()
        .tracks
        .iter()
        .map(|track| {
            let stats = stats.remove(&track.index).unwrap_or_default();
            let (table, reason) = match index.track_index(track.index) {
                Some(TrackIndex::Indexed(table)) => (Some(table), None),
                Some(TrackIndex::SequentialOnly { reason }) => (None, Some(reason.clone())),
                None => (None, None),
            };
            TrackReport {
                index: track.index,
                name: track.name.clone(),
                kind: match track.parameters {
                    CodecParameters::Video(_) => "video",
                    CodecParameters::Subtitle(_) => "subtitle",
                },
                compression: track.compression_mode,
                dictionary_len: track.compression_dict.as_ref().map(|dict| dict.len()),
                seek_entries: table.map(|t| t.len()),
                sequential_reason: reason,
                seek_table: table
                    .filter(|_| options.seek_tables)
                    .map(|t| t.entries().to_vec()),
                packet_count: stats.count,
                stored_bytes: stats.stored,
                payload_bytes: stats.payload,
                first_timestamp: stats.first,
                last_timestamp: stats.last,
            }
        })
        .collect();

    Ok(ContainerReport {
        file: path.to_path_buf(),
        file_size,
        header_len: index.header_len(),
        packet_region_len: index.packet_region_len(),
        format: index.format().clone(),
        tracks,
        packets: options.packets.then_some(lines),
    })
}

/// Human readable rendering of a report.
pub fn render(report: &ContainerReport) -> String {
    let mut out = String::new();
    let mut line = |s: String| {
        out.push_str(&s);
        out.push('\n');
    };

    line(format!("File: {}", report.file.display()));
    line(format!("Format: {}", report.format.format_name));
    line(format!("Encoder: {}", report.format.encoder));
    line(format!("Size: {} bytes", report.file_size));
    line(format!(
        "Duration: {}",
        FormatDuration::from_micros(report.format.duration())
    ));
    line(format!("Header: {} bytes", report.header_len));
    line(format!("Packet region: {} bytes", report.packet_region_len));

    line(format!("\nTracks: {}", report.tracks.len()));
    for (track, stream) in report.tracks.iter().zip(&report.format.tracks) {
        let params = match &stream.parameters {
            CodecParameters::Video(v) => format!("{}x{} {}", v.width, v.height, v.color),
            CodecParameters::Subtitle(s) => {
                format!("{} {}x{}", s.lang, s.play_width, s.play_height)
            }
        };
        line(format!(
            "  [{}] {} {} ({}) {}",
            track.index, track.kind, track.name, params, track.compression
        ));
        if let Some(len) = track.dictionary_len {
            line(format!("      dictionary: {} bytes", len));
        }
        line(format!(
            "      packets: {}, stored {} bytes, payload {} bytes",
            track.packet_count, track.stored_bytes, track.payload_bytes
        ));
        if let (Some(first), Some(last)) = (track.first_timestamp, track.last_timestamp) {
            line(format!(
                "      span: {} - {}",
                FormatDuration::from_micros(first),
                FormatDuration::from_micros(last)
            ));
        }
        match (track.seek_entries, &track.sequential_reason) {
            (Some(n), _) => line(format!("      seek entries: {}", n)),
            (None, Some(reason)) => line(format!("      sequential only: {}", reason)),
            (None, None) => {}
        }
        for entry in track.seek_table.iter().flatten() {
            line(format!(
                "        {} -> {}",
                FormatDuration::from_micros(entry.timestamp),
                entry.offset
            ));
        }
    }

    if let Some(packets) = &report.packets {
        line(format!("\nPackets: {}", packets.len()));
        for p in packets {
            let mut text = format!(
                "  {:>10} #{:<3} seq {:<6} {} +{} {} bytes",
                p.offset,
                p.stream,
                p.sequence,
                FormatDuration::from_micros(p.timestamp),
                FormatDuration::from_micros(p.duration),
                p.payload_len
            );
            if let Some(side_data) = &p.side_data {
                text.push(' ');
                text.push_str(side_data);
            }
            line(text);
        }
    }

    out
}
