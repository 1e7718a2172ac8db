//! Dump one track's decompressed payloads.

use anyhow::{Context, Result};
use moeplex_container::{DemuxConfig, Demultiplexer};
use std::io::{Read, Seek, Write};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub packets: u64,
    pub bytes: u64,
    /// Timestamp of the first extracted packet.
    pub start: Option<u64>,
}

/// Write every payload of `stream`, optionally starting at the first packet
/// at or after `from` (µs).
pub fn extract_track<R, W>(
    demux: &mut Demultiplexer<R>,
    stream: u8,
    from: Option<u64>,
    out: &mut W,
) -> Result<ExtractSummary>
where
    R: Read + Seek,
    W: Write + ?Sized,
{
    if demux.format().track(stream).is_none() {
        anyhow::bail!("Container has no track {}", stream);
    }

    let mut summary = ExtractSummary::default();
    if let Some(from) = from {
        match demux.seek(stream, from)? {
            Some(timestamp) => tracing::debug!(stream, from, timestamp, "Seeked"),
            None => {
                tracing::info!(stream, from, "No packets at or after the requested time");
                return Ok(summary);
            }
        }
    }

    while let Some(packet) = demux.next_packet()? {
        if packet.stream != stream {
            continue;
        }
        summary.start.get_or_insert(packet.timestamp);
        out.write_all(&packet.payload)?;
        summary.packets += 1;
        summary.bytes += packet.payload.len() as u64;
    }
    out.flush()?;
    Ok(summary)
}

/// File to file variant of [`extract_track`].
pub fn extract_file(
    input: &Path,
    stream: u8,
    from: Option<u64>,
    output: &Path,
    config: &DemuxConfig,
) -> Result<ExtractSummary> {
    let mut demux = Demultiplexer::open_path(input, config.clone())
        .with_context(|| format!("Failed to open container {:?}", input))?;
    let file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create {:?}", output))?;
    let mut out = std::io::BufWriter::new(file);
    extract_track(&mut demux, stream, from, &mut out)
}
