//! zstd dictionary training from a track's payloads.

use anyhow::{Context, Result};
use moeplex_container::{compression, DemuxConfig, Demultiplexer};
use std::io::{Read, Seek};
use std::path::Path;

/// Default dictionary size, matching the zstd CLI.
pub const DEFAULT_DICT_SIZE: usize = 110 * 1024;

/// Collect the decompressed payloads of `stream`, skipping empty ones.
pub fn collect_samples<R: Read + Seek>(
    demux: &mut Demultiplexer<R>,
    stream: u8,
    limit: Option<usize>,
) -> Result<Vec<Vec<u8>>> {
    if demux.format().track(stream).is_none() {
        anyhow::bail!("Container has no track {}", stream);
    }

    demux.rewind();
    let mut samples = Vec::new();
    while let Some(packet) = demux.next_packet()? {
        if packet.stream != stream || packet.payload.is_empty() {
            continue;
        }
        samples.push(packet.payload);
        if limit.is_some_and(|limit| samples.len() >= limit) {
            break;
        }
    }
    Ok(samples)
}

/// Train a dictionary of at most `size` bytes for `stream` of `input`.
pub fn train_from_file(
    input: &Path,
    stream: u8,
    size: usize,
    config: &DemuxConfig,
) -> Result<Vec<u8>> {
    let mut demux = Demultiplexer::open_path(input, config.clone())
        .with_context(|| format!("Failed to open container {:?}", input))?;
    let samples = collect_samples(&mut demux, stream, None)?;
    if samples.is_empty() {
        anyhow::bail!("Track {} has no payloads to train on", stream);
    }
    tracing::info!(stream, samples = samples.len(), size, "Training dictionary");

    let dict = compression::train_dictionary(&samples, size)
        .with_context(|| format!("Failed to train a dictionary from {} samples", samples.len()))?;
    Ok(dict)
}
