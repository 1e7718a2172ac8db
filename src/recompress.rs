//! Re-multiplex a container with different payload compression.

use anyhow::{Context, Result};
use moeplex_container::{
    CompressionMode, DemuxConfig, Demultiplexer, FormatData, Multiplexer, MuxConfig, MuxSummary,
};
use std::io::{Read, Seek, Write};
use std::path::Path;

/// Target compression for the re-multiplexed tracks.
#[derive(Debug, Clone, Default)]
pub struct RecompressOptions {
    pub mode: CompressionMode,
    /// Restrict the change to these tracks. Empty means every track.
    pub tracks: Vec<u8>,
    /// Dictionary for the changed tracks. Ignored for `none`.
    pub dictionary: Option<Vec<u8>>,
}

impl RecompressOptions {
    pub fn new(mode: CompressionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    fn applies_to(&self, stream: u8) -> bool {
        self.tracks.is_empty() || self.tracks.contains(&stream)
    }
}

/// Metadata of the output container: same tracks, new compression settings.
pub fn retarget(format: &FormatData, options: &RecompressOptions) -> Result<FormatData> {
    for &stream in &options.tracks {
        if format.track(stream).is_none() {
            anyhow::bail!("Container has no track {}", stream);
        }
    }

    let mut out = format.clone();
    out.encoder = format!("moeplex {}", env!("CARGO_PKG_VERSION"));
    for track in out.tracks.iter_mut().filter(|t| options.applies_to(t.index)) {
        let dict = options
            .dictionary
            .clone()
            .filter(|_| options.mode.supports_dictionary());
        track.compression_mode = options.mode;
        track.compression_dict = dict.map(Into::into);
    }
    Ok(out)
}

/// Copy every packet of `demux` into a new container written to `sink`.
pub fn recompress<R, W>(
    demux: &mut Demultiplexer<R>,
    options: &RecompressOptions,
    config: MuxConfig,
    sink: &mut W,
) -> Result<MuxSummary>
where
    R: Read + Seek,
    W: Write + ?Sized,
{
    let format = retarget(demux.format(), options)?;
    let mut mux = Multiplexer::from_format(format, config)?;

    demux.rewind();
    while let Some(packet) = demux.next_packet()? {
        mux.push(packet)?;
    }
    let summary = mux.finalize(sink)?;
    Ok(summary)
}

/// File to file variant of [`recompress`].
pub fn recompress_file(
    input: &Path,
    output: &Path,
    options: &RecompressOptions,
    mux_config: MuxConfig,
    demux_config: &DemuxConfig,
) -> Result<MuxSummary> {
    let mut demux = Demultiplexer::open_path(input, demux_config.clone())
        .with_context(|| format!("Failed to open container {:?}", input))?;
    let file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create {:?}", output))?;
    let mut sink = std::io::BufWriter::new(file);
    let summary = recompress(&mut demux, options, mux_config, &mut sink)?;
    sink.flush()?;
    Ok(summary)
}
