use moeplex_container::{DemuxConfig, MuxConfig};
use serde::{Deserialize, Serialize};

/// Settings shared by every subcommand.
///
/// ```toml
/// [mux]
/// interleave = "strict"
/// compression_level = 9
/// spool = "temp_file"
///
/// [demux]
/// on_decompression_error = "skip"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub mux: MuxConfig,

    #[serde(default)]
    pub demux: DemuxConfig,
}
