use clap::{Parser, Subcommand};
use moeplex_container::CompressionMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "moeplex")]
#[command(author, version, about = "Multiplexed media container tool")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a container's header, tracks and seek tables
    Probe {
        /// Container to probe
        #[arg(required = true)]
        file: PathBuf,

        /// List every seek table entry
        #[arg(long)]
        seektables: bool,

        /// List every packet
        #[arg(long)]
        packets: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write one track's decompressed payloads to a file
    Extract {
        /// Container to read
        #[arg(required = true)]
        file: PathBuf,

        /// Stream index of the track
        #[arg(short, long)]
        track: u8,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,

        /// Start at the first packet at or after this timestamp (microseconds)
        #[arg(long)]
        from: Option<u64>,
    },

    /// Re-multiplex a container with a different payload compression
    Recompress {
        /// Container to read
        #[arg(required = true)]
        input: PathBuf,

        /// Container to write
        #[arg(required = true)]
        output: PathBuf,

        /// Target compression: none, zstd or lz4
        #[arg(short, long, default_value = "zstd")]
        mode: CompressionMode,

        /// Only change these tracks (repeatable)
        #[arg(short, long)]
        track: Vec<u8>,

        /// Dictionary file for the changed tracks
        #[arg(long)]
        dict: Option<PathBuf>,
    },

    /// Train a zstd dictionary from one track's payloads
    TrainDict {
        /// Container to read
        #[arg(required = true)]
        file: PathBuf,

        /// Stream index of the track
        #[arg(short, long)]
        track: u8,

        /// Output dictionary file
        #[arg(short, long)]
        out: PathBuf,

        /// Maximum dictionary size in bytes
        #[arg(long, default_value_t = moeplex::dict::DEFAULT_DICT_SIZE)]
        size: usize,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}
