//! moeplex-container: multiplexed media container engine
//!
//! A container carries any number of video and subtitle tracks, each with its
//! own payload compression, behind a DER encoded metadata header and per-track
//! seek tables.
//!
//! # Layout
//!
//! ```text
//! u64 header length | DER FormatData
//! u8 seek table count | { u8 stream, u64 length, table } ...
//! packet region: interleaved, framed packet records
//! ```
//!
//! # Modules
//!
//! - `metadata` - Typed header and its DER codec
//! - `side_data` - Keyed side data tables attached to packets
//! - `compression` - none / zstd / lz4 payload adapter
//! - `seek` - Per-track timestamp to offset index
//! - `packet` - Packets and record framing
//! - `mux` - Interleaving writer, synchronous or fed by per-track channels
//! - `demux` - Reader with floor-lookup seeking and shared index
//!
//! Header failures reject the whole container. A corrupt seek table only
//! disables random access for its track; packets are still readable in order.

pub mod compression;
pub mod config;
pub mod demux;
pub mod error;
pub mod metadata;
pub mod mux;
pub mod packet;
pub mod seek;
pub mod side_data;

mod wire;

pub use compression::TrackCodec;
pub use config::{DecompressionErrorPolicy, DemuxConfig, InterleaveMode, MuxConfig, SpoolMode};
pub use demux::{ContainerIndex, DemuxState, Demultiplexer};
pub use error::{Error, Result};
pub use metadata::{
    CodecParameters, ColorMode, CompressionMode, FormatData, Stream, SubtitleParameters,
    VideoParameters,
};
pub use mux::{Multiplexer, MuxState, MuxSummary, TrackChannels, TrackProducer};
pub use packet::{FormatDuration, Packet, PacketRecord};
pub use seek::{SeekEntry, SeekTable, SeekTableManager, TrackIndex};
pub use side_data::{SideData, SideDataPair, Tag};
