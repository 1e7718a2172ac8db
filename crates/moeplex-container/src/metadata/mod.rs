//! Container metadata and its DER header encoding.
//!
//! The header is the first variable-length region of a container. It names
//! the format and encoder and declares every track with its codec parameters
//! and compression settings.

mod der;
mod types;

pub use der::{decode, encode};
pub use types::{
    CodecParameters, ColorMode, CompressionMode, FormatData, Stream, SubtitleParameters,
    VideoParameters,
};

use crate::Result;

impl FormatData {
    /// Encode as a DER header.
    pub fn encode(&self) -> Result<Vec<u8>> {
        der::encode(self)
    }

    /// Decode a DER header. Duplicate stream indices are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let format = der::decode(bytes)?;
        format.check_unique_indices()?;
        Ok(format)
    }
}
