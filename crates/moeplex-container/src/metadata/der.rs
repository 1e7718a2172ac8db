//! DER codec for the metadata header.
//!
//! The schema is declared on the metadata types through `rasn` attributes.
//! Every field carries an explicit context tag wrapping its universal type:
//!
//! ```text
//! FormatData ::= SEQUENCE {
//!     format-name  [0] UTF8String,
//!     encoder      [1] UTF8String,
//!     tracks       [2] SEQUENCE OF Stream }
//!
//! Stream ::= SEQUENCE {
//!     name              [0] UTF8String,
//!     index             [1] INTEGER (0..255),
//!     duration          [2] INTEGER,
//!     extradata         [3] OCTET STRING,
//!     compression-mode  [4] ENUMERATED { none(0), zstd(1), lz4(2) },
//!     compression-dict  [5] OCTET STRING OPTIONAL,
//!     parameters        [6] CodecParameters }
//!
//! CodecParameters ::= CHOICE {
//!     subtitle  [0] SubtitleParameters,
//!     video     [1] VideoParameters }
//!
//! SubtitleParameters ::= SEQUENCE {
//!     lang         [0] UTF8String,
//!     play-width   [1] INTEGER (0..65535),
//!     play-height  [2] INTEGER (0..65535) }
//!
//! VideoParameters ::= SEQUENCE {
//!     width   [0] INTEGER (0..65535),
//!     height  [1] INTEGER (0..65535),
//!     color   [2] ENUMERATED { full(0), eightbit(1) } }
//! ```
//!
//! Decoding additionally requires the input to be exactly the canonical
//! encoding of the decoded value: no trailing data, no second alternative in
//! the choice slot, no non-minimal lengths or integers.

use super::FormatData;
use crate::{Error, Result};

/// Encode container metadata.
pub fn encode(format: &FormatData) -> Result<Vec<u8>> {
    rasn::der::encode(format).map_err(Error::encoding)
}

/// Decode container metadata, rejecting anything but the canonical encoding.
pub fn decode(bytes: &[u8]) -> Result<FormatData> {
    let format: FormatData = rasn::der::decode(bytes).map_err(Error::encoding)?;
    let canonical = encode(&format)?;
    if canonical.len() < bytes.len() && bytes.starts_with(&canonical) {
        return Err(Error::encoding(format_args!(
            "{} trailing bytes after header",
            bytes.len() - canonical.len()
        )));
    }
    if canonical != bytes {
        return Err(Error::encoding("header is not in canonical DER form"));
    }
    Ok(format)
}
