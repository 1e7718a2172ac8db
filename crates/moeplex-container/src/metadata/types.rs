//! Typed container metadata.

use crate::{Error, Result};
use rasn::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Container-level metadata written once, ahead of every packet.
#[derive(AsnType, Decode, Encode, Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FormatData {
    /// Human readable format identifier.
    #[rasn(identifier = "format-name", tag(explicit(context, 0)))]
    pub format_name: Utf8String,
    /// Name of the encoder that produced the container.
    #[rasn(tag(explicit(context, 1)))]
    pub encoder: Utf8String,
    /// Tracks in declaration order. Position need not match `Stream::index`.
    #[rasn(tag(explicit(context, 2)))]
    pub tracks: SequenceOf<Stream>,
}

impl FormatData {
    pub fn new(format_name: impl Into<String>, encoder: impl Into<String>) -> Self {
        Self {
            format_name: format_name.into(),
            encoder: encoder.into(),
            tracks: Vec::new(),
        }
    }

    /// Add a track (builder style).
    pub fn with_track(mut self, stream: Stream) -> Self {
        self.tracks.push(stream);
        self
    }

    /// Find a track by its stream index.
    pub fn track(&self, index: u8) -> Option<&Stream> {
        self.tracks.iter().find(|t| t.index == index)
    }

    /// Check that stream indices are unique.
    pub fn check_unique_indices(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for track in &self.tracks {
            if !seen.insert(track.index) {
                return Err(Error::DuplicateTrack(track.index));
            }
        }
        Ok(())
    }

    /// Total duration across tracks in microseconds.
    pub fn duration(&self) -> u64 {
        self.tracks.iter().map(|t| t.duration).max().unwrap_or(0)
    }
}

/// One track of the container.
#[derive(AsnType, Decode, Encode, Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Stream {
    #[rasn(tag(explicit(context, 0)))]
    pub name: Utf8String,
    /// Stream index, unique within a container.
    #[rasn(value("0..=255"), tag(explicit(context, 1)))]
    pub index: u8,
    /// Duration in microseconds.
    #[rasn(tag(explicit(context, 2)))]
    pub duration: u64,
    /// Codec-specific initialisation bytes.
    #[rasn(tag(explicit(context, 3)))]
    pub extradata: OctetString,
    #[rasn(identifier = "compression-mode", tag(explicit(context, 4)))]
    pub compression_mode: CompressionMode,
    /// Shared dictionary for modes that support one.
    #[rasn(identifier = "compression-dict", tag(explicit(context, 5)))]
    pub compression_dict: Option<OctetString>,
    #[rasn(tag(explicit(context, 6)))]
    pub parameters: CodecParameters,
}

impl Stream {
    pub fn new(name: impl Into<String>, index: u8, parameters: CodecParameters) -> Self {
        Self {
            name: name.into(),
            index,
            duration: 0,
            extradata: OctetString::new(),
            compression_mode: CompressionMode::None,
            compression_dict: None,
            parameters,
        }
    }

    /// Set duration in microseconds.
    pub fn duration(mut self, micros: u64) -> Self {
        self.duration = micros;
        self
    }

    /// Set codec extradata.
    pub fn extradata(mut self, data: impl Into<OctetString>) -> Self {
        self.extradata = data.into();
        self
    }

    /// Set compression mode and optional dictionary.
    pub fn compression(mut self, mode: CompressionMode, dict: Option<Vec<u8>>) -> Self {
        self.compression_mode = mode;
        self.compression_dict = dict.map(OctetString::from);
        self
    }

    /// Check the dictionary/mode invariant.
    pub fn validate(&self) -> Result<()> {
        if self.compression_dict.is_some() && self.compression_mode == CompressionMode::None {
            return Err(Error::InvalidTrack {
                index: self.index,
                reason: "compression dictionary set on an uncompressed track".into(),
            });
        }
        Ok(())
    }
}

/// Codec parameters: exactly one of subtitle or video.
#[derive(AsnType, Decode, Encode, Debug, Clone, PartialEq, Eq, Hash)]
#[rasn(choice)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum CodecParameters {
    #[rasn(tag(explicit(context, 0)))]
    Subtitle(SubtitleParameters),
    #[rasn(tag(explicit(context, 1)))]
    Video(VideoParameters),
}

impl CodecParameters {
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video(_))
    }

    pub fn is_subtitle(&self) -> bool {
        matches!(self, Self::Subtitle(_))
    }

    pub fn as_video(&self) -> Option<&VideoParameters> {
        match self {
            Self::Video(video) => Some(video),
            Self::Subtitle(_) => None,
        }
    }

    pub fn as_subtitle(&self) -> Option<&SubtitleParameters> {
        match self {
            Self::Subtitle(subtitle) => Some(subtitle),
            Self::Video(_) => None,
        }
    }
}

#[derive(AsnType, Decode, Encode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VideoParameters {
    #[rasn(value("0..=65535"), tag(explicit(context, 0)))]
    pub width: u16,
    #[rasn(value("0..=65535"), tag(explicit(context, 1)))]
    pub height: u16,
    #[rasn(tag(explicit(context, 2)))]
    pub color: ColorMode,
}

impl VideoParameters {
    pub fn new(width: u16, height: u16, color: ColorMode) -> Self {
        Self {
            width,
            height,
            color,
        }
    }
}

#[derive(AsnType, Decode, Encode, Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SubtitleParameters {
    #[rasn(tag(explicit(context, 0)))]
    pub lang: Utf8String,
    #[rasn(value("0..=65535"), identifier = "play-width", tag(explicit(context, 1)))]
    pub play_width: u16,
    #[rasn(value("0..=65535"), identifier = "play-height", tag(explicit(context, 2)))]
    pub play_height: u16,
}

impl SubtitleParameters {
    pub fn new(lang: impl Into<String>, play_width: u16, play_height: u16) -> Self {
        Self {
            lang: lang.into(),
            play_width,
            play_height,
        }
    }
}

/// Color depth of a video track. Wire codes are fixed.
#[derive(AsnType, Decode, Encode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[rasn(enumerated)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum ColorMode {
    Full = 0,
    EightBit = 1,
}

impl ColorMode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" | "rgb" | "true" | "24bit" => Ok(Self::Full),
            "eightbit" | "8bit" | "eight" | "256" | "256color" => Ok(Self::EightBit),
            _ => Err(format!("Unknown color mode: {}", s)),
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::EightBit => "8bit",
        })
    }
}

/// Per-track payload compression. Wire codes are fixed.
#[derive(AsnType, Decode, Encode, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[rasn(enumerated)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum CompressionMode {
    #[default]
    None = 0,
    Zstd = 1,
    Lz4 = 2,
}

impl CompressionMode {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether the mode makes use of a shared dictionary.
    pub fn supports_dictionary(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl TryFrom<u8> for CompressionMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Zstd),
            2 => Ok(Self::Lz4),
            _ => Err(Error::UnsupportedCompressionMode(value)),
        }
    }
}

impl FromStr for CompressionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "null" => Ok(Self::None),
            "zst" | "zstd" => Ok(Self::Zstd),
            "lz4" => Ok(Self::Lz4),
            _ => Err(format!("Unknown compression mode: {}", s)),
        }
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Zstd => "zstd",
            Self::Lz4 => "lz4",
        })
    }
}
