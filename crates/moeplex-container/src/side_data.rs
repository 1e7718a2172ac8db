//! Keyed side data tables.
//!
//! Wire format: `u8 count`, then `count` entries of
//! `[u8; 4] key, u8 len, len bytes value`.

use crate::wire;
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::io::Read;

/// Maximum entries in one table.
pub const MAX_ENTRIES: usize = u8::MAX as usize;

/// Maximum value length.
pub const MAX_VALUE_LEN: usize = u8::MAX as usize;

/// Four byte side data key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Tag(pub [u8; 4]);

impl Tag {
    /// Compression method of the payload the table is attached to.
    pub const COMPRESSION_METHOD: Tag = Tag(*b"CMPM");
    /// Decompressed length of the payload the table is attached to.
    pub const DECOMPRESSED_LEN: Tag = Tag(*b"DCLE");

    /// Build a tag from a byte slice, which must be exactly four bytes.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        <[u8; 4]>::try_from(bytes)
            .map(Tag)
            .map_err(|_| Error::InvalidKey(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<")?;
        for b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        write!(f, ">")
    }
}

/// One key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SideDataPair {
    pub key: Tag,
    pub value: Vec<u8>,
}

impl SideDataPair {
    pub fn new(key: Tag, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// Ordered side data table. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SideData {
    pub entries: Vec<SideDataPair>,
}

impl SideData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry (builder style).
    pub fn with(mut self, key: Tag, value: impl Into<Vec<u8>>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: Tag, value: impl Into<Vec<u8>>) {
        self.entries.push(SideDataPair::new(key, value));
    }

    /// Last value stored under `key`.
    pub fn get(&self, key: Tag) -> Option<&[u8]> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.key == key)
            .map(|e| e.value.as_slice())
    }

    /// All values stored under `key`, in table order.
    pub fn get_all(&self, key: Tag) -> impl Iterator<Item = &[u8]> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.key == key)
            .map(|e| e.value.as_slice())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SideDataPair> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        1 + self.entries.iter().map(|e| 5 + e.value.len()).sum::<usize>()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(&self.entries)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = bytes;
        let table = Self::read_from(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(Error::CorruptPacket {
                offset: (bytes.len() - cursor.len()) as u64,
                reason: format!("{} trailing bytes after side data", cursor.len()),
            });
        }
        Ok(table)
    }

    /// Read one table from a stream.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let count = wire::read_u8(reader)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut key = [0u8; 4];
            wire::read_exact(reader, &mut key)?;
            let len = wire::read_u8(reader)?;
            let mut value = vec![0u8; len as usize];
            wire::read_exact(reader, &mut value)?;
            entries.push(SideDataPair {
                key: Tag(key),
                value,
            });
        }
        Ok(Self { entries })
    }

    /// Check that the table fits its single-byte count and length prefixes.
    pub fn validate(&self) -> Result<()> {
        if self.entries.len() > MAX_ENTRIES {
            return Err(Error::TooManyEntries {
                what: "side data entries",
                count: self.entries.len(),
            });
        }
        for entry in &self.entries {
            if entry.value.len() > MAX_VALUE_LEN {
                return Err(Error::ValueTooLong {
                    key: entry.key.to_string(),
                    len: entry.value.len(),
                });
            }
        }
        Ok(())
    }

    /// Append the encoding to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        self.validate()?;
        buf.reserve(self.encoded_len());
        buf.put_u8(self.entries.len() as u8);
        for entry in &self.entries {
            buf.put_slice(&entry.key.0);
            buf.put_u8(entry.value.len() as u8);
            buf.put_slice(&entry.value);
        }
        Ok(())
    }
}

impl fmt::Display for SideData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {} bytes", entry.key, entry.value.len())?;
        }
        write!(f, "]")
    }
}

impl FromIterator<SideDataPair> for SideData {
    fn from_iter<I: IntoIterator<Item = SideDataPair>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SideData {
    type Item = &'a SideDataPair;
    type IntoIter = std::slice::Iter<'a, SideDataPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Encode a sequence of pairs.
pub fn encode(entries: &[SideDataPair]) -> Result<Vec<u8>> {
    let table = SideData {
        entries: entries.to_vec(),
    };
    let mut buf = BytesMut::new();
    table.write_to(&mut buf)?;
    Ok(buf.to_vec())
}

/// Decode a sequence of pairs.
pub fn decode(bytes: &[u8]) -> Result<Vec<SideDataPair>> {
    Ok(SideData::decode(bytes)?.entries)
}
