//! Little-endian primitives over `Read` with explicit truncation errors.

use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Read};

/// Read exactly `len` bytes. A short read is [`Error::Truncated`] with the
/// number of bytes that did arrive.
pub(crate) fn read_bytes<R: Read>(reader: &mut R, len: u64) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(len.min(64 * 1024) as usize);
    let have = reader.by_ref().take(len).read_to_end(&mut data)? as u64;
    if have < len {
        return Err(Error::Truncated { need: len, have });
    }
    Ok(data)
}

/// Fill `buf` completely.
pub(crate) fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let data = read_bytes(reader, buf.len() as u64)?;
    buf.copy_from_slice(&data);
    Ok(())
}

pub(crate) fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    reader.read_u8().map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::Truncated { need: 1, have: 0 },
        _ => e.into(),
    })
}

pub(crate) fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let bytes = read_bytes(reader, 8)?;
    Ok(LittleEndian::read_u64(&bytes))
}

/// Read `len` bytes, checking `len` against `available` before allocating.
pub(crate) fn read_vec<R: Read>(reader: &mut R, len: u64, available: u64) -> Result<Vec<u8>> {
    if len > available {
        return Err(Error::Truncated {
            need: len,
            have: available,
        });
    }
    read_bytes(reader, len)
}
