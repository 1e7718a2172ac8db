//! Buffer for the packet region until the seek tables are final.

use crate::config::SpoolMode;
use crate::{Error, Result};
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};

pub(crate) enum Spool {
    Memory(Vec<u8>),
    File { writer: BufWriter<File>, len: u64 },
}

impl Spool {
    pub(crate) fn new(mode: SpoolMode) -> Result<Self> {
        Ok(match mode {
            SpoolMode::Memory => Self::Memory(Vec::new()),
            SpoolMode::TempFile => Self::File {
                writer: BufWriter::new(tempfile::tempfile()?),
                len: 0,
            },
        })
    }

    pub(crate) fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Self::Memory(buf) => buf.extend_from_slice(bytes),
            Self::File { writer, len } => {
                writer.write_all(bytes)?;
                *len += bytes.len() as u64;
            }
        }
        Ok(())
    }

    /// Bytes written so far.
    pub(crate) fn len(&self) -> u64 {
        match self {
            Self::Memory(buf) => buf.len() as u64,
            Self::File { len, .. } => *len,
        }
    }

    /// Copy the spooled bytes into `sink`, returning the count.
    pub(crate) fn copy_into<W: Write + ?Sized>(self, sink: &mut W) -> Result<u64> {
        match self {
            Self::Memory(buf) => {
                sink.write_all(&buf)?;
                Ok(buf.len() as u64)
            }
            Self::File { writer, len } => {
                let mut file = writer.into_inner().map_err(|e| e.into_error())?;
                file.seek(SeekFrom::Start(0))?;
                let copied = io::copy(&mut file, sink)?;
                if copied != len {
                    return Err(Error::Truncated {
                        need: len,
                        have: copied,
                    });
                }
                Ok(copied)
            }
        }
    }
}
