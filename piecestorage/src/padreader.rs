// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Readers that present a payload padded with zeros to its unpadded piece size.
//!
//! Pieces are stored as their CAR payload only. Consumers address them as if
//! they had the full unpadded piece size, so the tail past the payload reads as
//! zeros. [`Inflator`] does this over a sequential stream, [`ZeroPadReader`]
//! over a seekable one.

use std::cmp;
use std::io::{self, Read, Seek, SeekFrom};

use fvm_shared::piece::UnpaddedPieceSize;

use crate::PieceStorageError;

/// Random access to piece bytes.
pub trait PieceReader: Read + Seek + Send {
    /// Reads from `offset` into `buf`, leaving the cursor after the bytes read.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        self.read(buf)
    }
}

impl<T: Read + Seek + Send> PieceReader for T {}

fn check_sizes(payload_size: u64, size: UnpaddedPieceSize) -> Result<(), PieceStorageError> {
    if payload_size > size.0 {
        return Err(PieceStorageError::InvalidPieceSize(format!(
            "payload of {} bytes exceeds unpadded piece size {}",
            payload_size, size.0
        )));
    }
    Ok(())
}

fn resolve(pos: u64, size: u64, target: SeekFrom) -> io::Result<u64> {
    let (base, offset) = match target {
        SeekFrom::Start(n) => return Ok(n),
        SeekFrom::Current(n) => (pos, n),
        SeekFrom::End(n) => (size, n),
    };
    base.checked_add_signed(offset).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative or overflowing position")
    })
}

fn fill_zeros(buf: &mut [u8], remaining: u64) -> usize {
    let n = cmp::min(buf.len() as u64, remaining) as usize;
    buf[..n].fill(0);
    n
}

/// Streams a payload followed by zeros. Only forward seeks are possible; they
/// consume the skipped source bytes.
pub struct Inflator<R> {
    inner: R,
    payload_size: u64,
    size: u64,
    pos: u64,
}

impl<R: Read> Inflator<R> {
    pub fn new(
        inner: R,
        payload_size: u64,
        size: UnpaddedPieceSize,
    ) -> Result<Self, PieceStorageError> {
        check_sizes(payload_size, size)?;
        Ok(Self { inner, payload_size, size: size.0, pos: 0 })
    }

    /// Discards payload bytes up to `to`. `pos` tracks every byte consumed, so
    /// a seek retried after an error resumes where the failed one stopped.
    fn skip_payload(&mut self, to: u64) -> io::Result<()> {
        let end = cmp::min(to, self.payload_size);
        let mut scratch = [0u8; 8192];
        while self.pos < end {
            let want = cmp::min(scratch.len() as u64, end - self.pos) as usize;
            match self.inner.read(&mut scratch[..want]) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => self.pos += n as u64,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for Inflator<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.size {
            return Ok(0);
        }
        let n = if self.pos < self.payload_size {
            let want = cmp::min(buf.len() as u64, self.payload_size - self.pos) as usize;
            let n = self.inner.read(&mut buf[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("payload ended at {} of {} bytes", self.pos, self.payload_size),
                ));
            }
            n
        } else {
            fill_zeros(buf, self.size - self.pos)
        };
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read> Seek for Inflator<R> {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let to = resolve(self.pos, self.size, target)?;
        if to < self.pos {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "transient piece reader cannot seek backwards",
            ));
        }
        self.skip_payload(to)?;
        self.pos = to;
        Ok(to)
    }
}

/// Serves a seekable payload padded with zeros. Ranges past the payload never
/// touch the underlying reader.
pub struct ZeroPadReader<R> {
    inner: R,
    payload_size: u64,
    size: u64,
    pos: u64,
    inner_pos: Option<u64>,
}

impl<R: Read + Seek> ZeroPadReader<R> {
    pub fn new(
        inner: R,
        payload_size: u64,
        size: UnpaddedPieceSize,
    ) -> Result<Self, PieceStorageError> {
        check_sizes(payload_size, size)?;
        Ok(Self { inner, payload_size, size: size.0, pos: 0, inner_pos: None })
    }
}

impl<R: Read + Seek> Read for ZeroPadReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.size {
            return Ok(0);
        }
        let n = if self.pos < self.payload_size {
            if self.inner_pos != Some(self.pos) {
                self.inner.seek(SeekFrom::Start(self.pos))?;
            }
            let want = cmp::min(buf.len() as u64, self.payload_size - self.pos) as usize;
            let n = self.inner.read(&mut buf[..want])?;
            if n == 0 {
                self.inner_pos = None;
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("payload ended at {} of {} bytes", self.pos, self.payload_size),
                ));
            }
            self.inner_pos = Some(self.pos + n as u64);
            n
        } else {
            fill_zeros(buf, self.size - self.pos)
        };
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for ZeroPadReader<R> {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        self.pos = resolve(self.pos, self.size, target)?;
        Ok(self.pos)
    }
}
