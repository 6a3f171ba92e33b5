//! Block-addressed storage the decryption engine reads and writes through.
//!
//! # Backends
//! - [`MemoryStore`] keeps the bytes in a `Vec<u8>`.  No access hints.
//! - [`MappedFile`] memory-maps a file, read-write or (for dry runs)
//!   read-only, and forwards access hints to the kernel where the platform
//!   supports them.
//!
//! # Hints
//! [`BlockStore::advise_sequential`] and [`BlockStore::release`] are
//! optimisations only.  The default implementations report
//! `ErrorKind::Unsupported`; callers log that and carry on without them.

mod mapped;

pub use mapped::MappedFile;

use std::io;

use crate::block::{Block, BLOCK_SIZE};

/// Random access to 64-byte blocks of a byte store.
pub trait BlockStore {
    /// Length of the store in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the block starting at `offset`.  Fails if it runs past the end.
    fn read_block(&self, offset: u64) -> io::Result<Block>;

    /// Overwrite the block starting at `offset`.
    fn write_block(&mut self, offset: u64, block: &Block) -> io::Result<()>;

    /// Announce sequential access over `[start, end)`.
    fn advise_sequential(&self, _start: u64, _end: u64) -> io::Result<()> {
        Err(unsupported())
    }

    /// Let already-processed pages in `[start, end)` go.
    fn release(&mut self, _start: u64, _end: u64) -> io::Result<()> {
        Err(unsupported())
    }

    /// Push pending writes to the backing storage.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn unsupported() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "access hints are not supported by this store")
}

/// Bounds-checked byte range of one block inside a store of `len` bytes.
pub(crate) fn block_span(offset: u64, len: u64) -> io::Result<std::ops::Range<usize>> {
    let end = offset
        .checked_add(BLOCK_SIZE as u64)
        .filter(|end| *end <= len)
        .ok_or_else(|| io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("block at {offset} runs past end of store ({len} bytes)"),
        ))?;
    Ok(offset as usize..end as usize)
}

// ── MemoryStore ──────────────────────────────────────────────────────────────

/// In-memory store, used by tests and benchmarks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    data: Vec<u8>,
}

impl MemoryStore {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl BlockStore for MemoryStore {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_block(&self, offset: u64) -> io::Result<Block> {
        let span = block_span(offset, self.len())?;
        let mut b = Block::ZERO;
        b.0.copy_from_slice(&self.data[span]);
        Ok(b)
    }

    fn write_block(&mut self, offset: u64, block: &Block) -> io::Result<()> {
        let span = block_span(offset, self.len())?;
        self.data[span].copy_from_slice(block.as_bytes());
        Ok(())
    }
}
