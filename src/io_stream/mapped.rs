//! Memory-mapped file backend.

use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use super::{block_span, BlockStore};
use crate::block::Block;

/// Hints are issued on page boundaries.
const PAGE_SIZE: u64 = 4096;

enum Mapping {
    ReadWrite(MmapMut),
    /// Dry runs map the file read-only; every write is refused.
    ReadOnly(Mmap),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Mapping::ReadWrite(m) => &m[..],
            Mapping::ReadOnly(m)  => &m[..],
        }
    }
}

/// A whole file mapped into memory.  Unmapped on drop.
pub struct MappedFile {
    map: Mapping,
}

impl MappedFile {
    /// Map `path` for writing, or read-only if `read_only` is set.
    pub fn open(path: &Path, read_only: bool) -> io::Result<Self> {
        if read_only {
            let file = File::open(path)?;
            // SAFETY: the mapping is private to this run; concurrent
            // modification of the file by another process is unsupported.
            let map = unsafe { MmapOptions::new().map(&file)? };
            Ok(Self { map: Mapping::ReadOnly(map) })
        } else {
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            // SAFETY: as above.
            let map = unsafe { MmapOptions::new().map_mut(&file)? };
            Ok(Self { map: Mapping::ReadWrite(map) })
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.map, Mapping::ReadOnly(_))
    }

    /// Page-aligned `(offset, len)` covering `[start, end)`, clamped to the map.
    #[cfg_attr(not(unix), allow(dead_code))]
    fn page_span(&self, start: u64, end: u64) -> Option<(usize, usize)> {
        let end = end.min(self.len());
        let start = start - start % PAGE_SIZE;
        (end > start).then(|| (start as usize, (end - start) as usize))
    }
}

impl BlockStore for MappedFile {
    fn len(&self) -> u64 {
        self.map.bytes().len() as u64
    }

    fn read_block(&self, offset: u64) -> io::Result<Block> {
        let span = block_span(offset, self.len())?;
        let mut b = Block::ZERO;
        b.0.copy_from_slice(&self.map.bytes()[span]);
        Ok(b)
    }

    fn write_block(&mut self, offset: u64, block: &Block) -> io::Result<()> {
        let span = block_span(offset, self.len())?;
        match &mut self.map {
            Mapping::ReadWrite(m) => {
                m[span].copy_from_slice(block.as_bytes());
                Ok(())
            }
            Mapping::ReadOnly(_) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file is mapped read-only",
            )),
        }
    }

    #[cfg(unix)]
    fn advise_sequential(&self, start: u64, end: u64) -> io::Result<()> {
        use memmap2::Advice;
        let Some((off, len)) = self.page_span(start, end) else { return Ok(()) };
        match &self.map {
            Mapping::ReadWrite(m) => m.advise_range(Advice::Sequential, off, len),
            Mapping::ReadOnly(m)  => m.advise_range(Advice::Sequential, off, len),
        }
    }

    #[cfg(unix)]
    fn release(&mut self, start: u64, end: u64) -> io::Result<()> {
        use memmap2::UncheckedAdvice;
        let Some((off, len)) = self.page_span(start, end) else { return Ok(()) };
        match &mut self.map {
            Mapping::ReadWrite(m) => {
                m.flush_async_range(off, len)?;
                // SAFETY: shared file mapping; dropped pages are re-read from
                // the page cache, so written data survives.
                unsafe { m.unchecked_advise_range(UncheckedAdvice::DontNeed, off, len) }
            }
            // SAFETY: read-only mapping, nothing to lose.
            Mapping::ReadOnly(m) => unsafe {
                m.unchecked_advise_range(UncheckedAdvice::DontNeed, off, len)
            },
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.map {
            Mapping::ReadWrite(m) => m.flush(),
            Mapping::ReadOnly(_)  => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_SIZE;
    use tempfile::NamedTempFile;

    fn temp_with(data: &[u8]) -> NamedTempFile {
        let f = NamedTempFile::new().unwrap();
        std::fs::write(f.path(), data).unwrap();
        f
    }

    #[test]
    fn writes_reach_the_file() {
        let f = temp_with(&[0u8; 8192]);
        {
            let mut m = MappedFile::open(f.path(), false).unwrap();
            assert!(!m.is_read_only());
            m.write_block(4096, &Block([0xabu8; BLOCK_SIZE])).unwrap();
            m.flush().unwrap();
        }
        let back = std::fs::read(f.path()).unwrap();
        assert_eq!(&back[4096..4160], &[0xabu8; 64][..]);
        assert!(back[..4096].iter().all(|&b| b == 0));
    }

    #[test]
    fn read_only_refuses_writes() {
        let f = temp_with(&[1u8; 256]);
        let mut m = MappedFile::open(f.path(), true).unwrap();
        assert_eq!(m.read_block(64).unwrap(), Block([1u8; BLOCK_SIZE]));
        let err = m.write_block(0, &Block::ZERO).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(std::fs::read(f.path()).unwrap(), vec![1u8; 256]);
    }

    #[cfg(unix)]
    #[test]
    fn hints_are_accepted() {
        let f = temp_with(&[0u8; 3 * 4096]);
        let mut m = MappedFile::open(f.path(), false).unwrap();
        m.advise_sequential(100, 3 * 4096).unwrap();
        m.write_block(0, &Block([2u8; BLOCK_SIZE])).unwrap();
        m.release(0, 5000).unwrap();
        assert_eq!(m.read_block(0).unwrap(), Block([2u8; BLOCK_SIZE]));
    }
}
