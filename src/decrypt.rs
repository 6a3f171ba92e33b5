//! Decryption engine: inverts the chained XOR over every generated range.
//!
//! The engine works against any [`BlockStore`].  [`decrypt_file`] maps the
//! file with [`MappedFile`]; tests and benchmarks use
//! [`MemoryStore`](crate::io_stream::MemoryStore).
//!
//! A run that fails part-way leaves every block written so far in place.
//! There is no rollback; restart from the last reported offset with an
//! explicit lower limit.

use std::io;
use std::path::Path;
use thiserror::Error;

use crate::block::{ChainDecoder, KeyBlock, BLOCK_SIZE};
use crate::io_stream::{BlockStore, MappedFile};
use crate::progress::ProgressTracker;
use crate::ranges::{ranges_within, ByteRange};

/// Ranges processed between two progress reports.
pub const PROGRESS_INTERVAL: u64 = 1 << 18;

#[derive(Error, Debug)]
pub enum DecryptError {
    #[error("range at {offset} is {length} bytes, shorter than one block")]
    RangeTooShort { offset: u64, length: u64 },
    #[error("lower limit {lower} is above upper limit {upper}")]
    InvalidBounds { lower: u64, upper: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct DecryptOptions {
    /// Compute everything, write nothing.
    pub dry_run:        bool,
    /// First range offset to process.  Defaults to 0.
    pub lower_limit:    Option<u64>,
    /// Ranges at or beyond this offset are skipped.  Defaults to the usable size.
    pub upper_limit:    Option<u64>,
    pub progress_every: u64,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            dry_run:        false,
            lower_limit:    None,
            upper_limit:    None,
            progress_every: PROGRESS_INTERVAL,
        }
    }
}

impl DecryptOptions {
    pub fn dry_run() -> Self {
        Self { dry_run: true, ..Self::default() }
    }
}

/// Counters for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptStats {
    pub ranges:        u64,
    pub blocks:        u64,
    pub bytes_written: u64,
}

/// Decrypt the generated ranges of a `usable_size`-byte file held in `store`.
pub fn decrypt_store<S: BlockStore>(
    store:       &mut S,
    key:         &KeyBlock,
    usable_size: u64,
    opts:        &DecryptOptions,
) -> Result<DecryptStats, DecryptError> {
    let lower = opts.lower_limit.unwrap_or(0);
    let upper = opts.upper_limit.unwrap_or(usable_size);
    if lower > upper {
        return Err(DecryptError::InvalidBounds { lower, upper });
    }
    decrypt_ranges(store, key, ranges_within(usable_size, lower, upper), usable_size, lower, opts)
}

/// Decrypt an explicit range sequence.  `start` is where progress is
/// measured from.
pub fn decrypt_ranges<S, I>(
    store:       &mut S,
    key:         &KeyBlock,
    ranges:      I,
    usable_size: u64,
    start:       u64,
    opts:        &DecryptOptions,
) -> Result<DecryptStats, DecryptError>
where
    S: BlockStore,
    I: IntoIterator<Item = ByteRange>,
{
    let mut hints = match store.advise_sequential(start, usable_size) {
        Ok(()) => true,
        Err(e) => {
            log::info!("running without access hints: {e}");
            false
        }
    };

    let every = opts.progress_every.max(1);
    let mut tracker = ProgressTracker::new(usable_size, start);
    let mut stats = DecryptStats::default();

    for (n, range) in ranges.into_iter().enumerate() {
        let n = n as u64 + 1;
        if n % every == 0 {
            let last = tracker.last_position();
            let sample = tracker.sample(range.offset);
            log::warn!("range {n} at {} of {usable_size}: {sample}", range.offset);
            if hints {
                if let Err(e) = store.release(last, range.offset) {
                    log::info!("dropping access hints: {e}");
                    hints = false;
                }
            }
        }

        if range.length < BLOCK_SIZE as u64 {
            return Err(DecryptError::RangeTooShort { offset: range.offset, length: range.length });
        }

        let mut chain = ChainDecoder::new(key);
        for offset in range.block_offsets() {
            let ciphertext = store.read_block(offset)?;
            let plaintext = chain.decode(&ciphertext);
            if !opts.dry_run {
                store.write_block(offset, &plaintext)?;
                stats.bytes_written += BLOCK_SIZE as u64;
            }
            stats.blocks += 1;
        }
        stats.ranges += 1;
    }

    if !opts.dry_run {
        store.flush()?;
    }
    log::info!(
        "processed {} range(s), {} block(s){}",
        stats.ranges,
        stats.blocks,
        if opts.dry_run { " (dry run)" } else { "" },
    );
    Ok(stats)
}

/// Map the file at `path` (read-only for dry runs) and decrypt it in place.
pub fn decrypt_file(
    path:        &Path,
    key:         &KeyBlock,
    usable_size: u64,
    opts:        &DecryptOptions,
) -> Result<DecryptStats, DecryptError> {
    let mut store = MappedFile::open(path, opts.dry_run)?;
    decrypt_store(&mut store, key, usable_size, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{encrypt_range, Block};
    use crate::io_stream::MemoryStore;
    use crate::ranges::ranges;

    fn key() -> KeyBlock {
        let mut k = [0u8; BLOCK_SIZE];
        for (i, b) in k.iter_mut().enumerate() { *b = (i as u8) ^ 0xc3; }
        Block(k)
    }

    fn plaintext(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i * 7 % 256) as u8).collect()
    }

    fn encrypted(data: &[u8], key: &KeyBlock) -> Vec<u8> {
        let mut out = data.to_vec();
        for r in ranges(data.len() as u64) {
            encrypt_range(&mut out[r.offset as usize..r.end() as usize], key);
        }
        out
    }

    #[test]
    fn decrypts_mid_tier_file() {
        let k = key();
        let plain = plaintext(20_000);
        let mut store = MemoryStore::new(encrypted(&plain, &k));
        assert_ne!(store.as_slice(), &plain[..]);
        let stats = decrypt_store(&mut store, &k, 20_000, &DecryptOptions::default()).unwrap();
        assert_eq!(store.as_slice(), &plain[..]);
        assert_eq!(stats.ranges, ranges(20_000).count() as u64);
        assert_eq!(stats.blocks, stats.ranges);
        assert_eq!(stats.bytes_written, stats.blocks * 64);
    }

    #[test]
    fn decrypts_whole_small_file_with_chaining() {
        let k = key();
        let plain = plaintext(4000);
        let mut store = MemoryStore::new(encrypted(&plain, &k));
        let stats = decrypt_store(&mut store, &k, 4000, &DecryptOptions::default()).unwrap();
        assert_eq!(stats.ranges, 1);
        assert_eq!(stats.blocks, 4000 / 64);
        assert_eq!(store.as_slice(), &plain[..]);
    }

    #[test]
    fn dry_run_never_writes() {
        let k = key();
        let cipher = encrypted(&plaintext(20_000), &k);
        let mut store = MemoryStore::new(cipher.clone());
        let stats = decrypt_store(&mut store, &Block([0x42; BLOCK_SIZE]), 20_000, &DecryptOptions::dry_run()).unwrap();
        assert_eq!(stats.bytes_written, 0);
        assert!(stats.blocks > 0);
        assert_eq!(store.into_inner(), cipher);
    }

    #[test]
    fn bounds_restrict_processing() {
        let k = key();
        let plain = plaintext(20_000);
        let cipher = encrypted(&plain, &k);
        let mut store = MemoryStore::new(cipher.clone());
        let opts = DecryptOptions { lower_limit: Some(960), upper_limit: Some(1920), ..Default::default() };
        let stats = decrypt_store(&mut store, &k, 20_000, &opts).unwrap();
        assert_eq!(stats.ranges, 5);
        let out = store.into_inner();
        assert_eq!(&out[960..1920], &plain[960..1920]);
        assert_eq!(&out[..960], &cipher[..960]);
        assert_eq!(&out[1920..], &cipher[1920..]);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut store = MemoryStore::new(vec![0u8; 10_000]);
        let opts = DecryptOptions { lower_limit: Some(5000), upper_limit: Some(100), ..Default::default() };
        let err = decrypt_store(&mut store, &key(), 10_000, &opts).unwrap_err();
        assert!(matches!(err, DecryptError::InvalidBounds { lower: 5000, upper: 100 }));
    }

    #[test]
    fn short_range_is_an_invariant_violation() {
        let mut store = MemoryStore::new(vec![0u8; 1024]);
        let bad = vec![ByteRange::new(0, 64), ByteRange::new(192, 32)];
        let err = decrypt_ranges(&mut store, &key(), bad, 1024, 0, &DecryptOptions::default()).unwrap_err();
        assert!(matches!(err, DecryptError::RangeTooShort { offset: 192, length: 32 }));
        // The first range was already written.
        assert_eq!(&store.as_slice()[..64], key().as_bytes());
    }

    #[test]
    fn range_past_store_end_is_io_error() {
        let mut store = MemoryStore::new(vec![0u8; 100]);
        let err = decrypt_ranges(&mut store, &key(), vec![ByteRange::new(64, 64)], 100, 0, &DecryptOptions::default())
            .unwrap_err();
        assert!(matches!(err, DecryptError::Io(_)));
    }

    #[test]
    fn progress_reporting_does_not_change_output() {
        let k = key();
        let plain = plaintext(50_000);
        let mut store = MemoryStore::new(encrypted(&plain, &k));
        let opts = DecryptOptions { progress_every: 3, ..Default::default() };
        decrypt_store(&mut store, &k, 50_000, &opts).unwrap();
        assert_eq!(store.as_slice(), &plain[..]);
    }
}
