//! Key scanner and single-block helpers.
//!
//! # How the scan works
//!
//! For every generated range `(offset, _)` inside the bounds:
//!
//! 1. the blocks at `offset ± 64` and `offset ± 128` must all be zero,
//! 2. the block at `offset` must not be zero,
//! 3. the block at `offset` is pushed into a five-slot confidence window.
//!
//! The first time the window is full it must be unanimous.  A unanimous
//! window is the key; a split window ends the scan as inconsistent.
//! Running out of ranges first is a not-found.
//!
//! Neighbours that fall before the start of the file or run past its end
//! are treated as non-zero.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::{ConfidenceWindow, KeyRecoveryError, RecoveryOutcome, WindowVerdict, SKIPPED_HEAD_RANGES};
use crate::block::{xor_bytes, Block, KeyBlock, BLOCK_SIZE};
use crate::ranges::{ranges, ranges_within};

const BS: u64 = BLOCK_SIZE as u64;

/// Neighbour distances checked around each candidate.
const NEIGHBOURS: [i64; 4] = [-2 * BS as i64, -(BS as i64), BS as i64, 2 * BS as i64];

/// Default lower bound: the offset of the first range after the skipped head.
/// Files with too few ranges get nothing scanned.
pub fn default_lower_limit(usable_size: u64) -> u64 {
    ranges(usable_size)
        .nth(SKIPPED_HEAD_RANGES)
        .map(|r| r.offset)
        .unwrap_or(usable_size)
}

/// Read up to `size` bytes at `offset`.  Shorter at end-of-file.
pub fn extract_block<R: Read + Seek>(reader: &mut R, offset: u64, size: usize) -> io::Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity(size);
    reader.take(size as u64).read_to_end(&mut buf)?;
    log::debug!("read {} bytes at {offset} for {size}", buf.len());
    Ok(buf)
}

/// A whole block at `offset`, or `None` if the file ends first.
fn block_at<R: Read + Seek>(reader: &mut R, offset: u64) -> io::Result<Option<Block>> {
    Ok(Block::from_slice(&extract_block(reader, offset, BLOCK_SIZE)?))
}

fn isolated<R: Read + Seek>(reader: &mut R, offset: u64) -> io::Result<bool> {
    for d in NEIGHBOURS {
        let Some(at) = offset.checked_add_signed(d) else { return Ok(false) };
        match block_at(reader, at)? {
            Some(b) if b.is_zero() => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Scan for the key over ranges whose offset lies in `[lower, upper)`.
///
/// `lower` defaults to [`default_lower_limit`], `upper` to `usable_size`.
/// Only genuine I/O failures are returned as `Err`.
pub fn scan<R: Read + Seek>(
    reader:      &mut R,
    usable_size: u64,
    lower:       Option<u64>,
    upper:       Option<u64>,
) -> io::Result<RecoveryOutcome> {
    let lower = lower.unwrap_or_else(|| default_lower_limit(usable_size));
    let upper = upper.unwrap_or(usable_size);
    log::info!("scanning for key between {lower} and {upper} of {usable_size}");

    let mut window = ConfidenceWindow::default();
    for r in ranges_within(usable_size, lower, upper) {
        if !isolated(reader, r.offset)? {
            continue;
        }
        let Some(candidate) = block_at(reader, r.offset)? else { continue };
        if candidate.is_zero() {
            log::debug!("isolated block at {} is zero", r.offset);
            continue;
        }

        log::debug!("candidate at {}: {}", r.offset, candidate);
        match window.push(r.offset, candidate) {
            WindowVerdict::Filling(n) => {
                log::info!("only {n} candidate block(s) so far, latest at {}", r.offset);
            }
            WindowVerdict::Unanimous(key) => {
                log::info!("found key, agreed on at {:?}", window.entries().iter().map(|e| e.0).collect::<Vec<_>>());
                return Ok(RecoveryOutcome::Found(key));
            }
            WindowVerdict::Disagreement => {
                log::warn!("candidates disagree: {:?}", window.entries());
                return Ok(RecoveryOutcome::Inconsistent(window.entries()));
            }
        }
    }

    log::warn!("no key found, {} candidate(s) seen", window.seen());
    Ok(RecoveryOutcome::NotFound { candidates: window.seen() })
}

/// Recover the key of the file at `path`.
pub fn recover_key(
    path:        &Path,
    usable_size: u64,
    lower:       Option<u64>,
    upper:       Option<u64>,
) -> Result<KeyBlock, KeyRecoveryError> {
    let mut f = File::open(path)?;
    scan(&mut f, usable_size, lower, upper)?.into_result()
}

/// Offsets of generated ranges in `[lower, upper)` whose first block equals
/// `needle`.  Useful to find where a partially finished run stopped.
pub fn find_block<R: Read + Seek>(
    reader:      &mut R,
    usable_size: u64,
    needle:      &Block,
    lower:       u64,
    upper:       u64,
) -> io::Result<Vec<u64>> {
    let mut hits = Vec::new();
    for (i, r) in ranges_within(usable_size, lower, upper).enumerate() {
        if block_at(reader, r.offset)?.as_ref() == Some(needle) {
            log::info!("found needle in range {i} at {}", r.offset);
            hits.push(r.offset);
        }
    }
    Ok(hits)
}

/// XOR the bytes at `offset` against `key`, truncated to whatever is
/// available in the file.
pub fn xor_at<R: Read + Seek>(reader: &mut R, offset: u64, key: &[u8]) -> io::Result<Vec<u8>> {
    let data = extract_block(reader, offset, key.len())?;
    Ok(xor_bytes(&data, key))
}
