//! Key recovery from known-plaintext structure.
//!
//! Runs of zero plaintext encrypt to the key itself in every single-block
//! range.  An isolated non-zero block whose neighbours at ±64 and ±128 are
//! all zero is therefore a strong key candidate.  Five candidates in a row
//! must agree before the key is trusted; see [`scanner::scan`].

pub mod scanner;

pub use scanner::{extract_block, find_block, recover_key, scan, xor_at};

use std::collections::VecDeque;
use std::io;
use thiserror::Error;

use crate::block::KeyBlock;

/// Number of agreeing candidates required before a key is trusted.
pub const CONFIDENCE: usize = 5;

/// Ranges skipped at the head of the file unless a lower bound is given.
pub const SKIPPED_HEAD_RANGES: usize = 5;

#[derive(Error, Debug)]
pub enum KeyRecoveryError {
    #[error("no key found: fewer than 5 isolated candidates ({found} seen)")]
    NotFound { found: usize },
    #[error("key candidates disagree: {}", describe(.0))]
    Inconsistent(Vec<(u64, KeyBlock)>),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn describe(window: &[(u64, KeyBlock)]) -> String {
    window
        .iter()
        .map(|(off, b)| format!("{off}:{}", &b.to_hex()[..16]))
        .collect::<Vec<_>>()
        .join(", ")
}

/// How a key scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Five consecutive candidates agreed on this block.
    Found(KeyBlock),
    /// The scan ran out of ranges; carries how many candidates were seen.
    NotFound { candidates: usize },
    /// The window filled with differing blocks.
    Inconsistent(Vec<(u64, KeyBlock)>),
}

impl RecoveryOutcome {
    pub fn into_result(self) -> Result<KeyBlock, KeyRecoveryError> {
        match self {
            RecoveryOutcome::Found(k)                => Ok(k),
            RecoveryOutcome::NotFound { candidates } => Err(KeyRecoveryError::NotFound { found: candidates }),
            RecoveryOutcome::Inconsistent(w)         => Err(KeyRecoveryError::Inconsistent(w)),
        }
    }
}

// ── ConfidenceWindow ─────────────────────────────────────────────────────────

/// What happened when a candidate entered the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowVerdict {
    /// Not enough candidates yet.
    Filling(usize),
    Unanimous(KeyBlock),
    Disagreement,
}

/// Bounded queue of `(offset, block)` candidates; the oldest is evicted
/// when a new one arrives at capacity.
#[derive(Debug, Clone)]
pub struct ConfidenceWindow {
    entries:  VecDeque<(u64, KeyBlock)>,
    capacity: usize,
    seen:     usize,
}

impl Default for ConfidenceWindow {
    fn default() -> Self {
        Self::new(CONFIDENCE)
    }
}

impl ConfidenceWindow {
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity), capacity: capacity.max(1), seen: 0 }
    }

    pub fn push(&mut self, offset: u64, block: KeyBlock) -> WindowVerdict {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((offset, block));
        self.seen += 1;

        if self.entries.len() < self.capacity {
            return WindowVerdict::Filling(self.entries.len());
        }
        if self.entries.iter().all(|(_, b)| *b == block) {
            WindowVerdict::Unanimous(block)
        } else {
            WindowVerdict::Disagreement
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total candidates pushed over the window's lifetime.
    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn entries(&self) -> Vec<(u64, KeyBlock)> {
        self.entries.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BLOCK_SIZE};

    #[test]
    fn window_needs_five_agreeing() {
        let k = Block([3u8; BLOCK_SIZE]);
        let mut w = ConfidenceWindow::default();
        for i in 1..CONFIDENCE {
            assert_eq!(w.push(i as u64 * 192, k), WindowVerdict::Filling(i));
        }
        assert_eq!(w.push(960, k), WindowVerdict::Unanimous(k));
        assert_eq!(w.len(), CONFIDENCE);
    }

    #[test]
    fn window_flags_disagreement() {
        let k = Block([3u8; BLOCK_SIZE]);
        let mut w = ConfidenceWindow::default();
        for i in 0..4 {
            w.push(i, k);
        }
        assert_eq!(w.push(4, Block([4u8; BLOCK_SIZE])), WindowVerdict::Disagreement);
    }

    #[test]
    fn window_evicts_oldest() {
        let mut w = ConfidenceWindow::new(2);
        let a = Block([1u8; BLOCK_SIZE]);
        let b = Block([2u8; BLOCK_SIZE]);
        w.push(0, a);
        w.push(1, b);
        assert_eq!(w.push(2, b), WindowVerdict::Unanimous(b));
        assert_eq!(w.entries(), vec![(1, b), (2, b)]);
        assert_eq!(w.seen(), 3);
    }

    #[test]
    fn outcome_maps_to_errors() {
        let k = Block([9u8; BLOCK_SIZE]);
        assert_eq!(RecoveryOutcome::Found(k).into_result().unwrap(), k);
        assert!(matches!(
            RecoveryOutcome::NotFound { candidates: 4 }.into_result(),
            Err(KeyRecoveryError::NotFound { found: 4 })
        ));
        let err = RecoveryOutcome::Inconsistent(vec![(0, k)]).into_result().unwrap_err();
        assert!(err.to_string().contains("disagree"));
    }
}
