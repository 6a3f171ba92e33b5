//! Range generator: reproduces which byte ranges the ransomware touched.
//!
//! The selection depends on nothing but the usable file size:
//!
//! | Usable size        | Ranges                                                  |
//! |--------------------|---------------------------------------------------------|
//! | `< 5000`           | one range `(0, size - size % 64)`                       |
//! | `5000 ..= 1 GiB`   | a 64-byte range every 192 bytes, starting at 0          |
//! | `> 1 GiB`          | `(0, 5000)`, then a 64-byte range every 6400 bytes from 5000 |
//!
//! A stepped range is only emitted while it fits entirely inside the file.

use crate::block::BLOCK_SIZE;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Files below this size are encrypted whole; larger-than-1-GiB files get
/// their head encrypted up to here.
pub const HEAD_SIZE: u64 = 5000;
/// Step between encrypted blocks for files up to 1 GiB (128 skipped + 64).
pub const SMALL_STEP: u64 = 128 + 64;
/// Step between encrypted blocks for files above 1 GiB.
pub const LARGE_STEP: u64 = 6400;

const BS: u64 = BLOCK_SIZE as u64;

/// One contiguous range of ransomware-touched bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Offsets of every whole block inside the range.
    pub fn block_offsets(&self) -> impl Iterator<Item = u64> {
        let end = self.end();
        (self.offset..end)
            .step_by(BLOCK_SIZE)
            .take_while(move |o| o + BS <= end)
    }
}

/// Lazy iterator over the ranges of a file of a given usable size.
#[derive(Debug, Clone)]
pub struct Ranges {
    size: u64,
    head: Option<ByteRange>,
    next: u64,
    step: u64,
}

/// Generate the ranges for a file whose usable (pre-footer) size is `size`.
///
/// Pure and restartable: the same size always yields the same sequence.
pub fn ranges(size: u64) -> Ranges {
    if size < HEAD_SIZE {
        let aligned = size - size % BS;
        Ranges {
            size,
            // Files under one block have nothing the ransomware could touch.
            head: (aligned > 0).then(|| ByteRange::new(0, aligned)),
            next: size,
            step: BS,
        }
    } else if size <= GIB {
        Ranges { size, head: None, next: 0, step: SMALL_STEP }
    } else {
        Ranges {
            size,
            head: Some(ByteRange::new(0, HEAD_SIZE)),
            next: HEAD_SIZE,
            step: LARGE_STEP,
        }
    }
}

/// The ranges of a `size`-byte file whose offset lies in `[lower, upper)`.
pub fn ranges_within(size: u64, lower: u64, upper: u64) -> impl Iterator<Item = ByteRange> {
    ranges(size).filter(move |r| lower <= r.offset && r.offset < upper)
}

impl Iterator for Ranges {
    type Item = ByteRange;

    fn next(&mut self) -> Option<ByteRange> {
        if let Some(head) = self.head.take() {
            return Some(head);
        }
        if self.next >= self.size || self.next + BS > self.size {
            self.next = self.size;
            return None;
        }
        let r = ByteRange::new(self.next, BS);
        self.next += self.step;
        Some(r)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let head = self.head.is_some() as u64;
        let stepped = if self.next + BS <= self.size {
            (self.size - BS - self.next) / self.step + 1
        } else {
            0
        };
        let n = (head + stepped) as usize;
        (n, Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tiny_file_is_whole_range() {
        let v: Vec<_> = ranges(4999).collect();
        assert_eq!(v, vec![ByteRange::new(0, 4999 - 4999 % 64)]);
        assert_eq!(v[0].length, 4992);
    }

    #[test]
    fn sub_block_file_has_no_ranges() {
        assert_eq!(ranges(0).count(), 0);
        assert_eq!(ranges(63).count(), 0);
        assert_eq!(ranges(64).collect::<Vec<_>>(), vec![ByteRange::new(0, 64)]);
    }

    #[test]
    fn mid_tier_steps_by_192() {
        let v: Vec<_> = ranges(5000).collect();
        assert_eq!(v[0], ByteRange::new(0, 64));
        assert_eq!(v[1], ByteRange::new(192, 64));
        assert_eq!(v[2], ByteRange::new(384, 64));
        // 4800 + 64 <= 5000 is the last one that fits.
        assert_eq!(*v.last().unwrap(), ByteRange::new(4800, 64));
        assert_eq!(v.len(), 26);
    }

    #[test]
    fn exactly_one_gib_stays_in_mid_tier() {
        let mut r = ranges(GIB);
        assert_eq!(r.next(), Some(ByteRange::new(0, 64)));
        assert_eq!(r.next(), Some(ByteRange::new(192, 64)));
    }

    #[test]
    fn large_tier_primes_head() {
        let mut r = ranges(GIB + 1);
        assert_eq!(r.next(), Some(ByteRange::new(0, 5000)));
        assert_eq!(r.next(), Some(ByteRange::new(5000, 64)));
        assert_eq!(r.next(), Some(ByteRange::new(11400, 64)));
        assert_eq!(r.next(), Some(ByteRange::new(17800, 64)));
    }

    #[test]
    fn last_range_never_overflows() {
        // The step after 4992 starts at 5184 and would end at 5248.
        let v: Vec<_> = ranges(5200).collect();
        assert!(v.iter().all(|r| r.end() <= 5200));
        assert_eq!(v.last().unwrap().offset, 4992);
    }

    #[test]
    fn head_range_blocks_skip_tail() {
        let head = ByteRange::new(0, 5000);
        let offs: Vec<_> = head.block_offsets().collect();
        assert_eq!(offs.len(), 78);
        assert_eq!(*offs.last().unwrap(), 77 * 64);
    }

    #[test]
    fn within_filters_half_open() {
        let v: Vec<_> = ranges_within(10_000, 192, 576).collect();
        assert_eq!(v, vec![ByteRange::new(192, 64), ByteRange::new(384, 64)]);
    }

    #[test]
    fn size_hint_is_exact() {
        for size in [0u64, 63, 64, 4999, 5000, 5200, 10_000, 123_457] {
            let r = ranges(size);
            assert_eq!(r.size_hint().0, r.clone().count(), "size {size}");
        }
    }

    proptest! {
        #[test]
        fn ranges_are_ordered_and_bounded(size in 0u64..2_000_000) {
            let v: Vec<_> = ranges(size).collect();
            for w in v.windows(2) {
                prop_assert!(w[0].offset < w[1].offset);
            }
            for r in &v {
                prop_assert!(r.end() <= size);
                prop_assert!(r.length >= 64);
            }
            let again: Vec<_> = ranges(size).collect();
            prop_assert_eq!(v, again);
        }

        #[test]
        fn large_files_are_deterministic(extra in 1u64..1_000_000) {
            let size = GIB + extra;
            let a: Vec<_> = ranges(size).take(64).collect();
            let b: Vec<_> = ranges(size).take(64).collect();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a[0], ByteRange::new(0, 5000));
            for (i, r) in a.iter().skip(1).enumerate() {
                prop_assert_eq!(r.offset, 5000 + 6400 * i as u64);
            }
        }
    }
}
