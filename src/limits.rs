//! Byte-offset bounds given on the command line: decimal, `0x` hex, or a
//! percentage of the usable size.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid offset {input:?}: expected a number, 0x-prefixed hex, or a percentage")]
pub struct LimitParseError {
    pub input: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Limit {
    Absolute(u64),
    Percent(f64),
}

impl Limit {
    /// Byte offset inside a file of `size` usable bytes.
    pub fn resolve(&self, size: u64) -> u64 {
        match *self {
            Limit::Absolute(n) => n,
            Limit::Percent(p) => {
                let off = (p / 100.0 * size as f64) as u64;
                log::info!("{p}% of {size} is {off}");
                off
            }
        }
    }
}

impl FromStr for Limit {
    type Err = LimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || LimitParseError { input: s.to_owned() };
        if let Some(pct) = s.strip_suffix('%') {
            let p: f64 = pct.trim().parse().map_err(|_| err())?;
            if !(0.0..=100.0).contains(&p) {
                return Err(err());
            }
            return Ok(Limit::Percent(p));
        }
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u64::from_str_radix(hex, 16).map(Limit::Absolute).map_err(|_| err());
        }
        s.parse().map(Limit::Absolute).map_err(|_| err())
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Absolute(n) => write!(f, "{n}"),
            Limit::Percent(p)  => write!(f, "{p}%"),
        }
    }
}

/// Resolve an optional bound.
pub fn resolve(limit: Option<Limit>, size: u64) -> Option<u64> {
    limit.map(|l| l.resolve(size))
}
