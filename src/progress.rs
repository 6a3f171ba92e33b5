//! Throughput and ETA estimation, shared by the decryption engine and the
//! counter monitor.  Diagnostic only.

use chrono::{DateTime, Local};
use std::fmt;
use std::time::{Duration, Instant};

const MIB: f64 = 1024.0 * 1024.0;

/// One progress observation between two positions.
#[derive(Debug, Clone)]
pub struct ProgressSample {
    pub position:      u64,
    pub total:         u64,
    /// Bytes per second since the previous sample.
    pub bytes_per_sec: f64,
    /// `None` when no progress was made, so no estimate is possible.
    pub remaining:     Option<Duration>,
    pub eta:           Option<DateTime<Local>>,
}

impl ProgressSample {
    /// Estimate throughput from `advanced` bytes over `elapsed`, and the time
    /// needed to get from `position` to `total` at that rate.
    pub fn estimate(position: u64, total: u64, advanced: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let bytes_per_sec = if secs > 0.0 { advanced as f64 / secs } else { 0.0 };
        let remaining = (bytes_per_sec > 0.0)
            .then(|| total.saturating_sub(position) as f64 / bytes_per_sec)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        let eta = remaining
            .and_then(|r| chrono::Duration::from_std(r).ok())
            .and_then(|r| Local::now().checked_add_signed(r));
        Self { position, total, bytes_per_sec, remaining, eta }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 { return 100.0; }
        self.position as f64 / self.total as f64 * 100.0
    }

    pub fn mib_per_sec(&self) -> f64 {
        self.bytes_per_sec / MIB
    }
}

impl fmt::Display for ProgressSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:6.3}% at {:.2} MiB/s, {} / {}",
            self.percent(),
            self.mib_per_sec(),
            self.position,
            self.total,
        )?;
        match (self.remaining, self.eta) {
            (Some(r), Some(eta)) => write!(
                f,
                ", {} s remaining, ETA {}",
                r.as_secs(),
                eta.format("%Y-%m-%dT%H:%M"),
            ),
            _ => f.write_str(", no progress"),
        }
    }
}

/// Tracks the last reported position and time.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total:         u64,
    last_position: u64,
    last_time:     Instant,
}

impl ProgressTracker {
    pub fn new(total: u64, start: u64) -> Self {
        Self { total, last_position: start, last_time: Instant::now() }
    }

    /// Sample at `position` and make it the new reference point.
    pub fn sample(&mut self, position: u64) -> ProgressSample {
        let now = Instant::now();
        let advanced = position.saturating_sub(self.last_position);
        let s = ProgressSample::estimate(position, self.total, advanced, now - self.last_time);
        self.last_position = position;
        self.last_time = now;
        s
    }

    pub fn last_position(&self) -> u64 {
        self.last_position
    }
}
