//! Watch the footer counter of a file the ransomware is still working on.
//!
//! Repeated reads of the counter give the ransomware's own throughput and
//! an estimate of when it will be done.  Purely observational, except for
//! [`set_counter_to_size`], which marks a file as fully processed so the
//! ransomware's own tooling treats every range as done.

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::footer::{FooterError, FooterModel};
use crate::progress::{ProgressSample, ProgressTracker};

/// Default pause between two counter reads.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Read the counter now, then every `interval`, handing each sample to
/// `on_sample`.  Stops after `samples` re-reads, or never if `None`.
/// Returns the last counter value.
pub fn sample_progress<F>(
    footer:    &FooterModel<'_>,
    path:      &Path,
    interval:  Duration,
    samples:   Option<usize>,
    mut on_sample: F,
) -> Result<u64, FooterError>
where
    F: FnMut(&ProgressSample),
{
    let total = footer.usable_size(path)?;
    let mut counter = footer.read_counter(path)?;
    log::info!("counter for {} is {counter} of {total}", path.display());

    let mut tracker = ProgressTracker::new(total, counter);
    let mut taken = 0usize;
    while samples.map_or(true, |n| taken < n) {
        thread::sleep(interval);
        counter = footer.read_counter(path)?;
        if counter <= tracker.last_position() {
            log::error!("no progress in {} seconds", interval.as_secs());
        }
        let sample = tracker.sample(counter);
        on_sample(&sample);
        taken += 1;
    }
    Ok(counter)
}

/// Write the usable size into the counter field.  Returns the value written.
pub fn set_counter_to_size(footer: &FooterModel<'_>, path: &Path) -> Result<u64, FooterError> {
    let size = footer.usable_size(path)?;
    footer.write_counter(path, size)?;
    Ok(size)
}
