// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry for transient write contention.

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::traits::StoreError;

/// Run `op`, retrying on [`StoreError::Contention`] with exponential
/// backoff starting at `base_delay`. Any other error, and contention still
/// present after `attempts` tries, is surfaced to the caller.
pub fn run_with_retry<T>(
    attempts: usize,
    base_delay: Duration,
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut delay = base_delay;
    let mut remaining = attempts.max(1);
    loop {
        match op() {
            Err(StoreError::Contention(reason)) if remaining > 1 => {
                debug!(%reason, ?delay, "write contention, retrying");
                thread::sleep(delay);
                delay = delay.saturating_mul(2);
                remaining -= 1;
            }
            result => return result,
        }
    }
}
