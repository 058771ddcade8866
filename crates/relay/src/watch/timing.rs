//! Watch renewal timing
//!
//! Pure functions that can be tested without a mail service.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default remaining lifetime below which a watch is renewed
pub const RENEWAL_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);

/// Check whether a watch expiring at `expiration_ms` needs renewing.
///
/// # Arguments
/// * `expiration_ms` - Watch expiration in epoch milliseconds
/// * `now` - Current time
/// * `threshold` - Minimum remaining lifetime before renewal kicks in
///
/// # Returns
/// `true` if less than `threshold` remains (or the watch already lapsed)
pub fn renewal_due(expiration_ms: i64, now: DateTime<Utc>, threshold: Duration) -> bool {
    let remaining_ms = expiration_ms.saturating_sub(now.timestamp_millis());
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    remaining_ms < threshold_ms
}
