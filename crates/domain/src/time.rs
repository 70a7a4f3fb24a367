//! Time and timestamp helpers.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// UTC timestamp used for incident transitions and notification expiry.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Add a std [`Duration`] to a timestamp, saturating at the far future.
#[must_use]
pub fn add(ts: Timestamp, delay: Duration) -> Timestamp {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| ts.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Time remaining from `now` until `deadline`, zero when already past.
#[must_use]
pub fn until(now: Timestamp, deadline: Timestamp) -> Duration {
    (deadline - now).to_std().unwrap_or(Duration::ZERO)
}
