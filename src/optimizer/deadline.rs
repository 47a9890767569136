use chrono::{DateTime, Duration, Utc};

use crate::power_flow::{round_down_to_quarter, PeriodDuration};

/// Time left for the search in the current period.
///
/// The search must end `buffer` before the next quarter starts, so the new
/// schedule is published before its first period begins. Never negative.
pub fn execution_limit(now: DateTime<Utc>, buffer: Duration) -> std::time::Duration {
    let next_period = round_down_to_quarter(now) + PeriodDuration::Quarter.duration();
    (next_period - buffer - now)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}
