// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for schedule matching and timestamps.

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};

/// Wall-clock minute a user's backup is keyed on: (hour, minute), UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub hour: u32,
    pub minute: u32,
}

impl MatchKey {
    pub fn of(date: DateTime<Utc>) -> Self {
        Self {
            hour: date.hour(),
            minute: date.minute(),
        }
    }
}

/// Truncate a timestamp to the start of its minute.
pub fn truncate_to_minute(date: DateTime<Utc>) -> DateTime<Utc> {
    date.duration_trunc(Duration::minutes(1)).unwrap_or(date)
}

/// Minutes that still need a store query at `now`.
///
/// `last` is the most recent minute already queried successfully. At most
/// `max_catch_up` minutes before the current one are revisited; a minute at
/// or before `last` is never returned again.
pub fn due_minutes(
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_catch_up: u32,
) -> Vec<DateTime<Utc>> {
    let current = truncate_to_minute(now);
    let earliest = current - Duration::minutes(i64::from(max_catch_up));

    let start = match last {
        None => current,
        Some(last) if last >= current => return Vec::new(),
        Some(last) => (truncate_to_minute(last) + Duration::minutes(1)).max(earliest),
    };

    let mut minutes = Vec::new();
    let mut minute = start;
    while minute <= current {
        minutes.push(minute);
        minute += Duration::minutes(1);
    }
    minutes
}

/// Compact UTC timestamp used in artifact file names.
pub fn artifact_timestamp(date: DateTime<Utc>) -> String {
    date.format("%Y%m%dT%H%M%SZ").to_string()
}
