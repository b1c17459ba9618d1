use chrono::{DateTime, Duration, Utc};

use crate::model::reminder::{Recurrence, RecurrenceKind};

/// Advances a recurring reminder from the instant that just fired. Pure:
/// "now" is never consulted, so a reminder that fired late still keeps
/// its original cadence.
pub fn next_occurrence(
    previous: DateTime<Utc>,
    recurrence: &Recurrence,
) -> DateTime<Utc> {
    match recurrence.kind {
        RecurrenceKind::Daily | RecurrenceKind::Days => {
            previous + Duration::days(i64::from(recurrence.interval.max(1)))
        },
        // Weekly is a fixed 7-day cadence whatever the stored interval
        // says.
        RecurrenceKind::Weekly => previous + Duration::days(7),
    }
}
