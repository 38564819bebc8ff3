use chrono::{DateTime, Utc};

/// A time-bucket function chosen from the resolved window duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBucket {
    pub function: &'static str,
    pub label: &'static str,
}

const MINUTE: TimeBucket = TimeBucket { function: "toStartOfMinute", label: "1 minute" };
const FIVE_MINUTES: TimeBucket = TimeBucket { function: "toStartOfFiveMinutes", label: "5 minutes" };
const HOUR: TimeBucket = TimeBucket { function: "toStartOfHour", label: "1 hour" };
const DAY: TimeBucket = TimeBucket { function: "toStartOfDay", label: "1 day" };

/// Pick the bucket granularity for a resolved window. Windows under an hour
/// bucket by minute, under a day by five minutes, under a week by hour,
/// everything longer by day. An unresolved window gets the hour bucket.
pub fn bucket_for_window(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> TimeBucket {
    let (Some(start), Some(end)) = (start, end) else {
        return HOUR;
    };
    let window = end.signed_duration_since(start);
    if window < chrono::Duration::hours(1) {
        MINUTE
    } else if window < chrono::Duration::hours(24) {
        FIVE_MINUTES
    } else if window < chrono::Duration::days(7) {
        HOUR
    } else {
        DAY
    }
}

/// Wrap a timestamp expression in the bucket function.
pub fn apply(bucket: TimeBucket, time_sql: &str) -> String {
    format!("{}({})", bucket.function, time_sql)
}
