use chrono::{DateTime, Utc};

/// Milliseconds since the unix epoch.
pub fn time_millis() -> i64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_millis()
}
