use chrono::Utc;

/// Current wall clock time as unix milliseconds.
pub fn time_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Milliseconds elapsed since `start` (a value from [`time_millis`]).
pub fn elapsed_millis(start: i64) -> i64 {
    (time_millis() - start).max(0)
}
