//! Timestamp utilities.

use chrono::{DateTime, Utc};

/// Canonical timestamp type used on execution records.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Returns the current UTC time as an ISO 8601 formatted string.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC time as milliseconds since the Unix epoch.
#[must_use]
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }

    #[test]
    fn test_epoch_millis_positive() {
        assert!(epoch_millis() > 0);
    }
}
