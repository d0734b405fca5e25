//! Timestamp utilities
//!
//! Review schedules are stored as epoch milliseconds; `0` means "never
//! scheduled" and is therefore always due.

use chrono::{TimeZone, Utc};

/// Milliseconds in one scheduling day
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Current time as epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a day count to milliseconds, saturating instead of overflowing
pub fn days_to_millis(days: i64) -> i64 {
    days.saturating_mul(MILLIS_PER_DAY)
}

/// Render an epoch-millisecond timestamp for logs and CLI output
pub fn format_millis(millis: i64) -> String {
    if millis <= 0 {
        return "now".to_string();
    }
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => millis.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_recent() {
        let millis = now_millis();
        assert!(millis > 946_684_800_000); // 2000-01-01
        assert!(millis < 4_102_444_800_000); // 2100-01-01
    }

    #[test]
    fn test_days_to_millis() {
        assert_eq!(days_to_millis(0), 0);
        assert_eq!(days_to_millis(1), 86_400_000);
        assert_eq!(days_to_millis(6), 518_400_000);
    }

    #[test]
    fn test_days_to_millis_saturates() {
        assert_eq!(days_to_millis(i64::MAX), i64::MAX);
    }

    #[test]
    fn test_format_millis_zero_is_now() {
        assert_eq!(format_millis(0), "now");
    }

    #[test]
    fn test_format_millis_known_date() {
        // 2024-01-01 00:00:00 UTC
        assert_eq!(format_millis(1_704_067_200_000), "2024-01-01 00:00");
    }
}
