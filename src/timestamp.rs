//! Apple Cocoa timestamp conversion.
//!
//! Message dates in `chat.db`/`sms.db` are nanoseconds since
//! 2001-01-01 00:00:00 UTC.

use chrono::{DateTime, Utc};

/// Seconds between the Unix epoch (1970) and the Apple epoch (2001).
pub const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Display format shared with the other export preprocessors.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Convert an Apple nanosecond timestamp into a UTC instant.
///
/// Zero and negative values mean "no timestamp" and yield `None`, as does
/// anything that overflows or falls outside chrono's representable range.
#[must_use]
pub fn convert_apple_timestamp(apple_nanos: i64) -> Option<DateTime<Utc>> {
    if apple_nanos <= 0 {
        return None;
    }

    let seconds = apple_nanos / NANOS_PER_SECOND;
    let nanos = u32::try_from(apple_nanos % NANOS_PER_SECOND).ok()?;
    let unix_seconds = seconds.checked_add(APPLE_EPOCH_OFFSET)?;

    DateTime::from_timestamp(unix_seconds, nanos)
}

/// Format an instant as `YYYY-MM-DD HH:MM:SS UTC`.
#[must_use]
pub fn format_timestamp(instant: &DateTime<Utc>) -> String {
    instant.format(DISPLAY_FORMAT).to_string()
}

/// Convert and format in one step; `None` when there is no usable timestamp.
#[must_use]
pub fn apple_timestamp_to_display(apple_nanos: i64) -> Option<String> {
    convert_apple_timestamp(apple_nanos).map(|instant| format_timestamp(&instant))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_no_timestamp() {
        assert!(convert_apple_timestamp(0).is_none());
        assert!(apple_timestamp_to_display(0).is_none());
    }

    #[test]
    fn test_negative_is_no_timestamp() {
        assert!(convert_apple_timestamp(-1).is_none());
        assert!(convert_apple_timestamp(i64::MIN).is_none());
    }

    #[test]
    fn test_one_second_after_apple_epoch() {
        assert_eq!(
            apple_timestamp_to_display(1_000_000_000).as_deref(),
            Some("2001-01-01 00:00:01 UTC")
        );
    }

    #[test]
    fn test_known_message_date() {
        // 2021-01-01 00:00:00 UTC
        let apple_nanos = (1_609_459_200 - APPLE_EPOCH_OFFSET) * NANOS_PER_SECOND;
        assert_eq!(
            apple_timestamp_to_display(apple_nanos).as_deref(),
            Some("2021-01-01 00:00:00 UTC")
        );
    }

    #[test]
    fn test_sub_second_precision_is_kept() {
        let instant = convert_apple_timestamp(1_500_000_000).unwrap();
        assert_eq!(instant.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_max_value_does_not_panic() {
        // i64::MAX nanoseconds is still a valid (year 2293) instant
        assert!(convert_apple_timestamp(i64::MAX).is_some());
    }
}
