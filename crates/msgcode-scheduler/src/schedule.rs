use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use msgcode_core::error::{Result, RuntimeError};

/// Parse `cron_expr` and `tz`, then compute the next fire instant strictly
/// after `from`. Returns `None` only if the cron schedule itself has no
/// further occurrences (standard `cron` expressions always do).
pub fn next_run_after(cron_expr: &str, tz: &str, from: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let schedule = Schedule::from_str(cron_expr).map_err(|e| RuntimeError::ConfigInvalid {
        message: format!("invalid cron expression {cron_expr:?}: {e}"),
    })?;
    let zone: Tz = tz.parse().map_err(|_| RuntimeError::ConfigInvalid {
        message: format!("unknown timezone {tz:?}"),
    })?;

    let from_in_tz = from.with_timezone(&zone);
    Ok(schedule.after(&from_in_tz).next().map(|dt| dt.with_timezone(&Utc)))
}

/// Validates a `(cron, tz)` pair without needing a reference instant — used
/// by `/schedule validate`.
pub fn validate(cron_expr: &str, tz: &str) -> Result<()> {
    next_run_after(cron_expr, tz, Utc::now()).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_9am_utc_lands_on_next_day_when_past() {
        let from = Utc.with_ymd_and_hms(2026, 7, 26, 10, 0, 0).unwrap();
        let next = next_run_after("0 0 9 * * *", "UTC", from).unwrap().unwrap();
        assert_eq!(next.format("%Y-%m-%d %H:%M").to_string(), "2026-07-27 09:00");
    }

    #[test]
    fn daily_9am_utc_fires_same_day_when_still_ahead() {
        let from = Utc.with_ymd_and_hms(2026, 7, 26, 3, 0, 0).unwrap();
        let next = next_run_after("0 0 9 * * *", "UTC", from).unwrap().unwrap();
        assert_eq!(next.format("%Y-%m-%d %H:%M").to_string(), "2026-07-26 09:00");
    }

    #[test]
    fn timezone_offset_is_honored() {
        let from = Utc.with_ymd_and_hms(2026, 7, 26, 0, 0, 0).unwrap();
        // 9am in Tokyo (UTC+9) is midnight UTC.
        let next = next_run_after("0 0 9 * * *", "Asia/Tokyo", from).unwrap().unwrap();
        assert_eq!(next.format("%Y-%m-%d %H:%M").to_string(), "2026-07-26 00:00");
    }

    #[test]
    fn invalid_cron_expression_is_rejected() {
        assert!(validate("not a cron", "UTC").is_err());
    }

    #[test]
    fn invalid_timezone_is_rejected() {
        assert!(validate("0 0 9 * * *", "Mars/OlympusMons").is_err());
    }
}
