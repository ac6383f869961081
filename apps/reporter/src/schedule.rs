//! Report clock and the weekly schedule gate.
//!
//! The report runs on Asia/Shanghai time, which has no daylight saving, so a
//! fixed UTC+08:00 offset is exact.

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc, Weekday};

const REPORT_UTC_OFFSET_SECS: i32 = 8 * 3600;

pub const RUN_WEEKDAY: Weekday = Weekday::Mon;
pub const RUN_HOUR: u32 = 7;
pub const RUN_MINUTE: u32 = 0;

pub fn report_offset() -> FixedOffset {
    FixedOffset::east_opt(REPORT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current time on the report clock.
pub fn report_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&report_offset())
}

/// True when forced, or at Monday 07:00 (to the minute) on the report clock.
pub fn should_run_now(now: DateTime<FixedOffset>, force: bool) -> bool {
    force || (now.weekday() == RUN_WEEKDAY && now.hour() == RUN_HOUR && now.minute() == RUN_MINUTE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> DateTime<FixedOffset> {
        report_offset()
            .with_ymd_and_hms(y, m, d, hh, mm, ss)
            .single()
            .unwrap()
    }

    #[test]
    fn test_offset_is_beijing() {
        assert_eq!(report_offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn test_runs_monday_seven_sharp() {
        // 2025-01-06 is a Monday
        assert!(should_run_now(at(2025, 1, 6, 7, 0, 0), false));
        assert!(should_run_now(at(2025, 1, 6, 7, 0, 59), false));
    }

    #[test]
    fn test_skips_outside_window() {
        assert!(!should_run_now(at(2025, 1, 6, 7, 1, 0), false));
        assert!(!should_run_now(at(2025, 1, 6, 8, 0, 0), false));
        assert!(!should_run_now(at(2025, 1, 7, 7, 0, 0), false));
    }

    #[test]
    fn test_force_overrides_schedule() {
        assert!(should_run_now(at(2025, 1, 8, 15, 30, 0), true));
    }

    #[test]
    fn test_report_now_uses_offset() {
        assert_eq!(report_now().offset().local_minus_utc(), 8 * 3600);
    }
}
