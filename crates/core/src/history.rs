//! History entries and the reporting window they cover.

use crate::metric::MetricsSnapshot;
use chrono::{DateTime, Days, FixedOffset, NaiveDate};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven-day window a report covers, ending the day before the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportWindow {
    /// Window for a run at `now`: end is yesterday, start is six days before end.
    pub fn ending_before(now: DateTime<FixedOffset>) -> Self {
        let today = now.date_naive();
        let end = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let start = end.checked_sub_days(Days::new(6)).unwrap_or(end);
        Self { start, end }
    }
}

impl fmt::Display for ReportWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} 至 {}", self.start, self.end)
    }
}

/// One completed run as persisted in the history file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Run time in report-local time, second precision
    #[serde(rename = "run_time_beijing", with = "rfc3339_seconds")]
    pub run_time: DateTime<FixedOffset>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub metrics: MetricsSnapshot,
    #[serde(default)]
    pub missing_symbols: Vec<CompactString>,
}

impl HistoryEntry {
    pub fn new(
        run_time: DateTime<FixedOffset>,
        window: ReportWindow,
        metrics: MetricsSnapshot,
        missing_symbols: Vec<CompactString>,
    ) -> Self {
        Self {
            run_time,
            start_date: window.start,
            end_date: window.end,
            metrics,
            missing_symbols,
        }
    }
}

/// Format a timestamp as RFC 3339 with whole seconds, e.g. "2025-01-06T07:00:00+08:00".
pub fn format_run_time(run_time: &DateTime<FixedOffset>) -> String {
    run_time.to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

mod rfc3339_seconds {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &DateTime<FixedOffset>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_run_time(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<FixedOffset>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw).map_err(serde::de::Error::custom)
    }
}
