//! Partition derivation and date window computation.
//!
//! A record's partition is derived from its designated date attribute
//! under the configured date format. Two records with equal date attribute
//! values always land in the same partition, whatever the format.

use crate::error::ExportError;
use crate::record::AttrValue;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How the source encodes the date attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// ISO8601 / RFC3339 strings, with a date-only fallback
    Iso,
    /// Numeric epoch. Values >= 10^12 are milliseconds, smaller values
    /// are seconds.
    Epoch,
    /// US-locale formatted strings: "02/19/2026, 10:00:00 AM", with a
    /// date-only "02/19/2026" fallback
    HumanReadable,
}

/// Which window an export run covers, as a pure function of "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DateRangeMode {
    /// The full previous UTC calendar day
    PreviousDay,
    /// The seven full UTC calendar days before today
    PreviousWeek,
    /// The last N hours up to now (lookback supplied by the caller)
    LastNHours,
}

/// File placement policy per (partition, batch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OverwriteMode {
    /// File key is a pure function of the partition; re-running a window
    /// replaces the file (last writer wins)
    Overwrite,
    /// File key embeds the batch timestamp; repeated runs accumulate
    Append,
}

/// Half-open `[start, end)` export window in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Compute the window for a mode relative to `now`.
    pub fn for_mode(mode: DateRangeMode, lookback_hours: u32, now: DateTime<Utc>) -> Self {
        match mode {
            DateRangeMode::PreviousDay => {
                let today = now.date_naive().and_hms_opt(0, 0, 0).expect("midnight");
                let end = Utc.from_utc_datetime(&today);
                Self {
                    start: end - Duration::days(1),
                    end,
                }
            }
            DateRangeMode::PreviousWeek => {
                let today = now.date_naive().and_hms_opt(0, 0, 0).expect("midnight");
                let end = Utc.from_utc_datetime(&today);
                Self {
                    start: end - Duration::days(7),
                    end,
                }
            }
            DateRangeMode::LastNHours => Self {
                start: now - Duration::hours(i64::from(lookback_hours)),
                end: now,
            },
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// A `(year, month, day)` grouping key determining an export file's
/// storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionId {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl PartitionId {
    pub fn from_datetime(ts: DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
            day: ts.day(),
        }
    }

    /// Hive-style relative directory: `year=YYYY/month=M/day=D`.
    pub fn hive_dir(&self) -> String {
        format!("year={}/month={}/day={}", self.year, self.month, self.day)
    }

    /// Canonical `YYYY-MM-DD` form, used for the derived date column.
    pub fn iso_date(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hive_dir())
    }
}

/// Parse a date attribute value into a UTC timestamp under the configured
/// format. Each format is a distinct, explicit parse rule; anything that
/// does not match is a `DateParse` error the pipeline treats as a skip.
pub fn parse_date(value: &AttrValue, format: DateFormat) -> Result<DateTime<Utc>, ExportError> {
    let err = |reason: &str| ExportError::DateParse {
        value: match value {
            AttrValue::Str(s) => s.clone(),
            AttrValue::Num(n) => n.to_string(),
            AttrValue::Absent => "<absent>".to_string(),
        },
        reason: reason.to_string(),
    };

    match format {
        DateFormat::Iso => {
            let s = value.as_str().ok_or_else(|| err("expected ISO8601 string"))?;
            if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
                return Ok(dt.with_timezone(&Utc));
            }
            if let Ok(d) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
                let midnight = d.and_hms_opt(0, 0, 0).expect("midnight");
                return Ok(Utc.from_utc_datetime(&midnight));
            }
            Err(err("not a valid ISO8601 timestamp or date"))
        }
        DateFormat::Epoch => {
            let n = value.as_f64().ok_or_else(|| err("expected numeric epoch"))?;
            if !n.is_finite() || n < 0.0 {
                return Err(err("epoch out of range"));
            }
            let millis = if n >= 1_000_000_000_000.0 { n } else { n * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64)
                .single()
                .ok_or_else(|| err("epoch out of range"))
        }
        DateFormat::HumanReadable => {
            let s = value
                .as_str()
                .ok_or_else(|| err("expected formatted date string"))?
                .trim();
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%m/%d/%Y, %I:%M:%S %p") {
                return Ok(Utc.from_utc_datetime(&dt));
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
                let midnight = d.and_hms_opt(0, 0, 0).expect("midnight");
                return Ok(Utc.from_utc_datetime(&midnight));
            }
            Err(err("not a valid locale-formatted date"))
        }
    }
}

/// Format a timestamp the way the source store encodes it. Inverse of
/// `parse_date`; used by the seeder.
pub fn format_date(ts: DateTime<Utc>, format: DateFormat) -> AttrValue {
    match format {
        DateFormat::Iso => AttrValue::Str(ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        DateFormat::Epoch => AttrValue::Num(ts.timestamp_millis() as f64),
        DateFormat::HumanReadable => {
            AttrValue::Str(ts.format("%m/%d/%Y, %I:%M:%S %p").to_string())
        }
    }
}

/// Compute the export file path for a partition under the given policy.
///
/// OVERWRITE keys are a pure function of the partition; APPEND keys embed
/// the batch timestamp so runs accumulate.
pub fn export_file_path(
    lake_dir: &std::path::Path,
    prefix: &str,
    partition: PartitionId,
    mode: OverwriteMode,
    batch_ts: DateTime<Utc>,
) -> PathBuf {
    let file = match mode {
        OverwriteMode::Overwrite => "data.parquet".to_string(),
        OverwriteMode::Append => format!("data-{}.parquet", batch_ts.format("%Y%m%dT%H%M%S%3fZ")),
    };
    lake_dir.join(prefix).join(partition.hive_dir()).join(file)
}
