//! Date-range partition identity: `DateRange{type, year, range}`.
//!
//! A date-partitioned model spans one column-family triple per `DateRange`.
//! The range is serialized as `type*10_000_000 + year*1000 + range`, which
//! keeps ranges of the same type and year contiguous and sortable as plain
//! integers — the on-disk partition name the storage engine uses.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::fmt;

/// Granularity of a date partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum DateRangeType {
    Year = 0,
    HalfYear = 1,
    Quarter = 2,
    Month = 3,
    Week = 4,
    Day = 5,
}

impl DateRangeType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => DateRangeType::Year,
            1 => DateRangeType::HalfYear,
            2 => DateRangeType::Quarter,
            3 => DateRangeType::Month,
            4 => DateRangeType::Week,
            5 => DateRangeType::Day,
            _ => return None,
        })
    }
}

/// A date range identifying one partition: `type`, `year`, and an ordinal
/// `range` within the year (week/month/quarter number; 0 for `Year`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct DateRange {
    pub range_type: DateRangeType,
    pub year: u16,
    pub range: u16,
}

impl DateRange {
    /// Compute the partition a given unix-seconds timestamp belongs to.
    pub fn from_unix_secs(secs: u32, range_type: DateRangeType) -> Self {
        let dt = NaiveDateTime::from_timestamp_opt(secs as i64, 0)
            .unwrap_or_else(|| NaiveDateTime::from_timestamp_opt(0, 0).unwrap());
        Self::from_date(dt.date(), range_type)
    }

    pub fn from_date(date: NaiveDate, range_type: DateRangeType) -> Self {
        let year = date.year() as u16;
        let range = match range_type {
            DateRangeType::Year => 0,
            DateRangeType::HalfYear => {
                if date.month() <= 6 {
                    1
                } else {
                    2
                }
            }
            DateRangeType::Quarter => ((date.month() - 1) / 3 + 1) as u16,
            DateRangeType::Month => date.month() as u16,
            DateRangeType::Week => date.iso_week().week() as u16,
            DateRangeType::Day => date.ordinal() as u16,
        };
        Self {
            range_type,
            year,
            range,
        }
    }

    /// Serialized partition name per the external on-disk layout:
    /// `type*10_000_000 + year*1000 + range`.
    pub fn serialize_name(&self) -> u64 {
        (self.range_type as u64) * 10_000_000 + (self.year as u64) * 1000 + self.range as u64
    }

    pub fn parse_name(value: u64) -> Option<Self> {
        let range_type = DateRangeType::from_u8((value / 10_000_000) as u8)?;
        let rest = value % 10_000_000;
        let year = (rest / 1000) as u16;
        let range = (rest % 1000) as u16;
        Some(Self {
            range_type,
            year,
            range,
        })
    }

    /// The inclusive-exclusive `[start, end)` second bounds of this range,
    /// used to decide whether a query bounded to this range needs to visit a
    /// given partition at all.
    pub fn bounds_unix_secs(&self) -> (i64, i64) {
        let (start_date, next_start_date) = match self.range_type {
            DateRangeType::Year => (
                NaiveDate::from_ymd_opt(self.year as i32, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(self.year as i32 + 1, 1, 1).unwrap(),
            ),
            DateRangeType::HalfYear => {
                let start_month = if self.range == 1 { 1 } else { 7 };
                let start = NaiveDate::from_ymd_opt(self.year as i32, start_month, 1).unwrap();
                let next = if self.range == 1 {
                    NaiveDate::from_ymd_opt(self.year as i32, 7, 1).unwrap()
                } else {
                    NaiveDate::from_ymd_opt(self.year as i32 + 1, 1, 1).unwrap()
                };
                (start, next)
            }
            DateRangeType::Quarter => {
                let start_month = (self.range - 1) * 3 + 1;
                let start =
                    NaiveDate::from_ymd_opt(self.year as i32, start_month as u32, 1).unwrap();
                let next = add_months(start, 3);
                (start, next)
            }
            DateRangeType::Month => {
                let start = NaiveDate::from_ymd_opt(self.year as i32, self.range as u32, 1)
                    .unwrap();
                let next = add_months(start, 1);
                (start, next)
            }
            DateRangeType::Week => {
                let start = NaiveDate::from_isoywd_opt(
                    self.year as i32,
                    self.range as u32,
                    chrono::Weekday::Mon,
                )
                .unwrap();
                (start, start + chrono::Duration::days(7))
            }
            DateRangeType::Day => {
                let start =
                    NaiveDate::from_yo_opt(self.year as i32, self.range as u32).unwrap();
                (start, start + chrono::Duration::days(1))
            }
        };
        (
            start_date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp(),
            next_start_date
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
                .timestamp(),
        )
    }
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    let total = date.month0() + months;
    let year = date.year() + (total / 12) as i32;
    let month = total % 12 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize_name())
    }
}
