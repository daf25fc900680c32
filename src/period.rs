use chrono::{Duration, NaiveDate};

use crate::error::{Error, Result};

/// Reporting window lengths a report request may ask for.
pub const ALLOWED_PERIOD_DAYS: [u32; 4] = [7, 30, 60, 90];

/// A reporting period: `days` consecutive days ending at `end`, inclusive.
///
/// Reports always compare a period against the immediately preceding window
/// of equal length ([`ReportPeriod::comparison`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    days: u32,
    end: NaiveDate,
}

impl ReportPeriod {
    pub fn new(days: u32, end: NaiveDate) -> Result<Self> {
        if !ALLOWED_PERIOD_DAYS.contains(&days) {
            return Err(Error::InvalidRequest(format!(
                "period must be one of {ALLOWED_PERIOD_DAYS:?} days, got {days}"
            )));
        }
        Ok(Self { days, end })
    }

    /// Period for a report request; a missing end date means today.
    pub fn for_request(days: u32, end_date: Option<NaiveDate>) -> Result<Self> {
        Self::new(
            days,
            end_date.unwrap_or_else(|| chrono::Local::now().date_naive()),
        )
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn start(&self) -> NaiveDate {
        self.end - Duration::days(self.days as i64 - 1)
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Inclusive start and end dates.
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        (self.start(), self.end)
    }

    /// The immediately preceding window of equal length. Its end is the day
    /// before this period starts; there is no gap and no overlap.
    pub fn comparison(&self) -> Self {
        Self {
            days: self.days,
            end: self.start() - Duration::days(1),
        }
    }

    /// Canonical key string for storage and lookup, e.g. `30d:2025-06-30`.
    pub fn to_key(&self) -> String {
        format!("{}d:{}", self.days, self.end.format("%Y-%m-%d"))
    }
}

impl std::fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

/// Contiguous trend windows of `window_days` each, ending at `end`, oldest
/// first. Window *i+1* starts the day after window *i* ends: no gaps, no
/// overlaps. Always returns exactly `window_count` windows.
pub fn trend_windows(
    end: NaiveDate,
    window_count: u32,
    window_days: u32,
) -> Vec<(NaiveDate, NaiveDate)> {
    let mut windows = Vec::with_capacity(window_count as usize);
    for i in 0..window_count {
        let offset = (window_count - 1 - i) as i64 * window_days as i64;
        let window_end = end - Duration::days(offset);
        let window_start = window_end - Duration::days(window_days as i64 - 1);
        windows.push((window_start, window_end));
    }
    windows
}
