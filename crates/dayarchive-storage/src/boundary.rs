//! Day Boundary Locator
//!
//! Finds the first and last statement id of a calendar day without scanning the
//! day's rows.
//!
//! ## Strategy
//!
//! ```text
//! first id:  MIN(id) WHERE created_at IN (00:00:00 .. 00:00:09)
//!            └─ nothing? ─▶ MIN(id) over the whole day (slow path)
//!
//! last id:   MAX(id) WHERE created_at IN (23:59:50 .. 23:59:59)
//!            └─ nothing? ─▶ MAX(id) over the whole day (slow path)
//! ```
//!
//! Ids grow with creation time, so on a busy day the first and last ten
//! seconds contain the boundary ids and each probe touches a handful of index
//! entries. Quiet days fall through to the whole-day query, which is always
//! correct. Both lookups return `0` for a day without statements.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use dayarchive_metadata::{DayRange, StatementStore};
use std::sync::Arc;

use crate::error::Result;

/// Number of one-second marks probed at each end of the day.
pub const PROBE_SECONDS: i64 = 10;

/// The ten one-second marks `00:00:00 .. 00:00:09` of the day.
pub fn build_start_of_day_marks(day: NaiveDate) -> Vec<NaiveDateTime> {
    let start = day.and_time(NaiveTime::MIN);
    (0..PROBE_SECONDS)
        .map(|s| start + Duration::seconds(s))
        .collect()
}

/// The ten one-second marks `23:59:50 .. 23:59:59` of the day.
pub fn build_end_of_day_marks(day: NaiveDate) -> Vec<NaiveDateTime> {
    let end = end_of_day(day);
    (0..PROBE_SECONDS)
        .rev()
        .map(|s| end - Duration::seconds(s))
        .collect()
}

fn start_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

fn end_of_day(day: NaiveDate) -> NaiveDateTime {
    start_of_day(day) + Duration::days(1) - Duration::seconds(1)
}

pub struct BoundaryLocator {
    statements: Arc<dyn StatementStore>,
}

impl BoundaryLocator {
    pub fn new(statements: Arc<dyn StatementStore>) -> Self {
        Self { statements }
    }

    /// First statement id created on `day`, or `0`.
    pub async fn first_id_of_day(&self, day: NaiveDate) -> Result<i64> {
        if let Some(id) = self
            .statements
            .min_id_at(&build_start_of_day_marks(day))
            .await?
        {
            return Ok(id);
        }

        tracing::debug!(
            date = %day,
            boundary = "first",
            "There was no first or last id to base the day archives query from, so we fell back to the slow query"
        );

        Ok(self
            .statements
            .min_id_between(start_of_day(day), end_of_day(day))
            .await?
            .unwrap_or(0))
    }

    /// Last statement id created on `day`, or `0`.
    pub async fn last_id_of_day(&self, day: NaiveDate) -> Result<i64> {
        if let Some(id) = self
            .statements
            .max_id_at(&build_end_of_day_marks(day))
            .await?
        {
            return Ok(id);
        }

        tracing::debug!(
            date = %day,
            boundary = "last",
            "There was no first or last id to base the day archives query from, so we fell back to the slow query"
        );

        Ok(self
            .statements
            .max_id_between(start_of_day(day), end_of_day(day))
            .await?
            .unwrap_or(0))
    }

    /// Both boundaries of `day`.
    pub async fn day_range(&self, day: NaiveDate) -> Result<DayRange> {
        let first_id = self.first_id_of_day(day).await?;
        let last_id = self.last_id_of_day(day).await?;

        tracing::info!(date = %day, first_id, last_id, "Located day boundaries");

        Ok(DayRange::new(first_id, last_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 8, 8).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_start_marks() {
        let marks = build_start_of_day_marks(day());
        assert_eq!(marks.len(), 10);
        assert_eq!(marks.first(), Some(&at(0, 0, 0)));
        assert_eq!(marks.last(), Some(&at(0, 0, 9)));
    }

    #[test]
    fn test_end_marks() {
        let marks = build_end_of_day_marks(day());
        assert_eq!(marks.len(), 10);
        assert!(marks.contains(&at(23, 59, 50)));
        assert!(marks.contains(&at(23, 59, 59)));
        assert!(marks.iter().all(|m| m.date() == day()));
    }

    #[test]
    fn test_day_bounds() {
        assert_eq!(start_of_day(day()), at(0, 0, 0));
        assert_eq!(end_of_day(day()), at(23, 59, 59));
    }
}
