//! Fiscal period model.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A date range that can be locked against further posting. Locking is a
/// one-way transition; `is_locked` is never unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalPeriod {
    pub period_id: Uuid,
    pub code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_locked: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<Uuid>,
}

impl FiscalPeriod {
    /// Default coverage is the calendar year containing `date`.
    pub fn calendar_year(date: NaiveDate) -> Self {
        let year = date.year();
        // Jan 1 / Dec 31 always exist for any year chrono can represent.
        let start_date = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(date);
        let end_date = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(date);
        Self {
            period_id: Uuid::new_v4(),
            code: format!("FY{year}"),
            start_date,
            end_date,
            is_locked: false,
            closed_at: None,
            closed_by: None,
        }
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_year_covers_whole_year() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let period = FiscalPeriod::calendar_year(date);
        assert_eq!(period.code, "FY2024");
        assert!(period.contains_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert!(period.contains_date(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()));
        assert!(!period.contains_date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
        assert!(!period.is_locked);
    }
}
