use crate::error::{InvoiceError, Result};
use crate::schema::{DateRange, PeriodType};
use chrono::{Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

pub fn month_range(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = last_day_of_month(year, month)?;
    Some(DateRange::new(start, end))
}

/// Rounds a monetary amount to cents.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parses a budget period value into its type and inclusive date range.
///
/// Accepted forms:
/// - `YYYY-MM` (monthly)
/// - `YYYY-Qn` (quarterly, n in 1..=4)
/// - `YYYY` (annual)
pub fn parse_period_string(period: &str) -> Result<(PeriodType, DateRange)> {
    let period = period.trim();
    let invalid = || {
        InvoiceError::InputError(format!(
            "Invalid period value '{}'. Expected YYYY-MM, YYYY-Qn or YYYY",
            period
        ))
    };

    match period.split_once('-') {
        None => {
            let year: i32 = period.parse().map_err(|_| invalid())?;
            let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?;
            let end = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(invalid)?;
            Ok((PeriodType::Annual, DateRange::new(start, end)))
        }
        Some((year_part, rest)) => {
            let year: i32 = year_part.parse().map_err(|_| invalid())?;

            if let Some(quarter) = rest.strip_prefix('Q').or_else(|| rest.strip_prefix('q')) {
                let quarter: u32 = quarter.parse().map_err(|_| invalid())?;
                if !(1..=4).contains(&quarter) {
                    return Err(invalid());
                }
                let first_month = (quarter - 1) * 3 + 1;
                let start = NaiveDate::from_ymd_opt(year, first_month, 1).ok_or_else(invalid)?;
                let end = last_day_of_month(year, first_month + 2).ok_or_else(invalid)?;
                return Ok((PeriodType::Quarterly, DateRange::new(start, end)));
            }

            let month: u32 = rest.parse().map_err(|_| invalid())?;
            let range = month_range(year, month).ok_or_else(invalid)?;
            Ok((PeriodType::Monthly, range))
        }
    }
}

/// Whole days from `earlier` to `later`; negative when out of order.
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}
