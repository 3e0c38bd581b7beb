use crate::error::AttendError;
use crate::model::{format_date, AcademicYear};
use chrono::{Datelike, Months, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

/// Whose holidays count: one school's calendar for one academic year.
#[derive(Debug, Clone, Copy)]
pub struct CalendarScope<'a> {
    pub school_id: &'a str,
    pub academic_year: AcademicYear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchoolDays {
    pub total_days: i64,
    pub holiday_count: i64,
    /// May be zero or negative for an empty scope; never divide by it unchecked.
    pub school_days: i64,
}

impl SchoolDays {
    pub const EMPTY: SchoolDays = SchoolDays {
        total_days: 0,
        holiday_count: 0,
        school_days: 0,
    };
}

pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> Result<i64, AttendError> {
    if end < start {
        return Err(AttendError::invalid_range());
    }
    Ok((end - start).num_days() + 1)
}

pub fn holiday_count(
    conn: &Connection,
    scope: CalendarScope<'_>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<i64, AttendError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM holidays
         WHERE school_id = ? AND academic_year = ? AND holiday_date BETWEEN ? AND ?",
        (
            scope.school_id,
            scope.academic_year.to_string(),
            format_date(start),
            format_date(end),
        ),
        |r| r.get(0),
    )?)
}

pub fn school_days_in_range(
    conn: &Connection,
    scope: CalendarScope<'_>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<SchoolDays, AttendError> {
    let total_days = inclusive_days(start, end)?;
    let holiday_count = holiday_count(conn, scope, start, end)?;
    Ok(SchoolDays {
        total_days,
        holiday_count,
        school_days: total_days - holiday_count,
    })
}

/// True when the school declared `date` a holiday under any academic year.
pub fn is_holiday(conn: &Connection, school_id: &str, date: NaiveDate) -> Result<bool, AttendError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM holidays WHERE school_id = ? AND holiday_date = ?",
        (school_id, format_date(date)),
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), AttendError> {
    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        AttendError::validation("invalid_month", format!("month must be 1-12, got {month}"))
    })?;
    let end = start
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| AttendError::validation("invalid_month", "month out of range"))?;
    Ok((start, end))
}

/// Range a year-to-date report covers: from the year's first day through the
/// end of the month containing `today`, capped at the year's last day.
/// `None` when the year has not started yet.
pub fn year_to_date_range(
    year: AcademicYear,
    start_month: u32,
    today: NaiveDate,
) -> Result<Option<(NaiveDate, NaiveDate)>, AttendError> {
    let (start, end) = year.date_range(start_month)?;
    if today < start {
        return Ok(None);
    }
    let (_, month_end) = month_bounds(today.year(), today.month())?;
    Ok(Some((start, month_end.min(end))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_holiday, seed_school, test_conn};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn counts_only_holidays_in_scope_and_range() {
        let conn = test_conn();
        let school = seed_school(&conn, "North");
        let other = seed_school(&conn, "South");
        let year = AcademicYear::new(2023).unwrap();
        seed_holiday(&conn, &school, "2024-01-26", "2023-2024");
        seed_holiday(&conn, &school, "2024-01-01", "2023-2024");
        seed_holiday(&conn, &school, "2024-02-01", "2023-2024");
        seed_holiday(&conn, &school, "2024-01-15", "2024-2025");
        seed_holiday(&conn, &other, "2024-01-10", "2023-2024");

        let scope = CalendarScope {
            school_id: &school,
            academic_year: year,
        };
        let days = school_days_in_range(&conn, scope, ymd(2024, 1, 1), ymd(2024, 1, 31)).unwrap();
        assert_eq!(
            days,
            SchoolDays {
                total_days: 31,
                holiday_count: 2,
                school_days: 29
            }
        );
        assert!(days.school_days <= days.total_days);
    }

    #[test]
    fn single_day_and_reversed_ranges() {
        assert_eq!(inclusive_days(ymd(2024, 3, 1), ymd(2024, 3, 1)).unwrap(), 1);
        let e = inclusive_days(ymd(2024, 3, 2), ymd(2024, 3, 1)).unwrap_err();
        assert_eq!(e.kind(), "invalid_range");
    }

    #[test]
    fn month_bounds_handle_leap_february() {
        assert_eq!(month_bounds(2024, 2).unwrap(), (ymd(2024, 2, 1), ymd(2024, 2, 29)));
        assert_eq!(month_bounds(2023, 12).unwrap().1, ymd(2023, 12, 31));
        assert!(month_bounds(2023, 0).is_err());
    }

    #[test]
    fn year_to_date_stops_at_current_month() {
        let y = AcademicYear::new(2023).unwrap();
        assert_eq!(
            year_to_date_range(y, 4, ymd(2023, 10, 9)).unwrap(),
            Some((ymd(2023, 4, 1), ymd(2023, 10, 31)))
        );
        assert_eq!(
            year_to_date_range(y, 4, ymd(2025, 1, 1)).unwrap(),
            Some((ymd(2023, 4, 1), ymd(2024, 3, 31)))
        );
        assert_eq!(year_to_date_range(y, 4, ymd(2023, 3, 31)).unwrap(), None);
    }
}
