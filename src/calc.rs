use crate::calendar::{self, CalendarScope, SchoolDays};
use crate::error::AttendError;
use crate::ledger::{self, DayRosterRow, DayStatus, StatusCounts};
use crate::model::{AcademicYear, Gender, RequestContext};
use crate::roster::{self, ClassRow, StudentRow};
use chrono::{Datelike, Months, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

/// Teachers record exceptions only, so a school day with no record for a
/// student counts toward their attendance.
pub const UNMARKED_COUNTS_AS_PRESENT: bool = true;

/// `numerator / denominator * 100`, rounded half-up to 2 decimals.
/// A non-positive denominator yields exactly 0.
pub fn percent_2dp(numerator: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        return 0.0;
    }
    let num = i128::from(numerator.max(0));
    let den = i128::from(denominator);
    // Hundredths of a percent, rounded in integers to avoid binary drift.
    let hundredths = (num * 20_000 + den) / (2 * den);
    hundredths as f64 / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodStats {
    pub present: i64,
    pub late: i64,
    pub absent: i64,
    pub unmarked: i64,
    /// Effective present days: present + late (+ unmarked under the policy).
    pub total_present: i64,
    pub total_school_days: i64,
    pub attendance_percentage: f64,
    pub late_percentage: f64,
}

impl PeriodStats {
    pub fn compute(counts: StatusCounts, school_days: i64) -> Self {
        Self::compute_with_policy(counts, school_days, UNMARKED_COUNTS_AS_PRESENT)
    }

    pub fn compute_with_policy(
        counts: StatusCounts,
        school_days: i64,
        unmarked_as_present: bool,
    ) -> Self {
        let unmarked = (school_days - counts.marked()).max(0);
        let mut total_present = counts.present + counts.late;
        if unmarked_as_present {
            total_present += unmarked;
        }
        Self::from_totals(
            counts.present,
            counts.late,
            counts.absent,
            unmarked,
            total_present,
            school_days,
        )
    }

    fn from_totals(
        present: i64,
        late: i64,
        absent: i64,
        unmarked: i64,
        total_present: i64,
        total_school_days: i64,
    ) -> Self {
        Self {
            present,
            late,
            absent,
            unmarked,
            total_present,
            total_school_days,
            attendance_percentage: percent_2dp(total_present, total_school_days),
            late_percentage: percent_2dp(late, total_school_days),
        }
    }

    /// Sums the raw figures and recomputes the percentages from the sums.
    /// Never averages percentages.
    pub fn combine<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = &'a PeriodStats>,
    {
        let mut t = [0i64; 6];
        for p in parts {
            t[0] += p.present;
            t[1] += p.late;
            t[2] += p.absent;
            t[3] += p.unmarked;
            t[4] += p.total_present;
            t[5] += p.total_school_days;
        }
        Self::from_totals(t[0], t[1], t[2], t[3], t[4], t[5])
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentSummary {
    pub id: String,
    pub name: String,
    pub roll_number: i64,
    pub standard: i64,
    pub section: String,
}

impl StudentSummary {
    fn new(s: &StudentRow, c: &ClassRow) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            roll_number: s.roll_number,
            standard: c.standard,
            section: c.section.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassSummary {
    pub id: String,
    pub standard: i64,
    pub section: String,
    pub academic_year: AcademicYear,
}

impl From<&ClassRow> for ClassSummary {
    fn from(c: &ClassRow) -> Self {
        Self {
            id: c.id.clone(),
            standard: c.standard,
            section: c.section.clone(),
            academic_year: c.academic_year,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodInfo {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: i64,
    pub holidays: i64,
    pub total_school_days: i64,
}

impl PeriodInfo {
    fn new(start: NaiveDate, end: NaiveDate, days: SchoolDays) -> Self {
        Self {
            start_date: start,
            end_date: end,
            total_days: days.total_days,
            holidays: days.holiday_count,
            total_school_days: days.school_days,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentStatsRow {
    pub student_id: String,
    pub name: String,
    pub roll_number: i64,
    #[serde(flatten)]
    pub stats: PeriodStats,
}

/// Per-student stats for one range and one calendar scope.
fn stats_for_students(
    conn: &Connection,
    scope: CalendarScope<'_>,
    students: &[StudentRow],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(SchoolDays, Vec<StudentStatsRow>), AttendError> {
    let days = calendar::school_days_in_range(conn, scope, start, end)?;
    let ids: Vec<String> = students.iter().map(|s| s.id.clone()).collect();
    let counts = ledger::counts_by_status(conn, &ids, start, end)?;
    let rows = students
        .iter()
        .map(|s| StudentStatsRow {
            student_id: s.id.clone(),
            name: s.name.clone(),
            roll_number: s.roll_number,
            stats: PeriodStats::compute(
                counts.get(&s.id).copied().unwrap_or_default(),
                days.school_days,
            ),
        })
        .collect();
    Ok((days, rows))
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentPeriodReport {
    pub student: StudentSummary,
    pub period: PeriodInfo,
    pub attendance: PeriodStats,
}

/// Attendance for one student over an arbitrary range. Holidays come from the
/// given academic year, or the student's own when none is given.
pub fn student_period_report(
    conn: &Connection,
    ctx: &RequestContext,
    student_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    academic_year: Option<AcademicYear>,
) -> Result<StudentPeriodReport, AttendError> {
    let (student, class) = roster::student_in_scope(conn, ctx, student_id)?;
    let scope = CalendarScope {
        school_id: &class.school_id,
        academic_year: academic_year.unwrap_or(student.academic_year),
    };
    let (days, mut rows) = stats_for_students(conn, scope, std::slice::from_ref(&student), start, end)?;
    let attendance = rows.pop().map(|r| r.stats).unwrap_or_else(|| {
        PeriodStats::compute(StatusCounts::default(), days.school_days)
    });
    tracing::debug!(student_id, %start, %end, pct = attendance.attendance_percentage, "student period report");
    Ok(StudentPeriodReport {
        student: StudentSummary::new(&student, &class),
        period: PeriodInfo::new(start, end, days),
        attendance,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthPeriod {
    pub month: u32,
    pub year: i32,
    pub total_days: i64,
    pub holidays: i64,
    pub total_school_days: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassMonthlyReport {
    pub class: ClassSummary,
    pub period: MonthPeriod,
    pub students: Vec<StudentStatsRow>,
    /// Student-days summed over the class.
    pub class_totals: PeriodStats,
}

pub fn class_monthly_report(
    conn: &Connection,
    ctx: &RequestContext,
    class_id: &str,
    year: i32,
    month: u32,
) -> Result<ClassMonthlyReport, AttendError> {
    let class = roster::class_in_scope(conn, ctx, class_id)?;
    let (start, end) = calendar::month_bounds(year, month)?;
    let students = roster::class_students(conn, &class.id)?;
    let scope = CalendarScope {
        school_id: &class.school_id,
        academic_year: class.academic_year,
    };
    let (days, rows) = stats_for_students(conn, scope, &students, start, end)?;
    let class_totals = PeriodStats::combine(rows.iter().map(|r| &r.stats));
    tracing::debug!(class_id, year, month, students = rows.len(), "class monthly report");
    Ok(ClassMonthlyReport {
        class: ClassSummary::from(&class),
        period: MonthPeriod {
            month,
            year,
            total_days: days.total_days,
            holidays: days.holiday_count,
            total_school_days: days.school_days,
        },
        students: rows,
        class_totals,
    })
}

#[derive(Debug, Clone, Copy, Default)]
struct DayTally {
    total: i64,
    present: i64,
    absent: i64,
    late: i64,
    unmarked: i64,
}

impl DayTally {
    fn record(&mut self, status: DayStatus) {
        self.total += 1;
        match status {
            DayStatus::Present => self.present += 1,
            DayStatus::Absent => self.absent += 1,
            DayStatus::Late => self.late += 1,
            DayStatus::Unmarked => self.unmarked += 1,
        }
    }

    fn present_including_late(&self) -> i64 {
        self.present + self.late
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyStatistics {
    pub total_students: i64,
    pub total_marked: i64,
    pub total_unmarked: i64,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub present_including_late: i64,
    pub attendance_percentage: f64,
}

impl From<DayTally> for DailyStatistics {
    fn from(t: DayTally) -> Self {
        Self {
            total_students: t.total,
            total_marked: t.present + t.absent + t.late,
            total_unmarked: t.unmarked,
            present: t.present,
            absent: t.absent,
            late: t.late,
            present_including_late: t.present_including_late(),
            attendance_percentage: percent_2dp(t.present_including_late(), t.total),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenderDaily {
    pub total: i64,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub unmarked: i64,
    pub present_including_late: i64,
    pub attendance_percentage: f64,
}

impl From<DayTally> for GenderDaily {
    fn from(t: DayTally) -> Self {
        Self {
            total: t.total,
            present: t.present,
            absent: t.absent,
            late: t.late,
            unmarked: t.unmarked,
            present_including_late: t.present_including_late(),
            attendance_percentage: percent_2dp(t.present_including_late(), t.total),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenderBreakdown {
    pub male: GenderDaily,
    pub female: GenderDaily,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyClassReport {
    pub class: ClassSummary,
    pub date: NaiveDate,
    pub is_holiday: bool,
    pub statistics: DailyStatistics,
    pub gender_breakdown: GenderBreakdown,
    pub students: Vec<DayRosterRow>,
}

/// One day for a whole class. Single-day percentages use the roster size as
/// the denominator and count late as present; unmarked students are reported
/// separately, not folded in.
pub fn class_daily_report(
    conn: &Connection,
    ctx: &RequestContext,
    class_id: Option<&str>,
    date: NaiveDate,
) -> Result<DailyClassReport, AttendError> {
    let day = ledger::day_roster(conn, ctx, class_id, date)?;
    let mut overall = DayTally::default();
    let mut male = DayTally::default();
    let mut female = DayTally::default();
    for s in &day.students {
        overall.record(s.status);
        match s.gender {
            Gender::Male => male.record(s.status),
            Gender::Female => female.record(s.status),
        }
    }
    tracing::debug!(class_id = %day.class.id, %date, students = overall.total, "class daily report");
    Ok(DailyClassReport {
        class: ClassSummary::from(&day.class),
        date,
        is_holiday: day.is_holiday,
        statistics: overall.into(),
        gender_breakdown: GenderBreakdown {
            male: male.into(),
            female: female.into(),
        },
        students: day.students,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyRecord {
    pub month: u32,
    pub year: i32,
    pub month_name: String,
    #[serde(flatten)]
    pub stats: PeriodStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentYearlyReport {
    pub student: StudentSummary,
    pub academic_year: AcademicYear,
    pub yearly_summary: PeriodStats,
    pub monthly_breakdown: Vec<MonthlyRecord>,
}

/// Month-by-month attendance from the school's year start through the current
/// month; the yearly figures are recomputed from the summed months.
pub fn student_yearly_report(
    conn: &Connection,
    ctx: &RequestContext,
    student_id: &str,
    academic_year: AcademicYear,
    today: NaiveDate,
) -> Result<StudentYearlyReport, AttendError> {
    let (student, class) = roster::student_in_scope(conn, ctx, student_id)?;
    let start_month = roster::school_year_start_month(conn, &class.school_id)?;
    let (year_start, _) = academic_year.date_range(start_month)?;
    let scope = CalendarScope {
        school_id: &class.school_id,
        academic_year,
    };
    let ids = [student.id.clone()];

    let mut months = Vec::with_capacity(12);
    for i in 0..12 {
        let Some(month_start) = year_start.checked_add_months(Months::new(i)) else {
            break;
        };
        if month_start > today {
            break;
        }
        let (start, end) = calendar::month_bounds(month_start.year(), month_start.month())?;
        let days = calendar::school_days_in_range(conn, scope, start, end)?;
        let counts = ledger::counts_by_status(conn, &ids, start, end)?;
        months.push(MonthlyRecord {
            month: start.month(),
            year: start.year(),
            month_name: start.format("%B").to_string(),
            stats: PeriodStats::compute(
                counts.get(&student.id).copied().unwrap_or_default(),
                days.school_days,
            ),
        });
    }
    let yearly_summary = PeriodStats::combine(months.iter().map(|m| &m.stats));
    tracing::debug!(
        student_id,
        academic_year = %academic_year,
        months = months.len(),
        pct = yearly_summary.attendance_percentage,
        "student yearly report"
    );
    Ok(StudentYearlyReport {
        student: StudentSummary::new(&student, &class),
        academic_year,
        yearly_summary,
        monthly_breakdown: months,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassYearlyReport {
    pub class: ClassSummary,
    pub academic_year: AcademicYear,
    /// `None` until the academic year has started.
    pub period: Option<PeriodInfo>,
    pub students: Vec<StudentStatsRow>,
}

/// Year-to-date attendance for every student enrolled in the class for the
/// given year, in one pass over the same range the yearly report covers.
pub fn class_yearly_report(
    conn: &Connection,
    ctx: &RequestContext,
    class_id: &str,
    academic_year: AcademicYear,
    today: NaiveDate,
) -> Result<ClassYearlyReport, AttendError> {
    let class = roster::class_in_scope(conn, ctx, class_id)?;
    let students: Vec<StudentRow> = roster::class_students(conn, &class.id)?
        .into_iter()
        .filter(|s| s.academic_year == academic_year)
        .collect();
    let start_month = roster::school_year_start_month(conn, &class.school_id)?;
    let scope = CalendarScope {
        school_id: &class.school_id,
        academic_year,
    };

    let (period, rows) = match calendar::year_to_date_range(academic_year, start_month, today)? {
        Some((start, end)) => {
            let (days, rows) = stats_for_students(conn, scope, &students, start, end)?;
            (Some(PeriodInfo::new(start, end, days)), rows)
        }
        None => {
            let rows = students
                .iter()
                .map(|s| StudentStatsRow {
                    student_id: s.id.clone(),
                    name: s.name.clone(),
                    roll_number: s.roll_number,
                    stats: PeriodStats::compute(StatusCounts::default(), SchoolDays::EMPTY.school_days),
                })
                .collect();
            (None, rows)
        }
    };
    tracing::debug!(class_id, academic_year = %academic_year, students = rows.len(), "class yearly report");
    Ok(ClassYearlyReport {
        class: ClassSummary::from(&class),
        academic_year,
        period,
        students: rows,
    })
}
