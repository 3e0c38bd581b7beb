use crate::calendar;
use crate::clock::format_stamp;
use crate::error::AttendError;
use crate::model::{format_date, AttendanceStatus, Gender, RequestContext, Role};
use crate::roster::{self, ClassRow};
use chrono::{Days, NaiveDate, NaiveDateTime};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Which dates may be written right now.
#[derive(Debug, Clone, Copy)]
pub struct MarkWindow {
    pub today: NaiveDate,
    /// Trailing days an admin may back-date, inclusive of today.
    pub admin_window_days: i64,
    /// Stamped as `marked_at` on every record written under this window.
    pub now: NaiveDateTime,
}

impl MarkWindow {
    pub fn earliest_admin_date(&self) -> NaiveDate {
        let back = u64::try_from(self.admin_window_days.max(1) - 1).unwrap_or(0);
        self.today.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN)
    }
}

pub fn check_mark_date(role: Role, date: NaiveDate, window: MarkWindow) -> Result<(), AttendError> {
    if date > window.today {
        return Err(AttendError::future_date());
    }
    match role {
        Role::Teacher if date != window.today => Err(AttendError::window_exceeded(
            "teachers can only mark attendance for today",
        )),
        Role::Admin if date < window.earliest_admin_date() => {
            Err(AttendError::window_exceeded(format!(
                "cannot edit attendance older than {} days",
                window.admin_window_days
            )))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub present: i64,
    pub absent: i64,
    pub late: i64,
}

impl StatusCounts {
    pub fn marked(&self) -> i64 {
        self.present + self.absent + self.late
    }

    pub fn add(&mut self, status: AttendanceStatus, n: i64) {
        match status {
            AttendanceStatus::Present => self.present += n,
            AttendanceStatus::Absent => self.absent += n,
            AttendanceStatus::Late => self.late += n,
        }
    }
}

/// A student's state on one day; `Unmarked` when no record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    Present,
    Absent,
    Late,
    Unmarked,
}

impl From<Option<AttendanceStatus>> for DayStatus {
    fn from(s: Option<AttendanceStatus>) -> Self {
        match s {
            Some(AttendanceStatus::Present) => DayStatus::Present,
            Some(AttendanceStatus::Absent) => DayStatus::Absent,
            Some(AttendanceStatus::Late) => DayStatus::Late,
            None => DayStatus::Unmarked,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DayMark {
    pub student_id: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkOutcome {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub replaced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub class_id: String,
    pub date: NaiveDate,
    pub marked: usize,
    pub replaced: usize,
    pub counts: StatusCounts,
}

/// Writes the single record for (student, date), replacing any earlier mark.
/// Returns whether a prior record existed.
fn upsert_record(
    conn: &Connection,
    student_id: &str,
    date: NaiveDate,
    status: AttendanceStatus,
    marked_by: &str,
    marked_at: NaiveDateTime,
) -> Result<bool, AttendError> {
    let date_key = format_date(date);
    let prior: Option<String> = conn
        .query_row(
            "SELECT status FROM attendance_records WHERE student_id = ? AND attendance_date = ?",
            (student_id, &date_key),
            |r| r.get(0),
        )
        .optional()?;
    conn.execute(
        "INSERT INTO attendance_records(id, student_id, attendance_date, status, marked_by, marked_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, attendance_date) DO UPDATE SET
           status = excluded.status,
           marked_by = excluded.marked_by,
           marked_at = excluded.marked_at",
        (
            Uuid::new_v4().to_string(),
            student_id,
            &date_key,
            status.as_str(),
            marked_by,
            format_stamp(marked_at),
        ),
    )?;
    Ok(prior.is_some())
}

/// Marks one student for one day. Teachers may only touch their own class
/// and only today; admins anything in their school inside the window.
pub fn mark_day(
    conn: &Connection,
    ctx: &RequestContext,
    student_id: &str,
    date: NaiveDate,
    status: AttendanceStatus,
    window: MarkWindow,
) -> Result<MarkOutcome, AttendError> {
    check_mark_date(ctx.role, date, window)?;
    let (student, _class) = roster::student_in_scope(conn, ctx, student_id)?;
    let replaced = upsert_record(conn, &student.id, date, status, &ctx.user_id, window.now)?;
    tracing::info!(
        student_id = %student.id,
        date = %date,
        status = status.as_str(),
        replaced,
        marked_by = %ctx.user_id,
        "attendance marked"
    );
    Ok(MarkOutcome {
        student_id: student.id,
        date,
        status,
        replaced,
    })
}

/// Marks a whole class for one day. Any invalid record aborts the batch and
/// nothing from it is kept.
pub fn mark_class_day(
    conn: &Connection,
    ctx: &RequestContext,
    class_id: Option<&str>,
    date: NaiveDate,
    marks: &[DayMark],
    window: MarkWindow,
) -> Result<BatchOutcome, AttendError> {
    check_mark_date(ctx.role, date, window)?;
    let class = roster::resolve_class(conn, ctx, class_id)?;
    if marks.is_empty() {
        return Err(AttendError::validation("empty_batch", "no attendance records given"));
    }
    let members: HashSet<String> = roster::class_students(conn, &class.id)?
        .into_iter()
        .map(|s| s.id)
        .collect();

    let tx = conn.unchecked_transaction()?;
    let mut seen: HashSet<&str> = HashSet::new();
    let mut counts = StatusCounts::default();
    let mut replaced = 0usize;
    for m in marks {
        if !seen.insert(m.student_id.as_str()) {
            return Err(AttendError::validation(
                "duplicate_student",
                format!("student {} appears twice in the batch", m.student_id),
            ));
        }
        if !members.contains(&m.student_id) {
            tracing::warn!(
                class_id = %class.id,
                student_id = %m.student_id,
                "batch rejected: student outside class"
            );
            return Err(AttendError::forbidden(
                "student_not_in_class",
                format!("student {} not found in class {}", m.student_id, class.label()),
            ));
        }
        if upsert_record(&tx, &m.student_id, date, m.status, &ctx.user_id, window.now)? {
            replaced += 1;
        }
        counts.add(m.status, 1);
    }
    tx.commit()?;

    tracing::info!(
        class_id = %class.id,
        date = %date,
        marked = marks.len(),
        replaced,
        marked_by = %ctx.user_id,
        "class attendance marked"
    );
    Ok(BatchOutcome {
        class_id: class.id,
        date,
        marked: marks.len(),
        replaced,
        counts,
    })
}

/// Raw counts per student over `[start, end]`. Every requested id gets an
/// entry, zeroed when it has no records.
pub fn counts_by_status(
    conn: &Connection,
    student_ids: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<HashMap<String, StatusCounts>, AttendError> {
    if end < start {
        return Err(AttendError::invalid_range());
    }
    let mut out: HashMap<String, StatusCounts> = student_ids
        .iter()
        .map(|id| (id.clone(), StatusCounts::default()))
        .collect();
    if student_ids.is_empty() {
        return Ok(out);
    }

    let placeholders = vec!["?"; student_ids.len()].join(", ");
    let sql = format!(
        "SELECT student_id, status, COUNT(*)
         FROM attendance_records
         WHERE attendance_date BETWEEN ? AND ? AND student_id IN ({placeholders})
         GROUP BY student_id, status"
    );
    let mut bind: Vec<String> = Vec::with_capacity(student_ids.len() + 2);
    bind.push(format_date(start));
    bind.push(format_date(end));
    bind.extend(student_ids.iter().cloned());

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind.iter()), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (student_id, status, n) in rows {
        let status = AttendanceStatus::parse(&status)?;
        out.entry(student_id).or_default().add(status, n);
    }
    Ok(out)
}

/// Recorded status per student of a class on one date.
pub fn statuses_on(
    conn: &Connection,
    class_id: &str,
    date: NaiveDate,
) -> Result<HashMap<String, AttendanceStatus>, AttendError> {
    let mut stmt = conn.prepare(
        "SELECT ar.student_id, ar.status
         FROM attendance_records ar
         JOIN students s ON s.id = ar.student_id
         WHERE s.class_id = ? AND ar.attendance_date = ?",
    )?;
    let rows = stmt
        .query_map((class_id, format_date(date)), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = HashMap::with_capacity(rows.len());
    for (student_id, status) in rows {
        out.insert(student_id, AttendanceStatus::parse(&status)?);
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct DayRosterRow {
    pub student_id: String,
    pub roll_number: i64,
    pub name: String,
    pub gender: Gender,
    pub status: DayStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayRoster {
    pub class: ClassRow,
    pub date: NaiveDate,
    pub is_holiday: bool,
    pub students: Vec<DayRosterRow>,
}

/// Every student of the class with their state on `date`.
pub fn day_roster(
    conn: &Connection,
    ctx: &RequestContext,
    class_id: Option<&str>,
    date: NaiveDate,
) -> Result<DayRoster, AttendError> {
    let class = roster::resolve_class(conn, ctx, class_id)?;
    let statuses = statuses_on(conn, &class.id, date)?;
    let students = roster::class_students(conn, &class.id)?
        .into_iter()
        .map(|s| DayRosterRow {
            status: statuses.get(&s.id).copied().into(),
            student_id: s.id,
            roll_number: s.roll_number,
            name: s.name,
            gender: s.gender,
        })
        .collect();
    let is_holiday = calendar::is_holiday(conn, &class.school_id, date)?;
    Ok(DayRoster {
        class,
        date,
        is_holiday,
        students,
    })
}
