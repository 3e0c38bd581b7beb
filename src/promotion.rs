use crate::error::AttendError;
use crate::model::{AcademicYear, RequestContext};
use crate::roster::{self, ClassRow};
use rusqlite::{params_from_iter, Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

/// Grade 12 is terminal.
pub const TERMINAL_STANDARD: i64 = 12;

#[derive(Debug, Clone, Serialize)]
pub struct PromotionOutcome {
    pub count: usize,
    pub from_class: String,
    pub to_class: String,
    pub academic_year: AcademicYear,
    pub destination_class_id: String,
    pub destination_created: bool,
    pub message: String,
}

/// Destination standard and year for a class: one grade up, one year on.
pub fn next_placement(
    standard: i64,
    year: AcademicYear,
) -> Result<(i64, AcademicYear), AttendError> {
    if standard >= TERMINAL_STANDARD {
        return Err(AttendError::already_graduated(standard));
    }
    Ok((standard + 1, year.next()?))
}

/// Inserts the class unless its (school, standard, section, year) key already
/// exists, then returns its id and whether this call created it.
fn ensure_class(
    tx: &Transaction<'_>,
    school_id: &str,
    standard: i64,
    section: &str,
    year: AcademicYear,
) -> Result<(String, bool), AttendError> {
    let year_label = year.to_string();
    let inserted = tx.execute(
        "INSERT INTO classes(id, school_id, standard, section, academic_year, teacher_id)
         VALUES(?, ?, ?, ?, ?, NULL)
         ON CONFLICT(school_id, standard, section, academic_year) DO NOTHING",
        (
            Uuid::new_v4().to_string(),
            school_id,
            standard,
            section,
            &year_label,
        ),
    )?;
    let id: String = tx.query_row(
        "SELECT id FROM classes
         WHERE school_id = ? AND standard = ? AND section = ? AND academic_year = ?",
        (school_id, standard, section, &year_label),
        |r| r.get(0),
    )?;
    Ok((id, inserted == 1))
}

fn promote_once(
    conn: &Connection,
    ctx: &RequestContext,
    source_class_id: &str,
    student_ids: &[String],
) -> Result<PromotionOutcome, AttendError> {
    // IMMEDIATE takes the write lock up front, so the destination lookup,
    // its creation and the roster update run as one writer.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let source: ClassRow = roster::load_class(&tx, source_class_id)?
        .filter(|c| c.school_id == ctx.school_id)
        .ok_or_else(|| AttendError::class_not_found(source_class_id))?;
    let (next_standard, next_year) = next_placement(source.standard, source.academic_year)?;

    let placeholders = vec!["?"; student_ids.len()].join(", ");
    let mut bind: Vec<String> = vec![source.id.clone(), ctx.school_id.clone()];
    bind.extend(student_ids.iter().cloned());
    let members: i64 = tx.query_row(
        &format!(
            "SELECT COUNT(*) FROM students s
             JOIN classes c ON c.id = s.class_id
             WHERE s.class_id = ? AND c.school_id = ? AND s.id IN ({placeholders})"
        ),
        params_from_iter(bind.iter()),
        |r| r.get(0),
    )?;
    if members != student_ids.len() as i64 {
        tracing::warn!(
            source_class_id,
            requested = student_ids.len(),
            members,
            "promotion rejected: membership mismatch"
        );
        return Err(AttendError::unauthorized_membership());
    }

    let (dest_id, created) = ensure_class(&tx, &source.school_id, next_standard, &source.section, next_year)?;

    let mut bind: Vec<String> = vec![dest_id.clone(), next_year.to_string(), source.id.clone()];
    bind.extend(student_ids.iter().cloned());
    let moved = tx.execute(
        &format!(
            "UPDATE students SET class_id = ?, academic_year = ?
             WHERE class_id = ? AND id IN ({placeholders})"
        ),
        params_from_iter(bind.iter()),
    )?;
    if moved != student_ids.len() {
        return Err(AttendError::unauthorized_membership());
    }
    tx.commit()?;

    let from_class = source.label();
    let to_class = format!("{}{}", next_standard, source.section);
    Ok(PromotionOutcome {
        count: moved,
        message: format!(
            "Successfully promoted {moved} student(s) from {from_class} to {to_class} ({next_year})"
        ),
        from_class,
        to_class,
        academic_year: next_year,
        destination_class_id: dest_id,
        destination_created: created,
    })
}

/// Moves the given students from `source_class_id` to the next grade's class
/// for the next academic year, creating that class when needed. Either every
/// student moves or none does.
pub fn promote_students(
    conn: &Connection,
    ctx: &RequestContext,
    source_class_id: &str,
    student_ids: &[String],
) -> Result<PromotionOutcome, AttendError> {
    ctx.require_admin()?;
    let mut seen = HashSet::new();
    let ids: Vec<String> = student_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();
    if ids.is_empty() {
        return Err(AttendError::validation("missing_students", "student ids are required"));
    }

    let outcome = with_conflict_retry(|| promote_once(conn, ctx, source_class_id, &ids))?;
    tracing::info!(
        source_class_id,
        destination_class_id = %outcome.destination_class_id,
        created = outcome.destination_created,
        count = outcome.count,
        academic_year = %outcome.academic_year,
        "students promoted"
    );
    Ok(outcome)
}

/// Runs `attempt` and, if it fails with a conflict, runs it exactly once more.
/// The second result is returned as is.
fn with_conflict_retry<T, F>(mut attempt: F) -> Result<T, AttendError>
where
    F: FnMut() -> Result<T, AttendError>,
{
    match attempt() {
        Err(e) if e.is_conflict() => {
            tracing::warn!(error = %e, "promotion conflicted, retrying once");
            attempt()
        }
        other => other,
    }
}
