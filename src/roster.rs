use crate::error::AttendError;
use crate::model::{AcademicYear, Gender, RequestContext, Role};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ClassRow {
    pub id: String,
    pub school_id: String,
    pub standard: i64,
    pub section: String,
    pub academic_year: AcademicYear,
    pub teacher_id: Option<String>,
}

impl ClassRow {
    /// Short label such as `10A`.
    pub fn label(&self) -> String {
        format!("{}{}", self.standard, self.section)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentRow {
    pub id: String,
    pub class_id: String,
    pub roll_number: i64,
    pub admission_no: Option<String>,
    pub name: String,
    pub academic_year: AcademicYear,
    pub gender: Gender,
    pub parent_email: Option<String>,
    pub parent_contact: Option<String>,
}

pub const CLASS_COLUMNS: &str = "id, school_id, standard, section, academic_year, teacher_id";
pub const STUDENT_COLUMNS: &str =
    "id, class_id, roll_number, admission_no, name, academic_year, gender, parent_email, parent_contact";

fn year_column(r: &Row<'_>, idx: usize) -> rusqlite::Result<AcademicYear> {
    let raw: String = r.get(idx)?;
    raw.parse().map_err(|e: AttendError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub fn class_from_row(r: &Row<'_>) -> rusqlite::Result<ClassRow> {
    Ok(ClassRow {
        id: r.get(0)?,
        school_id: r.get(1)?,
        standard: r.get(2)?,
        section: r.get(3)?,
        academic_year: year_column(r, 4)?,
        teacher_id: r.get(5)?,
    })
}

pub fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRow> {
    let gender: String = r.get(6)?;
    Ok(StudentRow {
        id: r.get(0)?,
        class_id: r.get(1)?,
        roll_number: r.get(2)?,
        admission_no: r.get(3)?,
        name: r.get(4)?,
        academic_year: year_column(r, 5)?,
        gender: Gender::parse(&gender).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?,
        parent_email: r.get(7)?,
        parent_contact: r.get(8)?,
    })
}

pub fn load_class(conn: &Connection, class_id: &str) -> Result<Option<ClassRow>, AttendError> {
    let sql = format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = ?");
    Ok(conn.query_row(&sql, [class_id], class_from_row).optional()?)
}

pub fn load_student(conn: &Connection, student_id: &str) -> Result<Option<StudentRow>, AttendError> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    Ok(conn.query_row(&sql, [student_id], student_from_row).optional()?)
}

/// Students of a class ordered by roll number.
pub fn class_students(conn: &Connection, class_id: &str) -> Result<Vec<StudentRow>, AttendError> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE class_id = ? ORDER BY roll_number");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([class_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn teacher_class(conn: &Connection, teacher_id: &str) -> Result<Option<ClassRow>, AttendError> {
    let sql = format!("SELECT {CLASS_COLUMNS} FROM classes WHERE teacher_id = ?");
    Ok(conn.query_row(&sql, [teacher_id], class_from_row).optional()?)
}

pub fn school_year_start_month(conn: &Connection, school_id: &str) -> Result<u32, AttendError> {
    conn.query_row(
        "SELECT year_start_month FROM schools WHERE id = ?",
        [school_id],
        |r| r.get::<_, u32>(0),
    )
    .optional()?
    .ok_or_else(|| AttendError::not_found("school", school_id))
}

pub fn school_name(conn: &Connection, school_id: &str) -> Result<Option<String>, AttendError> {
    Ok(conn
        .query_row("SELECT name FROM schools WHERE id = ?", [school_id], |r| {
            r.get(0)
        })
        .optional()?)
}

/// Loads a class and checks the caller may see it: admins within their
/// school, teachers only their assigned class.
pub fn class_in_scope(
    conn: &Connection,
    ctx: &RequestContext,
    class_id: &str,
) -> Result<ClassRow, AttendError> {
    let class = load_class(conn, class_id)?.ok_or_else(|| AttendError::class_not_found(class_id))?;
    if class.school_id != ctx.school_id {
        return Err(AttendError::forbidden(
            "cross_school",
            "class belongs to another school",
        ));
    }
    if ctx.role == Role::Teacher && class.teacher_id.as_deref() != Some(ctx.user_id.as_str()) {
        return Err(AttendError::forbidden(
            "cross_class",
            "teachers can only access their own class",
        ));
    }
    Ok(class)
}

/// Teachers resolve to their assigned class; admins must name one.
pub fn resolve_class(
    conn: &Connection,
    ctx: &RequestContext,
    class_id: Option<&str>,
) -> Result<ClassRow, AttendError> {
    match (ctx.role, class_id) {
        (_, Some(id)) => class_in_scope(conn, ctx, id),
        (Role::Teacher, None) => teacher_class(conn, &ctx.user_id)?
            .ok_or_else(|| AttendError::not_found("class", format!("assigned to {}", ctx.user_id))),
        (Role::Admin, None) => Err(AttendError::validation("missing_class", "missing classId")),
    }
}

pub fn student_in_scope(
    conn: &Connection,
    ctx: &RequestContext,
    student_id: &str,
) -> Result<(StudentRow, ClassRow), AttendError> {
    let student =
        load_student(conn, student_id)?.ok_or_else(|| AttendError::not_found("student", student_id))?;
    let class = class_in_scope(conn, ctx, &student.class_id)?;
    Ok((student, class))
}
