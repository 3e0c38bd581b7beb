use crate::error::AttendError;
use crate::model::{format_date, AcademicYear, Gender, RequestContext, Role};
use crate::roster::{self, ClassRow, StudentRow, STUDENT_COLUMNS};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct SchoolRow {
    pub id: String,
    pub name: String,
    pub year_start_month: u32,
}

pub fn create_school(
    conn: &Connection,
    name: &str,
    year_start_month: u32,
) -> Result<SchoolRow, AttendError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AttendError::validation("missing_name", "name must not be empty"));
    }
    if !(1..=12).contains(&year_start_month) {
        return Err(AttendError::validation(
            "invalid_month",
            format!("year start month must be 1-12, got {year_start_month}"),
        ));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO schools(id, name, year_start_month) VALUES(?, ?, ?)",
        (&id, name, year_start_month),
    )
    .map_err(|e| match AttendError::from(e) {
        AttendError::Conflict { .. } => {
            AttendError::conflict("duplicate_school", format!("school {name:?} already exists"))
        }
        other => other,
    })?;
    tracing::info!(school_id = %id, name, "school created");
    Ok(SchoolRow {
        id,
        name: name.to_string(),
        year_start_month,
    })
}

pub fn list_schools(conn: &Connection) -> Result<Vec<SchoolRow>, AttendError> {
    let mut stmt = conn.prepare("SELECT id, name, year_start_month FROM schools ORDER BY name")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(SchoolRow {
                id: r.get(0)?,
                name: r.get(1)?,
                year_start_month: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherRow {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub class_id: Option<String>,
    pub class_label: Option<String>,
    pub academic_year: Option<String>,
}

pub fn create_teacher(
    conn: &Connection,
    ctx: &RequestContext,
    username: &str,
    full_name: &str,
    email: Option<&str>,
) -> Result<TeacherRow, AttendError> {
    ctx.require_admin()?;
    let username = username.trim();
    let full_name = full_name.trim();
    if username.is_empty() || full_name.is_empty() {
        return Err(AttendError::validation(
            "missing_fields",
            "username and full name are required",
        ));
    }
    let email = email.map(str::trim).filter(|e| !e.is_empty());
    if let Some(e) = email {
        validate_email(e)?;
    }
    roster::school_year_start_month(conn, &ctx.school_id)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, school_id, username, full_name, email, role)
         VALUES(?, ?, ?, ?, ?, 'teacher')",
        (&id, &ctx.school_id, username, full_name, email),
    )
    .map_err(|e| match AttendError::from(e) {
        AttendError::Conflict { .. } => AttendError::conflict(
            "duplicate_username",
            format!("username {username:?} is taken"),
        ),
        other => other,
    })?;
    tracing::info!(teacher_id = %id, username, "teacher created");
    Ok(TeacherRow {
        id,
        username: username.to_string(),
        full_name: full_name.to_string(),
        email: email.map(str::to_string),
        class_id: None,
        class_label: None,
        academic_year: None,
    })
}

const TEACHER_SELECT: &str =
    "SELECT u.id, u.username, u.full_name, u.email, c.id, c.standard, c.section, c.academic_year
     FROM users u
     LEFT JOIN classes c ON c.teacher_id = u.id
     WHERE u.role = 'teacher' AND u.school_id = ?";

fn teacher_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<TeacherRow> {
    let standard: Option<i64> = r.get(5)?;
    let section: Option<String> = r.get(6)?;
    Ok(TeacherRow {
        id: r.get(0)?,
        username: r.get(1)?,
        full_name: r.get(2)?,
        email: r.get(3)?,
        class_id: r.get(4)?,
        class_label: standard.zip(section).map(|(s, sec)| format!("{s}{sec}")),
        academic_year: r.get(7)?,
    })
}

pub fn list_teachers(conn: &Connection, ctx: &RequestContext) -> Result<Vec<TeacherRow>, AttendError> {
    ctx.require_admin()?;
    let mut stmt = conn.prepare(&format!("{TEACHER_SELECT} ORDER BY u.full_name"))?;
    let rows = stmt
        .query_map([&ctx.school_id], teacher_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// A teacher of the caller's school; teachers elsewhere are reported as
/// missing.
fn teacher_in_scope(
    conn: &Connection,
    ctx: &RequestContext,
    teacher_id: &str,
) -> Result<TeacherRow, AttendError> {
    conn.query_row(
        &format!("{TEACHER_SELECT} AND u.id = ?"),
        (&ctx.school_id, teacher_id),
        teacher_from_row,
    )
    .optional()?
    .ok_or_else(|| AttendError::not_found("teacher", teacher_id))
}

pub fn update_teacher(
    conn: &Connection,
    ctx: &RequestContext,
    teacher_id: &str,
    username: &str,
    full_name: &str,
    email: Option<&str>,
) -> Result<TeacherRow, AttendError> {
    ctx.require_admin()?;
    let username = username.trim();
    let full_name = full_name.trim();
    if username.is_empty() || full_name.is_empty() {
        return Err(AttendError::validation(
            "missing_fields",
            "username and full name are required",
        ));
    }
    let email = email.map(str::trim).filter(|e| !e.is_empty());
    if let Some(e) = email {
        validate_email(e)?;
    }
    teacher_in_scope(conn, ctx, teacher_id)?;
    conn.execute(
        "UPDATE users SET username = ?, full_name = ?, email = ? WHERE id = ? AND role = 'teacher'",
        (username, full_name, email, teacher_id),
    )
    .map_err(|e| match AttendError::from(e) {
        AttendError::Conflict { .. } => AttendError::conflict(
            "duplicate_username",
            format!("username {username:?} is taken"),
        ),
        other => other,
    })?;
    tracing::info!(teacher_id, username, "teacher updated");
    teacher_in_scope(conn, ctx, teacher_id)
}

/// Removes the teacher account. Their class stays and becomes unassigned.
pub fn delete_teacher(conn: &Connection, ctx: &RequestContext, teacher_id: &str) -> Result<(), AttendError> {
    ctx.require_admin()?;
    let teacher = teacher_in_scope(conn, ctx, teacher_id)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("UPDATE classes SET teacher_id = NULL WHERE teacher_id = ?", [&teacher.id])?;
    tx.execute("DELETE FROM users WHERE id = ? AND role = 'teacher'", [&teacher.id])?;
    tx.commit()?;
    tracing::info!(teacher_id = %teacher.id, freed_class = ?teacher.class_id, "teacher deleted");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ClassDraft {
    pub standard: i64,
    pub section: String,
    pub academic_year: AcademicYear,
    pub teacher_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassListing {
    #[serde(flatten)]
    pub class: ClassRow,
    pub label: String,
    pub teacher_name: Option<String>,
    pub student_count: i64,
}

fn normalize_section(raw: &str) -> Result<String, AttendError> {
    let section = raw.trim().to_uppercase();
    if section.is_empty() {
        return Err(AttendError::validation("missing_section", "section must not be empty"));
    }
    Ok(section)
}

fn check_standard(standard: i64) -> Result<(), AttendError> {
    if !(1..=12).contains(&standard) {
        return Err(AttendError::validation(
            "invalid_standard",
            format!("standard must be 1-12, got {standard}"),
        ));
    }
    Ok(())
}

/// The teacher must belong to the caller's school and must not already run
/// a class other than `except_class`.
fn check_teacher_free(
    conn: &Connection,
    ctx: &RequestContext,
    teacher_id: &str,
    except_class: Option<&str>,
) -> Result<(), AttendError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT school_id FROM users WHERE id = ? AND role = 'teacher'",
            [teacher_id],
            |r| r.get(0),
        )
        .optional()?;
    match found {
        None => return Err(AttendError::not_found("teacher", teacher_id)),
        Some(school) if school != ctx.school_id => {
            return Err(AttendError::forbidden(
                "cross_school",
                "teacher belongs to another school",
            ))
        }
        Some(_) => {}
    }
    if let Some(current) = roster::teacher_class(conn, teacher_id)? {
        if Some(current.id.as_str()) != except_class {
            return Err(AttendError::conflict(
                "teacher_assigned",
                format!("this teacher is already assigned to class {}", current.label()),
            ));
        }
    }
    Ok(())
}

fn duplicate_class(e: rusqlite::Error) -> AttendError {
    match AttendError::from(e) {
        AttendError::Conflict { .. } => AttendError::conflict(
            "duplicate_class",
            "class already exists for this academic year",
        ),
        other => other,
    }
}

pub fn create_class(
    conn: &Connection,
    ctx: &RequestContext,
    draft: ClassDraft,
) -> Result<ClassRow, AttendError> {
    ctx.require_admin()?;
    check_standard(draft.standard)?;
    let section = normalize_section(&draft.section)?;
    if let Some(t) = draft.teacher_id.as_deref() {
        check_teacher_free(conn, ctx, t, None)?;
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, school_id, standard, section, academic_year, teacher_id)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            &ctx.school_id,
            draft.standard,
            &section,
            draft.academic_year.to_string(),
            draft.teacher_id.as_deref(),
        ),
    )
    .map_err(duplicate_class)?;
    let class = ClassRow {
        id,
        school_id: ctx.school_id.clone(),
        standard: draft.standard,
        section,
        academic_year: draft.academic_year,
        teacher_id: draft.teacher_id,
    };
    tracing::info!(class_id = %class.id, label = %class.label(), "class created");
    Ok(class)
}

/// Admins see every class of their school, teachers only their own.
pub fn list_classes(
    conn: &Connection,
    ctx: &RequestContext,
    academic_year: Option<AcademicYear>,
) -> Result<Vec<ClassListing>, AttendError> {
    let mut sql = String::from(
        "SELECT c.id, c.school_id, c.standard, c.section, c.academic_year, c.teacher_id,
                u.full_name,
                (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id)
         FROM classes c
         LEFT JOIN users u ON u.id = c.teacher_id
         WHERE c.school_id = ?",
    );
    let mut bind: Vec<Value> = vec![Value::Text(ctx.school_id.clone())];
    if let Some(y) = academic_year {
        sql.push_str(" AND c.academic_year = ?");
        bind.push(Value::Text(y.to_string()));
    }
    if ctx.role == Role::Teacher {
        sql.push_str(" AND c.teacher_id = ?");
        bind.push(Value::Text(ctx.user_id.clone()));
    }
    sql.push_str(" ORDER BY c.academic_year DESC, c.standard, c.section");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |r| {
            let class = roster::class_from_row(r)?;
            Ok(ClassListing {
                label: class.label(),
                class,
                teacher_name: r.get(6)?,
                student_count: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct ClassPatch {
    pub standard: Option<i64>,
    pub section: Option<String>,
    pub academic_year: Option<AcademicYear>,
    /// `Some(None)` unassigns the teacher.
    pub teacher_id: Option<Option<String>>,
}

pub fn update_class(
    conn: &Connection,
    ctx: &RequestContext,
    class_id: &str,
    patch: ClassPatch,
) -> Result<ClassRow, AttendError> {
    ctx.require_admin()?;
    let mut class = roster::class_in_scope(conn, ctx, class_id)?;
    if let Some(s) = patch.standard {
        check_standard(s)?;
        class.standard = s;
    }
    if let Some(sec) = patch.section.as_deref() {
        class.section = normalize_section(sec)?;
    }
    if let Some(y) = patch.academic_year {
        class.academic_year = y;
    }
    if let Some(t) = patch.teacher_id {
        if let Some(id) = t.as_deref() {
            check_teacher_free(conn, ctx, id, Some(&class.id))?;
        }
        class.teacher_id = t;
    }
    conn.execute(
        "UPDATE classes SET standard = ?, section = ?, academic_year = ?, teacher_id = ? WHERE id = ?",
        (
            class.standard,
            &class.section,
            class.academic_year.to_string(),
            class.teacher_id.as_deref(),
            &class.id,
        ),
    )
    .map_err(duplicate_class)?;
    tracing::info!(class_id = %class.id, label = %class.label(), "class updated");
    Ok(class)
}

pub fn delete_class(conn: &Connection, ctx: &RequestContext, class_id: &str) -> Result<(), AttendError> {
    ctx.require_admin()?;
    let class = roster::class_in_scope(conn, ctx, class_id)?;
    let enrolled: i64 = conn.query_row(
        "SELECT COUNT(*) FROM students WHERE class_id = ?",
        [&class.id],
        |r| r.get(0),
    )?;
    if enrolled > 0 {
        return Err(AttendError::conflict(
            "class_not_empty",
            format!("class {} still has {enrolled} student(s)", class.label()),
        ));
    }
    conn.execute("DELETE FROM classes WHERE id = ?", [&class.id])?;
    tracing::info!(class_id = %class.id, "class deleted");
    Ok(())
}

pub fn my_class(conn: &Connection, ctx: &RequestContext) -> Result<ClassRow, AttendError> {
    roster::resolve_class(conn, ctx, None)
}

/// Parses a mailbox address. The domain must carry at least one dot, so bare
/// host names are refused.
pub fn validate_email(raw: &str) -> Result<lettre::Address, AttendError> {
    let address: lettre::Address = raw.parse().map_err(|e: lettre::address::AddressError| {
        AttendError::validation("invalid_email", format!("please enter a valid email address ({e})"))
    })?;
    let domain = address.domain();
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(AttendError::validation(
            "invalid_email",
            "please enter a valid email address",
        ));
    }
    Ok(address)
}

/// Strips spaces and hyphens and checks for a 10-digit Indian mobile number,
/// optionally prefixed with `+91`. Returns the cleaned form.
pub fn normalize_phone(raw: &str) -> Result<String, AttendError> {
    let cleaned: String = raw.chars().filter(|c| *c != ' ' && *c != '-').collect();
    let digits = cleaned.strip_prefix("+91").unwrap_or(&cleaned);
    let valid = digits.len() == 10
        && digits.chars().all(|c| c.is_ascii_digit())
        && matches!(digits.as_bytes()[0], b'6'..=b'9');
    if !valid {
        return Err(AttendError::validation(
            "invalid_phone",
            "please enter a valid 10-digit Indian mobile number",
        ));
    }
    Ok(cleaned)
}

#[derive(Debug, Clone)]
pub struct StudentDraft {
    pub roll_number: i64,
    pub admission_no: Option<String>,
    pub name: String,
    pub class_id: String,
    pub academic_year: Option<AcademicYear>,
    pub gender: Gender,
    pub parent_email: String,
    pub parent_contact: Option<String>,
}

struct CleanStudent {
    name: String,
    email: String,
    phone: Option<String>,
    admission_no: Option<String>,
    class: ClassRow,
    year: AcademicYear,
}

fn clean_student(
    conn: &Connection,
    ctx: &RequestContext,
    draft: &StudentDraft,
) -> Result<CleanStudent, AttendError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(AttendError::validation("missing_name", "name must not be empty"));
    }
    if draft.roll_number < 1 {
        return Err(AttendError::validation(
            "invalid_roll_number",
            "roll number must be positive",
        ));
    }
    let email = draft.parent_email.trim();
    if email.is_empty() {
        return Err(AttendError::validation("missing_email", "parent email is required"));
    }
    validate_email(email)?;
    let phone = match draft.parent_contact.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => Some(normalize_phone(p)?),
        _ => None,
    };
    let class = roster::class_in_scope(conn, ctx, &draft.class_id)?;
    let year = draft.academic_year.unwrap_or(class.academic_year);
    if year != class.academic_year {
        return Err(AttendError::validation(
            "year_mismatch",
            format!("class {} belongs to {}, not {year}", class.label(), class.academic_year),
        ));
    }
    Ok(CleanStudent {
        name: name.to_string(),
        email: email.to_string(),
        phone,
        admission_no: draft
            .admission_no
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string),
        class,
        year,
    })
}

fn duplicate_roll(e: rusqlite::Error) -> AttendError {
    match AttendError::from(e) {
        AttendError::Conflict { .. } => AttendError::conflict(
            "duplicate_roll_number",
            "roll number already exists for this class and year",
        ),
        other => other,
    }
}

pub fn create_student(
    conn: &Connection,
    ctx: &RequestContext,
    draft: StudentDraft,
) -> Result<StudentRow, AttendError> {
    ctx.require_admin()?;
    let clean = clean_student(conn, ctx, &draft)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, roll_number, admission_no, name, academic_year, gender,
                              parent_email, parent_contact)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &clean.class.id,
            draft.roll_number,
            clean.admission_no.as_deref(),
            &clean.name,
            clean.year.to_string(),
            draft.gender.as_str(),
            &clean.email,
            clean.phone.as_deref(),
        ),
    )
    .map_err(duplicate_roll)?;
    tracing::info!(student_id = %id, class_id = %clean.class.id, "student created");
    Ok(StudentRow {
        id,
        class_id: clean.class.id,
        roll_number: draft.roll_number,
        admission_no: clean.admission_no,
        name: clean.name,
        academic_year: clean.year,
        gender: draft.gender,
        parent_email: Some(clean.email),
        parent_contact: clean.phone,
    })
}

pub fn update_student(
    conn: &Connection,
    ctx: &RequestContext,
    student_id: &str,
    draft: StudentDraft,
) -> Result<StudentRow, AttendError> {
    ctx.require_admin()?;
    roster::student_in_scope(conn, ctx, student_id)?;
    let clean = clean_student(conn, ctx, &draft)?;
    conn.execute(
        "UPDATE students SET class_id = ?, roll_number = ?, admission_no = ?, name = ?,
                             academic_year = ?, gender = ?, parent_email = ?, parent_contact = ?
         WHERE id = ?",
        (
            &clean.class.id,
            draft.roll_number,
            clean.admission_no.as_deref(),
            &clean.name,
            clean.year.to_string(),
            draft.gender.as_str(),
            &clean.email,
            clean.phone.as_deref(),
            student_id,
        ),
    )
    .map_err(duplicate_roll)?;
    tracing::info!(student_id, "student updated");
    roster::load_student(conn, student_id)?.ok_or_else(|| AttendError::not_found("student", student_id))
}

fn delete_student_rows(conn: &Connection, student_id: &str) -> Result<(), AttendError> {
    conn.execute("DELETE FROM attendance_records WHERE student_id = ?", [student_id])?;
    conn.execute("DELETE FROM message_logs WHERE student_id = ?", [student_id])?;
    conn.execute("DELETE FROM students WHERE id = ?", [student_id])?;
    Ok(())
}

/// Removes the student along with their attendance and message history.
pub fn delete_student(conn: &Connection, ctx: &RequestContext, student_id: &str) -> Result<(), AttendError> {
    ctx.require_admin()?;
    let (student, _) = roster::student_in_scope(conn, ctx, student_id)?;
    let tx = conn.unchecked_transaction()?;
    delete_student_rows(&tx, &student.id)?;
    tx.commit()?;
    tracing::info!(student_id = %student.id, "student deleted");
    Ok(())
}

/// Deletes several students in one transaction. An unknown or foreign id
/// aborts the whole batch.
pub fn bulk_delete_students(
    conn: &Connection,
    ctx: &RequestContext,
    student_ids: &[String],
) -> Result<usize, AttendError> {
    ctx.require_admin()?;
    let mut seen = HashSet::new();
    let ids: Vec<&str> = student_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .collect();
    if ids.is_empty() {
        return Err(AttendError::validation("missing_students", "student ids are required"));
    }

    let tx = conn.unchecked_transaction()?;
    for id in &ids {
        let (student, _) = roster::student_in_scope(&tx, ctx, id)?;
        delete_student_rows(&tx, &student.id)?;
    }
    tx.commit()?;
    tracing::info!(count = ids.len(), "students deleted in bulk");
    Ok(ids.len())
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentListing {
    #[serde(flatten)]
    pub student: StudentRow,
    pub standard: i64,
    pub section: String,
}

/// Teachers always get their own class; admins may filter by class and year.
pub fn list_students(
    conn: &Connection,
    ctx: &RequestContext,
    class_id: Option<&str>,
    academic_year: Option<AcademicYear>,
) -> Result<Vec<StudentListing>, AttendError> {
    let cols = STUDENT_COLUMNS
        .split(", ")
        .map(|c| format!("s.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!(
        "SELECT {cols}, c.standard, c.section
         FROM students s JOIN classes c ON c.id = s.class_id
         WHERE c.school_id = ?"
    );
    let mut bind: Vec<Value> = vec![Value::Text(ctx.school_id.clone())];
    match ctx.role {
        Role::Teacher => {
            let class = roster::resolve_class(conn, ctx, class_id)?;
            sql.push_str(" AND c.id = ?");
            bind.push(Value::Text(class.id));
        }
        Role::Admin => {
            if let Some(id) = class_id {
                sql.push_str(" AND c.id = ?");
                bind.push(Value::Text(id.to_string()));
            }
        }
    }
    if let Some(y) = academic_year {
        sql.push_str(" AND s.academic_year = ?");
        bind.push(Value::Text(y.to_string()));
    }
    sql.push_str(" ORDER BY c.standard, c.section, s.roll_number");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok(StudentListing {
                student: roster::student_from_row(r)?,
                standard: r.get(9)?,
                section: r.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
pub struct HolidayRow {
    pub id: String,
    pub holiday_date: NaiveDate,
    pub description: String,
    pub academic_year: AcademicYear,
}

pub fn add_holiday(
    conn: &Connection,
    ctx: &RequestContext,
    date: NaiveDate,
    description: &str,
    academic_year: AcademicYear,
) -> Result<HolidayRow, AttendError> {
    ctx.require_admin()?;
    let description = description.trim();
    if description.is_empty() {
        return Err(AttendError::validation(
            "missing_description",
            "description must not be empty",
        ));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO holidays(id, school_id, holiday_date, description, academic_year)
         VALUES(?, ?, ?, ?, ?)",
        (
            &id,
            &ctx.school_id,
            format_date(date),
            description,
            academic_year.to_string(),
        ),
    )
    .map_err(|e| match AttendError::from(e) {
        AttendError::Conflict { .. } => AttendError::conflict(
            "duplicate_holiday",
            format!("{date} is already a holiday in {academic_year}"),
        ),
        other => other,
    })?;
    tracing::info!(holiday_id = %id, date = %date, academic_year = %academic_year, "holiday added");
    Ok(HolidayRow {
        id,
        holiday_date: date,
        description: description.to_string(),
        academic_year,
    })
}

pub fn list_holidays(
    conn: &Connection,
    ctx: &RequestContext,
    academic_year: Option<AcademicYear>,
) -> Result<Vec<HolidayRow>, AttendError> {
    let mut sql = String::from(
        "SELECT id, holiday_date, description, academic_year FROM holidays WHERE school_id = ?",
    );
    let mut bind: Vec<Value> = vec![Value::Text(ctx.school_id.clone())];
    if let Some(y) = academic_year {
        sql.push_str(" AND academic_year = ?");
        bind.push(Value::Text(y.to_string()));
    }
    sql.push_str(" ORDER BY holiday_date");
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter()
        .map(|(id, date, description, year)| -> Result<HolidayRow, AttendError> {
            Ok(HolidayRow {
                id,
                holiday_date: crate::model::parse_date(&date)?,
                description,
                academic_year: year.parse()?,
            })
        })
        .collect()
}

pub fn delete_holiday(conn: &Connection, ctx: &RequestContext, holiday_id: &str) -> Result<(), AttendError> {
    ctx.require_admin()?;
    let n = conn.execute(
        "DELETE FROM holidays WHERE id = ? AND school_id = ?",
        (holiday_id, &ctx.school_id),
    )?;
    if n == 0 {
        return Err(AttendError::not_found("holiday", holiday_id));
    }
    tracing::info!(holiday_id, "holiday deleted");
    Ok(())
}
