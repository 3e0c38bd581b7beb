//! Seeding helpers for in-memory unit tests.

use crate::db::apply_schema;
use crate::model::{RequestContext, Role};
use rusqlite::Connection;
use uuid::Uuid;

pub fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    apply_schema(&conn).expect("apply schema");
    conn
}

pub fn seed_school(conn: &Connection, name: &str) -> String {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO schools(id, name, year_start_month) VALUES(?, ?, 4)",
        (&id, name),
    )
    .expect("insert school");
    id
}

pub fn seed_teacher(conn: &Connection, school_id: &str, username: &str) -> String {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, school_id, username, full_name, role) VALUES(?, ?, ?, ?, 'teacher')",
        (&id, school_id, username, username),
    )
    .expect("insert teacher");
    id
}

pub fn seed_class(
    conn: &Connection,
    school_id: &str,
    standard: i64,
    section: &str,
    year: &str,
    teacher_id: Option<&str>,
) -> String {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, school_id, standard, section, academic_year, teacher_id)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, school_id, standard, section, year, teacher_id),
    )
    .expect("insert class");
    id
}

pub fn seed_student(
    conn: &Connection,
    class_id: &str,
    roll: i64,
    gender: &str,
    year: &str,
) -> String {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, roll_number, name, academic_year, gender, parent_email)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            class_id,
            roll,
            format!("Student {roll}"),
            year,
            gender,
            format!("parent{roll}@example.com"),
        ),
    )
    .expect("insert student");
    id
}

pub fn seed_record(conn: &Connection, student_id: &str, date: &str, status: &str) {
    conn.execute(
        "INSERT INTO attendance_records(id, student_id, attendance_date, status, marked_by, marked_at)
         VALUES(?, ?, ?, ?, 'seed', '2000-01-01T00:00:00')",
        (Uuid::new_v4().to_string(), student_id, date, status),
    )
    .expect("insert record");
}

pub fn seed_holiday(conn: &Connection, school_id: &str, date: &str, year: &str) {
    conn.execute(
        "INSERT INTO holidays(id, school_id, holiday_date, description, academic_year)
         VALUES(?, ?, ?, 'holiday', ?)",
        (Uuid::new_v4().to_string(), school_id, date, year),
    )
    .expect("insert holiday");
}

pub fn admin(school_id: &str) -> RequestContext {
    RequestContext {
        user_id: "admin-1".to_string(),
        role: Role::Admin,
        school_id: school_id.to_string(),
    }
}

pub fn teacher(school_id: &str, user_id: &str) -> RequestContext {
    RequestContext {
        user_id: user_id.to_string(),
        role: Role::Teacher,
        school_id: school_id.to_string(),
    }
}
