use crate::directory::{self, StudentDraft};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_str, get_optional_year, get_required_i64, get_required_str, get_str_list,
    with_scope,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Gender;
use serde_json::json;

fn student_draft(params: &serde_json::Value) -> Result<StudentDraft, HandlerErr> {
    Ok(StudentDraft {
        roll_number: get_required_i64(params, "rollNumber")?,
        admission_no: get_optional_str(params, "admissionNo"),
        name: get_required_str(params, "name")?,
        class_id: get_required_str(params, "classId")?,
        academic_year: get_optional_year(params, "academicYear")?,
        gender: Gender::parse(&get_required_str(params, "gender")?)?,
        parent_email: get_required_str(params, "parentEmail")?,
        parent_contact: get_optional_str(params, "parentContact"),
    })
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let draft = student_draft(&req.params)?;
        let student = directory::create_student(conn, ctx, draft)?;
        Ok(json!({ "studentId": student.id, "student": student }))
    })
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let class_id = get_optional_str(&req.params, "classId");
        let year = get_optional_year(&req.params, "academicYear")?;
        let students = directory::list_students(conn, ctx, class_id.as_deref(), year)?;
        Ok(json!({ "students": students }))
    })
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let student_id = get_required_str(&req.params, "studentId")?;
        let draft = student_draft(&req.params)?;
        let student = directory::update_student(conn, ctx, &student_id, draft)?;
        Ok(json!({ "student": student }))
    })
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let student_id = get_required_str(&req.params, "studentId")?;
        directory::delete_student(conn, ctx, &student_id)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_students_bulk_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let student_ids = get_str_list(&req.params, "studentIds")?;
        let deleted = directory::bulk_delete_students(conn, ctx, &student_ids)?;
        Ok(json!({ "deleted": deleted }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.bulkDelete" => Some(handle_students_bulk_delete(state, req)),
        _ => None,
    }
}
