use crate::directory::{self, ClassDraft, ClassPatch};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_i64, get_optional_str, get_optional_year, get_required_i64, get_required_str,
    get_required_year, with_scope,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// `teacherId` may be absent (leave as is), null (unassign) or a string.
fn teacher_patch(params: &serde_json::Value) -> Result<Option<Option<String>>, HandlerErr> {
    match params.get("teacherId") {
        None => Ok(None),
        Some(serde_json::Value::Null) => Ok(Some(None)),
        Some(v) => v
            .as_str()
            .map(|s| Some(Some(s.to_string())))
            .ok_or_else(|| HandlerErr::bad_params("teacherId must be a string or null")),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let draft = ClassDraft {
            standard: get_required_i64(&req.params, "standard")?,
            section: get_required_str(&req.params, "section")?,
            academic_year: get_required_year(&req.params, "academicYear")?,
            teacher_id: get_optional_str(&req.params, "teacherId"),
        };
        let class = directory::create_class(conn, ctx, draft)?;
        Ok(json!({ "classId": class.id, "label": class.label(), "class": class }))
    })
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let year = get_optional_year(&req.params, "academicYear")?;
        let classes = directory::list_classes(conn, ctx, year)?;
        Ok(json!({ "classes": classes }))
    })
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let class_id = get_required_str(&req.params, "classId")?;
        let patch = ClassPatch {
            standard: get_optional_i64(&req.params, "standard")?,
            section: get_optional_str(&req.params, "section"),
            academic_year: get_optional_year(&req.params, "academicYear")?,
            teacher_id: teacher_patch(&req.params)?,
        };
        let class = directory::update_class(conn, ctx, &class_id, patch)?;
        Ok(json!({ "class": class }))
    })
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let class_id = get_required_str(&req.params, "classId")?;
        directory::delete_class(conn, ctx, &class_id)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_classes_mine(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let class = directory::my_class(conn, ctx)?;
        Ok(json!({ "class": class, "label": class.label() }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.update" => Some(handle_classes_update(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        "classes.mine" => Some(handle_classes_mine(state, req)),
        _ => None,
    }
}
