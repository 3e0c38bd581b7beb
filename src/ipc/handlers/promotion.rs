use crate::ipc::helpers::{get_required_str, get_str_list, with_scope};
use crate::ipc::types::{AppState, Request};
use crate::promotion;

fn handle_promote(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let class_id = get_required_str(&req.params, "classId")?;
        let student_ids = get_str_list(&req.params, "studentIds")?;
        let outcome = promotion::promote_students(conn, ctx, &class_id, &student_ids)?;
        Ok(serde_json::to_value(outcome)?)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "promotion.promote" => Some(handle_promote(state, req)),
        _ => None,
    }
}
