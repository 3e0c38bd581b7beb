use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_date, get_optional_str, get_required_date, get_str_list, with_scope,
};
use crate::ipc::types::{AppState, Request};
use crate::notify::{self, HistoryFilter};
use serde_json::json;

fn handle_absent_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let date = get_required_date(&req.params, "date")?;
        let class_id = get_optional_str(&req.params, "classId");
        let students = notify::absent_students(conn, ctx, date, class_id.as_deref())?;
        Ok(json!({ "students": students }))
    })
}

fn handle_send(state: &mut AppState, req: &Request) -> serde_json::Value {
    let dispatcher = state.dispatcher.as_deref();
    let sent_at = state.clock.now();
    with_scope(state, req, |conn, ctx| {
        let Some(dispatcher) = dispatcher else {
            return Err(HandlerErr {
                code: "no_dispatcher",
                message: "no notification dispatcher configured".to_string(),
                details: None,
            });
        };
        let student_ids = get_str_list(&req.params, "studentIds")?;
        let date = get_required_date(&req.params, "date")?;
        let report =
            notify::send_absence_notices(conn, ctx, dispatcher, &student_ids, date, sent_at)?;
        Ok(serde_json::to_value(report)?)
    })
}

fn handle_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let filter = HistoryFilter {
            start_date: get_optional_date(&req.params, "startDate")?,
            end_date: get_optional_date(&req.params, "endDate")?,
            student_id: get_optional_str(&req.params, "studentId"),
            status: get_optional_str(&req.params, "status"),
        };
        let messages = notify::message_history(conn, ctx, &filter)?;
        Ok(json!({ "messages": messages }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "messaging.absentStudents" => Some(handle_absent_students(state, req)),
        "messaging.send" => Some(handle_send(state, req)),
        "messaging.history" => Some(handle_history(state, req)),
        _ => None,
    }
}
