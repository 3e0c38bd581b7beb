use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_str, get_required_date, get_required_str, with_scope};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, DayMark, MarkWindow};
use crate::model::AttendanceStatus;
use serde_json::json;

fn mark_window(state: &AppState) -> MarkWindow {
    MarkWindow {
        today: state.clock.today(),
        admin_window_days: state.config.edit_window_days,
        now: state.clock.now(),
    }
}

fn parse_marks(params: &serde_json::Value) -> Result<Vec<DayMark>, HandlerErr> {
    let Some(records) = params.get("records").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing records"));
    };
    records
        .iter()
        .map(|r| -> Result<DayMark, HandlerErr> {
            let student_id = get_required_str(r, "studentId")?;
            let status = AttendanceStatus::parse(&get_required_str(r, "status")?)?;
            Ok(DayMark { student_id, status })
        })
        .collect()
}

fn handle_mark_class_day(state: &mut AppState, req: &Request) -> serde_json::Value {
    let window = mark_window(state);
    with_scope(state, req, |conn, ctx| {
        let class_id = get_optional_str(&req.params, "classId");
        let date = get_required_date(&req.params, "date")?;
        let marks = parse_marks(&req.params)?;
        let outcome = ledger::mark_class_day(conn, ctx, class_id.as_deref(), date, &marks, window)?;
        Ok(serde_json::to_value(outcome)?)
    })
}

fn handle_edit_past(state: &mut AppState, req: &Request) -> serde_json::Value {
    let window = mark_window(state);
    with_scope(state, req, |conn, ctx| {
        ctx.require_admin()?;
        let student_id = get_required_str(&req.params, "studentId")?;
        let date = get_required_date(&req.params, "date")?;
        let status = AttendanceStatus::parse(&get_required_str(&req.params, "status")?)?;
        let outcome = ledger::mark_day(conn, ctx, &student_id, date, status, window)?;
        Ok(serde_json::to_value(outcome)?)
    })
}

fn handle_for_date(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let class_id = get_optional_str(&req.params, "classId");
        let date = get_required_date(&req.params, "date")?;
        let roster = ledger::day_roster(conn, ctx, class_id.as_deref(), date)?;
        Ok(json!({ "attendance": roster }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.markClassDay" => Some(handle_mark_class_day(state, req)),
        "attendance.editPast" => Some(handle_edit_past(state, req)),
        "attendance.forDate" => Some(handle_for_date(state, req)),
        _ => None,
    }
}
