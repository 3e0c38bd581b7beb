use crate::calc;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_str, get_optional_year, get_required_date, get_required_i64, get_required_str,
    get_required_year, with_scope,
};
use crate::ipc::types::{AppState, Request};

fn handle_student_period(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let student_id = get_required_str(&req.params, "studentId")?;
        let start = get_required_date(&req.params, "startDate")?;
        let end = get_required_date(&req.params, "endDate")?;
        let year = get_optional_year(&req.params, "academicYear")?;
        let report = calc::student_period_report(conn, ctx, &student_id, start, end, year)?;
        Ok(serde_json::to_value(report)?)
    })
}

fn handle_class_monthly(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let class_id = get_required_str(&req.params, "classId")?;
        let month = u32::try_from(get_required_i64(&req.params, "month")?)
            .map_err(|_| HandlerErr::bad_params("month must be 1-12"))?;
        let year = i32::try_from(get_required_i64(&req.params, "year")?)
            .map_err(|_| HandlerErr::bad_params("year out of range"))?;
        let report = calc::class_monthly_report(conn, ctx, &class_id, year, month)?;
        Ok(serde_json::to_value(report)?)
    })
}

fn handle_class_daily(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let class_id = get_optional_str(&req.params, "classId");
        let date = get_required_date(&req.params, "date")?;
        let report = calc::class_daily_report(conn, ctx, class_id.as_deref(), date)?;
        Ok(serde_json::to_value(report)?)
    })
}

fn handle_student_yearly(state: &mut AppState, req: &Request) -> serde_json::Value {
    let today = state.clock.today();
    with_scope(state, req, |conn, ctx| {
        let student_id = get_required_str(&req.params, "studentId")?;
        let year = get_required_year(&req.params, "academicYear")?;
        let report = calc::student_yearly_report(conn, ctx, &student_id, year, today)?;
        Ok(serde_json::to_value(report)?)
    })
}

fn handle_class_yearly(state: &mut AppState, req: &Request) -> serde_json::Value {
    let today = state.clock.today();
    with_scope(state, req, |conn, ctx| {
        let class_id = get_required_str(&req.params, "classId")?;
        let year = get_required_year(&req.params, "academicYear")?;
        let report = calc::class_yearly_report(conn, ctx, &class_id, year, today)?;
        Ok(serde_json::to_value(report)?)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentPeriod" => Some(handle_student_period(state, req)),
        "reports.classMonthly" => Some(handle_class_monthly(state, req)),
        "reports.classDaily" => Some(handle_class_daily(state, req)),
        "reports.studentYearly" => Some(handle_student_yearly(state, req)),
        "reports.classYearly" => Some(handle_class_yearly(state, req)),
        _ => None,
    }
}
