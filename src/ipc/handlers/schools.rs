use crate::calendar::{self, CalendarScope};
use crate::directory;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_i64, get_optional_str, get_optional_year, get_required_date, get_required_str,
    get_required_year, with_scope,
};
use crate::ipc::types::{AppState, Request};
use crate::model::AcademicYear;
use crate::roster;
use rusqlite::Connection;
use serde_json::json;

fn schools_create(
    conn: &Connection,
    default_month: u32,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let month = match get_optional_i64(params, "yearStartMonth")? {
        Some(m) => u32::try_from(m)
            .map_err(|_| HandlerErr::bad_params("yearStartMonth must be 1-12"))?,
        None => default_month,
    };
    let school = directory::create_school(conn, &name, month)?;
    Ok(json!({ "school": school }))
}

fn handle_schools_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match schools_create(conn, state.config.year_start_month, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_schools_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "schools": [] }));
    };
    match directory::list_schools(conn) {
        Ok(schools) => ok(&req.id, json!({ "schools": schools })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let username = get_required_str(&req.params, "username")?;
        let full_name = get_required_str(&req.params, "fullName")?;
        let email = get_optional_str(&req.params, "email");
        let teacher =
            directory::create_teacher(conn, ctx, &username, &full_name, email.as_deref())?;
        Ok(json!({ "teacher": teacher }))
    })
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let teachers = directory::list_teachers(conn, ctx)?;
        Ok(json!({ "teachers": teachers }))
    })
}

fn handle_teachers_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let teacher_id = get_required_str(&req.params, "teacherId")?;
        let username = get_required_str(&req.params, "username")?;
        let full_name = get_required_str(&req.params, "fullName")?;
        let email = get_optional_str(&req.params, "email");
        let teacher = directory::update_teacher(
            conn,
            ctx,
            &teacher_id,
            &username,
            &full_name,
            email.as_deref(),
        )?;
        Ok(json!({ "teacher": teacher }))
    })
}

fn handle_teachers_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let teacher_id = get_required_str(&req.params, "teacherId")?;
        directory::delete_teacher(conn, ctx, &teacher_id)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_holidays_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let date = get_required_date(&req.params, "date")?;
        let description = get_required_str(&req.params, "description")?;
        let year = match get_optional_year(&req.params, "academicYear")? {
            Some(year) => year,
            None => {
                let start_month = roster::school_year_start_month(conn, &ctx.school_id)?;
                AcademicYear::containing(date, start_month)?
            }
        };
        let holiday = directory::add_holiday(conn, ctx, date, &description, year)?;
        Ok(json!({ "holiday": holiday }))
    })
}

fn handle_holidays_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let year = get_optional_year(&req.params, "academicYear")?;
        let holidays = directory::list_holidays(conn, ctx, year)?;
        Ok(json!({ "holidays": holidays }))
    })
}

fn handle_holidays_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let holiday_id = get_required_str(&req.params, "holidayId")?;
        directory::delete_holiday(conn, ctx, &holiday_id)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_calendar_school_days(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_scope(state, req, |conn, ctx| {
        let scope = CalendarScope {
            school_id: &ctx.school_id,
            academic_year: get_required_year(&req.params, "academicYear")?,
        };
        let start = get_required_date(&req.params, "startDate")?;
        let end = get_required_date(&req.params, "endDate")?;
        let days = calendar::school_days_in_range(conn, scope, start, end)?;
        Ok(serde_json::to_value(days)?)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schools.create" => Some(handle_schools_create(state, req)),
        "schools.list" => Some(handle_schools_list(state, req)),
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.update" => Some(handle_teachers_update(state, req)),
        "teachers.delete" => Some(handle_teachers_delete(state, req)),
        "holidays.add" => Some(handle_holidays_add(state, req)),
        "holidays.list" => Some(handle_holidays_list(state, req)),
        "holidays.delete" => Some(handle_holidays_delete(state, req)),
        "calendar.schoolDays" => Some(handle_calendar_school_days(state, req)),
        _ => None,
    }
}
