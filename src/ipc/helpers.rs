use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_date, AcademicYear, RequestContext};
use chrono::NaiveDate;
use rusqlite::Connection;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    match params.get(key) {
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
        None => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

pub fn get_optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(_) => get_required_i64(params, key).map(Some),
    }
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    Ok(parse_date(&raw)?)
}

pub fn get_optional_date(params: &serde_json::Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match get_optional_str(params, key) {
        Some(raw) => Ok(Some(parse_date(&raw)?)),
        None => Ok(None),
    }
}

pub fn get_required_year(params: &serde_json::Value, key: &str) -> Result<AcademicYear, HandlerErr> {
    let raw = get_required_str(params, key)?;
    Ok(raw.parse()?)
}

pub fn get_optional_year(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<AcademicYear>, HandlerErr> {
    match get_optional_str(params, key) {
        Some(raw) => Ok(Some(raw.parse()?)),
        None => Ok(None),
    }
}

pub fn get_str_list(params: &serde_json::Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must contain only strings", key)))
        })
        .collect()
}

pub fn require_context(req: &Request) -> Result<&RequestContext, HandlerErr> {
    req.context.as_ref().ok_or_else(|| HandlerErr {
        code: "no_context",
        message: "request context (userId, role, schoolId) is required".to_string(),
        details: None,
    })
}

/// Runs a school-scoped handler: needs an open workspace and a request context.
pub fn with_scope<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &RequestContext) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let result = require_context(req).and_then(|ctx| f(conn, ctx));
    match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    }
}
