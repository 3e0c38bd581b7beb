use rusqlite::ffi;
use serde_json::json;

/// Failure taxonomy shared by the calendar, ledger, report and promotion code.
///
/// Every variant carries a short `kind` so callers can tell e.g. a future date
/// from a stale one without parsing the message.
#[derive(Debug, thiserror::Error)]
pub enum AttendError {
    #[error("{message}")]
    Validation { kind: &'static str, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{message}")]
    Conflict { kind: &'static str, message: String },

    #[error("{message}")]
    Forbidden { kind: &'static str, message: String },

    #[error("{message}")]
    Policy { kind: &'static str, message: String },

    #[error("database error: {0}")]
    Db(rusqlite::Error),
}

impl AttendError {
    pub fn validation(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn conflict(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            message: message.into(),
        }
    }

    pub fn forbidden(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Forbidden {
            kind,
            message: message.into(),
        }
    }

    pub fn policy(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Policy {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_range() -> Self {
        Self::validation("invalid_range", "end date must not be before start date")
    }

    pub fn invalid_year_format(raw: &str) -> Self {
        Self::validation(
            "invalid_year_format",
            format!("academic year must look like 2023-2024, got {raw:?}"),
        )
    }

    pub fn future_date() -> Self {
        Self::policy("future_date", "cannot mark attendance for a future date")
    }

    pub fn window_exceeded(message: impl Into<String>) -> Self {
        Self::policy("window_exceeded", message)
    }

    pub fn already_graduated(standard: i64) -> Self {
        Self::policy(
            "already_graduated",
            format!("students in grade {standard} cannot be promoted further"),
        )
    }

    pub fn class_not_found(id: &str) -> Self {
        Self::not_found("class", id)
    }

    pub fn unauthorized_membership() -> Self {
        Self::forbidden(
            "unauthorized_membership",
            "some students do not belong to the selected class",
        )
    }

    /// IPC error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "bad_params",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Forbidden { .. } => "forbidden",
            Self::Policy { .. } => "policy_violation",
            Self::Db(_) => "db_error",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { kind, .. }
            | Self::Conflict { kind, .. }
            | Self::Forbidden { kind, .. }
            | Self::Policy { kind, .. } => kind,
            Self::NotFound { entity, .. } => entity,
            Self::Db(_) => "db",
        }
    }

    /// HTTP-equivalent status for presentation layers that speak HTTP.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::Policy { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::Forbidden { .. } => 403,
            Self::Db(_) => 500,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn details(&self) -> serde_json::Value {
        json!({ "kind": self.kind(), "status": self.status() })
    }
}

impl From<rusqlite::Error> for AttendError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref inner, _) = e {
            if inner.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || inner.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return Self::conflict("unique_violation", e.to_string());
            }
            if inner.code == ffi::ErrorCode::DatabaseBusy
                || inner.code == ffi::ErrorCode::DatabaseLocked
            {
                return Self::conflict("store_busy", e.to_string());
            }
        }
        Self::Db(e)
    }
}
