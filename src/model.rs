use crate::error::AttendError;
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A school cycle labelled `"<start>-<start+1>"`.
///
/// Parsed once where the string enters the system; everything downstream works
/// with the two years directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AcademicYear {
    start_year: i32,
    end_year: i32,
}

/// Both halves of the label are four digits.
const MAX_YEAR: i32 = 9999;

impl AcademicYear {
    pub fn new(start_year: i32) -> Result<Self, AttendError> {
        let end_year = start_year
            .checked_add(1)
            .filter(|end| start_year >= 0 && *end <= MAX_YEAR)
            .ok_or_else(|| AttendError::invalid_year_format(&start_year.to_string()))?;
        Ok(Self {
            start_year,
            end_year,
        })
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn end_year(&self) -> i32 {
        self.end_year
    }

    pub fn next(&self) -> Result<Self, AttendError> {
        Self::new(self.end_year)
    }

    /// First and last calendar day of the year when it starts in `start_month`.
    pub fn date_range(&self, start_month: u32) -> Result<(NaiveDate, NaiveDate), AttendError> {
        let start = NaiveDate::from_ymd_opt(self.start_year, start_month, 1).ok_or_else(|| {
            AttendError::validation(
                "invalid_start_month",
                format!("year start month must be 1-12, got {start_month}"),
            )
        })?;
        let end = start
            .checked_add_months(Months::new(12))
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| AttendError::validation("invalid_range", "academic year out of range"))?;
        Ok((start, end))
    }

    /// The academic year a calendar date falls in.
    pub fn containing(date: NaiveDate, start_month: u32) -> Result<Self, AttendError> {
        if date.month() >= start_month {
            Self::new(date.year())
        } else {
            Self::new(date.year() - 1)
        }
    }
}

impl FromStr for AcademicYear {
    type Err = AttendError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let four_digits = |part: &str| -> Option<i32> {
            if part.len() == 4 && part.bytes().all(|b| b.is_ascii_digit()) {
                part.parse().ok()
            } else {
                None
            }
        };
        let Some((a, b)) = raw.trim().split_once('-') else {
            return Err(AttendError::invalid_year_format(raw));
        };
        let (Some(start), Some(end)) = (four_digits(a), four_digits(b)) else {
            return Err(AttendError::invalid_year_format(raw));
        };
        if start.checked_add(1) != Some(end) {
            return Err(AttendError::invalid_year_format(raw));
        }
        Self::new(start).map_err(|_| AttendError::invalid_year_format(raw))
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_year, self.end_year)
    }
}

impl Serialize for AcademicYear {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AcademicYear {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AttendError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            _ => Err(AttendError::validation(
                "invalid_gender",
                "gender must be either male or female",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AttendError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            other => Err(AttendError::validation(
                "invalid_status",
                format!("status must be one of: present, absent, late (got {other:?})"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
}

/// Who is asking. Supplied by the transport on every request and passed
/// explicitly into each operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub user_id: String,
    pub role: Role,
    pub school_id: String,
}

impl RequestContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AttendError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AttendError::forbidden(
                "admin_required",
                "this action requires the admin role",
            ))
        }
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, AttendError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        AttendError::validation("invalid_date", format!("date must be YYYY-MM-DD, got {raw:?}"))
    })
}

pub fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}
