use crate::error::AttendError;
use crate::model::{format_date, RequestContext, Role};
use crate::roster;
use crate::clock::format_stamp;
use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use lettre::message::{header::ContentType, Mailbox};
use lettre::{FileTransport, Message, Transport};
use rusqlite::{params_from_iter, types::Value, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

pub const DEFAULT_SCHOOL_LABEL: &str = "School Administration";
const HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct AbsenceNotice {
    pub student_id: String,
    pub student_name: String,
    pub recipient: String,
    pub absence_date: NaiveDate,
    pub school_label: String,
}

impl AbsenceNotice {
    pub fn subject(&self) -> String {
        format!(
            "Attendance Alert: {} - {}",
            self.student_name,
            self.absence_date.format("%-d %B %Y")
        )
    }

    pub fn body(&self) -> String {
        format!(
            "Attendance Alert\n\nDear Parent,\n\n{} was marked as ABSENT on {}.\n\n\
             If this is incorrect, please contact the school.\n\n- {}",
            self.student_name,
            self.absence_date.format("%-d %B %Y"),
            self.school_label
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn sent() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Delivery boundary. Failures are returned as data; callers record them and
/// carry on.
pub trait NotificationDispatcher {
    fn send(&self, notice: &AbsenceNotice) -> DispatchOutcome;
}

/// Writes each notice as an `.eml` file into a directory that a mail relay
/// picks up.
pub struct OutboxDispatcher {
    dir: PathBuf,
    from: Mailbox,
    transport: FileTransport,
}

impl OutboxDispatcher {
    pub fn new(dir: PathBuf, from: Mailbox) -> Self {
        let transport = FileTransport::new(&dir);
        Self {
            dir,
            from,
            transport,
        }
    }

    fn message(&self, notice: &AbsenceNotice) -> anyhow::Result<Message> {
        let to: Mailbox = notice
            .recipient
            .parse()
            .with_context(|| format!("invalid recipient {:?}", notice.recipient))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notice.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(notice.body())
            .context("failed to build absence notice")
    }

    fn write(&self, notice: &AbsenceNotice) -> anyhow::Result<String> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create outbox {}", self.dir.to_string_lossy()))?;
        let message = self.message(notice)?;
        let id = self
            .transport
            .send(&message)
            .with_context(|| format!("failed to write to outbox {}", self.dir.to_string_lossy()))?;
        Ok(id)
    }
}

impl NotificationDispatcher for OutboxDispatcher {
    fn send(&self, notice: &AbsenceNotice) -> DispatchOutcome {
        match self.write(notice) {
            Ok(id) => {
                tracing::debug!(message_id = %id, student_id = %notice.student_id, "notice queued");
                DispatchOutcome::sent()
            }
            Err(e) => DispatchOutcome::failed(format!("{e:#}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchError {
    pub student_id: String,
    pub student_name: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub errors: Vec<DispatchError>,
}

#[derive(Debug, Clone)]
struct Recipient {
    id: String,
    name: String,
    parent_email: Option<String>,
    school_id: String,
    teacher_id: Option<String>,
}

fn log_attempt(
    conn: &Connection,
    notice: &AbsenceNotice,
    outcome: &DispatchOutcome,
    sent_by: &str,
    sent_at: NaiveDateTime,
) -> Result<(), AttendError> {
    conn.execute(
        "INSERT INTO message_logs(id, student_id, message_type, recipient, subject, message_content,
                                  status, sent_by, attendance_date, error_message, sent_at)
         VALUES(?, ?, 'email', ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &notice.student_id,
            &notice.recipient,
            notice.subject(),
            notice.body(),
            if outcome.success { "sent" } else { "failed" },
            sent_by,
            format_date(notice.absence_date),
            outcome.error.as_deref(),
            format_stamp(sent_at),
        ),
    )?;
    Ok(())
}

/// Sends absence notices for the given students. Scope is checked for the
/// whole set before anything is sent; after that each student succeeds or
/// fails on its own.
pub fn send_absence_notices(
    conn: &Connection,
    ctx: &RequestContext,
    dispatcher: &dyn NotificationDispatcher,
    student_ids: &[String],
    date: NaiveDate,
    sent_at: NaiveDateTime,
) -> Result<DispatchReport, AttendError> {
    if student_ids.is_empty() {
        return Err(AttendError::validation("missing_students", "student ids are required"));
    }
    let placeholders = vec!["?"; student_ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT s.id, s.name, s.parent_email, c.school_id, c.teacher_id
         FROM students s JOIN classes c ON c.id = s.class_id
         WHERE s.id IN ({placeholders})"
    ))?;
    let found: HashMap<String, Recipient> = stmt
        .query_map(params_from_iter(student_ids.iter()), |r| {
            Ok(Recipient {
                id: r.get(0)?,
                name: r.get(1)?,
                parent_email: r.get(2)?,
                school_id: r.get(3)?,
                teacher_id: r.get(4)?,
            })
        })?
        .map(|row| row.map(|rec| (rec.id.clone(), rec)))
        .collect::<Result<_, _>>()?;

    if found.values().any(|r| r.school_id != ctx.school_id) {
        return Err(AttendError::forbidden(
            "cross_school",
            "you can only send messages to students in your school",
        ));
    }
    if ctx.role == Role::Teacher
        && found
            .values()
            .any(|r| r.teacher_id.as_deref() != Some(ctx.user_id.as_str()))
    {
        return Err(AttendError::forbidden(
            "cross_class",
            "you can only send messages to students in your class",
        ));
    }

    let school_label = roster::school_name(conn, &ctx.school_id)?
        .unwrap_or_else(|| DEFAULT_SCHOOL_LABEL.to_string());
    let mut report = DispatchReport::default();
    for id in student_ids {
        report.total += 1;
        let Some(rec) = found.get(id) else {
            report.failed += 1;
            report.errors.push(DispatchError {
                student_id: id.clone(),
                student_name: None,
                error: "student not found".to_string(),
            });
            continue;
        };
        let Some(email) = rec.parent_email.as_deref().filter(|e| !e.trim().is_empty()) else {
            report.failed += 1;
            report.errors.push(DispatchError {
                student_id: rec.id.clone(),
                student_name: Some(rec.name.clone()),
                error: "no parent email address provided".to_string(),
            });
            continue;
        };

        let notice = AbsenceNotice {
            student_id: rec.id.clone(),
            student_name: rec.name.clone(),
            recipient: email.to_string(),
            absence_date: date,
            school_label: school_label.clone(),
        };
        let outcome = dispatcher.send(&notice);
        log_attempt(conn, &notice, &outcome, &ctx.user_id, sent_at)?;
        if outcome.success {
            report.sent += 1;
        } else {
            tracing::warn!(student_id = %rec.id, error = ?outcome.error, "absence notice failed");
            report.failed += 1;
            report.errors.push(DispatchError {
                student_id: rec.id.clone(),
                student_name: Some(rec.name.clone()),
                error: outcome.error.unwrap_or_else(|| "delivery failed".to_string()),
            });
        }
    }
    tracing::info!(
        date = %date,
        total = report.total,
        sent = report.sent,
        failed = report.failed,
        "absence notices dispatched"
    );
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct AbsentStudent {
    pub id: String,
    pub name: String,
    pub roll_number: i64,
    pub parent_email: Option<String>,
    pub parent_contact: Option<String>,
    pub standard: i64,
    pub section: String,
    pub attendance_date: NaiveDate,
    /// A notice was already issued for this absence.
    pub message_sent: bool,
}

/// Students marked absent on `date`: a teacher's own class, or for admins the
/// whole school or one class of it.
pub fn absent_students(
    conn: &Connection,
    ctx: &RequestContext,
    date: NaiveDate,
    class_id: Option<&str>,
) -> Result<Vec<AbsentStudent>, AttendError> {
    let mut sql = String::from(
        "SELECT s.id, s.name, s.roll_number, s.parent_email, s.parent_contact, c.standard, c.section,
                EXISTS(SELECT 1 FROM message_logs ml
                       WHERE ml.student_id = s.id AND ml.attendance_date = ar.attendance_date)
         FROM students s
         JOIN classes c ON c.id = s.class_id
         JOIN attendance_records ar ON ar.student_id = s.id
         WHERE ar.attendance_date = ? AND ar.status = 'absent' AND c.school_id = ?",
    );
    let mut bind: Vec<Value> = vec![
        Value::Text(format_date(date)),
        Value::Text(ctx.school_id.clone()),
    ];
    match ctx.role {
        Role::Teacher => {
            sql.push_str(" AND c.teacher_id = ?");
            bind.push(Value::Text(ctx.user_id.clone()));
        }
        Role::Admin => {
            if let Some(id) = class_id {
                sql.push_str(" AND c.id = ?");
                bind.push(Value::Text(id.to_string()));
            }
        }
    }
    sql.push_str(" ORDER BY c.standard, c.section, s.roll_number");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok(AbsentStudent {
                id: r.get(0)?,
                name: r.get(1)?,
                roll_number: r.get(2)?,
                parent_email: r.get(3)?,
                parent_contact: r.get(4)?,
                standard: r.get(5)?,
                section: r.get(6)?,
                attendance_date: date,
                message_sent: r.get::<_, i64>(7)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub student_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageLogRow {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub roll_number: i64,
    pub standard: i64,
    pub section: String,
    pub recipient: String,
    pub subject: String,
    pub status: String,
    pub attendance_date: String,
    pub sent_at: String,
    pub sent_by: String,
    pub error_message: Option<String>,
}

pub fn message_history(
    conn: &Connection,
    ctx: &RequestContext,
    filter: &HistoryFilter,
) -> Result<Vec<MessageLogRow>, AttendError> {
    let mut sql = String::from(
        "SELECT ml.id, ml.student_id, s.name, s.roll_number, c.standard, c.section,
                ml.recipient, ml.subject, ml.status, ml.attendance_date, ml.sent_at,
                ml.sent_by, ml.error_message
         FROM message_logs ml
         JOIN students s ON s.id = ml.student_id
         JOIN classes c ON c.id = s.class_id
         WHERE c.school_id = ?",
    );
    let mut bind: Vec<Value> = vec![Value::Text(ctx.school_id.clone())];
    if ctx.role == Role::Teacher {
        sql.push_str(" AND (ml.sent_by = ? OR c.teacher_id = ?)");
        bind.push(Value::Text(ctx.user_id.clone()));
        bind.push(Value::Text(ctx.user_id.clone()));
    }
    if let Some(d) = filter.start_date {
        sql.push_str(" AND ml.attendance_date >= ?");
        bind.push(Value::Text(format_date(d)));
    }
    if let Some(d) = filter.end_date {
        sql.push_str(" AND ml.attendance_date <= ?");
        bind.push(Value::Text(format_date(d)));
    }
    if let Some(id) = &filter.student_id {
        sql.push_str(" AND ml.student_id = ?");
        bind.push(Value::Text(id.clone()));
    }
    if let Some(status) = &filter.status {
        if status != "sent" && status != "failed" {
            return Err(AttendError::validation("invalid_status", "status must be sent or failed"));
        }
        sql.push_str(" AND ml.status = ?");
        bind.push(Value::Text(status.clone()));
    }
    sql.push_str(" ORDER BY ml.sent_at DESC, ml.rowid DESC LIMIT ?");
    bind.push(Value::Integer(HISTORY_LIMIT));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok(MessageLogRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                student_name: r.get(2)?,
                roll_number: r.get(3)?,
                standard: r.get(4)?,
                section: r.get(5)?,
                recipient: r.get(6)?,
                subject: r.get(7)?,
                status: r.get(8)?,
                attendance_date: r.get(9)?,
                sent_at: r.get(10)?,
                sent_by: r.get(11)?,
                error_message: r.get(12)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use std::cell::RefCell;

    /// Fails for one recipient, records everything it was asked to send.
    struct FlakyDispatcher {
        fail_for: String,
        seen: RefCell<Vec<String>>,
    }

    impl NotificationDispatcher for FlakyDispatcher {
        fn send(&self, notice: &AbsenceNotice) -> DispatchOutcome {
            self.seen.borrow_mut().push(notice.recipient.clone());
            if notice.recipient == self.fail_for {
                DispatchOutcome::failed("mailbox unavailable")
            } else {
                DispatchOutcome::sent()
            }
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn stamp() -> NaiveDateTime {
        ymd(2024, 3, 15).and_hms_opt(16, 5, 0).unwrap()
    }

    #[test]
    fn failures_are_recorded_not_fatal() {
        let conn = test_conn();
        let school = seed_school(&conn, "Green Valley");
        let class = seed_class(&conn, &school, 3, "A", "2023-2024", None);
        let a = seed_student(&conn, &class, 1, "male", "2023-2024");
        let b = seed_student(&conn, &class, 2, "female", "2023-2024");
        let c = seed_student(&conn, &class, 3, "female", "2023-2024");
        conn.execute("UPDATE students SET parent_email = NULL WHERE id = ?", [&c])
            .unwrap();
        for s in [&a, &b, &c] {
            seed_record(&conn, s, "2024-03-15", "absent");
        }

        let d = FlakyDispatcher {
            fail_for: "parent2@example.com".to_string(),
            seen: RefCell::new(Vec::new()),
        };
        let ctx = admin(&school);
        let ids = vec![a.clone(), b.clone(), c.clone(), "ghost".to_string()];
        let report = send_absence_notices(&conn, &ctx, &d, &ids, ymd(2024, 3, 15), stamp()).unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 3);
        assert_eq!(d.seen.borrow().len(), 2);

        let history = message_history(&conn, &ctx, &HistoryFilter::default()).unwrap();
        assert_eq!(history.len(), 2);
        let failed = message_history(
            &conn,
            &ctx,
            &HistoryFilter {
                status: Some("failed".to_string()),
                ..HistoryFilter::default()
            },
        )
        .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_message.as_deref(), Some("mailbox unavailable"));
        assert!(history.iter().all(|m| m.sent_at == "2024-03-15T16:05:00"));

        let absent = absent_students(&conn, &ctx, ymd(2024, 3, 15), None).unwrap();
        assert_eq!(absent.len(), 3);
        assert!(absent[0].message_sent);
        assert!(absent[1].message_sent);
        assert!(!absent[2].message_sent);
    }

    #[test]
    fn teachers_cannot_notify_other_classes() {
        let conn = test_conn();
        let school = seed_school(&conn, "Green Valley");
        let t = seed_teacher(&conn, &school, "tara");
        let _mine = seed_class(&conn, &school, 3, "A", "2023-2024", Some(&t));
        let other = seed_class(&conn, &school, 3, "B", "2023-2024", None);
        let s = seed_student(&conn, &other, 1, "male", "2023-2024");
        let d = FlakyDispatcher {
            fail_for: String::new(),
            seen: RefCell::new(Vec::new()),
        };
        let e = send_absence_notices(&conn, &teacher(&school, &t), &d, &[s], ymd(2024, 3, 15), stamp())
            .unwrap_err();
        assert_eq!(e.kind(), "cross_class");
        assert!(d.seen.borrow().is_empty());
    }

    #[test]
    fn notice_text_names_student_and_school() {
        let n = AbsenceNotice {
            student_id: "s1".into(),
            student_name: "Asha".into(),
            recipient: "p@example.com".into(),
            absence_date: ymd(2024, 3, 5),
            school_label: "Green Valley".into(),
        };
        assert_eq!(n.subject(), "Attendance Alert: Asha - 5 March 2024");
        assert!(n.body().contains("Asha was marked as ABSENT on 5 March 2024"));
        assert!(n.body().ends_with("- Green Valley"));
    }

    #[test]
    fn outbox_writes_one_mail_file_per_notice() {
        let dir = std::env::temp_dir().join(format!("attendd-outbox-{}", Uuid::new_v4()));
        let from: Mailbox = "Attendance Office <office@school.example>".parse().unwrap();
        let outbox = OutboxDispatcher::new(dir.clone(), from);
        let mut notice = AbsenceNotice {
            student_id: "s1".into(),
            student_name: "Asha".into(),
            recipient: "parent@example.com".into(),
            absence_date: ymd(2024, 3, 5),
            school_label: "Green Valley".into(),
        };
        assert_eq!(outbox.send(&notice), DispatchOutcome::sent());

        let files: Vec<_> = std::fs::read_dir(&dir).unwrap().filter_map(|e| e.ok()).collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path().extension().and_then(|e| e.to_str()), Some("eml"));
        let raw = std::fs::read_to_string(files[0].path()).unwrap();
        assert!(raw.contains("parent@example.com"));
        assert!(raw.contains("<office@school.example>"));
        assert!(raw.contains("Subject: Attendance Alert: Asha - 5 March 2024"));

        notice.recipient = "not an address".into();
        let outcome = outbox.send(&notice);
        assert!(!outcome.success);
        assert!(outcome.error.unwrap_or_default().contains("invalid recipient"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
