use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendd");
    let mut child = Command::new(exe)
        .env("ATTENDD_TODAY", "2024-03-15")
        .env_remove("ATTENDD_WORKSPACE")
        .env_remove("ATTENDD_OUTBOX_DIR")
        .env_remove("ATTENDD_MAIL_FROM")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    context: &serde_json::Value,
) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if !context.is_null() {
        payload["context"] = context.clone();
    }
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    context: &serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params, context);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("attendd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let none = serde_json::Value::Null;

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}), &none);
    assert_eq!(health["today"].as_str(), Some("2024-03-15"));
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        &none,
    );
    let school = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schools.create",
        json!({ "name": "Smoke School" }),
        &none,
    );
    let school_id = school["school"]["id"].as_str().expect("school id").to_string();
    assert_eq!(school["school"]["year_start_month"].as_i64(), Some(4));
    let admin = json!({ "userId": "admin-1", "role": "admin", "schoolId": school_id });

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        json!({ "username": "tara", "fullName": "Tara Iyer" }),
        &admin,
    );
    let teacher_id = teacher["teacher"]["id"].as_str().expect("teacher id").to_string();
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.create",
        json!({ "standard": 5, "section": "A", "academicYear": "2023-2024", "teacherId": teacher_id }),
        &admin,
    );
    let class_id = class["classId"].as_str().expect("classId").to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({
            "rollNumber": 1,
            "name": "Asha",
            "classId": class_id,
            "gender": "female",
            "parentEmail": "asha.parent@example.com"
        }),
        &admin,
    );
    let student_id = student["studentId"].as_str().expect("studentId").to_string();
    let teacher_ctx = json!({ "userId": teacher_id, "role": "teacher", "schoolId": school_id });

    let calls: Vec<(&str, serde_json::Value, &serde_json::Value)> = vec![
        ("schools.list", json!({}), &none),
        ("teachers.list", json!({}), &admin),
        ("classes.list", json!({}), &admin),
        ("classes.mine", json!({}), &teacher_ctx),
        ("students.list", json!({}), &teacher_ctx),
        ("holidays.add", json!({ "date": "2024-01-26", "description": "Republic Day", "academicYear": "2023-2024" }), &admin),
        ("holidays.list", json!({ "academicYear": "2023-2024" }), &admin),
        ("calendar.schoolDays", json!({ "academicYear": "2023-2024", "startDate": "2024-01-01", "endDate": "2024-01-31" }), &admin),
        ("attendance.markClassDay", json!({ "date": "2024-03-15", "records": [{ "studentId": student_id, "status": "absent" }] }), &teacher_ctx),
        ("attendance.editPast", json!({ "studentId": student_id, "date": "2024-03-14", "status": "late" }), &admin),
        ("attendance.forDate", json!({ "date": "2024-03-15" }), &teacher_ctx),
        ("reports.studentPeriod", json!({ "studentId": student_id, "startDate": "2024-03-01", "endDate": "2024-03-15" }), &admin),
        ("reports.classMonthly", json!({ "classId": class_id, "month": 3, "year": 2024 }), &admin),
        ("reports.classDaily", json!({ "classId": class_id, "date": "2024-03-15" }), &admin),
        ("reports.studentYearly", json!({ "studentId": student_id, "academicYear": "2023-2024" }), &admin),
        ("reports.classYearly", json!({ "classId": class_id, "academicYear": "2023-2024" }), &admin),
        ("messaging.absentStudents", json!({ "date": "2024-03-15" }), &teacher_ctx),
        ("messaging.send", json!({ "studentIds": [student_id], "date": "2024-03-15" }), &teacher_ctx),
        ("messaging.history", json!({}), &admin),
        ("promotion.promote", json!({ "classId": class_id, "studentIds": [student_id] }), &admin),
    ];
    for (i, (method, params, ctx)) in calls.into_iter().enumerate() {
        let id = format!("call-{}", i);
        request_ok(&mut stdin, &mut reader, &id, method, params, ctx);
    }

    let calendar = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "calendar.schoolDays",
        json!({ "academicYear": "2023-2024", "startDate": "2024-01-01", "endDate": "2024-01-31" }),
        &admin,
    );
    assert_eq!(calendar["total_days"].as_i64(), Some(31));
    assert_eq!(calendar["holiday_count"].as_i64(), Some(1));
    assert_eq!(calendar["school_days"].as_i64(), Some(30));

    let unknown = request(&mut stdin, &mut reader, "8", "nope.method", json!({}), &none);
    assert_eq!(unknown["error"]["code"].as_str(), Some("not_implemented"));

    let missing_ctx = request(&mut stdin, &mut reader, "9", "classes.list", json!({}), &none);
    assert_eq!(missing_ctx["error"]["code"].as_str(), Some("no_context"));

    for (i, year) in ["2147483647-0", "2147483646-2147483647", "+2023-2024"].iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("year-{}", i),
            "holidays.list",
            json!({ "academicYear": year }),
            &admin,
        );
        assert_eq!(resp["error"]["code"].as_str(), Some("bad_params"), "{}", year);
        assert_eq!(resp["error"]["details"]["kind"].as_str(), Some("invalid_year_format"));
    }

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let bad = read_response(&mut reader);
    assert_eq!(bad["error"]["code"].as_str(), Some("bad_json"));
    request_ok(&mut stdin, &mut reader, "10", "health", json!({}), &none);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn school_scoped_methods_need_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let ctx = json!({ "userId": "u1", "role": "admin", "schoolId": "s1" });
    let resp = request(&mut stdin, &mut reader, "1", "reports.classDaily", json!({ "date": "2024-03-15" }), &ctx);
    assert_eq!(resp["error"]["code"].as_str(), Some("no_workspace"));
    let resp = request(&mut stdin, &mut reader, "2", "workspace.select", json!({}), &serde_json::Value::Null);
    assert_eq!(resp["error"]["code"].as_str(), Some("bad_params"));
    drop(stdin);
    let _ = child.wait();
}
