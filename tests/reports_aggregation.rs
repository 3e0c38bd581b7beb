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

struct Fixture {
    admin: serde_json::Value,
    class_id: String,
    students: Vec<String>,
}

/// One 6A class with ten students: rolls 1-6 male, 7-10 female.
fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &PathBuf) -> Fixture {
    let none = serde_json::Value::Null;
    request_ok(stdin, reader, "s1", "workspace.select", json!({ "path": workspace.to_string_lossy() }), &none);
    let school = request_ok(stdin, reader, "s2", "schools.create", json!({ "name": "River School" }), &none);
    let school_id = school["school"]["id"].as_str().expect("school id").to_string();
    let admin = json!({ "userId": "admin-1", "role": "admin", "schoolId": school_id });
    let c = request_ok(
        stdin,
        reader,
        "s3",
        "classes.create",
        json!({ "standard": 6, "section": "A", "academicYear": "2023-2024" }),
        &admin,
    );
    let class_id = c["classId"].as_str().expect("classId").to_string();
    let mut students = Vec::new();
    for roll in 1..=10 {
        let s = request_ok(
            stdin,
            reader,
            &format!("st{}", roll),
            "students.create",
            json!({
                "rollNumber": roll,
                "name": format!("Pupil {}", roll),
                "classId": class_id,
                "gender": if roll <= 6 { "male" } else { "female" },
                "parentEmail": format!("parent{}@example.com", roll),
            }),
            &admin,
        );
        students.push(s["studentId"].as_str().expect("studentId").to_string());
    }
    Fixture {
        admin,
        class_id,
        students,
    }
}

fn f(v: &serde_json::Value) -> f64 {
    v.as_f64().expect("number")
}

#[test]
fn daily_report_splits_by_gender() {
    let workspace = temp_dir("attendd-daily");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed(&mut stdin, &mut reader, &workspace);

    let statuses = [
        "present", "present", "present", "present", "present", "absent", "present", "present",
        "present", "late",
    ];
    let records: Vec<_> = fx
        .students
        .iter()
        .zip(statuses)
        .map(|(id, status)| json!({ "studentId": id, "status": status }))
        .collect();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.markClassDay",
        json!({ "classId": fx.class_id, "date": "2024-03-15", "records": records }),
        &fx.admin,
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.classDaily",
        json!({ "classId": fx.class_id, "date": "2024-03-15" }),
        &fx.admin,
    );
    let stats = &report["statistics"];
    assert_eq!(stats["total_students"].as_i64(), Some(10));
    assert_eq!(stats["present_including_late"].as_i64(), Some(9));
    assert_eq!(f(&stats["attendance_percentage"]), 90.0);
    assert_eq!(f(&report["gender_breakdown"]["male"]["attendance_percentage"]), 83.33);
    assert_eq!(f(&report["gender_breakdown"]["female"]["attendance_percentage"]), 100.0);
    assert_eq!(report["is_holiday"].as_bool(), Some(false));

    let empty_day = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.classDaily",
        json!({ "classId": fx.class_id, "date": "2024-03-13" }),
        &fx.admin,
    );
    assert_eq!(empty_day["statistics"]["total_unmarked"].as_i64(), Some(10));
    assert_eq!(f(&empty_day["statistics"]["attendance_percentage"]), 0.0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn period_and_yearly_reports_agree() {
    let workspace = temp_dir("attendd-period");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed(&mut stdin, &mut reader, &workspace);
    let student = fx.students[0].clone();

    request_ok(
        &mut stdin,
        &mut reader,
        "h1",
        "holidays.add",
        json!({ "date": "2024-01-26", "description": "Republic Day", "academicYear": "2023-2024" }),
        &fx.admin,
    );
    let marks = [
        ("2024-03-01", "present"),
        ("2024-03-02", "present"),
        ("2024-03-04", "present"),
        ("2024-03-05", "late"),
        ("2024-03-06", "absent"),
    ];
    for (i, (date, status)) in marks.iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("m{}", i),
            "attendance.editPast",
            json!({ "studentId": student, "date": date, "status": status }),
            &fx.admin,
        );
    }

    let period = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.studentPeriod",
        json!({ "studentId": student, "startDate": "2024-03-01", "endDate": "2024-03-10" }),
        &fx.admin,
    );
    let a = &period["attendance"];
    assert_eq!(period["period"]["total_school_days"].as_i64(), Some(10));
    assert_eq!(a["unmarked"].as_i64(), Some(5));
    assert_eq!(a["total_present"].as_i64(), Some(9));
    assert_eq!(f(&a["attendance_percentage"]), 90.0);
    assert_eq!(f(&a["late_percentage"]), 10.0);

    let reversed = request(
        &mut stdin,
        &mut reader,
        "2",
        "reports.studentPeriod",
        json!({ "studentId": student, "startDate": "2024-03-10", "endDate": "2024-03-01" }),
        &fx.admin,
    );
    assert_eq!(reversed["error"]["details"]["kind"].as_str(), Some("invalid_range"));

    let yearly = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.studentYearly",
        json!({ "studentId": student, "academicYear": "2023-2024" }),
        &fx.admin,
    );
    let months = yearly["monthly_breakdown"].as_array().expect("months");
    assert_eq!(months.len(), 12);
    assert_eq!(months[0]["month_name"].as_str(), Some("April"));
    assert_eq!(months[11]["month"].as_i64(), Some(3));
    let summary = &yearly["yearly_summary"];
    assert_eq!(summary["total_school_days"].as_i64(), Some(365));
    assert_eq!(summary["absent"].as_i64(), Some(1));
    assert_eq!(summary["total_present"].as_i64(), Some(364));

    let class_yearly = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.classYearly",
        json!({ "classId": fx.class_id, "academicYear": "2023-2024" }),
        &fx.admin,
    );
    assert_eq!(class_yearly["period"]["total_school_days"].as_i64(), Some(365));
    let rows = class_yearly["students"].as_array().expect("students");
    assert_eq!(rows.len(), 10);
    let row = rows
        .iter()
        .find(|r| r["student_id"].as_str() == Some(student.as_str()))
        .expect("student row");
    assert_eq!(row["total_present"], summary["total_present"]);
    assert_eq!(row["total_school_days"], summary["total_school_days"]);
    assert_eq!(f(&row["attendance_percentage"]), f(&summary["attendance_percentage"]));

    let monthly = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.classMonthly",
        json!({ "classId": fx.class_id, "month": 3, "year": 2024 }),
        &fx.admin,
    );
    assert_eq!(monthly["period"]["total_school_days"].as_i64(), Some(31));
    assert_eq!(monthly["students"].as_array().map(|s| s.len()), Some(10));

    let not_started = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.classYearly",
        json!({ "classId": fx.class_id, "academicYear": "2024-2025" }),
        &fx.admin,
    );
    assert!(not_started["period"].is_null());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}
