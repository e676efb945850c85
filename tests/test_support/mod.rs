#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_termreportd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn termreportd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

/// Sends a request that must fail and returns its error code.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

pub fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

/// A workspace with one JHS1 class offering Mathematics and English, scored
/// through a one-per-term "Class Test" (SBA) and "Exam" (exam) activity.
pub struct Fixture {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    pub workspace: PathBuf,
    pub class_id: String,
    pub math: String,
    pub english: String,
    pub class_test: String,
    pub exam: String,
    next_id: u64,
}

impl Fixture {
    pub fn new(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut f = Fixture {
            child,
            stdin,
            reader,
            workspace: workspace.clone(),
            class_id: String::new(),
            math: String::new(),
            english: String::new(),
            class_test: String::new(),
            exam: String::new(),
            next_id: 0,
        };
        f.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        f.class_id = f.add_class("JHS 1A", "JHS1");
        f.class_test = str_field(
            &f.ok(
                "setup.activities.upsert",
                json!({ "name": "Class Test", "expectedPerTerm": 1, "component": "sba" }),
            ),
            "id",
        );
        f.exam = str_field(
            &f.ok(
                "setup.activities.upsert",
                json!({ "name": "Exam", "expectedPerTerm": 1, "component": "exam" }),
            ),
            "id",
        );
        f
    }

    fn id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.id();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn err(&mut self, method: &str, params: serde_json::Value) -> String {
        let id = self.id();
        request_err(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    /// Creates a class offering both subjects.
    pub fn add_class(&mut self, name: &str, level: &str) -> String {
        let class_id = str_field(
            &self.ok("classes.create", json!({ "name": name, "level": level })),
            "id",
        );
        if self.math.is_empty() {
            self.math = str_field(&self.ok("subjects.create", json!({ "name": "Mathematics" })), "id");
            self.english = str_field(&self.ok("subjects.create", json!({ "name": "English" })), "id");
        }
        for subject in [self.math.clone(), self.english.clone()] {
            self.ok(
                "subjects.assign",
                json!({ "classId": class_id, "subjectId": subject }),
            );
        }
        class_id
    }

    pub fn add_student(&mut self, class_id: &str, last: &str, first: &str) -> String {
        str_field(
            &self.ok(
                "students.create",
                json!({ "classId": class_id, "lastName": last, "firstName": first }),
            ),
            "id",
        )
    }

    pub fn score_params(
        &self,
        class_id: &str,
        student_id: &str,
        subject_id: &str,
        activity: &str,
        score: f64,
    ) -> serde_json::Value {
        let (activity_id, name) = if activity == "exam" {
            (self.exam.clone(), "Exam")
        } else {
            (self.class_test.clone(), "Class Test")
        };
        json!({
            "studentId": student_id,
            "classId": class_id,
            "subjectId": subject_id,
            "year": 2024,
            "term": 1,
            "activityId": activity_id,
            "assignmentName": name,
            "score": score,
            "recordedBy": "teacher-1",
        })
    }

    /// Scores both components at `pct`, so the subject total is `pct`.
    pub fn subject_total(&mut self, class_id: &str, student_id: &str, subject_id: &str, pct: f64) {
        let scores = vec![
            self.score_params(class_id, student_id, subject_id, "sba", pct),
            self.score_params(class_id, student_id, subject_id, "exam", pct),
        ];
        let written = self.ok("scores.bulkPut", json!({ "scores": scores }));
        assert_eq!(written.get("written").and_then(|v| v.as_u64()), Some(2));
    }
}

pub fn term_params(extra: serde_json::Value) -> serde_json::Value {
    let mut params = json!({ "year": 2024, "term": 1 });
    if let (Some(obj), Some(more)) = (params.as_object_mut(), extra.as_object()) {
        for (k, v) in more {
            obj.insert(k.clone(), v.clone());
        }
    }
    params
}
