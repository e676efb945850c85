mod test_support;

use serde_json::json;
use test_support::{str_field, term_params, Fixture};

fn line<'a>(report: &'a serde_json::Value, subject_id: &str) -> &'a serde_json::Value {
    report
        .get("subjects")
        .and_then(|v| v.as_array())
        .and_then(|lines| {
            lines
                .iter()
                .find(|l| l.get("subjectId").and_then(|v| v.as_str()) == Some(subject_id))
        })
        .unwrap_or_else(|| panic!("no line for {} in {}", subject_id, report))
}

fn report_for<'a>(reports: &'a serde_json::Value, student_id: &str) -> &'a serde_json::Value {
    reports
        .get("reports")
        .and_then(|v| v.as_array())
        .and_then(|list| {
            list.iter()
                .find(|r| r.get("studentId").and_then(|v| v.as_str()) == Some(student_id))
        })
        .unwrap_or_else(|| panic!("no report for {}", student_id))
}

#[test]
fn generated_reports_carry_positions_grades_and_class_ranks() {
    let mut f = Fixture::new("termreport-flow-positions");
    let class_id = f.class_id.clone();
    let (math, english) = (f.math.clone(), f.english.clone());
    let a = f.add_student(&class_id, "Adjei", "Ama");
    let b = f.add_student(&class_id, "Boateng", "Kofi");

    f.subject_total(&class_id, &a, &math, 90.0);
    f.subject_total(&class_id, &a, &english, 70.0);
    f.subject_total(&class_id, &b, &math, 60.0);
    f.subject_total(&class_id, &b, &english, 80.0);

    let generated = f.ok("reports.generate", term_params(json!({ "classId": class_id })));
    let ra = report_for(&generated, &a);
    let rb = report_for(&generated, &b);
    assert_eq!(ra.get("status").and_then(|v| v.as_str()), Some("provisional"));

    let a_math = line(ra, &math);
    assert_eq!(a_math.get("totalScore").and_then(|v| v.as_f64()), Some(90.0));
    assert_eq!(a_math.get("sbaScore").and_then(|v| v.as_f64()), Some(45.0));
    assert_eq!(a_math.get("examScore").and_then(|v| v.as_f64()), Some(45.0));
    assert_eq!(a_math.get("grade").and_then(|v| v.as_str()), Some("A"));
    assert_eq!(a_math.get("position").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(line(rb, &math).get("position").and_then(|v| v.as_i64()), Some(2));

    assert_eq!(line(ra, &english).get("position").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(line(ra, &english).get("grade").and_then(|v| v.as_str()), Some("B"));
    assert_eq!(line(rb, &english).get("position").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(line(rb, &english).get("grade").and_then(|v| v.as_str()), Some("A"));

    let ranked = f.ok(
        "rank",
        term_params(json!({ "scope": "class", "scopeId": class_id })),
    );
    let entries = ranked.get("entries").and_then(|v| v.as_array()).expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(str_field(&entries[0], "studentId"), a);
    assert_eq!(entries[0].get("averageScore").and_then(|v| v.as_f64()), Some(80.0));
    assert_eq!(entries[0].get("rank").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(str_field(&entries[1], "studentId"), b);
    assert_eq!(entries[1].get("averageScore").and_then(|v| v.as_f64()), Some(70.0));
    assert_eq!(entries[1].get("rank").and_then(|v| v.as_i64()), Some(2));
}

#[test]
fn regenerating_keeps_report_identity_and_remarks() {
    let mut f = Fixture::new("termreport-flow-regenerate");
    let class_id = f.class_id.clone();
    let math = f.math.clone();
    let a = f.add_student(&class_id, "Adjei", "Ama");
    f.subject_total(&class_id, &a, &math, 60.0);

    let first = f.ok(
        "reports.generateStudent",
        term_params(json!({ "studentId": a })),
    );
    f.ok(
        "reports.setRemarks",
        term_params(json!({
            "studentId": a,
            "conduct": "Respectful",
            "classTeacherRemarks": "Keep it up"
        })),
    );
    f.subject_total(&class_id, &a, &math, 85.0);
    let second = f.ok("reports.regenerate", term_params(json!({ "studentId": a })));

    assert_eq!(str_field(&second, "id"), str_field(&first, "id"));
    assert_eq!(str_field(&second, "conduct"), "Respectful");
    assert_eq!(str_field(&second, "classTeacherRemarks"), "Keep it up");
    assert_eq!(
        line(&second, &math).get("totalScore").and_then(|v| v.as_f64()),
        Some(85.0)
    );

    let again = f.ok("reports.regenerate", term_params(json!({ "studentId": a })));
    assert_eq!(again.get("subjects"), second.get("subjects"));
}

#[test]
fn finalize_requires_head_teacher_remarks() {
    let mut f = Fixture::new("termreport-flow-finalize-remarks");
    let class_id = f.class_id.clone();
    let math = f.math.clone();
    let a = f.add_student(&class_id, "Adjei", "Ama");
    f.subject_total(&class_id, &a, &math, 75.0);
    f.ok("reports.generate", term_params(json!({ "classId": class_id })));

    let code = f.err(
        "reports.finalize",
        term_params(json!({ "studentId": a, "headTeacherRemarks": "   " })),
    );
    assert_eq!(code, "validation_error");
    let code = f.err("reports.finalize", term_params(json!({ "studentId": a })));
    assert_eq!(code, "validation_error");

    let stored = f.ok("reports.get", term_params(json!({ "studentId": a })));
    assert_eq!(str_field(&stored, "status"), "provisional");
    assert!(stored.get("headTeacherRemarks").map_or(true, |v| v.is_null()));
}

#[test]
fn finalized_class_rejects_score_writes_without_mutating() {
    let mut f = Fixture::new("termreport-flow-lock");
    let class_id = f.class_id.clone();
    let math = f.math.clone();
    let a = f.add_student(&class_id, "Adjei", "Ama");
    let b = f.add_student(&class_id, "Boateng", "Kofi");
    f.subject_total(&class_id, &a, &math, 80.0);
    f.subject_total(&class_id, &b, &math, 60.0);
    f.ok("reports.generate", term_params(json!({ "classId": class_id })));

    f.ok(
        "reports.finalize",
        term_params(json!({ "studentId": a, "headTeacherRemarks": "Promoted" })),
    );
    let state = f.ok("reports.lockState", term_params(json!({ "classId": class_id })));
    assert_eq!(state.get("locked").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(state.get("finalized").and_then(|v| v.as_i64()), Some(1));

    let final_b = f.ok(
        "reports.finalize",
        term_params(json!({ "studentId": b, "headTeacherRemarks": "Promoted" })),
    );
    assert_eq!(str_field(&final_b, "status"), "final");
    let state = f.ok("reports.lockState", term_params(json!({ "classId": class_id })));
    assert_eq!(state.get("locked").and_then(|v| v.as_bool()), Some(true));

    let before = f.ok("scores.list", term_params(json!({ "classId": class_id })));
    let put = f.score_params(&class_id, &a, &math, "exam", 10.0);
    assert_eq!(f.err("scores.put", put), "locked_term");
    let after = f.ok("scores.list", term_params(json!({ "classId": class_id })));
    assert_eq!(before, after);

    // Final reports are immutable but still readable and re-servable.
    assert_eq!(
        f.err("reports.regenerate", term_params(json!({ "studentId": a }))),
        "validation_error"
    );
    assert_eq!(
        f.err(
            "reports.setRemarks",
            term_params(json!({ "studentId": a, "conduct": "Changed" }))
        ),
        "validation_error"
    );
    let served = f.ok(
        "reports.generateStudent",
        term_params(json!({ "studentId": a })),
    );
    assert_eq!(str_field(&served, "status"), "final");
    assert_eq!(str_field(&served, "headTeacherRemarks"), "Promoted");

    // Another term is unaffected.
    let mut other = f.score_params(&class_id, &a, &math, "exam", 10.0);
    other["term"] = json!(2);
    f.ok("scores.put", other);
}

#[test]
fn report_includes_attendance_summary() {
    let mut f = Fixture::new("termreport-flow-attendance");
    let class_id = f.class_id.clone();
    let a = f.add_student(&class_id, "Adjei", "Ama");
    for (day, present) in [("2024-01-08", true), ("2024-01-09", false), ("2024-01-10", true)] {
        f.ok(
            "attendance.mark",
            term_params(json!({
                "classId": class_id,
                "studentId": a,
                "day": day,
                "present": present
            })),
        );
    }
    let summary = f.ok(
        "attendance.summary",
        term_params(json!({ "classId": class_id, "studentId": a })),
    );
    assert_eq!(summary, json!({ "daysPresent": 2, "daysAbsent": 1, "daysTotal": 3 }));

    let report = f.ok(
        "reports.generateStudent",
        term_params(json!({ "studentId": a })),
    );
    assert_eq!(report.get("attendanceSummary"), Some(&summary));
    assert_eq!(
        f.err(
            "attendance.mark",
            term_params(json!({
                "classId": class_id,
                "studentId": a,
                "day": "08/01/2024",
                "present": true
            }))
        ),
        "validation_error"
    );
}

#[test]
fn missing_reports_are_not_found() {
    let mut f = Fixture::new("termreport-flow-not-found");
    let class_id = f.class_id.clone();
    let a = f.add_student(&class_id, "Adjei", "Ama");
    assert_eq!(
        f.err("reports.get", term_params(json!({ "studentId": a }))),
        "not_found"
    );
    assert_eq!(
        f.err(
            "reports.finalize",
            term_params(json!({ "studentId": a, "headTeacherRemarks": "Ok" }))
        ),
        "not_found"
    );
    assert_eq!(
        f.err("reports.generate", term_params(json!({ "classId": "missing" }))),
        "not_found"
    );
}
