//! Term report assembly and the Provisional -> Final lifecycle.
//!
//! Subject lines are always computed over the whole class, because a
//! subject position needs every classmate's total before it can be assigned.
//! Writes happen inside one immediate transaction per call.

use rusqlite::{Connection, TransactionBehavior};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::calc;
use crate::config;
use crate::error::{CoreError, CoreResult};
use crate::lock;
use crate::model::{
    RemarkFields, ReportStatus, StudentInfo, SubjectReportLine, Term, TermReport,
};
use crate::store::{attendance, now_rfc3339, report_store, roster, scores};

/// Subject lines for every enrolled student of a class, keyed by student id.
pub fn compute_class_lines(
    conn: &Connection,
    class_id: &str,
    term: Term,
) -> CoreResult<HashMap<String, Vec<SubjectReportLine>>> {
    let scheme = config::load_grading_scheme(conn)?;
    let aggregation = config::load_aggregation(conn)?;
    let activities = roster::activity_map(conn)?;
    let students = roster::get_students(conn, class_id)?;
    let subjects = roster::get_subjects_for_class(conn, class_id)?;
    let by_student = scores::scores_by_student(scores::get_scores(conn, class_id, term)?);

    let mut lines: HashMap<String, Vec<SubjectReportLine>> = students
        .iter()
        .map(|s| (s.id.clone(), Vec::with_capacity(subjects.len())))
        .collect();

    for subject in &subjects {
        let mut components = Vec::with_capacity(students.len());
        for student in &students {
            let raw = by_student
                .get(&student.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let c = calc::aggregate_subject(&subject.id, raw, &activities, &aggregation);
            components.push((student.id.clone(), c));
        }

        let totals: Vec<(String, f64)> = components
            .iter()
            .map(|(id, c)| (id.clone(), c.total_score))
            .collect();
        let positions = calc::competition_positions(&totals);

        for (student_id, c) in components {
            let boundary = calc::resolve_grade(&scheme, c.total_score);
            let line = SubjectReportLine {
                subject_id: subject.id.clone(),
                subject_name: subject.name.clone(),
                sba_score: c.sba_score,
                exam_score: c.exam_score,
                total_score: c.total_score,
                grade: boundary.grade.clone(),
                position: positions.get(&student_id).copied().unwrap_or(0),
                remarks: boundary.remark.clone(),
            };
            if let Some(v) = lines.get_mut(&student_id) {
                v.push(line);
            }
        }
    }

    Ok(lines)
}

fn assemble(
    conn: &Connection,
    student: &StudentInfo,
    term: Term,
    lines: Vec<SubjectReportLine>,
    existing: Option<TermReport>,
) -> CoreResult<TermReport> {
    let attendance_summary =
        attendance::attendance_summary(conn, &student.class_id, &student.id, term)?;
    let generated_at = now_rfc3339();
    let report = match existing {
        Some(prev) => TermReport {
            class_id: student.class_id.clone(),
            subjects: lines,
            attendance_summary,
            generated_at,
            ..prev
        },
        None => TermReport {
            id: Uuid::new_v4().to_string(),
            student_id: student.id.clone(),
            class_id: student.class_id.clone(),
            term,
            status: ReportStatus::Provisional,
            subjects: lines,
            attendance_summary,
            conduct: None,
            talent_and_interest: None,
            class_teacher_remarks: None,
            head_teacher_remarks: None,
            generated_at,
            finalized_at: None,
        },
    };
    report_store::put_report(conn, &report)?;
    Ok(report)
}

fn enrolled_student(conn: &Connection, student_id: &str) -> CoreResult<StudentInfo> {
    let student = roster::get_student(conn, student_id)?;
    if !student.active {
        return Err(CoreError::validation_with(
            "student is not currently enrolled",
            json!({ "studentId": student_id }),
        ));
    }
    Ok(student)
}

fn final_report_error(report: &TermReport) -> CoreError {
    CoreError::validation_with(
        "report is final and can no longer change",
        json!({
            "reportId": report.id,
            "studentId": report.student_id,
            "finalizedAt": report.finalized_at,
        }),
    )
}

/// Creates or recomputes the report of every enrolled student in the class.
/// Final reports are returned as stored. A configuration error aborts the
/// whole class before anything is written.
pub fn generate_reports(
    conn: &mut Connection,
    class_id: &str,
    term: Term,
) -> CoreResult<Vec<TermReport>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    roster::get_class(&tx, class_id)?;
    let students = roster::get_students(&tx, class_id)?;
    let mut lines = compute_class_lines(&tx, class_id, term)?;

    let mut out = Vec::with_capacity(students.len());
    let (mut created, mut refreshed, mut untouched) = (0_usize, 0_usize, 0_usize);
    for student in &students {
        let existing = report_store::get_report(&tx, &student.id, term)?;
        if let Some(report) = existing.as_ref().filter(|r| r.is_final()) {
            untouched += 1;
            out.push(report.clone());
            continue;
        }
        if existing.is_some() {
            refreshed += 1;
        } else {
            created += 1;
        }
        let student_lines = lines.remove(&student.id).unwrap_or_default();
        out.push(assemble(&tx, student, term, student_lines, existing)?);
    }
    tx.commit()?;

    info!(
        class_id,
        %term,
        created,
        refreshed,
        untouched,
        "term reports generated"
    );
    Ok(out)
}

/// NonExistent -> Provisional. An existing provisional report is recomputed;
/// a final one is returned unchanged.
pub fn generate_report(conn: &mut Connection, student_id: &str, term: Term) -> CoreResult<TermReport> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let student = enrolled_student(&tx, student_id)?;
    let existing = report_store::get_report(&tx, student_id, term)?;
    if let Some(report) = existing.as_ref().filter(|r| r.is_final()) {
        return Ok(report.clone());
    }
    let mut lines = compute_class_lines(&tx, &student.class_id, term)?;
    let student_lines = lines.remove(&student.id).unwrap_or_default();
    let report = assemble(&tx, &student, term, student_lines, existing)?;
    tx.commit()?;
    debug!(student_id, %term, "term report generated");
    Ok(report)
}

/// Provisional -> Provisional. Recomputes subject lines and attendance, keeps
/// every remark field.
pub fn regenerate_report(
    conn: &mut Connection,
    student_id: &str,
    term: Term,
) -> CoreResult<TermReport> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let student = enrolled_student(&tx, student_id)?;
    let existing = report_store::get_report(&tx, student_id, term)?
        .ok_or_else(|| CoreError::not_found("report", format!("{} {}", student_id, term)))?;
    if existing.is_final() {
        return Err(final_report_error(&existing));
    }
    let mut lines = compute_class_lines(&tx, &student.class_id, term)?;
    let student_lines = lines.remove(&student.id).unwrap_or_default();
    let report = assemble(&tx, &student, term, student_lines, Some(existing))?;
    tx.commit()?;
    debug!(student_id, %term, "term report regenerated");
    Ok(report)
}

fn normalize_remark(v: &str) -> Option<String> {
    let t = v.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Updates the free-text remark fields supplied in `fields`; absent fields
/// are left as they are, blank ones are cleared.
pub fn set_remarks(
    conn: &mut Connection,
    student_id: &str,
    term: Term,
    fields: &RemarkFields,
) -> CoreResult<TermReport> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut report = report_store::get_report(&tx, student_id, term)?
        .ok_or_else(|| CoreError::not_found("report", format!("{} {}", student_id, term)))?;
    if report.is_final() {
        return Err(final_report_error(&report));
    }
    if let Some(v) = fields.conduct.as_deref() {
        report.conduct = normalize_remark(v);
    }
    if let Some(v) = fields.talent_and_interest.as_deref() {
        report.talent_and_interest = normalize_remark(v);
    }
    if let Some(v) = fields.class_teacher_remarks.as_deref() {
        report.class_teacher_remarks = normalize_remark(v);
    }
    report_store::put_report(&tx, &report)?;
    tx.commit()?;
    Ok(report)
}

/// Provisional -> Final. Blank head teacher remarks leave the report as it is.
pub fn finalize_report(
    conn: &mut Connection,
    student_id: &str,
    term: Term,
    head_remarks: &str,
) -> CoreResult<TermReport> {
    let Some(head_remarks) = normalize_remark(head_remarks) else {
        return Err(CoreError::validation_with(
            "head teacher remarks are required to finalize a report",
            json!({ "field": "headTeacherRemarks", "studentId": student_id }),
        ));
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut report = report_store::get_report(&tx, student_id, term)?
        .ok_or_else(|| CoreError::not_found("report", format!("{} {}", student_id, term)))?;
    if report.is_final() {
        return Err(final_report_error(&report));
    }
    report.status = ReportStatus::Final;
    report.head_teacher_remarks = Some(head_remarks);
    report.finalized_at = Some(now_rfc3339());
    report_store::put_report(&tx, &report)?;
    let now_locked = lock::is_locked(&tx, &report.class_id, term)?;
    tx.commit()?;

    info!(student_id, class_id = %report.class_id, %term, "term report finalized");
    if now_locked {
        info!(class_id = %report.class_id, %term, "every report final; score entry locked");
    }
    Ok(report)
}
