use crate::error::CoreError;
use crate::ipc::helpers::{db_conn, db_conn_mut, optional_str, required_str, required_term, respond};
use crate::ipc::types::{AppState, Request};
use crate::lock;
use crate::model::RemarkFields;
use crate::reports;
use crate::store::report_store;
use serde_json::json;

fn handle_reports_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match required_term(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        reports::generate_reports(conn, &class_id, term).map(|r| json!({ "reports": r })),
    )
}

fn handle_reports_generate_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match required_term(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, reports::generate_report(conn, &student_id, term))
}

fn handle_reports_regenerate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match required_term(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, reports::regenerate_report(conn, &student_id, term))
}

fn handle_reports_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match required_term(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let report = report_store::get_report(conn, &student_id, term).and_then(|r| {
        r.ok_or_else(|| CoreError::not_found("report", format!("{} {}", student_id, term)))
    });
    respond(req, report)
}

fn handle_reports_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match required_term(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        report_store::list_reports(conn, &class_id, term).map(|r| json!({ "reports": r })),
    )
}

fn handle_reports_set_remarks(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match required_term(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let fields = RemarkFields {
        conduct: optional_str(req, "conduct"),
        talent_and_interest: optional_str(req, "talentAndInterest"),
        class_teacher_remarks: optional_str(req, "classTeacherRemarks"),
    };
    let conn = match db_conn_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, reports::set_remarks(conn, &student_id, term, &fields))
}

fn handle_reports_finalize(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match required_term(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Blank or absent remarks are rejected by the assembler with a validation error.
    let head_remarks = optional_str(req, "headTeacherRemarks").unwrap_or_default();
    let conn = match db_conn_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        reports::finalize_report(conn, &student_id, term, &head_remarks),
    )
}

fn handle_reports_lock_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match required_term(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, lock::lock_state(conn, &class_id, term))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.generate" => Some(handle_reports_generate(state, req)),
        "reports.generateStudent" => Some(handle_reports_generate_student(state, req)),
        "reports.regenerate" => Some(handle_reports_regenerate(state, req)),
        "reports.get" => Some(handle_reports_get(state, req)),
        "reports.list" => Some(handle_reports_list(state, req)),
        "reports.setRemarks" => Some(handle_reports_set_remarks(state, req)),
        "reports.finalize" => Some(handle_reports_finalize(state, req)),
        "reports.lockState" => Some(handle_reports_lock_state(state, req)),
        _ => None,
    }
}
