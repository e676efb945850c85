use crate::ipc::error::err;
use crate::ipc::helpers::{db_conn, required_str, required_term, respond};
use crate::ipc::types::{AppState, Request};
use crate::store::attendance;
use serde_json::json;

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
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
    let day = match required_str(req, "day") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(present) = req.params.get("present").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "present must be boolean", None);
    };
    respond(
        req,
        attendance::mark_attendance(conn, &class_id, &student_id, term, &day, present)
            .map(|_| json!({ "ok": true })),
    )
}

fn handle_attendance_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
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
    respond(
        req,
        attendance::attendance_summary(conn, &class_id, &student_id, term),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(handle_attendance_mark(state, req)),
        "attendance.summary" => Some(handle_attendance_summary(state, req)),
        _ => None,
    }
}
