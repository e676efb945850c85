use crate::ipc::helpers::{db_conn, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::store::roster;
use serde_json::json;

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level = match required_str(req, "level") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, roster::create_class(conn, &name, &level))
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let classes = match req.params.get("level").and_then(|v| v.as_str()) {
        Some(level) => roster::get_classes_by_level(conn, level),
        None => roster::list_classes(conn),
    };
    respond(req, classes.map(|c| json!({ "classes": c })))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, roster::create_subject(conn, &name))
}

fn handle_subjects_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        roster::assign_subject(conn, &class_id, &subject_id).map(|_| json!({ "ok": true })),
    )
}

fn handle_subjects_for_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subjects = roster::get_class(conn, &class_id)
        .and_then(|_| roster::get_subjects_for_class(conn, &class_id));
    respond(req, subjects.map(|s| json!({ "subjects": s })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.list" => Some(handle_classes_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.assign" => Some(handle_subjects_assign(state, req)),
        "subjects.forClass" => Some(handle_subjects_for_class(state, req)),
        _ => None,
    }
}
