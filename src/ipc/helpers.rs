use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

use super::error::{core_err, err, ok};
use super::types::{AppState, Request};
use crate::error::CoreResult;
use crate::model::Term;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn db_conn_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a mut Connection, serde_json::Value> {
    state
        .db
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

pub fn required_term(req: &Request) -> Result<Term, serde_json::Value> {
    let year = req.params.get("year").and_then(|v| v.as_i64());
    let term = req.params.get("term").and_then(|v| v.as_i64());
    match (year, term) {
        (Some(year), Some(term)) if term >= 1 => Ok(Term::new(year, term)),
        _ => Err(err(
            &req.id,
            "bad_params",
            "year and term must be integers, term >= 1",
            Some(json!({
                "year": req.params.get("year"),
                "term": req.params.get("term"),
            })),
        )),
    }
}

/// Serializes a successful core result, or maps its error onto the wire.
pub fn respond<T: Serialize>(req: &Request, result: CoreResult<T>) -> serde_json::Value {
    match result {
        Ok(v) => match serde_json::to_value(v) {
            Ok(json) => ok(&req.id, json),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => core_err(&req.id, e),
    }
}
