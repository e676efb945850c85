use crate::ipc::error::err;
use crate::ipc::helpers::{db_conn, required_str, required_term, respond};
use crate::ipc::types::{AppState, Request};
use crate::model::RankScope;
use crate::ranking::{self, RankQuery};
use serde_json::json;
use std::time::Duration;

fn parse_scope(req: &Request) -> Result<RankScope, serde_json::Value> {
    let scope = required_str(req, "scope")?;
    match scope.to_ascii_lowercase().as_str() {
        "class" => Ok(RankScope::Class(required_str(req, "scopeId")?)),
        "level" => Ok(RankScope::Level(required_str(req, "scopeId")?)),
        "school" => Ok(RankScope::School),
        _ => Err(err(
            &req.id,
            "bad_params",
            "scope must be one of: class, level, school",
            Some(json!({ "scope": scope })),
        )),
    }
}

fn handle_rank(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scope = match parse_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match required_term(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let timeout = match req.params.get("timeoutMs") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_u64() {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "timeoutMs must be a non-negative integer",
                    Some(json!({ "timeoutMs": v })),
                )
            }
        },
    };

    let query = RankQuery { scope, term };
    respond(
        req,
        ranking::rank_bounded(conn, &query, timeout, None).map(|entries| {
            json!({
                "query": query.scope,
                "year": term.year,
                "term": term.term,
                "entries": entries,
            })
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rank" => Some(handle_rank(state, req)),
        _ => None,
    }
}
