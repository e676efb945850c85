use crate::ipc::error::err;
use crate::ipc::helpers::{db_conn, db_conn_mut, required_str, required_term, respond};
use crate::ipc::types::{AppState, Request};
use crate::model::{AssignmentScore, Term};
use crate::store::scores::{self, ScoreKey};
use serde::Deserialize;
use serde_json::json;

const SCORES_BULK_MAX: usize = 5000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreParams {
    student_id: String,
    class_id: String,
    subject_id: String,
    year: i64,
    term: i64,
    activity_id: String,
    assignment_name: String,
    score: f64,
    recorded_by: String,
}

impl From<ScoreParams> for AssignmentScore {
    fn from(p: ScoreParams) -> Self {
        AssignmentScore {
            student_id: p.student_id,
            class_id: p.class_id,
            subject_id: p.subject_id,
            term: Term::new(p.year, p.term),
            activity_id: p.activity_id,
            assignment_name: p.assignment_name,
            score: p.score,
            recorded_by: p.recorded_by,
            recorded_at: None,
        }
    }
}

fn parse_score(
    id: &str,
    raw: &serde_json::Value,
    index: Option<usize>,
) -> Result<AssignmentScore, serde_json::Value> {
    serde_json::from_value::<ScoreParams>(raw.clone())
        .map(AssignmentScore::from)
        .map_err(|e| {
            err(
                id,
                "bad_params",
                format!("invalid score: {}", e),
                index.map(|i| json!({ "index": i })),
            )
        })
}

fn handle_scores_put(state: &mut AppState, req: &Request) -> serde_json::Value {
    let score = match parse_score(&req.id, &req.params, None) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, scores::put_score(conn, &score))
}

fn handle_scores_bulk_put(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("scores").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing scores[]", None);
    };
    if raw.len() > SCORES_BULK_MAX {
        return err(
            &req.id,
            "bad_params",
            format!(
                "bulk payload exceeds max scores: {} > {}",
                raw.len(),
                SCORES_BULK_MAX
            ),
            Some(json!({ "count": raw.len(), "max": SCORES_BULK_MAX })),
        );
    }
    let mut batch = Vec::with_capacity(raw.len());
    for (i, item) in raw.iter().enumerate() {
        match parse_score(&req.id, item, Some(i)) {
            Ok(v) => batch.push(v),
            Err(e) => return e,
        }
    }
    let conn = match db_conn_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        scores::put_scores(conn, &batch).map(|written| json!({ "written": written.len() })),
    )
}

fn handle_scores_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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
        scores::get_scores(conn, &class_id, term).map(|s| json!({ "scores": s })),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyParams {
    student_id: String,
    class_id: String,
    subject_id: String,
    year: i64,
    term: i64,
    assignment_name: String,
}

fn handle_scores_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match serde_json::from_value::<KeyParams>(req.params.clone()) {
        Ok(p) => ScoreKey {
            student_id: p.student_id,
            class_id: p.class_id,
            subject_id: p.subject_id,
            term: Term::new(p.year, p.term),
            assignment_name: p.assignment_name,
        },
        Err(e) => return err(&req.id, "bad_params", format!("invalid score key: {}", e), None),
    };
    let conn = match db_conn_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        scores::delete_score(conn, &key).map(|removed| json!({ "removed": removed })),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.put" => Some(handle_scores_put(state, req)),
        "scores.bulkPut" => Some(handle_scores_bulk_put(state, req)),
        "scores.list" => Some(handle_scores_list(state, req)),
        "scores.delete" => Some(handle_scores_delete(state, req)),
        _ => None,
    }
}
