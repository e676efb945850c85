use crate::config::{self, AggregationConfig, GradingScheme};
use crate::error::CoreResult;
use crate::ipc::error::err;
use crate::ipc::helpers::{db_conn, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::model::Component;
use crate::store::roster;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
    Aggregation,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "aggregation" => Some(Self::Aggregation),
            _ => None,
        }
    }

    fn load(self, conn: &Connection) -> CoreResult<Value> {
        match self {
            Self::Grading => Ok(config::load_grading_scheme(conn)?.to_json()),
            Self::Aggregation => Ok(json!(config::load_aggregation(conn)?)),
        }
    }

    fn store(self, conn: &Connection, value: &Value) -> CoreResult<Value> {
        match self {
            Self::Grading => {
                let scheme = GradingScheme::from_json(value)?;
                config::save_grading_scheme(conn, &scheme)?;
                Ok(scheme.to_json())
            }
            Self::Aggregation => {
                let cfg = AggregationConfig::from_json(value)?;
                config::save_aggregation(conn, &cfg)?;
                Ok(json!(cfg))
            }
        }
    }
}

fn parse_section(req: &Request) -> Result<SetupSection, Value> {
    let section = required_str(req, "section")?;
    SetupSection::parse(&section).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "section must be one of: grading, aggregation",
            Some(json!({ "section": section })),
        )
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let section = match parse_section(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, section.load(conn))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let section = match parse_section(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(value) = req.params.get("value") else {
        return err(&req.id, "bad_params", "missing value", None);
    };
    let stored = section.store(conn, value);
    if stored.is_ok() {
        info!(section = req.params["section"].as_str().unwrap_or(""), "setup updated");
    }
    respond(req, stored)
}

fn handle_activities_upsert(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let expected = req
        .params
        .get("expectedPerTerm")
        .and_then(|v| v.as_i64())
        .unwrap_or(1);
    let component = match req.params.get("component").and_then(|v| v.as_str()) {
        Some(s) => match Component::parse(s) {
            Some(c) => c,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "component must be one of: sba, exam",
                    Some(json!({ "component": s })),
                )
            }
        },
        None => return err(&req.id, "bad_params", "missing component", None),
    };
    respond(req, roster::upsert_activity(conn, &name, expected, component))
}

fn handle_activities_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let activities = roster::get_activities(conn).map(|list| {
        let rows: Vec<Value> = list
            .iter()
            .map(|a| {
                json!({
                    "id": a.id,
                    "name": a.name,
                    "expectedPerTerm": a.expected_per_term,
                    "component": a.component,
                    "instances": a.instance_names(),
                })
            })
            .collect();
        json!({ "activities": rows })
    });
    respond(req, activities)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        "setup.activities.upsert" => Some(handle_activities_upsert(state, req)),
        "setup.activities.list" => Some(handle_activities_list(state, req)),
        _ => None,
    }
}
