//! Grading scheme and aggregation rules.
//!
//! Both live in the workspace `settings` table as JSON and are validated when
//! read and when written, so a malformed table can never reach the grade
//! resolver.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::model::Component;

pub const GRADING_SCHEME_KEY: &str = "grading.scheme";
pub const AGGREGATION_KEY: &str = "grading.aggregation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBoundary {
    pub min_score: f64,
    pub grade: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBoundary {
    Pair(f64, String),
    Full(GradeBoundary),
}

impl From<RawBoundary> for GradeBoundary {
    fn from(raw: RawBoundary) -> Self {
        match raw {
            RawBoundary::Pair(min_score, grade) => GradeBoundary {
                min_score,
                grade,
                remark: None,
            },
            RawBoundary::Full(b) => b,
        }
    }
}

/// A validated boundary table, highest threshold first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingScheme {
    boundaries: Vec<GradeBoundary>,
}

impl GradingScheme {
    pub fn new(boundaries: Vec<GradeBoundary>) -> CoreResult<Self> {
        validate_boundaries(&boundaries)?;
        Ok(Self { boundaries })
    }

    /// Parses `{"boundaries": [...]}` or a bare array; entries may be
    /// `[min, "label"]` pairs or `{minScore, grade, remark}` objects.
    pub fn from_json(value: &serde_json::Value) -> CoreResult<Self> {
        let list = value.get("boundaries").unwrap_or(value);
        let raw: Vec<RawBoundary> = serde_json::from_value(list.clone())
            .map_err(|e| CoreError::Config(format!("grading boundaries: {}", e)))?;
        Self::new(raw.into_iter().map(GradeBoundary::from).collect())
    }

    pub fn boundaries(&self) -> &[GradeBoundary] {
        &self.boundaries
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({ "boundaries": self.boundaries })
    }
}

impl Default for GradingScheme {
    fn default() -> Self {
        let table = [
            (80.0, "A", "Excellent"),
            (70.0, "B", "Very Good"),
            (60.0, "C", "Good"),
            (50.0, "D", "Credit"),
            (40.0, "E", "Pass"),
            (0.0, "F", "Fail"),
        ];
        Self {
            boundaries: table
                .iter()
                .map(|(min, grade, remark)| GradeBoundary {
                    min_score: *min,
                    grade: grade.to_string(),
                    remark: Some(remark.to_string()),
                })
                .collect(),
        }
    }
}

fn validate_boundaries(boundaries: &[GradeBoundary]) -> CoreResult<()> {
    let Some(last) = boundaries.last() else {
        return Err(CoreError::Config("grading scheme has no boundaries".into()));
    };
    for (i, b) in boundaries.iter().enumerate() {
        if !b.min_score.is_finite() || !(0.0..=100.0).contains(&b.min_score) {
            return Err(CoreError::Config(format!(
                "boundary {} threshold {} is outside 0..=100",
                i, b.min_score
            )));
        }
        if b.grade.trim().is_empty() {
            return Err(CoreError::Config(format!("boundary {} has a blank grade", i)));
        }
        if i > 0 && b.min_score >= boundaries[i - 1].min_score {
            return Err(CoreError::Config(format!(
                "boundaries must be strictly descending: {} follows {}",
                b.min_score,
                boundaries[i - 1].min_score
            )));
        }
    }
    if last.min_score != 0.0 {
        return Err(CoreError::Config(format!(
            "scores below {} have no grade",
            last.min_score
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineRule {
    Sum,
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRule {
    pub rule: CombineRule,
    pub cap: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    pub sba: ComponentRule,
    pub exam: ComponentRule,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            sba: ComponentRule {
                rule: CombineRule::Average,
                cap: 50.0,
            },
            exam: ComponentRule {
                rule: CombineRule::Average,
                cap: 50.0,
            },
        }
    }
}

impl AggregationConfig {
    pub fn rule_for(&self, component: Component) -> ComponentRule {
        match component {
            Component::Sba => self.sba,
            Component::Exam => self.exam,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        for (name, c) in [("sba", self.sba), ("exam", self.exam)] {
            if !c.cap.is_finite() || c.cap <= 0.0 {
                return Err(CoreError::Config(format!("{} cap must be > 0", name)));
            }
        }
        if (self.sba.cap + self.exam.cap - 100.0).abs() > 1e-9 {
            return Err(CoreError::Config(format!(
                "component caps must sum to 100 (sba {} + exam {})",
                self.sba.cap, self.exam.cap
            )));
        }
        Ok(())
    }

    pub fn from_json(value: &serde_json::Value) -> CoreResult<Self> {
        let cfg: AggregationConfig = serde_json::from_value(value.clone())
            .map_err(|e| CoreError::Config(format!("aggregation: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn load_setting(conn: &Connection, key: &str) -> CoreResult<Option<serde_json::Value>> {
    let Some(raw) = db::settings_get_raw(conn, key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| CoreError::Config(format!("stored {} is not valid JSON: {}", key, e)))
}

pub fn load_grading_scheme(conn: &Connection) -> CoreResult<GradingScheme> {
    match load_setting(conn, GRADING_SCHEME_KEY)? {
        Some(v) => GradingScheme::from_json(&v),
        None => Ok(GradingScheme::default()),
    }
}

pub fn save_grading_scheme(conn: &Connection, scheme: &GradingScheme) -> CoreResult<()> {
    db::settings_set_json(conn, GRADING_SCHEME_KEY, &scheme.to_json())?;
    Ok(())
}

pub fn load_aggregation(conn: &Connection) -> CoreResult<AggregationConfig> {
    match load_setting(conn, AGGREGATION_KEY)? {
        Some(v) => AggregationConfig::from_json(&v),
        None => Ok(AggregationConfig::default()),
    }
}

pub fn save_aggregation(conn: &Connection, cfg: &AggregationConfig) -> CoreResult<()> {
    cfg.validate()?;
    let value = serde_json::to_value(cfg)
        .map_err(|e| CoreError::Config(format!("aggregation: {}", e)))?;
    db::settings_set_json(conn, AGGREGATION_KEY, &value)?;
    Ok(())
}
