use serde_json::json;

use crate::model::Term;

pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the report and ranking core.
///
/// Every variant maps onto a stable wire code (see [`CoreError::code`]) so the
/// sidecar can report them without string matching.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("class {class_id} is locked for {term}: every report is final")]
    LockedTerm { class_id: String, term: Term },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("ranking unavailable: {0}")]
    RankingUnavailable(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::LockedTerm { .. } => "locked_term",
            Self::Config(_) => "config_error",
            Self::RankingUnavailable(_) => "ranking_unavailable",
            Self::NotFound { .. } => "not_found",
            Self::Db(_) => "db_error",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { details, .. } => details.clone(),
            Self::LockedTerm { class_id, term } => Some(json!({
                "classId": class_id,
                "year": term.year,
                "term": term.term,
            })),
            Self::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            _ => None,
        }
    }
}
