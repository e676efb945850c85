//! SQLite-backed collaborators: roster/catalog, score store, attendance, and
//! the report store.

pub mod attendance;
pub mod report_store;
pub mod roster;
pub mod scores;

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
