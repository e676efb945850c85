use rusqlite::Connection;
use serde::Serialize;

use crate::error::CoreResult;
use crate::model::Term;
use crate::store::roster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockState {
    pub locked: bool,
    pub enrolled: i64,
    pub finalized: i64,
}

fn count_final(conn: &Connection, class_id: &str, term: Term) -> CoreResult<(i64, i64)> {
    let counts = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN tr.status = 'final' THEN 1 ELSE 0 END), 0)
         FROM students s
         LEFT JOIN term_reports tr
           ON tr.student_id = s.id
          AND tr.class_id = s.class_id
          AND tr.year = ?
          AND tr.term = ?
         WHERE s.class_id = ? AND s.active = 1",
        (term.year, term.term, class_id),
        |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)),
    )?;
    Ok(counts)
}

/// True iff the class has enrolled students and every one of them has a
/// final report for `term`. Always derived from the stored reports.
pub fn is_locked(conn: &Connection, class_id: &str, term: Term) -> CoreResult<bool> {
    let (enrolled, finalized) = count_final(conn, class_id, term)?;
    Ok(enrolled > 0 && finalized == enrolled)
}

pub fn lock_state(conn: &Connection, class_id: &str, term: Term) -> CoreResult<LockState> {
    roster::get_class(conn, class_id)?;
    let (enrolled, finalized) = count_final(conn, class_id, term)?;
    Ok(LockState {
        locked: enrolled > 0 && finalized == enrolled,
        enrolled,
        finalized,
    })
}
