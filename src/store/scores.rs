use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{now_rfc3339, roster};
use crate::error::{CoreError, CoreResult};
use crate::lock;
use crate::model::{AssignmentActivity, AssignmentScore, Term};

/// Identity of one raw score; a later write for the same key overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreKey {
    pub student_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub term: Term,
    pub assignment_name: String,
}

impl From<&AssignmentScore> for ScoreKey {
    fn from(s: &AssignmentScore) -> Self {
        ScoreKey {
            student_id: s.student_id.clone(),
            class_id: s.class_id.clone(),
            subject_id: s.subject_id.clone(),
            term: s.term,
            assignment_name: s.assignment_name.trim().to_string(),
        }
    }
}

pub fn get_scores(conn: &Connection, class_id: &str, term: Term) -> CoreResult<Vec<AssignmentScore>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, class_id, subject_id, year, term, activity_id, assignment_name,
                score, recorded_by, recorded_at
         FROM assignment_scores
         WHERE class_id = ? AND year = ? AND term = ?
         ORDER BY student_id, subject_id, assignment_name",
    )?;
    let rows = stmt
        .query_map((class_id, term.year, term.term), |r| {
            Ok(AssignmentScore {
                student_id: r.get(0)?,
                class_id: r.get(1)?,
                subject_id: r.get(2)?,
                term: Term::new(r.get(3)?, r.get(4)?),
                activity_id: r.get(5)?,
                assignment_name: r.get(6)?,
                score: r.get(7)?,
                recorded_by: r.get(8)?,
                recorded_at: r.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Per-student grouping of a class/term score snapshot.
pub fn scores_by_student(scores: Vec<AssignmentScore>) -> HashMap<String, Vec<AssignmentScore>> {
    let mut out: HashMap<String, Vec<AssignmentScore>> = HashMap::new();
    for s in scores {
        out.entry(s.student_id.clone()).or_default().push(s);
    }
    out
}

fn validate_score(conn: &Connection, score: &AssignmentScore) -> CoreResult<AssignmentActivity> {
    let details = || {
        json!({
            "studentId": score.student_id,
            "subjectId": score.subject_id,
            "assignmentName": score.assignment_name,
            "score": score.score,
        })
    };

    if score.term.term < 1 {
        return Err(CoreError::validation_with(
            format!("term must be >= 1, got {}", score.term.term),
            json!({ "year": score.term.year, "term": score.term.term }),
        ));
    }
    if !score.score.is_finite() || !(0.0..=100.0).contains(&score.score) {
        return Err(CoreError::validation_with(
            format!(
                "score {} for {} is outside 0..=100",
                score.score, score.assignment_name
            ),
            details(),
        ));
    }
    if score.recorded_by.trim().is_empty() {
        return Err(CoreError::validation_with("recordedBy must not be blank", details()));
    }

    let student = roster::get_student(conn, &score.student_id)?;
    if student.class_id != score.class_id || !student.active {
        return Err(CoreError::validation_with(
            "student is not enrolled in this class",
            details(),
        ));
    }

    let offered = roster::get_subjects_for_class(conn, &score.class_id)?
        .iter()
        .any(|s| s.id == score.subject_id);
    if !offered {
        return Err(CoreError::validation_with(
            "subject is not taught in this class",
            details(),
        ));
    }

    let activity = roster::get_activities(conn)?
        .into_iter()
        .find(|a| a.id == score.activity_id)
        .ok_or_else(|| CoreError::not_found("activity", &score.activity_id))?;
    if !activity.accepts_instance(&score.assignment_name) {
        return Err(CoreError::validation_with(
            format!(
                "{} is not an expected instance of {}",
                score.assignment_name, activity.name
            ),
            json!({
                "assignmentName": score.assignment_name,
                "expected": activity.instance_names(),
            }),
        ));
    }
    Ok(activity)
}

fn upsert_score(conn: &Connection, score: &AssignmentScore, recorded_at: &str) -> CoreResult<()> {
    conn.execute(
        "INSERT INTO assignment_scores(
            id, student_id, class_id, subject_id, year, term, activity_id,
            assignment_name, score, recorded_by, recorded_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, class_id, subject_id, year, term, assignment_name) DO UPDATE SET
           activity_id = excluded.activity_id,
           score = excluded.score,
           recorded_by = excluded.recorded_by,
           recorded_at = excluded.recorded_at",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            score.student_id,
            score.class_id,
            score.subject_id,
            score.term.year,
            score.term.term,
            score.activity_id,
            score.assignment_name.trim(),
            score.score,
            score.recorded_by.trim(),
            recorded_at,
        ],
    )?;
    Ok(())
}

fn ensure_unlocked(
    conn: &Connection,
    cache: &mut HashMap<(String, Term), bool>,
    class_id: &str,
    term: Term,
) -> CoreResult<()> {
    let key = (class_id.to_string(), term);
    let locked = match cache.get(&key) {
        Some(v) => *v,
        None => {
            let v = lock::is_locked(conn, class_id, term)?;
            cache.insert(key, v);
            v
        }
    };
    if locked {
        warn!(class_id, %term, "score write rejected: term is locked");
        return Err(CoreError::LockedTerm {
            class_id: class_id.to_string(),
            term,
        });
    }
    Ok(())
}

/// Writes one score. The lock check and the write share an immediate
/// transaction, so a concurrent finalization cannot interleave.
pub fn put_score(conn: &mut Connection, score: &AssignmentScore) -> CoreResult<AssignmentScore> {
    let mut written = put_scores(conn, std::slice::from_ref(score))?;
    written
        .pop()
        .ok_or_else(|| CoreError::validation("no score written"))
}

/// Writes a batch of scores all-or-nothing: any validation or lock failure
/// rolls the whole batch back.
pub fn put_scores(
    conn: &mut Connection,
    scores: &[AssignmentScore],
) -> CoreResult<Vec<AssignmentScore>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let recorded_at = now_rfc3339();
    let mut lock_cache: HashMap<(String, Term), bool> = HashMap::new();
    let mut written = Vec::with_capacity(scores.len());

    for score in scores {
        ensure_unlocked(&tx, &mut lock_cache, &score.class_id, score.term)?;
        let activity = validate_score(&tx, score)?;
        let canonical_name = activity
            .instance_names()
            .into_iter()
            .find(|n| n.eq_ignore_ascii_case(score.assignment_name.trim()))
            .unwrap_or_else(|| score.assignment_name.trim().to_string());
        let stored = AssignmentScore {
            assignment_name: canonical_name,
            recorded_at: Some(recorded_at.clone()),
            ..score.clone()
        };
        upsert_score(&tx, &stored, &recorded_at)?;
        written.push(stored);
    }

    tx.commit()?;
    debug!(count = written.len(), "scores written");
    Ok(written)
}

/// Removes one score; subject to the same lock as writes.
pub fn delete_score(conn: &mut Connection, key: &ScoreKey) -> CoreResult<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_unlocked(&tx, &mut HashMap::new(), &key.class_id, key.term)?;
    let removed = tx.execute(
        "DELETE FROM assignment_scores
         WHERE student_id = ? AND class_id = ? AND subject_id = ?
           AND year = ? AND term = ? AND assignment_name = ? COLLATE NOCASE",
        rusqlite::params![
            key.student_id,
            key.class_id,
            key.subject_id,
            key.term.year,
            key.term.term,
            key.assignment_name.trim(),
        ],
    )?;
    tx.commit()?;
    Ok(removed > 0)
}
