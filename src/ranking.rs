//! Average-score rankings over a class, a level, or the whole school.
//!
//! A ranking is a read-only request/response. Callers that need a bound on
//! it pass a timeout or a [`CancelToken`]; either one interrupts the running
//! SQLite query and the call fails with `RankingUnavailable`. Nothing here
//! retries.

use rusqlite::{Connection, InterruptHandle};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::calc;
use crate::config;
use crate::error::{CoreError, CoreResult};
use crate::model::{ClassInfo, RankEntry, RankScope, Term};
use crate::store::{roster, scores};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankQuery {
    pub scope: RankScope,
    pub term: Term,
}

/// Anything that can answer a ranking query: the local store, or a remote
/// aggregation service.
pub trait RankingSource {
    fn rank(&self, query: &RankQuery) -> CoreResult<Vec<RankEntry>>;
}

pub struct LocalRanking<'a> {
    conn: &'a Connection,
}

impl<'a> LocalRanking<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl RankingSource for LocalRanking<'_> {
    fn rank(&self, query: &RankQuery) -> CoreResult<Vec<RankEntry>> {
        compute_ranking(self.conn, query).map_err(|e| match e {
            CoreError::Db(db) => CoreError::RankingUnavailable(db.to_string()),
            other => other,
        })
    }
}

fn classes_in_scope(conn: &Connection, scope: &RankScope) -> CoreResult<Vec<ClassInfo>> {
    match scope {
        RankScope::Class(class_id) => Ok(vec![roster::get_class(conn, class_id)?]),
        RankScope::Level(level) => roster::get_classes_by_level(conn, level),
        RankScope::School => roster::list_classes(conn),
    }
}

#[derive(Debug)]
struct Candidate {
    student_id: String,
    name: String,
    class_name: String,
    average: f64,
    subjects_counted: usize,
}

fn compute_ranking(conn: &Connection, query: &RankQuery) -> CoreResult<Vec<RankEntry>> {
    let aggregation = config::load_aggregation(conn)?;
    let activities = roster::activity_map(conn)?;
    let classes = classes_in_scope(conn, &query.scope)?;

    let mut candidates: Vec<Candidate> = Vec::new();
    for class in &classes {
        let students = roster::get_students(conn, &class.id)?;
        let subjects = roster::get_subjects_for_class(conn, &class.id)?;
        let by_student =
            scores::scores_by_student(scores::get_scores(conn, &class.id, query.term)?);

        for student in &students {
            let Some(raw) = by_student.get(&student.id) else {
                continue;
            };
            let mut sum = 0.0_f64;
            let mut counted = 0_usize;
            for subject in &subjects {
                let c = calc::aggregate_subject(&subject.id, raw, &activities, &aggregation);
                // A subject with nothing recorded is left out, not averaged in as 0.
                if c.recorded == 0 {
                    continue;
                }
                sum += c.total_score;
                counted += 1;
            }
            if counted == 0 {
                continue;
            }
            let average = calc::round_off_1_decimal(sum / (counted as f64)).clamp(0.0, 100.0);
            candidates.push(Candidate {
                student_id: student.id.clone(),
                name: student.display_name(),
                class_name: class.name.clone(),
                average,
                subjects_counted: counted,
            });
        }
    }

    candidates.sort_by(|a, b| {
        b.average
            .partial_cmp(&a.average)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    debug!(scope = %query.scope, term = %query.term, ranked = candidates.len(), "ranking computed");
    Ok(candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| RankEntry {
            student_id: c.student_id,
            name: c.name,
            class_name: c.class_name,
            average_score: c.average,
            subjects_counted: c.subjects_counted,
            rank: (i as i64) + 1,
        })
        .collect())
}

/// Cancels an in-flight ranking on one connection from another thread.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    interrupt: Arc<InterruptHandle>,
}

impl CancelToken {
    pub fn for_connection(conn: &Connection) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            interrupt: Arc::new(conn.get_interrupt_handle()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
        self.interrupt.interrupt();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

/// Runs a local ranking bounded by an optional timeout and cancel token.
/// A timed-out or cancelled call never returns a partial list.
pub fn rank_bounded(
    conn: &Connection,
    query: &RankQuery,
    timeout: Option<Duration>,
    cancel: Option<&CancelToken>,
) -> CoreResult<Vec<RankEntry>> {
    let cancelled = || cancel.map(CancelToken::is_cancelled).unwrap_or(false);
    if cancelled() {
        return Err(CoreError::RankingUnavailable("ranking cancelled".into()));
    }

    let source = LocalRanking::new(conn);
    let Some(timeout) = timeout else {
        let result = source.rank(query);
        if cancelled() {
            return Err(CoreError::RankingUnavailable("ranking cancelled".into()));
        }
        return result;
    };
    if timeout.is_zero() {
        return Err(CoreError::RankingUnavailable(
            "ranking deadline already elapsed".into(),
        ));
    }

    let fired = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let watchdog = {
        let fired = Arc::clone(&fired);
        let interrupt = conn.get_interrupt_handle();
        thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
                fired.store(true, AtomicOrdering::SeqCst);
                interrupt.interrupt();
            }
        })
    };

    let result = source.rank(query);
    let _ = done_tx.send(());
    let _ = watchdog.join();

    if fired.load(AtomicOrdering::SeqCst) {
        warn!(scope = %query.scope, timeout_ms = timeout.as_millis() as u64, "ranking timed out");
        return Err(CoreError::RankingUnavailable(format!(
            "ranking timed out after {} ms",
            timeout.as_millis()
        )));
    }
    if cancelled() {
        return Err(CoreError::RankingUnavailable("ranking cancelled".into()));
    }
    result
}

pub fn rank(conn: &Connection, scope: RankScope, term: Term) -> CoreResult<Vec<RankEntry>> {
    LocalRanking::new(conn).rank(&RankQuery { scope, term })
}

pub fn rank_class(conn: &Connection, class_id: &str, term: Term) -> CoreResult<Vec<RankEntry>> {
    rank(conn, RankScope::Class(class_id.to_string()), term)
}

pub fn rank_level(conn: &Connection, level: &str, term: Term) -> CoreResult<Vec<RankEntry>> {
    rank(conn, RankScope::Level(level.to_string()), term)
}

pub fn rank_school(conn: &Connection, term: Term) -> CoreResult<Vec<RankEntry>> {
    rank(conn, RankScope::School, term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::{AssignmentScore, Component};

    struct School {
        conn: Connection,
        class_test: String,
        exam: String,
        math: String,
        english: String,
    }

    fn school() -> School {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        let class_test =
            roster::upsert_activity(&conn, "Class Test", 1, Component::Sba).expect("test");
        let exam = roster::upsert_activity(&conn, "Exam", 1, Component::Exam).expect("exam");
        let math = roster::create_subject(&conn, "Mathematics").expect("math");
        let english = roster::create_subject(&conn, "English").expect("english");
        School {
            conn,
            class_test: class_test.id,
            exam: exam.id,
            math: math.id,
            english: english.id,
        }
    }

    fn class(s: &School, name: &str, level: &str) -> String {
        let c = roster::create_class(&s.conn, name, level).expect("class");
        roster::assign_subject(&s.conn, &c.id, &s.math).expect("math");
        roster::assign_subject(&s.conn, &c.id, &s.english).expect("english");
        c.id
    }

    fn student(s: &School, class_id: &str, last: &str) -> String {
        roster::create_student(&s.conn, class_id, last, "X").expect("student").id
    }

    /// Scores both halves at `v` percent, so the subject total is `v`.
    fn subject_total(s: &mut School, class_id: &str, student_id: &str, subject: &str, v: f64) {
        let parts = [
            (s.class_test.clone(), "Class Test"),
            (s.exam.clone(), "Exam"),
        ];
        let batch: Vec<AssignmentScore> = parts
            .into_iter()
            .map(|(activity_id, name)| AssignmentScore {
                student_id: student_id.into(),
                class_id: class_id.into(),
                subject_id: subject.into(),
                term: Term::new(2024, 1),
                activity_id,
                assignment_name: name.into(),
                score: v,
                recorded_by: "t".into(),
                recorded_at: None,
            })
            .collect();
        scores::put_scores(&mut s.conn, &batch).expect("scores");
    }

    #[test]
    fn unscored_students_are_left_out() {
        let mut s = school();
        let c = class(&s, "JHS 1A", "JHS1");
        let a = student(&s, &c, "Adjei");
        let _b = student(&s, &c, "Boateng");
        let math = s.math.clone();
        subject_total(&mut s, &c, &a, &math, 80.0);

        let ranked = rank_class(&s.conn, &c, Term::new(2024, 1)).expect("rank");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].student_id, a);
        assert_eq!(ranked[0].rank, 1);
    }

    #[test]
    fn unknown_class_is_not_found() {
        let s = school();
        let e = rank_class(&s.conn, "nope", Term::new(2024, 1)).unwrap_err();
        assert_eq!(e.code(), "not_found");
    }

    #[test]
    fn pre_cancelled_token_fails_without_results() {
        let s = school();
        let token = CancelToken::for_connection(&s.conn);
        token.cancel();
        let q = RankQuery {
            scope: RankScope::School,
            term: Term::new(2024, 1),
        };
        let e = rank_bounded(&s.conn, &q, None, Some(&token)).unwrap_err();
        assert_eq!(e.code(), "ranking_unavailable");
    }

    #[test]
    fn elapsed_deadline_is_ranking_unavailable() {
        let s = school();
        let q = RankQuery {
            scope: RankScope::School,
            term: Term::new(2024, 1),
        };
        let e = rank_bounded(&s.conn, &q, Some(Duration::ZERO), None).unwrap_err();
        assert_eq!(e.code(), "ranking_unavailable");
    }

    #[test]
    fn generous_timeout_matches_unbounded_call() {
        let mut s = school();
        let c = class(&s, "JHS 1A", "JHS1");
        let a = student(&s, &c, "Adjei");
        let b = student(&s, &c, "Boateng");
        let (math, english) = (s.math.clone(), s.english.clone());
        subject_total(&mut s, &c, &a, &math, 70.0);
        subject_total(&mut s, &c, &b, &english, 90.0);

        let q = RankQuery {
            scope: RankScope::Class(c.clone()),
            term: Term::new(2024, 1),
        };
        let bounded = rank_bounded(&s.conn, &q, Some(Duration::from_secs(30)), None).expect("ok");
        let plain = LocalRanking::new(&s.conn).rank(&q).expect("ok");
        assert_eq!(bounded, plain);
        assert_eq!(plain[0].student_id, b);
    }
}
