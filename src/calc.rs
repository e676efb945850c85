use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::{AggregationConfig, CombineRule, ComponentRule, GradeBoundary, GradingScheme};
use crate::model::{AssignmentActivity, AssignmentScore, Component};

/// Half-up 1-decimal rounding used for every component and total:
/// `floor(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubjectComponents {
    pub sba_score: f64,
    pub exam_score: f64,
    pub total_score: f64,
    /// Number of score records that fed the components. Zero means the
    /// subject has no recorded total at all.
    pub recorded: usize,
}

#[derive(Debug, Default)]
struct Bucket {
    sum: f64,
    count: usize,
}

fn combine(rule: ComponentRule, bucket: &Bucket, expected: i64) -> f64 {
    let value = match rule.rule {
        CombineRule::Sum => bucket.sum.min(rule.cap),
        CombineRule::Average => {
            let denom = (expected.max(0) as usize).max(bucket.count);
            if denom == 0 {
                0.0
            } else {
                let mean_percent = bucket.sum / (denom as f64);
                mean_percent * rule.cap / 100.0
            }
        }
    };
    round_off_1_decimal(value.clamp(0.0, rule.cap))
}

/// Expected instance count per component across the activity catalog.
pub fn expected_instances(activities: &HashMap<String, AssignmentActivity>) -> (i64, i64) {
    let mut sba = 0_i64;
    let mut exam = 0_i64;
    for a in activities.values() {
        match a.component {
            Component::Sba => sba += a.expected_per_term.max(0),
            Component::Exam => exam += a.expected_per_term.max(0),
        }
    }
    (sba, exam)
}

/// Combines one student's raw records for `subject_id` into SBA and Exam
/// components. Records for other subjects, or whose activity is not in the
/// catalog, are ignored.
pub fn aggregate_subject(
    subject_id: &str,
    scores: &[AssignmentScore],
    activities: &HashMap<String, AssignmentActivity>,
    cfg: &AggregationConfig,
) -> SubjectComponents {
    let mut sba = Bucket::default();
    let mut exam = Bucket::default();

    for s in scores {
        if s.subject_id != subject_id {
            continue;
        }
        let Some(activity) = activities.get(&s.activity_id) else {
            continue;
        };
        let bucket = match activity.component {
            Component::Sba => &mut sba,
            Component::Exam => &mut exam,
        };
        bucket.sum += s.score.clamp(0.0, 100.0);
        bucket.count += 1;
    }

    let (expected_sba, expected_exam) = expected_instances(activities);
    let sba_score = combine(cfg.rule_for(Component::Sba), &sba, expected_sba);
    let exam_score = combine(cfg.rule_for(Component::Exam), &exam, expected_exam);

    SubjectComponents {
        sba_score,
        exam_score,
        total_score: round_off_1_decimal(sba_score + exam_score),
        recorded: sba.count + exam.count,
    }
}

/// First boundary whose threshold the total meets, scanning from the top.
/// A validated scheme always ends at 0, so every total in `[0,100]` matches;
/// anything below is clamped onto the lowest boundary.
pub fn resolve_grade(scheme: &GradingScheme, total: f64) -> &GradeBoundary {
    let boundaries = scheme.boundaries();
    boundaries
        .iter()
        .find(|b| total >= b.min_score)
        .unwrap_or(&boundaries[boundaries.len() - 1])
}

/// Standard competition ranking ("1224") by total, highest first.
///
/// Needs every student's total for the subject before it can assign anything.
pub fn competition_positions(totals: &[(String, f64)]) -> HashMap<String, i64> {
    let mut sorted: Vec<&(String, f64)> = totals.iter().collect();
    sorted.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut out = HashMap::with_capacity(sorted.len());
    let mut prev: Option<f64> = None;
    let mut position = 0_i64;
    for (i, (student_id, total)) in sorted.into_iter().enumerate() {
        if prev != Some(*total) {
            position = (i as i64) + 1;
            prev = Some(*total);
        }
        out.insert(student_id.clone(), position);
    }
    out
}
