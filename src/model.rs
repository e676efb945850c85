use serde::{Deserialize, Serialize};
use std::fmt;

/// One grading period within an academic year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Term {
    pub year: i64,
    pub term: i64,
}

impl Term {
    pub fn new(year: i64, term: i64) -> Self {
        Self { year, term }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} term {}", self.year, self.term)
    }
}

/// Which part of a subject total an activity feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Sba,
    Exam,
}

impl Component {
    pub fn as_str(self) -> &'static str {
        match self {
            Component::Sba => "sba",
            Component::Exam => "exam",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sba" => Some(Component::Sba),
            "exam" => Some(Component::Exam),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentActivity {
    pub id: String,
    pub name: String,
    pub expected_per_term: i64,
    pub component: Component,
}

impl AssignmentActivity {
    /// Instance names expected for one term: "Quiz 1".."Quiz 3", or just the
    /// activity name when it occurs once.
    pub fn instance_names(&self) -> Vec<String> {
        if self.expected_per_term <= 1 {
            return vec![self.name.clone()];
        }
        (1..=self.expected_per_term)
            .map(|n| format!("{} {}", self.name, n))
            .collect()
    }

    pub fn accepts_instance(&self, assignment_name: &str) -> bool {
        let wanted = assignment_name.trim();
        self.instance_names()
            .iter()
            .any(|n| n.eq_ignore_ascii_case(wanted))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentScore {
    pub student_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub term: Term,
    pub activity_id: String,
    pub assignment_name: String,
    pub score: f64,
    pub recorded_by: String,
    #[serde(default)]
    pub recorded_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Provisional,
    Final,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Provisional => "provisional",
            ReportStatus::Final => "final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provisional" => Some(ReportStatus::Provisional),
            "final" => Some(ReportStatus::Final),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectReportLine {
    pub subject_id: String,
    pub subject_name: String,
    pub sba_score: f64,
    pub exam_score: f64,
    pub total_score: f64,
    pub grade: String,
    pub position: i64,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendanceSummary {
    pub days_present: i64,
    pub days_absent: i64,
    pub days_total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemarkFields {
    pub conduct: Option<String>,
    pub talent_and_interest: Option<String>,
    pub class_teacher_remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermReport {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub term: Term,
    pub status: ReportStatus,
    pub subjects: Vec<SubjectReportLine>,
    pub attendance_summary: AttendanceSummary,
    pub conduct: Option<String>,
    pub talent_and_interest: Option<String>,
    pub class_teacher_remarks: Option<String>,
    pub head_teacher_remarks: Option<String>,
    pub generated_at: String,
    pub finalized_at: Option<String>,
}

impl TermReport {
    pub fn is_final(&self) -> bool {
        self.status == ReportStatus::Final
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankEntry {
    pub student_id: String,
    pub name: String,
    pub class_name: String,
    pub average_score: f64,
    pub subjects_counted: usize,
    pub rank: i64,
}

/// Population a ranking is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "scopeId", rename_all = "snake_case")]
pub enum RankScope {
    Class(String),
    Level(String),
    School,
}

impl fmt::Display for RankScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankScope::Class(id) => write!(f, "class {}", id),
            RankScope::Level(level) => write!(f, "level {}", level),
            RankScope::School => write!(f, "school"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: String,
    pub name: String,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub id: String,
    pub class_id: String,
    pub last_name: String,
    pub first_name: String,
    pub sort_order: i64,
    pub active: bool,
}

impl StudentInfo {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectInfo {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_activity_expands_numbered_instances() {
        let quiz = AssignmentActivity {
            id: "a1".into(),
            name: "Quiz".into(),
            expected_per_term: 3,
            component: Component::Sba,
        };
        assert_eq!(quiz.instance_names(), vec!["Quiz 1", "Quiz 2", "Quiz 3"]);
        assert!(quiz.accepts_instance("quiz 2"));
        assert!(!quiz.accepts_instance("Quiz 4"));
    }

    #[test]
    fn single_activity_uses_bare_name() {
        let exam = AssignmentActivity {
            id: "a2".into(),
            name: "End of Term Exam".into(),
            expected_per_term: 1,
            component: Component::Exam,
        };
        assert_eq!(exam.instance_names(), vec!["End of Term Exam"]);
    }
}
