use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::model::{AttendanceSummary, ReportStatus, SubjectReportLine, Term, TermReport};

const REPORT_COLUMNS: &str = "id, student_id, class_id, year, term, status, attendance_json,
    conduct, talent_and_interest, class_teacher_remarks, head_teacher_remarks,
    generated_at, finalized_at";

struct ReportRow {
    id: String,
    student_id: String,
    class_id: String,
    term: Term,
    status: String,
    attendance_json: String,
    conduct: Option<String>,
    talent_and_interest: Option<String>,
    class_teacher_remarks: Option<String>,
    head_teacher_remarks: Option<String>,
    generated_at: String,
    finalized_at: Option<String>,
}

fn map_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: r.get(0)?,
        student_id: r.get(1)?,
        class_id: r.get(2)?,
        term: Term::new(r.get(3)?, r.get(4)?),
        status: r.get(5)?,
        attendance_json: r.get(6)?,
        conduct: r.get(7)?,
        talent_and_interest: r.get(8)?,
        class_teacher_remarks: r.get(9)?,
        head_teacher_remarks: r.get(10)?,
        generated_at: r.get(11)?,
        finalized_at: r.get(12)?,
    })
}

fn load_lines(conn: &Connection, report_id: &str) -> CoreResult<Vec<SubjectReportLine>> {
    let mut stmt = conn.prepare(
        "SELECT subject_id, subject_name, sba_score, exam_score, total_score, grade, position, remarks
         FROM report_lines
         WHERE report_id = ?
         ORDER BY sort_order",
    )?;
    let lines = stmt
        .query_map([report_id], |r| {
            Ok(SubjectReportLine {
                subject_id: r.get(0)?,
                subject_name: r.get(1)?,
                sba_score: r.get(2)?,
                exam_score: r.get(3)?,
                total_score: r.get(4)?,
                grade: r.get(5)?,
                position: r.get(6)?,
                remarks: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines)
}

fn hydrate(conn: &Connection, row: ReportRow) -> CoreResult<TermReport> {
    let status = ReportStatus::parse(&row.status).ok_or_else(|| {
        CoreError::validation(format!("report {} has unknown status {}", row.id, row.status))
    })?;
    let attendance_summary: AttendanceSummary = serde_json::from_str(&row.attendance_json)
        .map_err(|e| {
            warn!(report_id = %row.id, "stored attendance summary is unreadable: {e}");
            rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
        })?;
    let subjects = load_lines(conn, &row.id)?;
    Ok(TermReport {
        id: row.id,
        student_id: row.student_id,
        class_id: row.class_id,
        term: row.term,
        status,
        subjects,
        attendance_summary,
        conduct: row.conduct,
        talent_and_interest: row.talent_and_interest,
        class_teacher_remarks: row.class_teacher_remarks,
        head_teacher_remarks: row.head_teacher_remarks,
        generated_at: row.generated_at,
        finalized_at: row.finalized_at,
    })
}

pub fn get_report(conn: &Connection, student_id: &str, term: Term) -> CoreResult<Option<TermReport>> {
    let sql = format!(
        "SELECT {} FROM term_reports WHERE student_id = ? AND year = ? AND term = ?",
        REPORT_COLUMNS
    );
    let row = conn
        .query_row(&sql, (student_id, term.year, term.term), map_row)
        .optional()?;
    match row {
        Some(row) => Ok(Some(hydrate(conn, row)?)),
        None => Ok(None),
    }
}

pub fn list_reports(conn: &Connection, class_id: &str, term: Term) -> CoreResult<Vec<TermReport>> {
    let sql = format!(
        "SELECT {} FROM term_reports tr
         WHERE class_id = ? AND year = ? AND term = ?
         ORDER BY (SELECT sort_order FROM students s WHERE s.id = tr.student_id), student_id",
        REPORT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((class_id, term.year, term.term), map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|row| hydrate(conn, row)).collect()
}

/// Inserts or replaces a report and its subject lines.
///
/// Callers own the transaction; this writes the row and lines as given.
pub fn put_report(conn: &Connection, report: &TermReport) -> CoreResult<()> {
    let attendance_json = serde_json::to_string(&report.attendance_summary)
        .map_err(|e| CoreError::validation(format!("attendance summary: {}", e)))?;
    conn.execute(
        "INSERT INTO term_reports(
            id, student_id, class_id, year, term, status, attendance_json,
            conduct, talent_and_interest, class_teacher_remarks, head_teacher_remarks,
            generated_at, finalized_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           status = excluded.status,
           attendance_json = excluded.attendance_json,
           conduct = excluded.conduct,
           talent_and_interest = excluded.talent_and_interest,
           class_teacher_remarks = excluded.class_teacher_remarks,
           head_teacher_remarks = excluded.head_teacher_remarks,
           generated_at = excluded.generated_at,
           finalized_at = excluded.finalized_at",
        rusqlite::params![
            report.id,
            report.student_id,
            report.class_id,
            report.term.year,
            report.term.term,
            report.status.as_str(),
            attendance_json,
            report.conduct,
            report.talent_and_interest,
            report.class_teacher_remarks,
            report.head_teacher_remarks,
            report.generated_at,
            report.finalized_at,
        ],
    )?;

    conn.execute("DELETE FROM report_lines WHERE report_id = ?", [&report.id])?;
    let mut stmt = conn.prepare(
        "INSERT INTO report_lines(
            report_id, subject_id, subject_name, sba_score, exam_score, total_score,
            grade, position, remarks, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for (i, line) in report.subjects.iter().enumerate() {
        stmt.execute(rusqlite::params![
            report.id,
            line.subject_id,
            line.subject_name,
            line.sba_score,
            line.exam_score,
            line.total_score,
            line.grade,
            line.position,
            line.remarks,
            i as i64,
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::roster;

    #[test]
    fn report_roundtrips_with_lines_in_order() {
        let c = Connection::open_in_memory().expect("open");
        db::init_schema(&c).expect("schema");
        let class = roster::create_class(&c, "JHS 1A", "JHS1").expect("class");
        let s = roster::create_student(&c, &class.id, "Mensah", "Ama").expect("student");
        let term = Term::new(2024, 3);

        let line = |id: &str, total: f64| SubjectReportLine {
            subject_id: id.into(),
            subject_name: id.to_uppercase(),
            sba_score: total / 2.0,
            exam_score: total / 2.0,
            total_score: total,
            grade: "B".into(),
            position: 1,
            remarks: Some("Very Good".into()),
        };
        let mut report = TermReport {
            id: "r1".into(),
            student_id: s.id.clone(),
            class_id: class.id.clone(),
            term,
            status: ReportStatus::Provisional,
            subjects: vec![line("math", 72.0), line("eng", 70.0)],
            attendance_summary: AttendanceSummary {
                days_present: 50,
                days_absent: 2,
                days_total: 52,
            },
            conduct: Some("Respectful".into()),
            talent_and_interest: None,
            class_teacher_remarks: None,
            head_teacher_remarks: None,
            generated_at: "2024-12-01T00:00:00Z".into(),
            finalized_at: None,
        };
        put_report(&c, &report).expect("put");
        assert_eq!(get_report(&c, &s.id, term).expect("get"), Some(report.clone()));

        report.subjects.pop();
        report.status = ReportStatus::Final;
        put_report(&c, &report).expect("put again");
        let stored = get_report(&c, &s.id, term).expect("get").expect("some");
        assert_eq!(stored.subjects.len(), 1);
        assert!(stored.is_final());
        assert_eq!(list_reports(&c, &class.id, term).expect("list").len(), 1);
        assert_eq!(get_report(&c, &s.id, Term::new(2024, 1)).expect("get"), None);
    }

    #[test]
    fn unreadable_attendance_summary_is_an_error() {
        let c = Connection::open_in_memory().expect("open");
        db::init_schema(&c).expect("schema");
        let class = roster::create_class(&c, "JHS 1A", "JHS1").expect("class");
        let s = roster::create_student(&c, &class.id, "Mensah", "Ama").expect("student");
        c.execute(
            "INSERT INTO term_reports(id, student_id, class_id, year, term, status, attendance_json, generated_at)
             VALUES('r1', ?, ?, 2024, 1, 'provisional', '{\"daysPresent\":', '2024-01-01T00:00:00Z')",
            (&s.id, &class.id),
        )
        .expect("insert");
        let e = get_report(&c, &s.id, Term::new(2024, 1)).unwrap_err();
        assert_eq!(e.code(), "db_error");
        assert!(list_reports(&c, &class.id, Term::new(2024, 1)).is_err());
    }
}
