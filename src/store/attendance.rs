use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

use super::roster;
use crate::error::{CoreError, CoreResult};
use crate::model::{AttendanceSummary, Term};

fn parse_day(day: &str) -> CoreResult<String> {
    let d = NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d").map_err(|_| {
        CoreError::validation_with("day must be YYYY-MM-DD", json!({ "day": day }))
    })?;
    Ok(d.format("%Y-%m-%d").to_string())
}

/// Records one day's presence for a student. Re-marking a day overwrites it.
pub fn mark_attendance(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
    term: Term,
    day: &str,
    present: bool,
) -> CoreResult<()> {
    let day = parse_day(day)?;
    let student = roster::get_student(conn, student_id)?;
    if student.class_id != class_id {
        return Err(CoreError::validation_with(
            "student is not enrolled in this class",
            json!({ "studentId": student_id, "classId": class_id }),
        ));
    }
    conn.execute(
        "INSERT INTO attendance_marks(class_id, student_id, year, term, day, present)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(class_id, student_id, year, term, day) DO UPDATE SET
           present = excluded.present",
        (class_id, student_id, term.year, term.term, &day, present as i64),
    )?;
    Ok(())
}

pub fn attendance_summary(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
    term: Term,
) -> CoreResult<AttendanceSummary> {
    let (total, present): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(present), 0)
         FROM attendance_marks
         WHERE class_id = ? AND student_id = ? AND year = ? AND term = ?",
        (class_id, student_id, term.year, term.term),
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(AttendanceSummary {
        days_present: present,
        days_absent: total - present,
        days_total: total,
    })
}
