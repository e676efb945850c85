use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::model::{AssignmentActivity, ClassInfo, Component, StudentInfo, SubjectInfo};

fn required_text(value: &str, field: &str) -> CoreResult<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(CoreError::validation(format!("{} must not be blank", field)));
    }
    Ok(t.to_string())
}

pub fn create_class(conn: &Connection, name: &str, level: &str) -> CoreResult<ClassInfo> {
    let class = ClassInfo {
        id: Uuid::new_v4().to_string(),
        name: required_text(name, "name")?,
        level: required_text(level, "level")?,
    };
    conn.execute(
        "INSERT INTO classes(id, name, level) VALUES(?, ?, ?)",
        (&class.id, &class.name, &class.level),
    )?;
    Ok(class)
}

fn map_class(r: &rusqlite::Row<'_>) -> rusqlite::Result<ClassInfo> {
    Ok(ClassInfo {
        id: r.get(0)?,
        name: r.get(1)?,
        level: r.get(2)?,
    })
}

pub fn get_class(conn: &Connection, class_id: &str) -> CoreResult<ClassInfo> {
    conn.query_row(
        "SELECT id, name, level FROM classes WHERE id = ?",
        [class_id],
        map_class,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("class", class_id))
}

pub fn list_classes(conn: &Connection) -> CoreResult<Vec<ClassInfo>> {
    let mut stmt = conn.prepare("SELECT id, name, level FROM classes ORDER BY level, name, id")?;
    let rows = stmt
        .query_map([], map_class)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_classes_by_level(conn: &Connection, level: &str) -> CoreResult<Vec<ClassInfo>> {
    let mut stmt =
        conn.prepare("SELECT id, name, level FROM classes WHERE level = ? ORDER BY name, id")?;
    let rows = stmt
        .query_map([level.trim()], map_class)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create_student(
    conn: &Connection,
    class_id: &str,
    last_name: &str,
    first_name: &str,
) -> CoreResult<StudentInfo> {
    get_class(conn, class_id)?;
    let last_name = required_text(last_name, "lastName")?;
    let first_name = required_text(first_name, "firstName")?;
    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    let student = StudentInfo {
        id: Uuid::new_v4().to_string(),
        class_id: class_id.to_string(),
        last_name,
        first_name,
        sort_order,
        active: true,
    };
    conn.execute(
        "INSERT INTO students(id, class_id, last_name, first_name, active, sort_order)
         VALUES(?, ?, ?, ?, 1, ?)",
        (
            &student.id,
            &student.class_id,
            &student.last_name,
            &student.first_name,
            student.sort_order,
        ),
    )?;
    Ok(student)
}

/// Withdrawn students stop counting as enrolled for locks and rankings.
pub fn set_student_active(conn: &Connection, student_id: &str, active: bool) -> CoreResult<()> {
    let changed = conn.execute(
        "UPDATE students SET active = ? WHERE id = ?",
        (active as i64, student_id),
    )?;
    if changed == 0 {
        return Err(CoreError::not_found("student", student_id));
    }
    Ok(())
}

fn map_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentInfo> {
    Ok(StudentInfo {
        id: r.get(0)?,
        class_id: r.get(1)?,
        last_name: r.get(2)?,
        first_name: r.get(3)?,
        sort_order: r.get(4)?,
        active: r.get::<_, i64>(5)? != 0,
    })
}

pub fn get_student(conn: &Connection, student_id: &str) -> CoreResult<StudentInfo> {
    conn.query_row(
        "SELECT id, class_id, last_name, first_name, sort_order, active
         FROM students WHERE id = ?",
        [student_id],
        map_student,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("student", student_id))
}

pub fn list_students(
    conn: &Connection,
    class_id: &str,
    include_inactive: bool,
) -> CoreResult<Vec<StudentInfo>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, last_name, first_name, sort_order, active
         FROM students
         WHERE class_id = ? AND (active = 1 OR ?)
         ORDER BY sort_order, id",
    )?;
    let rows = stmt
        .query_map((class_id, include_inactive), map_student)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Currently-enrolled students of a class.
pub fn get_students(conn: &Connection, class_id: &str) -> CoreResult<Vec<StudentInfo>> {
    list_students(conn, class_id, false)
}

pub fn create_subject(conn: &Connection, name: &str) -> CoreResult<SubjectInfo> {
    let name = required_text(name, "name")?;
    let existing: Option<String> = conn
        .query_row("SELECT id FROM subjects WHERE name = ?", [&name], |r| r.get(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(SubjectInfo { id, name });
    }
    let subject = SubjectInfo {
        id: Uuid::new_v4().to_string(),
        name,
    };
    conn.execute(
        "INSERT INTO subjects(id, name) VALUES(?, ?)",
        (&subject.id, &subject.name),
    )?;
    Ok(subject)
}

pub fn assign_subject(conn: &Connection, class_id: &str, subject_id: &str) -> CoreResult<()> {
    get_class(conn, class_id)?;
    let known: Option<String> = conn
        .query_row("SELECT id FROM subjects WHERE id = ?", [subject_id], |r| r.get(0))
        .optional()?;
    if known.is_none() {
        return Err(CoreError::not_found("subject", subject_id));
    }
    conn.execute(
        "INSERT INTO class_subjects(class_id, subject_id, sort_order)
         VALUES(?, ?, (SELECT COALESCE(MAX(sort_order) + 1, 0) FROM class_subjects WHERE class_id = ?))
         ON CONFLICT(class_id, subject_id) DO NOTHING",
        (class_id, subject_id, class_id),
    )?;
    Ok(())
}

/// The one place that answers "which subjects are graded for this class".
pub fn get_subjects_for_class(conn: &Connection, class_id: &str) -> CoreResult<Vec<SubjectInfo>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name
         FROM class_subjects cs
         JOIN subjects s ON s.id = cs.subject_id
         WHERE cs.class_id = ?
         ORDER BY cs.sort_order, s.id",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(SubjectInfo {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Scores are keyed by instance name, so no two activities may share one.
fn ensure_distinct_instances(conn: &Connection, name: &str, expected_per_term: i64) -> CoreResult<()> {
    let candidate = AssignmentActivity {
        id: String::new(),
        name: name.to_string(),
        expected_per_term,
        component: Component::Sba,
    };
    let wanted = candidate.instance_names();
    for other in get_activities(conn)? {
        if other.name == name {
            continue;
        }
        if let Some(clash) = wanted.iter().find(|n| other.accepts_instance(n)) {
            return Err(CoreError::validation_with(
                format!("{} would reuse instance name {} of {}", name, clash, other.name),
                serde_json::json!({
                    "name": name,
                    "instance": clash,
                    "conflictsWith": other.name,
                }),
            ));
        }
    }
    Ok(())
}

pub fn upsert_activity(
    conn: &Connection,
    name: &str,
    expected_per_term: i64,
    component: Component,
) -> CoreResult<AssignmentActivity> {
    let name = required_text(name, "name")?;
    if expected_per_term < 1 {
        return Err(CoreError::validation_with(
            "expectedPerTerm must be >= 1",
            serde_json::json!({ "expectedPerTerm": expected_per_term }),
        ));
    }
    ensure_distinct_instances(conn, &name, expected_per_term)?;
    conn.execute(
        "INSERT INTO activities(id, name, expected_per_term, component)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET
           expected_per_term = excluded.expected_per_term,
           component = excluded.component",
        (
            Uuid::new_v4().to_string(),
            &name,
            expected_per_term,
            component.as_str(),
        ),
    )?;
    let id: String = conn.query_row("SELECT id FROM activities WHERE name = ?", [&name], |r| {
        r.get(0)
    })?;
    Ok(AssignmentActivity {
        id,
        name,
        expected_per_term,
        component,
    })
}

pub fn get_activities(conn: &Connection) -> CoreResult<Vec<AssignmentActivity>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, expected_per_term, component FROM activities ORDER BY name, id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let component: String = r.get(3)?;
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, component))
        })?
        .collect::<Result<Vec<(String, String, i64, String)>, _>>()?;

    rows.into_iter()
        .map(|(id, name, expected_per_term, component)| {
            let component = Component::parse(&component).ok_or_else(|| {
                CoreError::Config(format!("activity {} has unknown component {}", name, component))
            })?;
            Ok(AssignmentActivity {
                id,
                name,
                expected_per_term,
                component,
            })
        })
        .collect()
}

pub fn activity_map(conn: &Connection) -> CoreResult<HashMap<String, AssignmentActivity>> {
    Ok(get_activities(conn)?
        .into_iter()
        .map(|a| (a.id.clone(), a))
        .collect())
}
