use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{ensure_student, get_optional_str, get_required_str, run_with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const STUDENT_COLUMNS: &str = "id, name, department, year, roll_no, email, section";

fn student_json(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "name": r.get::<_, String>(1)?,
        "department": r.get::<_, String>(2)?,
        "year": r.get::<_, String>(3)?,
        "rollNo": r.get::<_, Option<String>>(4)?,
        "email": r.get::<_, Option<String>>(5)?,
        "section": r.get::<_, Option<String>>(6)?,
    }))
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let department = get_required_str(params, "department")?;
    let year = get_required_str(params, "year")?;
    let roll_no = get_optional_str(params, "rollNo");
    let email = get_optional_str(params, "email");

    let student_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO students(id, name, department, year, roll_no, email, section, created_at)
         VALUES(?, ?, ?, ?, ?, ?, NULL, ?)",
        (&student_id, &name, &department, &year, &roll_no, &email, &now),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "students" }))
    })?;

    tracing::info!(student_id = %student_id, department = %department, year = %year, "student created");
    Ok(json!({ "studentId": student_id }))
}

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    for (key, column) in [
        ("department", "department = ?"),
        ("year", "year = ?"),
        ("section", "section = ?"),
    ] {
        if let Some(v) = get_optional_str(params, key) {
            clauses.push(column);
            binds.push(Value::Text(v));
        }
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM students {} ORDER BY rowid",
        STUDENT_COLUMNS, where_sql
    );

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let students = stmt
        .query_map(params_from_iter(binds), student_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "students": students }))
}

fn students_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    conn.query_row(&sql, [&student_id], student_json)
        .optional()
        .map_err(HandlerErr::query)?
        .map(|student| json!({ "student": student }))
        .ok_or_else(|| HandlerErr::not_found("student not found"))
}

fn students_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    ensure_student(conn, &student_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    // No ON DELETE CASCADE; children go first.
    for table in ["results", "attendance"] {
        tx.execute(
            &format!("DELETE FROM {} WHERE student_id = ?", table),
            [&student_id],
        )
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string()).with_details(json!({ "table": table }))
        })?;
    }
    tx.execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "students" }))
        })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    tracing::info!(student_id = %student_id, "student deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(run_with_db(state, req, students_create)),
        "students.list" => Some(run_with_db(state, req, students_list)),
        "students.get" => Some(run_with_db(state, req, students_get)),
        "students.delete" => Some(run_with_db(state, req, students_delete)),
        _ => None,
    }
}
