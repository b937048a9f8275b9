use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    ensure_student, get_optional_str, get_required_bounded, get_required_str, run_with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::ranking::{percentage, round_2_decimals};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

/// Upper bound for a single `marksObtained`/`marksMax`. Keeps cohort sums
/// finite.
pub const MAX_MARKS: f64 = 1_000_000.0;

struct ResultRow {
    id: String,
    subject: String,
    marks_obtained: f64,
    marks_max: f64,
    exam_type: Option<String>,
}

fn list_results_for_student(conn: &Connection, student_id: &str) -> Result<Vec<ResultRow>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, subject, marks_obtained, marks_max, exam_type
             FROM results
             WHERE student_id = ?
             ORDER BY rowid",
        )
        .map_err(HandlerErr::query)?;
    stmt.query_map([student_id], |r| {
        Ok(ResultRow {
            id: r.get(0)?,
            subject: r.get(1)?,
            marks_obtained: r.get(2)?,
            marks_max: r.get(3)?,
            exam_type: r.get(4)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::query)
}

fn results_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let subject = get_required_str(params, "subject")?;
    let marks_obtained = get_required_bounded(params, "marksObtained", MAX_MARKS)?;
    let marks_max = get_required_bounded(params, "marksMax", MAX_MARKS)?;
    let exam_type = get_optional_str(params, "examType");
    ensure_student(conn, &student_id)?;

    let result_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO results(id, student_id, subject, marks_obtained, marks_max, exam_type, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &result_id,
            &student_id,
            &subject,
            marks_obtained,
            marks_max,
            &exam_type,
            &now,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "results" }))
    })?;

    tracing::info!(student_id = %student_id, subject = %subject, "result recorded");
    Ok(json!({ "resultId": result_id }))
}

fn results_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    ensure_student(conn, &student_id)?;
    let rows = list_results_for_student(conn, &student_id)?;
    let results: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "subject": r.subject,
                "marksObtained": r.marks_obtained,
                "marksMax": r.marks_max,
                "examType": r.exam_type,
            })
        })
        .collect();
    Ok(json!({ "results": results }))
}

fn results_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let result_id = get_required_str(params, "resultId")?;
    let deleted = conn
        .execute("DELETE FROM results WHERE id = ?", [&result_id])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string()).with_details(json!({ "table": "results" }))
        })?;
    if deleted == 0 {
        return Err(HandlerErr::not_found("result not found"));
    }
    Ok(json!({ "ok": true }))
}

/// Aggregate percentage over all records, overall and per subject, with CPI on
/// a 10-point scale. Subjects appear in first-recorded order.
fn results_cpi(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    ensure_student(conn, &student_id)?;
    let rows = list_results_for_student(conn, &student_id)?;

    let mut subjects: Vec<(String, f64, f64)> = Vec::new();
    let mut total_obtained = 0.0;
    let mut total_max = 0.0;
    for r in &rows {
        total_obtained += r.marks_obtained;
        total_max += r.marks_max;
        match subjects.iter_mut().find(|(s, _, _)| *s == r.subject) {
            Some(entry) => {
                entry.1 += r.marks_obtained;
                entry.2 += r.marks_max;
            }
            None => subjects.push((r.subject.clone(), r.marks_obtained, r.marks_max)),
        }
    }

    let overall = percentage(total_obtained, total_max);
    let subjects_json: Vec<serde_json::Value> = subjects
        .iter()
        .map(|(subject, obtained, max)| {
            json!({
                "subject": subject,
                "obtained": obtained,
                "max": max,
                "percentage": round_2_decimals(percentage(*obtained, *max)),
            })
        })
        .collect();

    Ok(json!({
        "studentId": student_id,
        "totalObtained": total_obtained,
        "totalMax": total_max,
        "percentage": round_2_decimals(overall),
        "cpi": round_2_decimals(overall / 10.0),
        "subjects": subjects_json,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.create" => Some(run_with_db(state, req, results_create)),
        "results.list" => Some(run_with_db(state, req, results_list)),
        "results.delete" => Some(run_with_db(state, req, results_delete)),
        "results.cpi" => Some(run_with_db(state, req, results_cpi)),
        _ => None,
    }
}
