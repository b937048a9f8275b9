use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{ensure_student, get_required_str, run_with_db};
use crate::ipc::types::{AppState, Request};
use crate::ranking::{percentage, round_2_decimals};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))
}

fn attendance_mark(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let subject = get_required_str(params, "subject")?;
    let date = parse_date(&get_required_str(params, "date")?)?;
    let present = params
        .get("present")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params("missing present"))?;
    ensure_student(conn, &student_id)?;

    let date_key = date.format("%Y-%m-%d").to_string();
    conn.execute(
        "INSERT INTO attendance(student_id, subject, date, present)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, subject, date) DO UPDATE SET
           present = excluded.present",
        (&student_id, &subject, &date_key, present as i64),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "attendance" }))
    })?;
    Ok(json!({ "ok": true }))
}

fn attendance_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    ensure_student(conn, &student_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT subject, COUNT(*), COALESCE(SUM(present), 0)
             FROM attendance
             WHERE student_id = ?
             GROUP BY subject
             ORDER BY subject",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([&student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let mut total = 0i64;
    let mut present = 0i64;
    let subjects: Vec<serde_json::Value> = rows
        .iter()
        .map(|(subject, n, p)| {
            total += n;
            present += p;
            json!({
                "subject": subject,
                "total": n,
                "present": p,
                "percentage": round_2_decimals(percentage(*p as f64, *n as f64)),
            })
        })
        .collect();

    Ok(json!({
        "studentId": student_id,
        "total": total,
        "present": present,
        "percentage": round_2_decimals(percentage(present as f64, total as f64)),
        "subjects": subjects,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(run_with_db(state, req, attendance_mark)),
        "attendance.summary" => Some(run_with_db(state, req, attendance_summary)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_iso_days_only() {
        assert!(parse_date("2026-02-28").is_ok());
        assert!(parse_date(" 2024-02-29 ").is_ok());
        assert!(parse_date("2026-02-29").is_err());
        assert!(parse_date("28/02/2026").is_err());
    }
}
