use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_i64, get_optional_u64, get_required_str, require_db, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::ranking::{
    aggregate_scores, assign_sections, format_score, validate_labels, RankingError,
};
use crate::store;
use serde_json::json;

struct GenerateParams {
    department: String,
    year: String,
    band_size: usize,
    labels: Vec<String>,
    expected_generation: Option<i64>,
}

fn parse_generate_params(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<GenerateParams, HandlerErr> {
    let department = get_required_str(params, "department")?;
    let year = get_required_str(params, "year")?;
    let band_size = match get_optional_u64(params, "bandSize")? {
        Some(n) => usize::try_from(n).map_err(|_| HandlerErr::bad_params("bandSize too large"))?,
        None => state.config.sections.band_size,
    };
    let labels = match params.get("labels") {
        None => state.config.sections.labels.clone(),
        Some(v) if v.is_null() => state.config.sections.labels.clone(),
        Some(v) => {
            let arr = v
                .as_array()
                .ok_or_else(|| HandlerErr::bad_params("labels must be an array of strings"))?;
            arr.iter()
                .map(|l| {
                    l.as_str()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| HandlerErr::bad_params("labels must be non-empty strings"))
                })
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    validate_labels(&labels).map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let expected_generation = get_optional_i64(params, "expectedGeneration")?;
    Ok(GenerateParams {
        department,
        year,
        band_size,
        labels,
        expected_generation,
    })
}

fn sections_generate(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p = parse_generate_params(state, params)?;
    if p.band_size == 0 {
        return Err(HandlerErr::bad_params(RankingError::ZeroBandSize.to_string()));
    }
    let conn = require_db(state)?;

    let generation =
        store::cohort_generation(conn, &p.department, &p.year).map_err(HandlerErr::query)?;
    if let Some(expected) = p.expected_generation {
        if expected != generation {
            return Err(HandlerErr::new(
                "stale_generation",
                format!(
                    "cohort is at generation {}, caller expected {}",
                    generation, expected
                ),
            )
            .with_details(json!({
                "expectedGeneration": expected,
                "currentGeneration": generation
            })));
        }
    }

    let students =
        store::cohort_students(conn, &p.department, &p.year).map_err(HandlerErr::query)?;
    if students.is_empty() {
        return Err(HandlerErr::not_found(format!(
            "no students found for department {} year {}",
            p.department, p.year
        )));
    }
    let results = store::cohort_results(conn, &p.department, &p.year).map_err(HandlerErr::query)?;

    let scored = aggregate_scores(&students, &results);
    let ranked = assign_sections(scored, p.band_size, &p.labels)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;

    let new_generation = store::write_sections(
        conn,
        &p.department,
        &p.year,
        generation,
        &ranked.assignments,
    )?;

    tracing::info!(
        department = %p.department,
        year = %p.year,
        students = ranked.assignments.len(),
        sections = ranked.sections_created,
        generation = new_generation,
        "sections generated"
    );

    let details: Vec<serde_json::Value> = ranked
        .assignments
        .iter()
        .map(|a| {
            json!({
                "studentId": a.student_id,
                "name": a.name,
                "score": format_score(a.score),
                "section": a.section,
                "rank": a.rank + 1,
            })
        })
        .collect();

    Ok(json!({
        "message": format!(
            "Assigned {} students to {} sections",
            ranked.assignments.len(),
            ranked.sections_created
        ),
        "totalStudents": ranked.assignments.len(),
        "sectionsCreated": ranked.sections_created,
        "generation": new_generation,
        "details": details,
    }))
}

/// Ordering for section groups: configured labels in configured order, then
/// overflow labels by number, then anything else by name, unlabeled last.
fn group_sort_key(section: Option<&str>, labels: &[String]) -> (u8, usize, String) {
    let Some(s) = section else {
        return (3, 0, String::new());
    };
    if let Some(idx) = labels.iter().position(|l| l == s) {
        return (0, idx, String::new());
    }
    if let Some(n) = s
        .strip_prefix("Section-")
        .and_then(|n| n.parse::<usize>().ok())
    {
        return (1, n, String::new());
    }
    (2, 0, s.to_string())
}

fn sections_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let department = get_required_str(params, "department")?;
    let year = get_required_str(params, "year")?;
    let conn = require_db(state)?;
    let generation = store::cohort_generation(conn, &department, &year).map_err(HandlerErr::query)?;

    let mut stmt = conn
        .prepare(
            "SELECT id, name, section
             FROM students
             WHERE department = ? AND year = ?
             ORDER BY rowid",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map((&department, &year), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let mut groups: Vec<(Option<String>, Vec<serde_json::Value>)> = Vec::new();
    for (id, name, section) in rows {
        let entry = json!({ "id": id, "name": name });
        match groups.iter_mut().find(|(s, _)| *s == section) {
            Some((_, members)) => members.push(entry),
            None => groups.push((section, vec![entry])),
        }
    }
    let labels = &state.config.sections.labels;
    groups.sort_by_key(|(s, _)| group_sort_key(s.as_deref(), labels));

    let sections: Vec<serde_json::Value> = groups
        .into_iter()
        .map(|(section, students)| json!({ "section": section, "students": students }))
        .collect();
    Ok(json!({
        "department": department,
        "year": year,
        "generation": generation,
        "sections": sections,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sections.generate" => Some(respond(req, sections_generate(state, &req.params))),
        "sections.list" => Some(respond(req, sections_list(state, &req.params))),
        _ => None,
    }
}
