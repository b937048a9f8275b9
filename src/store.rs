use crate::ranking::{CohortStudent, ResultMarks, SectionAssignment};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("cohort generation moved from {expected}; another writer updated this cohort")]
    StaleGeneration { expected: i64 },
    #[error("cohort membership changed since it was ranked ({ranked} ranked, {current} now)")]
    CohortChanged { ranked: usize, current: usize },
}

/// Students of one department/year in insertion order. That order is the
/// tie-break for equal scores.
pub fn cohort_students(
    conn: &Connection,
    department: &str,
    year: &str,
) -> Result<Vec<CohortStudent>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name
         FROM students
         WHERE department = ? AND year = ?
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map((department, year), |r| {
            Ok(CohortStudent {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn cohort_results(
    conn: &Connection,
    department: &str,
    year: &str,
) -> Result<Vec<ResultMarks>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT r.student_id, r.marks_obtained, r.marks_max
         FROM results r
         JOIN students s ON s.id = r.student_id
         WHERE s.department = ? AND s.year = ?
         ORDER BY r.rowid",
    )?;
    let rows = stmt
        .query_map((department, year), |r| {
            Ok(ResultMarks {
                student_id: r.get(0)?,
                marks_obtained: r.get(1)?,
                marks_max: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Current generation counter for a cohort; 0 when sections were never
/// generated.
pub fn cohort_generation(conn: &Connection, department: &str, year: &str) -> Result<i64, StoreError> {
    let g: Option<i64> = conn
        .query_row(
            "SELECT generation FROM cohort_generations WHERE department = ? AND year = ?",
            (department, year),
            |r| r.get(0),
        )
        .optional()?;
    Ok(g.unwrap_or(0))
}

/// Writes every assignment's section label in one batch.
///
/// The batch only commits if the cohort generation still equals
/// `read_generation`; the counter is bumped in the same transaction. Returns the
/// new generation.
///
/// `assignments` must cover the whole cohort. The transaction takes the write
/// lock up front and re-checks membership: a student added to or removed from
/// the cohort after it was read fails the batch with `CohortChanged` instead of
/// leaving that student without a section.
pub fn write_sections(
    conn: &Connection,
    department: &str,
    year: &str,
    read_generation: i64,
    assignments: &[SectionAssignment],
) -> Result<i64, StoreError> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    tx.execute(
        "INSERT OR IGNORE INTO cohort_generations(department, year, generation)
         VALUES(?, ?, 0)",
        (department, year),
    )?;
    let bumped = tx.execute(
        "UPDATE cohort_generations
         SET generation = generation + 1
         WHERE department = ? AND year = ? AND generation = ?",
        (department, year, read_generation),
    )?;
    if bumped == 0 {
        // Dropping the transaction rolls it back.
        return Err(StoreError::StaleGeneration {
            expected: read_generation,
        });
    }

    let current: i64 = tx.query_row(
        "SELECT COUNT(*) FROM students WHERE department = ? AND year = ?",
        (department, year),
        |r| r.get(0),
    )?;
    let current = usize::try_from(current).unwrap_or(usize::MAX);
    if current != assignments.len() {
        return Err(StoreError::CohortChanged {
            ranked: assignments.len(),
            current,
        });
    }

    let now = chrono::Utc::now().to_rfc3339();
    {
        let mut stmt = tx.prepare(
            "UPDATE students
             SET section = ?, updated_at = ?
             WHERE id = ? AND department = ? AND year = ?",
        )?;
        for a in assignments {
            // Same count but a different member set shows up as a miss here.
            if stmt.execute((&a.section, &now, &a.student_id, department, year))? == 0 {
                return Err(StoreError::CohortChanged {
                    ranked: assignments.len(),
                    current,
                });
            }
        }
    }
    tx.commit()?;

    Ok(read_generation + 1)
}
