//! Cohort ranking: per-student aggregate percentage, stable descending sort,
//! and fixed-size section bands.
//!
//! Everything here is pure. Reading the cohort and writing labels back lives in
//! `store`.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct CohortStudent {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultMarks {
    pub student_id: String,
    pub marks_obtained: f64,
    pub marks_max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredStudent {
    pub student_id: String,
    pub name: String,
    /// Percentage in `[0, 100]` for well-formed marks. Not rounded.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionAssignment {
    pub student_id: String,
    pub name: String,
    pub score: f64,
    pub section: String,
    /// 0-based position in rank order.
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCohort {
    pub assignments: Vec<SectionAssignment>,
    pub sections_created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankingError {
    #[error("band size must be at least 1")]
    ZeroBandSize,
    #[error("section labels must be non-empty")]
    BlankLabel,
    #[error("section label {0:?} appears more than once")]
    DuplicateLabel(String),
    #[error("section label {0:?} collides with the numbered overflow labels")]
    ReservedLabel(String),
}

/// Sums obtained/max marks per student and converts to a percentage.
///
/// Output order follows `students`. A student without records, or whose
/// records sum to a zero maximum, scores 0. Records for students not in the
/// list are ignored.
pub fn aggregate_scores(students: &[CohortStudent], results: &[ResultMarks]) -> Vec<ScoredStudent> {
    let mut totals: HashMap<&str, (f64, f64)> = HashMap::new();
    for r in results {
        let entry = totals.entry(r.student_id.as_str()).or_insert((0.0, 0.0));
        entry.0 += r.marks_obtained;
        entry.1 += r.marks_max;
    }

    students
        .iter()
        .map(|s| {
            let (obtained, max) = totals.get(s.id.as_str()).copied().unwrap_or((0.0, 0.0));
            ScoredStudent {
                student_id: s.id.clone(),
                name: s.name.clone(),
                score: percentage(obtained, max),
            }
        })
        .collect()
}

/// `obtained / max` as a percentage; 0 when `max` is not positive or either
/// sum is not finite.
pub fn percentage(obtained: f64, max: f64) -> f64 {
    if max <= 0.0 || !max.is_finite() || !obtained.is_finite() {
        return 0.0;
    }
    let pct = obtained / max * 100.0;
    if pct.is_finite() {
        pct
    } else {
        0.0
    }
}

/// Checks a label list before it is used for banding: every label must be
/// non-blank, distinct, and not of the `Section-N` overflow form, so that each
/// band maps to its own section.
pub fn validate_labels(labels: &[String]) -> Result<(), RankingError> {
    let mut seen = HashSet::new();
    for label in labels {
        if label.trim().is_empty() {
            return Err(RankingError::BlankLabel);
        }
        if is_overflow_label(label) {
            return Err(RankingError::ReservedLabel(label.clone()));
        }
        if !seen.insert(label.as_str()) {
            return Err(RankingError::DuplicateLabel(label.clone()));
        }
    }
    Ok(())
}

fn is_overflow_label(label: &str) -> bool {
    label
        .strip_prefix("Section-")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Label for the 0-based band index. Bands past the end of `labels` get
/// `Section-N`, N counting overflow bands from 1.
pub fn section_label(band: usize, labels: &[String]) -> String {
    match labels.get(band) {
        Some(label) => label.clone(),
        None => format!("Section-{}", band - labels.len() + 1),
    }
}

/// Ranks `scored` by descending score and slices the ranking into bands of
/// `band_size`. Equal scores keep their input order.
pub fn assign_sections(
    mut scored: Vec<ScoredStudent>,
    band_size: usize,
    labels: &[String],
) -> Result<RankedCohort, RankingError> {
    if band_size == 0 {
        return Err(RankingError::ZeroBandSize);
    }

    // slice::sort_by is stable.
    scored.sort_by(|a, b| rank_key(b.score).total_cmp(&rank_key(a.score)));

    let assignments: Vec<SectionAssignment> = scored
        .into_iter()
        .enumerate()
        .map(|(rank, s)| SectionAssignment {
            section: section_label(rank / band_size, labels),
            student_id: s.student_id,
            name: s.name,
            score: s.score,
            rank,
        })
        .collect();
    let sections_created = assignments
        .iter()
        .map(|a| a.section.as_str())
        .collect::<HashSet<_>>()
        .len();

    Ok(RankedCohort {
        assignments,
        sections_created,
    })
}

/// Total-order sort key: NaN ranks below every score and -0.0 ties with 0.0.
fn rank_key(score: f64) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        score + 0.0
    }
}

/// Display form: two decimals.
pub fn format_score(score: f64) -> String {
    format!("{:.2}", score)
}

pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
