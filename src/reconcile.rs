// Fit raw per-skill values into the fixed 18 x 20 shape and tally them
use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::schema::{SessionValue, SkillRow, SESSIONS, SKILL_AREAS};

/// Pad with Empty or truncate to exactly 20. Gaps are never inferred.
pub fn fit_to_sessions(values: &[SessionValue]) -> [SessionValue; SESSIONS] {
    if values.len() > SESSIONS {
        debug!("dropping {} values past session {}", values.len() - SESSIONS, SESSIONS);
    }
    let mut out = [SessionValue::Empty; SESSIONS];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = *value;
    }
    out
}

/// All 18 rows in printed order; skills with nothing found stay Empty.
pub fn assemble_rows(found: &HashMap<&'static str, Vec<SessionValue>>) -> Vec<SkillRow> {
    SKILL_AREAS
        .iter()
        .map(|&skill| match found.get(skill) {
            Some(values) => SkillRow {
                skill,
                values: fit_to_sessions(values),
            },
            None => SkillRow::empty(skill),
        })
        .collect()
}

/// Whole-sheet counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub total_cells: usize,
    pub total_a: usize,
    pub total_b: usize,
    pub total_empty: usize,
    pub skills_found: Vec<String>,
}

pub fn summarize(rows: &[SkillRow], skills_found: &[&str]) -> ExtractionSummary {
    let mut summary = ExtractionSummary {
        total_cells: rows.len() * SESSIONS,
        total_a: 0,
        total_b: 0,
        total_empty: 0,
        skills_found: skills_found.iter().map(|s| s.to_string()).collect(),
    };
    for row in rows {
        let tally = row.tally();
        summary.total_a += tally.a;
        summary.total_b += tally.b;
        summary.total_empty += tally.empty;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionValue::{Empty, A, B};

    #[test]
    fn short_rows_are_padded_not_inferred() {
        let fitted = fit_to_sessions(&[A, B, A]);
        assert_eq!(&fitted[..3], &[A, B, A]);
        assert!(fitted[3..].iter().all(|v| *v == Empty));
    }

    #[test]
    fn long_rows_are_truncated() {
        let fitted = fit_to_sessions(&[B; 27]);
        assert_eq!(fitted.len(), SESSIONS);
        assert!(fitted.iter().all(|v| *v == B));
    }

    #[test]
    fn always_eighteen_rows_in_order() {
        let rows = assemble_rows(&HashMap::new());
        let names: Vec<&str> = rows.iter().map(|r| r.skill).collect();
        assert_eq!(names, SKILL_AREAS.to_vec());
        assert!(rows.iter().all(|r| !r.has_marks()));
    }

    #[test]
    fn summary_counts_every_cell() {
        let found = HashMap::from([("Money", vec![A, A, B]), ("Eating", vec![B])]);
        let rows = assemble_rows(&found);
        let summary = summarize(&rows, &["Eating", "Money"]);

        assert_eq!(summary.total_cells, 360);
        assert_eq!((summary.total_a, summary.total_b), (2, 2));
        assert_eq!(summary.total_a + summary.total_b + summary.total_empty, 360);
        assert_eq!(summary.skills_found, vec!["Eating", "Money"]);
        for row in &rows {
            assert_eq!(row.tally().total(), SESSIONS);
        }
    }
}
