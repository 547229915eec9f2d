// Row grouping by vertical position and per-row label/value reading
use std::collections::HashMap;

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use tracing::{debug, warn};

use super::skills::{continues_label, identify_skill};
use super::symbols::{classify_token, ScoringMode, Verdict};
use super::TextToken;
use crate::config::rows::{
    DEFAULT_THRESHOLD, GAP_FACTOR, HEIGHT_FACTOR, MIN_GAP_THRESHOLD, MIN_HEIGHT_THRESHOLD, NOISE_PIXELS,
};
use crate::error::ExtractionWarning;
use crate::schema::{SessionValue, SKILL_AREAS};

/// Tokens sharing a baseline, ordered left to right
#[derive(Debug, Clone, Default)]
pub struct TextRow {
    pub tokens: Vec<TextToken>,
}

impl TextRow {
    pub fn mean_y(&self) -> f32 {
        self.tokens.iter().map(|t| t.y).sum::<f32>() / self.tokens.len().max(1) as f32
    }

    pub fn texts(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }
}

fn median(mut values: Vec<f32>) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by_key(|v| OrderedFloat(*v));
    Some(values[values.len() / 2])
}

/// Vertical join distance for a page of tokens.
///
/// Token height is the primary signal; the spacing between consecutive
/// centroids stands in when no token has a usable height.
pub fn row_threshold(tokens: &[TextToken]) -> f32 {
    let heights: Vec<f32> = tokens.iter().map(TextToken::height).filter(|h| *h > NOISE_PIXELS).collect();
    if let Some(m) = median(heights) {
        return (m * HEIGHT_FACTOR).max(MIN_HEIGHT_THRESHOLD);
    }

    let mut ys: Vec<f32> = tokens.iter().map(|t| t.y).collect();
    ys.sort_by_key(|y| OrderedFloat(*y));
    let gaps: Vec<f32> = ys.windows(2).map(|w| w[1] - w[0]).filter(|g| *g > NOISE_PIXELS).collect();
    match median(gaps) {
        Some(m) => (m * GAP_FACTOR).max(MIN_GAP_THRESHOLD),
        None => DEFAULT_THRESHOLD,
    }
}

/// Cluster tokens into rows, top to bottom.
///
/// Tokens are visited in Y order; each joins the open row while it lies within
/// the threshold of that row's running mean Y, otherwise it starts a new row.
pub fn group_rows(mut tokens: Vec<TextToken>) -> Vec<TextRow> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let threshold = row_threshold(&tokens);
    tokens.sort_by_key(|t| OrderedFloat(t.y));

    let mut rows = Vec::new();
    let mut current: Vec<TextToken> = Vec::new();
    let mut sum_y = 0.0f32;

    for token in tokens {
        if !current.is_empty() {
            let mean = sum_y / current.len() as f32;
            if (token.y - mean).abs() > threshold {
                rows.push(finish_row(std::mem::take(&mut current)));
                sum_y = 0.0;
            }
        }
        sum_y += token.y;
        current.push(token);
    }
    if !current.is_empty() {
        rows.push(finish_row(current));
    }

    debug!("{} rows at threshold {:.1}px", rows.len(), threshold);
    rows
}

fn finish_row(mut tokens: Vec<TextToken>) -> TextRow {
    tokens.sort_by_key(|t| OrderedFloat(t.x));
    TextRow { tokens }
}

/// The skill name a row was matched to and where its label ends
#[derive(Debug, Clone, PartialEq)]
pub struct RowLabel {
    pub skill: &'static str,
    /// Right edge of the last label token
    pub right_edge: f32,
}

/// First token, left to right, that names a skill; followed by any tokens that
/// spell further words of the same name.
pub fn identify_label(row: &TextRow) -> Option<RowLabel> {
    let (start, skill) = row
        .tokens
        .iter()
        .enumerate()
        .find_map(|(i, t)| identify_skill(&t.text).map(|skill| (i, skill)))?;

    let mut right_edge = row.tokens[start].max_x;
    for token in &row.tokens[start + 1..] {
        if !continues_label(&token.text, skill) {
            break;
        }
        right_edge = right_edge.max(token.max_x);
    }
    Some(RowLabel { skill, right_edge })
}

/// What one row yielded
#[derive(Debug, Clone)]
pub struct RowReading {
    pub label: Option<RowLabel>,
    pub values: Vec<SessionValue>,
    pub ambiguous: Vec<String>,
}

fn score_tokens<'a>(tokens: impl Iterator<Item = &'a TextToken>, mode: ScoringMode) -> (Vec<SessionValue>, Vec<String>) {
    let mut values = Vec::new();
    let mut ambiguous = Vec::new();
    for token in tokens {
        match classify_token(&token.text, mode) {
            Verdict::Mark(value) => values.push(value),
            Verdict::Ambiguous => ambiguous.push(token.text.clone()),
            Verdict::Rejected => {}
        }
    }
    (values, ambiguous)
}

/// Labelled rows score only tokens whose centre lies past the label (strict);
/// unlabelled rows score every token (aggressive).
pub fn read_row(row: &TextRow, label_margin: f32) -> RowReading {
    match identify_label(row) {
        Some(label) => {
            let origin = label.right_edge + label_margin;
            let (values, ambiguous) = score_tokens(row.tokens.iter().filter(|t| t.x > origin), ScoringMode::Strict);
            RowReading {
                label: Some(label),
                values,
                ambiguous,
            }
        }
        None => {
            let (values, ambiguous) = score_tokens(row.tokens.iter(), ScoringMode::Aggressive);
            RowReading {
                label: None,
                values,
                ambiguous,
            }
        }
    }
}

/// Skill to raw values for every skill the text path could place
#[derive(Debug, Clone, Default)]
pub struct TextReadout {
    pub values: HashMap<&'static str, Vec<SessionValue>>,
    pub warnings: Vec<ExtractionWarning>,
}

struct Queued {
    row_index: usize,
    values: Vec<SessionValue>,
    ambiguous: Vec<String>,
}

/// Read every row and place its values under a skill.
///
/// Labelled rows claim their skill. Rows without a usable label (or whose
/// skill was already claimed) are re-read aggressively and, if they carry any
/// mark, handed in order to the skills nobody claimed.
pub fn read_rows(rows: &[TextRow], label_margin: f32) -> TextReadout {
    let readings: Vec<RowReading> = rows.par_iter().map(|row| read_row(row, label_margin)).collect();

    let mut readout = TextReadout::default();
    let mut queue: Vec<Queued> = Vec::new();

    for (row_index, reading) in readings.into_iter().enumerate() {
        match reading.label {
            Some(label) if !readout.values.contains_key(label.skill) => {
                debug!("row {} -> {}: {} values", row_index, label.skill, reading.values.len());
                if !reading.ambiguous.is_empty() {
                    readout.warnings.push(ExtractionWarning::AmbiguousClassification {
                        skill: label.skill.to_string(),
                        tokens: reading.ambiguous,
                    });
                }
                readout.values.insert(label.skill, reading.values);
            }
            Some(label) => {
                warn!("row {} repeats {}, treating as unmatched", row_index, label.skill);
                readout.warnings.push(ExtractionWarning::DuplicateSkillRow {
                    row_index,
                    skill: label.skill.to_string(),
                });
                let origin = label.right_edge + label_margin;
                let (values, ambiguous) = score_tokens(
                    rows[row_index].tokens.iter().filter(|t| t.x > origin),
                    ScoringMode::Aggressive,
                );
                if !values.is_empty() {
                    queue.push(Queued { row_index, values, ambiguous });
                }
            }
            None => {
                debug!("row {} unlabelled: {:?}", row_index, rows[row_index].texts());
                if !reading.values.is_empty() {
                    queue.push(Queued {
                        row_index,
                        values: reading.values,
                        ambiguous: reading.ambiguous,
                    });
                }
            }
        }
    }

    let mut free = SKILL_AREAS.iter().filter(|s| !readout.values.contains_key(*s)).copied().collect::<Vec<_>>().into_iter();
    for row in queue {
        match free.next() {
            Some(skill) => {
                warn!("assigning unlabelled row {} to {}", row.row_index, skill);
                readout.warnings.push(ExtractionWarning::UnmatchedRow {
                    row_index: row.row_index,
                    assigned_to: skill.to_string(),
                    values: row.values.len(),
                });
                if !row.ambiguous.is_empty() {
                    readout.warnings.push(ExtractionWarning::AmbiguousClassification {
                        skill: skill.to_string(),
                        tokens: row.ambiguous,
                    });
                }
                readout.values.insert(skill, row.values);
            }
            None => {
                warn!("no free skill left for row {}", row.row_index);
                readout.warnings.push(ExtractionWarning::UnassignedRow {
                    row_index: row.row_index,
                    values: row.values.len(),
                });
            }
        }
    }

    readout
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::RecognizedText;
    use SessionValue::{A, B};

    fn token(text: &str, x: f32, y: f32) -> TextToken {
        // 12px tall, 8px per character
        let w = 8.0 * text.chars().count() as f32;
        TextToken::from_recognized(&RecognizedText::from_box(text, x, y - 6.0, x + w, y + 6.0, 0.9)).unwrap()
    }

    fn row(tokens: &[(&str, f32)], y: f32) -> Vec<TextToken> {
        tokens.iter().map(|(t, x)| token(t, *x, y)).collect()
    }

    #[test]
    fn threshold_from_heights_with_floor() {
        let tokens = row(&[("A", 0.0), ("B", 20.0)], 10.0);
        // median height 12 * 0.7 < 12
        assert_eq!(row_threshold(&tokens), 12.0);

        let tall: Vec<TextToken> = (0..3)
            .map(|i| {
                TextToken::from_recognized(&RecognizedText::from_box("A", i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 40.0, 1.0))
                    .unwrap()
            })
            .collect();
        assert!((row_threshold(&tall) - 28.0).abs() < 1e-3);
    }

    #[test]
    fn threshold_from_gaps_then_default() {
        let flat = |y: f32| TextToken::from_recognized(&RecognizedText::from_box("A", 0.0, y, 10.0, y + 2.0, 1.0)).unwrap();
        let tokens = vec![flat(0.0), flat(50.0), flat(100.0)];
        // gaps 50, 50 -> 30
        assert!((row_threshold(&tokens) - 30.0).abs() < 1e-3);
        assert_eq!(row_threshold(&[flat(0.0)]), DEFAULT_THRESHOLD);
    }

    #[test]
    fn tokens_cluster_by_running_mean() {
        let mut tokens = row(&[("Eating", 0.0), ("A", 100.0)], 50.0);
        tokens.push(token("B", 130.0, 55.0));
        tokens.extend(row(&[("Dressing", 0.0), ("B", 100.0)], 90.0));

        let rows = group_rows(tokens);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].texts(), vec!["Eating", "A", "B"]);
        assert_eq!(rows[1].texts(), vec!["Dressing", "B"]);
    }

    #[test]
    fn label_extends_over_following_name_words() {
        let r = finish_row(row(&[("Gross", 10.0), ("Motor", 60.0), ("A", 120.0)], 20.0));
        let label = identify_label(&r).unwrap();
        assert_eq!(label.skill, "Gross Motor");
        assert_eq!(label.right_edge, 100.0);
    }

    #[test]
    fn values_start_past_the_label() {
        // Row number "1" sits left of the label and must not become a mark
        let r = finish_row(row(&[("1", 0.0), ("Dressing", 20.0), ("8", 110.0), ("A", 140.0), ("?!", 170.0)], 20.0));
        let reading = read_row(&r, 5.0);
        assert_eq!(reading.label.unwrap().skill, "Dressing");
        assert_eq!(reading.values, vec![B, A]);
    }

    #[test]
    fn unlabelled_rows_fill_unclaimed_skills_in_order() {
        let mut tokens = row(&[("Gross", 0.0), ("Motor", 50.0), ("A", 120.0)], 20.0);
        tokens.extend(row(&[("??", 0.0), ("B", 120.0), ("B", 150.0)], 60.0));
        tokens.extend(row(&[("Eating", 0.0), ("A", 120.0)], 100.0));
        tokens.extend(row(&[("--", 0.0)], 140.0));

        let readout = read_rows(&group_rows(tokens), 5.0);
        assert_eq!(readout.values["Gross Motor"], vec![A]);
        assert_eq!(readout.values["Eating"], vec![A]);
        // First unclaimed skill is Fine Motor
        assert_eq!(readout.values["Fine Motor"], vec![B, B]);
        assert_eq!(readout.values.len(), 3);
        assert!(readout.warnings.iter().any(|w| matches!(
            w,
            ExtractionWarning::UnmatchedRow { row_index: 1, assigned_to, values: 2 } if assigned_to == "Fine Motor"
        )));
    }

    #[test]
    fn repeated_skill_goes_to_the_queue() {
        let mut tokens = row(&[("Eating", 0.0), ("A", 120.0)], 20.0);
        tokens.extend(row(&[("Eating", 0.0), ("B", 120.0)], 60.0));

        let readout = read_rows(&group_rows(tokens), 5.0);
        assert_eq!(readout.values["Eating"], vec![A]);
        assert_eq!(readout.values["Gross Motor"], vec![B]);
        assert!(readout
            .warnings
            .iter()
            .any(|w| matches!(w, ExtractionWarning::DuplicateSkillRow { row_index: 1, .. })));
    }
}
