// Stage orchestration: one request in, one 18 x 20 result out
use std::collections::HashMap;
use std::sync::Arc;

use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::segment::{COLS, ROWS};
use crate::config::ExtractionConfig;
use crate::diagnostics::DiagnosticSink;
use crate::error::{ExtractionWarning, Result, SheetError};
use crate::ml::CellClassifier;
use crate::ocr::{group_rows, read_rows, TextRecognizer, TextToken};
use crate::reconcile::{assemble_rows, fit_to_sessions};
use crate::schema::{SessionValue, SheetIdentity, SkillRow, SKILL_AREAS};
use crate::table::{Envelope, ExtractionResult, GridReport, Method};
use crate::vision::{crop, dynamic_grid, fixed_grid, locate_table, normalize, Grid};

/// How session values are read off the table region
#[derive(Clone)]
pub enum Strategy {
    /// Recognize text over the table, group it into rows and classify tokens
    HeuristicText { recognizer: Arc<dyn TextRecognizer> },
    /// Cut a fixed 18 x 20 grid and score every cell with the network
    LearnedGrid { classifier: Arc<dyn CellClassifier> },
}

impl Strategy {
    pub fn method(&self) -> Method {
        match self {
            Strategy::HeuristicText { .. } => Method::DynamicTextOcr,
            Strategy::LearnedGrid { .. } => Method::FixedGridClassifier,
        }
    }

    pub fn backend_name(&self) -> &str {
        match self {
            Strategy::HeuristicText { recognizer } => recognizer.backend_name(),
            Strategy::LearnedGrid { classifier } => classifier.backend_name(),
        }
    }
}

/// Reusable across requests; all per-request state lives inside `run`.
pub struct Extractor {
    config: ExtractionConfig,
    strategy: Strategy,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl Extractor {
    pub fn new(config: ExtractionConfig, strategy: Strategy) -> Self {
        Self {
            config,
            strategy,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Run every stage, propagating the first fatal fault.
    pub fn run(&self, bytes: &[u8]) -> Result<ExtractionResult> {
        self.config.validate().map_err(SheetError::InvalidConfig)?;

        let normalized = normalize(bytes, &self.config)?;
        self.stage("normalized", &normalized.gray);

        let table = locate_table(&normalized, &self.config)?;
        self.stage("table", &table.image);

        let mut warnings = Vec::new();
        let (rows, skills_found, grid) = match &self.strategy {
            Strategy::LearnedGrid { classifier } => self.read_grid(&table.image, classifier.as_ref())?,
            Strategy::HeuristicText { recognizer } => {
                self.read_text(&table.image, recognizer.as_ref(), &mut warnings)?
            }
        };

        info!(
            "extracted {} of {} skills via {} ({} warnings)",
            skills_found.len(),
            SKILL_AREAS.len(),
            self.strategy.backend_name(),
            warnings.len()
        );

        Ok(ExtractionResult {
            method: self.strategy.method(),
            rows,
            skills_found,
            detection: table.detection,
            grid: GridReport {
                mode: grid.mode,
                cell_count: grid.cells.len(),
                lines: grid.lines,
            },
            warnings,
        })
    }

    /// Never fails: any fault becomes a failure envelope.
    pub fn extract(&self, bytes: &[u8], identity: &SheetIdentity) -> Envelope {
        match self.run(bytes) {
            Ok(result) => Envelope::success(result, identity),
            Err(e) => {
                warn!("extraction failed: {}", e);
                Envelope::failure(e)
            }
        }
    }

    fn stage(&self, name: &str, image: &GrayImage) {
        if let Some(sink) = &self.sink {
            sink.stage(name, image);
        }
    }

    fn dump_cells(&self, table: &GrayImage, grid: &Grid) {
        let Some(sink) = &self.sink else {
            return;
        };
        for cell in &grid.cells {
            sink.cell(cell.row, cell.col, &crop(table, cell.sample_region()));
        }
    }

    fn read_grid(
        &self,
        table: &GrayImage,
        classifier: &dyn CellClassifier,
    ) -> Result<(Vec<SkillRow>, Vec<&'static str>, Grid)> {
        let (w, h) = table.dimensions();
        let grid = fixed_grid(w, h, &self.config)?;

        let crops: Vec<GrayImage> = grid
            .cells
            .par_iter()
            .map(|cell| crop(table, cell.sample_region()))
            .collect();
        if let Some(sink) = &self.sink {
            for (cell, image) in grid.cells.iter().zip(&crops) {
                sink.cell(cell.row, cell.col, image);
            }
        }

        let values = classifier.classify_batch(&crops)?;
        debug!("classified {} cells with {}", values.len(), classifier.backend_name());
        if values.len() != ROWS * COLS {
            return Err(SheetError::Inference(candle_core::Error::Msg(format!(
                "{} returned {} values for {} cells",
                classifier.backend_name(),
                values.len(),
                ROWS * COLS
            ))));
        }

        let rows: Vec<SkillRow> = SKILL_AREAS
            .iter()
            .zip(values.chunks(COLS))
            .map(|(&skill, chunk)| SkillRow {
                skill,
                values: fit_to_sessions(chunk),
            })
            .collect();
        let found = rows.iter().filter(|r| r.has_marks()).map(|r| r.skill).collect();

        Ok((rows, found, grid))
    }

    fn read_text(
        &self,
        table: &GrayImage,
        recognizer: &dyn TextRecognizer,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Result<(Vec<SkillRow>, Vec<&'static str>, Grid)> {
        let grid = dynamic_grid(table, &self.config, warnings);
        self.dump_cells(table, &grid);

        let recognized = recognizer.recognize(table)?;
        let tokens: Vec<TextToken> = recognized.iter().filter_map(TextToken::from_recognized).collect();
        debug!("{} of {} recognized items usable as tokens", tokens.len(), recognized.len());

        let text_rows = group_rows(tokens);
        let readout = read_rows(&text_rows, self.config.label_margin);
        warnings.extend(readout.warnings);

        let found: HashMap<&'static str, Vec<SessionValue>> = readout
            .values
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .collect();
        let skills_found = SKILL_AREAS.iter().copied().filter(|s| found.contains_key(s)).collect();

        Ok((assemble_rows(&found), skills_found, grid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::RecognizedText;
    use image::{ImageFormat, Luma};
    use std::io::Cursor;

    struct AlwaysA;

    impl CellClassifier for AlwaysA {
        fn classify(&self, _crop: &GrayImage) -> Result<SessionValue> {
            Ok(SessionValue::A)
        }

        fn backend_name(&self) -> &str {
            "always-a"
        }
    }

    /// Loses part of every batch
    struct Truncating;

    impl CellClassifier for Truncating {
        fn classify_batch(&self, crops: &[GrayImage]) -> Result<Vec<SessionValue>> {
            Ok(vec![SessionValue::A; crops.len() / 2])
        }

        fn classify(&self, _crop: &GrayImage) -> Result<SessionValue> {
            Ok(SessionValue::A)
        }

        fn backend_name(&self) -> &str {
            "truncating"
        }
    }

    struct Silent;

    impl TextRecognizer for Silent {
        fn recognize(&self, _image: &GrayImage) -> Result<Vec<RecognizedText>> {
            Ok(Vec::new())
        }

        fn backend_name(&self) -> &str {
            "silent"
        }
    }

    fn blank_png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        GrayImage::from_pixel(width, height, Luma([255]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn grid_strategy_fills_every_cell() {
        let extractor = Extractor::new(
            ExtractionConfig::default(),
            Strategy::LearnedGrid {
                classifier: Arc::new(AlwaysA),
            },
        );
        let result = extractor.run(&blank_png(900, 700)).unwrap();

        assert_eq!(result.method, Method::FixedGridClassifier);
        assert_eq!(result.rows.len(), 18);
        assert!(result.rows.iter().all(|r| r.tally().a == 20));
        assert_eq!(result.skills_found.len(), 18);
        assert_eq!(result.grid.cell_count, 360);
    }

    #[test]
    fn text_strategy_without_tokens_is_still_a_full_table() {
        let extractor = Extractor::new(
            ExtractionConfig::default(),
            Strategy::HeuristicText {
                recognizer: Arc::new(Silent),
            },
        );
        let result = extractor.run(&blank_png(900, 700)).unwrap();

        assert_eq!(result.method, Method::DynamicTextOcr);
        assert_eq!(result.rows.len(), 18);
        assert!(result.rows.iter().all(|r| !r.has_marks()));
        assert!(result.skills_found.is_empty());
        assert!(result.grid.lines.is_some());
    }

    #[test]
    fn undecodable_bytes_become_a_failure_envelope() {
        let extractor = Extractor::new(
            ExtractionConfig::default(),
            Strategy::HeuristicText {
                recognizer: Arc::new(Silent),
            },
        );
        let envelope = extractor.extract(b"not an image", &SheetIdentity::default());
        assert!(!envelope.is_success());
    }

    #[test]
    fn short_classifier_output_is_an_inference_error() {
        let extractor = Extractor::new(
            ExtractionConfig::default(),
            Strategy::LearnedGrid {
                classifier: Arc::new(Truncating),
            },
        );
        let err = extractor.run(&blank_png(900, 700)).unwrap_err();

        assert!(matches!(err, SheetError::Inference(_)));
        assert!(err.to_string().contains("180 values for 360 cells"));
    }

    #[test]
    fn detection_keeps_the_upload_size_after_downscaling() {
        let extractor = Extractor::new(
            ExtractionConfig::default(),
            Strategy::LearnedGrid {
                classifier: Arc::new(AlwaysA),
            },
        );
        let result = extractor.run(&blank_png(3000, 1500)).unwrap();

        assert_eq!(result.detection.original_size, [3000, 1500]);
        assert!(result.detection.cropped_size[0] <= 1500);
    }

    #[test]
    fn unusable_settings_fail_before_any_image_work() {
        let config = ExtractionConfig {
            clahe_tiles: 0,
            ..ExtractionConfig::default()
        };
        let extractor = Extractor::new(
            config,
            Strategy::LearnedGrid {
                classifier: Arc::new(AlwaysA),
            },
        );

        let err = extractor.run(&blank_png(900, 700)).unwrap_err();
        assert!(matches!(err, SheetError::InvalidConfig(_)));
        assert!(err.to_string().contains("clahe_tiles"));

        let envelope = extractor.extract(&blank_png(900, 700), &SheetIdentity::default());
        assert!(!envelope.is_success());
    }
}
