// Configuration constants and runtime settings for the sheet extractor
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SheetError};

/// Image normalization
pub mod normalize {
    pub const MAX_DIMENSION: u32 = 1500; // Longer side ceiling, never upscaled
    pub const CLAHE_TILES: u32 = 8;
    pub const CLAHE_CLIP_LIMIT: f32 = 2.0;
}

/// Table localization
pub mod locate {
    pub const CANNY_LOW: f32 = 50.0;
    pub const CANNY_HIGH: f32 = 150.0;
    pub const LINE_KERNEL: u32 = 40; // Wide-flat / tall-thin closing element length
    pub const MIN_TABLE_AREA_FRACTION: f32 = 0.10;
    pub const CROP_PADDING: u32 = 10;
    pub const FALLBACK_LEFT_FRACTION: f32 = 0.15; // Skip skill labels
    pub const FALLBACK_TOP_FRACTION: f32 = 0.15; // Skip headers
}

/// Grid geometry
pub mod segment {
    pub const ROWS: usize = 18;
    pub const COLS: usize = 20;

    /// Sampling band: 70% of cell height centred 40% from the top
    pub const BAND_HEIGHT_FRACTION: f32 = 0.70;
    pub const BAND_CENTER_FRACTION: f32 = 0.40;
    /// Sampling band: 60% of cell width around the midpoint
    pub const BAND_WIDTH_FRACTION: f32 = 0.60;

    pub const LINE_BINARIZE_THRESHOLD: u8 = 200;
    pub const H_KERNEL_DIVISOR: u32 = 25;
    pub const V_KERNEL_DIVISOR: u32 = 20;
    pub const OPEN_ITERATIONS: u32 = 2;
    pub const MIN_LINE_LENGTH_FRACTION: f32 = 0.30;
    pub const LINE_MERGE_TOLERANCE: u32 = 3;
}

/// Text row grouping and label matching
pub mod rows {
    pub const HEIGHT_FACTOR: f32 = 0.7;
    pub const MIN_HEIGHT_THRESHOLD: f32 = 12.0;
    pub const GAP_FACTOR: f32 = 0.6;
    pub const MIN_GAP_THRESHOLD: f32 = 20.0;
    pub const NOISE_PIXELS: f32 = 5.0; // Heights/gaps at or below this are ignored
    pub const DEFAULT_THRESHOLD: f32 = 15.0;
    pub const LABEL_MARGIN: f32 = 5.0;
}

/// Heuristic symbol scoring
pub mod symbols {
    pub const MAX_TOKEN_LEN: usize = 8;
    pub const STRICT_MARGIN: f32 = 0.2;
    pub const AGGRESSIVE_MARGIN: f32 = 0.1;
    pub const AGGRESSIVE_FLOOR: f32 = 0.3;
    pub const LEADING_BONUS: f32 = 0.3;
}

/// Learned cell classifier
pub mod classifier {
    pub const INPUT_SIZE: usize = 28;
    pub const NORMALIZE_MEAN: f32 = 0.5;
    pub const NORMALIZE_STD: f32 = 0.5;
    /// P(B) at or above this is "B". Tuned on held-out crops, not 0.5.
    pub const DECISION_THRESHOLD: f32 = 0.4;
    pub const WEIGHTS_ENV: &str = "AB_SHEET_WEIGHTS";
    pub const WEIGHTS_FILE: &str = "ab_classifier.safetensors";
    pub const APP_DIR: &str = "ab-sheet";
}

/// Runtime knobs for one extractor. Every field defaults to the constants above,
/// so a JSON file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub max_dimension: u32,
    pub clahe_tiles: u32,
    pub clahe_clip_limit: f32,

    pub canny_low: f32,
    pub canny_high: f32,
    pub line_kernel: u32,
    pub min_table_area_fraction: f32,
    pub crop_padding: u32,
    pub fallback_left_fraction: f32,
    pub fallback_top_fraction: f32,

    pub band_height_fraction: f32,
    pub band_center_fraction: f32,
    pub band_width_fraction: f32,
    pub line_binarize_threshold: u8,
    pub min_line_length_fraction: f32,
    pub line_merge_tolerance: u32,

    pub label_margin: f32,
    pub decision_threshold: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_dimension: normalize::MAX_DIMENSION,
            clahe_tiles: normalize::CLAHE_TILES,
            clahe_clip_limit: normalize::CLAHE_CLIP_LIMIT,
            canny_low: locate::CANNY_LOW,
            canny_high: locate::CANNY_HIGH,
            line_kernel: locate::LINE_KERNEL,
            min_table_area_fraction: locate::MIN_TABLE_AREA_FRACTION,
            crop_padding: locate::CROP_PADDING,
            fallback_left_fraction: locate::FALLBACK_LEFT_FRACTION,
            fallback_top_fraction: locate::FALLBACK_TOP_FRACTION,
            band_height_fraction: segment::BAND_HEIGHT_FRACTION,
            band_center_fraction: segment::BAND_CENTER_FRACTION,
            band_width_fraction: segment::BAND_WIDTH_FRACTION,
            line_binarize_threshold: segment::LINE_BINARIZE_THRESHOLD,
            min_line_length_fraction: segment::MIN_LINE_LENGTH_FRACTION,
            line_merge_tolerance: segment::LINE_MERGE_TOLERANCE,
            label_margin: rows::LABEL_MARGIN,
            decision_threshold: classifier::DECISION_THRESHOLD,
        }
    }
}

impl ExtractionConfig {
    /// Load overrides from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| SheetError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate().map_err(|reason| SheetError::Config {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot honour
    pub fn validate(&self) -> std::result::Result<(), String> {
        let fractions = [
            ("min_table_area_fraction", self.min_table_area_fraction),
            ("fallback_left_fraction", self.fallback_left_fraction),
            ("fallback_top_fraction", self.fallback_top_fraction),
            ("band_height_fraction", self.band_height_fraction),
            ("band_center_fraction", self.band_center_fraction),
            ("band_width_fraction", self.band_width_fraction),
            ("min_line_length_fraction", self.min_line_length_fraction),
            ("decision_threshold", self.decision_threshold),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within 0..=1, got {value}"));
            }
        }
        if self.fallback_left_fraction >= 1.0 || self.fallback_top_fraction >= 1.0 {
            return Err("fallback crop would be empty".to_string());
        }
        if self.max_dimension == 0 || self.clahe_tiles == 0 || self.line_kernel == 0 {
            return Err("max_dimension, clahe_tiles and line_kernel must be non-zero".to_string());
        }
        if self.canny_low > self.canny_high {
            return Err("canny_low must not exceed canny_high".to_string());
        }
        Ok(())
    }
}
