// Error taxonomy for the extraction pipeline
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SheetError>;

/// Fatal faults. Any of these aborts the current extraction; the pipeline entry
/// point turns them into a failure envelope.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("could not decode image bytes: {0}")]
    Decode(#[from] image::ImageError),

    #[error("table crop is empty ({width}x{height})")]
    EmptyCrop { width: u32, height: u32 },

    #[error("failed to load classifier weights from {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("text recognition failed: {0}")]
    Recognition(String),

    #[error("classifier inference failed: {0}")]
    Inference(#[from] candle_core::Error),

    #[error("unusable training data at {}: {reason}", path.display())]
    Dataset { path: PathBuf, reason: String },

    #[error("invalid configuration in {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Non-fatal events recovered inside the pipeline, reported alongside the result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionWarning {
    /// A text row had no recognisable label and was assigned to a skill with no match.
    UnmatchedRow {
        row_index: usize,
        assigned_to: String,
        values: usize,
    },
    /// A text row carried A/B candidates but no free skill was left to receive it.
    UnassignedRow { row_index: usize, values: usize },
    /// A second row matched a skill that was already taken.
    DuplicateSkillRow { row_index: usize, skill: String },
    /// Tokens in the data area that resolved to neither A nor B.
    AmbiguousClassification { skill: String, tokens: Vec<String> },
    /// The dynamic segmenter could not see enough ruled lines on an axis.
    SegmentationFallback { axis: String, detected: usize },
}
