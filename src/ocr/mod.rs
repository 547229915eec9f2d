// Text-token path: recognizer adapters, row grouping, label matching, A/B scoring
#[cfg(feature = "ocr")]
pub mod engine;
pub mod models;
pub mod remote;
pub mod rows;
pub mod skills;
pub mod symbols;

#[cfg(feature = "ocr")]
pub use engine::OcrsRecognizer;
#[cfg(feature = "remote-ocr")]
pub use remote::HttpRecognizer;
pub use rows::{group_rows, read_rows, TextReadout, TextRow};
pub use symbols::{classify_token, ScoringMode, Verdict};

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One recognized string as returned by a recognition backend.
/// `polygon` is in the pixel space of the image that was submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
    pub polygon: Vec<[f32; 2]>,
}

impl RecognizedText {
    /// Axis-aligned box as a four-corner polygon
    pub fn from_box(text: impl Into<String>, left: f32, top: f32, right: f32, bottom: f32, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            polygon: vec![[left, top], [right, top], [right, bottom], [left, bottom]],
        }
    }
}

/// External text recognition collaborator. Called once per extraction with the
/// cropped table image.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedText>>;

    /// Get backend name for debugging
    fn backend_name(&self) -> &str;
}

/// Recognized text reduced to what row grouping needs: centroid and extents.
#[derive(Debug, Clone, PartialEq)]
pub struct TextToken {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub confidence: f32,
}

impl TextToken {
    /// `None` for blank text or a missing polygon
    pub fn from_recognized(item: &RecognizedText) -> Option<Self> {
        let text = item.text.trim();
        if text.is_empty() || item.polygon.is_empty() {
            return None;
        }

        let n = item.polygon.len() as f32;
        let xs = item.polygon.iter().map(|p| p[0]);
        let ys = item.polygon.iter().map(|p| p[1]);

        Some(Self {
            text: text.to_string(),
            x: xs.clone().sum::<f32>() / n,
            y: ys.clone().sum::<f32>() / n,
            min_x: xs.clone().fold(f32::INFINITY, f32::min),
            max_x: xs.fold(f32::NEG_INFINITY, f32::max),
            min_y: ys.clone().fold(f32::INFINITY, f32::min),
            max_y: ys.fold(f32::NEG_INFINITY, f32::max),
            confidence: item.confidence,
        })
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}
