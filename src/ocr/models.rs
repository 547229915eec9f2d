// Location of the ocrs detection/recognition models
use std::path::{Path, PathBuf};

use crate::config::classifier::APP_DIR;

pub const DETECTION_MODEL_URL: &str = "https://huggingface.co/robertknight/ocrs/resolve/main/text-detection.rten";
pub const RECOGNITION_MODEL_URL: &str = "https://huggingface.co/robertknight/ocrs/resolve/main/text-recognition.rten";

/// Overrides the model directory
pub const OCR_MODELS_ENV: &str = "AB_SHEET_OCR_MODELS";

const DETECTION_FILE: &str = "text-detection.rten";
const RECOGNITION_FILE: &str = "text-recognition.rten";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrModelPaths {
    pub detection: PathBuf,
    pub recognition: PathBuf,
}

impl OcrModelPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detection: dir.join(DETECTION_FILE),
            recognition: dir.join(RECOGNITION_FILE),
        }
    }

    /// `$AB_SHEET_OCR_MODELS`, else `<cache>/ab-sheet/ocr`
    pub fn resolve() -> Option<Self> {
        if let Some(dir) = std::env::var_os(OCR_MODELS_ENV) {
            return Some(Self::in_dir(Path::new(&dir)));
        }
        dirs::cache_dir().map(|cache| Self::in_dir(&cache.join(APP_DIR).join("ocr")))
    }

    /// Files that still need fetching, paired with where to get them
    pub fn missing(&self) -> Vec<(&Path, &'static str)> {
        let mut missing = Vec::new();
        if !self.detection.exists() {
            missing.push((self.detection.as_path(), DETECTION_MODEL_URL));
        }
        if !self.recognition.exists() {
            missing.push((self.recognition.as_path(), RECOGNITION_MODEL_URL));
        }
        missing
    }
}
