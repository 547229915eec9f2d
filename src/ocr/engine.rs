// In-process text recognition with the ocrs engine
use std::path::Path;

use image::GrayImage;
use ocrs::{DimOrder, ImageSource, OcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use rten_tensor::{AsView, NdTensor};
use tracing::{debug, info};

use super::models::OcrModelPaths;
use super::{RecognizedText, TextRecognizer};
use crate::error::{Result, SheetError};

/// ocrs does not score words; every result carries this confidence
const WORD_CONFIDENCE: f32 = 1.0;

pub struct OcrsRecognizer {
    engine: OcrEngine,
}

impl OcrsRecognizer {
    /// Load both models. Missing files are reported with their download URL.
    pub fn load(paths: &OcrModelPaths) -> Result<Self> {
        if let Some((path, url)) = paths.missing().first() {
            return Err(SheetError::ModelLoad {
                path: path.to_path_buf(),
                reason: format!("not found, download it from {url}"),
            });
        }

        let detection_model = load_model(&paths.detection)?;
        let recognition_model = load_model(&paths.recognition)?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| SheetError::Recognition(e.to_string()))?;

        info!("ocrs engine ready");
        Ok(Self { engine })
    }
}

fn load_model(path: &Path) -> Result<Model> {
    let data = std::fs::read(path).map_err(|e| SheetError::ModelLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Model::load(data).map_err(|e| SheetError::ModelLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

impl TextRecognizer for OcrsRecognizer {
    fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedText>> {
        let (width, height) = image.dimensions();

        // CHW, one channel, [0, 1]
        let pixels: Vec<f32> = image.pixels().map(|p| p[0] as f32 / 255.0).collect();
        let tensor = NdTensor::from_data([1, height as usize, width as usize], pixels);

        let source = ImageSource::from_tensor(tensor.view(), DimOrder::Chw)
            .map_err(|e| SheetError::Recognition(e.to_string()))?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| SheetError::Recognition(e.to_string()))?;

        let words = self
            .engine
            .detect_words(&input)
            .map_err(|e| SheetError::Recognition(e.to_string()))?;
        let lines = self.engine.find_text_lines(&input, &words);
        let recognized = self
            .engine
            .recognize_text(&input, &lines)
            .map_err(|e| SheetError::Recognition(e.to_string()))?;

        let mut results = Vec::new();
        for line in recognized.into_iter().flatten() {
            for word in line.words() {
                let rect = word.bounding_rect();
                results.push(RecognizedText::from_box(
                    word.to_string(),
                    rect.left(),
                    rect.top(),
                    rect.right(),
                    rect.bottom(),
                    WORD_CONFIDENCE,
                ));
            }
        }

        debug!("ocrs: {} words on {}x{}", results.len(), width, height);
        Ok(results)
    }

    fn backend_name(&self) -> &str {
        "ocrs"
    }
}
