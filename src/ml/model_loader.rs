// Classifier weight location, validation and loading
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use safetensors::SafeTensors;
use serde::Serialize;
use tracing::debug;

use crate::config::classifier::{APP_DIR, WEIGHTS_ENV, WEIGHTS_FILE};
use crate::error::{Result, SheetError};

/// Tensors the network reads; anything else in the file is ignored.
pub const REQUIRED_TENSORS: &[&str] = &[
    "features.0.weight",
    "features.0.bias",
    "features.1.weight",
    "features.1.bias",
    "features.1.running_mean",
    "features.1.running_var",
    "features.4.weight",
    "features.4.bias",
    "features.5.weight",
    "features.5.bias",
    "features.5.running_mean",
    "features.5.running_var",
    "features.8.weight",
    "features.8.bias",
    "features.9.weight",
    "features.9.bias",
    "features.9.running_mean",
    "features.9.running_var",
    "classifier.1.weight",
    "classifier.1.bias",
    "classifier.4.weight",
    "classifier.4.bias",
];

pub struct ModelPaths {
    pub model_dir: PathBuf,
    pub weights_path: PathBuf,
}

impl ModelPaths {
    /// `$AB_SHEET_WEIGHTS`, else `<data_dir>/ab-sheet/ab_classifier.safetensors`
    pub fn resolve() -> Option<Self> {
        if let Some(path) = std::env::var_os(WEIGHTS_ENV) {
            let weights_path = PathBuf::from(path);
            let model_dir = weights_path.parent().map(Path::to_path_buf).unwrap_or_default();
            return Some(Self {
                model_dir,
                weights_path,
            });
        }
        let model_dir = dirs::data_dir()?.join(APP_DIR);
        Some(Self {
            weights_path: model_dir.join(WEIGHTS_FILE),
            model_dir,
        })
    }

    pub fn exists(&self) -> bool {
        self.weights_path.exists()
    }
}

/// One entry of a weights file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorInfo {
    pub name: String,
    pub dtype: String,
    pub shape: Vec<usize>,
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| SheetError::ModelLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn parse_header(path: &Path, bytes: &[u8]) -> Result<Vec<TensorInfo>> {
    let tensors = SafeTensors::deserialize(bytes).map_err(|e| SheetError::ModelLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut infos: Vec<TensorInfo> = tensors
        .tensors()
        .into_iter()
        .map(|(name, view)| TensorInfo {
            name,
            dtype: format!("{:?}", view.dtype()),
            shape: view.shape().to_vec(),
        })
        .collect();
    infos.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(infos)
}

/// List every tensor in a safetensors file, sorted by name
pub fn inspect(path: &Path) -> Result<Vec<TensorInfo>> {
    let bytes = read_artifact(path)?;
    parse_header(path, &bytes)
}

/// Names from `REQUIRED_TENSORS` that the file lacks
pub fn missing_tensors(infos: &[TensorInfo]) -> Vec<&'static str> {
    REQUIRED_TENSORS
        .iter()
        .filter(|name| !infos.iter().any(|info| info.name == **name))
        .copied()
        .collect()
}

/// Load model weights into a VarBuilder, rejecting files that lack any layer.
pub fn load_weights<'a>(path: &Path, device: &'a Device) -> Result<VarBuilder<'a>> {
    debug!("loading classifier weights from {}", path.display());
    let bytes = read_artifact(path)?;

    let infos = parse_header(path, &bytes)?;
    let missing = missing_tensors(&infos);
    if !missing.is_empty() {
        return Err(SheetError::ModelLoad {
            path: path.to_path_buf(),
            reason: format!("missing tensors: {}", missing.join(", ")),
        });
    }

    let ws: HashMap<String, candle_core::Tensor> =
        candle_core::safetensors::load_buffer(&bytes, device).map_err(|e| SheetError::ModelLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(VarBuilder::from_tensors(ws, DType::F32, device))
}
