// Binary A/B cell classifier: three conv blocks and a two-layer head
use std::path::Path;

use candle_core::{Device, ModuleT, Tensor, D};
use candle_nn::{batch_norm, conv2d, linear, BatchNorm, Conv2d, Conv2dConfig, Dropout, Linear, VarBuilder};
use image::GrayImage;
use tracing::{debug, info};

use super::model_loader::load_weights;
use super::tensor_utils::prepare_cell_tensor;
use super::CellClassifier;
use crate::config::classifier::DECISION_THRESHOLD;
use crate::error::{Result, SheetError};
use crate::schema::SessionValue;

const CHANNELS: [usize; 4] = [1, 32, 64, 128];
/// 128 channels x 3 x 3 after three 2x poolings of 28x28
const FLAT_FEATURES: usize = 128 * 3 * 3;
const HIDDEN: usize = 128;
const DROPOUT: f32 = 0.3;
const BN_EPS: f64 = 1e-5;

struct ConvBlock {
    conv: Conv2d,
    norm: BatchNorm,
}

impl ConvBlock {
    /// `conv_idx` and `conv_idx + 1` mirror the positions inside a sequential `features` stack
    fn new(in_c: usize, out_c: usize, conv_idx: usize, vb: &VarBuilder) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        Ok(Self {
            conv: conv2d(in_c, out_c, 3, cfg, vb.pp(format!("features.{conv_idx}")))?,
            norm: batch_norm(out_c, BN_EPS, vb.pp(format!("features.{}", conv_idx + 1)))?,
        })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let xs = xs.apply(&self.conv)?;
        let xs = xs.apply_t(&self.norm, train)?;
        xs.relu()?.max_pool2d(2)
    }
}

/// The network alone. Tensor names follow a sequential layout
/// (`features.{0,1,4,5,8,9}`, `classifier.{1,4}`) so converted state dicts load as-is.
pub struct AbNet {
    blocks: Vec<ConvBlock>,
    hidden: Linear,
    dropout: Dropout,
    output: Linear,
}

impl AbNet {
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let mut blocks = Vec::with_capacity(3);
        for (i, pair) in CHANNELS.windows(2).enumerate() {
            blocks.push(ConvBlock::new(pair[0], pair[1], i * 4, &vb)?);
        }
        Ok(Self {
            blocks,
            hidden: linear(FLAT_FEATURES, HIDDEN, vb.pp("classifier.1"))?,
            dropout: Dropout::new(DROPOUT),
            output: linear(HIDDEN, 1, vb.pp("classifier.4"))?,
        })
    }

    /// `[N, 1, 28, 28]` in, `[N, 1]` logits out
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let mut xs = xs.clone();
        for block in &self.blocks {
            xs = block.forward_t(&xs, train)?;
        }
        let xs = xs.flatten_from(1)?;
        let xs = xs.apply(&self.hidden)?.relu()?;
        let xs = self.dropout.forward_t(&xs, train)?;
        xs.apply(&self.output)
    }
}

/// Trained network plus decision boundary, shared read-only across extractions.
pub struct AbClassifier {
    net: AbNet,
    device: Device,
    threshold: f32,
}

impl AbClassifier {
    pub fn from_varbuilder(vb: VarBuilder, device: &Device, threshold: f32) -> Result<Self> {
        Ok(Self {
            net: AbNet::new(vb)?,
            device: device.clone(),
            threshold,
        })
    }

    /// Load a safetensors artifact with the default decision boundary
    pub fn load(path: &Path, device: &Device) -> Result<Self> {
        Self::load_with_threshold(path, device, DECISION_THRESHOLD)
    }

    pub fn load_with_threshold(path: &Path, device: &Device, threshold: f32) -> Result<Self> {
        let vb = load_weights(path, device)?;
        let classifier = Self::from_varbuilder(vb, device, threshold)?;
        info!("loaded A/B classifier from {} on {:?}", path.display(), device);
        Ok(classifier)
    }

    /// P(B) for each crop
    pub fn probabilities(&self, crops: &[GrayImage]) -> Result<Vec<f32>> {
        if crops.is_empty() {
            return Ok(Vec::new());
        }
        let input = prepare_cell_tensor(crops, &self.device)?;
        let logits = self.net.forward_t(&input, false)?;
        let probs = candle_nn::ops::sigmoid(&logits)?.squeeze(D::Minus1)?;
        Ok(probs.to_vec1::<f32>()?)
    }
}

impl AbClassifier {
    fn decide(&self, probability: f32) -> SessionValue {
        if probability >= self.threshold {
            SessionValue::B
        } else {
            SessionValue::A
        }
    }
}

impl CellClassifier for AbClassifier {
    fn classify_batch(&self, crops: &[GrayImage]) -> Result<Vec<SessionValue>> {
        let probs = self.probabilities(crops)?;
        let b_count = probs.iter().filter(|p| **p >= self.threshold).count();
        debug!("classified {} cells: {} B", probs.len(), b_count);
        Ok(probs.into_iter().map(|p| self.decide(p)).collect())
    }

    fn classify(&self, crop: &GrayImage) -> Result<SessionValue> {
        let probs = self.probabilities(std::slice::from_ref(crop))?;
        match probs.as_slice() {
            [p] => Ok(self.decide(*p)),
            other => Err(SheetError::Inference(candle_core::Error::Msg(format!(
                "expected one probability, got {}",
                other.len()
            )))),
        }
    }

    fn backend_name(&self) -> &str {
        "candle-cnn"
    }
}
