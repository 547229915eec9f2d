// Offline training of the A/B network from a folder of labelled crops
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use image::GrayImage;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use super::model::AbNet;
use super::tensor_utils::prepare_cell_tensor;
use crate::error::{Result, SheetError};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];
/// Class folders in label order: A is 0, B is 1
const CLASSES: [&str; 2] = ["A", "B"];
const EVAL_BATCH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 15,
            batch_size: 64,
            learning_rate: 1e-3,
        }
    }
}

/// Labelled crops of one split, ready for the network
pub struct Dataset {
    pub images: Tensor,
    /// `[N, 1]` f32, 1.0 for B
    pub labels: Tensor,
    pub len: usize,
}

impl Dataset {
    /// Read `<dir>/A` and `<dir>/B`. Both folders must exist; unreadable images are errors.
    pub fn load(dir: &Path, device: &Device) -> Result<Self> {
        let mut files: Vec<(PathBuf, f32)> = Vec::new();
        for (label, class) in CLASSES.iter().enumerate() {
            let class_dir = dir.join(class);
            let entries = std::fs::read_dir(&class_dir).map_err(|e| SheetError::Dataset {
                path: class_dir.clone(),
                reason: e.to_string(),
            })?;
            let mut class_files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_image(p))
                .collect();
            class_files.sort();
            files.extend(class_files.into_iter().map(|p| (p, label as f32)));
        }

        if files.is_empty() {
            return Err(SheetError::Dataset {
                path: dir.to_path_buf(),
                reason: "no images under A/ or B/".to_string(),
            });
        }

        let crops: Vec<GrayImage> = files
            .par_iter()
            .map(|(path, _)| -> Result<GrayImage> { Ok(image::open(path)?.to_luma8()) })
            .collect::<Result<_>>()?;
        let labels: Vec<f32> = files.iter().map(|(_, label)| *label).collect();

        let len = crops.len();
        Ok(Self {
            images: prepare_cell_tensor(&crops, device)?,
            labels: Tensor::from_vec(labels, (len, 1), device)?,
            len,
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub train_loss: f32,
    pub val_accuracy: f32,
    pub saved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainSummary {
    pub train_samples: usize,
    pub val_samples: usize,
    pub best_val_accuracy: f32,
    pub epochs: Vec<EpochReport>,
    pub weights: PathBuf,
}

/// Train from `<root>/train/{A,B}` and `<root>/val/{A,B}`, writing the weights
/// to `out` each time validation accuracy improves.
pub fn train(root: &Path, out: &Path, config: &TrainConfig, device: &Device) -> Result<TrainSummary> {
    let train_set = Dataset::load(&root.join("train"), device)?;
    let val_set = Dataset::load(&root.join("val"), device)?;
    info!("training on {} crops, validating on {}", train_set.len, val_set.len);

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let net = AbNet::new(vb)?;

    let params = ParamsAdamW {
        lr: config.learning_rate,
        weight_decay: 0.0,
        ..Default::default()
    };
    let mut opt = AdamW::new(varmap.all_vars(), params)?;

    let batch_size = config.batch_size.max(1);
    let mut best = f32::NEG_INFINITY;
    let mut epochs = Vec::with_capacity(config.epochs);

    for epoch in 1..=config.epochs {
        let order = Tensor::rand(0f32, 1f32, train_set.len, device)?.arg_sort_last_dim(true)?;

        let mut loss_sum = 0.0f32;
        let mut batches = 0usize;
        for start in (0..train_set.len).step_by(batch_size) {
            let len = batch_size.min(train_set.len - start);
            let idx = order.narrow(0, start, len)?;
            let xs = train_set.images.index_select(&idx, 0)?;
            let ys = train_set.labels.index_select(&idx, 0)?;

            let logits = net.forward_t(&xs, true)?;
            let loss = candle_nn::loss::binary_cross_entropy_with_logit(&logits, &ys)?;
            opt.backward_step(&loss)?;

            loss_sum += loss.to_scalar::<f32>()?;
            batches += 1;
        }

        let val_accuracy = accuracy(&net, &val_set)?;
        let saved = val_accuracy > best;
        if saved {
            best = val_accuracy;
            varmap.save(out)?;
        }

        let train_loss = loss_sum / batches.max(1) as f32;
        info!(
            "epoch {}/{}: loss {:.4}, val acc {:.3}{}",
            epoch,
            config.epochs,
            train_loss,
            val_accuracy,
            if saved { " (saved)" } else { "" }
        );
        epochs.push(EpochReport {
            epoch,
            train_loss,
            val_accuracy,
            saved,
        });
    }

    Ok(TrainSummary {
        train_samples: train_set.len,
        val_samples: val_set.len,
        best_val_accuracy: best.max(0.0),
        epochs,
        weights: out.to_path_buf(),
    })
}

/// Fraction of crops whose P(B) lands on the correct side of 0.5
fn accuracy(net: &AbNet, data: &Dataset) -> Result<f32> {
    let mut correct = 0usize;
    for start in (0..data.len).step_by(EVAL_BATCH) {
        let len = EVAL_BATCH.min(data.len - start);
        let xs = data.images.narrow(0, start, len)?;
        let ys = data.labels.narrow(0, start, len)?;

        let logits = net.forward_t(&xs, false)?;
        let predicted = logits.ge(&logits.zeros_like()?)?.to_dtype(DType::F32)?;
        let hits = predicted.eq(&ys)?.to_dtype(DType::F32)?.sum_all()?.to_scalar::<f32>()?;
        correct += hits as usize;
    }
    debug!("{}/{} validation crops correct", correct, data.len);
    Ok(correct as f32 / data.len.max(1) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::D;
    use image::Luma;

    fn label_vector(data: &Dataset) -> Vec<f32> {
        data.labels.squeeze(D::Minus1).unwrap().to_vec1::<f32>().unwrap()
    }

    fn write_split(root: &Path, split: &str, per_class: usize) {
        for class in CLASSES {
            let dir = root.join(split).join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                // A crops are light, B crops dark
                let shade = if class == "A" { 230 - i as u8 } else { 20 + i as u8 };
                GrayImage::from_pixel(20, 24, Luma([shade]))
                    .save(dir.join(format!("{i}.png")))
                    .unwrap();
            }
        }
    }

    #[test]
    fn dataset_labels_follow_folders() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), "train", 3);
        std::fs::write(dir.path().join("train/A/notes.txt"), b"skip me").unwrap();

        let data = Dataset::load(&dir.path().join("train"), &Device::Cpu).unwrap();
        assert_eq!(data.len, 6);
        assert_eq!(data.images.dims(), &[6, 1, 28, 28]);
        assert_eq!(label_vector(&data), vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn missing_class_folder_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("train/A")).unwrap();
        let err = Dataset::load(&dir.path().join("train"), &Device::Cpu).err().unwrap();
        assert!(matches!(err, SheetError::Dataset { .. }));
    }

    #[test]
    fn short_run_checkpoints_loadable_weights() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), "train", 6);
        write_split(dir.path(), "val", 2);
        let out = dir.path().join("model/ab.safetensors");

        let config = TrainConfig {
            epochs: 2,
            batch_size: 4,
            learning_rate: 1e-3,
        };
        let summary = train(dir.path(), &out, &config, &Device::Cpu).unwrap();

        assert_eq!(summary.epochs.len(), 2);
        assert!(summary.epochs[0].saved);
        assert!(summary.epochs.iter().all(|e| e.train_loss.is_finite()));
        assert!((0.0..=1.0).contains(&summary.best_val_accuracy));
        assert!(crate::ml::AbClassifier::load(&out, &Device::Cpu).is_ok());
    }
}
