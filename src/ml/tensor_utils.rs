// Cell crop to classifier input tensor
use candle_core::{Device, Tensor};
use image::imageops::{self, FilterType};
use image::GrayImage;
use rayon::prelude::*;

use crate::config::classifier::{INPUT_SIZE, NORMALIZE_MEAN, NORMALIZE_STD};
use crate::error::Result;

/// Values per preprocessed crop
pub const CELL_PIXELS: usize = INPUT_SIZE * INPUT_SIZE;

/// Resize to the network's input size and normalize to roughly [-1, 1].
/// An empty crop reads as blank paper.
pub fn preprocess_cell(crop: &GrayImage) -> Vec<f32> {
    if crop.width() == 0 || crop.height() == 0 {
        return vec![(1.0 - NORMALIZE_MEAN) / NORMALIZE_STD; CELL_PIXELS];
    }

    let resized = imageops::resize(crop, INPUT_SIZE as u32, INPUT_SIZE as u32, FilterType::Triangle);
    resized
        .pixels()
        .map(|p| (p[0] as f32 / 255.0 - NORMALIZE_MEAN) / NORMALIZE_STD)
        .collect()
}

/// Batch of crops as an `[N, 1, 28, 28]` tensor. Crops are preprocessed in parallel.
pub fn prepare_cell_tensor(crops: &[GrayImage], device: &Device) -> Result<Tensor> {
    let data: Vec<f32> = crops.par_iter().flat_map_iter(|crop| preprocess_cell(crop)).collect();
    Ok(Tensor::from_vec(data, (crops.len(), 1, INPUT_SIZE, INPUT_SIZE), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn values_are_centred() {
        let white = preprocess_cell(&GrayImage::from_pixel(40, 30, Luma([255])));
        let black = preprocess_cell(&GrayImage::from_pixel(40, 30, Luma([0])));
        assert_eq!(white.len(), CELL_PIXELS);
        assert!(white.iter().all(|v| (*v - 1.0).abs() < 1e-6));
        assert!(black.iter().all(|v| (*v + 1.0).abs() < 1e-6));
    }

    #[test]
    fn batch_shape() {
        let crops = vec![GrayImage::new(10, 12), GrayImage::new(0, 0), GrayImage::new(50, 50)];
        let t = prepare_cell_tensor(&crops, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[3, 1, INPUT_SIZE, INPUT_SIZE]);
    }
}
