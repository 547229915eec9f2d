// Learned cell classification with Candle: network, weights, preprocessing, training
pub mod model;
pub mod model_loader;
pub mod tensor_utils;
pub mod train;

pub use model::{AbClassifier, AbNet};
pub use model_loader::{inspect, ModelPaths, TensorInfo};
pub use train::{train, TrainConfig, TrainSummary};

use candle_core::Device;
use image::GrayImage;
use rayon::prelude::*;

use crate::error::Result;
use crate::schema::SessionValue;

/// Best available device: CUDA when compiled in and present, else CPU
pub fn default_device() -> Device {
    Device::cuda_if_available(0).unwrap_or(Device::Cpu)
}

/// Trait for cell classification backends.
///
/// Implementations always commit to A or B; `Empty` is reserved for cells
/// the text path found nothing in.
pub trait CellClassifier: Send + Sync {
    /// Classify every crop; output has one value per crop, in input order.
    fn classify_batch(&self, crops: &[GrayImage]) -> Result<Vec<SessionValue>> {
        crops.par_iter().map(|crop| self.classify(crop)).collect()
    }

    fn classify(&self, crop: &GrayImage) -> Result<SessionValue>;

    /// Get backend name for debugging
    fn backend_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Per-crop implementation relying on the default batch method
    struct Darkness;

    impl CellClassifier for Darkness {
        fn classify(&self, crop: &GrayImage) -> Result<SessionValue> {
            let dark = crop.pixels().any(|p| p[0] < 128);
            Ok(if dark { SessionValue::B } else { SessionValue::A })
        }

        fn backend_name(&self) -> &str {
            "darkness"
        }
    }

    #[test]
    fn default_batch_keeps_order() {
        let crops: Vec<GrayImage> = (0..16)
            .map(|i| GrayImage::from_pixel(4, 4, Luma([if i % 3 == 0 { 10 } else { 250 }])))
            .collect();
        let values = Darkness.classify_batch(&crops).unwrap();
        for (i, v) in values.iter().enumerate() {
            let expected = if i % 3 == 0 { SessionValue::B } else { SessionValue::A };
            assert_eq!(*v, expected, "crop {i}");
        }
    }
}
