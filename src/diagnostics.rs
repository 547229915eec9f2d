// Optional receiver for intermediate images, injected by the caller
use std::path::{Path, PathBuf};

use image::GrayImage;
use tracing::warn;

use crate::error::Result;

/// Hooks are fire-and-forget: a failing sink never fails an extraction.
pub trait DiagnosticSink: Send + Sync {
    /// A whole-image stage such as "normalized" or "table"
    fn stage(&self, _name: &str, _image: &GrayImage) {}

    /// The pixels a cell was classified from
    fn cell(&self, _row: usize, _col: usize, _crop: &GrayImage) {}
}

/// Writes `<root>/<stage>.png` and `<root>/cells/rowRR_colCC.png`
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("cells"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cell_path(&self, row: usize, col: usize) -> PathBuf {
        self.root.join("cells").join(format!("row{:02}_col{:02}.png", row, col))
    }

    fn write(&self, path: &Path, image: &GrayImage) {
        if image.width() == 0 || image.height() == 0 {
            return;
        }
        if let Err(e) = image.save(path) {
            warn!("diagnostic write to {} failed: {}", path.display(), e);
        }
    }
}

impl DiagnosticSink for DirectorySink {
    fn stage(&self, name: &str, image: &GrayImage) {
        self.write(&self.root.join(format!("{name}.png")), image);
    }

    fn cell(&self, row: usize, col: usize, crop: &GrayImage) {
        self.write(&self.cell_path(row, col), crop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn writes_stages_and_cells() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("debug")).unwrap();

        sink.stage("table", &GrayImage::from_pixel(10, 10, Luma([128])));
        sink.cell(3, 17, &GrayImage::from_pixel(4, 4, Luma([0])));
        sink.cell(0, 0, &GrayImage::new(0, 0));

        assert!(sink.root().join("table.png").exists());
        assert!(sink.cell_path(3, 17).ends_with("cells/row03_col17.png"));
        assert!(sink.cell_path(3, 17).exists());
        assert!(!sink.cell_path(0, 0).exists());
    }
}
