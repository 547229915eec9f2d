// Geometric stages: normalize the scan, find the table, cut it into cells
pub mod locate;
pub mod morphology;
pub mod normalize;
pub mod segment;

pub use locate::{locate_table, LocateStrategy, TableDetection, TableRegion};
pub use normalize::{normalize, NormalizedImage};
pub use segment::{dynamic_grid, fixed_grid, Grid, GridCell, GridLines, SegmentMode};

use image::{imageops, GrayImage};
use serde::Serialize;

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from inclusive-exclusive corner coordinates
    pub fn from_corners(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2.saturating_sub(x1),
            height: y2.saturating_sub(y1),
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Grow by `pad` on every side, staying inside a `width` x `height` image
    pub fn padded(&self, pad: u32, width: u32, height: u32) -> Self {
        let x1 = self.x.saturating_sub(pad);
        let y1 = self.y.saturating_sub(pad);
        let x2 = (self.right() + pad).min(width);
        let y2 = (self.bottom() + pad).min(height);
        Self::from_corners(x1, y1, x2, y2)
    }

    /// Clip to a `width` x `height` image
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let x1 = self.x.min(width);
        let y1 = self.y.min(height);
        Self::from_corners(x1, y1, self.right().min(width), self.bottom().min(height))
    }
}

/// Copy a sub-region out of a grayscale image, clamped to its bounds.
pub fn crop(image: &GrayImage, region: Region) -> GrayImage {
    let r = region.clamped(image.width(), image.height());
    imageops::crop_imm(image, r.x, r.y, r.width, r.height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn padding_clamps_to_image() {
        let r = Region::new(5, 5, 90, 40).padded(10, 100, 50);
        assert_eq!(r, Region::new(0, 0, 100, 50));
    }

    #[test]
    fn crop_clamps() {
        let img = GrayImage::from_fn(100, 100, |x, y| Luma([(x + y) as u8]));
        let cropped = crop(&img, Region::new(90, 90, 50, 50));
        assert_eq!(cropped.dimensions(), (10, 10));
        assert_eq!(cropped.get_pixel(0, 0)[0], 180);
    }
}
