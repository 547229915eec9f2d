// Binary line morphology and contour helpers for ruled-table detection
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};

use super::Region;

pub const FOREGROUND: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Inverse binary threshold: pixels at or below `threshold` become foreground.
pub fn binarize_inverse(gray: &GrayImage, threshold: u8) -> GrayImage {
    let (w, h) = gray.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        if gray.get_pixel(x, y)[0] <= threshold {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// Dilate a binary mask with a 1-pixel-thick line element of `length`.
pub fn dilate_line(mask: &GrayImage, length: u32, axis: Axis) -> GrayImage {
    sweep_line(mask, length, axis, |hits, _span| hits > 0)
}

/// Erode a binary mask with a 1-pixel-thick line element of `length`.
/// Out-of-image positions do not erode.
pub fn erode_line(mask: &GrayImage, length: u32, axis: Axis) -> GrayImage {
    sweep_line(mask, length, axis, |hits, span| hits == span)
}

/// Dilation followed by erosion: bridges gaps shorter than `length` along `axis`.
pub fn close_line(mask: &GrayImage, length: u32, axis: Axis) -> GrayImage {
    erode_line(&dilate_line(mask, length, axis), length, axis)
}

/// Erosion followed by dilation, each applied `iterations` times: keeps only runs
/// at least `length` long along `axis`.
pub fn open_line(mask: &GrayImage, length: u32, axis: Axis, iterations: u32) -> GrayImage {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = erode_line(&out, length, axis);
    }
    for _ in 0..iterations {
        out = dilate_line(&out, length, axis);
    }
    out
}

/// Pixelwise maximum of two masks of equal size
pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let (w, h) = a.dimensions();
    GrayImage::from_fn(w, h, |x, y| Luma([a.get_pixel(x, y)[0].max(b.get_pixel(x, y)[0])]))
}

/// Centred window count over each row (or column) via prefix sums.
fn sweep_line<F>(mask: &GrayImage, length: u32, axis: Axis, keep: F) -> GrayImage
where
    F: Fn(u32, u32) -> bool,
{
    let (w, h) = mask.dimensions();
    let mut out = GrayImage::new(w, h);
    if length <= 1 || w == 0 || h == 0 {
        return mask.clone();
    }

    let (lines, span) = match axis {
        Axis::Horizontal => (h, w),
        Axis::Vertical => (w, h),
    };
    let before = (length / 2) as i64;
    let after = (length - 1) as i64 - before;

    let mut prefix = vec![0u32; span as usize + 1];
    for line in 0..lines {
        for i in 0..span {
            let (x, y) = match axis {
                Axis::Horizontal => (i, line),
                Axis::Vertical => (line, i),
            };
            prefix[i as usize + 1] = prefix[i as usize] + u32::from(mask.get_pixel(x, y)[0] > 0);
        }

        for i in 0..span {
            let lo = (i as i64 - before).max(0) as usize;
            let hi = ((i as i64 + after).min(span as i64 - 1) + 1) as usize;
            let hits = prefix[hi] - prefix[lo];
            if keep(hits, (hi - lo) as u32) {
                let (x, y) = match axis {
                    Axis::Horizontal => (i, line),
                    Axis::Vertical => (line, i),
                };
                out.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }

    out
}

/// Outermost borders only (no holes, no nested components).
pub fn external_contours(mask: &GrayImage) -> Vec<Contour<u32>> {
    find_contours::<u32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| !c.points.is_empty())
        .collect()
}

/// Polygon area enclosed by a traced border (shoelace formula).
pub fn contour_area(contour: &Contour<u32>) -> f64 {
    let pts = &contour.points;
    if pts.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0f64;
    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        twice += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    twice.abs() / 2.0
}

/// Axis-aligned bounds of a traced border, inclusive of its last pixel.
pub fn bounding_region(contour: &Contour<u32>) -> Region {
    let min_x = contour.points.iter().map(|p| p.x).min().unwrap_or(0);
    let max_x = contour.points.iter().map(|p| p.x).max().unwrap_or(0);
    let min_y = contour.points.iter().map(|p| p.y).min().unwrap_or(0);
    let max_y = contour.points.iter().map(|p| p.y).max().unwrap_or(0);
    Region::from_corners(min_x, min_y, max_x + 1, max_y + 1)
}
