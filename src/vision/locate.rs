// Table localization: ruled-line contour search with a fractional-crop fallback
use image::GrayImage;
use imageproc::edges::canny;
use serde::Serialize;
use tracing::{debug, info};

use super::morphology::{bounding_region, close_line, contour_area, external_contours, union, Axis};
use super::{crop, NormalizedImage, Region};
use crate::config::ExtractionConfig;
use crate::error::{Result, SheetError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateStrategy {
    /// Largest ruled-line contour cleared the area threshold
    Structural,
    /// Fixed fractional crop
    Heuristic,
}

/// What the locator did, reported verbatim in the result envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDetection {
    pub detected: bool,
    pub cropped: bool,
    pub strategy: LocateStrategy,
    /// Size of the uploaded image, before any downscaling
    pub original_size: [u32; 2],
    /// Crop size and region, in normalized-page pixels
    pub cropped_size: [u32; 2],
    pub crop_region: Option<Region>,
}

/// Cropped table pixels and where they came from
#[derive(Debug, Clone)]
pub struct TableRegion {
    pub image: GrayImage,
    pub region: Region,
    pub detection: TableDetection,
}

/// Find the grid on a normalized page.
///
/// Structural search first; when no contour covers enough of the page the
/// fixed fractional crop is used instead. Either way the crop is never empty.
pub fn locate_table(page: &NormalizedImage, config: &ExtractionConfig) -> Result<TableRegion> {
    let gray = &page.gray;
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return Err(SheetError::EmptyCrop { width: w, height: h });
    }

    let (region, strategy) = match find_table_contour(gray, config) {
        Some(region) => (region, LocateStrategy::Structural),
        None => (fallback_region(w, h, config), LocateStrategy::Heuristic),
    };

    if region.is_empty() {
        return Err(SheetError::EmptyCrop {
            width: region.width,
            height: region.height,
        });
    }

    let image = crop(gray, region);
    match strategy {
        LocateStrategy::Structural => info!("table detected: cropped {}x{} to {:?}", w, h, region),
        LocateStrategy::Heuristic => info!("heuristic crop: {}x{} to {:?}", w, h, region),
    }

    Ok(TableRegion {
        detection: TableDetection {
            detected: strategy == LocateStrategy::Structural,
            cropped: true,
            strategy,
            original_size: [page.original_size.0, page.original_size.1],
            cropped_size: [image.width(), image.height()],
            crop_region: Some(region),
        },
        image,
        region,
    })
}

/// Bounding box of the largest ruled-line blob, padded, if it covers enough of the page.
pub fn find_table_contour(gray: &GrayImage, config: &ExtractionConfig) -> Option<Region> {
    let (w, h) = gray.dimensions();
    let edges = canny(gray, config.canny_low, config.canny_high);

    let horizontal = close_line(&edges, config.line_kernel, Axis::Horizontal);
    let vertical = close_line(&edges, config.line_kernel, Axis::Vertical);
    let grid = union(&horizontal, &vertical);

    let contours = external_contours(&grid);
    let (largest, area) = contours
        .iter()
        .map(|c| (c, contour_area(c)))
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    let min_area = w as f64 * h as f64 * config.min_table_area_fraction as f64;
    debug!(
        "{} grid contours, largest area {:.0} (need > {:.0})",
        contours.len(),
        area,
        min_area
    );
    if area <= min_area {
        return None;
    }

    Some(bounding_region(largest).padded(config.crop_padding, w, h))
}

/// Skip the label column and header band on the assumption the grid sits bottom-right.
pub fn fallback_region(width: u32, height: u32, config: &ExtractionConfig) -> Region {
    let left = (width as f32 * config.fallback_left_fraction) as u32;
    let top = (height as f32 * config.fallback_top_fraction) as u32;
    Region::from_corners(left, top, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn page(gray: GrayImage) -> NormalizedImage {
        let original_size = gray.dimensions();
        NormalizedImage { gray, original_size }
    }

    fn ruled_page() -> NormalizedImage {
        let mut gray = GrayImage::from_pixel(600, 500, Luma([245]));
        let (x0, y0, cols, rows, cell) = (100i32, 80i32, 10i32, 9i32, 40i32);
        for r in 0..=rows {
            draw_filled_rect_mut(
                &mut gray,
                Rect::at(x0, y0 + r * cell).of_size((cols * cell + 2) as u32, 2),
                Luma([20]),
            );
        }
        for c in 0..=cols {
            draw_filled_rect_mut(
                &mut gray,
                Rect::at(x0 + c * cell, y0).of_size(2, (rows * cell + 2) as u32),
                Luma([20]),
            );
        }
        page(gray)
    }

    #[test]
    fn ruled_grid_is_found_structurally() {
        let table = locate_table(&ruled_page(), &ExtractionConfig::default()).unwrap();

        assert_eq!(table.detection.strategy, LocateStrategy::Structural);
        assert!(table.detection.detected);
        // Grid spans 100..502 x 80..442, padded by 10
        let r = table.region;
        assert!((85..=95).contains(&r.x), "{:?}", r);
        assert!((65..=75).contains(&r.y), "{:?}", r);
        assert!((505..=518).contains(&r.right()), "{:?}", r);
        assert!((445..=458).contains(&r.bottom()), "{:?}", r);
        assert_eq!(table.detection.cropped_size, [r.width, r.height]);
    }

    #[test]
    fn blank_page_falls_back_to_fractional_crop() {
        let blank = page(GrayImage::from_pixel(400, 200, Luma([250])));
        let table = locate_table(&blank, &ExtractionConfig::default()).unwrap();

        assert_eq!(table.detection.strategy, LocateStrategy::Heuristic);
        assert!(!table.detection.detected);
        assert!(table.detection.cropped);
        assert_eq!(table.region, Region::new(60, 30, 340, 170));
        assert_eq!(table.image.dimensions(), (340, 170));
    }

    #[test]
    fn degenerate_page_is_an_empty_crop() {
        let err = locate_table(&page(GrayImage::new(0, 0)), &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, SheetError::EmptyCrop { .. }));
    }

    #[test]
    fn detection_reports_the_upload_size() {
        let downscaled = NormalizedImage {
            gray: GrayImage::from_pixel(400, 200, Luma([250])),
            original_size: (3000, 1500),
        };
        let table = locate_table(&downscaled, &ExtractionConfig::default()).unwrap();

        assert_eq!(table.detection.original_size, [3000, 1500]);
        assert_eq!(table.detection.cropped_size, [340, 170]);
    }
}
