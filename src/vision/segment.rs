// Grid segmentation: uniform cells with sampling bands, or ruled-line boundaries
use image::GrayImage;
use serde::Serialize;
use tracing::{debug, warn};

use super::morphology::{binarize_inverse, bounding_region, external_contours, open_line, Axis};
use super::Region;
use crate::config::segment::{COLS, H_KERNEL_DIVISOR, OPEN_ITERATIONS, ROWS, V_KERNEL_DIVISOR};
use crate::config::ExtractionConfig;
use crate::error::{ExtractionWarning, Result, SheetError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMode {
    Fixed,
    Dynamic,
}

/// One cell of the 18 x 20 grid, in table-region coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub bounds: Region,
    /// Inner rectangle used for classification (fixed geometry only)
    pub band: Option<Region>,
}

impl GridCell {
    /// Where a classifier should look
    pub fn sample_region(&self) -> Region {
        self.band.unwrap_or(self.bounds)
    }
}

/// Row and column boundaries found by the dynamic segmenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridLines {
    pub horizontal: Vec<u32>,
    pub vertical: Vec<u32>,
    /// True when the row boundaries came from detected lines rather than interpolation
    pub rows_detected: bool,
    pub cols_detected: bool,
}

/// Always exactly `ROWS * COLS` cells, row-major
#[derive(Debug, Clone)]
pub struct Grid {
    pub mode: SegmentMode,
    pub cells: Vec<GridCell>,
    pub lines: Option<GridLines>,
}

impl Grid {
    pub fn cell(&self, row: usize, col: usize) -> &GridCell {
        &self.cells[row * COLS + col]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[GridCell]> {
        self.cells.chunks(COLS)
    }
}

/// Uniform division of a `width` x `height` table with a centred sampling band per cell.
///
/// Remainders are trimmed evenly from both edges so every cell has the same size.
/// A table narrower than the grid still yields every cell, with zero-area bounds
/// that classify as blank paper.
/// No rotation correction: a skewed scan drifts out of alignment towards the far edges.
pub fn fixed_grid(width: u32, height: u32, config: &ExtractionConfig) -> Result<Grid> {
    if width == 0 || height == 0 {
        return Err(SheetError::EmptyCrop { width, height });
    }

    let extra_h = height % ROWS as u32;
    let extra_w = width % COLS as u32;
    let top = extra_h / 2;
    let left = extra_w / 2;

    let cell_h = (height - extra_h) / ROWS as u32;
    let cell_w = (width - extra_w) / COLS as u32;

    let mut cells = Vec::with_capacity(ROWS * COLS);
    for row in 0..ROWS {
        for col in 0..COLS {
            let y1 = top + row as u32 * cell_h;
            let x1 = left + col as u32 * cell_w;
            let bounds = Region::new(x1, y1, cell_w, cell_h);
            cells.push(GridCell {
                row,
                col,
                bounds,
                band: Some(sampling_band(bounds, config)),
            });
        }
    }

    debug!("fixed grid: {}x{} cells of {}x{} px", ROWS, COLS, cell_w, cell_h);
    Ok(Grid {
        mode: SegmentMode::Fixed,
        cells,
        lines: None,
    })
}

/// Marks sit above the ruled midline, so the vertical band is centred high in the cell.
fn sampling_band(cell: Region, config: &ExtractionConfig) -> Region {
    let band_h = (cell.height as f32 * config.band_height_fraction) as u32;
    let cy = cell.y + (cell.height as f32 * config.band_center_fraction) as u32;
    let y1 = cy.saturating_sub(band_h / 2).max(cell.y);
    let y2 = (cy + band_h / 2).min(cell.bottom());

    let band_w = (cell.width as f32 * config.band_width_fraction) as u32;
    let cx = cell.x + cell.width / 2;
    let x1 = cx.saturating_sub(band_w / 2).max(cell.x);
    let x2 = (cx + band_w / 2).min(cell.right());

    let band = Region::from_corners(x1, y1, x2, y2);
    if band.is_empty() {
        cell
    } else {
        band
    }
}

/// Re-detect ruled lines inside the cropped table and cut cells between them.
///
/// Axes with too few detected lines are interpolated uniformly and reported as
/// a `SegmentationFallback` warning.
pub fn dynamic_grid(table: &GrayImage, config: &ExtractionConfig, warnings: &mut Vec<ExtractionWarning>) -> Grid {
    let (w, h) = table.dimensions();
    let binary = binarize_inverse(table, config.line_binarize_threshold);

    let horizontal = open_line(&binary, (w / H_KERNEL_DIVISOR).max(1), Axis::Horizontal, OPEN_ITERATIONS);
    let vertical = open_line(&binary, (h / V_KERNEL_DIVISOR).max(1), Axis::Vertical, OPEN_ITERATIONS);

    let min_h_len = (w as f32 * config.min_line_length_fraction) as u32;
    let min_v_len = (h as f32 * config.min_line_length_fraction) as u32;
    let h_lines = line_positions(&horizontal, Axis::Horizontal, min_h_len, config.line_merge_tolerance);
    let v_lines = line_positions(&vertical, Axis::Vertical, min_v_len, config.line_merge_tolerance);
    debug!("grid lines: {} horizontal, {} vertical", h_lines.len(), v_lines.len());

    let (row_bounds, rows_detected) = fit_boundaries(&h_lines, ROWS, h);
    let (col_bounds, cols_detected) = fit_boundaries(&v_lines, COLS, w);
    if !rows_detected {
        warn!("only {} horizontal lines found, interpolating rows", h_lines.len());
        warnings.push(ExtractionWarning::SegmentationFallback {
            axis: "rows".to_string(),
            detected: h_lines.len(),
        });
    }
    if !cols_detected {
        warn!("only {} vertical lines found, interpolating columns", v_lines.len());
        warnings.push(ExtractionWarning::SegmentationFallback {
            axis: "columns".to_string(),
            detected: v_lines.len(),
        });
    }

    let mut cells = Vec::with_capacity(ROWS * COLS);
    for row in 0..ROWS {
        for col in 0..COLS {
            cells.push(GridCell {
                row,
                col,
                bounds: Region::from_corners(col_bounds[col], row_bounds[row], col_bounds[col + 1], row_bounds[row + 1]),
                band: None,
            });
        }
    }

    Grid {
        mode: SegmentMode::Dynamic,
        cells,
        lines: Some(GridLines {
            horizontal: h_lines,
            vertical: v_lines,
            rows_detected,
            cols_detected,
        }),
    }
}

/// Sorted, de-duplicated centre coordinates of line components at least `min_length` long.
fn line_positions(mask: &GrayImage, axis: Axis, min_length: u32, tolerance: u32) -> Vec<u32> {
    let mut positions: Vec<u32> = external_contours(mask)
        .iter()
        .map(bounding_region)
        .filter_map(|r| match axis {
            Axis::Horizontal if r.width > min_length => Some(r.y + r.height / 2),
            Axis::Vertical if r.height > min_length => Some(r.x + r.width / 2),
            _ => None,
        })
        .collect();
    positions.sort_unstable();
    merge_close(&positions, tolerance)
}

/// Collapse runs of coordinates closer than `tolerance` into their mean.
fn merge_close(sorted: &[u32], tolerance: u32) -> Vec<u32> {
    let mut merged = Vec::new();
    let mut cluster: Vec<u32> = Vec::new();
    for &p in sorted {
        if let Some(&last) = cluster.last() {
            if p - last > tolerance {
                merged.push(cluster.iter().sum::<u32>() / cluster.len() as u32);
                cluster.clear();
            }
        }
        cluster.push(p);
    }
    if !cluster.is_empty() {
        merged.push(cluster.iter().sum::<u32>() / cluster.len() as u32);
    }
    merged
}

/// Exactly `n + 1` boundaries along an axis of length `extent`.
///
/// With enough lines the last `n + 1` are used: headers and the label column
/// sit above and left of the data cells. Otherwise the span between the outer
/// detected lines (or the whole axis) is divided evenly.
fn fit_boundaries(lines: &[u32], n: usize, extent: u32) -> (Vec<u32>, bool) {
    if lines.len() > n {
        return (lines[lines.len() - (n + 1)..].to_vec(), true);
    }

    let (start, end) = match (lines.first(), lines.last()) {
        (Some(&first), Some(&last)) if lines.len() >= 2 => (first, last),
        _ => (0, extent),
    };
    let span = (end - start) as u64;
    let bounds = (0..=n as u64).map(|i| start + (span * i / n as u64) as u32).collect();
    (bounds, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    #[test]
    fn fixed_grid_trims_remainder_symmetrically() {
        // 18 * 30 + 5 rows, 20 * 40 + 3 columns
        let grid = fixed_grid(803, 545, &ExtractionConfig::default()).unwrap();
        assert_eq!(grid.cells.len(), ROWS * COLS);

        let first = grid.cell(0, 0);
        assert_eq!(first.bounds, Region::new(1, 2, 40, 30));
        let last = grid.cell(ROWS - 1, COLS - 1);
        assert_eq!(last.bounds.right(), 801);
        assert_eq!(last.bounds.bottom(), 542);
    }

    #[test]
    fn sampling_band_sits_high_and_centred() {
        let grid = fixed_grid(800, 540, &ExtractionConfig::default()).unwrap();
        let cell = grid.cell(2, 3);
        let band = cell.band.unwrap();

        // cell: x 120..160, y 60..90; band 21 tall centred at y=72, 24 wide centred at x=140
        assert_eq!(cell.bounds, Region::new(120, 60, 40, 30));
        assert_eq!(band, Region::from_corners(128, 62, 152, 82));
        assert!(band.y > cell.bounds.y && band.bottom() < cell.bounds.bottom());
    }

    #[test]
    fn narrow_table_still_yields_every_cell() {
        let grid = fixed_grid(10, 300, &ExtractionConfig::default()).unwrap();

        assert_eq!(grid.cells.len(), ROWS * COLS);
        assert!(grid.cells.iter().all(|c| c.bounds.width == 0));
        assert_eq!(grid.cell(17, 19).bounds.height, 16);
        assert!(grid.cells.iter().all(|c| c.sample_region().right() <= 10));
    }

    #[test]
    fn zero_area_table_is_an_empty_crop() {
        assert!(matches!(
            fixed_grid(0, 300, &ExtractionConfig::default()),
            Err(SheetError::EmptyCrop { width: 0, height: 300 })
        ));
        assert!(fixed_grid(40, 0, &ExtractionConfig::default()).is_err());
    }

    #[test]
    fn boundaries_prefer_the_last_lines() {
        let lines: Vec<u32> = (0..23).map(|i| i * 10).collect();
        let (bounds, detected) = fit_boundaries(&lines, 20, 300);
        assert!(detected);
        assert_eq!(bounds.len(), 21);
        assert_eq!(bounds[0], 20);
        assert_eq!(bounds[20], 220);
    }

    #[test]
    fn boundaries_interpolate_between_outer_lines() {
        let (bounds, detected) = fit_boundaries(&[40, 220], 18, 300);
        assert!(!detected);
        assert_eq!(bounds.len(), 19);
        assert_eq!(bounds[0], 40);
        assert_eq!(bounds[9], 130);
        assert_eq!(bounds[18], 220);

        let (bounds, _) = fit_boundaries(&[], 20, 200);
        assert_eq!(bounds[1], 10);
    }

    #[test]
    fn close_coordinates_merge() {
        assert_eq!(merge_close(&[10, 11, 12, 40, 41, 90], 3), vec![11, 40, 90]);
    }

    #[test]
    fn dynamic_grid_follows_ruled_lines() {
        // 21 column rules and 19 row rules plus one header rule above
        let (cell_w, cell_h) = (30u32, 20u32);
        let (w, h) = (COLS as u32 * cell_w + 20, (ROWS as u32 + 1) * cell_h + 20);
        let mut table = GrayImage::from_pixel(w, h, Luma([250]));
        for r in 0..=(ROWS as u32 + 1) {
            let y = 10 + r * cell_h;
            draw_filled_rect_mut(&mut table, Rect::at(10, y as i32).of_size(COLS as u32 * cell_w + 2, 2), Luma([10]));
        }
        for c in 0..=COLS as u32 {
            let x = 10 + c * cell_w;
            draw_filled_rect_mut(
                &mut table,
                Rect::at(x as i32, 10).of_size(2, (ROWS as u32 + 1) * cell_h + 2),
                Luma([10]),
            );
        }

        let mut warnings = Vec::new();
        let grid = dynamic_grid(&table, &ExtractionConfig::default(), &mut warnings);

        assert!(warnings.is_empty(), "{:?}", warnings);
        let lines = grid.lines.as_ref().unwrap();
        assert!(lines.rows_detected && lines.cols_detected);
        assert_eq!(lines.horizontal.len(), ROWS + 2);
        assert_eq!(lines.vertical.len(), COLS + 1);

        // Header band skipped: first data row starts on the second rule
        let first = grid.cell(0, 0);
        assert!((first.bounds.y as i64 - 31).abs() <= 1, "{:?}", first.bounds);
        assert!((first.bounds.x as i64 - 11).abs() <= 1, "{:?}", first.bounds);
        assert_eq!(grid.cells.len(), ROWS * COLS);
    }

    #[test]
    fn dynamic_grid_on_blank_table_interpolates() {
        let table = GrayImage::from_pixel(400, 360, Luma([250]));
        let mut warnings = Vec::new();
        let grid = dynamic_grid(&table, &ExtractionConfig::default(), &mut warnings);

        assert_eq!(warnings.len(), 2);
        assert_eq!(grid.cells.len(), ROWS * COLS);
        assert_eq!(grid.cell(0, 0).bounds, Region::new(0, 0, 20, 20));
    }
}
