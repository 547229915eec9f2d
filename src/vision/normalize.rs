// Decode, bound-resize, grayscale and local contrast enhancement
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::Result;

/// Grayscale working image plus the size of what was uploaded
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub gray: GrayImage,
    pub original_size: (u32, u32),
}

/// Full normalization pass over raw upload bytes.
///
/// Fails only when the bytes are not a decodable image.
pub fn normalize(bytes: &[u8], config: &ExtractionConfig) -> Result<NormalizedImage> {
    let decoded = image::load_from_memory(bytes)?;
    let original_size = (decoded.width(), decoded.height());

    let gray = bound_size(decoded.to_luma8(), config.max_dimension);
    let gray = equalize_tiles(&gray, config.clahe_tiles, config.clahe_clip_limit);

    debug!(
        "normalized {}x{} -> {}x{}",
        original_size.0,
        original_size.1,
        gray.width(),
        gray.height()
    );

    Ok(NormalizedImage { gray, original_size })
}

/// Downscale so the longer side is at most `max_dim`. Never upscales.
pub fn bound_size(gray: GrayImage, max_dim: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let longer = w.max(h);
    if longer <= max_dim {
        return gray;
    }

    let ratio = max_dim as f32 / longer as f32;
    let nw = ((w as f32 * ratio) as u32).max(1);
    let nh = ((h as f32 * ratio) as u32).max(1);

    // Triangle averages every source pixel under the kernel when shrinking
    imageops::resize(&gray, nw, nh, FilterType::Triangle)
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `tiles` x `tiles` grid. Each tile gets its own
/// clipped-histogram mapping and every pixel is blended bilinearly between the
/// mappings of the four nearest tile centres, so tile seams do not show.
pub fn equalize_tiles(gray: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }

    let tile_w = w.div_ceil(tiles).max(1);
    let tile_h = h.div_ceil(tiles).max(1);
    let tiles_x = w.div_ceil(tile_w) as usize;
    let tiles_y = h.div_ceil(tile_h) as usize;

    let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx as u32 * tile_w;
            let y0 = ty as u32 * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            luts[ty * tiles_x + tx] = tile_mapping(gray, x0, y0, x1, y1, clip_limit);
        }
    }

    let mut out = GrayImage::new(w, h);
    for (x, y, pixel) in gray.enumerate_pixels() {
        let v = pixel[0] as usize;

        let (tx0, tx1, ax) = neighbours(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = neighbours(y, tile_h, tiles_y);

        let top = lerp(luts[ty0 * tiles_x + tx0][v], luts[ty0 * tiles_x + tx1][v], ax);
        let bottom = lerp(luts[ty1 * tiles_x + tx0][v], luts[ty1 * tiles_x + tx1][v], ax);
        let value = top + (bottom - top) * ay;

        out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
    }

    out
}

fn tile_mapping(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let area = ((x1 - x0) * (y1 - y0)).max(1);
    let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }

    let spread = excess / 256;
    let residual = (excess % 256) as usize;
    for (i, count) in hist.iter_mut().enumerate() {
        *count += spread;
        if i < residual {
            *count += 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    let scale = 255.0 / area as f32;
    for (i, count) in hist.iter().enumerate() {
        cdf += count;
        lut[i] = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Tile indices either side of a pixel and the blend weight towards the second.
fn neighbours(pos: u32, tile: u32, count: usize) -> (usize, usize, f32) {
    let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let first = (f.floor() as usize).min(count - 1);
    let second = (first + 1).min(count - 1);
    (first, second, f - f.floor())
}

fn lerp(a: u8, b: u8, t: f32) -> f32 {
    a as f32 + (b as f32 - a as f32) * t
}
