// ============================================================================
// OUTPUT SURFACE — fixed-resolution RGBA surface with taint tracking
// ============================================================================
//
// The surface tracks pixel provenance the way a browser canvas does: drawing
// a raster whose source was cross-origin (fetched without CORS approval)
// taints the surface, and any later pixel readback or export fails with
// `SignError::TaintedSurface`. Taint blocks readback only — it never corrupts
// in-memory overlay state, so the user can retry with different sources.

use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::error::SignError;
use crate::geometry::CanvasPoint;

/// Where a decoded raster's bytes came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Same-origin, or cross-origin with CORS approval: safe to read back.
    Clean,
    /// Cross-origin without approval: drawing this taints the surface.
    CrossOrigin,
}

/// A decoded raster plus the provenance of its bytes.
#[derive(Clone, Debug)]
pub struct Raster {
    pub image: RgbaImage,
    pub provenance: Provenance,
}

impl Raster {
    pub fn clean(image: RgbaImage) -> Self {
        Raster {
            image,
            provenance: Provenance::Clean,
        }
    }

    pub fn cross_origin(image: RgbaImage) -> Self {
        Raster {
            image,
            provenance: Provenance::CrossOrigin,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Fixed-size RGBA drawing surface.
pub struct Surface {
    pixels: RgbaImage,
    tainted: bool,
}

impl Surface {
    /// Create a surface filled with `background`.
    pub fn new(width: u32, height: u32, background: Rgba<u8>) -> Self {
        Surface {
            pixels: RgbaImage::from_pixel(width, height, background),
            tainted: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    /// Read one pixel. Fails on a tainted surface — this is the 1×1 probe the
    /// compositor runs right after the base draw.
    pub fn read_pixel(&self, x: u32, y: u32) -> Result<Rgba<u8>, SignError> {
        if self.tainted {
            return Err(SignError::TaintedSurface);
        }
        if x >= self.width() || y >= self.height() {
            return Err(SignError::Export(format!(
                "pixel readback out of bounds: ({}, {})",
                x, y
            )));
        }
        Ok(*self.pixels.get_pixel(x, y))
    }

    /// Consume the surface and return its pixels for encoding.
    /// Fails on a tainted surface.
    pub fn into_image(self) -> Result<RgbaImage, SignError> {
        if self.tainted {
            return Err(SignError::TaintedSurface);
        }
        Ok(self.pixels)
    }

    // ---- drawing ------------------------------------------------------------

    /// Draw `raster` axis-aligned, resized to `dst_w`×`dst_h`, with its top-left
    /// corner at (`dst_x`, `dst_y`). Marks the surface tainted for cross-origin
    /// sources.
    pub fn draw_raster(&mut self, raster: &Raster, dst_x: i32, dst_y: i32, dst_w: u32, dst_h: u32) {
        if raster.provenance == Provenance::CrossOrigin {
            self.tainted = true;
        }
        if dst_w == 0 || dst_h == 0 || raster.width() == 0 || raster.height() == 0 {
            return;
        }
        let scaled = if raster.width() == dst_w && raster.height() == dst_h {
            raster.image.clone()
        } else {
            imageops::resize(&raster.image, dst_w, dst_h, imageops::FilterType::Triangle)
        };
        self.blit_rgba(scaled.as_raw(), dst_w, dst_h, dst_x, dst_y);
    }

    /// Draw `raster` scaled to `dst_w`×`dst_h`, rotated by `rotation` radians
    /// (clockwise-positive, screen coordinates) about `center`, centered on
    /// `center`. Uses inverse mapping with bilinear sampling.
    pub fn draw_raster_rotated(
        &mut self,
        raster: &Raster,
        center: CanvasPoint,
        dst_w: f32,
        dst_h: f32,
        rotation: f32,
    ) {
        if raster.provenance == Provenance::CrossOrigin {
            self.tainted = true;
        }
        if dst_w <= 0.0 || dst_h <= 0.0 || raster.width() == 0 || raster.height() == 0 {
            return;
        }

        // Destination bounding box of the rotated rect
        let half_w = dst_w / 2.0;
        let half_h = dst_h / 2.0;
        let (sin, cos) = rotation.sin_cos();
        let ext_x = half_w * cos.abs() + half_h * sin.abs();
        let ext_y = half_w * sin.abs() + half_h * cos.abs();
        let x0 = ((center.x - ext_x).floor() as i32).max(0);
        let y0 = ((center.y - ext_y).floor() as i32).max(0);
        let x1 = ((center.x + ext_x).ceil() as i32).min(self.width() as i32);
        let y1 = ((center.y + ext_y).ceil() as i32).min(self.height() as i32);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let src = &raster.image;
        let sx = src.width() as f32 / dst_w;
        let sy = src.height() as f32 / dst_h;
        let surf_w = self.width() as usize;

        // Inverse-map each destination pixel back into source space
        self.pixels
            .par_chunks_exact_mut(surf_w * 4)
            .enumerate()
            .skip(y0 as usize)
            .take((y1 - y0) as usize)
            .for_each(|(dy, row)| {
                for dx in x0..x1 {
                    // Undo the rotation about center
                    let rel_x = dx as f32 + 0.5 - center.x;
                    let rel_y = dy as f32 + 0.5 - center.y;
                    let ux = rel_x * cos + rel_y * sin;
                    let uy = -rel_x * sin + rel_y * cos;
                    let src_x = (ux + half_w) * sx;
                    let src_y = (uy + half_h) * sy;
                    if src_x < 0.0
                        || src_y < 0.0
                        || src_x >= src.width() as f32
                        || src_y >= src.height() as f32
                    {
                        continue;
                    }
                    let px = sample_bilinear(src, src_x, src_y);
                    if px[3] == 0 {
                        continue;
                    }
                    let idx = dx as usize * 4;
                    blend_src_over(&mut row[idx..idx + 4], px);
                }
            });
    }

    /// Alpha-blend a raw RGBA buffer onto the surface at (`dst_x`, `dst_y`).
    /// Pixels falling outside the surface are clipped.
    pub fn blit_rgba(&mut self, data: &[u8], src_w: u32, src_h: u32, dst_x: i32, dst_y: i32) {
        let surf_w = self.width() as i32;
        let surf_h = self.height() as i32;
        for sy in 0..src_h as i32 {
            let ty = dst_y + sy;
            if ty < 0 || ty >= surf_h {
                continue;
            }
            for sx in 0..src_w as i32 {
                let tx = dst_x + sx;
                if tx < 0 || tx >= surf_w {
                    continue;
                }
                let sidx = (sy as usize * src_w as usize + sx as usize) * 4;
                let src_px = [data[sidx], data[sidx + 1], data[sidx + 2], data[sidx + 3]];
                if src_px[3] == 0 {
                    continue;
                }
                let dst = self.pixels.get_pixel_mut(tx as u32, ty as u32);
                blend_src_over(&mut dst.0, src_px);
            }
        }
    }

    /// Fill a polygon (ordered vertices, canvas space) with a solid color
    /// using even-odd scanline filling.
    pub fn fill_polygon(&mut self, points: &[(f32, f32)], color: Rgba<u8>) {
        if points.len() < 3 {
            return;
        }
        let min_y = points.iter().map(|p| p.1).fold(f32::MAX, f32::min);
        let max_y = points.iter().map(|p| p.1).fold(f32::MIN, f32::max);
        let y0 = (min_y.floor() as i32).max(0);
        let y1 = (max_y.ceil() as i32).min(self.height() as i32 - 1);
        let surf_w = self.width() as i32;

        for y in y0..=y1 {
            let scan_y = y as f32 + 0.5;
            // Collect crossings of this scanline with polygon edges
            let mut xs: Vec<f32> = Vec::new();
            for i in 0..points.len() {
                let (ax, ay) = points[i];
                let (bx, by) = points[(i + 1) % points.len()];
                if (ay <= scan_y && by > scan_y) || (by <= scan_y && ay > scan_y) {
                    let t = (scan_y - ay) / (by - ay);
                    xs.push(ax + t * (bx - ax));
                }
            }
            xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            for pair in xs.chunks_exact(2) {
                let x_start = (pair[0].ceil() as i32).max(0);
                let x_end = (pair[1].floor() as i32).min(surf_w - 1);
                for x in x_start..=x_end {
                    let dst = self.pixels.get_pixel_mut(x as u32, y as u32);
                    blend_src_over(&mut dst.0, color.0);
                }
            }
        }
    }

    /// Stroke a closed polygon border with the given width.
    pub fn stroke_polygon(&mut self, points: &[(f32, f32)], color: Rgba<u8>, width: f32) {
        if points.len() < 2 {
            return;
        }
        for i in 0..points.len() {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            self.stroke_segment(a, b, color, width);
        }
    }

    fn stroke_segment(&mut self, a: (f32, f32), b: (f32, f32), color: Rgba<u8>, width: f32) {
        let half = width / 2.0;
        let x0 = ((a.0.min(b.0) - half).floor() as i32).max(0);
        let y0 = ((a.1.min(b.1) - half).floor() as i32).max(0);
        let x1 = ((a.0.max(b.0) + half).ceil() as i32).min(self.width() as i32 - 1);
        let y1 = ((a.1.max(b.1) + half).ceil() as i32).min(self.height() as i32 - 1);

        let ab = (b.0 - a.0, b.1 - a.1);
        let len_sq = ab.0 * ab.0 + ab.1 * ab.1;

        for y in y0..=y1 {
            for x in x0..=x1 {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;
                // Distance from pixel center to segment ab
                let t = if len_sq > 0.0 {
                    (((px - a.0) * ab.0 + (py - a.1) * ab.1) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let cx = a.0 + t * ab.0;
                let cy = a.1 + t * ab.1;
                let d = ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt();
                if d <= half {
                    let dst = self.pixels.get_pixel_mut(x as u32, y as u32);
                    blend_src_over(&mut dst.0, color.0);
                }
            }
        }
    }
}

/// Standard src-over alpha blend on u8 channels, in place.
fn blend_src_over(dst: &mut [u8], src: [u8; 4]) {
    let sa = src[3] as f32 / 255.0;
    if sa >= 1.0 {
        dst.copy_from_slice(&src);
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        dst.copy_from_slice(&[0, 0, 0, 0]);
        return;
    }
    for c in 0..3 {
        let s = src[c] as f32;
        let d = dst[c] as f32;
        dst[c] = (((s * sa) + d * da * (1.0 - sa)) / out_a).round() as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

/// Bilinear sample at fractional source coordinates (clamped to edges).
fn sample_bilinear(src: &RgbaImage, x: f32, y: f32) -> [u8; 4] {
    let max_x = src.width() - 1;
    let max_y = src.height() - 1;
    let fx = (x - 0.5).max(0.0);
    let fy = (y - 0.5).max(0.0);
    let x0 = (fx.floor() as u32).min(max_x);
    let y0 = (fy.floor() as u32).min(max_y);
    let x1 = (x0 + 1).min(max_x);
    let y1 = (y0 + 1).min(max_y);
    let tx = fx - x0 as f32;
    let ty = fy - y0 as f32;

    let p00 = src.get_pixel(x0, y0).0;
    let p10 = src.get_pixel(x1, y0).0;
    let p01 = src.get_pixel(x0, y1).0;
    let p11 = src.get_pixel(x1, y1).0;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f32 * (1.0 - tx) + p10[c] as f32 * tx;
        let bottom = p01[c] as f32 * (1.0 - tx) + p11[c] as f32 * tx;
        out[c] = (top * (1.0 - ty) + bottom * ty).round() as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(color))
    }

    #[test]
    fn clean_draw_keeps_readback_working() {
        let mut surf = Surface::new(16, 16, Rgba([0, 0, 0, 255]));
        surf.draw_raster(&Raster::clean(solid(4, 4, [255, 0, 0, 255])), 0, 0, 8, 8);
        let px = surf.read_pixel(2, 2).unwrap();
        assert_eq!(px.0, [255, 0, 0, 255]);
    }

    #[test]
    fn cross_origin_draw_taints_readback_and_export() {
        let mut surf = Surface::new(16, 16, Rgba([0, 0, 0, 255]));
        surf.draw_raster(
            &Raster::cross_origin(solid(4, 4, [1, 2, 3, 255])),
            0,
            0,
            4,
            4,
        );
        assert!(surf.is_tainted());
        assert!(matches!(
            surf.read_pixel(0, 0),
            Err(SignError::TaintedSurface)
        ));
        assert!(matches!(surf.into_image(), Err(SignError::TaintedSurface)));
    }

    #[test]
    fn polygon_fill_covers_interior_not_exterior() {
        let mut surf = Surface::new(32, 32, Rgba([0, 0, 0, 255]));
        let quad = [(8.0, 8.0), (24.0, 8.0), (24.0, 24.0), (8.0, 24.0)];
        surf.fill_polygon(&quad, Rgba([0, 255, 0, 255]));
        assert_eq!(surf.read_pixel(16, 16).unwrap().0, [0, 255, 0, 255]);
        assert_eq!(surf.read_pixel(2, 2).unwrap().0, [0, 0, 0, 255]);
    }

    #[test]
    fn rotated_draw_by_zero_matches_axis_aligned_center() {
        let mut a = Surface::new(20, 20, Rgba([0, 0, 0, 255]));
        let raster = Raster::clean(solid(4, 4, [9, 9, 9, 255]));
        a.draw_raster_rotated(&raster, CanvasPoint::new(10.0, 10.0), 8.0, 8.0, 0.0);
        // Center pixel is inside the drawn rect
        assert_eq!(a.read_pixel(10, 10).unwrap().0, [9, 9, 9, 255]);
        // Far corner untouched
        assert_eq!(a.read_pixel(1, 1).unwrap().0, [0, 0, 0, 255]);
    }

    #[test]
    fn fully_transparent_source_pixels_leave_destination_alone() {
        let mut surf = Surface::new(4, 4, Rgba([7, 7, 7, 255]));
        surf.blit_rgba(&[0u8; 4 * 4], 2, 2, 0, 0);
        assert_eq!(surf.read_pixel(0, 0).unwrap().0, [7, 7, 7, 255]);
    }
}
