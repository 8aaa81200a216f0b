// ============================================================================
// COMPOSITOR — base artwork + sign region + overlays → 2048×2048 raster
// ============================================================================
//
// Draw order is strict (later draws occlude earlier ones):
//   1. background fill
//   2. base artwork, scaled to fit the square, centered (letterbox/pillarbox)
//   3. sign-region polygon fill + fixed-width border stroke
//   4. overlays ascending by effective z, each rotated about its mapped center
//
// A 1×1 pixel readback probe runs immediately after the base draw: if the
// base tainted the surface, the composite aborts with TaintedSurfaceError
// before any further work is invested.

use image::{Rgba, RgbaImage};

use crate::error::SignError;
use crate::geometry::{CANVAS_EDGE, Mapper};
use crate::overlay::{OverlayKind, OverlayStack};
use crate::surface::{Raster, Surface};
use crate::text::{FontStore, rasterize_centered};
use crate::{log_info, log_warn};

/// Canvas background behind the letterboxed artwork.
pub const BACKGROUND: Rgba<u8> = Rgba([245, 245, 245, 255]);
/// Sign border stroke color.
pub const SIGN_BORDER_COLOR: Rgba<u8> = Rgba([38, 32, 28, 255]);
/// Sign border stroke width in canvas pixels.
pub const SIGN_BORDER_WIDTH: f32 = 6.0;

/// Everything one composite pass needs.
pub struct CompositeJob<'a> {
    pub base: &'a Raster,
    /// Sign-region polygon in canvas space.
    pub sign_polygon: &'a [(f32, f32)],
    /// Solid fill for the sign region.
    pub fill_color: [u8; 3],
    pub overlays: &'a OverlayStack,
    /// Display geometry snapshot used to map overlay transforms to canvas space.
    pub mapper: Mapper,
}

/// Run the full composite pass. Deterministic for identical inputs.
pub fn composite(job: &CompositeJob<'_>, fonts: &mut FontStore) -> Result<Surface, SignError> {
    let mut surface = Surface::new(CANVAS_EDGE, CANVAS_EDGE, BACKGROUND);

    draw_base_letterboxed(&mut surface, job.base);

    // Taint probe: fail before polygon/overlay work if the base is unreadable
    surface.read_pixel(CANVAS_EDGE / 2, CANVAS_EDGE / 2)?;

    // Sign region: solid fill, then border for visual definition
    let fill = Rgba([job.fill_color[0], job.fill_color[1], job.fill_color[2], 255]);
    surface.fill_polygon(job.sign_polygon, fill);
    surface.stroke_polygon(job.sign_polygon, SIGN_BORDER_COLOR, SIGN_BORDER_WIDTH);

    for overlay in job.overlays.in_draw_order() {
        let center = job.mapper.percent_to_canvas(overlay.position_percent);
        match &overlay.kind {
            OverlayKind::Image(img) => {
                let Some(raster) = &img.raster else {
                    // Backing raster never decoded: skip, don't abort
                    log_warn!("skipping image overlay {:?}: no decoded raster", overlay.id);
                    continue;
                };
                let w = img.width_px * job.mapper.scale_x();
                let h = img.height_px * job.mapper.scale_y();
                surface.draw_raster_rotated(raster, center, w, h, overlay.rotation);
            }
            OverlayKind::Text(text) => {
                let Some(font) = fonts.get(&text.font_family) else {
                    log_warn!(
                        "skipping text overlay {:?}: font family '{}' not available",
                        overlay.id,
                        text.font_family
                    );
                    continue;
                };
                // Rasterize at the canvas-scaled font size, then rotate about
                // the mapped center (centered / middle-baseline placement)
                let canvas_font_size = text.font_size_px * job.mapper.scale_y();
                let color = [text.color[0], text.color[1], text.color[2], 255];
                let Some(block) =
                    rasterize_centered(&font, &text.content, canvas_font_size, color)
                else {
                    continue;
                };
                let Some(img) = RgbaImage::from_raw(block.width, block.height, block.buf) else {
                    continue;
                };
                surface.draw_raster_rotated(
                    &Raster::clean(img),
                    center,
                    block.width as f32,
                    block.height as f32,
                    overlay.rotation,
                );
            }
        }
    }

    log_info!(
        "composited {} overlay(s) onto {}×{} canvas",
        job.overlays.len(),
        CANVAS_EDGE,
        CANVAS_EDGE
    );
    Ok(surface)
}

/// Draw the base artwork scaled to fit the square output while preserving
/// aspect ratio, centered on the shorter axis.
fn draw_base_letterboxed(surface: &mut Surface, base: &Raster) {
    if base.width() == 0 || base.height() == 0 {
        return;
    }
    let cw = surface.width() as f32;
    let ch = surface.height() as f32;
    let scale = (cw / base.width() as f32).min(ch / base.height() as f32);
    let dst_w = (base.width() as f32 * scale).round() as u32;
    let dst_h = (base.height() as f32 * scale).round() as u32;
    let dst_x = ((cw - dst_w as f32) / 2.0).round() as i32;
    let dst_y = ((ch - dst_h as f32) / 2.0).round() as i32;
    surface.draw_raster(base, dst_x, dst_y, dst_w, dst_h);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::overlay::{ImagePayload, Overlay, OverlayKind};

    fn solid_raster(w: u32, h: u32, color: [u8; 4]) -> Raster {
        Raster::clean(RgbaImage::from_pixel(w, h, Rgba(color)))
    }

    fn job_mapper() -> Mapper {
        Mapper::new(Size::new(512.0, 512.0))
    }

    #[test]
    fn composite_is_deterministic_for_identical_inputs() {
        let base = solid_raster(100, 80, [10, 20, 30, 255]);
        let mut overlays = OverlayStack::new();
        let mut sticker = Overlay::image(solid_raster(16, 16, [200, 0, 0, 255]), 64.0);
        sticker.rotation = 0.35;
        overlays.push(sticker);

        let job = CompositeJob {
            base: &base,
            sign_polygon: &[(500.0, 500.0), (1500.0, 520.0), (1400.0, 1600.0), (520.0, 1580.0)],
            fill_color: [60, 160, 80],
            overlays: &overlays,
            mapper: job_mapper(),
        };
        let mut fonts = FontStore::new();
        let a = composite(&job, &mut fonts).unwrap().into_image().unwrap();
        let b = composite(&job, &mut fonts).unwrap().into_image().unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn base_is_letterboxed_and_centered() {
        let base = solid_raster(100, 50, [255, 0, 0, 255]); // wide: pillarbox top/bottom
        let overlays = OverlayStack::new();
        let job = CompositeJob {
            base: &base,
            sign_polygon: &[],
            fill_color: [0, 0, 0],
            overlays: &overlays,
            mapper: job_mapper(),
        };
        let img = composite(&job, &mut FontStore::new())
            .unwrap()
            .into_image()
            .unwrap();
        // Center: base pixels. Top edge: background (letterbox band).
        assert_eq!(img.get_pixel(1024, 1024).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(1024, 10).0, BACKGROUND.0);
    }

    #[test]
    fn sign_region_is_filled_over_the_base() {
        let base = solid_raster(64, 64, [0, 0, 255, 255]);
        let overlays = OverlayStack::new();
        let polygon = [(800.0, 800.0), (1200.0, 800.0), (1200.0, 1200.0), (800.0, 1200.0)];
        let job = CompositeJob {
            base: &base,
            sign_polygon: &polygon,
            fill_color: [50, 150, 70],
            overlays: &overlays,
            mapper: job_mapper(),
        };
        let img = composite(&job, &mut FontStore::new())
            .unwrap()
            .into_image()
            .unwrap();
        assert_eq!(img.get_pixel(1000, 1000).0, [50, 150, 70, 255]);
    }

    #[test]
    fn cross_origin_base_aborts_at_the_probe() {
        let base = Raster::cross_origin(RgbaImage::from_pixel(32, 32, Rgba([9, 9, 9, 255])));
        let overlays = OverlayStack::new();
        let job = CompositeJob {
            base: &base,
            sign_polygon: &[],
            fill_color: [0, 0, 0],
            overlays: &overlays,
            mapper: job_mapper(),
        };
        assert!(matches!(
            composite(&job, &mut FontStore::new()),
            Err(SignError::TaintedSurface)
        ));
    }

    #[test]
    fn image_overlay_without_raster_is_skipped_not_fatal() {
        let base = solid_raster(64, 64, [1, 1, 1, 255]);
        let mut overlays = OverlayStack::new();
        let mut broken = Overlay::image(solid_raster(8, 8, [0, 0, 0, 255]), 64.0);
        if let OverlayKind::Image(ImagePayload { raster, .. }) = &mut broken.kind {
            *raster = None;
        }
        overlays.push(broken);
        let job = CompositeJob {
            base: &base,
            sign_polygon: &[],
            fill_color: [0, 0, 0],
            overlays: &overlays,
            mapper: job_mapper(),
        };
        assert!(composite(&job, &mut FontStore::new()).is_ok());
    }
}
