// ============================================================================
// TEXT RASTERIZATION — ab_glyph layout + coverage-buffer rendering
// ============================================================================

use std::collections::HashMap;

use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};

/// A text block rasterized into a tight RGBA buffer. The buffer's center is
/// the text block's center, so callers can place it centered/middle-baseline
/// by aligning buffer center with the target point.
pub struct TextRaster {
    pub buf: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Lay out one line centered at x=0, returning positioned glyphs and width.
fn layout_line(font: &FontArc, line: &str, font_size: f32) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last: Option<GlyphId> = None;

    for ch in line.chars() {
        let gid = font.glyph_id(ch);
        if let Some(prev) = last {
            cursor_x += scaled.kern(prev, gid);
        }
        glyphs.push((gid, cursor_x));
        cursor_x += scaled.h_advance(gid);
        last = Some(gid);
    }

    // Center the line on x=0
    let half = cursor_x / 2.0;
    for g in &mut glyphs {
        g.1 -= half;
    }
    (glyphs, cursor_x)
}

/// Rasterize `text` (multi-line via '\n', centered per line) at `font_size`
/// into a tight RGBA buffer. Returns `None` when nothing would be drawn.
pub fn rasterize_centered(
    font: &FontArc,
    text: &str,
    font_size: f32,
    color: [u8; 4],
) -> Option<TextRaster> {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();
    let line_height = scaled.height();

    let lines: Vec<&str> = text.split('\n').collect();
    let total_height = lines.len() as f32 * line_height;

    // Position every glyph with the whole block centered on (0,0)
    let mut all: Vec<(GlyphId, f32, f32)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let baseline_y = i as f32 * line_height + ascent - total_height / 2.0;
        let (glyphs, _w) = layout_line(font, line, font_size);
        for (gid, x) in glyphs {
            all.push((gid, x, baseline_y));
        }
    }
    if all.is_empty() {
        return None;
    }

    // Bounding box of all glyphs
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for &(gid, gx, gy) in &all {
        let glyph = gid.with_scale_and_position(font_size, point(gx, gy));
        let bounds = font.glyph_bounds(&glyph);
        min_x = min_x.min(bounds.min.x);
        min_y = min_y.min(bounds.min.y);
        max_x = max_x.max(bounds.max.x);
        max_y = max_y.max(bounds.max.y);
    }
    if min_x >= max_x || min_y >= max_y {
        return None;
    }

    let pad = 2.0;
    min_x -= pad;
    min_y -= pad;
    max_x += pad;
    max_y += pad;

    let buf_w = (max_x - min_x).ceil() as u32;
    let buf_h = (max_y - min_y).ceil() as u32;
    if buf_w == 0 || buf_h == 0 {
        return None;
    }

    // Single-channel coverage, then converted to RGBA
    let mut coverage = vec![0.0f32; buf_w as usize * buf_h as usize];
    for &(gid, gx, gy) in &all {
        let glyph = gid.with_scale_and_position(font_size, point(gx - min_x, gy - min_y));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let b = outlined.px_bounds();
            outlined.draw(|px, py, cov| {
                let x = px as i32 + b.min.x as i32;
                let y = py as i32 + b.min.y as i32;
                if x >= 0 && y >= 0 && (x as u32) < buf_w && (y as u32) < buf_h {
                    let idx = y as usize * buf_w as usize + x as usize;
                    coverage[idx] = coverage[idx].max(cov);
                }
            });
        }
    }

    let mut buf = vec![0u8; buf_w as usize * buf_h as usize * 4];
    for (i, &cov) in coverage.iter().enumerate() {
        if cov > 0.001 {
            let idx = i * 4;
            buf[idx] = color[0];
            buf[idx + 1] = color[1];
            buf[idx + 2] = color[2];
            buf[idx + 3] = (color[3] as f32 * cov).round().min(255.0) as u8;
        }
    }

    Some(TextRaster {
        buf,
        width: buf_w,
        height: buf_h,
    })
}

/// Load a font by family name from the system.
/// Returns `None` if the font cannot be found or loaded.
pub fn load_system_font(family: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let source = SystemSource::new();
    let handle = source
        .select_best_match(
            &[
                FamilyName::Title(family.to_string()),
                FamilyName::SansSerif,
            ],
            &Properties::new(),
        )
        .ok()?;

    let font_data = handle.load().ok()?;
    let font_data_copy = font_data.copy_font_data()?;
    let bytes: Vec<u8> = (*font_data_copy).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// Per-export font cache: each family is looked up in the system source at
/// most once, including negative results.
#[derive(Default)]
pub struct FontStore {
    cache: HashMap<String, Option<FontArc>>,
}

impl FontStore {
    pub fn new() -> Self {
        FontStore::default()
    }

    pub fn get(&mut self, family: &str) -> Option<FontArc> {
        self.cache
            .entry(family.to_string())
            .or_insert_with(|| load_system_font(family))
            .clone()
    }
}
