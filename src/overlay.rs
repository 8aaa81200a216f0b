// ============================================================================
// OVERLAY MODEL — plain data records, never DOM-style element state
// ============================================================================
//
// An overlay is a text or image sticker positioned on top of the base
// artwork. The record is the single source of truth; any on-screen
// representation is a projection of it. Positions are stored as
// container-relative percentages of the overlay's *center* so the layout
// survives container resize.

use uuid::Uuid;

use crate::geometry::{PercentPoint, Size};
use crate::surface::Raster;

/// Default stacking order for text overlays.
pub const Z_TEXT_DEFAULT: i32 = 20;
/// Default stacking order for image overlays (above text).
pub const Z_IMAGE_DEFAULT: i32 = 30;
/// The selected overlay is temporarily promoted above everything.
pub const Z_ACTIVE: i32 = 1000;

/// Minimum image-overlay width in container pixels, enforced by resize.
pub const MIN_OVERLAY_WIDTH: f32 = 20.0;

/// Opaque overlay identity, stable for the overlay's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OverlayId(Uuid);

impl OverlayId {
    fn fresh() -> Self {
        OverlayId(Uuid::new_v4())
    }
}

/// Text-specific overlay payload.
#[derive(Clone, Debug)]
pub struct TextPayload {
    pub content: String,
    pub color: [u8; 3],
    pub font_size_px: f32,
    pub font_family: String,
}

/// Image-specific overlay payload. The raster is owned exclusively by the
/// overlay; `None` means the backing image failed to decode — the compositor
/// skips such overlays instead of aborting.
#[derive(Clone, Debug)]
pub struct ImagePayload {
    pub raster: Option<Raster>,
    pub width_px: f32,
    pub height_px: f32,
    /// width / height, fixed at creation and preserved through resize.
    pub aspect_ratio: f32,
}

#[derive(Clone, Debug)]
pub enum OverlayKind {
    Text(TextPayload),
    Image(ImagePayload),
}

#[derive(Clone, Debug)]
pub struct Overlay {
    pub id: OverlayId,
    pub kind: OverlayKind,
    /// Overlay center, percent of container size, each axis in `0..=100`.
    pub position_percent: PercentPoint,
    /// Radians, clockwise-positive (screen coordinates). Stored unbounded;
    /// normalize only for display.
    pub rotation: f32,
    /// Base stacking order (type default unless explicitly edited).
    pub z: i32,
}

impl Overlay {
    pub fn text(content: String, color: [u8; 3], font_size_px: f32, font_family: String) -> Self {
        Overlay {
            id: OverlayId::fresh(),
            kind: OverlayKind::Text(TextPayload {
                content,
                color,
                font_size_px,
                font_family,
            }),
            position_percent: PercentPoint::CENTER,
            rotation: 0.0,
            z: Z_TEXT_DEFAULT,
        }
    }

    pub fn image(raster: Raster, width_px: f32) -> Self {
        let aspect = if raster.height() > 0 {
            raster.width() as f32 / raster.height() as f32
        } else {
            1.0
        };
        Overlay {
            id: OverlayId::fresh(),
            kind: OverlayKind::Image(ImagePayload {
                raster: Some(raster),
                width_px: width_px.max(MIN_OVERLAY_WIDTH),
                height_px: width_px.max(MIN_OVERLAY_WIDTH) / aspect,
                aspect_ratio: aspect,
            }),
            position_percent: PercentPoint::CENTER,
            rotation: 0.0,
            z: Z_IMAGE_DEFAULT,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, OverlayKind::Image(_))
    }

    /// The stacking default for this overlay's type.
    pub fn default_z(&self) -> i32 {
        match self.kind {
            OverlayKind::Text(_) => Z_TEXT_DEFAULT,
            OverlayKind::Image(_) => Z_IMAGE_DEFAULT,
        }
    }

    /// Overlay box size in container pixels. Image overlays carry explicit
    /// dimensions; text overlays estimate their box from font metrics the way
    /// the display layer measures them (0.6 em advance per char, 1.2 em tall,
    /// widest line wins).
    pub fn display_size(&self) -> Size {
        match &self.kind {
            OverlayKind::Image(img) => Size::new(img.width_px, img.height_px),
            OverlayKind::Text(text) => {
                let longest = text
                    .content
                    .lines()
                    .map(|l| l.chars().count())
                    .max()
                    .unwrap_or(0);
                let lines = text.content.lines().count().max(1);
                Size::new(
                    longest as f32 * text.font_size_px * 0.6,
                    lines as f32 * text.font_size_px * 1.2,
                )
            }
        }
    }

    /// Rotation normalized to `(-π, π]` for display purposes only.
    pub fn display_rotation(&self) -> f32 {
        let tau = std::f32::consts::TAU;
        let mut r = self.rotation % tau;
        if r > std::f32::consts::PI {
            r -= tau;
        } else if r <= -std::f32::consts::PI {
            r += tau;
        }
        r
    }
}

/// The ordered set of overlays plus the active (selected) one.
#[derive(Default)]
pub struct OverlayStack {
    overlays: Vec<Overlay>,
    active: Option<OverlayId>,
}

impl OverlayStack {
    pub fn new() -> Self {
        OverlayStack::default()
    }

    pub fn push(&mut self, overlay: Overlay) -> OverlayId {
        let id = overlay.id;
        self.overlays.push(overlay);
        id
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn get(&self, id: OverlayId) -> Option<&Overlay> {
        self.overlays.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: OverlayId) -> Option<&mut Overlay> {
        self.overlays.iter_mut().find(|o| o.id == id)
    }

    pub fn remove(&mut self, id: OverlayId) {
        self.overlays.retain(|o| o.id != id);
        if self.active == Some(id) {
            self.active = None;
        }
    }

    pub fn clear(&mut self) {
        self.overlays.clear();
        self.active = None;
    }

    pub fn active(&self) -> Option<OverlayId> {
        self.active
    }

    /// Mark `id` as the active selection, promoting it above all others.
    /// Any previously active overlay drops back to its type default.
    pub fn select(&mut self, id: OverlayId) {
        if self.get(id).is_none() {
            return;
        }
        if let Some(prev) = self.active
            && prev != id
            && let Some(o) = self.get_mut(prev)
        {
            o.z = o.default_z();
        }
        self.active = Some(id);
    }

    /// Clear the selection, restoring the overlay's type-default z.
    pub fn deselect(&mut self) {
        if let Some(prev) = self.active.take()
            && let Some(o) = self.get_mut(prev)
        {
            o.z = o.default_z();
        }
    }

    /// Stacking order actually used for drawing: the active overlay is
    /// promoted above all others while selected.
    pub fn effective_z(&self, overlay: &Overlay) -> i32 {
        if self.active == Some(overlay.id) {
            Z_ACTIVE
        } else {
            overlay.z
        }
    }

    /// Overlays sorted ascending by effective z (draw order). Ties keep
    /// insertion order.
    pub fn in_draw_order(&self) -> Vec<&Overlay> {
        let mut refs: Vec<&Overlay> = self.overlays.iter().collect();
        refs.sort_by_key(|o| self.effective_z(o));
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_image(w: u32, h: u32) -> Raster {
        Raster::clean(image::RgbaImage::new(w, h))
    }

    #[test]
    fn image_overlays_default_above_text() {
        let text = Overlay::text("gm".into(), [0, 0, 0], 24.0, "Arial".into());
        let img = Overlay::image(dummy_image(10, 10), 64.0);
        assert!(img.z > text.z);
    }

    #[test]
    fn selection_promotes_then_restores_type_default() {
        let mut stack = OverlayStack::new();
        let text_id = stack.push(Overlay::text("hi".into(), [0, 0, 0], 24.0, "Arial".into()));
        let img_id = stack.push(Overlay::image(dummy_image(8, 8), 64.0));

        stack.select(text_id);
        let order: Vec<OverlayId> = stack.in_draw_order().iter().map(|o| o.id).collect();
        assert_eq!(*order.last().unwrap(), text_id, "active draws last");

        // Selecting the image drops the text back below it
        stack.select(img_id);
        let order: Vec<OverlayId> = stack.in_draw_order().iter().map(|o| o.id).collect();
        assert_eq!(order, vec![text_id, img_id]);

        stack.deselect();
        assert_eq!(stack.get(img_id).unwrap().z, Z_IMAGE_DEFAULT);
    }

    #[test]
    fn aspect_ratio_is_fixed_at_creation() {
        let o = Overlay::image(dummy_image(200, 100), 80.0);
        match &o.kind {
            OverlayKind::Image(img) => {
                assert!((img.aspect_ratio - 2.0).abs() < 1e-6);
                assert!((img.height_px - 40.0).abs() < 1e-3);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn display_rotation_is_normalized_storage_is_not() {
        let mut o = Overlay::text("x".into(), [0, 0, 0], 16.0, "Arial".into());
        o.rotation = 3.0 * std::f32::consts::TAU + 0.5;
        assert!(o.rotation > 10.0);
        assert!((o.display_rotation() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn remove_clears_active_when_it_was_selected() {
        let mut stack = OverlayStack::new();
        let id = stack.push(Overlay::text("x".into(), [0, 0, 0], 16.0, "Arial".into()));
        stack.select(id);
        stack.remove(id);
        assert!(stack.active().is_none());
        assert!(stack.is_empty());
    }
}
