// ============================================================================
// INTERACTION CONTROLLER — drag / rotate / resize gesture state machine
// ============================================================================
//
// One explicit state machine replaces the boolean-flag trio of ad-hoc
// drag/rotate/resize tracking: invalid combinations are unrepresentable. At
// most one gesture session exists at a time, it targets exactly one overlay,
// and the anchor captured at gesture start is read-only for the gesture's
// lifetime. Every exit path (pointer-up, pointer-cancel, leave, forced clear)
// funnels through `end_gesture`, which works from any state — so a missed
// pointer-up can never leave an overlay stuck "grabbed".

use crate::geometry::{ContainerPoint, Mapper};
use crate::overlay::{MIN_OVERLAY_WIDTH, OverlayId, OverlayKind, OverlayStack};

/// Where on the overlay the gesture started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitTarget {
    /// The overlay body: starts a drag.
    Body,
    /// The rotation handle: starts a rotate.
    RotateHandle,
    /// The resize handle: starts a resize (image overlays only).
    ResizeHandle,
}

/// Observable controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureMode {
    Idle,
    Dragging,
    Rotating,
    Resizing,
}

/// Gesture-start snapshot for a drag.
#[derive(Clone, Copy, Debug)]
struct DragAnchor {
    pointer: ContainerPoint,
    center: ContainerPoint,
}

/// Gesture-start snapshot for a rotate. `offset_angle` is the pointer's
/// initial angle about the overlay center minus the overlay's rotation at
/// gesture start, so the handle's angular offset is preserved and the
/// overlay never jumps under the pointer.
#[derive(Clone, Copy, Debug)]
struct RotateAnchor {
    center: ContainerPoint,
    offset_angle: f32,
}

/// Gesture-start snapshot for a resize. The overlay center is held fixed;
/// width/rotation are the values at gesture start.
#[derive(Clone, Copy, Debug)]
struct ResizeAnchor {
    pointer: ContainerPoint,
    width: f32,
    aspect_ratio: f32,
    rotation: f32,
}

#[derive(Clone, Copy, Debug)]
enum Gesture {
    Drag(DragAnchor),
    Rotate(RotateAnchor),
    Resize(ResizeAnchor),
}

/// The ephemeral interaction session: exists only between gesture-start and
/// gesture-end, targets exactly one overlay.
#[derive(Clone, Copy, Debug)]
struct GestureSession {
    target: OverlayId,
    gesture: Gesture,
}

/// Pointer-event driven controller mutating overlay transform state.
#[derive(Default)]
pub struct InteractionController {
    session: Option<GestureSession>,
}

impl InteractionController {
    pub fn new() -> Self {
        InteractionController::default()
    }

    pub fn mode(&self) -> GestureMode {
        match self.session {
            None => GestureMode::Idle,
            Some(GestureSession {
                gesture: Gesture::Drag(_),
                ..
            }) => GestureMode::Dragging,
            Some(GestureSession {
                gesture: Gesture::Rotate(_),
                ..
            }) => GestureMode::Rotating,
            Some(GestureSession {
                gesture: Gesture::Resize(_),
                ..
            }) => GestureMode::Resizing,
        }
    }

    /// The overlay currently being manipulated, if any.
    pub fn target(&self) -> Option<OverlayId> {
        self.session.map(|s| s.target)
    }

    /// Gesture start. Selects the overlay (z promotion) and captures the
    /// anchor snapshot for the gesture implied by `hit`. Starting a new
    /// gesture replaces any stale session.
    pub fn pointer_down(
        &mut self,
        stack: &mut OverlayStack,
        mapper: &Mapper,
        id: OverlayId,
        hit: HitTarget,
        pointer: ContainerPoint,
    ) {
        let Some(overlay) = stack.get(id) else {
            return;
        };
        let center = mapper.to_container_px(overlay.position_percent);

        let gesture = match hit {
            HitTarget::Body => Gesture::Drag(DragAnchor { pointer, center }),
            HitTarget::RotateHandle => {
                let start_angle = (pointer.y - center.y).atan2(pointer.x - center.x);
                Gesture::Rotate(RotateAnchor {
                    center,
                    offset_angle: start_angle - overlay.rotation,
                })
            }
            HitTarget::ResizeHandle => {
                // Only image overlays expose a resize handle
                let OverlayKind::Image(img) = &overlay.kind else {
                    return;
                };
                Gesture::Resize(ResizeAnchor {
                    pointer,
                    width: img.width_px,
                    aspect_ratio: img.aspect_ratio,
                    rotation: overlay.rotation,
                })
            }
        };

        stack.select(id);
        self.session = Some(GestureSession {
            target: id,
            gesture,
        });
    }

    /// Pointer movement during an active gesture. No-op while Idle.
    pub fn pointer_move(
        &mut self,
        stack: &mut OverlayStack,
        mapper: &Mapper,
        pointer: ContainerPoint,
    ) {
        let Some(session) = self.session else {
            return;
        };
        // Target vanished mid-gesture (removed overlay): force-clear
        let Some(overlay) = stack.get_mut(session.target) else {
            self.end_gesture();
            return;
        };

        match session.gesture {
            Gesture::Drag(anchor) => {
                let half = {
                    let s = overlay.display_size();
                    (s.w / 2.0, s.h / 2.0)
                };
                let mut cx = anchor.center.x + (pointer.x - anchor.pointer.x);
                let mut cy = anchor.center.y + (pointer.y - anchor.pointer.y);
                // Keep the overlay's bounding box inside the container,
                // independently per axis
                let container = mapper.container;
                if !container.is_degenerate() {
                    let min_x = half.0;
                    let max_x = (container.w - half.0).max(min_x);
                    let min_y = half.1;
                    let max_y = (container.h - half.1).max(min_y);
                    cx = cx.clamp(min_x, max_x);
                    cy = cy.clamp(min_y, max_y);
                }
                overlay.position_percent = mapper.to_percent(ContainerPoint::new(cx, cy));
            }
            Gesture::Rotate(anchor) => {
                let angle =
                    (pointer.y - anchor.center.y).atan2(pointer.x - anchor.center.x);
                overlay.rotation = angle - anchor.offset_angle;
            }
            Gesture::Resize(anchor) => {
                let OverlayKind::Image(img) = &mut overlay.kind else {
                    return;
                };
                // Project the screen-space displacement onto the overlay's own
                // (unrotated) width axis: rotate it by -rotation-at-start and
                // take the x component. Only this one diagonal component is
                // used — the original tool's approximation, kept as-is.
                let dx = pointer.x - anchor.pointer.x;
                let dy = pointer.y - anchor.pointer.y;
                let (sin, cos) = anchor.rotation.sin_cos();
                let projected = dx * cos + dy * sin;

                let new_w = (anchor.width + projected).max(MIN_OVERLAY_WIDTH);
                img.width_px = new_w;
                img.height_px = new_w / anchor.aspect_ratio;
                // Center stays fixed: position_percent is the center, so no
                // top/left recomputation can drift it.
            }
        }
    }

    /// Normal gesture end (pointer-up).
    pub fn pointer_up(&mut self) {
        self.end_gesture();
    }

    /// Abnormal gesture end (pointer-cancel, pointer left the surface).
    pub fn pointer_cancel(&mut self) {
        self.end_gesture();
    }

    /// Forced clear — the only way out of any state, usable from all of them.
    /// Safe to call redundantly.
    pub fn end_gesture(&mut self) {
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PercentPoint, Size};
    use crate::overlay::Overlay;
    use crate::surface::Raster;
    use image::RgbaImage;

    fn setup(container: Size) -> (OverlayStack, Mapper, InteractionController) {
        (OverlayStack::new(), Mapper::new(container), InteractionController::new())
    }

    fn image_overlay(stack: &mut OverlayStack, width_px: f32) -> OverlayId {
        stack.push(Overlay::image(Raster::clean(RgbaImage::new(100, 50)), width_px))
    }

    #[test]
    fn drag_clamps_bounding_box_inside_container() {
        let (mut stack, mapper, mut ctl) = setup(Size::new(400.0, 400.0));
        let id = image_overlay(&mut stack, 100.0); // 100×50 box

        ctl.pointer_down(
            &mut stack,
            &mapper,
            id,
            HitTarget::Body,
            ContainerPoint::new(200.0, 200.0),
        );
        assert_eq!(ctl.mode(), GestureMode::Dragging);

        // Yank far past the top-left corner
        ctl.pointer_move(&mut stack, &mapper, ContainerPoint::new(-5000.0, -5000.0));
        let o = stack.get(id).unwrap();
        let c = mapper.to_container_px(o.position_percent);
        let s = o.display_size();
        assert!(c.x - s.w / 2.0 >= -1e-3, "left edge clamped");
        assert!(c.y - s.h / 2.0 >= -1e-3, "top edge clamped");

        // And far past the bottom-right corner
        ctl.pointer_move(&mut stack, &mapper, ContainerPoint::new(5000.0, 5000.0));
        let o = stack.get(id).unwrap();
        let c = mapper.to_container_px(o.position_percent);
        assert!(c.x + s.w / 2.0 <= 400.0 + 1e-3, "right edge clamped");
        assert!(c.y + s.h / 2.0 <= 400.0 + 1e-3, "bottom edge clamped");
    }

    #[test]
    fn rotation_has_no_jump_at_gesture_start() {
        let (mut stack, mapper, mut ctl) = setup(Size::new(400.0, 400.0));
        let id = image_overlay(&mut stack, 100.0);
        stack.get_mut(id).unwrap().rotation = 0.7;

        // Grab the rotate handle wherever it happens to be
        let center = mapper.to_container_px(stack.get(id).unwrap().position_percent);
        let grab = ContainerPoint::new(center.x + 30.0, center.y - 60.0);
        ctl.pointer_down(&mut stack, &mapper, id, HitTarget::RotateHandle, grab);
        assert_eq!(ctl.mode(), GestureMode::Rotating);

        // Moving to the exact same pointer position must not change rotation
        ctl.pointer_move(&mut stack, &mapper, grab);
        assert!((stack.get(id).unwrap().rotation - 0.7).abs() < 1e-5);

        // Rotating the pointer by Δ about the center rotates the overlay by Δ
        let start_angle = (grab.y - center.y).atan2(grab.x - center.x);
        let delta = 0.4;
        let r = ((grab.x - center.x).powi(2) + (grab.y - center.y).powi(2)).sqrt();
        let moved = ContainerPoint::new(
            center.x + r * (start_angle + delta).cos(),
            center.y + r * (start_angle + delta).sin(),
        );
        ctl.pointer_move(&mut stack, &mapper, moved);
        assert!((stack.get(id).unwrap().rotation - (0.7 + delta)).abs() < 1e-4);
    }

    #[test]
    fn resize_enforces_min_width_and_aspect_with_fixed_center() {
        let (mut stack, mapper, mut ctl) = setup(Size::new(400.0, 400.0));
        let id = image_overlay(&mut stack, 100.0); // aspect 2.0
        let center_before = stack.get(id).unwrap().position_percent;

        ctl.pointer_down(
            &mut stack,
            &mapper,
            id,
            HitTarget::ResizeHandle,
            ContainerPoint::new(250.0, 200.0),
        );
        assert_eq!(ctl.mode(), GestureMode::Resizing);

        // Shrink hard past the minimum
        ctl.pointer_move(&mut stack, &mapper, ContainerPoint::new(-400.0, 200.0));
        let o = stack.get(id).unwrap();
        let OverlayKind::Image(img) = &o.kind else {
            unreachable!()
        };
        assert!((img.width_px - MIN_OVERLAY_WIDTH).abs() < 1e-3);
        assert!((img.height_px - img.width_px / img.aspect_ratio).abs() < 1e-3);
        assert_eq!(o.position_percent, center_before, "center never drifts");

        // Grow by +60 along the width axis (rotation 0 → pure x displacement)
        ctl.pointer_move(&mut stack, &mapper, ContainerPoint::new(310.0, 200.0));
        let o = stack.get(id).unwrap();
        let OverlayKind::Image(img) = &o.kind else {
            unreachable!()
        };
        assert!((img.width_px - 160.0).abs() < 1e-3);
        assert!((img.height_px - 80.0).abs() < 1e-3);
    }

    #[test]
    fn resize_projects_displacement_onto_rotated_width_axis() {
        let (mut stack, mapper, mut ctl) = setup(Size::new(400.0, 400.0));
        let id = image_overlay(&mut stack, 100.0);
        // Rotate 90° clockwise: the width axis now points down the screen
        stack.get_mut(id).unwrap().rotation = std::f32::consts::FRAC_PI_2;

        ctl.pointer_down(
            &mut stack,
            &mapper,
            id,
            HitTarget::ResizeHandle,
            ContainerPoint::new(200.0, 250.0),
        );
        // Pure vertical displacement grows the width
        ctl.pointer_move(&mut stack, &mapper, ContainerPoint::new(200.0, 290.0));
        let OverlayKind::Image(img) = &stack.get(id).unwrap().kind else {
            unreachable!()
        };
        assert!((img.width_px - 140.0).abs() < 1e-3);
    }

    #[test]
    fn resize_handle_is_ignored_for_text_overlays() {
        let (mut stack, mapper, mut ctl) = setup(Size::new(400.0, 400.0));
        let id = stack.push(Overlay::text("gm".into(), [0, 0, 0], 24.0, "Arial".into()));
        ctl.pointer_down(
            &mut stack,
            &mapper,
            id,
            HitTarget::ResizeHandle,
            ContainerPoint::new(200.0, 200.0),
        );
        assert_eq!(ctl.mode(), GestureMode::Idle);
    }

    #[test]
    fn every_exit_path_returns_to_idle() {
        let (mut stack, mapper, mut ctl) = setup(Size::new(400.0, 400.0));
        let id = image_overlay(&mut stack, 100.0);

        for hit in [HitTarget::Body, HitTarget::RotateHandle, HitTarget::ResizeHandle] {
            ctl.pointer_down(
                &mut stack,
                &mapper,
                id,
                hit,
                ContainerPoint::new(200.0, 200.0),
            );
            assert_ne!(ctl.mode(), GestureMode::Idle);
            ctl.pointer_cancel();
            assert_eq!(ctl.mode(), GestureMode::Idle);
        }

        // Forced clear is safe from Idle too
        ctl.end_gesture();
        assert_eq!(ctl.mode(), GestureMode::Idle);
    }

    #[test]
    fn gesture_start_marks_overlay_active() {
        let (mut stack, mapper, mut ctl) = setup(Size::new(400.0, 400.0));
        let id = image_overlay(&mut stack, 100.0);
        ctl.pointer_down(
            &mut stack,
            &mapper,
            id,
            HitTarget::Body,
            ContainerPoint::new(200.0, 200.0),
        );
        assert_eq!(stack.active(), Some(id));
    }

    #[test]
    fn moving_after_target_removed_clears_the_session() {
        let (mut stack, mapper, mut ctl) = setup(Size::new(400.0, 400.0));
        let id = image_overlay(&mut stack, 100.0);
        ctl.pointer_down(
            &mut stack,
            &mapper,
            id,
            HitTarget::Body,
            ContainerPoint::new(200.0, 200.0),
        );
        stack.remove(id);
        ctl.pointer_move(&mut stack, &mapper, ContainerPoint::new(210.0, 210.0));
        assert_eq!(ctl.mode(), GestureMode::Idle);
    }
}
