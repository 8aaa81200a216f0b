// ============================================================================
// COORDINATE MAPPER — percent ↔ container pixels ↔ fixed canvas pixels
// ============================================================================
//
// Overlay positions are stored as container-relative percentages so the
// layout survives a container resize. The display container and the fixed
// output canvas are independently sized, so the container→canvas scale is
// applied per axis (non-uniform scale is expected when the container aspect
// ratio differs from the canvas aspect ratio).

/// Edge length of the fixed square output canvas, in pixels.
pub const CANVAS_EDGE: u32 = 2048;

/// A width/height pair in pixels (display container or canvas).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Size {
    pub w: f32,
    pub h: f32,
}

impl Size {
    pub fn new(w: f32, h: f32) -> Self {
        Size { w, h }
    }

    /// A container that has not been laid out yet reports a zero axis.
    pub fn is_degenerate(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }
}

/// A point in container-relative percent space, each axis in `0..=100`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PercentPoint {
    pub x: f32,
    pub y: f32,
}

impl PercentPoint {
    pub fn new(x: f32, y: f32) -> Self {
        PercentPoint { x, y }
    }

    /// The defined fallback for degenerate geometry: the container center.
    pub const CENTER: PercentPoint = PercentPoint { x: 50.0, y: 50.0 };
}

/// A point in display-container pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContainerPoint {
    pub x: f32,
    pub y: f32,
}

impl ContainerPoint {
    pub fn new(x: f32, y: f32) -> Self {
        ContainerPoint { x, y }
    }
}

/// A point in fixed-canvas pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasPoint {
    pub x: f32,
    pub y: f32,
}

impl CanvasPoint {
    pub fn new(x: f32, y: f32) -> Self {
        CanvasPoint { x, y }
    }
}

/// Converts points between the three coordinate spaces for one snapshot of
/// display geometry. Cheap to construct; build a fresh one whenever the
/// container is measured.
#[derive(Clone, Copy, Debug)]
pub struct Mapper {
    pub container: Size,
    pub canvas: Size,
}

impl Mapper {
    pub fn new(container: Size) -> Self {
        Mapper {
            container,
            canvas: Size::new(CANVAS_EDGE as f32, CANVAS_EDGE as f32),
        }
    }

    pub fn with_canvas(container: Size, canvas: Size) -> Self {
        Mapper { container, canvas }
    }

    /// Percent → container pixels.  Degenerate containers fail soft to the
    /// container origin (0,0 — a zero-sized container has only one point).
    pub fn to_container_px(&self, p: PercentPoint) -> ContainerPoint {
        if self.container.is_degenerate() {
            return ContainerPoint::new(0.0, 0.0);
        }
        ContainerPoint::new(
            p.x / 100.0 * self.container.w,
            p.y / 100.0 * self.container.h,
        )
    }

    /// Container pixels → percent.  Degenerate containers fail soft to the
    /// centered fallback rather than dividing by zero.
    pub fn to_percent(&self, p: ContainerPoint) -> PercentPoint {
        if self.container.is_degenerate() {
            return PercentPoint::CENTER;
        }
        PercentPoint::new(
            p.x / self.container.w * 100.0,
            p.y / self.container.h * 100.0,
        )
    }

    /// Container pixels → canvas pixels, scaled independently per axis.
    /// Degenerate containers map every point to the canvas center.
    pub fn to_canvas_px(&self, p: ContainerPoint) -> CanvasPoint {
        if self.container.is_degenerate() {
            return CanvasPoint::new(self.canvas.w / 2.0, self.canvas.h / 2.0);
        }
        CanvasPoint::new(
            p.x * (self.canvas.w / self.container.w),
            p.y * (self.canvas.h / self.container.h),
        )
    }

    /// Percent → canvas pixels in one step.  Equivalent to composing
    /// `to_container_px` and `to_canvas_px`; degenerate containers map to the
    /// canvas center.
    pub fn percent_to_canvas(&self, p: PercentPoint) -> CanvasPoint {
        if self.container.is_degenerate() {
            return CanvasPoint::new(self.canvas.w / 2.0, self.canvas.h / 2.0);
        }
        CanvasPoint::new(
            p.x / 100.0 * self.canvas.w,
            p.y / 100.0 * self.canvas.h,
        )
    }

    /// Horizontal container→canvas scale factor (1.0 when degenerate).
    pub fn scale_x(&self) -> f32 {
        if self.container.is_degenerate() {
            1.0
        } else {
            self.canvas.w / self.container.w
        }
    }

    /// Vertical container→canvas scale factor (1.0 when degenerate).
    pub fn scale_y(&self) -> f32 {
        if self.container.is_degenerate() {
            1.0
        } else {
            self.canvas.h / self.container.h
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-3;

    #[test]
    fn two_stage_mapping_matches_direct_scale() {
        // percent → container → canvas must equal percent → canvas
        let mapper = Mapper::with_canvas(Size::new(640.0, 480.0), Size::new(2048.0, 2048.0));
        for &(px, py) in &[(0.0, 0.0), (50.0, 50.0), (12.5, 87.5), (100.0, 100.0)] {
            let p = PercentPoint::new(px, py);
            let staged = mapper.to_canvas_px(mapper.to_container_px(p));
            let direct = mapper.percent_to_canvas(p);
            assert!((staged.x - direct.x).abs() < EPS, "{px},{py}");
            assert!((staged.y - direct.y).abs() < EPS, "{px},{py}");
        }
    }

    #[test]
    fn non_uniform_scale_is_per_axis() {
        let mapper = Mapper::with_canvas(Size::new(1024.0, 512.0), Size::new(2048.0, 2048.0));
        let c = mapper.to_canvas_px(ContainerPoint::new(100.0, 100.0));
        assert!((c.x - 200.0).abs() < EPS);
        assert!((c.y - 400.0).abs() < EPS);
    }

    #[test]
    fn degenerate_container_falls_back_without_nan() {
        let mapper = Mapper::new(Size::new(0.0, 0.0));
        let pct = mapper.to_percent(ContainerPoint::new(10.0, 10.0));
        assert_eq!(pct, PercentPoint::CENTER);
        let canvas = mapper.percent_to_canvas(PercentPoint::new(25.0, 75.0));
        assert!((canvas.x - 1024.0).abs() < EPS);
        assert!((canvas.y - 1024.0).abs() < EPS);
        assert!(!canvas.x.is_nan() && !canvas.y.is_nan());
    }

    #[test]
    fn percent_roundtrip_is_stable() {
        let mapper = Mapper::new(Size::new(800.0, 600.0));
        let p = PercentPoint::new(33.0, 66.0);
        let back = mapper.to_percent(mapper.to_container_px(p));
        assert!((back.x - p.x).abs() < EPS);
        assert!((back.y - p.y).abs() < EPS);
    }
}
