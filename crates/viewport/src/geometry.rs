//! Rectangle geometry and the visibility oracle.

/// Axis-aligned rectangle in container coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Grow the rectangle by `margin_percent` of its own size on every edge.
    ///
    /// A 50% margin on a 1000px tall viewport adds 500px above and 500px below.
    pub fn expanded_by_percent(&self, margin_percent: f32) -> Rect {
        let factor = margin_percent.max(0.0) / 100.0;
        let dx = self.width * factor;
        let dy = self.height * factor;

        Rect {
            x: self.x - dx,
            y: self.y - dy,
            width: self.width + 2.0 * dx,
            height: self.height + 2.0 * dy,
        }
    }

    /// Check whether the two rectangles overlap.
    ///
    /// Rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.right() > other.x
            && self.x < other.right()
            && self.bottom() > other.y
            && self.y < other.bottom()
    }
}

/// Classify an element as visible.
///
/// `rect` is `None` for an element that is not attached to the render tree;
/// such elements are never visible.
pub fn is_visible(rect: Option<Rect>, viewport: Rect, margin_percent: f32) -> bool {
    match rect {
        Some(rect) => rect.intersects(&viewport.expanded_by_percent(margin_percent)),
        None => false,
    }
}
