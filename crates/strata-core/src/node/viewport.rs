use crate::node::resolve_rect;
use crate::transform::{viewport_map, Affine, AspectRatio};
use crate::types::Rect;
use crate::units::{Length, UnitContext};

/// Geometry shared by `svg` and `symbol`: a box in the parent's user space,
/// an optional viewBox and the alignment policy fitting one into the other.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub x: Length,
    pub y: Length,
    pub width: Length,
    pub height: Length,
    pub view_box: Option<Rect>,
    pub aspect: AspectRatio,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: Length::ZERO,
            y: Length::ZERO,
            width: Length::percent(1.0),
            height: Length::percent(1.0),
            view_box: None,
            aspect: AspectRatio::default(),
        }
    }
}

impl Viewport {
    /// The viewport box in the parent's user units.
    pub fn rect(&self, units: &UnitContext) -> Rect {
        resolve_rect(units, &self.x, &self.y, &self.width, &self.height)
    }

    /// Transform from the content coordinate system to the parent's user
    /// space: the viewBox mapping when there is one, otherwise a plain
    /// translation to the box origin.
    pub fn content_transform(&self, rect: &Rect) -> Affine {
        match &self.view_box {
            Some(vb) => viewport_map(vb, rect, self.aspect),
            None => Affine::translate(rect.x, rect.y),
        }
    }

    /// Extent that percentages inside the viewport refer to.
    pub fn content_size(&self, rect: &Rect) -> (f64, f64) {
        match &self.view_box {
            Some(vb) => (vb.width, vb.height),
            None => (rect.width, rect.height),
        }
    }
}
