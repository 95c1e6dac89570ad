use crate::types::Rect;
use crate::units::{Length, UnitContext};

pub mod viewport;
pub use viewport::Viewport;

pub mod use_node;
pub use use_node::{LinkState, UseNode};

pub mod shape_node;
pub use shape_node::{ShapeGeometry, ShapeNode};

pub mod clip_node;
pub use clip_node::ClipPathNode;

pub mod mask_node;
pub use mask_node::MaskNode;

/// Variant data of a drawable node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// `g`, `a`, and detached `defs` containers.
    Group,
    /// An `svg` element: establishes a viewport.
    DocumentRoot(Viewport),
    /// A `use` element.
    Use(UseNode),
    /// A `symbol`: only drawn through a `use`.
    Template(Viewport),
    /// A `switch`.
    Conditional,
    Shape(ShapeNode),
    ClipPath(ClipPathNode),
    Mask(MaskNode),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Group => "group",
            NodeKind::DocumentRoot(_) => "svg",
            NodeKind::Use(_) => "use",
            NodeKind::Template(_) => "symbol",
            NodeKind::Conditional => "switch",
            NodeKind::Shape(_) => "shape",
            NodeKind::ClipPath(_) => "clipPath",
            NodeKind::Mask(_) => "mask",
        }
    }

    /// Definition-only kinds are never reached by the ordinary walk.
    pub fn is_definition_only(&self) -> bool {
        matches!(
            self,
            NodeKind::Template(_) | NodeKind::ClipPath(_) | NodeKind::Mask(_)
        )
    }
}

/// Rectangle of `x`, `y`, `width`, `height` expressed relative to an
/// object bounding box, mapped into the box's coordinates.
pub fn bbox_relative(fractions: &Rect, bbox: &Rect) -> Rect {
    Rect::new(
        bbox.x + fractions.x * bbox.width,
        bbox.y + fractions.y * bbox.height,
        fractions.width * bbox.width,
        fractions.height * bbox.height,
    )
}

pub(crate) fn resolve_rect(
    units: &UnitContext,
    x: &Length,
    y: &Length,
    width: &Length,
    height: &Length,
) -> Rect {
    Rect::new(
        units.horizontal(x),
        units.vertical(y),
        units.horizontal(width),
        units.vertical(height),
    )
}
