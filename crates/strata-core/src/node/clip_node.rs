use crate::transform::Affine;
use crate::types::{CoordUnits, Rect};

/// A `clipPath` definition. Its children's geometry, filled, forms the
/// coverage a referencing layer is limited to.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipPathNode {
    pub units: CoordUnits,
}

impl ClipPathNode {
    /// Transform for the clip content given the referencing element's
    /// transform and user-space bounding box.
    pub fn content_transform(&self, affine: &Affine, bbox: Option<&Rect>) -> Option<Affine> {
        match self.units {
            CoordUnits::UserSpaceOnUse => Some(*affine),
            CoordUnits::ObjectBoundingBox => {
                let bbox = bbox.filter(|b| !b.is_empty())?;
                let unit = Affine::scale(bbox.width, bbox.height)
                    .then(&Affine::translate(bbox.x, bbox.y));
                Some(unit.then(affine))
            }
        }
    }
}
