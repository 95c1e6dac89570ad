use crate::node::{bbox_relative, resolve_rect};
use crate::transform::Affine;
use crate::types::{CoordUnits, Rect};
use crate::units::{Length, UnitContext};

/// A `mask` definition: its rendered luminance scales the referencing
/// layer's alpha inside the mask region.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskNode {
    pub units: CoordUnits,
    pub content_units: CoordUnits,
    pub x: Length,
    pub y: Length,
    pub width: Length,
    pub height: Length,
}

impl Default for MaskNode {
    fn default() -> Self {
        Self {
            units: CoordUnits::ObjectBoundingBox,
            content_units: CoordUnits::UserSpaceOnUse,
            x: Length::percent(-0.1),
            y: Length::percent(-0.1),
            width: Length::percent(1.2),
            height: Length::percent(1.2),
        }
    }
}

impl MaskNode {
    /// Mask region in the referencing element's user space.
    pub fn region(&self, units: &UnitContext, bbox: Option<&Rect>) -> Option<Rect> {
        match self.units {
            CoordUnits::UserSpaceOnUse => {
                Some(resolve_rect(units, &self.x, &self.y, &self.width, &self.height))
            }
            CoordUnits::ObjectBoundingBox => {
                let bbox = bbox.filter(|b| !b.is_empty())?;
                let fractions = Rect::new(self.x.value, self.y.value, self.width.value, self.height.value);
                Some(bbox_relative(&fractions, bbox))
            }
        }
    }

    pub fn content_transform(&self, affine: &Affine, bbox: Option<&Rect>) -> Option<Affine> {
        match self.content_units {
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
