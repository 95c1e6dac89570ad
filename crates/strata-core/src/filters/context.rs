use std::rc::Rc;

use tiny_skia::Pixmap;

use crate::errors::FilterError;
use crate::filters::{FilterDefinition, FilterPrimitive};
use crate::node::{bbox_relative, resolve_rect};
use crate::transform::Affine;
use crate::types::{ColorSpace, CoordUnits, IntRect, Rect};
use crate::units::{Length, UnitContext};
use crate::AssetLoader;

/// A computed intermediate result.
#[derive(Clone)]
pub struct FilterOutput {
    pub surface: Rc<Pixmap>,
    /// Pixels outside these bounds are transparent.
    pub bounds: IntRect,
    pub space: ColorSpace,
}

impl std::fmt::Debug for FilterOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterOutput")
            .field("bounds", &self.bounds)
            .field("space", &self.space)
            .finish()
    }
}

/// Where a primitive writes and in which color space it operates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTarget {
    /// Device pixels the primitive may write, already clipped to the
    /// filter region.
    pub bounds: IntRect,
    /// The subregion in primitive units (before `paffine`).
    pub rect: Rect,
    pub space: ColorSpace,
}

/// Geometry of one filter invocation.
pub struct FilterContext<'a> {
    pub width: u32,
    pub height: u32,
    /// User space to device.
    pub affine: Affine,
    /// Primitive units to device.
    pub paffine: Affine,
    /// Filter region in device pixels, clipped to the canvas.
    pub region: IntRect,
    pub units: UnitContext,
    primitive_units: CoordUnits,
    pub loader: &'a dyn AssetLoader,
}

impl<'a> FilterContext<'a> {
    /// Computes the filter region. An empty or non-finite region is an
    /// [`FilterError::InvalidRegion`].
    pub fn new(
        filter: &FilterDefinition,
        bbox: Option<Rect>,
        affine: Affine,
        units: UnitContext,
        size: (u32, u32),
        loader: &'a dyn AssetLoader,
    ) -> Result<Self, FilterError> {
        let bbox = bbox.filter(|b| !b.is_empty());
        let user_region = match filter.filter_units {
            CoordUnits::UserSpaceOnUse => resolve_rect(
                &units,
                &filter.x,
                &filter.y,
                &filter.width,
                &filter.height,
            ),
            CoordUnits::ObjectBoundingBox => {
                let bbox = bbox.ok_or(FilterError::InvalidRegion)?;
                let fractions = Rect::new(
                    filter.x.value,
                    filter.y.value,
                    filter.width.value,
                    filter.height.value,
                );
                bbox_relative(&fractions, &bbox)
            }
        };
        if user_region.is_empty() || !affine.is_finite() {
            return Err(FilterError::InvalidRegion);
        }
        let canvas = IntRect::from_size(size.0, size.1);
        let region = affine
            .transform_rect_bounds(&user_region)
            .to_int_rect()
            .intersect(&canvas);
        if region.is_empty() {
            return Err(FilterError::InvalidRegion);
        }

        let paffine = match (filter.primitive_units, bbox) {
            (CoordUnits::ObjectBoundingBox, Some(b)) => Affine::scale(b.width, b.height)
                .then(&Affine::translate(b.x, b.y))
                .then(&affine),
            _ => affine,
        };

        Ok(Self {
            width: size.0,
            height: size.1,
            affine,
            paffine,
            region,
            units,
            primitive_units: filter.primitive_units,
            loader,
        })
    }

    /// Computes a primitive's subregion: the union of its inputs' bounds
    /// (or the filter region for generators), overridden by whichever of
    /// `x`, `y`, `width`, `height` the primitive specifies, clipped to the
    /// filter region.
    pub fn target(
        &self,
        primitive: &FilterPrimitive,
        inputs: &[FilterOutput],
        space: ColorSpace,
    ) -> RenderTarget {
        let default_bounds = if inputs.is_empty() {
            self.region
        } else {
            inputs
                .iter()
                .fold(IntRect::default(), |acc, i| acc.union(&i.bounds))
        };
        let inverse = self.paffine.invert().unwrap_or(Affine::IDENTITY);
        let mut rect = inverse.transform_rect_bounds(&default_bounds.to_rect());

        let resolve = |l: &Length, horizontal: bool| match self.primitive_units {
            CoordUnits::ObjectBoundingBox => l.value,
            CoordUnits::UserSpaceOnUse if horizontal => self.units.horizontal(l),
            CoordUnits::UserSpaceOnUse => self.units.vertical(l),
        };
        let specified = primitive.x.is_some()
            || primitive.y.is_some()
            || primitive.width.is_some()
            || primitive.height.is_some();
        if let Some(x) = &primitive.x {
            rect.x = resolve(x, true);
        }
        if let Some(y) = &primitive.y {
            rect.y = resolve(y, false);
        }
        if let Some(w) = &primitive.width {
            rect.width = resolve(w, true);
        }
        if let Some(h) = &primitive.height {
            rect.height = resolve(h, false);
        }

        let bounds = if specified {
            self.paffine
                .transform_rect_bounds(&rect)
                .to_int_rect()
                .intersect(&self.region)
        } else {
            default_bounds.intersect(&self.region)
        };
        RenderTarget {
            bounds,
            rect,
            space,
        }
    }

    pub fn canvas_bounds(&self) -> IntRect {
        IntRect::from_size(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{Flood, PrimitiveKind};
    use crate::types::Color;
    use crate::DefaultAssetLoader;

    fn units() -> UnitContext {
        UnitContext {
            dpi_x: 90.0,
            dpi_y: 90.0,
            viewport_width: 40.0,
            viewport_height: 40.0,
        }
    }

    fn flood() -> FilterPrimitive {
        FilterPrimitive::new(PrimitiveKind::Flood(Flood {
            color: Color::BLACK,
            opacity: 1.0,
        }))
    }

    #[test]
    fn default_region_grows_bbox_by_ten_percent() {
        let ctx = FilterContext::new(
            &FilterDefinition::default(),
            Some(Rect::new(10.0, 10.0, 20.0, 20.0)),
            Affine::IDENTITY,
            units(),
            (40, 40),
            &DefaultAssetLoader,
        )
        .expect("valid region");
        assert_eq!(ctx.region, IntRect::new(8, 8, 32, 32));
    }

    #[test]
    fn bbox_units_without_bbox_is_invalid() {
        let result = FilterContext::new(
            &FilterDefinition::default(),
            None,
            Affine::IDENTITY,
            units(),
            (40, 40),
            &DefaultAssetLoader,
        );
        assert!(matches!(result, Err(FilterError::InvalidRegion)));
    }

    #[test]
    fn partial_subregion_overrides_only_given_components() {
        let ctx = FilterContext::new(
            &FilterDefinition::default(),
            Some(Rect::new(10.0, 10.0, 20.0, 20.0)),
            Affine::IDENTITY,
            units(),
            (40, 40),
            &DefaultAssetLoader,
        )
        .expect("valid region");

        let generator = ctx.target(&flood(), &[], ColorSpace::Srgb);
        assert_eq!(generator.bounds, ctx.region);

        let mut narrowed = flood();
        narrowed.x = Some(Length::px(0.0));
        narrowed.width = Some(Length::px(12.0));
        let target = ctx.target(&narrowed, &[], ColorSpace::Srgb);
        assert_eq!(target.bounds, IntRect::new(8, 8, 12, 32));
    }
}
