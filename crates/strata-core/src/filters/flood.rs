use tiny_skia::Pixmap;

use crate::errors::FilterError;
use crate::filters::surface::new_surface;
use crate::filters::{parse, FilterContext, FilterOutput, RenderTarget};
use crate::style::PropertyBag;
use crate::types::Color;

/// `feFlood`: fills the subregion with one color.
#[derive(Debug, Clone, PartialEq)]
pub struct Flood {
    pub color: Color,
    pub opacity: f32,
}

impl Flood {
    pub fn from_properties(props: &PropertyBag) -> Self {
        let opacity = props
            .get("flood-opacity")
            .and_then(crate::parsers::parse_opacity)
            .unwrap_or(1.0);
        Self {
            color: parse::color("feFlood", props, "flood-color", Color::BLACK),
            opacity,
        }
    }

    pub fn render(
        &self,
        _inputs: &[FilterOutput],
        target: &RenderTarget,
        ctx: &FilterContext<'_>,
    ) -> Result<Pixmap, FilterError> {
        let mut out = new_surface(ctx.width, ctx.height)?;
        let px = self.color.with_opacity(self.opacity).to_premultiplied_u8();
        let width = ctx.width as usize;
        let dst = out.pixels_mut();
        let b = target.bounds;
        for y in b.y0..b.y1 {
            let row = y as usize * width;
            dst[row + b.x0 as usize..row + b.x1 as usize].fill(px);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::{context, pixel};
    use crate::types::{ColorSpace, IntRect};

    #[test]
    fn fills_only_the_subregion() {
        let ctx = context(6, 6);
        let flood = Flood {
            color: Color::from_rgba8(0, 0, 255, 255),
            opacity: 0.5,
        };
        let target = RenderTarget {
            bounds: IntRect::new(1, 1, 3, 3),
            rect: IntRect::new(1, 1, 3, 3).to_rect(),
            space: ColorSpace::Srgb,
        };
        let out = flood.render(&[], &target, &ctx).expect("render");
        assert_eq!(pixel(&out, 1, 1), (0, 0, 128, 128));
        assert_eq!(pixel(&out, 3, 3).3, 0);
    }
}
