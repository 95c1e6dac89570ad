use tiny_skia::Pixmap;

use crate::errors::FilterError;
use crate::filters::surface::new_surface;
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;

/// `feOffset`: shifts the input by `(dx, dy)` in primitive units.
#[derive(Debug, Clone, PartialEq)]
pub struct Offset {
    pub input: Option<Input>,
    pub dx: f64,
    pub dy: f64,
}

impl Offset {
    pub fn from_properties(props: &PropertyBag) -> Self {
        Self {
            input: parse::input(props, "in"),
            dx: parse::number("feOffset", props, "dx", 0.0),
            dy: parse::number("feOffset", props, "dy", 0.0),
        }
    }

    pub fn render(
        &self,
        inputs: &[FilterOutput],
        target: &RenderTarget,
        ctx: &FilterContext<'_>,
    ) -> Result<Pixmap, FilterError> {
        let mut out = new_surface(ctx.width, ctx.height)?;
        let Some(input) = inputs.first() else {
            return Ok(out);
        };
        let (dx, dy) = ctx.paffine.transform_distance(self.dx, self.dy);
        let (ox, oy) = (dx.round() as i32, dy.round() as i32);

        let width = ctx.width as usize;
        let src = input.surface.pixels();
        let dst = out.pixels_mut();
        let bounds = target.bounds;
        for y in bounds.y0..bounds.y1 {
            for x in bounds.x0..bounds.x1 {
                let (sx, sy) = (x - ox, y - oy);
                if input.bounds.contains(sx, sy) {
                    dst[y as usize * width + x as usize] = src[sy as usize * width + sx as usize];
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::{context, filled, output, pixel, target};
    use crate::types::IntRect;

    #[test]
    fn shifts_content() {
        let ctx = context(8, 8);
        let input = output(filled(8, 8, IntRect::new(0, 0, 2, 2), [255, 0, 0, 255]));
        let offset = Offset {
            input: None,
            dx: 3.0,
            dy: 1.0,
        };
        let out = offset.render(&[input], &target(&ctx), &ctx).expect("render");
        assert_eq!(pixel(&out, 3, 1), (255, 0, 0, 255));
        assert_eq!(pixel(&out, 4, 2), (255, 0, 0, 255));
        assert_eq!(pixel(&out, 0, 0).3, 0, "origin vacated");
        assert_eq!(pixel(&out, 5, 1).3, 0);
    }
}
