use tiny_skia::Pixmap;

use crate::errors::FilterError;
use crate::filters::surface::new_surface;
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;

/// `feTile`: repeats the input's subregion across the target.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub input: Option<Input>,
}

impl Tile {
    pub fn from_properties(props: &PropertyBag) -> Self {
        Self {
            input: parse::input(props, "in"),
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
        let tile = input.bounds;
        if tile.is_empty() {
            return Ok(out);
        }
        let wrap = |v: i32, origin: i32, len: i32| origin + (v - origin).rem_euclid(len);

        let width = ctx.width as usize;
        let src = input.surface.pixels();
        let dst = out.pixels_mut();
        let b = target.bounds;
        for y in b.y0..b.y1 {
            let sy = wrap(y, tile.y0, tile.height()) as usize;
            for x in b.x0..b.x1 {
                let sx = wrap(x, tile.x0, tile.width()) as usize;
                dst[y as usize * width + x as usize] = src[sy * width + sx];
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::{context, filled, output, pixel, target};
    use crate::filters::FilterOutput;
    use crate::types::IntRect;

    #[test]
    fn repeats_input_subregion() {
        let ctx = context(6, 2);
        let mut input = output(filled(6, 2, IntRect::new(1, 0, 2, 1), [255, 0, 0, 255]));
        input = FilterOutput {
            bounds: IntRect::new(1, 0, 3, 2),
            ..input
        };
        let out = Tile { input: None }
            .render(&[input], &target(&ctx), &ctx)
            .expect("render");
        for x in [1, 3, 5] {
            assert_eq!(pixel(&out, x, 0), (255, 0, 0, 255), "tile copy at {x}");
        }
        assert_eq!(pixel(&out, 2, 0).3, 0);
        assert_eq!(pixel(&out, 4, 0).3, 0);
        assert_eq!(pixel(&out, 1, 1).3, 0);
    }
}
