use rayon::prelude::*;
use tiny_skia::{Pixmap, PremultipliedColorU8};
use tracing::warn;

use crate::errors::FilterError;
use crate::filters::surface::new_surface;
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;
use crate::types::IntRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MorphologyOperator {
    #[default]
    Erode,
    Dilate,
}

const OPERATORS: &[(&str, MorphologyOperator)] = &[
    ("erode", MorphologyOperator::Erode),
    ("dilate", MorphologyOperator::Dilate),
];

impl MorphologyOperator {
    fn seed(self) -> [u8; 4] {
        match self {
            MorphologyOperator::Erode => [255; 4],
            MorphologyOperator::Dilate => [0; 4],
        }
    }

    fn fold(self, acc: &mut [u8; 4], px: [u8; 4]) {
        for (a, v) in acc.iter_mut().zip(px) {
            *a = match self {
                MorphologyOperator::Erode => (*a).min(v),
                MorphologyOperator::Dilate => (*a).max(v),
            };
        }
    }
}

/// `feMorphology`: per-channel min (erode) or max (dilate) over a
/// `(2rx+1) x (2ry+1)` window.
#[derive(Debug, Clone, PartialEq)]
pub struct Morphology {
    pub input: Option<Input>,
    pub operator: MorphologyOperator,
    pub radius: (f64, f64),
}

fn channels(px: PremultipliedColorU8) -> [u8; 4] {
    [px.red(), px.green(), px.blue(), px.alpha()]
}

fn pack(c: [u8; 4]) -> PremultipliedColorU8 {
    PremultipliedColorU8::from_rgba(c[0].min(c[3]), c[1].min(c[3]), c[2].min(c[3]), c[3])
        .unwrap_or(PremultipliedColorU8::TRANSPARENT)
}

impl Morphology {
    pub fn from_properties(props: &PropertyBag) -> Self {
        Self {
            input: parse::input(props, "in"),
            operator: parse::keyword(
                "feMorphology",
                props,
                "operator",
                OPERATORS,
                MorphologyOperator::Erode,
            ),
            radius: parse::number_pair("feMorphology", props, "radius", (0.0, 0.0)),
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
        let (sx, sy) = ctx.paffine.scale_factors();
        let (rx, ry) = (self.radius.0 * sx, self.radius.1 * sy);
        if rx < 0.0 || ry < 0.0 {
            warn!(radius = ?self.radius, "negative feMorphology radius");
            return Ok(out);
        }
        if rx == 0.0 || ry == 0.0 {
            out.pixels_mut().copy_from_slice(input.surface.pixels());
            return Ok(out);
        }
        let (rx, ry) = (rx.round().max(1.0) as i32, ry.round().max(1.0) as i32);

        let width = ctx.width as usize;
        let src = input.surface.pixels();
        let in_bounds = input.bounds;
        let bounds = target.bounds;
        let op = self.operator;
        let sample = |x: i32, y: i32| -> [u8; 4] {
            if in_bounds.contains(x, y) {
                channels(src[y as usize * width + x as usize])
            } else {
                [0; 4]
            }
        };

        // Horizontal pass over every row the vertical pass will read.
        let rows = IntRect::new(bounds.x0, bounds.y0 - ry, bounds.x1, bounds.y1 + ry);
        let row_width = bounds.width().max(0) as usize;
        let mut horizontal = vec![[0u8; 4]; row_width * rows.height().max(0) as usize];
        horizontal
            .par_chunks_mut(row_width.max(1))
            .enumerate()
            .for_each(|(r, line)| {
                let y = rows.y0 + r as i32;
                for (i, slot) in line.iter_mut().enumerate() {
                    let x = bounds.x0 + i as i32;
                    let mut acc = op.seed();
                    for dx in -rx..=rx {
                        op.fold(&mut acc, sample(x + dx, y));
                    }
                    *slot = acc;
                }
            });

        out.pixels_mut()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as i32;
                if y < bounds.y0 || y >= bounds.y1 {
                    return;
                }
                for i in 0..row_width {
                    let mut acc = op.seed();
                    for dy in -ry..=ry {
                        let r = (y + dy - rows.y0) as usize;
                        op.fold(&mut acc, horizontal[r * row_width + i]);
                    }
                    row[bounds.x0 as usize + i] = pack(acc);
                }
            });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::{context, filled, output, pixel, target};

    fn morph(operator: MorphologyOperator, radius: f64) -> Morphology {
        Morphology {
            input: None,
            operator,
            radius: (radius, radius),
        }
    }

    #[test]
    fn dilate_grows_and_erode_shrinks() {
        let ctx = context(7, 7);
        let input = output(filled(7, 7, IntRect::new(2, 2, 5, 5), [0, 0, 255, 255]));

        let grown = morph(MorphologyOperator::Dilate, 1.0)
            .render(&[input.clone()], &target(&ctx), &ctx)
            .expect("render");
        assert_eq!(pixel(&grown, 1, 1), (0, 0, 255, 255));
        assert_eq!(pixel(&grown, 0, 0).3, 0);

        let shrunk = morph(MorphologyOperator::Erode, 1.0)
            .render(&[input], &target(&ctx), &ctx)
            .expect("render");
        assert_eq!(pixel(&shrunk, 3, 3), (0, 0, 255, 255));
        assert_eq!(pixel(&shrunk, 2, 2).3, 0, "edge eroded");
    }

    #[test]
    fn zero_radius_passes_through_and_negative_clears() {
        let ctx = context(3, 3);
        let input = output(filled(3, 3, IntRect::new(1, 1, 2, 2), [255, 0, 0, 255]));
        let same = morph(MorphologyOperator::Erode, 0.0)
            .render(&[input.clone()], &target(&ctx), &ctx)
            .expect("render");
        assert_eq!(pixel(&same, 1, 1), (255, 0, 0, 255));
        let cleared = morph(MorphologyOperator::Dilate, -1.0)
            .render(&[input], &target(&ctx), &ctx)
            .expect("render");
        assert_eq!(pixel(&cleared, 1, 1).3, 0);
    }
}
