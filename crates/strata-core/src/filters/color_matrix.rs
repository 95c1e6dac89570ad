use tiny_skia::Pixmap;
use tracing::warn;

use crate::errors::FilterError;
use crate::filters::surface::{clamp01, new_surface, premultiply, unpremultiply};
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;

#[derive(Debug, Clone, PartialEq)]
pub enum ColorMatrixKind {
    /// Row-major 4x5 matrix.
    Matrix(Box<[f64; 20]>),
    Saturate(f64),
    HueRotate(f64),
    LuminanceToAlpha,
}

/// `feColorMatrix`, applied to unpremultiplied channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMatrix {
    pub input: Option<Input>,
    pub kind: ColorMatrixKind,
}

const IDENTITY: [f64; 20] = [
    1.0, 0.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 0.0, 1.0, 0.0, //
];

impl ColorMatrix {
    pub fn from_properties(props: &PropertyBag) -> Self {
        let values = parse::numbers("feColorMatrix", props, "values");
        let kind = match props.get("type").map(str::trim).unwrap_or("matrix") {
            "saturate" => ColorMatrixKind::Saturate(
                values.and_then(|v| v.first().copied()).unwrap_or(1.0),
            ),
            "hueRotate" => ColorMatrixKind::HueRotate(
                values.and_then(|v| v.first().copied()).unwrap_or(0.0),
            ),
            "luminanceToAlpha" => ColorMatrixKind::LuminanceToAlpha,
            other => {
                if other != "matrix" {
                    warn!(value = other, "unknown feColorMatrix type, using identity");
                }
                let matrix = match values {
                    Some(v) if v.len() == 20 => {
                        let mut m = [0.0; 20];
                        m.copy_from_slice(&v);
                        m
                    }
                    Some(v) => {
                        warn!(count = v.len(), "feColorMatrix needs 20 values, using identity");
                        IDENTITY
                    }
                    None => IDENTITY,
                };
                ColorMatrixKind::Matrix(Box::new(matrix))
            }
        };
        Self {
            input: parse::input(props, "in"),
            kind,
        }
    }

    fn matrix(&self) -> [f64; 20] {
        match &self.kind {
            ColorMatrixKind::Matrix(m) => **m,
            ColorMatrixKind::Saturate(s) => {
                let s = *s;
                [
                    0.213 + 0.787 * s,
                    0.715 - 0.715 * s,
                    0.072 - 0.072 * s,
                    0.0,
                    0.0,
                    0.213 - 0.213 * s,
                    0.715 + 0.285 * s,
                    0.072 - 0.072 * s,
                    0.0,
                    0.0,
                    0.213 - 0.213 * s,
                    0.715 - 0.715 * s,
                    0.072 + 0.928 * s,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    1.0,
                    0.0,
                ]
            }
            ColorMatrixKind::HueRotate(angle) => {
                let (sin, cos) = angle.to_radians().sin_cos();
                [
                    0.213 + 0.787 * cos - 0.213 * sin,
                    0.715 - 0.715 * cos - 0.715 * sin,
                    0.072 - 0.072 * cos + 0.928 * sin,
                    0.0,
                    0.0,
                    0.213 - 0.213 * cos + 0.143 * sin,
                    0.715 + 0.285 * cos + 0.140 * sin,
                    0.072 - 0.072 * cos - 0.283 * sin,
                    0.0,
                    0.0,
                    0.213 - 0.213 * cos - 0.787 * sin,
                    0.715 - 0.715 * cos + 0.715 * sin,
                    0.072 + 0.928 * cos + 0.072 * sin,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    1.0,
                    0.0,
                ]
            }
            ColorMatrixKind::LuminanceToAlpha => [
                0.0, 0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 0.0, 0.0, //
                0.2125, 0.7154, 0.0721, 0.0, 0.0, //
            ],
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
        let m = self.matrix().map(|v| v as f32);
        let width = ctx.width as usize;
        let src = input.surface.pixels();
        let dst = out.pixels_mut();
        let b = target.bounds;
        for y in b.y0..b.y1 {
            for x in b.x0..b.x1 {
                let idx = y as usize * width + x as usize;
                let [r, g, bl, a] = unpremultiply(src[idx]);
                let row = |i: usize| {
                    clamp01(m[i] * r + m[i + 1] * g + m[i + 2] * bl + m[i + 3] * a + m[i + 4])
                };
                dst[idx] = premultiply([row(0), row(5), row(10), row(15)]);
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
    fn matrix_uses_unpremultiplied_channels() {
        let ctx = context(1, 1);
        let input = output(filled(1, 1, IntRect::new(0, 0, 1, 1), [255, 0, 0, 128]));
        let swap = ColorMatrix {
            input: None,
            kind: ColorMatrixKind::Matrix(Box::new([
                0.0, 0.0, 0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 1.0, 0.0, //
            ])),
        };
        let out = swap.render(&[input], &target(&ctx), &ctx).expect("render");
        assert_eq!(pixel(&out, 0, 0), (0, 128, 0, 128));
    }

    #[test]
    fn zero_saturation_is_grey() {
        let ctx = context(1, 1);
        let input = output(filled(1, 1, IntRect::new(0, 0, 1, 1), [255, 0, 0, 255]));
        let m = ColorMatrix {
            input: None,
            kind: ColorMatrixKind::Saturate(0.0),
        };
        let (r, g, b, a) = pixel(&m.render(&[input], &target(&ctx), &ctx).expect("render"), 0, 0);
        assert_eq!((r, g, b, a), (54, 54, 54, 255));
    }

    #[test]
    fn short_value_list_falls_back_to_identity() {
        let props: PropertyBag = [("values", "1 2 3")].into_iter().collect();
        let m = ColorMatrix::from_properties(&props);
        assert_eq!(m.kind, ColorMatrixKind::Matrix(Box::new(IDENTITY)));
    }
}
