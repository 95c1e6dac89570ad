use tiny_skia::Pixmap;

use crate::errors::FilterError;
use crate::filters::surface::{clamp01, new_surface, premultiply, unpremultiply};
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum TransferFunction {
    #[default]
    Identity,
    Table(Vec<f64>),
    Discrete(Vec<f64>),
    Linear {
        slope: f64,
        intercept: f64,
    },
    Gamma {
        amplitude: f64,
        exponent: f64,
        offset: f64,
    },
}

impl TransferFunction {
    /// Parses an `feFuncR`/`feFuncG`/`feFuncB`/`feFuncA` element.
    pub fn from_properties(element: &str, props: &PropertyBag) -> Self {
        let values = || parse::numbers(element, props, "tableValues").unwrap_or_default();
        match props.get("type").map(str::trim) {
            Some("table") => TransferFunction::Table(values()),
            Some("discrete") => TransferFunction::Discrete(values()),
            Some("linear") => TransferFunction::Linear {
                slope: parse::number(element, props, "slope", 1.0),
                intercept: parse::number(element, props, "intercept", 0.0),
            },
            Some("gamma") => TransferFunction::Gamma {
                amplitude: parse::number(element, props, "amplitude", 1.0),
                exponent: parse::number(element, props, "exponent", 1.0),
                offset: parse::number(element, props, "offset", 0.0),
            },
            _ => TransferFunction::Identity,
        }
    }

    pub fn evaluate(&self, v: f64) -> f64 {
        let result = match self {
            TransferFunction::Identity => v,
            TransferFunction::Linear { slope, intercept } => slope * v + intercept,
            TransferFunction::Gamma {
                amplitude,
                exponent,
                offset,
            } => amplitude * v.powf(*exponent) + offset,
            TransferFunction::Table(values) => match values.len() {
                0 => v,
                1 => values[0],
                len => {
                    let last = len - 1;
                    let scaled = v * last as f64;
                    let idx = (scaled.floor() as usize).min(last);
                    if idx == last {
                        values[last]
                    } else {
                        let t = scaled - idx as f64;
                        values[idx] + t * (values[idx + 1] - values[idx])
                    }
                }
            },
            TransferFunction::Discrete(values) => match values.len() {
                0 => v,
                n => values[((v * n as f64).floor() as usize).min(n - 1)],
            },
        };
        result.clamp(0.0, 1.0)
    }

    fn lut(&self) -> [f32; 256] {
        let mut lut = [0.0f32; 256];
        for (idx, out) in lut.iter_mut().enumerate() {
            *out = self.evaluate(idx as f64 / 255.0) as f32;
        }
        lut
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    R,
    G,
    B,
    A,
}

/// `feComponentTransfer`: per-channel remapping of unpremultiplied values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComponentTransfer {
    pub input: Option<Input>,
    pub r: TransferFunction,
    pub g: TransferFunction,
    pub b: TransferFunction,
    pub a: TransferFunction,
}

impl ComponentTransfer {
    pub fn from_properties(props: &PropertyBag) -> Self {
        Self {
            input: parse::input(props, "in"),
            ..Default::default()
        }
    }

    /// Installs the function of an `feFunc*` child; a later one for the
    /// same channel wins.
    pub fn set_function(&mut self, channel: Channel, function: TransferFunction) {
        match channel {
            Channel::R => self.r = function,
            Channel::G => self.g = function,
            Channel::B => self.b = function,
            Channel::A => self.a = function,
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
        let luts = [self.r.lut(), self.g.lut(), self.b.lut(), self.a.lut()];
        let sample = |lut: &[f32; 256], v: f32| lut[((clamp01(v) * 255.0).round() as usize).min(255)];

        let width = ctx.width as usize;
        let src = input.surface.pixels();
        let dst = out.pixels_mut();
        let b = target.bounds;
        for y in b.y0..b.y1 {
            for x in b.x0..b.x1 {
                let idx = y as usize * width + x as usize;
                let c = unpremultiply(src[idx]);
                dst[idx] = premultiply([
                    sample(&luts[0], c[0]),
                    sample(&luts[1], c[1]),
                    sample(&luts[2], c[2]),
                    sample(&luts[3], c[3]),
                ]);
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
    fn functions_evaluate() {
        assert_eq!(TransferFunction::Identity.evaluate(0.3), 0.3);
        let table = TransferFunction::Table(vec![0.0, 1.0, 0.0]);
        assert!((table.evaluate(0.25) - 0.5).abs() < 1e-9);
        let discrete = TransferFunction::Discrete(vec![0.2, 0.8]);
        assert_eq!(discrete.evaluate(0.49), 0.2);
        assert_eq!(discrete.evaluate(1.0), 0.8);
        let linear = TransferFunction::Linear {
            slope: 2.0,
            intercept: 0.5,
        };
        assert_eq!(linear.evaluate(0.5), 1.0, "clamped");
        let gamma = TransferFunction::Gamma {
            amplitude: 1.0,
            exponent: 2.0,
            offset: 0.0,
        };
        assert_eq!(gamma.evaluate(0.5), 0.25);
    }

    #[test]
    fn inverts_red_channel_only() {
        let ctx = context(1, 1);
        let input = output(filled(1, 1, IntRect::new(0, 0, 1, 1), [255, 0, 0, 255]));
        let mut transfer = ComponentTransfer::default();
        transfer.set_function(Channel::R, TransferFunction::Table(vec![1.0, 0.0]));
        transfer.set_function(Channel::G, TransferFunction::Table(vec![1.0, 0.0]));
        let out = transfer.render(&[input], &target(&ctx), &ctx).expect("render");
        assert_eq!(pixel(&out, 0, 0), (0, 255, 0, 255));
    }
}
