use tiny_skia::Pixmap;

use crate::errors::FilterError;
use crate::filters::surface::{from_premultiplied, new_surface, premultiplied};
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CompositeOperator {
    #[default]
    Over,
    In,
    Out,
    Atop,
    Xor,
    Arithmetic {
        k1: f64,
        k2: f64,
        k3: f64,
        k4: f64,
    },
}

impl CompositeOperator {
    /// Porter-Duff factors `(fa, fb)` for source alpha `sa` and
    /// destination alpha `da`.
    fn factors(self, sa: f32, da: f32) -> (f32, f32) {
        match self {
            CompositeOperator::Over => (1.0, 1.0 - sa),
            CompositeOperator::In => (da, 0.0),
            CompositeOperator::Out => (1.0 - da, 0.0),
            CompositeOperator::Atop => (da, 1.0 - sa),
            CompositeOperator::Xor => (1.0 - da, 1.0 - sa),
            CompositeOperator::Arithmetic { .. } => (0.0, 0.0),
        }
    }
}

/// `feComposite`: `in` composited onto `in2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub input: Option<Input>,
    pub input2: Option<Input>,
    pub operator: CompositeOperator,
}

impl Composite {
    pub fn from_properties(props: &PropertyBag) -> Self {
        let element = "feComposite";
        let operator = match props.get("operator").map(str::trim) {
            Some("in") => CompositeOperator::In,
            Some("out") => CompositeOperator::Out,
            Some("atop") => CompositeOperator::Atop,
            Some("xor") => CompositeOperator::Xor,
            Some("arithmetic") => CompositeOperator::Arithmetic {
                k1: parse::number(element, props, "k1", 0.0),
                k2: parse::number(element, props, "k2", 0.0),
                k3: parse::number(element, props, "k3", 0.0),
                k4: parse::number(element, props, "k4", 0.0),
            },
            Some("over") | None => CompositeOperator::Over,
            Some(other) => {
                tracing::warn!(value = other, "unknown feComposite operator, using over");
                CompositeOperator::Over
            }
        };
        Self {
            input: parse::input(props, "in"),
            input2: parse::input(props, "in2"),
            operator,
        }
    }

    pub fn render(
        &self,
        inputs: &[FilterOutput],
        target: &RenderTarget,
        ctx: &FilterContext<'_>,
    ) -> Result<Pixmap, FilterError> {
        let mut out = new_surface(ctx.width, ctx.height)?;
        let [source, dest] = inputs else {
            return Ok(out);
        };
        let width = ctx.width as usize;
        let src = source.surface.pixels();
        let dst_in = dest.surface.pixels();
        let dst = out.pixels_mut();
        let b = target.bounds;
        for y in b.y0..b.y1 {
            for x in b.x0..b.x1 {
                let idx = y as usize * width + x as usize;
                let s = premultiplied(src[idx]);
                let d = premultiplied(dst_in[idx]);
                let c = match self.operator {
                    CompositeOperator::Arithmetic { k1, k2, k3, k4 } => {
                        let (k1, k2, k3, k4) = (k1 as f32, k2 as f32, k3 as f32, k4 as f32);
                        let mut c = [0.0; 4];
                        for i in 0..4 {
                            c[i] = k1 * s[i] * d[i] + k2 * s[i] + k3 * d[i] + k4;
                        }
                        c
                    }
                    op => {
                        let (fa, fb) = op.factors(s[3], d[3]);
                        [
                            s[0] * fa + d[0] * fb,
                            s[1] * fa + d[1] * fb,
                            s[2] * fa + d[2] * fb,
                            s[3] * fa + d[3] * fb,
                        ]
                    }
                };
                dst[idx] = from_premultiplied(c);
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

    fn run(operator: CompositeOperator) -> Pixmap {
        let ctx = context(3, 1);
        // source covers x=0..2, destination covers x=1..3
        let source = output(filled(3, 1, IntRect::new(0, 0, 2, 1), [255, 0, 0, 255]));
        let dest = output(filled(3, 1, IntRect::new(1, 0, 3, 1), [0, 0, 255, 255]));
        let composite = Composite {
            input: None,
            input2: None,
            operator,
        };
        composite
            .render(&[source, dest], &target(&ctx), &ctx)
            .expect("render")
    }

    #[test]
    fn porter_duff_operators() {
        let over = run(CompositeOperator::Over);
        assert_eq!(pixel(&over, 0, 0), (255, 0, 0, 255));
        assert_eq!(pixel(&over, 1, 0), (255, 0, 0, 255));
        assert_eq!(pixel(&over, 2, 0), (0, 0, 255, 255));

        let inside = run(CompositeOperator::In);
        assert_eq!(pixel(&inside, 0, 0).3, 0, "no destination, nothing kept");
        assert_eq!(pixel(&inside, 1, 0), (255, 0, 0, 255));

        let xor = run(CompositeOperator::Xor);
        assert_eq!(pixel(&xor, 0, 0), (255, 0, 0, 255));
        assert_eq!(pixel(&xor, 1, 0).3, 0, "overlap cancels");
        assert_eq!(pixel(&xor, 2, 0), (0, 0, 255, 255));
    }

    #[test]
    fn arithmetic_clamps_premultiplied_result() {
        let out = run(CompositeOperator::Arithmetic {
            k1: 0.0,
            k2: 1.0,
            k3: 1.0,
            k4: 0.0,
        });
        assert_eq!(pixel(&out, 1, 0), (255, 0, 255, 255));
    }

    #[test]
    fn parses_arithmetic_coefficients() {
        let props: PropertyBag = [("operator", "arithmetic"), ("k2", "0.5"), ("k4", "0.1")]
            .into_iter()
            .collect();
        assert_eq!(
            Composite::from_properties(&props).operator,
            CompositeOperator::Arithmetic {
                k1: 0.0,
                k2: 0.5,
                k3: 0.0,
                k4: 0.1
            }
        );
    }
}
