use rayon::prelude::*;
use tiny_skia::Pixmap;
use tracing::warn;

use crate::errors::FilterError;
use crate::filters::surface::{
    from_premultiplied, new_surface, premultiplied, premultiply, unpremultiply,
};
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;
use crate::types::IntRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeMode {
    #[default]
    Duplicate,
    Wrap,
    None,
}

const EDGE_MODES: &[(&str, EdgeMode)] = &[
    ("duplicate", EdgeMode::Duplicate),
    ("wrap", EdgeMode::Wrap),
    ("none", EdgeMode::None),
];

impl EdgeMode {
    /// Maps a sample position onto `bounds`; `None` means transparent.
    fn sample(self, x: i32, y: i32, bounds: &IntRect) -> Option<(i32, i32)> {
        if bounds.contains(x, y) {
            return Some((x, y));
        }
        match self {
            EdgeMode::Duplicate => Some((
                x.clamp(bounds.x0, bounds.x1 - 1),
                y.clamp(bounds.y0, bounds.y1 - 1),
            )),
            EdgeMode::Wrap => Some((
                bounds.x0 + (x - bounds.x0).rem_euclid(bounds.width()),
                bounds.y0 + (y - bounds.y0).rem_euclid(bounds.height()),
            )),
            EdgeMode::None => None,
        }
    }
}

/// `feConvolveMatrix`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvolveMatrix {
    pub input: Option<Input>,
    pub order: (f64, f64),
    pub kernel: Vec<f64>,
    pub divisor: Option<f64>,
    pub bias: f64,
    pub target_x: Option<f64>,
    pub target_y: Option<f64>,
    pub edge_mode: EdgeMode,
    pub preserve_alpha: bool,
}

/// Validated parameters.
struct Params {
    order_x: usize,
    order_y: usize,
    kernel: Vec<f32>,
    divisor: f32,
    target_x: i32,
    target_y: i32,
}

impl ConvolveMatrix {
    pub fn from_properties(props: &PropertyBag) -> Self {
        let element = "feConvolveMatrix";
        let optional = |key: &str| props.get(key).map(|_| parse::number(element, props, key, 0.0));
        Self {
            input: parse::input(props, "in"),
            order: parse::number_pair(element, props, "order", (3.0, 3.0)),
            kernel: parse::numbers(element, props, "kernelMatrix").unwrap_or_default(),
            divisor: optional("divisor"),
            bias: parse::number(element, props, "bias", 0.0),
            target_x: optional("targetX"),
            target_y: optional("targetY"),
            edge_mode: parse::keyword(element, props, "edgeMode", EDGE_MODES, EdgeMode::Duplicate),
            preserve_alpha: props.get("preserveAlpha").map(str::trim) == Some("true"),
        }
    }

    fn params(&self) -> Option<Params> {
        let (ox, oy) = self.order;
        if ox < 1.0 || oy < 1.0 || ox.fract() != 0.0 || oy.fract() != 0.0 {
            return None;
        }
        let (order_x, order_y) = (ox as usize, oy as usize);
        if self.kernel.len() != order_x * order_y {
            return None;
        }
        let target = |value: Option<f64>, order: usize| match value {
            None => Some((order / 2) as i32),
            Some(t) if t >= 0.0 && t.fract() == 0.0 && (t as usize) < order => Some(t as i32),
            Some(_) => None,
        };
        let divisor = match self.divisor {
            Some(d) if d == 0.0 => return None,
            Some(d) => d,
            None => {
                let sum: f64 = self.kernel.iter().sum();
                if sum == 0.0 {
                    1.0
                } else {
                    sum
                }
            }
        };
        Some(Params {
            order_x,
            order_y,
            kernel: self.kernel.iter().map(|&v| v as f32).collect(),
            divisor: divisor as f32,
            target_x: target(self.target_x, order_x)?,
            target_y: target(self.target_y, order_y)?,
        })
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
        let Some(p) = self.params() else {
            warn!(order = ?self.order, kernel = self.kernel.len(), "invalid feConvolveMatrix parameters");
            return Ok(out);
        };
        if input.bounds.is_empty() && self.edge_mode != EdgeMode::None {
            return Ok(out);
        }

        let width = ctx.width as usize;
        let src = input.surface.pixels();
        let in_bounds = input.bounds;
        let bounds = target.bounds;
        let bias = self.bias as f32;
        let edge_mode = self.edge_mode;
        let preserve_alpha = self.preserve_alpha;

        let fetch = |x: i32, y: i32| -> [f32; 4] {
            match edge_mode.sample(x, y, &in_bounds) {
                Some((sx, sy)) => {
                    let px = src[sy as usize * width + sx as usize];
                    if preserve_alpha {
                        unpremultiply(px)
                    } else {
                        premultiplied(px)
                    }
                }
                None => [0.0; 4],
            }
        };

        out.pixels_mut()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as i32;
                if y < bounds.y0 || y >= bounds.y1 {
                    return;
                }
                for x in bounds.x0..bounds.x1 {
                    let mut sum = [0.0f32; 4];
                    for i in 0..p.order_y {
                        for j in 0..p.order_x {
                            let weight =
                                p.kernel[(p.order_y - 1 - i) * p.order_x + (p.order_x - 1 - j)];
                            if weight == 0.0 {
                                continue;
                            }
                            let c = fetch(x - p.target_x + j as i32, y - p.target_y + i as i32);
                            for k in 0..4 {
                                sum[k] += c[k] * weight;
                            }
                        }
                    }
                    let px = if preserve_alpha {
                        let alpha = src[y as usize * width + x as usize].alpha() as f32 / 255.0;
                        premultiply([
                            sum[0] / p.divisor + bias,
                            sum[1] / p.divisor + bias,
                            sum[2] / p.divisor + bias,
                            alpha,
                        ])
                    } else {
                        let a = (sum[3] / p.divisor + bias).clamp(0.0, 1.0);
                        from_premultiplied([
                            sum[0] / p.divisor + bias * a,
                            sum[1] / p.divisor + bias * a,
                            sum[2] / p.divisor + bias * a,
                            a,
                        ])
                    };
                    row[x as usize] = px;
                }
            });
        Ok(out)
    }
}
