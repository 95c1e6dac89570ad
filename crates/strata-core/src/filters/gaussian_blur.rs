use std::f64::consts::PI;

use rayon::prelude::*;
use tiny_skia::Pixmap;
use tracing::warn;

use crate::errors::FilterError;
use crate::filters::surface::{from_premultiplied, new_surface, premultiplied};
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;

/// `feGaussianBlur`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianBlur {
    pub input: Option<Input>,
    pub std_deviation: (f64, f64),
}

/// Device deviations from here up are approximated by three box blurs.
const BOX_BLUR_MIN_SIGMA: f64 = 2.0;

/// Box widths beyond this cover any canvas; larger values only change the
/// divisor, which is kept exact.
const MAX_BOX_SIZE: f64 = (1u64 << 30) as f64;

/// Normalized weights for `sigma` and their radius, `ceil(3 sigma)`.
fn kernel(sigma: f64) -> (Vec<f32>, usize) {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return (vec![1.0], 0);
    }
    let sigma = sigma as f32;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut weights: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-(x * x) / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    if sum > 0.0 {
        weights.iter_mut().for_each(|w| *w /= sum);
    }
    (weights, radius)
}

/// Averages `size` samples starting `left` samples before each output.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BoxPass {
    size: f64,
    left: f64,
}

impl BoxPass {
    fn apply(&self, line: &[[f32; 4]]) -> Vec<[f32; 4]> {
        let n = line.len() as i64;
        let mut prefix = Vec::with_capacity(line.len() + 1);
        let mut acc = [0.0f64; 4];
        prefix.push(acc);
        for px in line {
            for ch in 0..4 {
                acc[ch] += px[ch] as f64;
            }
            prefix.push(acc);
        }
        let window = self.size.min(MAX_BOX_SIZE) as i64;
        let left = self.left.min(MAX_BOX_SIZE) as i64;
        (0..n)
            .map(|i| {
                let lo = (i - left).clamp(0, n) as usize;
                let hi = (i - left + window).clamp(0, n) as usize;
                let mut out = [0.0f32; 4];
                for ch in 0..4 {
                    out[ch] = ((prefix[hi][ch] - prefix[lo][ch]) / self.size) as f32;
                }
                out
            })
            .collect()
    }
}

/// Blur along one axis.
#[derive(Debug, Clone, PartialEq)]
enum AxisBlur {
    Identity,
    Gaussian { weights: Vec<f32>, radius: usize },
    Boxes([BoxPass; 3]),
}

impl AxisBlur {
    fn new(sigma: f64) -> Self {
        if !(sigma > 0.0) {
            return AxisBlur::Identity;
        }
        if sigma < BOX_BLUR_MIN_SIGMA {
            let (weights, radius) = kernel(sigma);
            return AxisBlur::Gaussian { weights, radius };
        }
        let d = (sigma * 3.0 * (2.0 * PI).sqrt() / 4.0 + 0.5).floor();
        let half = (d / 2.0).floor();
        if d % 2.0 == 1.0 {
            let centred = BoxPass { size: d, left: half };
            AxisBlur::Boxes([centred; 3])
        } else {
            // Two boxes offset half a pixel either way, then one of odd width.
            AxisBlur::Boxes([
                BoxPass { size: d, left: half },
                BoxPass {
                    size: d,
                    left: half - 1.0,
                },
                BoxPass {
                    size: d + 1.0,
                    left: half,
                },
            ])
        }
    }

    fn is_identity(&self) -> bool {
        matches!(self, AxisBlur::Identity)
    }

    fn apply(&self, line: &mut [[f32; 4]]) {
        match self {
            AxisBlur::Identity => {}
            AxisBlur::Gaussian { weights, radius } => {
                let n = line.len() as i64;
                let radius = *radius as i64;
                let blurred: Vec<[f32; 4]> = (0..n)
                    .map(|i| {
                        let mut acc = [0.0f32; 4];
                        for (k, w) in weights.iter().enumerate() {
                            let s = i + k as i64 - radius;
                            if s < 0 || s >= n {
                                continue;
                            }
                            let c = line[s as usize];
                            for ch in 0..4 {
                                acc[ch] += c[ch] * w;
                            }
                        }
                        acc
                    })
                    .collect();
                line.copy_from_slice(&blurred);
            }
            AxisBlur::Boxes(passes) => {
                let mut current = line.to_vec();
                for pass in passes {
                    current = pass.apply(&current);
                }
                line.copy_from_slice(&current);
            }
        }
    }
}

fn transpose(src: &[[f32; 4]], width: usize, height: usize) -> Vec<[f32; 4]> {
    let mut out = vec![[0.0f32; 4]; src.len()];
    for y in 0..height {
        for x in 0..width {
            out[x * height + y] = src[y * width + x];
        }
    }
    out
}

impl GaussianBlur {
    pub fn from_properties(props: &PropertyBag) -> Self {
        Self {
            input: parse::input(props, "in"),
            std_deviation: parse::number_pair("feGaussianBlur", props, "stdDeviation", (0.0, 0.0)),
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
        let (sdx, sdy) = self.std_deviation;
        if sdx < 0.0 || sdy < 0.0 {
            warn!(std_deviation = ?self.std_deviation, "negative feGaussianBlur deviation");
            return Ok(out);
        }
        if sdx == 0.0 && sdy == 0.0 {
            out.pixels_mut().copy_from_slice(input.surface.pixels());
            return Ok(out);
        }
        let width = ctx.width as usize;
        let height = ctx.height as usize;
        if width == 0 || height == 0 {
            return Ok(out);
        }
        let (scale_x, scale_y) = ctx.paffine.scale_factors();
        let horizontal = AxisBlur::new(sdx * scale_x);
        let vertical = AxisBlur::new(sdy * scale_y);

        let mut buffer: Vec<[f32; 4]> =
            input.surface.pixels().iter().map(|&px| premultiplied(px)).collect();
        if !horizontal.is_identity() {
            buffer
                .par_chunks_mut(width)
                .for_each(|row| horizontal.apply(row));
        }
        if !vertical.is_identity() {
            let mut columns = transpose(&buffer, width, height);
            columns
                .par_chunks_mut(height)
                .for_each(|column| vertical.apply(column));
            buffer = transpose(&columns, height, width);
        }

        let bounds = target.bounds.intersect(&ctx.canvas_bounds());
        let pixels = out.pixels_mut();
        for y in bounds.y0..bounds.y1 {
            for x in bounds.x0..bounds.x1 {
                let idx = y as usize * width + x as usize;
                pixels[idx] = from_premultiplied(buffer[idx]);
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
    fn kernel_is_normalized() {
        let (weights, radius) = kernel(1.5);
        assert_eq!(radius, 5);
        assert_eq!(weights.len(), 11);
        let sum: f32 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(weights[5] > weights[4], "peak at the centre");
    }

    #[test]
    fn large_deviation_uses_three_boxes() {
        // d = floor(2 * 3 * sqrt(2 pi) / 4 + 0.5) = 4, an even width.
        match AxisBlur::new(2.0) {
            AxisBlur::Boxes(passes) => {
                let sizes: Vec<f64> = passes.iter().map(|p| p.size).collect();
                assert_eq!(sizes, vec![4.0, 4.0, 5.0]);
                assert_eq!(passes[0].left, 2.0);
                assert_eq!(passes[1].left, 1.0);
            }
            other => panic!("expected box passes, got {other:?}"),
        }
        assert!(AxisBlur::new(0.0).is_identity());
    }

    #[test]
    fn box_passes_conserve_coverage() {
        let mut line = vec![[0.0f32; 4]; 61];
        line[30] = [1.0; 4];
        AxisBlur::new(4.0).apply(&mut line);
        let total: f32 = line.iter().map(|c| c[3]).sum();
        assert!((total - 1.0).abs() < 1e-4, "total {total}");
        assert!(line[30][3] > line[25][3] && line[25][3] > line[20][3]);
    }

    #[test]
    fn huge_deviation_renders_without_overflow() {
        let ctx = context(8, 8);
        let input = output(filled(8, 8, IntRect::new(0, 0, 8, 8), [255, 0, 0, 255]));
        let blur = GaussianBlur {
            input: None,
            std_deviation: (20000.0, 1e30),
        };
        let out = blur.render(&[input], &target(&ctx), &ctx).expect("render");
        assert!(pixel(&out, 4, 4).3 <= 1, "coverage spread over the whole window");
    }

    #[test]
    fn blur_spreads_a_single_pixel() {
        let ctx = context(9, 9);
        let input = output(filled(9, 9, IntRect::new(4, 4, 5, 5), [255, 255, 255, 255]));
        let blur = GaussianBlur {
            input: None,
            std_deviation: (1.0, 1.0),
        };
        let out = blur.render(&[input], &target(&ctx), &ctx).expect("render");
        let centre = pixel(&out, 4, 4).3;
        let neighbour = pixel(&out, 5, 4).3;
        assert!(centre > neighbour && neighbour > 0, "{centre} > {neighbour} > 0");
        assert_eq!(pixel(&out, 0, 0).3, 0, "beyond 3 sigma");
    }

    #[test]
    fn one_axis_blur_keeps_the_other_sharp() {
        let ctx = context(5, 5);
        let input = output(filled(5, 5, IntRect::new(2, 2, 3, 3), [255, 255, 255, 255]));
        let blur = GaussianBlur {
            input: None,
            std_deviation: (1.0, 0.0),
        };
        let out = blur.render(&[input], &target(&ctx), &ctx).expect("render");
        assert!(pixel(&out, 1, 2).3 > 0);
        assert_eq!(pixel(&out, 2, 1).3, 0);
    }

    #[test]
    fn zero_deviation_passes_through() {
        let ctx = context(2, 2);
        let input = output(filled(2, 2, IntRect::new(0, 0, 1, 1), [255, 0, 0, 255]));
        let blur = GaussianBlur {
            input: None,
            std_deviation: (0.0, 0.0),
        };
        let out = blur.render(&[input], &target(&ctx), &ctx).expect("render");
        assert_eq!(pixel(&out, 0, 0), (255, 0, 0, 255));
    }
}
