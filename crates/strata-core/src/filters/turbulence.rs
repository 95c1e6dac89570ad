use tiny_skia::Pixmap;
use tracing::warn;

use crate::errors::FilterError;
use crate::filters::surface::{new_surface, premultiply};
use crate::filters::{parse, FilterContext, FilterOutput, RenderTarget};
use crate::style::PropertyBag;
use crate::types::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurbulenceKind {
    FractalNoise,
    #[default]
    Turbulence,
}

const KINDS: &[(&str, TurbulenceKind)] = &[
    ("fractalNoise", TurbulenceKind::FractalNoise),
    ("turbulence", TurbulenceKind::Turbulence),
];

/// `feTurbulence`: Perlin noise, generated in the operating color space.
#[derive(Debug, Clone, PartialEq)]
pub struct Turbulence {
    pub base_frequency: (f64, f64),
    pub num_octaves: u32,
    pub seed: f64,
    pub stitch_tiles: bool,
    pub kind: TurbulenceKind,
}

const B_SIZE: usize = 0x100;
const B_MASK: i64 = 0xff;
const PERLIN_N: f64 = 4096.0;

const RAND_M: i64 = 2147483647;
const RAND_A: i64 = 16807;
const RAND_Q: i64 = 127773;
const RAND_R: i64 = 2836;

fn setup_seed(seed: i64) -> i64 {
    let mut seed = seed;
    if seed <= 0 {
        seed = -(seed % (RAND_M - 1)) + 1;
    }
    seed.min(RAND_M - 1)
}

fn random(seed: i64) -> i64 {
    let result = RAND_A * (seed % RAND_Q) - RAND_R * (seed / RAND_Q);
    if result <= 0 {
        result + RAND_M
    } else {
        result
    }
}

#[derive(Debug, Clone, Copy)]
struct Stitch {
    width: i64,
    height: i64,
    wrap_x: i64,
    wrap_y: i64,
}

/// Lattice and gradient tables for one seed.
struct Noise {
    lattice: Vec<usize>,
    gradient: [Vec<[f64; 2]>; 4],
}

impl Noise {
    fn new(seed: i64) -> Self {
        let mut seed = setup_seed(seed);
        let len = B_SIZE + B_SIZE + 2;
        let mut lattice = vec![0usize; len];
        let mut gradient: [Vec<[f64; 2]>; 4] = std::array::from_fn(|_| vec![[0.0; 2]; len]);

        for channel in gradient.iter_mut() {
            for (i, slot) in lattice.iter_mut().enumerate().take(B_SIZE) {
                *slot = i;
                let mut g = [0.0; 2];
                for v in g.iter_mut() {
                    seed = random(seed);
                    *v = ((seed % (2 * B_SIZE as i64)) - B_SIZE as i64) as f64 / B_SIZE as f64;
                }
                let s = (g[0] * g[0] + g[1] * g[1]).sqrt();
                channel[i] = if s > 0.0 { [g[0] / s, g[1] / s] } else { [0.0, 0.0] };
            }
        }
        for i in (1..B_SIZE).rev() {
            seed = random(seed);
            let j = (seed % B_SIZE as i64) as usize;
            lattice.swap(i, j);
        }
        for i in 0..B_SIZE + 2 {
            lattice[B_SIZE + i] = lattice[i];
            for channel in gradient.iter_mut() {
                channel[B_SIZE + i] = channel[i];
            }
        }
        Self { lattice, gradient }
    }

    fn noise2(&self, channel: usize, vec: [f64; 2], stitch: Option<&Stitch>) -> f64 {
        let t = vec[0] + PERLIN_N;
        let mut bx0 = t as i64;
        let mut bx1 = bx0 + 1;
        let rx0 = t - t.trunc();
        let rx1 = rx0 - 1.0;
        let t = vec[1] + PERLIN_N;
        let mut by0 = t as i64;
        let mut by1 = by0 + 1;
        let ry0 = t - t.trunc();
        let ry1 = ry0 - 1.0;

        if let Some(s) = stitch {
            if bx0 >= s.wrap_x {
                bx0 -= s.width;
            }
            if bx1 >= s.wrap_x {
                bx1 -= s.width;
            }
            if by0 >= s.wrap_y {
                by0 -= s.height;
            }
            if by1 >= s.wrap_y {
                by1 -= s.height;
            }
        }
        let (bx0, bx1) = ((bx0 & B_MASK) as usize, (bx1 & B_MASK) as usize);
        let (by0, by1) = ((by0 & B_MASK) as usize, (by1 & B_MASK) as usize);

        let i = self.lattice[bx0];
        let j = self.lattice[bx1];
        let b00 = self.lattice[i + by0];
        let b10 = self.lattice[j + by0];
        let b01 = self.lattice[i + by1];
        let b11 = self.lattice[j + by1];

        let s_curve = |t: f64| t * t * (3.0 - 2.0 * t);
        let lerp = |t: f64, a: f64, b: f64| a + t * (b - a);
        let g = &self.gradient[channel];
        let sx = s_curve(rx0);
        let sy = s_curve(ry0);
        let u = rx0 * g[b00][0] + ry0 * g[b00][1];
        let v = rx1 * g[b10][0] + ry0 * g[b10][1];
        let a = lerp(sx, u, v);
        let u = rx0 * g[b01][0] + ry1 * g[b01][1];
        let v = rx1 * g[b11][0] + ry1 * g[b11][1];
        let b = lerp(sx, u, v);
        lerp(sy, a, b)
    }
}

impl Turbulence {
    pub fn from_properties(props: &PropertyBag) -> Self {
        let element = "feTurbulence";
        let octaves = parse::number(element, props, "numOctaves", 1.0);
        Self {
            base_frequency: parse::number_pair(element, props, "baseFrequency", (0.0, 0.0)),
            num_octaves: if octaves > 0.0 { octaves as u32 } else { 0 },
            seed: parse::number(element, props, "seed", 0.0),
            stitch_tiles: props.get("stitchTiles").map(str::trim) == Some("stitch"),
            kind: parse::keyword(element, props, "type", KINDS, TurbulenceKind::Turbulence),
        }
    }

    /// Sum of octaves for one channel at `point` (user space).
    fn turbulence(&self, noise: &Noise, channel: usize, point: (f64, f64), tile: &Rect) -> f64 {
        let (mut fx, mut fy) = self.base_frequency;
        let mut stitch = None;
        if self.stitch_tiles {
            let adjust = |freq: f64, size: f64| {
                if freq == 0.0 {
                    return freq;
                }
                let lo = (size * freq).floor() / size;
                let hi = (size * freq).ceil() / size;
                if lo > 0.0 && freq / lo < hi / freq {
                    lo
                } else {
                    hi
                }
            };
            fx = adjust(fx, tile.width);
            fy = adjust(fy, tile.height);
            let width = (tile.width * fx + 0.5) as i64;
            let height = (tile.height * fy + 0.5) as i64;
            stitch = Some(Stitch {
                width,
                height,
                wrap_x: (tile.x * fx + PERLIN_N) as i64 + width,
                wrap_y: (tile.y * fy + PERLIN_N) as i64 + height,
            });
        }

        let mut sum = 0.0;
        let mut vec = [point.0 * fx, point.1 * fy];
        let mut ratio = 1.0;
        for _ in 0..self.num_octaves {
            let n = noise.noise2(channel, vec, stitch.as_ref());
            sum += match self.kind {
                TurbulenceKind::FractalNoise => n / ratio,
                TurbulenceKind::Turbulence => n.abs() / ratio,
            };
            vec = [vec[0] * 2.0, vec[1] * 2.0];
            ratio *= 2.0;
            if let Some(s) = stitch.as_mut() {
                s.width *= 2;
                s.wrap_x = 2 * s.wrap_x - PERLIN_N as i64;
                s.height *= 2;
                s.wrap_y = 2 * s.wrap_y - PERLIN_N as i64;
            }
        }
        sum
    }

    pub fn render(
        &self,
        _inputs: &[FilterOutput],
        target: &RenderTarget,
        ctx: &FilterContext<'_>,
    ) -> Result<Pixmap, FilterError> {
        let mut out = new_surface(ctx.width, ctx.height)?;
        let (fx, fy) = self.base_frequency;
        if fx < 0.0 || fy < 0.0 {
            warn!(base_frequency = ?self.base_frequency, "negative feTurbulence frequency");
            return Ok(out);
        }
        let Some(inverse) = ctx.paffine.invert() else {
            return Ok(out);
        };
        let noise = Noise::new(self.seed.trunc() as i64);
        let tile = target.rect;

        let width = ctx.width as usize;
        let dst = out.pixels_mut();
        let b = target.bounds;
        for y in b.y0..b.y1 {
            for x in b.x0..b.x1 {
                let point = inverse.transform_point(x as f64, y as f64);
                let mut c = [0.0f32; 4];
                for (channel, v) in c.iter_mut().enumerate() {
                    let sum = self.turbulence(&noise, channel, point, &tile);
                    let value = match self.kind {
                        TurbulenceKind::FractalNoise => (sum * 255.0 + 255.0) / 2.0,
                        TurbulenceKind::Turbulence => sum * 255.0,
                    };
                    *v = (value.clamp(0.0, 255.0) / 255.0) as f32;
                }
                dst[y as usize * width + x as usize] = premultiply(c);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::{context, pixel, target};

    fn turbulence(kind: TurbulenceKind, seed: f64) -> Turbulence {
        Turbulence {
            base_frequency: (0.05, 0.05),
            num_octaves: 2,
            seed,
            stitch_tiles: false,
            kind,
        }
    }

    #[test]
    fn random_matches_park_miller() {
        assert_eq!(setup_seed(0), 1);
        assert_eq!(random(1), 16807);
        assert_eq!(random(16807), 282475249);
    }

    #[test]
    fn same_seed_is_deterministic() {
        let ctx = context(8, 8);
        let a = turbulence(TurbulenceKind::FractalNoise, 3.0)
            .render(&[], &target(&ctx), &ctx)
            .expect("render");
        let b = turbulence(TurbulenceKind::FractalNoise, 3.7)
            .render(&[], &target(&ctx), &ctx)
            .expect("render");
        assert_eq!(a.data(), b.data(), "seed is truncated");
        let c = turbulence(TurbulenceKind::FractalNoise, 4.0)
            .render(&[], &target(&ctx), &ctx)
            .expect("render");
        assert_ne!(a.data(), c.data());
    }

    #[test]
    fn fractal_noise_is_centred_on_half() {
        let ctx = context(4, 4);
        // Lattice points give zero noise, so fractal noise is mid grey.
        let out = turbulence(TurbulenceKind::FractalNoise, 1.0)
            .render(&[], &target(&ctx), &ctx)
            .expect("render");
        let (_, _, _, a) = pixel(&out, 0, 0);
        assert!((126..=129).contains(&a), "alpha {a}");
    }

    #[test]
    fn zero_octaves_is_transparent_turbulence() {
        let ctx = context(2, 2);
        let mut t = turbulence(TurbulenceKind::Turbulence, 0.0);
        t.num_octaves = 0;
        let out = t.render(&[], &target(&ctx), &ctx).expect("render");
        assert!(out.pixels().iter().all(|p| p.alpha() == 0));
    }
}
