//! Pixel helpers shared by the kernels.
//!
//! Surfaces are canvas-sized premultiplied `Pixmap`s; a result only owns
//! the pixels inside its bounds, everything outside stays transparent.

use std::sync::OnceLock;

use tiny_skia::{Pixmap, PremultipliedColorU8};

use crate::errors::FilterError;
use crate::types::{ColorSpace, IntRect};

pub(crate) fn new_surface(width: u32, height: u32) -> Result<Pixmap, FilterError> {
    Pixmap::new(width, height).ok_or(FilterError::Allocation { width, height })
}

pub(crate) fn clamp01(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Premultiplied components in `0..=1`.
pub(crate) fn premultiplied(px: PremultipliedColorU8) -> [f32; 4] {
    let norm = |v: u8| v as f32 / 255.0;
    [norm(px.red()), norm(px.green()), norm(px.blue()), norm(px.alpha())]
}

/// Packs premultiplied components, keeping color channels at or below alpha.
pub(crate) fn from_premultiplied(c: [f32; 4]) -> PremultipliedColorU8 {
    let a = clamp01(c[3]);
    let a_byte = (a * 255.0).round() as u8;
    let channel = |v: f32| ((clamp01(v).min(a)) * 255.0).round().min(a_byte as f32) as u8;
    PremultipliedColorU8::from_rgba(channel(c[0]), channel(c[1]), channel(c[2]), a_byte)
        .unwrap_or(PremultipliedColorU8::TRANSPARENT)
}

/// Straight (unpremultiplied) components in `0..=1`.
pub(crate) fn unpremultiply(px: PremultipliedColorU8) -> [f32; 4] {
    let a = px.alpha() as f32 / 255.0;
    if a <= 0.0 {
        return [0.0; 4];
    }
    let inv_a = 1.0 / a;
    [
        clamp01(px.red() as f32 / 255.0 * inv_a),
        clamp01(px.green() as f32 / 255.0 * inv_a),
        clamp01(px.blue() as f32 / 255.0 * inv_a),
        a,
    ]
}

/// Packs straight components into a premultiplied pixel.
pub(crate) fn premultiply(c: [f32; 4]) -> PremultipliedColorU8 {
    let a = clamp01(c[3]);
    from_premultiplied([clamp01(c[0]) * a, clamp01(c[1]) * a, clamp01(c[2]) * a, a])
}

const LUT_SIZE: usize = 256;

static SRGB_TO_LINEAR: OnceLock<[f32; LUT_SIZE + 1]> = OnceLock::new();
static LINEAR_TO_SRGB: OnceLock<[f32; LUT_SIZE + 1]> = OnceLock::new();

fn build_lut(f: impl Fn(f32) -> f32) -> [f32; LUT_SIZE + 1] {
    let mut lut = [0.0; LUT_SIZE + 1];
    for (idx, slot) in lut.iter_mut().enumerate() {
        *slot = f(idx as f32 / LUT_SIZE as f32);
    }
    lut
}

fn sample_lut(value: f32, lut: &[f32; LUT_SIZE + 1]) -> f32 {
    let scaled = clamp01(value) * LUT_SIZE as f32;
    let idx = scaled.floor() as usize;
    let next = (idx + 1).min(LUT_SIZE);
    let frac = scaled - idx as f32;
    lut[idx] + (lut[next] - lut[idx]) * frac
}

pub(crate) fn srgb_to_linear(v: f32) -> f32 {
    sample_lut(
        v,
        SRGB_TO_LINEAR.get_or_init(|| {
            build_lut(|x| {
                if x <= 0.04045 {
                    x / 12.92
                } else {
                    ((x + 0.055) / 1.055).powf(2.4)
                }
            })
        }),
    )
}

pub(crate) fn linear_to_srgb(v: f32) -> f32 {
    sample_lut(
        v,
        LINEAR_TO_SRGB.get_or_init(|| {
            build_lut(|x| {
                if x <= 0.0031308 {
                    12.92 * x
                } else {
                    1.055 * x.powf(1.0 / 2.4) - 0.055
                }
            })
        }),
    )
}

/// Re-encodes the pixels inside `bounds` from one color space to another.
pub(crate) fn convert_space(
    input: &Pixmap,
    bounds: IntRect,
    from: ColorSpace,
    to: ColorSpace,
) -> Result<Pixmap, FilterError> {
    if from == to {
        return Ok(input.clone());
    }
    let encode: fn(f32) -> f32 = match to {
        ColorSpace::LinearRgb => srgb_to_linear,
        ColorSpace::Srgb => linear_to_srgb,
    };
    let mut out = new_surface(input.width(), input.height())?;
    let width = input.width() as usize;
    let src = input.pixels();
    let dst = out.pixels_mut();
    for y in bounds.y0..bounds.y1 {
        for x in bounds.x0..bounds.x1 {
            let idx = y as usize * width + x as usize;
            let px = src[idx];
            if px.alpha() == 0 {
                continue;
            }
            let [r, g, b, a] = unpremultiply(px);
            dst[idx] = premultiply([encode(r), encode(g), encode(b), a]);
        }
    }
    Ok(out)
}

/// Zeroes every pixel outside `bounds`.
pub(crate) fn clip_to_bounds(pixmap: &mut Pixmap, bounds: IntRect) {
    let width = pixmap.width() as i32;
    for (idx, px) in pixmap.pixels_mut().iter_mut().enumerate() {
        let x = idx as i32 % width;
        let y = idx as i32 / width;
        if !bounds.contains(x, y) {
            *px = PremultipliedColorU8::TRANSPARENT;
        }
    }
}

/// Copy keeping only the alpha channel (black with the source coverage).
pub(crate) fn alpha_only(input: &Pixmap) -> Result<Pixmap, FilterError> {
    let mut out = new_surface(input.width(), input.height())?;
    for (dst, src) in out.pixels_mut().iter_mut().zip(input.pixels()) {
        *dst = PremultipliedColorU8::from_rgba(0, 0, 0, src.alpha())
            .unwrap_or(PremultipliedColorU8::TRANSPARENT);
    }
    Ok(out)
}
