//! `feDiffuseLighting` and `feSpecularLighting`.
//!
//! The input's alpha channel is treated as a height map. Surface normals
//! come from a Sobel operator that shrinks at the edges of the input
//! subregion; light vectors are computed per pixel in device space.

use rayon::prelude::*;
use tiny_skia::Pixmap;
use tracing::warn;

use crate::errors::FilterError;
use crate::filters::surface::{new_surface, premultiply, srgb_to_linear};
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;
use crate::types::{Color, ColorSpace, IntRect};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightSource {
    Distant {
        azimuth: f64,
        elevation: f64,
    },
    Point {
        x: f64,
        y: f64,
        z: f64,
    },
    Spot {
        x: f64,
        y: f64,
        z: f64,
        points_at: (f64, f64, f64),
        specular_exponent: f64,
        limiting_cone_angle: Option<f64>,
    },
}

impl LightSource {
    /// Parses a light source child element; other elements yield `None`.
    pub fn from_element(name: &str, props: &PropertyBag) -> Option<LightSource> {
        let n = |key: &str, default: f64| parse::number(name, props, key, default);
        match name {
            "feDistantLight" => Some(LightSource::Distant {
                azimuth: n("azimuth", 0.0),
                elevation: n("elevation", 0.0),
            }),
            "fePointLight" => Some(LightSource::Point {
                x: n("x", 0.0),
                y: n("y", 0.0),
                z: n("z", 0.0),
            }),
            "feSpotLight" => Some(LightSource::Spot {
                x: n("x", 0.0),
                y: n("y", 0.0),
                z: n("z", 0.0),
                points_at: (n("pointsAtX", 0.0), n("pointsAtY", 0.0), n("pointsAtZ", 0.0)),
                specular_exponent: n("specularExponent", 1.0),
                limiting_cone_angle: props
                    .get("limitingConeAngle")
                    .map(|_| n("limitingConeAngle", 0.0)),
            }),
            _ => None,
        }
    }

    /// Maps positional sources from primitive units to device space.
    fn to_device(self, ctx: &FilterContext<'_>) -> LightSource {
        let z_scale = ctx.paffine.expansion();
        match self {
            LightSource::Distant { .. } => self,
            LightSource::Point { x, y, z } => {
                let (x, y) = ctx.paffine.transform_point(x, y);
                LightSource::Point { x, y, z: z * z_scale }
            }
            LightSource::Spot {
                x,
                y,
                z,
                points_at,
                specular_exponent,
                limiting_cone_angle,
            } => {
                let (x, y) = ctx.paffine.transform_point(x, y);
                let (px, py) = ctx.paffine.transform_point(points_at.0, points_at.1);
                LightSource::Spot {
                    x,
                    y,
                    z: z * z_scale,
                    points_at: (px, py, points_at.2 * z_scale),
                    specular_exponent,
                    limiting_cone_angle,
                }
            }
        }
    }

    /// Unit vector from the surface point towards the light.
    fn vector(&self, x: f64, y: f64, z: f64) -> [f64; 3] {
        match *self {
            LightSource::Distant { azimuth, elevation } => {
                let (az, el) = (azimuth.to_radians(), elevation.to_radians());
                [az.cos() * el.cos(), az.sin() * el.cos(), el.sin()]
            }
            LightSource::Point { x: lx, y: ly, z: lz }
            | LightSource::Spot {
                x: lx, y: ly, z: lz, ..
            } => normalize([lx - x, ly - y, lz - z]),
        }
    }

    /// Light color reaching the surface along `l`.
    fn color(&self, base: [f64; 3], l: [f64; 3]) -> [f64; 3] {
        match *self {
            LightSource::Spot {
                x,
                y,
                z,
                points_at,
                specular_exponent,
                limiting_cone_angle,
            } => {
                let s = normalize([points_at.0 - x, points_at.1 - y, points_at.2 - z]);
                let minus_l_dot_s = -dot(l, s);
                if minus_l_dot_s <= 0.0 {
                    return [0.0; 3];
                }
                if let Some(angle) = limiting_cone_angle {
                    if minus_l_dot_s < angle.to_radians().cos() {
                        return [0.0; 3];
                    }
                }
                let factor = minus_l_dot_s.powf(specular_exponent);
                base.map(|c| c * factor)
            }
            _ => base,
        }
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let len = dot(v, v).sqrt();
    if len > 0.0 {
        v.map(|c| c / len)
    } else {
        v
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightingKind {
    Diffuse { constant: f64 },
    Specular { constant: f64, exponent: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lighting {
    pub input: Option<Input>,
    pub kind: LightingKind,
    pub surface_scale: f64,
    pub lighting_color: Color,
    pub light: Option<LightSource>,
}

impl Lighting {
    pub fn diffuse(props: &PropertyBag) -> Self {
        let element = "feDiffuseLighting";
        Self::with_kind(
            element,
            props,
            LightingKind::Diffuse {
                constant: parse::number(element, props, "diffuseConstant", 1.0),
            },
        )
    }

    pub fn specular(props: &PropertyBag) -> Self {
        let element = "feSpecularLighting";
        Self::with_kind(
            element,
            props,
            LightingKind::Specular {
                constant: parse::number(element, props, "specularConstant", 1.0),
                exponent: parse::number(element, props, "specularExponent", 1.0),
            },
        )
    }

    fn with_kind(element: &str, props: &PropertyBag, kind: LightingKind) -> Self {
        Self {
            input: parse::input(props, "in"),
            kind,
            surface_scale: parse::number(element, props, "surfaceScale", 1.0),
            lighting_color: parse::color(element, props, "lighting-color", Color::WHITE),
            light: None,
        }
    }

    /// The first light source child wins.
    pub fn set_light(&mut self, light: LightSource) {
        if self.light.is_none() {
            self.light = Some(light);
        }
    }

    fn is_valid(&self) -> bool {
        match self.kind {
            LightingKind::Diffuse { constant } => constant >= 0.0,
            LightingKind::Specular { constant, exponent } => {
                constant >= 0.0 && (1.0..=128.0).contains(&exponent)
            }
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
        let Some(light) = self.light else {
            warn!("lighting primitive without a light source");
            return Ok(out);
        };
        if !self.is_valid() {
            warn!(kind = ?self.kind, "invalid lighting constants");
            return Ok(out);
        }
        if input.bounds.is_empty() {
            return Ok(out);
        }
        let light = light.to_device(ctx);
        let c = self.lighting_color;
        let mut base = [c.r as f64, c.g as f64, c.b as f64];
        if target.space == ColorSpace::LinearRgb {
            base = base.map(|v| srgb_to_linear(v as f32) as f64);
        }

        let width = ctx.width as usize;
        let src = input.surface.pixels();
        let surface = input.bounds;
        let scale = self.surface_scale;
        let alpha = |x: i32, y: i32| src[y as usize * width + x as usize].alpha() as f64 / 255.0;
        let bounds = target.bounds;
        let kind = self.kind;

        out.pixels_mut()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as i32;
                if y < bounds.y0 || y >= bounds.y1 {
                    return;
                }
                for x in bounds.x0..bounds.x1 {
                    let (nx, ny) = if surface.contains(x, y) {
                        sobel(&alpha, &surface, x, y, scale)
                    } else {
                        (0.0, 0.0)
                    };
                    let n = normalize([nx, ny, 1.0]);
                    let z = if surface.contains(x, y) {
                        scale * alpha(x, y)
                    } else {
                        0.0
                    };
                    let l = light.vector(x as f64, y as f64, z);
                    let color = light.color(base, l);

                    let rgba = match kind {
                        LightingKind::Diffuse { constant } => {
                            let factor = constant * dot(n, l).max(0.0);
                            [color[0] * factor, color[1] * factor, color[2] * factor, 1.0]
                        }
                        LightingKind::Specular { constant, exponent } => {
                            let h = normalize([l[0], l[1], l[2] + 1.0]);
                            let factor = constant * dot(n, h).max(0.0).powf(exponent);
                            let rgb = color.map(|v| (v * factor).clamp(0.0, 1.0));
                            let a = rgb[0].max(rgb[1]).max(rgb[2]);
                            [rgb[0], rgb[1], rgb[2], a]
                        }
                    };
                    row[x as usize] = premultiply(rgba.map(|v| v as f32));
                }
            });
        Ok(out)
    }
}

/// Surface normal components at `(x, y)`. Missing neighbours at the edge
/// of `surface` are dropped and the kernel renormalized.
fn sobel(
    alpha: &impl Fn(i32, i32) -> f64,
    surface: &IntRect,
    x: i32,
    y: i32,
    scale: f64,
) -> (f64, f64) {
    let left = if x > surface.x0 { x - 1 } else { x };
    let right = if x + 1 < surface.x1 { x + 1 } else { x };
    let up = if y > surface.y0 { y - 1 } else { y };
    let down = if y + 1 < surface.y1 { y + 1 } else { y };

    let weight = |v: i32, centre: i32| if v == centre { 2.0 } else { 1.0 };
    let rows: Vec<i32> = (up..=down).collect();
    let cols: Vec<i32> = (left..=right).collect();

    let gradient_x = if right > left {
        let sum: f64 = rows
            .iter()
            .map(|&r| weight(r, y) * (alpha(right, r) - alpha(left, r)))
            .sum();
        let weights: f64 = rows.iter().map(|&r| weight(r, y)).sum();
        2.0 * sum / ((right - left) as f64 * weights)
    } else {
        0.0
    };
    let gradient_y = if down > up {
        let sum: f64 = cols
            .iter()
            .map(|&c| weight(c, x) * (alpha(c, down) - alpha(c, up)))
            .sum();
        let weights: f64 = cols.iter().map(|&c| weight(c, x)).sum();
        2.0 * sum / ((down - up) as f64 * weights)
    } else {
        0.0
    };
    (-scale * gradient_x, -scale * gradient_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::{context, filled, output, pixel, target};

    fn flat_input(size: u32) -> FilterOutput {
        output(filled(size, size, IntRect::from_size(size, size), [0, 0, 0, 255]))
    }

    #[test]
    fn sobel_matches_interior_and_corner_factors() {
        let surface = IntRect::new(0, 0, 3, 3);
        // Alpha ramps along x: 0, 0.5, 1.
        let ramp = |x: i32, _y: i32| x as f64 * 0.5;
        let (nx, ny) = sobel(&ramp, &surface, 1, 1, 1.0);
        // 1/4 * ((1 + 2 + 1) - 0) = 1
        assert!((nx + 1.0).abs() < 1e-9, "nx = {nx}");
        assert_eq!(ny, 0.0);
        let (corner, _) = sobel(&ramp, &surface, 0, 0, 1.0);
        // 2/3 * ((2*0.5 + 0.5) - (2*0 + 0)) = 1
        assert!((corner + 1.0).abs() < 1e-9, "corner = {corner}");
    }

    #[test]
    fn overhead_distant_light_on_flat_surface() {
        let ctx = context(3, 3);
        let mut lighting = Lighting::diffuse(&PropertyBag::new());
        lighting.set_light(LightSource::Distant {
            azimuth: 0.0,
            elevation: 90.0,
        });
        let out = lighting
            .render(&[flat_input(3)], &target(&ctx), &ctx)
            .expect("render");
        assert_eq!(pixel(&out, 1, 1), (255, 255, 255, 255));
    }

    #[test]
    fn grazing_light_is_dark() {
        let ctx = context(3, 3);
        let mut lighting = Lighting::diffuse(&PropertyBag::new());
        lighting.set_light(LightSource::Distant {
            azimuth: 0.0,
            elevation: 0.0,
        });
        let out = lighting
            .render(&[flat_input(3)], &target(&ctx), &ctx)
            .expect("render");
        assert_eq!(pixel(&out, 1, 1), (0, 0, 0, 255), "diffuse alpha is opaque");
    }

    #[test]
    fn specular_alpha_is_brightest_channel() {
        let ctx = context(3, 3);
        let props: PropertyBag = [("lighting-color", "#ff0000")].into_iter().collect();
        let mut lighting = Lighting::specular(&props);
        lighting.set_light(LightSource::Distant {
            azimuth: 0.0,
            elevation: 90.0,
        });
        let out = lighting
            .render(&[flat_input(3)], &target(&ctx), &ctx)
            .expect("render");
        assert_eq!(pixel(&out, 1, 1), (255, 0, 0, 255));
    }

    #[test]
    fn missing_light_or_bad_exponent_is_transparent() {
        let ctx = context(2, 2);
        let lighting = Lighting::diffuse(&PropertyBag::new());
        let out = lighting
            .render(&[flat_input(2)], &target(&ctx), &ctx)
            .expect("render");
        assert!(out.pixels().iter().all(|p| p.alpha() == 0));

        let props: PropertyBag = [("specularExponent", "200")].into_iter().collect();
        let mut specular = Lighting::specular(&props);
        specular.set_light(LightSource::Distant {
            azimuth: 0.0,
            elevation: 45.0,
        });
        let out = specular
            .render(&[flat_input(2)], &target(&ctx), &ctx)
            .expect("render");
        assert!(out.pixels().iter().all(|p| p.alpha() == 0));
    }

    #[test]
    fn spot_cone_cuts_off_light() {
        let spot = LightSource::Spot {
            x: 0.0,
            y: 0.0,
            z: 10.0,
            points_at: (0.0, 0.0, 0.0),
            specular_exponent: 1.0,
            limiting_cone_angle: Some(10.0),
        };
        let below = spot.vector(0.0, 0.0, 0.0);
        assert_eq!(spot.color([1.0; 3], below), [1.0; 3]);
        let far = spot.vector(100.0, 0.0, 0.0);
        assert_eq!(spot.color([1.0; 3], far), [0.0; 3]);
    }
}
