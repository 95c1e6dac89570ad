use tiny_skia::Pixmap;

use crate::errors::FilterError;
use crate::filters::surface::{from_premultiplied, new_surface, premultiplied, unpremultiply};
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;
use crate::types::IntRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelSelector {
    R,
    G,
    B,
    #[default]
    A,
}

const CHANNELS: &[(&str, ChannelSelector)] = &[
    ("R", ChannelSelector::R),
    ("G", ChannelSelector::G),
    ("B", ChannelSelector::B),
    ("A", ChannelSelector::A),
];

impl ChannelSelector {
    fn index(self) -> usize {
        match self {
            ChannelSelector::R => 0,
            ChannelSelector::G => 1,
            ChannelSelector::B => 2,
            ChannelSelector::A => 3,
        }
    }
}

/// `feDisplacementMap`: moves pixels of `in` by the channels of `in2`.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementMap {
    pub input: Option<Input>,
    pub input2: Option<Input>,
    pub scale: f64,
    pub x_channel: ChannelSelector,
    pub y_channel: ChannelSelector,
}

/// Bilinear sample of premultiplied values; texels outside `bounds` are
/// transparent.
fn sample(pixmap: &Pixmap, bounds: &IntRect, x: f32, y: f32) -> [f32; 4] {
    let width = pixmap.width() as usize;
    // Pixel centres sit at half-integers.
    let (x, y) = (x - 0.5, y - 0.5);
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let tx = x - x0 as f32;
    let ty = y - y0 as f32;
    let pixels = pixmap.pixels();

    let mut acc = [0.0f32; 4];
    for (dy, wy) in [(0, 1.0 - ty), (1, ty)] {
        for (dx, wx) in [(0, 1.0 - tx), (1, tx)] {
            let (sx, sy) = (x0 + dx, y0 + dy);
            let weight = wx * wy;
            if weight <= 0.0 || !bounds.contains(sx, sy) {
                continue;
            }
            let c = premultiplied(pixels[sy as usize * width + sx as usize]);
            for ch in 0..4 {
                acc[ch] += c[ch] * weight;
            }
        }
    }
    acc
}

impl DisplacementMap {
    pub fn from_properties(props: &PropertyBag) -> Self {
        let element = "feDisplacementMap";
        Self {
            input: parse::input(props, "in"),
            input2: parse::input(props, "in2"),
            scale: parse::number(element, props, "scale", 0.0),
            x_channel: parse::keyword(
                element,
                props,
                "xChannelSelector",
                CHANNELS,
                ChannelSelector::A,
            ),
            y_channel: parse::keyword(
                element,
                props,
                "yChannelSelector",
                CHANNELS,
                ChannelSelector::A,
            ),
        }
    }

    pub fn render(
        &self,
        inputs: &[FilterOutput],
        target: &RenderTarget,
        ctx: &FilterContext<'_>,
    ) -> Result<Pixmap, FilterError> {
        let mut out = new_surface(ctx.width, ctx.height)?;
        let [image, map] = inputs else {
            return Ok(out);
        };
        let (sx, sy) = ctx.paffine.scale_factors();
        let (scale_x, scale_y) = ((self.scale * sx) as f32, (self.scale * sy) as f32);

        let width = ctx.width as usize;
        let map_pixels = map.surface.pixels();
        let dst = out.pixels_mut();
        let b = target.bounds;
        for y in b.y0..b.y1 {
            for x in b.x0..b.x1 {
                let idx = y as usize * width + x as usize;
                let m = if map.bounds.contains(x, y) {
                    unpremultiply(map_pixels[idx])
                } else {
                    [0.0; 4]
                };
                let dx = scale_x * (m[self.x_channel.index()] - 0.5);
                let dy = scale_y * (m[self.y_channel.index()] - 0.5);
                let c = sample(
                    &image.surface,
                    &image.bounds,
                    x as f32 + 0.5 + dx,
                    y as f32 + 0.5 + dy,
                );
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

    #[test]
    fn neutral_map_is_identity() {
        let ctx = context(3, 1);
        let image = output(filled(3, 1, IntRect::new(1, 0, 2, 1), [255, 0, 0, 255]));
        let map = output(filled(3, 1, IntRect::new(0, 0, 3, 1), [128, 128, 128, 255]));
        let displace = DisplacementMap {
            input: None,
            input2: None,
            scale: 1.0,
            x_channel: ChannelSelector::R,
            y_channel: ChannelSelector::G,
        };
        let out = displace.render(&[image, map], &target(&ctx), &ctx).expect("render");
        let (r, _, _, a) = pixel(&out, 1, 0);
        assert!(r >= 254 && a >= 254, "centre stays, got {r}/{a}");
    }

    #[test]
    fn full_red_pulls_from_the_right() {
        let ctx = context(4, 1);
        let image = output(filled(4, 1, IntRect::new(2, 0, 3, 1), [0, 255, 0, 255]));
        // R = 1 displaces by +scale/2 = 1 pixel, G = 0.5 stays put.
        let map = output(filled(4, 1, IntRect::new(0, 0, 4, 1), [255, 128, 0, 255]));
        let displace = DisplacementMap {
            input: None,
            input2: None,
            scale: 2.0,
            x_channel: ChannelSelector::R,
            y_channel: ChannelSelector::G,
        };
        let out = displace.render(&[image, map], &target(&ctx), &ctx).expect("render");
        let (_, g, _, a) = pixel(&out, 1, 0);
        assert!(g >= 253 && a >= 253, "sampled from x=2, got {g}/{a}");
        assert_eq!(pixel(&out, 2, 0).3, 0);
    }
}
