use tiny_skia::{Pixmap, PixmapPaint, Transform};

use crate::errors::FilterError;
use crate::filters::surface::new_surface;
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Darken,
    Lighten,
    Overlay,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

const MODES: &[(&str, BlendMode)] = &[
    ("normal", BlendMode::Normal),
    ("multiply", BlendMode::Multiply),
    ("screen", BlendMode::Screen),
    ("darken", BlendMode::Darken),
    ("lighten", BlendMode::Lighten),
    ("overlay", BlendMode::Overlay),
    ("color-dodge", BlendMode::ColorDodge),
    ("color-burn", BlendMode::ColorBurn),
    ("hard-light", BlendMode::HardLight),
    ("soft-light", BlendMode::SoftLight),
    ("difference", BlendMode::Difference),
    ("exclusion", BlendMode::Exclusion),
    ("hue", BlendMode::Hue),
    ("saturation", BlendMode::Saturation),
    ("color", BlendMode::Color),
    ("luminosity", BlendMode::Luminosity),
];

impl BlendMode {
    pub fn to_tiny_skia(self) -> tiny_skia::BlendMode {
        use tiny_skia::BlendMode as Sk;
        match self {
            BlendMode::Normal => Sk::SourceOver,
            BlendMode::Multiply => Sk::Multiply,
            BlendMode::Screen => Sk::Screen,
            BlendMode::Darken => Sk::Darken,
            BlendMode::Lighten => Sk::Lighten,
            BlendMode::Overlay => Sk::Overlay,
            BlendMode::ColorDodge => Sk::ColorDodge,
            BlendMode::ColorBurn => Sk::ColorBurn,
            BlendMode::HardLight => Sk::HardLight,
            BlendMode::SoftLight => Sk::SoftLight,
            BlendMode::Difference => Sk::Difference,
            BlendMode::Exclusion => Sk::Exclusion,
            BlendMode::Hue => Sk::Hue,
            BlendMode::Saturation => Sk::Saturation,
            BlendMode::Color => Sk::Color,
            BlendMode::Luminosity => Sk::Luminosity,
        }
    }
}

/// `feBlend`: `in` blended over `in2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Blend {
    pub input: Option<Input>,
    pub input2: Option<Input>,
    pub mode: BlendMode,
}

impl Blend {
    pub fn from_properties(props: &PropertyBag) -> Self {
        Self {
            input: parse::input(props, "in"),
            input2: parse::input(props, "in2"),
            mode: parse::keyword("feBlend", props, "mode", MODES, BlendMode::Normal),
        }
    }

    pub fn render(
        &self,
        inputs: &[FilterOutput],
        _target: &RenderTarget,
        ctx: &FilterContext<'_>,
    ) -> Result<Pixmap, FilterError> {
        let mut out = new_surface(ctx.width, ctx.height)?;
        let [top, bottom] = inputs else {
            return Ok(out);
        };
        out.draw_pixmap(
            0,
            0,
            Pixmap::as_ref(&bottom.surface),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        let paint = PixmapPaint {
            blend_mode: self.mode.to_tiny_skia(),
            ..PixmapPaint::default()
        };
        out.draw_pixmap(0, 0, Pixmap::as_ref(&top.surface), &paint, Transform::identity(), None);
        Ok(out)
    }
}
