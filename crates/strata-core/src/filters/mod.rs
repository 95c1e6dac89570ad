//! # Filters Module
//!
//! Filter effects: an ordered pipeline of primitives evaluated over named
//! pixel buffers.
//!
//! ## Responsibilities
//! - **FilterDefinition**: region, unit systems and the primitive list of a
//!   `filter` element. Immutable once built and shared through `Rc`.
//! - **render**: seeds the special sources, evaluates every primitive in
//!   order and returns the last result clipped to the filter region.
//! - **Kernels**: one module per primitive, all with the same
//!   `render(inputs, target, ctx)` shape.
//!
//! Buffers are canvas-sized; each result carries the device bounds it owns
//! and the color space its pixels are encoded in.

use std::collections::HashMap;
use std::rc::Rc;

use tiny_skia::Pixmap;
use tracing::{debug, instrument, warn};

use crate::errors::FilterError;
use crate::transform::Affine;
use crate::types::{ColorSpace, CoordUnits, Rect};
use crate::units::{Length, UnitContext};
use crate::AssetLoader;

mod context;
pub(crate) mod parse;
pub(crate) mod surface;

pub mod blend;
pub mod color_matrix;
pub mod component_transfer;
pub mod composite;
pub mod convolve_matrix;
pub mod displacement_map;
pub mod flood;
pub mod gaussian_blur;
pub mod image;
pub mod lighting;
pub mod merge;
pub mod morphology;
pub mod offset;
pub mod tile;
pub mod turbulence;

pub use blend::{Blend, BlendMode};
pub use color_matrix::{ColorMatrix, ColorMatrixKind};
pub use component_transfer::{Channel, ComponentTransfer, TransferFunction};
pub use composite::{Composite, CompositeOperator};
pub use context::{FilterContext, FilterOutput, RenderTarget};
pub use convolve_matrix::{ConvolveMatrix, EdgeMode};
pub use displacement_map::{ChannelSelector, DisplacementMap};
pub use flood::Flood;
pub use gaussian_blur::GaussianBlur;
pub use image::ImagePrimitive;
pub use lighting::{LightSource, Lighting, LightingKind};
pub use merge::Merge;
pub use morphology::{Morphology, MorphologyOperator};
pub use offset::Offset;
pub use tile::Tile;
pub use turbulence::{Turbulence, TurbulenceKind};

use surface::{alpha_only, clip_to_bounds, convert_space, new_surface};

/// A primitive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    SourceGraphic,
    SourceAlpha,
    BackgroundImage,
    BackgroundAlpha,
    FillPaint,
    StrokePaint,
    /// The `result` of an earlier primitive.
    Named(String),
}

impl Input {
    /// Parses an `in`/`in2` value. Empty means "previous result".
    pub fn parse(s: &str) -> Option<Input> {
        match s.trim() {
            "" => None,
            "SourceGraphic" => Some(Input::SourceGraphic),
            "SourceAlpha" => Some(Input::SourceAlpha),
            "BackgroundImage" => Some(Input::BackgroundImage),
            "BackgroundAlpha" => Some(Input::BackgroundAlpha),
            "FillPaint" => Some(Input::FillPaint),
            "StrokePaint" => Some(Input::StrokePaint),
            name => Some(Input::Named(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterDefinition {
    pub x: Length,
    pub y: Length,
    pub width: Length,
    pub height: Length,
    pub filter_units: CoordUnits,
    pub primitive_units: CoordUnits,
    pub color_interpolation: Option<ColorSpace>,
    pub primitives: Vec<FilterPrimitive>,
}

impl Default for FilterDefinition {
    fn default() -> Self {
        Self {
            x: Length::percent(-0.1),
            y: Length::percent(-0.1),
            width: Length::percent(1.2),
            height: Length::percent(1.2),
            filter_units: CoordUnits::ObjectBoundingBox,
            primitive_units: CoordUnits::UserSpaceOnUse,
            color_interpolation: None,
            primitives: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterPrimitive {
    pub kind: PrimitiveKind,
    pub x: Option<Length>,
    pub y: Option<Length>,
    pub width: Option<Length>,
    pub height: Option<Length>,
    pub result: Option<String>,
    pub color_interpolation: Option<ColorSpace>,
}

impl FilterPrimitive {
    pub fn new(kind: PrimitiveKind) -> Self {
        Self {
            kind,
            x: None,
            y: None,
            width: None,
            height: None,
            result: None,
            color_interpolation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveKind {
    Offset(Offset),
    Merge(Merge),
    ColorMatrix(ColorMatrix),
    ComponentTransfer(ComponentTransfer),
    Flood(Flood),
    Blend(Blend),
    Composite(Composite),
    ConvolveMatrix(ConvolveMatrix),
    Morphology(Morphology),
    DisplacementMap(DisplacementMap),
    Turbulence(Turbulence),
    Image(ImagePrimitive),
    Tile(Tile),
    GaussianBlur(GaussianBlur),
    DiffuseLighting(Lighting),
    SpecularLighting(Lighting),
}

/// How a primitive interacts with `color-interpolation-filters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorPolicy {
    /// Every input is converted to the operating space.
    Convert,
    /// Only the displacement map (second input) is converted.
    ConvertMap,
    /// Pixels are moved, not mixed; the input's space carries through.
    Preserve,
    /// Produces sRGB content regardless of the operating space.
    GeneratesSrgb,
    /// Produces values in the operating space.
    GeneratesOperating,
}

impl ColorPolicy {
    fn converts(self, index: usize) -> bool {
        match self {
            ColorPolicy::Convert => true,
            ColorPolicy::ConvertMap => index == 1,
            _ => false,
        }
    }

    fn output_space(self, space: ColorSpace, inputs: &[FilterOutput]) -> ColorSpace {
        match self {
            ColorPolicy::Convert | ColorPolicy::GeneratesOperating => space,
            ColorPolicy::GeneratesSrgb => ColorSpace::Srgb,
            ColorPolicy::ConvertMap | ColorPolicy::Preserve => {
                inputs.first().map(|i| i.space).unwrap_or(space)
            }
        }
    }
}

impl PrimitiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Offset(_) => "feOffset",
            PrimitiveKind::Merge(_) => "feMerge",
            PrimitiveKind::ColorMatrix(_) => "feColorMatrix",
            PrimitiveKind::ComponentTransfer(_) => "feComponentTransfer",
            PrimitiveKind::Flood(_) => "feFlood",
            PrimitiveKind::Blend(_) => "feBlend",
            PrimitiveKind::Composite(_) => "feComposite",
            PrimitiveKind::ConvolveMatrix(_) => "feConvolveMatrix",
            PrimitiveKind::Morphology(_) => "feMorphology",
            PrimitiveKind::DisplacementMap(_) => "feDisplacementMap",
            PrimitiveKind::Turbulence(_) => "feTurbulence",
            PrimitiveKind::Image(_) => "feImage",
            PrimitiveKind::Tile(_) => "feTile",
            PrimitiveKind::GaussianBlur(_) => "feGaussianBlur",
            PrimitiveKind::DiffuseLighting(_) => "feDiffuseLighting",
            PrimitiveKind::SpecularLighting(_) => "feSpecularLighting",
        }
    }

    /// Inputs in evaluation order; `None` means the previous result.
    pub fn inputs(&self) -> Vec<&Option<Input>> {
        match self {
            PrimitiveKind::Offset(p) => vec![&p.input],
            PrimitiveKind::Merge(p) => p.nodes.iter().collect(),
            PrimitiveKind::ColorMatrix(p) => vec![&p.input],
            PrimitiveKind::ComponentTransfer(p) => vec![&p.input],
            PrimitiveKind::Blend(p) => vec![&p.input, &p.input2],
            PrimitiveKind::Composite(p) => vec![&p.input, &p.input2],
            PrimitiveKind::ConvolveMatrix(p) => vec![&p.input],
            PrimitiveKind::Morphology(p) => vec![&p.input],
            PrimitiveKind::DisplacementMap(p) => vec![&p.input, &p.input2],
            PrimitiveKind::Tile(p) => vec![&p.input],
            PrimitiveKind::GaussianBlur(p) => vec![&p.input],
            PrimitiveKind::DiffuseLighting(p) | PrimitiveKind::SpecularLighting(p) => {
                vec![&p.input]
            }
            PrimitiveKind::Flood(_) | PrimitiveKind::Turbulence(_) | PrimitiveKind::Image(_) => {
                Vec::new()
            }
        }
    }

    fn color_policy(&self) -> ColorPolicy {
        match self {
            PrimitiveKind::Offset(_) | PrimitiveKind::Tile(_) | PrimitiveKind::Morphology(_) => {
                ColorPolicy::Preserve
            }
            PrimitiveKind::DisplacementMap(_) => ColorPolicy::ConvertMap,
            PrimitiveKind::Flood(_) | PrimitiveKind::Image(_) => ColorPolicy::GeneratesSrgb,
            PrimitiveKind::Turbulence(_)
            | PrimitiveKind::DiffuseLighting(_)
            | PrimitiveKind::SpecularLighting(_) => ColorPolicy::GeneratesOperating,
            PrimitiveKind::Merge(_)
            | PrimitiveKind::ColorMatrix(_)
            | PrimitiveKind::ComponentTransfer(_)
            | PrimitiveKind::Blend(_)
            | PrimitiveKind::Composite(_)
            | PrimitiveKind::ConvolveMatrix(_)
            | PrimitiveKind::GaussianBlur(_) => ColorPolicy::Convert,
        }
    }

    /// Runs the kernel. Inputs arrive resolved and converted.
    pub fn render(
        &self,
        inputs: &[FilterOutput],
        target: &RenderTarget,
        ctx: &FilterContext<'_>,
    ) -> Result<Pixmap, FilterError> {
        match self {
            PrimitiveKind::Offset(p) => p.render(inputs, target, ctx),
            PrimitiveKind::Merge(p) => p.render(inputs, target, ctx),
            PrimitiveKind::ColorMatrix(p) => p.render(inputs, target, ctx),
            PrimitiveKind::ComponentTransfer(p) => p.render(inputs, target, ctx),
            PrimitiveKind::Flood(p) => p.render(inputs, target, ctx),
            PrimitiveKind::Blend(p) => p.render(inputs, target, ctx),
            PrimitiveKind::Composite(p) => p.render(inputs, target, ctx),
            PrimitiveKind::ConvolveMatrix(p) => p.render(inputs, target, ctx),
            PrimitiveKind::Morphology(p) => p.render(inputs, target, ctx),
            PrimitiveKind::DisplacementMap(p) => p.render(inputs, target, ctx),
            PrimitiveKind::Turbulence(p) => p.render(inputs, target, ctx),
            PrimitiveKind::Image(p) => p.render(inputs, target, ctx),
            PrimitiveKind::Tile(p) => p.render(inputs, target, ctx),
            PrimitiveKind::GaussianBlur(p) => p.render(inputs, target, ctx),
            PrimitiveKind::DiffuseLighting(p) | PrimitiveKind::SpecularLighting(p) => {
                p.render(inputs, target, ctx)
            }
        }
    }
}

/// Everything a filter application needs from the layer being filtered.
pub struct FilterInvocation<'a> {
    /// The isolated layer content (`SourceGraphic`).
    pub source: &'a Pixmap,
    /// Content beneath the layer (`BackgroundImage`).
    pub background: &'a Pixmap,
    /// Bounding box of the layer content in user space.
    pub bbox: Option<Rect>,
    pub affine: Affine,
    pub units: UnitContext,
    /// Inherited `color-interpolation-filters`, used when the filter
    /// element does not set one.
    pub color_interpolation: Option<ColorSpace>,
    pub loader: &'a dyn AssetLoader,
}

/// Lazily prepared special sources, clipped to the filter region.
struct Sources<'a, 'b> {
    invocation: &'a FilterInvocation<'b>,
    ctx: &'a FilterContext<'b>,
    graphic: Option<FilterOutput>,
    alpha: Option<FilterOutput>,
    background: Option<FilterOutput>,
    background_alpha: Option<FilterOutput>,
}

impl<'a, 'b> Sources<'a, 'b> {
    fn new(invocation: &'a FilterInvocation<'b>, ctx: &'a FilterContext<'b>) -> Self {
        Self {
            invocation,
            ctx,
            graphic: None,
            alpha: None,
            background: None,
            background_alpha: None,
        }
    }

    fn get(&mut self, input: &Input) -> Result<Option<FilterOutput>, FilterError> {
        let (slot, pixmap, alpha) = match input {
            Input::SourceGraphic => (&mut self.graphic, self.invocation.source, false),
            Input::SourceAlpha => (&mut self.alpha, self.invocation.source, true),
            Input::BackgroundImage => (&mut self.background, self.invocation.background, false),
            Input::BackgroundAlpha => (&mut self.background_alpha, self.invocation.background, true),
            _ => return Ok(None),
        };
        if slot.is_none() {
            let mut surface = if alpha {
                alpha_only(pixmap)?
            } else {
                pixmap.clone()
            };
            clip_to_bounds(&mut surface, self.ctx.region);
            *slot = Some(FilterOutput {
                surface: Rc::new(surface),
                bounds: self.ctx.region,
                space: ColorSpace::Srgb,
            });
        }
        Ok(slot.clone())
    }
}

fn transparent(ctx: &FilterContext<'_>) -> Result<FilterOutput, FilterError> {
    Ok(FilterOutput {
        surface: Rc::new(new_surface(ctx.width, ctx.height)?),
        bounds: ctx.region,
        space: ColorSpace::Srgb,
    })
}

fn resolve_input(
    input: &Option<Input>,
    previous: Option<&FilterOutput>,
    results: &HashMap<String, FilterOutput>,
    sources: &mut Sources<'_, '_>,
) -> Result<FilterOutput, FilterError> {
    let input = match input {
        None => match previous {
            Some(prev) => return Ok(prev.clone()),
            None => &Input::SourceGraphic,
        },
        Some(input) => input,
    };
    if let Some(source) = sources.get(input)? {
        return Ok(source);
    }
    match input {
        Input::Named(name) => match results.get(name) {
            Some(found) => Ok(found.clone()),
            None => {
                warn!(result = %name, "filter input names an unknown result");
                transparent(sources.ctx)
            }
        },
        other => {
            warn!(input = ?other, "unsupported filter input");
            transparent(sources.ctx)
        }
    }
}

fn to_space(output: FilterOutput, space: ColorSpace) -> Result<FilterOutput, FilterError> {
    if output.space == space {
        return Ok(output);
    }
    let converted = convert_space(&output.surface, output.bounds, output.space, space)?;
    Ok(FilterOutput {
        surface: Rc::new(converted),
        bounds: output.bounds,
        space,
    })
}

/// Applies `filter` to the layer described by `invocation`.
///
/// Returns a canvas-sized sRGB surface. An empty filter region yields a
/// fully transparent surface; only allocation failure is an error.
#[instrument(level = "debug", skip_all, fields(primitives = filter.primitives.len()))]
pub fn render(
    filter: &FilterDefinition,
    invocation: &FilterInvocation<'_>,
) -> Result<Pixmap, FilterError> {
    let size = (invocation.source.width(), invocation.source.height());
    let ctx = match FilterContext::new(
        filter,
        invocation.bbox,
        invocation.affine,
        invocation.units,
        size,
        invocation.loader,
    ) {
        Ok(ctx) => ctx,
        Err(FilterError::InvalidRegion) => {
            debug!("empty filter region, output is transparent");
            return new_surface(size.0, size.1);
        }
        Err(e) => return Err(e),
    };

    let default_space = filter
        .color_interpolation
        .or(invocation.color_interpolation)
        .unwrap_or_default();
    let mut sources = Sources::new(invocation, &ctx);
    let mut results: HashMap<String, FilterOutput> = HashMap::new();
    let mut previous: Option<FilterOutput> = None;

    for primitive in &filter.primitives {
        let space = primitive.color_interpolation.unwrap_or(default_space);
        let policy = primitive.kind.color_policy();

        let mut inputs = Vec::new();
        for (index, input) in primitive.kind.inputs().into_iter().enumerate() {
            let resolved = resolve_input(input, previous.as_ref(), &results, &mut sources)?;
            inputs.push(if policy.converts(index) {
                to_space(resolved, space)?
            } else {
                resolved
            });
        }

        let target = ctx.target(primitive, &inputs, space);
        let mut pixmap = if target.bounds.is_empty() {
            new_surface(ctx.width, ctx.height)?
        } else {
            primitive.kind.render(&inputs, &target, &ctx)?
        };
        clip_to_bounds(&mut pixmap, target.bounds);
        debug!(primitive = primitive.kind.name(), bounds = ?target.bounds, "evaluated");

        let output = FilterOutput {
            surface: Rc::new(pixmap),
            bounds: target.bounds,
            space: policy.output_space(space, &inputs),
        };
        if let Some(name) = &primitive.result {
            results.insert(name.clone(), output.clone());
        }
        previous = Some(output);
    }

    let last = match previous {
        Some(out) => out,
        None => resolve_input(&None, None, &results, &mut sources)?,
    };
    let mut out = convert_space(&last.surface, last.bounds, last.space, ColorSpace::Srgb)?;
    clip_to_bounds(&mut out, ctx.region);
    Ok(out)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::DefaultAssetLoader;

    pub fn context(width: u32, height: u32) -> FilterContext<'static> {
        let filter = FilterDefinition {
            filter_units: CoordUnits::UserSpaceOnUse,
            x: Length::px(0.0),
            y: Length::px(0.0),
            width: Length::px(width as f64),
            height: Length::px(height as f64),
            ..Default::default()
        };
        let units = UnitContext {
            dpi_x: 90.0,
            dpi_y: 90.0,
            viewport_width: width as f64,
            viewport_height: height as f64,
        };
        FilterContext::new(
            &filter,
            None,
            Affine::IDENTITY,
            units,
            (width, height),
            &DefaultAssetLoader,
        )
        .expect("valid region")
    }

    pub fn target(ctx: &FilterContext<'_>) -> RenderTarget {
        RenderTarget {
            bounds: ctx.region,
            rect: ctx.region.to_rect(),
            space: ColorSpace::Srgb,
        }
    }

    pub fn output(pixmap: Pixmap) -> FilterOutput {
        let bounds = crate::types::IntRect::from_size(pixmap.width(), pixmap.height());
        FilterOutput {
            surface: Rc::new(pixmap),
            bounds,
            space: ColorSpace::Srgb,
        }
    }

    /// A pixmap with a single opaque color everywhere inside `rect`.
    pub fn filled(width: u32, height: u32, rect: crate::types::IntRect, rgba: [u8; 4]) -> Pixmap {
        let mut p = Pixmap::new(width, height).expect("pixmap");
        let px = tiny_skia::ColorU8::from_rgba(rgba[0], rgba[1], rgba[2], rgba[3]).premultiply();
        for y in rect.y0..rect.y1 {
            for x in rect.x0..rect.x1 {
                p.pixels_mut()[(y as u32 * width + x as u32) as usize] = px;
            }
        }
        p
    }

    pub fn pixel(p: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let px = p.pixels()[(y * p.width() + x) as usize];
        (px.red(), px.green(), px.blue(), px.alpha())
    }
}
