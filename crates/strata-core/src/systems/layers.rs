//! # Layers System
//!
//! The drawing context of one render pass.
//!
//! ## Responsibilities
//! - **Layer Isolation**: `push_layer` redirects drawing into a transparent
//!   canvas-sized buffer; `pop_layer` realizes the scope's group effects
//!   (filter, clip-path, mask, opacity) and composites the result onto the
//!   layer beneath.
//! - **State Frames**: closure-scoped push/pop around the [`StateStack`].
//! - **Viewports**: the stack of extents percentages resolve against.
//! - **Bookkeeping**: cycle guard, recursion depth and [`RenderStats`].
//!
//! Every push has its pop on every exit path: `with_frame`, `with_layer`
//! and `with_viewport` release before propagating the body's error.

use std::collections::HashSet;
use std::rc::Rc;

use tiny_skia::{
    FillRule, Mask, MaskType, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};
use tracing::{debug, warn};

use crate::defs::Defs;
use crate::document::RenderOptions;
use crate::errors::RenderError;
use crate::filters::{self, FilterInvocation};
use crate::node::{NodeKind, ShapeNode};
use crate::scene::SceneGraph;
use crate::state::{ClipRegion, InheritMode, State, StateStack};
use crate::systems::renderer;
use crate::transform::Affine;
use crate::types::{NodeId, Rect};
use crate::units::UnitContext;
use crate::AssetLoader;

/// Counters collected over one render pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Offscreen layers allocated, the base layer excluded.
    pub layers_allocated: usize,
    /// Deepest layer stack reached, the base layer included.
    pub max_layer_depth: usize,
    /// Deepest state stack reached.
    pub max_state_depth: usize,
    /// Nodes visited by the traversal.
    pub nodes_drawn: usize,
}

struct Layer {
    pixmap: Pixmap,
    /// Device-space bounds of everything drawn into the layer.
    bbox: Option<Rect>,
}

pub struct DrawingCtx<'a> {
    pub(crate) scene: &'a SceneGraph,
    pub(crate) defs: &'a Defs,
    pub(crate) states: StateStack,
    layers: Vec<Layer>,
    viewports: Vec<(f64, f64)>,
    options: &'a RenderOptions,
    loader: &'a dyn AssetLoader,
    acquired: HashSet<NodeId>,
    depth: usize,
    stats: RenderStats,
}

impl<'a> DrawingCtx<'a> {
    /// Starts a pass over `target`. The base layer holds a copy of the
    /// target's pixels and is written back by [`DrawingCtx::finish`].
    pub fn new(
        scene: &'a SceneGraph,
        defs: &'a Defs,
        target: &Pixmap,
        options: &'a RenderOptions,
        loader: &'a dyn AssetLoader,
    ) -> Self {
        Self {
            scene,
            defs,
            states: StateStack::new(State::default()),
            layers: vec![Layer {
                pixmap: target.clone(),
                bbox: None,
            }],
            viewports: vec![(target.width() as f64, target.height() as f64)],
            options,
            loader,
            acquired: HashSet::new(),
            depth: 0,
            stats: RenderStats {
                max_layer_depth: 1,
                max_state_depth: 1,
                ..RenderStats::default()
            },
        }
    }

    /// Copies the base layer into `target` and returns the pass counters.
    pub fn finish(mut self, target: &mut Pixmap) -> RenderStats {
        debug_assert_eq!(self.layers.len(), 1, "unbalanced layer stack");
        debug_assert_eq!(self.states.depth(), 1, "unbalanced state stack");
        if let Some(base) = self.layers.drain(..).next() {
            target.data_mut().copy_from_slice(base.pixmap.data());
        }
        self.stats
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn layer_depth(&self) -> usize {
        self.layers.len()
    }

    pub fn state_depth(&self) -> usize {
        self.states.depth()
    }

    pub fn width(&self) -> u32 {
        self.base().pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.base().pixmap.height()
    }

    fn base(&self) -> &Layer {
        &self.layers[0]
    }

    fn top_layer(&mut self) -> &mut Layer {
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    // --- Traversal ---

    /// Enters one level of nesting; beyond `max_depth` is a hard error.
    pub(crate) fn enter(&mut self) -> Result<(), RenderError> {
        if self.depth >= self.options.max_depth {
            return Err(RenderError::RecursionLimit(self.options.max_depth));
        }
        self.depth += 1;
        self.stats.nodes_drawn += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Marks `node` as being drawn. Returns `false` if it already is.
    pub(crate) fn acquire(&mut self, node: NodeId) -> bool {
        self.acquired.insert(node)
    }

    pub(crate) fn release(&mut self, node: NodeId) {
        self.acquired.remove(&node);
    }

    // --- Scoped Stacks ---

    /// Runs `f` inside a pushed state frame.
    pub fn with_frame<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, RenderError>,
    ) -> Result<R, RenderError> {
        self.states.push();
        self.stats.max_state_depth = self.stats.max_state_depth.max(self.states.depth());
        let result = f(self);
        self.states.pop();
        result
    }

    /// Runs `f` with drawing redirected into a fresh layer, then pops it.
    pub fn with_layer<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, RenderError>,
    ) -> Result<R, RenderError> {
        self.push_layer()?;
        let result = f(self);
        let popped = self.pop_layer();
        let value = result?;
        popped?;
        Ok(value)
    }

    /// Runs `f` with percentages resolving against `size`.
    pub fn with_viewport<R>(
        &mut self,
        size: (f64, f64),
        f: impl FnOnce(&mut Self) -> Result<R, RenderError>,
    ) -> Result<R, RenderError> {
        self.viewports.push(size);
        let result = f(self);
        self.viewports.pop();
        result
    }

    pub fn unit_context(&self) -> UnitContext {
        let (width, height) = self
            .viewports
            .last()
            .copied()
            .unwrap_or((self.width() as f64, self.height() as f64));
        UnitContext {
            dpi_x: self.options.dpi_x,
            dpi_y: self.options.dpi_y,
            viewport_width: width,
            viewport_height: height,
        }
    }

    // --- Layers ---

    /// Allocates a transparent layer and makes it the drawing target.
    pub fn push_layer(&mut self) -> Result<(), RenderError> {
        let (width, height) = (self.width(), self.height());
        let pixmap = Pixmap::new(width, height)
            .ok_or(RenderError::LayerAllocation { width, height })?;
        self.layers.push(Layer { pixmap, bbox: None });
        self.stats.layers_allocated += 1;
        self.stats.max_layer_depth = self.stats.max_layer_depth.max(self.layers.len());
        debug!(depth = self.layers.len(), "push layer");
        Ok(())
    }

    /// Applies the top state's group effects to the top layer and
    /// composites it onto the layer beneath.
    ///
    /// # Panics
    /// Popping the base layer is a traversal bug and panics.
    pub fn pop_layer(&mut self) -> Result<(), RenderError> {
        let mut layer = match self.layers.pop() {
            Some(layer) if !self.layers.is_empty() => layer,
            _ => panic!("layer stack underflow"),
        };
        debug!(depth = self.layers.len() + 1, "pop layer");
        let state = self.states.top().clone();
        if layer.bbox.is_none() && !state.has_group_effects() {
            return Ok(());
        }
        let user_bbox = layer.bbox.and_then(|b| to_user_space(&state.affine, &b));

        if let Some(filter) = &state.filter {
            let invocation = FilterInvocation {
                source: &layer.pixmap,
                background: &self.top_layer_ref().pixmap,
                bbox: user_bbox,
                affine: state.affine,
                units: self.unit_context(),
                color_interpolation: state.color_interpolation_filters,
                loader: self.loader,
            };
            layer.pixmap = filters::render(filter, &invocation)?;
            layer.bbox = coverage_bounds(&layer.pixmap);
        }

        if let Some(clip_id) = state.clip_path {
            match self.clip_coverage(clip_id, &state.affine, user_bbox.as_ref())? {
                Some(mask) => layer.pixmap.apply_mask(&mask),
                None => layer.pixmap.fill(tiny_skia::Color::TRANSPARENT),
            }
        }

        if let Some(mask_id) = state.mask {
            match self.mask_coverage(mask_id, &state, user_bbox.as_ref())? {
                Some(mask) => layer.pixmap.apply_mask(&mask),
                None => layer.pixmap.fill(tiny_skia::Color::TRANSPARENT),
            }
        }

        let paint = PixmapPaint {
            opacity: state.opacity.clamp(0.0, 1.0),
            ..PixmapPaint::default()
        };
        let clip = state.clip.as_ref().map(ClipRegion::mask);
        let parent = self.top_layer();
        parent
            .pixmap
            .draw_pixmap(0, 0, layer.pixmap.as_ref(), &paint, Transform::identity(), clip);
        parent.bbox = union_bbox(parent.bbox, layer.bbox);
        Ok(())
    }

    fn top_layer_ref(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    /// Pops the top layer without compositing it.
    fn take_layer(&mut self) -> Pixmap {
        match self.layers.pop() {
            Some(layer) if !self.layers.is_empty() => layer.pixmap,
            _ => panic!("layer stack underflow"),
        }
    }

    // --- Clipping ---

    /// Narrows the top frame's clip region to `rect` in current user space.
    pub fn clip_to_rect(&mut self, rect: &Rect) {
        let (width, height) = (self.width(), self.height());
        let transform = self.states.top().affine.to_tiny_skia();
        let path = rect.to_tiny_skia().map(PathBuilder::from_rect);
        let top = self.states.top_mut();
        let Some(path) = path else {
            // Nothing can be drawn inside an empty box.
            top.clip = Mask::new(width, height).map(|m| ClipRegion(Rc::new(m)));
            return;
        };
        let mask = match &top.clip {
            Some(existing) => {
                let mut mask = existing.mask().clone();
                mask.intersect_path(&path, FillRule::Winding, true, transform);
                Some(mask)
            }
            None => Mask::new(width, height).map(|mut mask| {
                mask.fill_path(&path, FillRule::Winding, true, transform);
                mask
            }),
        };
        if let Some(mask) = mask {
            top.clip = Some(ClipRegion(Rc::new(mask)));
        }
    }

    /// Coverage of a clip path for a layer with the given transform and
    /// user-space bounding box. `None` means nothing survives.
    fn clip_coverage(
        &self,
        clip_id: NodeId,
        affine: &Affine,
        bbox: Option<&Rect>,
    ) -> Result<Option<Mask>, RenderError> {
        let scene = self.scene;
        let Some(NodeKind::ClipPath(clip)) = scene.get_node(clip_id).map(|n| &n.kind) else {
            return Ok(None);
        };
        let Some(content) = clip.content_transform(affine, bbox) else {
            debug!(clip_id, "clip path needs a bounding box, clipping everything");
            return Ok(None);
        };
        let (width, height) = (self.width(), self.height());
        let mut coverage =
            Pixmap::new(width, height).ok_or(RenderError::LayerAllocation { width, height })?;
        let units = self.unit_context();
        renderer::fill_clip_children(scene, self.defs, clip_id, &content, &units, &mut coverage);
        Ok(Some(Mask::from_pixmap(coverage.as_ref(), MaskType::Alpha)))
    }

    /// Luminance coverage of a mask limited to its region.
    fn mask_coverage(
        &mut self,
        mask_id: NodeId,
        state: &State,
        bbox: Option<&Rect>,
    ) -> Result<Option<Mask>, RenderError> {
        let scene = self.scene;
        let Some(node) = scene.get_node(mask_id) else {
            return Ok(None);
        };
        let NodeKind::Mask(mask) = &node.kind else {
            return Ok(None);
        };
        let units = self.unit_context();
        let (Some(region), Some(content)) = (
            mask.region(&units, bbox),
            mask.content_transform(&state.affine, bbox),
        ) else {
            debug!(mask_id, "mask needs a bounding box, masking everything");
            return Ok(None);
        };
        if !self.acquire(mask_id) {
            warn!(mask_id, "mask references itself");
            return Ok(None);
        }

        let drawn = self.push_layer().and_then(|()| {
            let result = self.with_frame(|ctx| {
                *ctx.states.top_mut() = State {
                    affine: content,
                    ..State::default()
                };
                ctx.states.reinherit_top(&node.state, InheritMode::Dominate);
                renderer::draw_children(ctx, mask_id)
            });
            let pixmap = self.take_layer();
            result.map(|()| pixmap)
        });
        self.release(mask_id);
        let content = drawn?;

        let mut coverage = Mask::from_pixmap(content.as_ref(), MaskType::Luminance);
        match region.to_tiny_skia().map(PathBuilder::from_rect) {
            Some(path) => coverage.intersect_path(
                &path,
                FillRule::Winding,
                true,
                state.affine.to_tiny_skia(),
            ),
            None => return Ok(None),
        }
        Ok(Some(coverage))
    }

    // --- Shapes ---

    /// Fills and strokes `shape` into the top layer with the top state's
    /// paint, transform and clip region.
    pub fn draw_shape(&mut self, shape: &ShapeNode) -> Result<(), RenderError> {
        let units = self.unit_context();
        let Some(path) = shape.to_path(&units) else {
            debug!("degenerate shape skipped");
            return Ok(());
        };
        let state = self.states.top();
        let transform = state.affine.to_tiny_skia();
        let clip = state.clip.as_ref().map(ClipRegion::mask);
        let last = self.layers.len() - 1;
        let layer = &mut self.layers[last];

        let mut drawn = false;
        let mut outset = 0.0;
        if let Some(color) = state.paint.fill_color() {
            let mut paint = Paint::default();
            paint.set_color(color.to_tiny_skia());
            paint.anti_alias = true;
            layer.pixmap.fill_path(
                &path,
                &paint,
                state.paint.fill_rule().to_tiny_skia(),
                transform,
                clip,
            );
            drawn = true;
        }
        if let Some(color) = state.paint.stroke_color() {
            let width = units.other(&state.paint.stroke_width());
            if width > 0.0 {
                let mut paint = Paint::default();
                paint.set_color(color.to_tiny_skia());
                paint.anti_alias = true;
                let stroke = Stroke {
                    width: width as f32,
                    ..Stroke::default()
                };
                layer.pixmap.stroke_path(&path, &paint, &stroke, transform, clip);
                drawn = true;
                outset = width / 2.0;
            }
        }

        if drawn {
            let b = path.bounds();
            let user = Rect::from_ltrb(
                b.left() as f64 - outset,
                b.top() as f64 - outset,
                b.right() as f64 + outset,
                b.bottom() as f64 + outset,
            );
            let device = state.affine.transform_rect_bounds(&user);
            layer.bbox = union_bbox(layer.bbox, Some(device));
        }
        Ok(())
    }
}

fn union_bbox(a: Option<Rect>, b: Option<Rect>) -> Option<Rect> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.union(&b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn to_user_space(affine: &Affine, device: &Rect) -> Option<Rect> {
    affine.invert().map(|inv| inv.transform_rect_bounds(device))
}

/// Bounds of the non-transparent pixels of `pixmap`.
fn coverage_bounds(pixmap: &Pixmap) -> Option<Rect> {
    let width = pixmap.width() as usize;
    let (mut x0, mut y0, mut x1, mut y1) = (usize::MAX, usize::MAX, 0, 0);
    for (idx, px) in pixmap.pixels().iter().enumerate() {
        if px.alpha() > 0 {
            let (x, y) = (idx % width, idx / width);
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x + 1);
            y1 = y1.max(y + 1);
        }
    }
    (x0 < x1).then(|| Rect::from_ltrb(x0 as f64, y0 as f64, x1 as f64, y1 as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultAssetLoader;

    fn with_ctx(f: impl FnOnce(&mut DrawingCtx<'_>)) {
        let scene = SceneGraph::new();
        let defs = Defs::new();
        let target = Pixmap::new(8, 8).expect("pixmap");
        let options = RenderOptions::default();
        let mut ctx = DrawingCtx::new(&scene, &defs, &target, &options, &DefaultAssetLoader);
        f(&mut ctx);
    }

    #[test]
    fn with_layer_pops_on_error() {
        with_ctx(|ctx| {
            let result: Result<(), RenderError> = ctx.with_layer(|ctx| {
                ctx.with_frame(|_| Err(RenderError::InvalidTarget("boom".into())))
            });
            assert!(result.is_err());
            assert_eq!(ctx.layer_depth(), 1);
            assert_eq!(ctx.states.depth(), 1);
        });
    }

    #[test]
    fn opacity_attenuates_composite() {
        with_ctx(|ctx| {
            ctx.with_frame(|ctx| {
                ctx.states.top_mut().opacity = 0.5;
                ctx.states.top_mut().paint.fill =
                    Some(crate::state::Paint::Color(crate::types::Color::WHITE));
                ctx.with_layer(|ctx| {
                    ctx.draw_shape(&ShapeNode::new(crate::node::ShapeGeometry::Rect {
                        x: crate::units::Length::ZERO,
                        y: crate::units::Length::ZERO,
                        width: crate::units::Length::px(8.0),
                        height: crate::units::Length::px(8.0),
                        rx: None,
                        ry: None,
                    }))
                })
            })
            .expect("draw");
            let base = &ctx.base().pixmap;
            let alpha = base.pixels()[0].alpha();
            assert!((126..=129).contains(&alpha), "alpha {alpha}");
            assert_eq!(ctx.stats().layers_allocated, 1);
        });
    }

    #[test]
    fn clip_rect_limits_drawing() {
        with_ctx(|ctx| {
            ctx.with_frame(|ctx| {
                ctx.clip_to_rect(&Rect::new(0.0, 0.0, 4.0, 8.0));
                ctx.draw_shape(&ShapeNode::new(crate::node::ShapeGeometry::Rect {
                    x: crate::units::Length::ZERO,
                    y: crate::units::Length::ZERO,
                    width: crate::units::Length::px(8.0),
                    height: crate::units::Length::px(8.0),
                    rx: None,
                    ry: None,
                }))
            })
            .expect("draw");
            let base = &ctx.base().pixmap;
            assert_eq!(base.pixel(1, 1).map(|p| p.alpha()), Some(255));
            assert_eq!(base.pixel(6, 1).map(|p| p.alpha()), Some(0));
        });
    }

    #[test]
    fn coverage_bounds_finds_opaque_pixels() {
        let mut p = Pixmap::new(5, 5).expect("pixmap");
        p.pixels_mut()[2 * 5 + 3] = tiny_skia::PremultipliedColorU8::from_rgba(0, 0, 0, 255)
            .expect("valid");
        assert_eq!(coverage_bounds(&p), Some(Rect::new(3.0, 2.0, 1.0, 1.0)));
        assert_eq!(coverage_bounds(&Pixmap::new(2, 2).expect("pixmap")), None);
    }

    #[test]
    fn recursion_limit_is_an_error() {
        with_ctx(|ctx| {
            let max = ctx.options.max_depth;
            for _ in 0..max {
                ctx.enter().expect("within limit");
            }
            assert!(matches!(ctx.enter(), Err(RenderError::RecursionLimit(_))));
        });
    }
}
