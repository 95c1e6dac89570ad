//! # Renderer System
//!
//! Recursive traversal of the drawable tree.
//!
//! ## Responsibilities
//! - **Traversal**: `draw_node` merges a node's declared state into the
//!   top frame, isolates it in a layer and runs the variant body.
//! - **Indirection**: `use` offsets, template viewports and the cycle guard.
//! - **Clip Content**: rasterizes clip-path children into a coverage buffer.
//!
//! ## Key Functions
//! - `draw_node`: Draws one node and its subtree.
//! - `draw_children`: Draws every child in its own state frame.

use tiny_skia::{Paint, Pixmap};
use tracing::{debug, warn};

use crate::defs::Defs;
use crate::errors::RenderError;
use crate::node::{NodeKind, UseNode, Viewport};
use crate::scene::{DrawableNode, SceneGraph};
use crate::state::{InheritMode, PaintProps};
use crate::systems::layers::DrawingCtx;
use crate::transform::Affine;
use crate::types::{NodeId, Rect};
use crate::units::UnitContext;

/// Draws `node_id` with the state already pushed by the caller.
///
/// Unknown ids and unresolved references draw nothing. Nesting beyond
/// `RenderOptions::max_depth` is a [`RenderError::RecursionLimit`].
pub fn draw_node(
    ctx: &mut DrawingCtx<'_>,
    node_id: NodeId,
    mode: InheritMode,
) -> Result<(), RenderError> {
    let scene = ctx.scene;
    let Some(node) = scene.get_node(node_id) else {
        warn!(node_id, "draw requested for an unknown node");
        return Ok(());
    };
    ctx.enter()?;
    let result = draw_body(ctx, node_id, node, mode);
    ctx.leave();
    result
}

fn draw_body(
    ctx: &mut DrawingCtx<'_>,
    node_id: NodeId,
    node: &DrawableNode,
    mode: InheritMode,
) -> Result<(), RenderError> {
    ctx.states.reinherit_top(&node.state, mode);

    match &node.kind {
        NodeKind::Shape(shape) => {
            if ctx.states.top().has_group_effects() {
                ctx.with_layer(|ctx| ctx.draw_shape(shape))
            } else {
                ctx.draw_shape(shape)
            }
        }
        NodeKind::Group => ctx.with_layer(|ctx| draw_children(ctx, node_id)),
        NodeKind::Conditional => ctx.with_layer(|ctx| draw_conditional(ctx, node)),
        NodeKind::DocumentRoot(viewport) => {
            let outermost = node.parent.is_none();
            ctx.with_layer(|ctx| draw_viewport(ctx, node_id, viewport, outermost))
        }
        NodeKind::Template(viewport) => {
            if mode != InheritMode::Dominate {
                debug!(node_id, "template skipped outside an indirection");
                return Ok(());
            }
            ctx.with_layer(|ctx| draw_template(ctx, node_id, viewport))
        }
        NodeKind::Use(use_node) => draw_use(ctx, use_node),
        NodeKind::ClipPath(_) | NodeKind::Mask(_) => {
            debug!(node_id, kind = node.kind.name(), "definition-only node not drawn");
            Ok(())
        }
    }
}

/// Draws each child of `node_id` in its own frame.
pub(crate) fn draw_children(ctx: &mut DrawingCtx<'_>, node_id: NodeId) -> Result<(), RenderError> {
    let scene = ctx.scene;
    let Some(node) = scene.get_node(node_id) else {
        return Ok(());
    };
    for &child in &node.children {
        ctx.with_frame(|ctx| draw_node(ctx, child, InheritMode::Normal))?;
    }
    Ok(())
}

fn draw_conditional(ctx: &mut DrawingCtx<'_>, node: &DrawableNode) -> Result<(), RenderError> {
    let scene = ctx.scene;
    let chosen = node
        .children
        .iter()
        .copied()
        .find(|&child| scene.get_node(child).is_some_and(|c| c.state.cond_true));
    match chosen {
        Some(child) => ctx.with_frame(|ctx| draw_node(ctx, child, InheritMode::Normal)),
        None => {
            debug!("no switch child qualifies");
            Ok(())
        }
    }
}

fn draw_viewport(
    ctx: &mut DrawingCtx<'_>,
    node_id: NodeId,
    viewport: &Viewport,
    outermost: bool,
) -> Result<(), RenderError> {
    let rect = viewport.rect(&ctx.unit_context());
    if !(rect.width > 0.0 && rect.height > 0.0) {
        debug!(node_id, "empty viewport skipped");
        return Ok(());
    }
    let overflow = ctx.states.top().overflow.unwrap_or(outermost);
    // The node's own frame stays in the parent's user space for pop_layer.
    ctx.with_frame(|ctx| {
        if !overflow {
            ctx.clip_to_rect(&rect);
        }
        let top = ctx.states.top_mut();
        top.affine = Affine::multiply(&viewport.content_transform(&rect), &top.affine);
        let size = viewport.content_size(&rect);
        ctx.with_viewport(size, |ctx| draw_children(ctx, node_id))
    })
}

/// Template body. The enclosing indirection already composed the viewport
/// mapping, so only clipping and percentages remain.
fn draw_template(
    ctx: &mut DrawingCtx<'_>,
    node_id: NodeId,
    viewport: &Viewport,
) -> Result<(), RenderError> {
    match viewport.view_box {
        Some(vb) => ctx.with_frame(|ctx| {
            if !ctx.states.top().overflow.unwrap_or(false) {
                ctx.clip_to_rect(&vb);
            }
            ctx.with_viewport((vb.width, vb.height), |ctx| draw_children(ctx, node_id))
        }),
        None => draw_children(ctx, node_id),
    }
}

/// An empty indirection (zero-sized, absent target or cycle) still pushes
/// and pops its layer, like an empty group, so its own filter applies.
fn draw_use(ctx: &mut DrawingCtx<'_>, use_node: &UseNode) -> Result<(), RenderError> {
    ctx.with_layer(|ctx| {
        if use_node.is_zero_sized() {
            debug!(href = %use_node.href, "zero-sized use skipped");
            return Ok(());
        }
        let Some(target) = use_node.target(ctx.defs) else {
            debug!(href = %use_node.href, "use target absent");
            return Ok(());
        };
        if !ctx.acquire(target) {
            warn!(href = %use_node.href, "reference cycle through use, drawing nothing");
            return Ok(());
        }

        let offset = use_offset(ctx, use_node, target);
        let result = ctx.with_frame(|ctx| {
            let top = ctx.states.top_mut();
            top.affine = Affine::multiply(&offset, &top.affine);
            draw_node(ctx, target, InheritMode::Dominate)
        });
        ctx.release(target);
        result
    })
}

/// Transform from the target's coordinates into the `use` element's user
/// space.
fn use_offset(ctx: &DrawingCtx<'_>, use_node: &UseNode, target: NodeId) -> Affine {
    let units = ctx.unit_context();
    let x = units.horizontal(&use_node.x);
    let y = units.vertical(&use_node.y);
    match ctx.scene.get_node(target).map(|n| &n.kind) {
        Some(NodeKind::Template(viewport)) if viewport.view_box.is_some() => {
            let width = use_node
                .width
                .map(|w| units.horizontal(&w))
                .unwrap_or(units.viewport_width);
            let height = use_node
                .height
                .map(|h| units.vertical(&h))
                .unwrap_or(units.viewport_height);
            viewport.content_transform(&Rect::new(x, y, width, height))
        }
        _ => Affine::translate(x, y),
    }
}

/// Fills the geometry of a clip path's children into `coverage`.
///
/// `content` maps clip content to device space. Children contribute their
/// own transforms; `use` children contribute their target shape.
pub(crate) fn fill_clip_children(
    scene: &SceneGraph,
    defs: &Defs,
    clip_id: NodeId,
    content: &Affine,
    units: &UnitContext,
    coverage: &mut Pixmap,
) {
    let Some(clip) = scene.get_node(clip_id) else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color(tiny_skia::Color::BLACK);
    paint.anti_alias = true;

    for &child in &clip.children {
        let Some(node) = scene.get_node(child) else {
            continue;
        };
        let affine = Affine::multiply(&node.state.affine, content);
        let (shape_node, affine, paint_props) = match &node.kind {
            NodeKind::Shape(shape) => (shape, affine, node.state.paint),
            NodeKind::Use(use_node) => {
                let Some(target) = use_node.target(defs).and_then(|t| scene.get_node(t)) else {
                    continue;
                };
                let NodeKind::Shape(shape) = &target.kind else {
                    debug!(clip_id, "clip path use must reference a shape");
                    continue;
                };
                let offset = Affine::translate(units.horizontal(&use_node.x), units.vertical(&use_node.y));
                let affine = Affine::multiply(&target.state.affine, &Affine::multiply(&offset, &affine));
                (shape, affine, target.state.paint.inherit_from(&node.state.paint))
            }
            other => {
                debug!(clip_id, kind = other.name(), "ignored inside clip path");
                continue;
            }
        };
        if !node.state.cond_true {
            continue;
        }
        let Some(path) = shape_node.to_path(units) else {
            continue;
        };
        coverage.fill_path(
            &path,
            &paint,
            clip_rule(&paint_props),
            affine.to_tiny_skia(),
            None,
        );
    }
}

fn clip_rule(props: &PaintProps) -> tiny_skia::FillRule {
    props.fill_rule().to_tiny_skia()
}
