//! # Document Module
//!
//! A built document and the render entry point.
//!
//! ## Responsibilities
//! - **Document**: owns the scene arena, the definition registry and the root.
//! - **RenderOptions**: serde-loadable render configuration.
//! - **Rendering**: one traversal from the root into a caller-provided pixmap.

use serde::Deserialize;
use tiny_skia::Pixmap;
use tracing::{debug, info, instrument};

use crate::defs::Defs;
use crate::errors::RenderError;
use crate::node::NodeKind;
use crate::scene::SceneGraph;
use crate::state::InheritMode;
use crate::style::PresentationStyles;
use crate::systems::{draw_node, DrawingCtx, RenderStats};
use crate::types::{Color, NodeId};
use crate::units::UnitContext;
use crate::{AssetLoader, DefaultAssetLoader};

/// Render configuration.
///
/// Every field has a default, so a config file only needs the values it
/// changes:
///
/// ```json
/// { "dpi_x": 96, "dpi_y": 96, "languages": ["en-US"] }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Resolution used for absolute units (`in`, `cm`, `pt`, ...).
    pub dpi_x: f64,
    pub dpi_y: f64,
    /// Fill applied to the target before drawing.
    pub background: Option<Color>,
    /// User languages matched against `systemLanguage`.
    pub languages: Vec<String>,
    /// Maximum nesting of the traversal before it aborts.
    pub max_depth: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi_x: 90.0,
            dpi_y: 90.0,
            background: None,
            languages: vec!["en".to_string()],
            max_depth: 256,
        }
    }
}

impl RenderOptions {
    /// Style resolver configured with these options.
    pub fn styles(&self) -> PresentationStyles {
        PresentationStyles::new(self.languages.clone())
    }

    fn validate(&self) -> Result<(), RenderError> {
        let valid = |dpi: f64| dpi.is_finite() && dpi > 0.0;
        if !valid(self.dpi_x) || !valid(self.dpi_y) {
            return Err(RenderError::InvalidTarget(format!(
                "dpi must be positive, got {}x{}",
                self.dpi_x, self.dpi_y
            )));
        }
        if self.max_depth == 0 {
            return Err(RenderError::InvalidTarget("max_depth must be at least 1".into()));
        }
        Ok(())
    }
}

/// A fully built, finalized document.
#[derive(Debug)]
pub struct Document {
    pub scene: SceneGraph,
    pub defs: Defs,
    pub root: NodeId,
}

impl Document {
    /// Size of the outermost viewport in pixels. Percentages resolve
    /// against the viewBox, or 100x100 without one.
    pub fn intrinsic_size(&self, options: &RenderOptions) -> Option<(u32, u32)> {
        let NodeKind::DocumentRoot(viewport) = &self.scene.get_node(self.root)?.kind else {
            return None;
        };
        let (fallback_w, fallback_h) = viewport
            .view_box
            .map(|vb| (vb.width, vb.height))
            .unwrap_or((100.0, 100.0));
        let units = UnitContext {
            dpi_x: options.dpi_x,
            dpi_y: options.dpi_y,
            viewport_width: fallback_w,
            viewport_height: fallback_h,
        };
        let width = units.horizontal(&viewport.width);
        let height = units.vertical(&viewport.height);
        let usable = |v: f64| v.is_finite() && v >= 1.0 && v <= u32::MAX as f64;
        (usable(width) && usable(height)).then(|| (width.ceil() as u32, height.ceil() as u32))
    }

    /// Renders into `target`, loading images from the filesystem.
    pub fn render(
        &self,
        target: &mut Pixmap,
        options: &RenderOptions,
    ) -> Result<RenderStats, RenderError> {
        self.render_with_loader(target, options, &DefaultAssetLoader)
    }

    /// Renders into `target`. The target is only written when the whole
    /// pass succeeds.
    #[instrument(
        level = "info",
        skip_all,
        fields(width = target.width(), height = target.height(), nodes = self.scene.len())
    )]
    pub fn render_with_loader(
        &self,
        target: &mut Pixmap,
        options: &RenderOptions,
        loader: &dyn AssetLoader,
    ) -> Result<RenderStats, RenderError> {
        options.validate()?;
        if let Some(background) = options.background {
            target.fill(background.to_tiny_skia());
        }

        let mut ctx = DrawingCtx::new(&self.scene, &self.defs, target, options, loader);
        ctx.with_frame(|ctx| draw_node(ctx, self.root, InheritMode::Normal))?;
        let stats = ctx.finish(target);
        debug!(?stats, "render pass finished");
        info!(
            layers = stats.layers_allocated,
            nodes = stats.nodes_drawn,
            "rendered"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_deserialize_with_defaults() {
        let options: RenderOptions =
            serde_json::from_str(r#"{ "dpi_x": 72, "languages": ["de"] }"#).expect("valid json");
        assert_eq!(options.dpi_x, 72.0);
        assert_eq!(options.dpi_y, 90.0);
        assert_eq!(options.languages, vec!["de".to_string()]);
        assert_eq!(options.max_depth, 256);
    }

    #[test]
    fn invalid_dpi_is_rejected() {
        let options = RenderOptions {
            dpi_x: 0.0,
            ..RenderOptions::default()
        };
        assert!(matches!(options.validate(), Err(RenderError::InvalidTarget(_))));
    }
}
