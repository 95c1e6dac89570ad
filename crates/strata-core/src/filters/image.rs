use tiny_skia::{FilterQuality, Pixmap, PixmapPaint};
use tracing::warn;

use crate::errors::FilterError;
use crate::filters::surface::new_surface;
use crate::filters::{FilterContext, FilterOutput, RenderTarget};
use crate::style::PropertyBag;
use crate::systems::assets::load_pixmap;
use crate::transform::{viewport_map, Affine, AspectRatio};
use crate::types::Rect;

/// `feImage` referencing an external raster. Fragment references to
/// elements are not rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePrimitive {
    pub href: Option<String>,
    pub aspect: AspectRatio,
}

impl ImagePrimitive {
    pub fn from_properties(props: &PropertyBag) -> Self {
        let aspect = match props.get("preserveAspectRatio") {
            None => AspectRatio::default(),
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = raw, "invalid preserveAspectRatio on feImage");
                AspectRatio::default()
            }),
        };
        Self {
            href: props.href().map(str::to_string),
            aspect,
        }
    }

    pub fn render(
        &self,
        _inputs: &[FilterOutput],
        target: &RenderTarget,
        ctx: &FilterContext<'_>,
    ) -> Result<Pixmap, FilterError> {
        let mut out = new_surface(ctx.width, ctx.height)?;
        let href = match self.href.as_deref() {
            Some(href) if !href.starts_with('#') => href,
            Some(href) => {
                warn!(href, "feImage element references are not supported");
                return Ok(out);
            }
            None => return Ok(out),
        };
        let image = match load_pixmap(ctx.loader, href) {
            Ok(image) => image,
            Err(e) => {
                warn!(href, error = %e, "feImage source could not be loaded");
                return Ok(out);
            }
        };

        let source = Rect::new(0.0, 0.0, image.width() as f64, image.height() as f64);
        let placement = viewport_map(&source, &target.rect, self.aspect);
        let transform = Affine::multiply(&placement, &ctx.paffine);
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        out.draw_pixmap(0, 0, image.as_ref(), &paint, transform.to_tiny_skia(), None);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::{context, target};

    #[test]
    fn missing_file_is_transparent() {
        let ctx = context(4, 4);
        let image = ImagePrimitive {
            href: Some("does/not/exist.png".into()),
            aspect: AspectRatio::default(),
        };
        let out = image.render(&[], &target(&ctx), &ctx).expect("render");
        assert!(out.pixels().iter().all(|p| p.alpha() == 0));
    }

    #[test]
    fn reads_xlink_href() {
        let props: PropertyBag = [("xlink:href", "tile.png"), ("preserveAspectRatio", "none")]
            .into_iter()
            .collect();
        let image = ImagePrimitive::from_properties(&props);
        assert_eq!(image.href.as_deref(), Some("tile.png"));
        assert_eq!(image.aspect.align, crate::transform::Align::None);
    }
}
