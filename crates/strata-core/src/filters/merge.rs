use tiny_skia::{BlendMode, Pixmap, PixmapPaint, Transform};

use crate::errors::FilterError;
use crate::filters::surface::new_surface;
use crate::filters::{parse, FilterContext, FilterOutput, Input, RenderTarget};
use crate::style::PropertyBag;

/// `feMerge`: source-over composite of its `feMergeNode` inputs, first
/// at the bottom.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Merge {
    pub nodes: Vec<Option<Input>>,
}

impl Merge {
    /// Adds the input of an `feMergeNode` child.
    pub fn push_node(&mut self, props: &PropertyBag) {
        self.nodes.push(parse::input(props, "in"));
    }

    pub fn render(
        &self,
        inputs: &[FilterOutput],
        _target: &RenderTarget,
        ctx: &FilterContext<'_>,
    ) -> Result<Pixmap, FilterError> {
        let mut out = new_surface(ctx.width, ctx.height)?;
        let paint = PixmapPaint {
            blend_mode: BlendMode::SourceOver,
            ..PixmapPaint::default()
        };
        for input in inputs {
            out.draw_pixmap(0, 0, Pixmap::as_ref(&input.surface), &paint, Transform::identity(), None);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::{context, filled, output, pixel, target};
    use crate::types::IntRect;

    #[test]
    fn later_nodes_draw_on_top() {
        let ctx = context(4, 1);
        let red = output(filled(4, 1, IntRect::new(0, 0, 3, 1), [255, 0, 0, 255]));
        let blue = output(filled(4, 1, IntRect::new(1, 0, 2, 1), [0, 0, 255, 255]));
        let merge = Merge {
            nodes: vec![None, None],
        };
        let out = merge.render(&[red, blue], &target(&ctx), &ctx).expect("render");
        assert_eq!(pixel(&out, 0, 0), (255, 0, 0, 255));
        assert_eq!(pixel(&out, 1, 0), (0, 0, 255, 255));
        assert_eq!(pixel(&out, 3, 0).3, 0);
    }
}
