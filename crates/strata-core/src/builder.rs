//! # Builder Module
//!
//! Turns a stream of start/end element events into a [`Document`].
//!
//! ## Responsibilities
//! - **Nodes**: creates a drawable node per supported element and links it
//!   under the innermost open container. `defs`, `symbol`, `clipPath` and
//!   `mask` are detached: they keep their parent back-reference but are not
//!   reachable by the ordinary walk.
//! - **Definitions**: registers ids and queues `use`, `filter`, `clip-path`
//!   and `mask` references with the registry.
//! - **Filters**: collects `filter` elements, their primitives and the
//!   primitives' own children (`feMergeNode`, `feFunc*`, light sources).
//!
//! Attribute values that fail to parse are logged and ignored. A `use`
//! without `href`, or a negative size on `use`, `rect` or a nested `svg`,
//! drops that element and its subtree. The outermost `svg` is kept with the
//! offending axis collapsed to zero, so it draws nothing.

use std::rc::Rc;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::defs::{Definition, Defs, LinkSlot};
use crate::document::Document;
use crate::errors::BuildError;
use crate::filters::{
    Blend, Channel, ColorMatrix, Composite, ComponentTransfer, ConvolveMatrix, DisplacementMap,
    FilterDefinition, FilterPrimitive, Flood, GaussianBlur, ImagePrimitive, LightSource, Lighting,
    Merge, Morphology, Offset, PrimitiveKind, Tile, TransferFunction, Turbulence,
};
use crate::node::{
    ClipPathNode, MaskNode, NodeKind, ShapeGeometry, ShapeNode, UseNode, Viewport,
};
use crate::node::shape_node::{parse_path_data, parse_points};
use crate::scene::{DrawableNode, SceneGraph};
use crate::style::{PropertyBag, StyleResolver};
use crate::transform::AspectRatio;
use crate::types::{ColorSpace, CoordUnits, NodeId, Rect};
use crate::units::{parse_length, Length};

enum Open {
    Node(NodeId),
    Filter {
        id: Option<String>,
        definition: FilterDefinition,
    },
    Primitive(FilterPrimitive),
    /// Unsupported element; its whole subtree is skipped.
    Ignored,
}

struct OpenElement {
    name: String,
    open: Open,
}

/// Construction context for one document.
pub struct DocumentBuilder<'s> {
    styles: &'s dyn StyleResolver,
    scene: SceneGraph,
    defs: Defs,
    stack: Vec<OpenElement>,
    root: Option<NodeId>,
}

impl<'s> DocumentBuilder<'s> {
    pub fn new(styles: &'s dyn StyleResolver) -> Self {
        Self {
            styles,
            scene: SceneGraph::new(),
            defs: Defs::new(),
            stack: Vec::new(),
            root: None,
        }
    }

    pub fn start_element(&mut self, name: &str, props: &PropertyBag) -> Result<(), BuildError> {
        let open = match self.stack.last_mut().map(|e| &mut e.open) {
            Some(Open::Ignored) => Open::Ignored,
            Some(Open::Primitive(primitive)) => {
                primitive_child(primitive, name, props);
                Open::Ignored
            }
            Some(Open::Filter { .. }) => match build_primitive(name, props) {
                Some(primitive) => Open::Primitive(primitive),
                None => {
                    warn!(element = name, "unsupported filter primitive");
                    Open::Ignored
                }
            },
            _ if name == "filter" => Open::Filter {
                id: props.get("id").map(str::to_string),
                definition: build_filter(props),
            },
            _ => match self.create_node(name, props) {
                Some(id) => Open::Node(id),
                None => Open::Ignored,
            },
        };
        self.stack.push(OpenElement {
            name: name.to_string(),
            open,
        });
        Ok(())
    }

    pub fn end_element(&mut self, name: &str) -> Result<(), BuildError> {
        let element = match self.stack.pop() {
            Some(element) if element.name == name => element,
            _ => return Err(BuildError::UnbalancedEnd(name.to_string())),
        };
        match element.open {
            Open::Primitive(primitive) => {
                if let Some(OpenElement {
                    open: Open::Filter { definition, .. },
                    ..
                }) = self.stack.last_mut()
                {
                    definition.primitives.push(primitive);
                }
            }
            Open::Filter { id, definition } => match id {
                Some(id) => {
                    debug!(id, primitives = definition.primitives.len(), "filter defined");
                    self.defs.register(&id, Definition::Filter(Rc::new(definition)));
                }
                None => debug!("filter without id dropped"),
            },
            Open::Node(_) | Open::Ignored => {}
        }
        Ok(())
    }

    /// Closes construction: resolves every queued reference exactly once.
    pub fn finish(mut self) -> Result<Document, BuildError> {
        if let Some(open) = self.stack.last() {
            return Err(BuildError::UnbalancedEnd(open.name.clone()));
        }
        let root = self.root.ok_or(BuildError::NoRoot)?;
        self.defs.finalize(&mut self.scene);
        debug!(nodes = self.scene.len(), definitions = self.defs.len(), "document built");
        Ok(Document {
            scene: self.scene,
            defs: self.defs,
            root,
        })
    }

    fn parent(&self) -> Option<NodeId> {
        match self.stack.last().map(|e| &e.open) {
            Some(Open::Node(id)) => Some(*id),
            _ => None,
        }
    }

    fn create_node(&mut self, name: &str, props: &PropertyBag) -> Option<NodeId> {
        let parent = self.parent();
        match parent {
            Some(p) if matches!(self.scene.get_node(p).map(|n| &n.kind), Some(NodeKind::Shape(_))) => {
                return None;
            }
            None if !self.stack.is_empty() => return None,
            None if self.root.is_some() || name != "svg" => {
                debug!(element = name, "element outside the document root ignored");
                return None;
            }
            _ => {}
        }

        let Some((kind, detached)) = build_kind(name, props, parent.is_none()) else {
            debug!(element = name, "element skipped");
            return None;
        };

        let style = self
            .styles
            .resolve(name, props.get("class"), props.get("id"), props);
        let mut node = DrawableNode::new(kind, style.state);
        node.id = props.get("id").map(str::to_string);
        let id = self.scene.add_node(node);

        match parent {
            Some(p) if detached => self.scene.set_parent(id, p),
            Some(p) => self.scene.add_child(p, id),
            None => self.root = Some(id),
        }
        if let Some(element_id) = props.get("id") {
            self.defs.register(element_id, Definition::Node(id));
        }

        if let Some(reference) = &style.filter {
            self.defs.request_link(LinkSlot::Filter(id), reference, &mut self.scene);
        }
        if let Some(reference) = &style.clip_path {
            self.defs.request_link(LinkSlot::ClipPath(id), reference, &mut self.scene);
        }
        if let Some(reference) = &style.mask {
            self.defs.request_link(LinkSlot::Mask(id), reference, &mut self.scene);
        }
        if name == "use" {
            if let Some(href) = props.href() {
                self.defs.request_link(LinkSlot::Use(id), href, &mut self.scene);
            }
        }
        Some(id)
    }
}

/// Variant data for `name`, and whether the node is detached from its
/// parent's children. `None` for unsupported or degenerate elements.
fn build_kind(name: &str, props: &PropertyBag, outermost: bool) -> Option<(NodeKind, bool)> {
    let kind = match name {
        "g" | "a" => (NodeKind::Group, false),
        "defs" => (NodeKind::Group, true),
        "switch" => (NodeKind::Conditional, false),
        "svg" => (NodeKind::DocumentRoot(svg_viewport(props, outermost)?), false),
        "symbol" => (NodeKind::Template(viewport(name, props)), true),
        "use" => {
            let Some(href) = props.href() else {
                warn!(element = name, "missing href, element skipped");
                return None;
            };
            let mut node = UseNode::new(href);
            node.x = length(name, props, "x", Length::ZERO);
            node.y = length(name, props, "y", Length::ZERO);
            node.width = match optional_length(name, props, "width") {
                Some(l) => Some(non_negative(name, "width", l)?),
                None => None,
            };
            node.height = match optional_length(name, props, "height") {
                Some(l) => Some(non_negative(name, "height", l)?),
                None => None,
            };
            (NodeKind::Use(node), false)
        }
        "clipPath" => (
            NodeKind::ClipPath(ClipPathNode {
                units: units(name, props, "clipPathUnits", CoordUnits::UserSpaceOnUse),
            }),
            true,
        ),
        "mask" => {
            let defaults = MaskNode::default();
            (
                NodeKind::Mask(MaskNode {
                    units: units(name, props, "maskUnits", defaults.units),
                    content_units: units(name, props, "maskContentUnits", defaults.content_units),
                    x: length(name, props, "x", defaults.x),
                    y: length(name, props, "y", defaults.y),
                    width: length(name, props, "width", defaults.width),
                    height: length(name, props, "height", defaults.height),
                }),
                true,
            )
        }
        _ => (NodeKind::Shape(ShapeNode::new(shape_geometry(name, props)?)), false),
    };
    Some(kind)
}

fn shape_geometry(name: &str, props: &PropertyBag) -> Option<ShapeGeometry> {
    let len = |key: &str| length(name, props, key, Length::ZERO);
    let geometry = match name {
        "rect" => ShapeGeometry::Rect {
            x: len("x"),
            y: len("y"),
            width: non_negative(name, "width", len("width"))?,
            height: non_negative(name, "height", len("height"))?,
            rx: optional_length(name, props, "rx"),
            ry: optional_length(name, props, "ry"),
        },
        "circle" => ShapeGeometry::Circle {
            cx: len("cx"),
            cy: len("cy"),
            r: len("r"),
        },
        "ellipse" => ShapeGeometry::Ellipse {
            cx: len("cx"),
            cy: len("cy"),
            rx: len("rx"),
            ry: len("ry"),
        },
        "line" => ShapeGeometry::Line {
            x1: len("x1"),
            y1: len("y1"),
            x2: len("x2"),
            y2: len("y2"),
        },
        "polyline" | "polygon" => {
            let points = props.get("points").and_then(|raw| {
                let parsed = parse_points(raw);
                if parsed.is_none() {
                    warn!(element = name, value = raw, "unparsable points");
                }
                parsed
            });
            let points = points.unwrap_or_default();
            if name == "polygon" {
                ShapeGeometry::Polygon(points)
            } else {
                ShapeGeometry::Polyline(points)
            }
        }
        "path" => {
            let raw = props.get("d").unwrap_or("");
            match parse_path_data(raw) {
                Some(path) => ShapeGeometry::Path(path),
                None => {
                    warn!(element = name, "unparsable path data, element skipped");
                    return None;
                }
            }
        }
        _ => return None,
    };
    Some(geometry)
}

/// A nested `svg` with a negative size is dropped; the outermost one keeps
/// its place as the root but collapses the negative axis.
fn svg_viewport(props: &PropertyBag, outermost: bool) -> Option<Viewport> {
    let name = "svg";
    let mut viewport = viewport(name, props);
    for (key, value) in [("width", &mut viewport.width), ("height", &mut viewport.height)] {
        if !value.is_negative() {
            continue;
        }
        if outermost {
            warn!(element = name, attribute = key, "negative size on the root, nothing is drawn");
            *value = Length::ZERO;
        } else {
            non_negative(name, key, *value)?;
        }
    }
    Some(viewport)
}

fn viewport(name: &str, props: &PropertyBag) -> Viewport {
    let defaults = Viewport::default();
    let mut viewport = Viewport {
        x: length(name, props, "x", defaults.x),
        y: length(name, props, "y", defaults.y),
        width: length(name, props, "width", defaults.width),
        height: length(name, props, "height", defaults.height),
        view_box: props.get("viewBox").and_then(|raw| view_box(name, raw)),
        aspect: defaults.aspect,
    };
    if let Some(raw) = props.get("preserveAspectRatio") {
        match raw.parse::<AspectRatio>() {
            Ok(aspect) => viewport.aspect = aspect,
            Err(reason) => warn!(element = name, value = raw, reason = %reason, "bad preserveAspectRatio"),
        }
    }
    viewport
}

fn view_box(name: &str, raw: &str) -> Option<Rect> {
    match svgtypes::ViewBox::from_str(raw) {
        Ok(vb) => Some(Rect::new(vb.x, vb.y, vb.w, vb.h)),
        Err(e) => {
            warn!(element = name, value = raw, error = %e, "invalid viewBox ignored");
            None
        }
    }
}

fn build_filter(props: &PropertyBag) -> FilterDefinition {
    let name = "filter";
    let defaults = FilterDefinition::default();
    FilterDefinition {
        x: length(name, props, "x", defaults.x),
        y: length(name, props, "y", defaults.y),
        width: length(name, props, "width", defaults.width),
        height: length(name, props, "height", defaults.height),
        filter_units: units(name, props, "filterUnits", defaults.filter_units),
        primitive_units: units(name, props, "primitiveUnits", defaults.primitive_units),
        color_interpolation: color_space(name, props),
        primitives: Vec::new(),
    }
}

fn build_primitive(name: &str, props: &PropertyBag) -> Option<FilterPrimitive> {
    let kind = match name {
        "feOffset" => PrimitiveKind::Offset(Offset::from_properties(props)),
        "feMerge" => PrimitiveKind::Merge(Merge::default()),
        "feColorMatrix" => PrimitiveKind::ColorMatrix(ColorMatrix::from_properties(props)),
        "feComponentTransfer" => {
            PrimitiveKind::ComponentTransfer(ComponentTransfer::from_properties(props))
        }
        "feFlood" => PrimitiveKind::Flood(Flood::from_properties(props)),
        "feBlend" => PrimitiveKind::Blend(Blend::from_properties(props)),
        "feComposite" => PrimitiveKind::Composite(Composite::from_properties(props)),
        "feConvolveMatrix" => PrimitiveKind::ConvolveMatrix(ConvolveMatrix::from_properties(props)),
        "feMorphology" => PrimitiveKind::Morphology(Morphology::from_properties(props)),
        "feDisplacementMap" => {
            PrimitiveKind::DisplacementMap(DisplacementMap::from_properties(props))
        }
        "feTurbulence" => PrimitiveKind::Turbulence(Turbulence::from_properties(props)),
        "feImage" => PrimitiveKind::Image(ImagePrimitive::from_properties(props)),
        "feTile" => PrimitiveKind::Tile(Tile::from_properties(props)),
        "feGaussianBlur" => PrimitiveKind::GaussianBlur(GaussianBlur::from_properties(props)),
        "feDiffuseLighting" => PrimitiveKind::DiffuseLighting(Lighting::diffuse(props)),
        "feSpecularLighting" => PrimitiveKind::SpecularLighting(Lighting::specular(props)),
        _ => return None,
    };
    let mut primitive = FilterPrimitive::new(kind);
    primitive.x = optional_length(name, props, "x");
    primitive.y = optional_length(name, props, "y");
    primitive.width = optional_length(name, props, "width");
    primitive.height = optional_length(name, props, "height");
    primitive.result = props
        .get("result")
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    primitive.color_interpolation = color_space(name, props);
    Some(primitive)
}

/// Feeds a child element of a primitive into it.
fn primitive_child(primitive: &mut FilterPrimitive, name: &str, props: &PropertyBag) {
    match (&mut primitive.kind, name) {
        (PrimitiveKind::Merge(merge), "feMergeNode") => merge.push_node(props),
        (PrimitiveKind::ComponentTransfer(transfer), _) => {
            let channel = match name {
                "feFuncR" => Channel::R,
                "feFuncG" => Channel::G,
                "feFuncB" => Channel::B,
                "feFuncA" => Channel::A,
                _ => {
                    debug!(element = name, "ignored inside feComponentTransfer");
                    return;
                }
            };
            transfer.set_function(channel, TransferFunction::from_properties(name, props));
        }
        (PrimitiveKind::DiffuseLighting(lighting), _)
        | (PrimitiveKind::SpecularLighting(lighting), _) => {
            match LightSource::from_element(name, props) {
                Some(light) => lighting.set_light(light),
                None => debug!(element = name, "ignored inside lighting primitive"),
            }
        }
        (kind, _) => debug!(element = name, parent = kind.name(), "ignored primitive child"),
    }
}

fn length(element: &str, props: &PropertyBag, key: &str, default: Length) -> Length {
    optional_length(element, props, key).unwrap_or(default)
}

fn optional_length(element: &str, props: &PropertyBag, key: &str) -> Option<Length> {
    let raw = props.get(key)?;
    match parse_length(raw) {
        Ok(length) => Some(length),
        Err(e) => {
            warn!(element, attribute = key, value = raw, error = %e, "ignoring unparsable length");
            None
        }
    }
}

fn non_negative(element: &str, key: &str, length: Length) -> Option<Length> {
    if length.is_negative() {
        warn!(element, attribute = key, value = length.value, "negative size, element skipped");
        return None;
    }
    Some(length)
}

fn units(element: &str, props: &PropertyBag, key: &str, default: CoordUnits) -> CoordUnits {
    match props.get(key) {
        None => default,
        Some(raw) => CoordUnits::parse(raw).unwrap_or_else(|| {
            warn!(element, attribute = key, value = raw, "unknown units");
            default
        }),
    }
}

fn color_space(element: &str, props: &PropertyBag) -> Option<ColorSpace> {
    let raw = props.get("color-interpolation-filters")?;
    match raw.trim() {
        "auto" => Some(ColorSpace::LinearRgb),
        value => ColorSpace::parse(value).or_else(|| {
            warn!(element, value, "unknown color-interpolation-filters");
            None
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::LinkState;
    use crate::style::PresentationStyles;

    fn bag(pairs: &[(&str, &str)]) -> PropertyBag {
        pairs.iter().copied().collect()
    }

    fn leaf(b: &mut DocumentBuilder<'_>, name: &str, pairs: &[(&str, &str)]) {
        b.start_element(name, &bag(pairs)).expect("start");
        b.end_element(name).expect("end");
    }

    #[test]
    fn defs_and_symbols_are_detached() {
        let styles = PresentationStyles::default();
        let mut b = DocumentBuilder::new(&styles);
        b.start_element("svg", &bag(&[("width", "10"), ("height", "10")])).expect("svg");
        b.start_element("defs", &PropertyBag::new()).expect("defs");
        leaf(&mut b, "rect", &[("id", "r"), ("width", "1"), ("height", "1")]);
        b.end_element("defs").expect("defs end");
        b.start_element("symbol", &bag(&[("id", "s")])).expect("symbol");
        b.end_element("symbol").expect("symbol end");
        leaf(&mut b, "use", &[("href", "#r")]);
        b.end_element("svg").expect("svg end");
        let doc = b.finish().expect("document");

        let root = doc.scene.get_node(doc.root).expect("root");
        assert_eq!(root.children.len(), 1, "only the use is drawable");
        let use_id = root.children[0];
        let rect_id = doc.defs.lookup("r").and_then(Definition::node).expect("rect");
        match &doc.scene.get_node(use_id).expect("use").kind {
            NodeKind::Use(u) => assert_eq!(u.link, LinkState::Resolved(rect_id)),
            other => panic!("expected use, got {}", other.name()),
        }
    }

    #[test]
    fn negative_sizes_drop_only_that_element() {
        let styles = PresentationStyles::default();
        let mut b = DocumentBuilder::new(&styles);
        b.start_element("svg", &PropertyBag::new()).expect("svg");
        b.start_element("rect", &bag(&[("width", "-1"), ("height", "4")])).expect("rect");
        leaf(&mut b, "circle", &[("r", "1")]);
        b.end_element("rect").expect("rect end");
        leaf(&mut b, "use", &[("href", "#r"), ("height", "-2")]);
        b.start_element("svg", &bag(&[("width", "-3")])).expect("nested svg");
        leaf(&mut b, "rect", &[("width", "1"), ("height", "1")]);
        b.end_element("svg").expect("nested svg end");
        leaf(&mut b, "rect", &[("id", "r"), ("width", "2"), ("height", "2")]);
        b.end_element("svg").expect("svg end");
        let doc = b.finish().expect("document");

        let root = doc.scene.get_node(doc.root).expect("root");
        assert_eq!(root.children.len(), 1, "only the valid rect survives");
        assert_eq!(doc.scene.len(), 2, "skipped subtrees create no nodes");
    }

    #[test]
    fn use_without_href_is_skipped() {
        let styles = PresentationStyles::default();
        let mut b = DocumentBuilder::new(&styles);
        b.start_element("svg", &PropertyBag::new()).expect("svg");
        leaf(&mut b, "use", &[("x", "3")]);
        leaf(&mut b, "g", &[]);
        b.end_element("svg").expect("svg end");
        let doc = b.finish().expect("document");

        let root = doc.scene.get_node(doc.root).expect("root");
        assert_eq!(root.children.len(), 1);
        let kind = &doc.scene.get_node(root.children[0]).expect("child").kind;
        assert!(matches!(kind, NodeKind::Group), "got {}", kind.name());
    }

    #[test]
    fn negative_root_size_collapses_to_zero() {
        let styles = PresentationStyles::default();
        let mut b = DocumentBuilder::new(&styles);
        b.start_element("svg", &bag(&[("width", "-10"), ("height", "5")])).expect("svg");
        b.end_element("svg").expect("svg end");
        let doc = b.finish().expect("document");
        match &doc.scene.get_node(doc.root).expect("root").kind {
            NodeKind::DocumentRoot(vp) => {
                assert_eq!(vp.width, Length::ZERO);
                assert_eq!(vp.height, Length::new(5.0, crate::units::LengthUnit::Number));
            }
            other => panic!("expected svg, got {}", other.name()),
        }
    }

    #[test]
    fn mismatched_end_is_an_error() {
        let styles = PresentationStyles::default();
        let mut b = DocumentBuilder::new(&styles);
        b.start_element("svg", &PropertyBag::new()).expect("svg");
        assert!(matches!(b.end_element("g"), Err(BuildError::UnbalancedEnd(_))));
    }

    #[test]
    fn filter_children_are_collected() {
        let styles = PresentationStyles::default();
        let mut b = DocumentBuilder::new(&styles);
        b.start_element("svg", &PropertyBag::new()).expect("svg");
        leaf(&mut b, "g", &[("filter", "url(#f)")]);
        b.start_element("filter", &bag(&[("id", "f")])).expect("filter");
        b.start_element("feMerge", &PropertyBag::new()).expect("merge");
        leaf(&mut b, "feMergeNode", &[("in", "SourceAlpha")]);
        leaf(&mut b, "feMergeNode", &[]);
        b.end_element("feMerge").expect("merge end");
        b.start_element("feComponentTransfer", &PropertyBag::new()).expect("ct");
        leaf(&mut b, "feFuncA", &[("type", "linear"), ("slope", "0.5")]);
        b.end_element("feComponentTransfer").expect("ct end");
        leaf(&mut b, "feBogus", &[]);
        b.end_element("filter").expect("filter end");
        b.end_element("svg").expect("svg end");
        let doc = b.finish().expect("document");

        let group = doc.scene.get_node(doc.root).expect("root").children[0];
        let filter = doc
            .scene
            .get_node(group)
            .and_then(|n| n.state.filter.clone())
            .expect("forward filter reference resolved");
        assert_eq!(filter.primitives.len(), 2);
        match &filter.primitives[0].kind {
            PrimitiveKind::Merge(m) => assert_eq!(m.nodes.len(), 2),
            other => panic!("expected feMerge, got {}", other.name()),
        }
        match &filter.primitives[1].kind {
            PrimitiveKind::ComponentTransfer(ct) => assert_eq!(
                ct.a,
                TransferFunction::Linear {
                    slope: 0.5,
                    intercept: 0.0
                }
            ),
            other => panic!("expected feComponentTransfer, got {}", other.name()),
        }
    }

    #[test]
    fn missing_root_is_an_error() {
        let styles = PresentationStyles::default();
        let b = DocumentBuilder::new(&styles);
        assert!(matches!(b.finish(), Err(BuildError::NoRoot)));
    }
}
