//! Document Structure Tests
//!
//! Tests for building documents from element trees and for the transform
//! algebra the traversal relies on.

use strata_core::defs::Definition;
use strata_core::node::{LinkState, NodeKind};
use strata_core::transform::{viewport_map, Affine, AspectRatio};
use strata_core::types::Rect;
use strata_core::{load_document, BuildError, RenderOptions};
use tiny_skia::Pixmap;

/// The arena mirrors the element tree.
///
/// Validates:
/// - Children keep document order
/// - Parent back-references point at the container
/// - Ids are registered in the definition registry
#[test]
fn tree_structure_and_ids() {
    let json = r##"{ "name": "svg", "attributes": { "width": 10, "height": 10 }, "children": [
        { "name": "g", "attributes": { "id": "outer" }, "children": [
            { "name": "circle", "attributes": { "id": "dot", "r": 2 } },
            { "name": "use", "attributes": { "href": "#dot" } }
        ] },
        { "name": "title" }
    ] }"##;
    let document = load_document(json, &RenderOptions::default()).expect("document builds");

    let root = document.scene.get_node(document.root).expect("root");
    assert!(matches!(root.kind, NodeKind::DocumentRoot(_)));
    assert_eq!(root.children.len(), 1, "unsupported elements are skipped");

    let outer = document.defs.lookup("#outer").and_then(Definition::node).expect("outer");
    assert_eq!(root.children[0], outer);
    let group = document.scene.get_node(outer).expect("group");
    assert_eq!(group.parent, Some(document.root));
    assert_eq!(group.children.len(), 2);

    let dot = document.defs.lookup("url(#dot)").and_then(Definition::node).expect("dot");
    assert_eq!(group.children[0], dot, "document order");
    match &document.scene.get_node(group.children[1]).expect("use").kind {
        NodeKind::Use(u) => assert_eq!(u.link, LinkState::Resolved(dot)),
        other => panic!("expected use, got {}", other.name()),
    }
}

/// Unresolvable links end up permanently absent.
///
/// Validates:
/// - Finishing the document settles every queued link
#[test]
fn unresolved_links_become_absent() {
    let json = r##"{ "name": "svg", "children": [ { "name": "use", "attributes": { "href": "#ghost" } } ] }"##;
    let document = load_document(json, &RenderOptions::default()).expect("document builds");
    let use_id = document.scene.get_node(document.root).expect("root").children[0];
    match &document.scene.get_node(use_id).expect("use").kind {
        NodeKind::Use(u) => assert_eq!(u.link, LinkState::Absent),
        other => panic!("expected use, got {}", other.name()),
    }
    assert!(document.defs.is_finalized());
    assert_eq!(document.defs.pending_len(), 0);
}

/// Structural errors reject the document; degenerate elements do not.
///
/// Validates:
/// - A tree without an `svg` root is `NoRoot`
/// - A `use` with a negative size or no `href` is dropped and the rest draws
#[test]
fn structural_errors_and_degenerate_elements() {
    let no_root = load_document(r#"{ "name": "g" }"#, &RenderOptions::default());
    assert!(matches!(no_root, Err(BuildError::NoRoot)), "got {:?}", no_root.err());

    let json = r##"{ "name": "svg", "attributes": { "width": 4, "height": 4 }, "children": [
        { "name": "rect", "attributes": { "id": "r", "width": 4, "height": 4, "fill": "lime" } },
        { "name": "use", "attributes": { "href": "#r", "width": -1 } },
        { "name": "use", "attributes": { "x": 2 } }
    ] }"##;
    let options = RenderOptions::default();
    let document = load_document(json, &options).expect("degenerate elements are skipped");
    let root = document.scene.get_node(document.root).expect("root");
    assert_eq!(root.children.len(), 1, "both uses dropped");

    let mut pixmap = Pixmap::new(4, 4).expect("pixmap");
    document.render(&mut pixmap, &options).expect("render");
    let p = pixmap.pixel(1, 1).expect("pixel");
    assert_eq!((p.red(), p.green(), p.blue(), p.alpha()), (0, 255, 0, 255));
}

/// Named colors cover the full CSS list.
///
/// Validates:
/// - `chartreuse` resolves instead of falling back to black
#[test]
fn extended_named_colors() {
    let json = r#"{ "name": "svg", "attributes": { "width": 2, "height": 2 }, "children": [
        { "name": "rect", "attributes": { "width": 2, "height": 2, "fill": "chartreuse" } }
    ] }"#;
    let options = RenderOptions::default();
    let document = load_document(json, &options).expect("document builds");
    let mut pixmap = Pixmap::new(2, 2).expect("pixmap");
    document.render(&mut pixmap, &options).expect("render");
    let p = pixmap.pixel(0, 0).expect("pixel");
    assert_eq!((p.red(), p.green(), p.blue(), p.alpha()), (127, 255, 0, 255));
}

/// Intrinsic size resolves absolute units and viewBox percentages.
///
/// Validates:
/// - `in` resolves against the configured dpi
/// - Percentages resolve against the viewBox
#[test]
fn intrinsic_size() {
    let options = RenderOptions::default();
    let document = load_document(
        r#"{ "name": "svg", "attributes": { "width": "1in", "height": "50%", "viewBox": "0 0 40 40" } }"#,
        &options,
    )
    .expect("document builds");
    assert_eq!(document.intrinsic_size(&options), Some((90, 20)));
}

/// An empty root renders without touching the target.
///
/// Validates:
/// - Rendering an empty document succeeds
/// - The configured background is applied
#[test]
fn background_fill() {
    let options = RenderOptions {
        background: Some(strata_core::types::Color::WHITE),
        ..RenderOptions::default()
    };
    let document = load_document(r#"{ "name": "svg" }"#, &options).expect("document builds");
    let mut pixmap = Pixmap::new(3, 3).expect("pixmap");
    document.render(&mut pixmap, &options).expect("render");
    assert!(pixmap.pixels().iter().all(|p| p.alpha() == 255 && p.red() == 255));
}

/// Transform algebra round trips.
///
/// Validates:
/// - Composing with the inverse yields the identity
/// - `viewport_map` centers a square viewBox in a wide viewport
#[test]
fn affine_round_trips() {
    let t = Affine::rotate(30.0)
        .then(&Affine::scale(2.0, 3.0))
        .then(&Affine::translate(7.0, -4.0));
    let inverse = t.invert().expect("invertible");
    let (x, y) = inverse.transform_point(t.transform_point(3.5, -1.25).0, t.transform_point(3.5, -1.25).1);
    assert!((x - 3.5).abs() < 1e-9 && (y + 1.25).abs() < 1e-9, "got ({}, {})", x, y);

    let map = viewport_map(
        &Rect::new(0.0, 0.0, 10.0, 10.0),
        &Rect::new(0.0, 0.0, 40.0, 20.0),
        AspectRatio::default(),
    );
    assert_eq!(map.transform_point(0.0, 0.0), (10.0, 0.0));
    assert_eq!(map.transform_point(10.0, 10.0), (30.0, 20.0));
}
