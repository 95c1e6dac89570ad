use kurbo::{BezPath, PathEl, Shape};

use crate::units::{Length, UnitContext};

const TOLERANCE: f64 = 0.1;

/// Basic-shape geometry. Lengths are kept unresolved because percentages
/// depend on the viewport the shape is drawn in.
#[derive(Debug, Clone)]
pub enum ShapeGeometry {
    Rect {
        x: Length,
        y: Length,
        width: Length,
        height: Length,
        rx: Option<Length>,
        ry: Option<Length>,
    },
    Circle {
        cx: Length,
        cy: Length,
        r: Length,
    },
    Ellipse {
        cx: Length,
        cy: Length,
        rx: Length,
        ry: Length,
    },
    Line {
        x1: Length,
        y1: Length,
        x2: Length,
        y2: Length,
    },
    Polyline(Vec<(f64, f64)>),
    Polygon(Vec<(f64, f64)>),
    Path(BezPath),
}

#[derive(Debug, Clone)]
pub struct ShapeNode {
    pub geometry: ShapeGeometry,
}

impl ShapeNode {
    pub fn new(geometry: ShapeGeometry) -> Self {
        Self { geometry }
    }

    /// Outline in user space, or `None` for degenerate geometry.
    pub fn to_path(&self, units: &UnitContext) -> Option<tiny_skia::Path> {
        let bez = match &self.geometry {
            ShapeGeometry::Rect {
                x,
                y,
                width,
                height,
                rx,
                ry,
            } => {
                let (x, y) = (units.horizontal(x), units.vertical(y));
                let (w, h) = (units.horizontal(width), units.vertical(height));
                if !(w > 0.0 && h > 0.0) {
                    return None;
                }
                let rx = rx.map(|l| units.horizontal(&l)).filter(|v| *v > 0.0);
                let ry = ry.map(|l| units.vertical(&l)).filter(|v| *v > 0.0);
                let (rx, ry) = match (rx, ry) {
                    (None, None) => (0.0, 0.0),
                    (Some(r), None) | (None, Some(r)) => (r, r),
                    (Some(rx), Some(ry)) => (rx, ry),
                };
                rounded_rect(x, y, w, h, rx.min(w / 2.0), ry.min(h / 2.0))
            }
            ShapeGeometry::Circle { cx, cy, r } => {
                let r = units.other(r);
                if !(r > 0.0) {
                    return None;
                }
                kurbo::Circle::new((units.horizontal(cx), units.vertical(cy)), r).to_path(TOLERANCE)
            }
            ShapeGeometry::Ellipse { cx, cy, rx, ry } => {
                let (rx, ry) = (units.horizontal(rx), units.vertical(ry));
                if !(rx > 0.0 && ry > 0.0) {
                    return None;
                }
                kurbo::Ellipse::new((units.horizontal(cx), units.vertical(cy)), (rx, ry), 0.0)
                    .to_path(TOLERANCE)
            }
            ShapeGeometry::Line { x1, y1, x2, y2 } => {
                let mut path = BezPath::new();
                path.move_to((units.horizontal(x1), units.vertical(y1)));
                path.line_to((units.horizontal(x2), units.vertical(y2)));
                path
            }
            ShapeGeometry::Polyline(points) => polyline(points, false)?,
            ShapeGeometry::Polygon(points) => polyline(points, true)?,
            ShapeGeometry::Path(path) => path.clone(),
        };
        to_tiny_skia(&bez)
    }
}

fn rounded_rect(x: f64, y: f64, w: f64, h: f64, rx: f64, ry: f64) -> BezPath {
    if rx <= 0.0 || ry <= 0.0 {
        return kurbo::Rect::new(x, y, x + w, y + h).to_path(TOLERANCE);
    }
    // Round with circular corners in a space squashed so that ry becomes rx.
    let k = rx / ry;
    let squashed = kurbo::RoundedRect::new(x, y * k, x + w, (y + h) * k, rx).to_path(TOLERANCE);
    kurbo::Affine::scale_non_uniform(1.0, 1.0 / k) * squashed
}

fn polyline(points: &[(f64, f64)], close: bool) -> Option<BezPath> {
    let (first, rest) = points.split_first()?;
    let mut path = BezPath::new();
    path.move_to(*first);
    for p in rest {
        path.line_to(*p);
    }
    if close {
        path.close_path();
    }
    Some(path)
}

/// Parses a `points` list. An odd trailing coordinate is dropped.
pub fn parse_points(s: &str) -> Option<Vec<(f64, f64)>> {
    let numbers = crate::parsers::parse_number_list(s)?;
    Some(numbers.chunks_exact(2).map(|c| (c[0], c[1])).collect())
}

pub fn parse_path_data(d: &str) -> Option<BezPath> {
    BezPath::from_svg(d).ok()
}

pub fn to_tiny_skia(path: &BezPath) -> Option<tiny_skia::Path> {
    let mut pb = tiny_skia::PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(p1, p2) => pb.quad_to(p1.x as f32, p1.y as f32, p2.x as f32, p2.y as f32),
            PathEl::CurveTo(p1, p2, p3) => pb.cubic_to(
                p1.x as f32,
                p1.y as f32,
                p2.x as f32,
                p2.y as f32,
                p3.x as f32,
                p3.y as f32,
            ),
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units() -> UnitContext {
        UnitContext {
            dpi_x: 90.0,
            dpi_y: 90.0,
            viewport_width: 100.0,
            viewport_height: 100.0,
        }
    }

    #[test]
    fn rect_bounds() {
        let shape = ShapeNode::new(ShapeGeometry::Rect {
            x: Length::px(10.0),
            y: Length::px(20.0),
            width: Length::percent(0.5),
            height: Length::px(5.0),
            rx: None,
            ry: None,
        });
        let path = shape.to_path(&units()).expect("non-degenerate");
        let b = path.bounds();
        assert_eq!((b.left(), b.top(), b.right(), b.bottom()), (10.0, 20.0, 60.0, 25.0));
    }

    #[test]
    fn degenerate_shapes_produce_no_path() {
        let zero_rect = ShapeNode::new(ShapeGeometry::Rect {
            x: Length::ZERO,
            y: Length::ZERO,
            width: Length::px(0.0),
            height: Length::px(5.0),
            rx: None,
            ry: None,
        });
        assert!(zero_rect.to_path(&units()).is_none());
        let circle = ShapeNode::new(ShapeGeometry::Circle {
            cx: Length::ZERO,
            cy: Length::ZERO,
            r: Length::px(-1.0),
        });
        assert!(circle.to_path(&units()).is_none());
        assert!(ShapeNode::new(ShapeGeometry::Polygon(vec![])).to_path(&units()).is_none());
    }

    #[test]
    fn rounded_rect_stays_in_bounds() {
        let shape = ShapeNode::new(ShapeGeometry::Rect {
            x: Length::ZERO,
            y: Length::ZERO,
            width: Length::px(40.0),
            height: Length::px(20.0),
            rx: Some(Length::px(30.0)),
            ry: Some(Length::px(4.0)),
        });
        let b = shape.to_path(&units()).expect("path").bounds();
        assert!((b.width() - 40.0).abs() < 0.01 && (b.height() - 20.0).abs() < 0.01);
    }

    #[test]
    fn path_data_with_arcs() {
        let bez = parse_path_data("M0 0 L10 0 A5 5 0 0 1 10 10 Z").expect("valid path data");
        assert!(to_tiny_skia(&bez).is_some());
        assert!(parse_path_data("M0 0 Q").is_none());
        assert_eq!(parse_points("0,0 10,0 10 10 5").map(|p| p.len()), Some(3));
    }
}
