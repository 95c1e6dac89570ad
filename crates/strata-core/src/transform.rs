//! Affine transform algebra.
//!
//! [`Affine`] wraps [`kurbo::Affine`] and fixes the composition order used
//! by the traversal: [`Affine::multiply`] with `(a, b)` yields the map that
//! applies `a` first and `b` after. The coefficients read
//!
//! ```text
//! x' = a*x + c*y + e
//! y' = b*x + d*y + f
//! ```

use std::str::FromStr;

use kurbo::Point;

use crate::types::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Affine(kurbo::Affine);

impl From<kurbo::Affine> for Affine {
    fn from(inner: kurbo::Affine) -> Self {
        Self(inner)
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine(kurbo::Affine::IDENTITY);

    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self(kurbo::Affine::new([a, b, c, d, e, f]))
    }

    pub fn translate(dx: f64, dy: f64) -> Self {
        Self(kurbo::Affine::translate((dx, dy)))
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self(kurbo::Affine::scale_non_uniform(sx, sy))
    }

    /// Rotation by `degrees`, counter-clockwise in a y-up system
    /// (clockwise on screen).
    pub fn rotate(degrees: f64) -> Self {
        Self(kurbo::Affine::rotate(degrees.to_radians()))
    }

    pub fn skew_x(degrees: f64) -> Self {
        Self(kurbo::Affine::skew(degrees.to_radians().tan(), 0.0))
    }

    pub fn skew_y(degrees: f64) -> Self {
        Self(kurbo::Affine::skew(0.0, degrees.to_radians().tan()))
    }

    /// The map that applies `first`, then `then`.
    pub fn multiply(first: &Affine, then: &Affine) -> Affine {
        Affine(then.0 * first.0)
    }

    /// `self` applied first, then `next`.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine::multiply(self, next)
    }

    /// `inner` applied first, then `self`.
    pub fn pre(&self, inner: &Affine) -> Affine {
        Affine::multiply(inner, self)
    }

    /// `[a, b, c, d, e, f]`.
    pub fn coeffs(&self) -> [f64; 6] {
        self.0.as_coeffs()
    }

    pub fn as_kurbo(&self) -> kurbo::Affine {
        self.0
    }

    pub fn determinant(&self) -> f64 {
        self.0.determinant()
    }

    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det.abs() > f64::EPSILON
    }

    pub fn invert(&self) -> Option<Affine> {
        self.is_invertible().then(|| Affine(self.0.inverse()))
    }

    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        let p = self.0 * Point::new(x, y);
        (p.x, p.y)
    }

    /// Applies the linear part only.
    pub fn transform_distance(&self, dx: f64, dy: f64) -> (f64, f64) {
        let [a, b, c, d, _, _] = self.coeffs();
        (a * dx + c * dy, b * dx + d * dy)
    }

    /// Axis-aligned bounds of the transformed rectangle.
    pub fn transform_rect_bounds(&self, rect: &Rect) -> Rect {
        let r = self
            .0
            .transform_rect_bbox(kurbo::Rect::new(rect.x, rect.y, rect.right(), rect.bottom()));
        Rect::from_ltrb(r.x0, r.y0, r.x1, r.y1)
    }

    /// Lengths of the transformed unit vectors along each axis.
    pub fn scale_factors(&self) -> (f64, f64) {
        let [a, b, c, d, _, _] = self.coeffs();
        (a.hypot(b), c.hypot(d))
    }

    /// Geometric mean scale, used for lengths that are not tied to an axis.
    pub fn expansion(&self) -> f64 {
        self.determinant().abs().sqrt()
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }

    pub fn to_tiny_skia(&self) -> tiny_skia::Transform {
        let [a, b, c, d, e, f] = self.coeffs();
        tiny_skia::Transform::from_row(a as f32, b as f32, c as f32, d as f32, e as f32, f as f32)
    }
}

/// Anchor used when a viewBox has to be fitted into a viewport of a
/// different aspect ratio. `None` stretches non-uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    None,
    XMinYMin,
    XMidYMin,
    XMaxYMin,
    XMinYMid,
    #[default]
    XMidYMid,
    XMaxYMid,
    XMinYMax,
    XMidYMax,
    XMaxYMax,
}

impl Align {
    /// Fractions of the free space placed before the content, per axis.
    fn fractions(self) -> (f64, f64) {
        match self {
            Align::None | Align::XMinYMin => (0.0, 0.0),
            Align::XMidYMin => (0.5, 0.0),
            Align::XMaxYMin => (1.0, 0.0),
            Align::XMinYMid => (0.0, 0.5),
            Align::XMidYMid => (0.5, 0.5),
            Align::XMaxYMid => (1.0, 0.5),
            Align::XMinYMax => (0.0, 1.0),
            Align::XMidYMax => (0.5, 1.0),
            Align::XMaxYMax => (1.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeetOrSlice {
    #[default]
    Meet,
    Slice,
}

/// Alignment policy (`preserveAspectRatio`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AspectRatio {
    pub align: Align,
    pub meet_or_slice: MeetOrSlice,
}

impl From<svgtypes::AspectRatio> for AspectRatio {
    fn from(parsed: svgtypes::AspectRatio) -> Self {
        use svgtypes::Align as A;
        let align = match parsed.align {
            A::None => Align::None,
            A::XMinYMin => Align::XMinYMin,
            A::XMidYMin => Align::XMidYMin,
            A::XMaxYMin => Align::XMaxYMin,
            A::XMinYMid => Align::XMinYMid,
            A::XMidYMid => Align::XMidYMid,
            A::XMaxYMid => Align::XMaxYMid,
            A::XMinYMax => Align::XMinYMax,
            A::XMidYMax => Align::XMidYMax,
            A::XMaxYMax => Align::XMaxYMax,
        };
        AspectRatio {
            align,
            meet_or_slice: if parsed.slice {
                MeetOrSlice::Slice
            } else {
                MeetOrSlice::Meet
            },
        }
    }
}

impl FromStr for AspectRatio {
    type Err = svgtypes::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        svgtypes::AspectRatio::from_str(s).map(AspectRatio::from)
    }
}

/// Maps the `logical` rectangle (a viewBox) onto the `target` viewport.
///
/// An axis with zero logical extent keeps unit scale and only translates.
pub fn viewport_map(logical: &Rect, target: &Rect, aspect: AspectRatio) -> Affine {
    let degenerate_x = !(logical.width > 0.0);
    let degenerate_y = !(logical.height > 0.0);
    let raw_x = if degenerate_x {
        1.0
    } else {
        target.width / logical.width
    };
    let raw_y = if degenerate_y {
        1.0
    } else {
        target.height / logical.height
    };

    let (sx, sy) = match aspect.align {
        Align::None => (raw_x, raw_y),
        _ => {
            let uniform = match (degenerate_x, degenerate_y) {
                (true, true) => 1.0,
                (true, false) => raw_y,
                (false, true) => raw_x,
                (false, false) => match aspect.meet_or_slice {
                    MeetOrSlice::Meet => raw_x.min(raw_y),
                    MeetOrSlice::Slice => raw_x.max(raw_y),
                },
            };
            (
                if degenerate_x { 1.0 } else { uniform },
                if degenerate_y { 1.0 } else { uniform },
            )
        }
    };

    let (fx, fy) = aspect.align.fractions();
    let extra_x = if degenerate_x {
        0.0
    } else {
        target.width - logical.width * sx
    };
    let extra_y = if degenerate_y {
        0.0
    } else {
        target.height - logical.height * sy
    };

    Affine::new(
        sx,
        0.0,
        0.0,
        sy,
        target.x - logical.x * sx + extra_x * fx,
        target.y - logical.y * sy + extra_y * fy,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &Affine, b: &Affine) -> bool {
        a.coeffs()
            .iter()
            .zip(b.coeffs())
            .all(|(x, y)| (x - y).abs() < 1e-9)
    }

    #[test]
    fn translate_then_inverse_is_identity() {
        let t = Affine::multiply(&Affine::translate(3.0, -7.5), &Affine::translate(-3.0, 7.5));
        assert!(approx(&t, &Affine::IDENTITY), "got {t:?}");
    }

    #[test]
    fn multiply_applies_first_argument_first() {
        let m = Affine::multiply(&Affine::scale(2.0, 2.0), &Affine::translate(10.0, 0.0));
        assert_eq!(m.transform_point(1.0, 1.0), (12.0, 2.0));
        let m = Affine::multiply(&Affine::translate(10.0, 0.0), &Affine::scale(2.0, 2.0));
        assert_eq!(m.transform_point(1.0, 1.0), (22.0, 2.0));
    }

    #[test]
    fn invert_round_trips() {
        let m = Affine::rotate(30.0)
            .then(&Affine::scale(2.0, 0.5))
            .then(&Affine::translate(4.0, 9.0));
        let inv = m.invert().expect("invertible");
        assert!(approx(&m.then(&inv), &Affine::IDENTITY));
        assert!(Affine::scale(0.0, 1.0).invert().is_none());
    }

    #[test]
    fn viewport_map_identity_when_rects_match() {
        let r = Rect::new(10.0, 20.0, 100.0, 50.0);
        for align in [Align::None, Align::XMinYMin, Align::XMidYMid, Align::XMaxYMax] {
            let m = viewport_map(
                &r,
                &r,
                AspectRatio {
                    align,
                    meet_or_slice: MeetOrSlice::Meet,
                },
            );
            assert!(approx(&m, &Affine::IDENTITY), "{align:?} gave {m:?}");
        }
    }

    #[test]
    fn viewport_map_meet_centers_content() {
        let m = viewport_map(
            &Rect::new(0.0, 0.0, 10.0, 10.0),
            &Rect::new(0.0, 0.0, 100.0, 50.0),
            AspectRatio::default(),
        );
        assert_eq!(m, Affine::new(5.0, 0.0, 0.0, 5.0, 25.0, 0.0));
    }

    #[test]
    fn viewport_map_slice_and_none() {
        let logical = Rect::new(0.0, 0.0, 10.0, 10.0);
        let target = Rect::new(0.0, 0.0, 100.0, 50.0);
        let slice = viewport_map(
            &logical,
            &target,
            AspectRatio {
                align: Align::XMinYMin,
                meet_or_slice: MeetOrSlice::Slice,
            },
        );
        assert_eq!(slice, Affine::scale(10.0, 10.0));
        let stretch = viewport_map(
            &logical,
            &target,
            AspectRatio {
                align: Align::None,
                meet_or_slice: MeetOrSlice::Meet,
            },
        );
        assert_eq!(stretch, Affine::scale(10.0, 5.0));
    }

    #[test]
    fn viewport_map_zero_axis_only_translates() {
        let m = viewport_map(
            &Rect::new(5.0, 0.0, 0.0, 10.0),
            &Rect::new(0.0, 0.0, 40.0, 20.0),
            AspectRatio::default(),
        );
        let [a, _, _, d, e, _] = m.coeffs();
        assert_eq!((a, d, e), (1.0, 2.0, -5.0));
    }

    #[test]
    fn parses_preserve_aspect_ratio() {
        let p: AspectRatio = "xMaxYMin slice".parse().expect("valid");
        assert_eq!(p.align, Align::XMaxYMin);
        assert_eq!(p.meet_or_slice, MeetOrSlice::Slice);
        let deferred: AspectRatio = "defer none".parse().expect("valid");
        assert_eq!(deferred.align, Align::None);
        assert!("bogus".parse::<AspectRatio>().is_err());
    }
}
