//! # Types Module
//!
//! Shared data types used across the engine.
//!
//! ## Responsibilities
//! - **Color**: RGBA color representation with tiny-skia conversion.
//! - **Rect / IntRect**: user-space and device-pixel rectangles.
//! - **CoordUnits / ColorSpace**: enumerations shared by clip paths, masks and filters.
//!
//! ## Key Types
//! - `Color`: Float-based RGBA color.
//! - `Rect`: `f64` rectangle in some coordinate system.
//! - `IntRect`: half-open pixel rectangle.
//! - `NodeId`: Type alias for arena indices (`usize`).

use serde::{Deserialize, Serialize};

/// A unique identifier for a node in the scene graph.
pub type NodeId = usize;

/// Straight (non-premultiplied) RGBA color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    /// Returns the color with its alpha multiplied by `opacity`.
    pub fn with_opacity(self, opacity: f32) -> Self {
        Self {
            a: (self.a * opacity).clamp(0.0, 1.0),
            ..self
        }
    }

    /// Converts to tiny-skia's float color, clamping out-of-range components.
    pub fn to_tiny_skia(&self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            self.a.clamp(0.0, 1.0),
        )
        .unwrap_or(tiny_skia::Color::TRANSPARENT)
    }

    /// Premultiplied 8-bit pixel value for direct buffer writes.
    pub fn to_premultiplied_u8(&self) -> tiny_skia::PremultipliedColorU8 {
        self.to_tiny_skia().premultiply().to_color_u8()
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_ltrb(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::from_ltrb(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::from_ltrb(
            self.x.max(other.x),
            self.y.max(other.y),
            self.right().min(other.right()),
            self.bottom().min(other.bottom()),
        );
        (!r.is_empty()).then_some(r)
    }

    /// Smallest pixel rectangle covering this one.
    pub fn to_int_rect(&self) -> IntRect {
        IntRect::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.right().ceil() as i32,
            self.bottom().ceil() as i32,
        )
    }

    pub fn to_tiny_skia(&self) -> Option<tiny_skia::Rect> {
        tiny_skia::Rect::from_xywh(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl IntRect {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> i32 {
        (self.x1 - self.x0).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y1 - self.y0).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    pub fn intersect(&self, other: &IntRect) -> IntRect {
        IntRect::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        )
    }

    pub fn union(&self, other: &IntRect) -> IntRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        IntRect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    pub fn to_rect(&self) -> Rect {
        Rect::from_ltrb(
            self.x0 as f64,
            self.y0 as f64,
            self.x1 as f64,
            self.y1 as f64,
        )
    }
}

/// Coordinate system for region attributes and content of clip paths,
/// masks and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordUnits {
    #[default]
    UserSpaceOnUse,
    ObjectBoundingBox,
}

impl CoordUnits {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "userSpaceOnUse" => Some(Self::UserSpaceOnUse),
            "objectBoundingBox" => Some(Self::ObjectBoundingBox),
            _ => None,
        }
    }
}

/// Color space pixel data is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    Srgb,
    #[default]
    LinearRgb,
}

impl ColorSpace {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "sRGB" => Some(Self::Srgb),
            "linearRGB" => Some(Self::LinearRgb),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_intersection_and_union() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersect(&b), Some(Rect::new(5.0, 5.0, 5.0, 5.0)));
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 15.0, 15.0));
        assert_eq!(a.intersect(&Rect::new(20.0, 20.0, 1.0, 1.0)), None);
    }

    #[test]
    fn int_rect_covers_fractional_rect() {
        let r = Rect::new(0.5, 1.25, 2.0, 2.0).to_int_rect();
        assert_eq!(r, IntRect::new(0, 1, 3, 4));
        assert_eq!(r.width(), 3);
        assert!(IntRect::new(4, 4, 4, 9).is_empty());
    }
}
