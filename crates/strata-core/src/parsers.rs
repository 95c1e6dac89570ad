//! Attribute value parsers: numbers, lists, colors, transform lists.
//!
//! Tokenizing is done by `svgtypes`; this module converts its values into
//! the crate's types.

use std::str::FromStr;

use svgtypes::NumberListParser;

use crate::transform::Affine;
use crate::types::Color;

pub fn parse_number(s: &str) -> Option<f64> {
    svgtypes::Number::from_str(s.trim())
        .ok()
        .map(|n| n.0)
        .filter(|v| v.is_finite())
}

/// Numbers separated by whitespace and/or commas.
pub fn parse_number_list(s: &str) -> Option<Vec<f64>> {
    NumberListParser::from(s)
        .map(|n| n.ok().filter(|v| v.is_finite()))
        .collect()
}

/// One or two numbers; a single value is used for both.
pub fn parse_number_pair(s: &str) -> Option<(f64, f64)> {
    match parse_number_list(s)?.as_slice() {
        [v] => Some((*v, *v)),
        [x, y] => Some((*x, *y)),
        _ => None,
    }
}

/// `0.5` or `50%`, clamped to `0..=1`.
pub fn parse_opacity(s: &str) -> Option<f32> {
    let s = s.trim();
    let value = match s.strip_suffix('%') {
        Some(p) => parse_number(p)? / 100.0,
        None => parse_number(s)?,
    };
    Some(value.clamp(0.0, 1.0) as f32)
}

/// Parsed color value; `currentColor` stays symbolic until draw time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorValue {
    Color(Color),
    CurrentColor,
}

/// Hex, functional and named CSS colors, plus `currentColor`.
pub fn parse_color(s: &str) -> Option<ColorValue> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("currentColor") {
        return Some(ColorValue::CurrentColor);
    }
    let c = svgtypes::Color::from_str(s).ok()?;
    Some(ColorValue::Color(Color::from_rgba8(c.red, c.green, c.blue, c.alpha)))
}

/// Parses a transform list such as `translate(10 20) rotate(45)`.
///
/// Functions apply right to left: the last one listed touches the
/// coordinates first.
pub fn parse_transform(s: &str) -> Option<Affine> {
    let t = svgtypes::Transform::from_str(s).ok()?;
    let affine = Affine::new(t.a, t.b, t.c, t.d, t.e, t.f);
    affine.is_finite().then_some(affine)
}

/// `true`/`false` style keywords used by `preserveAlpha` and `stitchTiles`.
pub fn parse_keyword_flag(s: &str, on: &str, off: &str) -> Option<bool> {
    match s.trim() {
        v if v == on => Some(true),
        v if v == off => Some(false),
        _ => None,
    }
}
