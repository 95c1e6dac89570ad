//! Attribute readers for primitive elements. Bad values are logged and
//! replaced by the default, matching the tolerant document builder.

use tracing::warn;

use crate::filters::Input;
use crate::parsers::{parse_color, parse_number, parse_number_list, parse_number_pair, ColorValue};
use crate::style::PropertyBag;
use crate::types::Color;

pub(crate) fn input(props: &PropertyBag, key: &str) -> Option<Input> {
    props.get(key).and_then(Input::parse)
}

pub(crate) fn number(element: &str, props: &PropertyBag, key: &str, default: f64) -> f64 {
    match props.get(key) {
        None => default,
        Some(raw) => parse_number(raw).unwrap_or_else(|| {
            warn!(element, attribute = key, value = raw, "expected a number");
            default
        }),
    }
}

pub(crate) fn number_pair(
    element: &str,
    props: &PropertyBag,
    key: &str,
    default: (f64, f64),
) -> (f64, f64) {
    match props.get(key) {
        None => default,
        Some(raw) => parse_number_pair(raw).unwrap_or_else(|| {
            warn!(element, attribute = key, value = raw, "expected one or two numbers");
            default
        }),
    }
}

pub(crate) fn numbers(element: &str, props: &PropertyBag, key: &str) -> Option<Vec<f64>> {
    let raw = props.get(key)?;
    let parsed = parse_number_list(raw);
    if parsed.is_none() {
        warn!(element, attribute = key, value = raw, "expected a number list");
    }
    parsed
}

/// Reads a color property; `currentColor` resolves against the `color`
/// attribute on the same element.
pub(crate) fn color(element: &str, props: &PropertyBag, key: &str, default: Color) -> Color {
    let current = props
        .get("color")
        .and_then(parse_color)
        .and_then(|c| match c {
            ColorValue::Color(c) => Some(c),
            ColorValue::CurrentColor => None,
        })
        .unwrap_or(Color::BLACK);
    match props.get(key).map(|raw| (raw, parse_color(raw))) {
        None => default,
        Some((_, Some(ColorValue::Color(c)))) => c,
        Some((_, Some(ColorValue::CurrentColor))) => current,
        Some((raw, None)) => {
            warn!(element, attribute = key, value = raw, "expected a color");
            default
        }
    }
}

pub(crate) fn keyword<T: Copy>(
    element: &str,
    props: &PropertyBag,
    key: &str,
    table: &[(&str, T)],
    default: T,
) -> T {
    match props.get(key) {
        None => default,
        Some(raw) => table
            .iter()
            .find(|(name, _)| *name == raw.trim())
            .map(|(_, v)| *v)
            .unwrap_or_else(|| {
                warn!(element, attribute = key, value = raw, "unknown keyword");
                default
            }),
    }
}
