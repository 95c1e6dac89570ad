//! # Style Module
//!
//! Attribute bags and the style resolution seam.
//!
//! ## Responsibilities
//! - **PropertyBag**: the key/value pairs carried by an element event.
//! - **StyleResolver**: turns an element's properties into a declared [`State`].
//! - **PresentationStyles**: the built-in resolver. It reads presentation
//!   attributes and inline `style` declarations; there is no selector cascade.

use tracing::warn;

use crate::parsers::{parse_color, parse_opacity, parse_transform, ColorValue};
use crate::state::{FillRule, Paint, State};
use crate::types::ColorSpace;
use crate::units::parse_length;

/// Attributes of one element, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBag {
    entries: Vec<(String, String)>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an earlier value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `xlink:href`, falling back to plain `href`.
    pub fn href(&self) -> Option<&str> {
        self.get("xlink:href").or_else(|| self.get("href"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = PropertyBag::new();
        for (k, v) in iter {
            bag.insert(k, v);
        }
        bag
    }
}

/// Declared state of an element plus the references it makes. References
/// are returned unresolved; the builder queues them with the registry.
#[derive(Debug, Clone, Default)]
pub struct ResolvedStyle {
    pub state: State,
    pub filter: Option<String>,
    pub clip_path: Option<String>,
    pub mask: Option<String>,
}

/// Style resolution seam between markup and the drawable tree.
pub trait StyleResolver {
    fn resolve(
        &self,
        element: &str,
        class: Option<&str>,
        id: Option<&str>,
        properties: &PropertyBag,
    ) -> ResolvedStyle;
}

/// Resolver for presentation attributes and inline `style` declarations.
#[derive(Debug, Clone, Default)]
pub struct PresentationStyles {
    /// User languages, matched against `systemLanguage`.
    pub languages: Vec<String>,
}

impl PresentationStyles {
    pub fn new(languages: Vec<String>) -> Self {
        Self { languages }
    }

    fn apply(&self, element: &str, name: &str, value: &str, out: &mut ResolvedStyle) {
        let state = &mut out.state;
        let ok = match name {
            "fill" => parse_paint(value).map(|p| state.paint.fill = Some(p)).is_some(),
            "stroke" => parse_paint(value).map(|p| state.paint.stroke = Some(p)).is_some(),
            "fill-opacity" => parse_opacity(value)
                .map(|v| state.paint.fill_opacity = Some(v))
                .is_some(),
            "stroke-opacity" => parse_opacity(value)
                .map(|v| state.paint.stroke_opacity = Some(v))
                .is_some(),
            "stroke-width" => parse_length(value)
                .ok()
                .filter(|l| !l.is_negative())
                .map(|l| state.paint.stroke_width = Some(l))
                .is_some(),
            "fill-rule" => match value.trim() {
                "nonzero" => {
                    state.paint.fill_rule = Some(FillRule::NonZero);
                    true
                }
                "evenodd" => {
                    state.paint.fill_rule = Some(FillRule::EvenOdd);
                    true
                }
                _ => false,
            },
            "color" => match parse_color(value) {
                Some(ColorValue::Color(c)) => {
                    state.paint.current_color = Some(c);
                    true
                }
                _ => false,
            },
            "opacity" => parse_opacity(value).map(|v| state.opacity = v).is_some(),
            "overflow" => match value.trim() {
                "visible" | "auto" => {
                    state.overflow = Some(true);
                    true
                }
                "hidden" | "scroll" => {
                    state.overflow = Some(false);
                    true
                }
                _ => false,
            },
            "color-interpolation-filters" => match value.trim() {
                "auto" => {
                    state.color_interpolation_filters = Some(ColorSpace::LinearRgb);
                    true
                }
                v => ColorSpace::parse(v)
                    .map(|cs| state.color_interpolation_filters = Some(cs))
                    .is_some(),
            },
            "transform" => parse_transform(value).map(|t| state.affine = t).is_some(),
            "filter" => {
                out.filter = reference_or_none(value);
                true
            }
            "clip-path" => {
                out.clip_path = reference_or_none(value);
                true
            }
            "mask" => {
                out.mask = reference_or_none(value);
                true
            }
            _ => true,
        };
        if !ok {
            warn!(element, attribute = name, value, "ignoring unparsable attribute");
        }
    }

    /// Evaluates conditional processing attributes.
    fn cond_true(&self, properties: &PropertyBag) -> bool {
        // No extensions are supported, and an empty list is false too.
        if properties.get("requiredExtensions").is_some() {
            return false;
        }
        match properties.get("systemLanguage") {
            Some(langs) => langs
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .any(|tag| self.matches_language(tag)),
            None => true,
        }
    }

    fn matches_language(&self, tag: &str) -> bool {
        self.languages.iter().any(|user| {
            let user = user.trim();
            user.eq_ignore_ascii_case(tag)
                || user
                    .split('-')
                    .next()
                    .is_some_and(|primary| primary.eq_ignore_ascii_case(tag))
                || tag
                    .split('-')
                    .next()
                    .is_some_and(|primary| primary.eq_ignore_ascii_case(user))
        })
    }
}

impl StyleResolver for PresentationStyles {
    fn resolve(
        &self,
        element: &str,
        _class: Option<&str>,
        _id: Option<&str>,
        properties: &PropertyBag,
    ) -> ResolvedStyle {
        let mut out = ResolvedStyle::default();
        for (name, value) in properties.iter() {
            if name != "style" {
                self.apply(element, name, value, &mut out);
            }
        }
        // Inline declarations override presentation attributes.
        if let Some(style) = properties.get("style") {
            for decl in style.split(';') {
                if let Some((name, value)) = decl.split_once(':') {
                    self.apply(element, name.trim(), value.trim(), &mut out);
                }
            }
        }
        out.state.cond_true = self.cond_true(properties);
        out
    }
}

fn parse_paint(value: &str) -> Option<Paint> {
    let value = value.trim();
    if value == "none" {
        return Some(Paint::None);
    }
    if value.starts_with("url(") {
        // Paint servers are not supported; use the fallback color if any.
        let fallback = value.split_once(')').map(|(_, rest)| rest.trim()).unwrap_or("");
        return if fallback.is_empty() {
            Some(Paint::None)
        } else {
            parse_paint(fallback)
        };
    }
    match parse_color(value)? {
        ColorValue::Color(c) => Some(Paint::Color(c)),
        ColorValue::CurrentColor => Some(Paint::CurrentColor),
    }
}

fn reference_or_none(value: &str) -> Option<String> {
    let value = value.trim();
    (value != "none" && !value.is_empty()).then(|| value.to_string())
}
