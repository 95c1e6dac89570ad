//! Length parsing and normalization.
//!
//! A [`Length`] keeps its unit until it is resolved against a DPI and an
//! ambient dimension (the viewport extent percentages refer to).

use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_DPI: f64 = 90.0;
pub const DEFAULT_FONT_SIZE: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    Number,
    Px,
    Pt,
    Pc,
    In,
    Cm,
    Mm,
    Em,
    Ex,
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    pub value: f64,
    pub unit: LengthUnit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid length `{0}`")]
pub struct LengthError(pub String);

/// What a length is resolved against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthContext {
    pub dpi: f64,
    /// Extent that `100%` maps to.
    pub ambient: f64,
    pub font_size: f64,
}

impl LengthContext {
    pub fn new(dpi: f64, ambient: f64) -> Self {
        Self {
            dpi,
            ambient,
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

/// DPI and viewport extents in effect where a length is used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitContext {
    pub dpi_x: f64,
    pub dpi_y: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

impl UnitContext {
    pub fn horizontal(&self, length: &Length) -> f64 {
        length.resolve(&LengthContext::new(self.dpi_x, self.viewport_width))
    }

    pub fn vertical(&self, length: &Length) -> f64 {
        length.resolve(&LengthContext::new(self.dpi_y, self.viewport_height))
    }

    /// Lengths without an axis (radii, stroke widths) resolve percentages
    /// against the normalized viewport diagonal.
    pub fn other(&self, length: &Length) -> f64 {
        let diagonal = ((self.viewport_width.powi(2) + self.viewport_height.powi(2)) / 2.0).sqrt();
        length.resolve(&LengthContext::new((self.dpi_x + self.dpi_y) / 2.0, diagonal))
    }
}

impl Length {
    pub const ZERO: Length = Length::new(0.0, LengthUnit::Number);

    pub const fn new(value: f64, unit: LengthUnit) -> Self {
        Self { value, unit }
    }

    pub const fn px(value: f64) -> Self {
        Self::new(value, LengthUnit::Px)
    }

    pub const fn percent(fraction: f64) -> Self {
        Self::new(fraction, LengthUnit::Percent)
    }

    /// Converts to user units. Percentages are stored as fractions.
    pub fn resolve(&self, ctx: &LengthContext) -> f64 {
        match self.unit {
            LengthUnit::Number | LengthUnit::Px => self.value,
            LengthUnit::Pt => self.value * ctx.dpi / 72.0,
            LengthUnit::Pc => self.value * ctx.dpi / 6.0,
            LengthUnit::In => self.value * ctx.dpi,
            LengthUnit::Cm => self.value * ctx.dpi / 2.54,
            LengthUnit::Mm => self.value * ctx.dpi / 25.4,
            LengthUnit::Em => self.value * ctx.font_size,
            LengthUnit::Ex => self.value * ctx.font_size / 2.0,
            LengthUnit::Percent => self.value * ctx.ambient,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.value < 0.0
    }
}

impl FromStr for Length {
    type Err = LengthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_length(s)
    }
}

/// Parses `<number><unit>?`. Percentages become fractions (`50%` is `0.5`).
pub fn parse_length(s: &str) -> Result<Length, LengthError> {
    let invalid = || LengthError(s.to_string());
    let parsed = svgtypes::Length::from_str(s.trim()).map_err(|_| invalid())?;
    if !parsed.number.is_finite() {
        return Err(invalid());
    }
    let unit = match parsed.unit {
        svgtypes::LengthUnit::None => LengthUnit::Number,
        svgtypes::LengthUnit::Px => LengthUnit::Px,
        svgtypes::LengthUnit::Pt => LengthUnit::Pt,
        svgtypes::LengthUnit::Pc => LengthUnit::Pc,
        svgtypes::LengthUnit::In => LengthUnit::In,
        svgtypes::LengthUnit::Cm => LengthUnit::Cm,
        svgtypes::LengthUnit::Mm => LengthUnit::Mm,
        svgtypes::LengthUnit::Em => LengthUnit::Em,
        svgtypes::LengthUnit::Ex => LengthUnit::Ex,
        svgtypes::LengthUnit::Percent => return Ok(Length::percent(parsed.number / 100.0)),
    };
    Ok(Length::new(parsed.number, unit))
}
