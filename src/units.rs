//! Dimension values – the `"<number><unit>"` strings templates use for sizes,
//! margins and indents, and their conversion to layout-engine points.

use std::fmt;
use std::str::FromStr;

/// Points per inch in the layout engine's base unit.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Unit of a [`Dimension`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    In,
    Em,
    Pt,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::In => "in",
            Unit::Em => "em",
            Unit::Pt => "pt",
        }
    }

    /// Whether the unit resolves without knowing a font size.
    pub fn is_absolute(self) -> bool {
        !matches!(self, Unit::Em)
    }
}

/// A parsed `"<number><unit>"` value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimension {
    pub value: f32,
    pub unit: Unit,
}

/// The string did not match the dimension grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDimensionError(pub String);

impl fmt::Display for ParseDimensionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} is not a <number><unit> dimension (units: in, em, pt)", self.0)
    }
}

impl std::error::Error for ParseDimensionError {}

impl Dimension {
    pub const fn new(value: f32, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub const fn inches(value: f32) -> Self {
        Self::new(value, Unit::In)
    }

    pub const fn points(value: f32) -> Self {
        Self::new(value, Unit::Pt)
    }

    /// Resolve to points. `em` is relative to `font_size_pt`.
    pub fn to_points(self, font_size_pt: f32) -> f32 {
        match self.unit {
            Unit::In => self.value * POINTS_PER_INCH,
            Unit::Pt => self.value,
            Unit::Em => self.value * font_size_pt,
        }
    }

    /// Convert an absolute dimension to whole engine units, truncating any
    /// fractional point. Returns `None` for font-relative units.
    pub fn to_engine_units(self) -> Option<u32> {
        if !self.unit.is_absolute() {
            return None;
        }
        // Multiply in f64 so e.g. 0.75in lands on exactly 54.
        let pts = match self.unit {
            Unit::In => f64::from(self.value) * f64::from(POINTS_PER_INCH),
            _ => f64::from(self.value),
        };
        Some(pts.max(0.0).trunc() as u32)
    }
}

impl FromStr for Dimension {
    type Err = ParseDimensionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDimensionError(s.to_string());
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(err)?;
        let (number, unit) = trimmed.split_at(split);

        // Digits with at most one decimal point and at least one digit.
        if number.is_empty()
            || number.matches('.').count() > 1
            || !number.chars().any(|c| c.is_ascii_digit())
        {
            return Err(err());
        }
        let value: f32 = number.parse().map_err(|_| err())?;
        let unit = match unit {
            "in" => Unit::In,
            "em" => Unit::Em,
            "pt" => Unit::Pt,
            _ => return Err(err()),
        };
        Ok(Dimension { value, unit })
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(s: &str) -> Dimension {
        s.parse().unwrap()
    }

    #[test]
    fn parses_supported_units() {
        assert_eq!(dim("12pt"), Dimension::points(12.0));
        assert_eq!(dim("0.75in"), Dimension::inches(0.75));
        assert_eq!(dim("0.5em"), Dimension::new(0.5, Unit::Em));
        assert_eq!(dim(".5in"), Dimension::inches(0.5));
    }

    #[test]
    fn rejects_malformed_dimensions() {
        for bad in ["0", "12", "pt", "12px", "1.2.3in", "-1in", "1 in", "", "in12"] {
            assert!(bad.parse::<Dimension>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn converts_inches_to_engine_units() {
        assert_eq!(dim("1in").to_engine_units(), Some(72));
        assert_eq!(dim("0.75in").to_engine_units(), Some(54));
        assert_eq!(dim("6in").to_engine_units(), Some(432));
        assert_eq!(dim("9in").to_engine_units(), Some(648));
    }

    #[test]
    fn engine_units_truncate() {
        assert_eq!(dim("0.3in").to_engine_units(), Some(21)); // 21.6
        assert_eq!(dim("10.9pt").to_engine_units(), Some(10));
        assert_eq!(dim("2em").to_engine_units(), None);
    }

    #[test]
    fn em_resolves_against_font_size() {
        assert!((dim("0.5em").to_points(12.0) - 6.0).abs() < f32::EPSILON);
        assert!((dim("0.25in").to_points(12.0) - 18.0).abs() < f32::EPSILON);
    }

    #[test]
    fn display_round_trips_authoring_form() {
        assert_eq!(dim("0.25in").to_string(), "0.25in");
        assert_eq!(dim("18pt").to_string(), "18pt");
    }
}
