use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::GridfitError;

pub const CSS_DPI: f64 = 96.0;
pub const PPI: f64 = 72.0;
pub const IN_2_CM: f64 = 2.54;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LengthUnit {
    Px,
    Pt,
    Cm,
    In,
    Em,
    Rem,
    Ex,
    Percent,
}

impl LengthUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            LengthUnit::Px => "px",
            LengthUnit::Pt => "pt",
            LengthUnit::Cm => "cm",
            LengthUnit::In => "in",
            LengthUnit::Em => "em",
            LengthUnit::Rem => "rem",
            LengthUnit::Ex => "ex",
            LengthUnit::Percent => "%",
        }
    }

    /// Units that depend on context (font size, containing block) and are
    /// passed through untouched by [`convert_length`].
    pub fn is_contextual(self) -> bool {
        matches!(self, LengthUnit::Percent | LengthUnit::Em | LengthUnit::Ex)
    }

    /// Units per inch, for the absolute units.
    fn per_inch(self) -> Option<f64> {
        match self {
            LengthUnit::Px => Some(CSS_DPI),
            LengthUnit::Pt => Some(PPI),
            LengthUnit::Cm => Some(IN_2_CM),
            LengthUnit::In => Some(1.0),
            _ => None,
        }
    }
}

impl FromStr for LengthUnit {
    type Err = GridfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "px" => Ok(LengthUnit::Px),
            "pt" => Ok(LengthUnit::Pt),
            "cm" => Ok(LengthUnit::Cm),
            "in" => Ok(LengthUnit::In),
            "em" => Ok(LengthUnit::Em),
            "rem" => Ok(LengthUnit::Rem),
            "ex" => Ok(LengthUnit::Ex),
            "%" => Ok(LengthUnit::Percent),
            other => Err(GridfitError::Parse(other.to_string())),
        }
    }
}

impl std::fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthValue {
    /// `None` when the unit was found but the digits in front of it were not
    /// a number (e.g. `inherit` matches `in` with no magnitude).
    pub magnitude: Option<f64>,
    pub unit: LengthUnit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConvertedLength {
    Value(f64),
    Verbatim(String),
}

impl ConvertedLength {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConvertedLength::Value(v) => Some(*v),
            ConvertedLength::Verbatim(_) => None,
        }
    }
}

fn length_regex() -> &'static Regex {
    static LENGTH_RE: OnceLock<Regex> = OnceLock::new();
    LENGTH_RE.get_or_init(|| {
        Regex::new(r"(?P<val>[\d.]*?)(?P<unit>pt|px|em|rem|cm|ex|in|%)").expect("valid regex")
    })
}

pub fn parse_length(text: &str) -> Result<LengthValue, GridfitError> {
    if text == "auto" {
        return Ok(LengthValue {
            magnitude: Some(100.0),
            unit: LengthUnit::Percent,
        });
    }
    let caps = length_regex()
        .captures(text)
        .ok_or_else(|| GridfitError::Parse(text.to_string()))?;
    let unit = caps
        .name("unit")
        .map(|m| m.as_str())
        .unwrap_or_default()
        .parse::<LengthUnit>()?;
    let magnitude = caps.name("val").and_then(|m| m.as_str().parse::<f64>().ok());
    Ok(LengthValue { magnitude, unit })
}

/// Convert a CSS length string into `target`.
///
/// Empty input and lengths without a magnitude convert to zero. Contextual
/// units come back verbatim; `rem` and any non-absolute target are rejected.
pub fn convert_length(text: &str, target: LengthUnit) -> Result<ConvertedLength, GridfitError> {
    if text.is_empty() {
        return Ok(ConvertedLength::Value(0.0));
    }
    let parsed = parse_length(text)?;
    let Some(magnitude) = parsed.magnitude.filter(|m| *m != 0.0) else {
        return Ok(ConvertedLength::Value(0.0));
    };
    if parsed.unit == target {
        return Ok(ConvertedLength::Value(magnitude));
    }
    if parsed.unit.is_contextual() {
        return Ok(ConvertedLength::Verbatim(text.to_string()));
    }
    match (parsed.unit.per_inch(), target.per_inch()) {
        (Some(from), Some(to)) => Ok(ConvertedLength::Value(magnitude * (to / from))),
        _ => Err(GridfitError::UnsupportedUnit {
            from: parsed.unit.to_string(),
            to: target.to_string(),
        }),
    }
}
