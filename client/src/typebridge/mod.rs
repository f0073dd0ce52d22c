//! Conversion between native values and their wire representation, and the
//! policy for embedding complex inputs into requests.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::{
    error::TypeCoercionError,
    model::{DataKind, LiteralType},
    transport::{ComplexData, ComplexInput, WireValue},
    value::LiteralValue,
};

mod embed;

pub use embed::{
    BINARY_MIMETYPES, DAP_MIMETYPE, embed, fix_url, guess_mimetype, is_embeddable,
    is_localhost, names_location,
};

/// A value ready to be put on the wire. Complex values must already be
/// resolved into embedded content or a reference.
#[derive(Clone, Debug, PartialEq)]
pub enum WireSource {
    Literal(LiteralValue),
    Content(String),
    Reference(String),
}

impl WireSource {
    fn into_text(self) -> String {
        match self {
            WireSource::Literal(value) => value.to_string(),
            WireSource::Content(text) | WireSource::Reference(text) => text,
        }
    }
}

/// Encoding, mimetype and schema of a complex value.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WireFormat {
    pub encoding: Option<String>,
    pub mimetype: Option<String>,
    pub schema: Option<String>,
}

/// Converts `value` into the wire representation of `kind`. Bounding boxes
/// pass through unchanged.
pub fn to_wire(value: WireSource, kind: &DataKind, format: WireFormat) -> WireValue {
    match kind {
        DataKind::Literal { .. } => WireValue::Literal(value.into_text()),
        DataKind::Complex(_) => {
            let data = match value {
                WireSource::Reference(url) => ComplexData::Reference(url),
                other => ComplexData::Embedded(other.into_text()),
            };
            WireValue::Complex(ComplexInput {
                data,
                mimetype: format.mimetype,
                encoding: format.encoding,
                schema: format.schema,
            })
        }
        DataKind::BoundingBox { .. } => WireValue::BoundingBox(value.into_text()),
    }
}

/// Parses a wire value according to `kind`. Non-literal kinds are kept as
/// strings.
pub fn from_wire(
    value: Option<&str>,
    kind: &DataKind,
) -> Result<Option<LiteralValue>, TypeCoercionError> {
    let Some(value) = value else {
        return Ok(None);
    };
    match kind {
        DataKind::Literal { subtype, .. } => parse_literal(value, *subtype).map(Some),
        DataKind::Complex(_) | DataKind::BoundingBox { .. } => {
            Ok(Some(LiteralValue::String(value.to_string())))
        }
    }
}

/// Parses a single literal of the given subtype.
pub fn parse_literal(value: &str, subtype: LiteralType) -> Result<LiteralValue, TypeCoercionError> {
    let err = || TypeCoercionError {
        subtype: subtype.to_string(),
        value: value.to_string(),
    };
    let trimmed = value.trim();

    Ok(match subtype {
        LiteralType::String => LiteralValue::String(value.to_string()),
        LiteralType::Integer => LiteralValue::Integer(trimmed.parse().map_err(|_| err())?),
        LiteralType::Float | LiteralType::Angle => {
            LiteralValue::Float(trimmed.parse().map_err(|_| err())?)
        }
        LiteralType::Boolean => LiteralValue::Boolean(parse_bool(trimmed).ok_or_else(err)?),
        LiteralType::Date => LiteralValue::Date(parse_date(trimmed).ok_or_else(err)?),
        LiteralType::Time => LiteralValue::Time(parse_time(trimmed).ok_or_else(err)?),
        LiteralType::DateTime => {
            LiteralValue::DateTime(parse_datetime(trimmed).ok_or_else(err)?)
        }
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses a date and time. Values with a UTC offset are converted to UTC;
/// values without one are kept as given.
fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(value).map(|dt| dt.date()))
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
        .or_else(|| parse_datetime(value).map(|dt| dt.time()))
}
