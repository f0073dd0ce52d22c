//! Values passed into and returned from process executions.

use std::{
    any::Any,
    fmt,
    io::Read,
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A literal value in its native form.
#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl fmt::Display for LiteralValue {
    /// Formats the value as it is sent on the wire.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use LiteralValue::*;
        match self {
            String(v) => f.write_str(v),
            Integer(v) => write!(f, "{v}"),
            Float(v) => write!(f, "{v}"),
            Boolean(v) => write!(f, "{v}"),
            Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
            DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

macro_rules! impl_literal_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for LiteralValue {
                fn from(value: $t) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

impl_literal_from!(
    String => String,
    &str => String,
    i64 => Integer,
    i32 => Integer,
    u32 => Integer,
    f64 => Float,
    f32 => Float,
    bool => Boolean,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
);

/// A value supplied by a caller for a single occurrence of a process input.
#[derive(Clone, Debug, PartialEq)]
pub enum InputValue {
    /// A literal. For complex inputs a string may hold inline content, a
    /// local path or a URL.
    Literal(LiteralValue),
    /// A path on the local filesystem.
    Path(PathBuf),
    /// In-memory content, always embedded in the request.
    Content(Vec<u8>),
}

impl InputValue {
    /// Reads all of `reader` into in-memory content.
    pub fn from_reader(mut reader: impl Read) -> std::io::Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Self::Content(buf))
    }

    /// The string form of a string literal or path, if this is one.
    pub fn as_locator(&self) -> Option<String> {
        match self {
            Self::Literal(LiteralValue::String(s)) => Some(s.clone()),
            Self::Path(path) => Some(path.to_string_lossy().into_owned()),
            _ => None,
        }
    }
}

macro_rules! impl_input_from_literal {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for InputValue {
                fn from(value: $t) -> Self {
                    Self::Literal(value.into())
                }
            }
        )*
    };
}

impl_input_from_literal!(
    String,
    &str,
    i64,
    i32,
    u32,
    f64,
    f32,
    bool,
    NaiveDate,
    NaiveTime,
    NaiveDateTime,
    LiteralValue,
);

impl From<PathBuf> for InputValue {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for InputValue {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_owned())
    }
}

impl From<Vec<u8>> for InputValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Content(value)
    }
}

/// A decoded raster band.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    /// Row-major samples.
    pub samples: Vec<f64>,
    /// `[origin_x, origin_y, pixel_width, pixel_height]`, when georeferenced.
    pub transform: Option<[f64; 4]>,
}

/// A value produced by a converter backed by an optional library.
pub struct Opaque {
    type_name: &'static str,
    inner: Box<dyn Any>,
}

impl Opaque {
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: Box::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque<{}>", self.type_name)
    }
}

impl PartialEq for Opaque {
    /// Opaque values never compare equal.
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

/// An output value, either raw or converted into a native object.
#[derive(Debug, PartialEq)]
pub enum Value {
    /// No data was returned for the output.
    Empty,
    Literal(LiteralValue),
    /// URL of a by-reference output.
    Reference(String),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Image(image::DynamicImage),
    Raster(Raster),
    Object(Opaque),
    List(Vec<Value>),
}

impl Value {
    /// Applies [delist] to a list value, leaving any other value unchanged.
    pub fn delisted(self) -> Value {
        match self {
            Value::List(values) => delist(values),
            other => other,
        }
    }

    pub fn as_literal(&self) -> Option<&LiteralValue> {
        match self {
            Value::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Literal(LiteralValue::String(s)) | Value::Text(s) | Value::Reference(s) => {
                Some(s)
            }
            _ => None,
        }
    }
}

impl From<LiteralValue> for Value {
    fn from(value: LiteralValue) -> Self {
        Value::Literal(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => f.write_str("None"),
            Value::Literal(LiteralValue::String(s)) => write!(f, "{s:?}"),
            Value::Literal(v) => write!(f, "{v}"),
            Value::Reference(url) => f.write_str(url),
            Value::Text(text) => write!(f, "{text:?}"),
            Value::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::Json(json) => write!(f, "{json}"),
            Value::Image(image) => write!(f, "<image {}x{}>", image.width(), image.height()),
            Value::Raster(raster) => write!(f, "<raster {}x{}>", raster.width, raster.height),
            Value::Object(object) => write!(f, "<{}>", object.type_name()),
            Value::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Collapses a one-element sequence to its bare element; any other sequence
/// becomes a [Value::List] unchanged.
pub fn delist(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        if let Some(value) = values.pop() {
            return value;
        }
    }
    Value::List(values)
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[gtest]
    fn delist_single_element_yields_element() {
        expect_that!(
            delist(vec![Value::Literal(3i64.into())]),
            eq(&Value::Literal(LiteralValue::Integer(3)))
        );
    }

    #[gtest]
    fn delist_several_elements_yields_list() {
        expect_that!(
            delist(vec![Value::Literal(1i64.into()), Value::Literal(2i64.into())]),
            eq(&Value::List(vec![
                Value::Literal(LiteralValue::Integer(1)),
                Value::Literal(LiteralValue::Integer(2)),
            ]))
        );
    }

    #[gtest]
    fn delist_empty_yields_empty_list() {
        expect_that!(delist(vec![]), eq(&Value::List(vec![])));
    }

    #[gtest]
    fn delisted_leaves_non_sequence_unchanged() {
        expect_that!(
            Value::Text("one".into()).delisted(),
            eq(&Value::Text("one".into()))
        );
    }

    #[gtest]
    fn literal_wire_formatting() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
        let time = NaiveTime::from_hms_opt(13, 5, 9).expect("valid time");
        expect_that!(LiteralValue::from(true).to_string(), eq("true"));
        expect_that!(LiteralValue::from(3.5f64).to_string(), eq("3.5"));
        expect_that!(LiteralValue::Date(date).to_string(), eq("2024-02-29"));
        expect_that!(LiteralValue::Time(time).to_string(), eq("13:05:09"));
        expect_that!(
            LiteralValue::DateTime(date.and_time(time)).to_string(),
            eq("2024-02-29T13:05:09")
        );
    }

    #[gtest]
    fn input_value_from_reader_is_content() -> Result<()> {
        let value = InputValue::from_reader(&b"abc"[..])?;
        expect_that!(value, eq(&InputValue::Content(b"abc".to_vec())));
        Ok(())
    }
}
