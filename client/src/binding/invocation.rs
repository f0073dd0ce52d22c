use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::value::{InputValue, LiteralValue};

/// The value given for one parameter: a single value, or several for inputs
/// that accept more than one occurrence.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    One(InputValue),
    Many(Vec<InputValue>),
}

impl Arg {
    pub fn into_values(self) -> Vec<InputValue> {
        match self {
            Arg::One(value) => vec![value],
            Arg::Many(values) => values,
        }
    }
}

macro_rules! impl_arg_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Arg {
                fn from(value: $t) -> Self {
                    Arg::One(value.into())
                }
            }
        )*
    };
}

impl_arg_from!(
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
    PathBuf,
    &Path,
);

impl From<InputValue> for Arg {
    fn from(value: InputValue) -> Self {
        Arg::One(value)
    }
}

impl<T: Into<InputValue>> From<Vec<T>> for Arg {
    fn from(value: Vec<T>) -> Self {
        Arg::Many(value.into_iter().map(Into::into).collect())
    }
}

/// Requested form of one output. `None` fields leave the choice to the
/// service.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OutputFormat {
    pub as_ref: Option<bool>,
    pub mimetype: Option<String>,
}

/// Per-output overrides of how outputs are returned. When given, exactly
/// these outputs are requested.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OutputFormats(Vec<(String, OutputFormat)>);

impl OutputFormats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, identifier: &str, as_ref: Option<bool>, mimetype: Option<&str>) -> Self {
        self.set(identifier, as_ref, mimetype);
        self
    }

    /// Sets the format of `identifier`, replacing any earlier setting.
    pub fn set(&mut self, identifier: &str, as_ref: Option<bool>, mimetype: Option<&str>) {
        let format = OutputFormat {
            as_ref,
            mimetype: mimetype.map(str::to_owned),
        };
        match self.0.iter_mut().find(|(id, _)| id == identifier) {
            Some((_, existing)) => *existing = format,
            None => self.0.push((identifier.to_string(), format)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputFormat)> {
        self.0.iter().map(|(id, format)| (id.as_str(), format))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Arguments for a single call of a [super::Binding].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Invocation {
    pub(super) positional: Vec<Arg>,
    pub(super) keyword: Vec<(String, Arg)>,
    pub(super) output_formats: Option<OutputFormats>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Arg>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Adds a keyword argument. `name` may be the sanitized parameter name
    /// or the service's identifier.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }

    pub fn output_formats(mut self, formats: OutputFormats) -> Self {
        self.output_formats = Some(formats);
        self
    }
}

/// Arguments resolved against a binding's parameter list, in parameter
/// order, with defaults applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundArgs {
    pub values: Vec<(String, Vec<InputValue>)>,
    pub output_formats: Option<OutputFormats>,
}

impl BoundArgs {
    pub fn get(&self, identifier: &str) -> Option<&[InputValue]> {
        self.values
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, values)| values.as_slice())
    }
}
