//! Descriptions of the processes offered by a service, as reported by its
//! transport.

use std::fmt;

use serde::Serialize;
use strum_macros::Display;

/// Subtype of a literal input or output.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum LiteralType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Time,
    DateTime,
    Angle,
}

impl LiteralType {
    /// Resolves a server data type name (e.g. `"integer"`, `"xs:double"` or
    /// `"http://www.w3.org/TR/xmlschema-2/#dateTime"`) to a subtype. Unknown
    /// names resolve to [LiteralType::String].
    pub fn from_data_type(data_type: &str) -> Self {
        let name = data_type
            .rsplit(['#', ':'])
            .next()
            .unwrap_or(data_type)
            .trim()
            .to_ascii_lowercase();

        use LiteralType::*;
        match name.as_str() {
            "string" | "anyuri" | "normalizedstring" | "token" => String,
            "integer" | "int" | "long" | "short" | "byte" | "positiveinteger"
            | "nonnegativeinteger" | "negativeinteger" | "nonpositiveinteger"
            | "unsignedint" | "unsignedlong" | "unsignedshort" => Integer,
            "float" | "double" | "decimal" => Float,
            "boolean" | "bool" => Boolean,
            "datetime" => DateTime,
            "time" => Time,
            "date" => Date,
            "angle" => Angle,
            other => {
                // Order matters: "datetime" contains both "date" and "time".
                if other.contains("string") {
                    String
                } else if other.contains("int") {
                    Integer
                } else if other.contains("float") || other.contains("double") {
                    Float
                } else if other.contains("bool") {
                    Boolean
                } else if other.contains("datetime") {
                    DateTime
                } else if other.contains("time") {
                    Time
                } else if other.contains("date") {
                    Date
                } else {
                    String
                }
            }
        }
    }
}

/// A format that a complex input or output can be exchanged in.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Format {
    pub mimetype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl Format {
    pub fn new(mimetype: impl Into<String>) -> Self {
        Self {
            mimetype: mimetype.into(),
            ..Default::default()
        }
    }
}

/// Formats supported by a complex input or output.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ComplexFormats {
    pub default: Option<Format>,
    pub supported: Vec<Format>,
}

impl ComplexFormats {
    /// Supported mimetypes, the default first, without duplicates.
    pub fn mimetypes(&self) -> Vec<&str> {
        let mut mimetypes: Vec<&str> = Vec::new();
        for format in self.default.iter().chain(self.supported.iter()) {
            if !mimetypes.contains(&format.mimetype.as_str()) {
                mimetypes.push(&format.mimetype);
            }
        }
        mimetypes
    }

    pub fn default_mimetype(&self) -> Option<&str> {
        self.default
            .as_ref()
            .or_else(|| self.supported.first())
            .map(|format| format.mimetype.as_str())
    }

    pub fn default_encoding(&self) -> Option<&str> {
        self.default.as_ref().and_then(|format| format.encoding.as_deref())
    }

    pub fn default_schema(&self) -> Option<&str> {
        self.default.as_ref().and_then(|format| format.schema.as_deref())
    }
}

/// The three kinds of data a process parameter can carry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataKind {
    Literal {
        subtype: LiteralType,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        uoms: Vec<String>,
    },
    Complex(ComplexFormats),
    BoundingBox { crss: Vec<String> },
}

impl DataKind {
    pub fn literal(subtype: LiteralType) -> Self {
        Self::Literal {
            subtype,
            uoms: Vec::new(),
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Complex(_))
    }
}

/// One entry of an enumeration constraint.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AllowedValue {
    Value(String),
    Range {
        min: Option<String>,
        max: Option<String>,
    },
}

impl fmt::Display for AllowedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.write_str(value),
            Self::Range { min, max } => write!(
                f,
                "{}..{}",
                min.as_deref().unwrap_or(""),
                max.as_deref().unwrap_or("")
            ),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub enum AllowedValues {
    /// Unconstrained.
    #[default]
    AnyValue,
    Values(Vec<AllowedValue>),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InputDescriptor {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_: Option<String>,
    pub kind: DataKind,
    pub min_occurs: u32,
    pub max_occurs: u32,
    /// Default as sent by the server; typed through
    /// [crate::typebridge::from_wire] against `kind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub allowed_values: AllowedValues,
}

impl InputDescriptor {
    /// Creates a required, single valued input without a default.
    pub fn new(identifier: impl Into<String>, kind: DataKind) -> Self {
        Self {
            identifier: identifier.into(),
            title: None,
            abstract_: None,
            kind,
            min_occurs: 1,
            max_occurs: 1,
            default_value: None,
            allowed_values: AllowedValues::AnyValue,
        }
    }

    pub fn is_optional(&self) -> bool {
        self.min_occurs == 0
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OutputDescriptor {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_: Option<String>,
    pub kind: DataKind,
}

impl OutputDescriptor {
    pub fn new(identifier: impl Into<String>, kind: DataKind) -> Self {
        Self {
            identifier: identifier.into(),
            title: None,
            abstract_: None,
            kind,
        }
    }
}

/// Full description of a single process.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ProcessDescriptor {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub inputs: Vec<InputDescriptor>,
    pub outputs: Vec<OutputDescriptor>,
    /// Whether the process can store its response and be polled.
    pub supports_async: bool,
    pub supports_sync: bool,
    /// Whether the process updates its status while running.
    pub supports_status: bool,
}

impl ProcessDescriptor {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: None,
            abstract_: None,
            version: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            supports_async: false,
            supports_sync: true,
            supports_status: false,
        }
    }

    pub fn input(&self, identifier: &str) -> Option<&InputDescriptor> {
        self.inputs.iter().find(|input| input.identifier == identifier)
    }

    pub fn output(&self, identifier: &str) -> Option<&OutputDescriptor> {
        self.outputs
            .iter()
            .find(|output| output.identifier == identifier)
    }

    /// Whether the named output is complex data, which decides whether it is
    /// requested by reference by default. Unknown outputs are not complex.
    pub fn output_is_complex(&self, identifier: &str) -> bool {
        self.output(identifier)
            .map(|output| output.kind.is_complex())
            .unwrap_or(false)
    }
}

/// Lightweight listing entry from the capabilities document.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ProcessSummary {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_: Option<String>,
}

impl ProcessSummary {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: None,
            abstract_: None,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Languages {
    pub default: Option<String>,
    pub supported: Vec<String>,
}

/// The service's capabilities document.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Capabilities {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_: Option<String>,
    pub processes: Vec<ProcessSummary>,
    pub languages: Languages,
}
