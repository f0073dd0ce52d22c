//! WPS 1.0.0 documents: parsing of service responses and building of
//! Execute requests.
//!
//! Elements are matched by local name, so documents using unusual namespace
//! prefixes (or none) are accepted.

use client::{
    model::{
        AllowedValue, AllowedValues, Capabilities, ComplexFormats, DataKind, Format,
        InputDescriptor, Languages, LiteralType, OutputDescriptor, ProcessDescriptor,
        ProcessSummary,
    },
    transport::{ExceptionDetail, OutputPayload, PayloadContent, Status, StatusReport},
};
use roxmltree::{Document, Node};

mod request;
#[cfg(test)]
mod tests;

pub use request::execute_document;

pub const WPS_NS: &str = "http://www.opengis.net/wps/1.0.0";
pub const OWS_NS: &str = "http://www.opengis.net/ows/1.1";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// The code that services use to reject a request on access-control
/// grounds.
pub const ACCESS_FORBIDDEN: &str = "AccessForbidden";

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("not well-formed XML: {0}")]
    Parse(#[from] roxmltree::Error),
    #[error("expected a {expected} document, found {found}")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },
    #[error("{parent} has no {element}")]
    Missing {
        parent: &'static str,
        element: &'static str,
    },
    #[error("unexpected element {0}")]
    UnexpectedElement(String),
    #[error("invalid {attribute} {value:?}")]
    InvalidAttribute {
        attribute: &'static str,
        value: String,
    },
    /// The service answered with an exception report.
    #[error("service reported {} exception(s)", .0.len())]
    ExceptionReport(Vec<ExceptionDetail>),
}

fn children<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == name)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &'static str) -> Option<Node<'a, 'input>> {
    children(node, name).next()
}

fn text_of(node: Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

fn child_text(node: Node<'_, '_>, name: &'static str) -> Option<String> {
    child(node, name).and_then(text_of)
}

fn required_text(
    node: Node<'_, '_>,
    parent: &'static str,
    name: &'static str,
) -> Result<String, XmlError> {
    child_text(node, name).ok_or(XmlError::Missing {
        parent,
        element: name,
    })
}

/// Attribute by local name, whatever its namespace.
fn attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|attr| attr.name() == name)
        .map(|attr| attr.value())
}

fn bool_attribute(node: Node<'_, '_>, name: &'static str) -> Result<bool, XmlError> {
    match attribute(node, name).map(str::trim) {
        None => Ok(false),
        Some(value) if value.eq_ignore_ascii_case("true") || value == "1" => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") || value == "0" => Ok(false),
        Some(value) => Err(XmlError::InvalidAttribute {
            attribute: name,
            value: value.to_string(),
        }),
    }
}

fn occurs(node: Node<'_, '_>, name: &'static str) -> Result<u32, XmlError> {
    match attribute(node, name).map(str::trim) {
        None => Ok(1),
        Some("unbounded") => Ok(u32::MAX),
        Some(value) => value.parse().map_err(|_| XmlError::InvalidAttribute {
            attribute: name,
            value: value.to_string(),
        }),
    }
}

/// The root element, checked to be `expected`. An exception report is
/// returned as [XmlError::ExceptionReport].
fn root_element<'a, 'input>(
    doc: &'a Document<'input>,
    expected: &'static str,
) -> Result<Node<'a, 'input>, XmlError> {
    let root = doc.root_element();
    match root.tag_name().name() {
        name if name == expected => Ok(root),
        "ExceptionReport" => Err(XmlError::ExceptionReport(exceptions(root))),
        found => Err(XmlError::UnexpectedRoot {
            expected,
            found: found.to_string(),
        }),
    }
}

fn exceptions(report: Node<'_, '_>) -> Vec<ExceptionDetail> {
    children(report, "Exception")
        .map(|exception| ExceptionDetail {
            code: attribute(exception, "exceptionCode")
                .unwrap_or("NoApplicableCode")
                .to_string(),
            locator: attribute(exception, "locator").map(str::to_owned),
            text: children(exception, "ExceptionText")
                .filter_map(text_of)
                .collect::<Vec<_>>()
                .join("\n"),
        })
        .collect()
}

/// The exceptions of an OWS exception report, or `None` when `text` is not
/// one.
pub fn parse_exception_report(text: &str) -> Option<Vec<ExceptionDetail>> {
    let doc = Document::parse(text).ok()?;
    let root = doc.root_element();
    (root.tag_name().name() == "ExceptionReport").then(|| exceptions(root))
}

pub fn parse_capabilities(text: &str) -> Result<Capabilities, XmlError> {
    let doc = Document::parse(text)?;
    let root = root_element(&doc, "Capabilities")?;

    let identification = child(root, "ServiceIdentification");
    let processes = match child(root, "ProcessOfferings") {
        Some(offerings) => children(offerings, "Process")
            .map(process_summary)
            .collect::<Result<_, _>>()?,
        None => Vec::new(),
    };

    Ok(Capabilities {
        title: identification.and_then(|node| child_text(node, "Title")),
        abstract_: identification.and_then(|node| child_text(node, "Abstract")),
        processes,
        languages: child(root, "Languages").map(languages).unwrap_or_default(),
    })
}

fn process_summary(node: Node<'_, '_>) -> Result<ProcessSummary, XmlError> {
    Ok(ProcessSummary {
        identifier: required_text(node, "Process", "Identifier")?,
        title: child_text(node, "Title"),
        abstract_: child_text(node, "Abstract"),
    })
}

fn languages(node: Node<'_, '_>) -> Languages {
    Languages {
        default: child(node, "Default").and_then(|default| child_text(default, "Language")),
        supported: child(node, "Supported")
            .map(|supported| children(supported, "Language").filter_map(text_of).collect())
            .unwrap_or_default(),
    }
}

pub fn parse_process_descriptions(text: &str) -> Result<Vec<ProcessDescriptor>, XmlError> {
    let doc = Document::parse(text)?;
    let root = root_element(&doc, "ProcessDescriptions")?;
    children(root, "ProcessDescription")
        .map(process_description)
        .collect()
}

fn process_description(node: Node<'_, '_>) -> Result<ProcessDescriptor, XmlError> {
    let mut descriptor =
        ProcessDescriptor::new(required_text(node, "ProcessDescription", "Identifier")?);
    descriptor.title = child_text(node, "Title");
    descriptor.abstract_ = child_text(node, "Abstract");
    descriptor.version = attribute(node, "processVersion").map(str::to_owned);

    let store = bool_attribute(node, "storeSupported")?;
    let status = bool_attribute(node, "statusSupported")?;
    // Polling needs both a stored response and status updates.
    descriptor.supports_async = store && status;
    descriptor.supports_status = status;
    descriptor.supports_sync = true;

    if let Some(inputs) = child(node, "DataInputs") {
        descriptor.inputs = children(inputs, "Input")
            .map(input_descriptor)
            .collect::<Result<_, _>>()?;
    }
    if let Some(outputs) = child(node, "ProcessOutputs") {
        descriptor.outputs = children(outputs, "Output")
            .map(output_descriptor)
            .collect::<Result<_, _>>()?;
    }
    Ok(descriptor)
}

fn input_descriptor(node: Node<'_, '_>) -> Result<InputDescriptor, XmlError> {
    let identifier = required_text(node, "Input", "Identifier")?;

    let mut default_value = None;
    let mut allowed_values = AllowedValues::AnyValue;
    let kind = if let Some(literal) = child(node, "LiteralData") {
        default_value = child_text(literal, "DefaultValue");
        allowed_values = literal_allowed_values(literal);
        literal_kind(literal)
    } else if let Some(complex) = child(node, "ComplexData") {
        DataKind::Complex(complex_formats(complex)?)
    } else if let Some(bbox) = child(node, "BoundingBoxData") {
        DataKind::BoundingBox { crss: crss(bbox) }
    } else {
        return Err(XmlError::Missing {
            parent: "Input",
            element: "LiteralData, ComplexData or BoundingBoxData",
        });
    };

    let mut input = InputDescriptor::new(identifier, kind);
    input.title = child_text(node, "Title");
    input.abstract_ = child_text(node, "Abstract");
    input.min_occurs = occurs(node, "minOccurs")?;
    input.max_occurs = occurs(node, "maxOccurs")?;
    input.default_value = default_value;
    input.allowed_values = allowed_values;
    Ok(input)
}

fn output_descriptor(node: Node<'_, '_>) -> Result<OutputDescriptor, XmlError> {
    let identifier = required_text(node, "Output", "Identifier")?;
    let kind = if let Some(literal) = child(node, "LiteralOutput") {
        literal_kind(literal)
    } else if let Some(complex) = child(node, "ComplexOutput") {
        DataKind::Complex(complex_formats(complex)?)
    } else if let Some(bbox) = child(node, "BoundingBoxOutput") {
        DataKind::BoundingBox { crss: crss(bbox) }
    } else {
        return Err(XmlError::Missing {
            parent: "Output",
            element: "LiteralOutput, ComplexOutput or BoundingBoxOutput",
        });
    };

    let mut output = OutputDescriptor::new(identifier, kind);
    output.title = child_text(node, "Title");
    output.abstract_ = child_text(node, "Abstract");
    Ok(output)
}

fn literal_kind(node: Node<'_, '_>) -> DataKind {
    let subtype = child(node, "DataType")
        .and_then(|data_type| {
            text_of(data_type).or_else(|| attribute(data_type, "reference").map(str::to_owned))
        })
        .map(|data_type| LiteralType::from_data_type(&data_type))
        .unwrap_or(LiteralType::String);

    let mut uoms: Vec<String> = Vec::new();
    if let Some(node) = child(node, "UOMs") {
        let declared = children(node, "Default")
            .chain(children(node, "Supported"))
            .flat_map(|list| children(list, "UOM"))
            .filter_map(text_of);
        for uom in declared {
            if !uoms.contains(&uom) {
                uoms.push(uom);
            }
        }
    }
    DataKind::Literal { subtype, uoms }
}

fn literal_allowed_values(node: Node<'_, '_>) -> AllowedValues {
    let Some(allowed) = child(node, "AllowedValues") else {
        return AllowedValues::AnyValue;
    };
    let values: Vec<AllowedValue> = allowed
        .children()
        .filter(Node::is_element)
        .filter_map(|entry| match entry.tag_name().name() {
            "Value" => text_of(entry).map(AllowedValue::Value),
            "Range" => Some(AllowedValue::Range {
                min: child_text(entry, "MinimumValue"),
                max: child_text(entry, "MaximumValue"),
            }),
            _ => None,
        })
        .collect();
    if values.is_empty() {
        AllowedValues::AnyValue
    } else {
        AllowedValues::Values(values)
    }
}

fn complex_formats(node: Node<'_, '_>) -> Result<ComplexFormats, XmlError> {
    let default = child(node, "Default")
        .and_then(|default| child(default, "Format"))
        .map(format)
        .transpose()?;
    let supported = match child(node, "Supported") {
        Some(supported) => children(supported, "Format")
            .map(format)
            .collect::<Result<_, _>>()?,
        None => Vec::new(),
    };
    Ok(ComplexFormats { default, supported })
}

fn format(node: Node<'_, '_>) -> Result<Format, XmlError> {
    Ok(Format {
        mimetype: required_text(node, "Format", "MimeType")?,
        encoding: child_text(node, "Encoding"),
        schema: child_text(node, "Schema"),
    })
}

fn crss(node: Node<'_, '_>) -> Vec<String> {
    let mut crss: Vec<String> = Vec::new();
    for list in children(node, "Default").chain(children(node, "Supported")) {
        for crs in children(list, "CRS").filter_map(text_of) {
            if !crss.contains(&crs) {
                crss.push(crs);
            }
        }
    }
    crss
}

pub fn parse_execute_response(text: &str) -> Result<StatusReport, XmlError> {
    let doc = Document::parse(text)?;
    let root = root_element(&doc, "ExecuteResponse")?;

    let status = child(root, "Status").ok_or(XmlError::Missing {
        parent: "ExecuteResponse",
        element: "Status",
    })?;
    let mut report = status_report(status)?;
    report.status_location = attribute(root, "statusLocation").map(str::to_owned);
    if let Some(outputs) = child(root, "ProcessOutputs") {
        report.outputs = children(outputs, "Output")
            .map(|output| output_payload(output, text))
            .collect::<Result<_, _>>()?;
    }
    Ok(report)
}

fn status_report(node: Node<'_, '_>) -> Result<StatusReport, XmlError> {
    let state = node
        .children()
        .find(Node::is_element)
        .ok_or(XmlError::Missing {
            parent: "Status",
            element: "a process state",
        })?;

    let mut report = match state.tag_name().name() {
        "ProcessAccepted" => StatusReport::new(Status::Accepted),
        "ProcessStarted" | "ProcessPaused" => {
            let mut report = StatusReport::new(Status::Running);
            report.percent_complete = percent_completed(state)?;
            report
        }
        "ProcessSucceeded" => StatusReport::new(Status::Succeeded),
        "ProcessFailed" => {
            let mut report = StatusReport::new(Status::Failed);
            report.exceptions = child(state, "ExceptionReport")
                .map(exceptions)
                .unwrap_or_default();
            report.message = report
                .exceptions
                .first()
                .map(|exception| exception.text.clone())
                .filter(|text| !text.is_empty());
            return Ok(report);
        }
        other => return Err(XmlError::UnexpectedElement(other.to_string())),
    };
    report.message = text_of(state);
    Ok(report)
}

fn percent_completed(node: Node<'_, '_>) -> Result<Option<u8>, XmlError> {
    attribute(node, "percentCompleted")
        .map(|value| {
            value
                .trim()
                .parse::<u32>()
                .map(|percent| percent.min(100) as u8)
                .map_err(|_| XmlError::InvalidAttribute {
                    attribute: "percentCompleted",
                    value: value.to_string(),
                })
        })
        .transpose()
}

fn output_payload(node: Node<'_, '_>, text: &str) -> Result<OutputPayload, XmlError> {
    let identifier = required_text(node, "Output", "Identifier")?;

    if let Some(reference) = child(node, "Reference") {
        let href = attribute(reference, "href").ok_or(XmlError::Missing {
            parent: "Reference",
            element: "href",
        })?;
        return Ok(OutputPayload::reference(
            identifier,
            href,
            attribute(reference, "mimeType"),
        ));
    }

    let data = child(node, "Data").ok_or(XmlError::Missing {
        parent: "Output",
        element: "Data or Reference",
    })?;
    let (content, mimetype) = if let Some(literal) = child(data, "LiteralData") {
        let content = PayloadContent::Literal {
            values: vec![literal.text().unwrap_or_default().trim().to_string()],
            data_type: attribute(literal, "dataType").map(str::to_owned),
        };
        (content, None)
    } else if let Some(complex) = child(data, "ComplexData") {
        let content = PayloadContent::Embedded {
            data: inner_content(complex, text),
            encoding: attribute(complex, "encoding").map(str::to_owned),
        };
        (content, attribute(complex, "mimeType").map(str::to_owned))
    } else if let Some(bbox) = child(data, "BoundingBoxData") {
        let content = PayloadContent::Literal {
            values: vec![inner_content(bbox, text)],
            data_type: Some("BoundingBoxData".into()),
        };
        (content, None)
    } else {
        return Err(XmlError::Missing {
            parent: "Data",
            element: "LiteralData, ComplexData or BoundingBoxData",
        });
    };

    Ok(OutputPayload {
        identifier,
        content,
        mimetype,
    })
}

/// Content of an element: its text, or its markup verbatim when it holds
/// child elements.
fn inner_content(node: Node<'_, '_>, text: &str) -> String {
    if !node.children().any(|child| child.is_element()) {
        return node
            .children()
            .filter_map(|child| child.text())
            .collect::<String>()
            .trim()
            .to_string();
    }
    let (Some(first), Some(last)) = (node.first_child(), node.last_child()) else {
        return String::new();
    };
    text[first.range().start..last.range().end].trim().to_string()
}
