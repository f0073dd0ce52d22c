use std::fmt::Display;

use client::transport::{
    ComplexData, ComplexInput, ExecuteRequest, ExecutionMode, RequestKind, TransportError,
    WireInput, WireOutput, WireValue,
};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use super::{OWS_NS, WPS_NS, XLINK_NS};

const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str =
    "http://www.opengis.net/wps/1.0.0 http://schemas.opengis.net/wps/1.0.0/wpsExecute_request.xsd";

type XmlWriter = Writer<Vec<u8>>;

/// Renders `request` as a WPS 1.0.0 Execute document.
///
/// Asynchronous requests ask the service to store the response and keep its
/// status updated, so that it can be polled. Bounding-box inputs are not
/// supported.
pub fn execute_document(
    request: &ExecuteRequest,
    version: &str,
    language: Option<&str>,
) -> Result<String, TransportError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    let mut execute = BytesStart::new("wps:Execute");
    execute.push_attribute(("service", "WPS"));
    execute.push_attribute(("version", version));
    if let Some(language) = language {
        execute.push_attribute(("language", language));
    }
    execute.extend_attributes([
        ("xmlns:wps", WPS_NS),
        ("xmlns:ows", OWS_NS),
        ("xmlns:xlink", XLINK_NS),
        ("xmlns:xsi", XSI_NS),
        ("xsi:schemaLocation", SCHEMA_LOCATION),
    ]);
    write(&mut writer, Event::Start(execute))?;
    text_element(&mut writer, "ows:Identifier", &request.process_id)?;

    if !request.inputs.is_empty() {
        write(&mut writer, Event::Start(BytesStart::new("wps:DataInputs")))?;
        for input in &request.inputs {
            input_element(&mut writer, input)?;
        }
        write(&mut writer, Event::End(BytesEnd::new("wps:DataInputs")))?;
    }
    response_form(&mut writer, request)?;
    write(&mut writer, Event::End(BytesEnd::new("wps:Execute")))?;

    String::from_utf8(writer.into_inner()).map_err(malformed)
}

fn malformed(err: impl Display) -> TransportError {
    TransportError::Malformed {
        request: RequestKind::Execute,
        message: format!("could not write execute document: {err}"),
    }
}

fn write(writer: &mut XmlWriter, event: Event<'_>) -> Result<(), TransportError> {
    writer.write_event(event).map_err(malformed)
}

/// Writes `<name>text</name>`, escaping `text`.
fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<(), TransportError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn input_element(writer: &mut XmlWriter, input: &WireInput) -> Result<(), TransportError> {
    if let WireValue::BoundingBox(_) = input.value {
        return Err(TransportError::Unsupported(format!(
            "bounding box input {:?}",
            input.identifier
        )));
    }

    write(writer, Event::Start(BytesStart::new("wps:Input")))?;
    text_element(writer, "ows:Identifier", &input.identifier)?;
    match &input.value {
        WireValue::Literal(value) => {
            write(writer, Event::Start(BytesStart::new("wps:Data")))?;
            text_element(writer, "wps:LiteralData", value)?;
            write(writer, Event::End(BytesEnd::new("wps:Data")))?;
        }
        WireValue::Complex(complex) => complex_element(writer, complex)?,
        WireValue::BoundingBox(_) => {}
    }
    write(writer, Event::End(BytesEnd::new("wps:Input")))
}

fn with_format(mut element: BytesStart<'static>, complex: &ComplexInput) -> BytesStart<'static> {
    for (name, value) in [
        ("mimeType", &complex.mimetype),
        ("encoding", &complex.encoding),
        ("schema", &complex.schema),
    ] {
        if let Some(value) = value {
            element.push_attribute((name, value.as_str()));
        }
    }
    element
}

fn complex_element(writer: &mut XmlWriter, complex: &ComplexInput) -> Result<(), TransportError> {
    match &complex.data {
        ComplexData::Reference(url) => {
            let mut reference = BytesStart::new("wps:Reference");
            reference.push_attribute(("xlink:href", url.as_str()));
            write(writer, Event::Empty(with_format(reference, complex)))
        }
        ComplexData::Embedded(content) => {
            write(writer, Event::Start(BytesStart::new("wps:Data")))?;
            write(
                writer,
                Event::Start(with_format(BytesStart::new("wps:ComplexData"), complex)),
            )?;
            write(writer, Event::Text(BytesText::new(content)))?;
            write(writer, Event::End(BytesEnd::new("wps:ComplexData")))?;
            write(writer, Event::End(BytesEnd::new("wps:Data")))
        }
    }
}

fn response_form(writer: &mut XmlWriter, request: &ExecuteRequest) -> Result<(), TransportError> {
    let asynchronous = request.mode == ExecutionMode::Async;
    if request.outputs.is_empty() && !asynchronous {
        return Ok(());
    }

    write(writer, Event::Start(BytesStart::new("wps:ResponseForm")))?;
    let mut document = BytesStart::new("wps:ResponseDocument");
    if asynchronous {
        document.push_attribute(("storeExecuteResponse", "true"));
        document.push_attribute(("status", "true"));
    }
    write(writer, Event::Start(document))?;
    for output in &request.outputs {
        output_element(writer, output)?;
    }
    write(writer, Event::End(BytesEnd::new("wps:ResponseDocument")))?;
    write(writer, Event::End(BytesEnd::new("wps:ResponseForm")))
}

fn output_element(writer: &mut XmlWriter, output: &WireOutput) -> Result<(), TransportError> {
    let mut element = BytesStart::new("wps:Output");
    if let Some(as_reference) = output.as_reference {
        element.push_attribute(("asReference", if as_reference { "true" } else { "false" }));
    }
    if let Some(mimetype) = &output.mimetype {
        element.push_attribute(("mimeType", mimetype.as_str()));
    }
    write(writer, Event::Start(element))?;
    text_element(writer, "ows:Identifier", &output.identifier)?;
    write(writer, Event::End(BytesEnd::new("wps:Output")))
}
