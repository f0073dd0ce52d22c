use client::{
    model::{
        AllowedValue, AllowedValues, ComplexFormats, DataKind, Format, Languages, LiteralType,
    },
    transport::{
        ComplexData, ComplexInput, ExecuteRequest, ExecutionMode, PayloadContent, Status,
        TransportError, WireInput, WireOutput, WireValue,
    },
};
use googletest::prelude::*;

use super::*;

const CAPABILITIES: &str = include_str!("../../testdata/capabilities.xml");
const DESCRIBE: &str = include_str!("../../testdata/describe.xml");
const EXECUTE_STARTED: &str = include_str!("../../testdata/execute_started.xml");
const EXECUTE_SUCCEEDED: &str = include_str!("../../testdata/execute_succeeded.xml");
const EXECUTE_FAILED: &str = include_str!("../../testdata/execute_failed.xml");
const EXCEPTION_FORBIDDEN: &str = include_str!("../../testdata/exception_forbidden.xml");

#[gtest]
fn test_parse_capabilities() -> googletest::Result<()> {
    let capabilities = parse_capabilities(CAPABILITIES)?;

    expect_that!(capabilities.title.as_deref(), some(eq("Emu")));
    expect_that!(
        capabilities.abstract_.as_deref(),
        some(eq("WPS processes for testing and demos."))
    );
    expect_that!(
        capabilities
            .processes
            .iter()
            .map(|process| process.identifier.as_str())
            .collect::<Vec<_>>(),
        elements_are![eq(&"hello"), eq(&"inout"), eq(&"wordcounter")]
    );
    expect_that!(capabilities.processes[1].abstract_, none());
    expect_that!(
        capabilities.languages,
        eq(&Languages {
            default: Some("en-US".into()),
            supported: vec!["en-US".into(), "fr-CA".into()],
        })
    );
    Ok(())
}

#[gtest]
fn test_exception_report_instead_of_capabilities() {
    let result = parse_capabilities(EXCEPTION_FORBIDDEN);

    expect_that!(
        result,
        err(matches_pattern!(XmlError::ExceptionReport(elements_are![
            matches_pattern!(ExceptionDetail {
                code: eq("AccessForbidden"),
                locator: some(eq("AccessForbidden")),
                text: eq("Access to this service is forbidden."),
            })
        ])))
    );
}

#[gtest]
fn test_unexpected_document() {
    let result = parse_capabilities(DESCRIBE);

    expect_that!(
        result,
        err(displays_as(eq(
            "expected a Capabilities document, found ProcessDescriptions"
        )))
    );
}

#[gtest]
fn test_not_xml() {
    expect_that!(
        parse_execute_response("<<<"),
        err(matches_pattern!(XmlError::Parse(_)))
    );
}

#[gtest]
fn test_parse_hello_description() -> googletest::Result<()> {
    let descriptions = parse_process_descriptions(DESCRIBE)?;
    let hello = &descriptions[0];

    expect_that!(descriptions.len(), eq(2));
    expect_that!(hello.identifier, eq("hello"));
    expect_that!(hello.version.as_deref(), some(eq("1.5")));
    expect_that!(hello.supports_async, eq(true));
    expect_that!(hello.inputs[0].identifier, eq("name"));
    expect_that!(hello.inputs[0].title.as_deref(), some(eq("Your name")));
    expect_that!(hello.inputs[0].kind, eq(&DataKind::literal(LiteralType::String)));
    expect_that!(
        hello.outputs[0].kind,
        eq(&DataKind::literal(LiteralType::String))
    );
    Ok(())
}

#[gtest]
fn test_parse_inout_description() -> googletest::Result<()> {
    let descriptions = parse_process_descriptions(DESCRIBE)?;
    let inout = &descriptions[1];

    // Storing without status updates cannot be polled.
    expect_that!(inout.supports_async, eq(false));
    expect_that!(inout.supports_sync, eq(true));

    let int = inout.input("int").expect("int input");
    expect_that!(
        int.kind,
        eq(&DataKind::Literal {
            subtype: LiteralType::Integer,
            uoms: vec!["meters".into(), "feet".into()],
        })
    );
    expect_that!((int.min_occurs, int.max_occurs), eq((0, 1)));
    expect_that!(int.default_value.as_deref(), some(eq("7")));
    expect_that!(int.allowed_values, eq(&AllowedValues::AnyValue));

    let choice = inout.input("string_choice").expect("string_choice input");
    expect_that!((choice.min_occurs, choice.max_occurs), eq((1, 3)));
    expect_that!(
        choice.allowed_values,
        eq(&AllowedValues::Values(vec![
            AllowedValue::Value("rock".into()),
            AllowedValue::Value("paper".into()),
            AllowedValue::Value("scissor".into()),
        ]))
    );

    let level = inout.input("level").expect("level input");
    expect_that!(level.kind, eq(&DataKind::literal(LiteralType::Float)));
    expect_that!(
        level.allowed_values,
        eq(&AllowedValues::Values(vec![AllowedValue::Range {
            min: Some("0".into()),
            max: Some("1.5".into()),
        }]))
    );

    let text = inout.input("text").expect("text input");
    let plain = Format {
        mimetype: "text/plain".into(),
        encoding: Some("utf-8".into()),
        schema: None,
    };
    expect_that!(
        text.kind,
        eq(&DataKind::Complex(ComplexFormats {
            default: Some(plain.clone()),
            supported: vec![
                plain,
                Format {
                    mimetype: "application/x-netcdf".into(),
                    encoding: Some("base64".into()),
                    schema: None,
                },
            ],
        }))
    );

    let bbox = inout.input("bbox").expect("bbox input");
    expect_that!(
        bbox.kind,
        eq(&DataKind::BoundingBox {
            crss: vec!["epsg:4326".into(), "epsg:3035".into()],
        })
    );

    expect_that!(inout.output_is_complex("output"), eq(true));
    expect_that!(inout.output_is_complex("int"), eq(false));
    Ok(())
}

#[gtest]
fn test_invalid_occurs() {
    let doc = r#"<ProcessDescriptions><ProcessDescription>
        <Identifier>p</Identifier>
        <DataInputs><Input minOccurs="one"><Identifier>x</Identifier>
        <LiteralData/></Input></DataInputs>
    </ProcessDescription></ProcessDescriptions>"#;

    expect_that!(
        parse_process_descriptions(doc),
        err(displays_as(eq("invalid minOccurs \"one\"")))
    );
}

#[gtest]
fn test_parse_started() -> googletest::Result<()> {
    let report = parse_execute_response(EXECUTE_STARTED)?;

    expect_that!(report.status, eq(Status::Running));
    expect_that!(report.percent_complete, some(eq(40)));
    expect_that!(report.message.as_deref(), some(eq("Processing input 2 of 5")));
    expect_that!(
        report.status_location.as_deref(),
        some(eq("http://localhost:5000/outputs/5f1b2c.xml"))
    );
    expect_that!(report.outputs, is_empty());
    Ok(())
}

#[gtest]
fn test_parse_succeeded() -> googletest::Result<()> {
    let report = parse_execute_response(EXECUTE_SUCCEEDED)?;

    expect_that!(report.status, eq(Status::Succeeded));
    expect_that!(report.status_location, none());
    expect_that!(
        report.outputs,
        elements_are![
            eq(&OutputPayload {
                identifier: "int".into(),
                content: PayloadContent::Literal {
                    values: vec!["7".into()],
                    data_type: Some("integer".into()),
                },
                mimetype: None,
            }),
            eq(&OutputPayload::reference(
                "output",
                "http://localhost:5000/outputs/5f1b2c/output.json",
                Some("application/json"),
            )),
            eq(&OutputPayload {
                identifier: "text".into(),
                content: PayloadContent::Embedded {
                    data: "a <b> & c".into(),
                    encoding: Some("utf-8".into()),
                },
                mimetype: Some("text/plain".into()),
            }),
            eq(&OutputPayload {
                identifier: "xml".into(),
                content: PayloadContent::Embedded {
                    data: r#"<doc><item n="1"/></doc>"#.into(),
                    encoding: None,
                },
                mimetype: Some("text/xml".into()),
            }),
        ]
    );
    Ok(())
}

#[gtest]
fn test_parse_failed() -> googletest::Result<()> {
    let report = parse_execute_response(EXECUTE_FAILED)?;

    expect_that!(report.status, eq(Status::Failed));
    expect_that!(
        report.message.as_deref(),
        some(eq("Process error: division by zero"))
    );
    expect_that!(
        report.exceptions,
        elements_are![eq(&ExceptionDetail {
            code: "NoApplicableCode".into(),
            locator: Some("None".into()),
            text: "Process error: division by zero".into(),
        })]
    );
    Ok(())
}

#[gtest]
fn test_parse_exception_report() {
    expect_that!(
        parse_exception_report(EXCEPTION_FORBIDDEN).map(|exceptions| exceptions.len()),
        some(eq(1))
    );
    expect_that!(parse_exception_report(EXECUTE_FAILED), none());
    expect_that!(parse_exception_report("not xml"), none());
}

fn request(mode: ExecutionMode) -> ExecuteRequest {
    ExecuteRequest {
        process_id: "inout".into(),
        inputs: vec![
            WireInput {
                identifier: "string_choice".into(),
                value: WireValue::Literal("rock & roll".into()),
            },
            WireInput {
                identifier: "text".into(),
                value: WireValue::Complex(ComplexInput {
                    data: ComplexData::Embedded("<a>".into()),
                    mimetype: Some("text/plain".into()),
                    encoding: Some("utf-8".into()),
                    schema: None,
                }),
            },
            WireInput {
                identifier: "dataset".into(),
                value: WireValue::Complex(ComplexInput {
                    data: ComplexData::Reference("http://data.test/a.nc?x=1&y=2".into()),
                    mimetype: Some("application/x-netcdf".into()),
                    encoding: None,
                    schema: None,
                }),
            },
        ],
        outputs: vec![
            WireOutput::new("output", Some(true), Some("application/json")),
            WireOutput::new("int", None, None),
        ],
        mode,
    }
}

fn element<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    parent.descendants().find(|node| node.tag_name().name() == name)
}

#[gtest]
fn test_execute_document() -> googletest::Result<()> {
    let doc = execute_document(&request(ExecutionMode::Sync), "1.0.0", Some("fr-CA"))?;

    expect_that!(doc, starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    let parsed = roxmltree::Document::parse(&doc)?;
    let root = parsed.root_element();
    expect_that!(root.tag_name().namespace(), some(eq(WPS_NS)));
    expect_that!(root.tag_name().name(), eq("Execute"));
    expect_that!(root.attribute("service"), some(eq("WPS")));
    expect_that!(root.attribute("version"), some(eq("1.0.0")));
    expect_that!(root.attribute("language"), some(eq("fr-CA")));

    // Text and attribute values come back unescaped.
    let literal = element(root, "LiteralData").or_fail()?;
    expect_that!(literal.text(), some(eq("rock & roll")));
    let complex = element(root, "ComplexData").or_fail()?;
    expect_that!(complex.text(), some(eq("<a>")));
    expect_that!(complex.attribute("mimeType"), some(eq("text/plain")));
    expect_that!(complex.attribute("encoding"), some(eq("utf-8")));
    expect_that!(complex.attribute("schema"), none());
    let reference = element(root, "Reference").or_fail()?;
    expect_that!(
        reference.attribute((XLINK_NS, "href")),
        some(eq("http://data.test/a.nc?x=1&y=2"))
    );
    expect_that!(reference.attribute("mimeType"), some(eq("application/x-netcdf")));

    let document = element(root, "ResponseDocument").or_fail()?;
    expect_that!(document.attribute("storeExecuteResponse"), none());
    let outputs: Vec<(Option<&str>, Option<&str>)> = document
        .children()
        .filter(|node| node.tag_name().name() == "Output")
        .map(|node| (node.attribute("asReference"), node.attribute("mimeType")))
        .collect();
    expect_that!(
        outputs,
        elements_are![
            eq(&(Some("true"), Some("application/json"))),
            eq(&(None, None)),
        ]
    );
    Ok(())
}

#[gtest]
fn test_async_execute_document_stores_response() -> googletest::Result<()> {
    let doc = execute_document(&request(ExecutionMode::Async), "1.0.0", None)?;

    expect_that!(
        doc,
        contains_substring(
            "<wps:ResponseDocument storeExecuteResponse=\"true\" status=\"true\">"
        )
    );
    expect_that!(doc, not(contains_substring("language=")));
    Ok(())
}

#[gtest]
fn test_execute_document_is_well_formed() -> googletest::Result<()> {
    let doc = execute_document(&request(ExecutionMode::Async), "1.0.0", Some("en-US"))?;

    let parsed = roxmltree::Document::parse(&doc)?;
    let identifiers: Vec<&str> = parsed
        .descendants()
        .filter(|node| node.tag_name().name() == "Identifier")
        .filter_map(|node| node.text())
        .collect();

    expect_that!(
        identifiers,
        elements_are![
            eq(&"inout"),
            eq(&"string_choice"),
            eq(&"text"),
            eq(&"dataset"),
            eq(&"output"),
            eq(&"int"),
        ]
    );
    Ok(())
}

#[gtest]
fn test_bounding_box_inputs_are_unsupported() {
    let mut request = request(ExecutionMode::Sync);
    request.inputs.push(WireInput {
        identifier: "bbox".into(),
        value: WireValue::BoundingBox("0,0,1,1".into()),
    });

    expect_that!(
        execute_document(&request, "1.0.0", None),
        err(matches_pattern!(TransportError::Unsupported(contains_substring("bbox"))))
    );
}
