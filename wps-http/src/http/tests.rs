use std::{sync::Arc, time::Duration};

use client::{WpsClient, transport::WireValue};
use googletest::prelude::*;
use tempfile::TempDir;

use super::*;

const CAPABILITIES: &str = include_str!("../../testdata/capabilities.xml");
const DESCRIBE: &str = include_str!("../../testdata/describe.xml");

fn offline_config() -> TransportConfig {
    TransportConfig::new("http://localhost:5000/wps")
        .with_capabilities_xml(CAPABILITIES)
        .with_describe_xml(DESCRIBE)
}

#[gtest]
fn test_kvp_url() -> googletest::Result<()> {
    let transport = HttpTransport::new(
        TransportConfig::new("http://localhost:5000/wps").with_language(Some("fr-CA".into())),
    )?;

    let url = transport.kvp_url("DescribeProcess", &[("identifier", "hello world")])?;

    expect_that!(
        url.as_str(),
        eq(concat!(
            "http://localhost:5000/wps?service=WPS&request=DescribeProcess&version=1.0.0",
            "&identifier=hello+world&language=fr-CA"
        ))
    );
    Ok(())
}

#[gtest]
fn test_invalid_url() {
    let transport = HttpTransport::new(TransportConfig::new("not a url"))
        .expect("building does not contact the service");

    expect_that!(
        transport.capabilities(),
        err(matches_pattern!(TransportError::Connection { url: eq("not a url"), .. }))
    );
}

#[gtest]
fn test_invalid_token() {
    let result = HttpTransport::new(
        TransportConfig::new("http://localhost:5000/wps").with_token(Some("bad\ntoken".into())),
    );

    expect_that!(
        result.err(),
        some(matches_pattern!(TransportError::Connection {
            message: contains_substring("invalid header value"),
            ..
        }))
    );
}

#[gtest]
fn test_missing_client_certificate() {
    let result = HttpTransport::new(
        TransportConfig::new("https://localhost:5000/wps")
            .with_cert(Some("/nonexistent/client.pem".into())),
    );

    expect_that!(result.err(), some(matches_pattern!(TransportError::Io(_))));
}

#[gtest]
fn test_offline_documents() -> googletest::Result<()> {
    let transport = HttpTransport::new(offline_config())?;

    let capabilities = transport.capabilities()?;
    let inout = transport.describe_process("InOut")?;

    expect_that!(capabilities.processes.len(), eq(3));
    expect_that!(inout.identifier.as_str(), eq("inout"));
    expect_that!(
        transport.describe_process("wordcounter"),
        err(matches_pattern!(TransportError::Service {
            request: eq(&RequestKind::DescribeProcess),
            ..
        }))
    );
    Ok(())
}

#[gtest]
fn test_malformed_offline_description() {
    let result = HttpTransport::new(
        TransportConfig::new("http://localhost:5000/wps").with_describe_xml("<nope/>"),
    );

    expect_that!(
        result.err(),
        some(matches_pattern!(TransportError::Malformed {
            request: eq(&RequestKind::DescribeProcess),
            message: contains_substring("ProcessDescriptions"),
        }))
    );
}

#[gtest]
fn test_client_over_offline_documents() -> googletest::Result<()> {
    // GIVEN a client bound through the HTTP transport without network access.
    let transport = Arc::new(HttpTransport::new(offline_config())?);
    let client = WpsClient::builder(transport)
        .processes(["hello", "inout"])
        .build()?;

    // WHEN the bindings are inspected.
    let inout = client.binding("inout").expect("inout binding");

    // THEN they reflect the described processes.
    expect_that!(client.capabilities().title.as_deref(), some(eq("Emu")));
    expect_that!(
        inout.signature(),
        eq(concat!(
            "inout(string_choice=\"scissor\", int=7, level=None, text=None, bbox=None, ",
            "output_formats=None)"
        ))
    );
    expect_that!(
        client.binding("hello").map(|hello| hello.signature()),
        some(eq("hello(name, output_formats=None)"))
    );
    Ok(())
}

#[gtest]
fn test_fetch_local_file() -> googletest::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("output.txt");
    std::fs::write(&path, "local content")?;
    let url = Url::from_file_path(&path).expect("absolute path");
    let transport = HttpTransport::new(offline_config())?;

    expect_that!(transport.fetch(url.as_str())?, eq(&b"local content".to_vec()));
    Ok(())
}

#[gtest]
fn test_cancel_is_unsupported() -> googletest::Result<()> {
    let transport = HttpTransport::new(offline_config())?;

    expect_that!(
        transport.cancel("http://localhost:5000/outputs/5f1b2c.xml")?,
        eq(CancelOutcome::Unsupported)
    );
    Ok(())
}

#[gtest]
fn test_bounding_box_rejected_before_sending() -> googletest::Result<()> {
    // Port 9 is never contacted: the request cannot be rendered.
    let transport = HttpTransport::new(
        TransportConfig::new("http://127.0.0.1:9/wps").with_timeout(Duration::from_secs(1)),
    )?;
    let request = ExecuteRequest {
        process_id: "inout".into(),
        inputs: vec![client::transport::WireInput {
            identifier: "bbox".into(),
            value: WireValue::BoundingBox("0,0,1,1".into()),
        }],
        outputs: Vec::new(),
        mode: client::transport::ExecutionMode::Sync,
    };

    expect_that!(
        transport.execute(&request),
        err(matches_pattern!(TransportError::Unsupported(_)))
    );
    Ok(())
}

#[gtest]
fn test_unreachable_service() -> googletest::Result<()> {
    let transport = HttpTransport::new(
        TransportConfig::new("http://127.0.0.1:9/wps").with_timeout(Duration::from_secs(5)),
    )?;

    expect_that!(
        transport.capabilities(),
        err(matches_pattern!(TransportError::Connection { .. }))
    );
    Ok(())
}

#[gtest]
fn test_service_error_mapping() {
    let forbidden = ExceptionDetail {
        code: "AccessForbidden".into(),
        locator: None,
        text: String::new(),
    };
    let invalid = ExceptionDetail {
        code: "InvalidParameterValue".into(),
        locator: Some("identifier".into()),
        text: "Unknown process".into(),
    };

    expect_that!(
        service_error(RequestKind::Execute, vec![invalid.clone(), forbidden]),
        matches_pattern!(TransportError::AccessForbidden {
            request: eq(&RequestKind::Execute)
        })
    );
    expect_that!(
        service_error(RequestKind::Execute, vec![invalid.clone()]),
        matches_pattern!(TransportError::Service {
            request: eq(&RequestKind::Execute),
            exceptions: elements_are![eq(&invalid)],
        })
    );
}

#[gtest]
fn test_exception_report_maps_to_unauthorized() {
    let err = xml_error(
        RequestKind::GetCapabilities,
        crate::xml::parse_capabilities(include_str!("../../testdata/exception_forbidden.xml"))
            .expect_err("exception report"),
    );

    expect_that!(
        client::Error::from(err),
        matches_pattern!(client::Error::Unauthorized {
            request: eq(&RequestKind::GetCapabilities)
        })
    );
}

#[gtest]
fn test_exception_report_maps_to_service_error() {
    let err = xml_error(
        RequestKind::DescribeProcess,
        crate::xml::parse_process_descriptions(include_str!(
            "../../testdata/exception_invalid.xml"
        ))
        .expect_err("exception report"),
    );

    expect_that!(
        err.to_string(),
        eq(concat!(
            "service reported an exception for DescribeProcess request: ",
            "InvalidParameterValue (identifier): Unknown process nope"
        ))
    );
}
