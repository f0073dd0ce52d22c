use googletest::prelude::*;

use client::{
    testutil::{FAKE_URL, FakeTransport, hello_descriptor},
    transport::{ExceptionDetail, ExecuteRequest, OutputPayload, RequestKind},
};

use super::*;

fn no_outputs(_: &ExecuteRequest) -> std::result::Result<Vec<OutputPayload>, Vec<ExceptionDetail>> {
    Ok(vec![])
}

#[gtest]
fn test_lists_processes() -> anyhow::Result<()> {
    let fake = FakeTransport::new(FAKE_URL)
        .with_process(hello_descriptor(), Box::new(no_outputs))
        .with_listed("wordcounter");
    let mut out = Vec::new();

    run(fake.into_arc(), &mut out)?;

    expect_that!(
        String::from_utf8(out)?,
        eq("hello        Say Hello\nwordcounter\n")
    );
    Ok(())
}

#[gtest]
fn test_empty_service() -> anyhow::Result<()> {
    let mut out = Vec::new();

    run(FakeTransport::new(FAKE_URL).into_arc(), &mut out)?;

    expect_that!(out, is_empty());
    Ok(())
}

#[gtest]
fn test_forbidden_capabilities() {
    let fake = FakeTransport::emu().forbid(RequestKind::GetCapabilities);
    let mut out = Vec::new();

    let result = run(fake.into_arc(), &mut out);

    expect_that!(
        result.map_err(|err| format!("{err:#}")),
        err(eq(
            "listing processes: You are not authorized to do a request of type: GetCapabilities"
        ))
    );
}
