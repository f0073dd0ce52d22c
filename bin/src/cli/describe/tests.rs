use googletest::prelude::*;

use client::testutil::FakeTransport;

use super::*;

fn describe(process: Option<&str>, format: Format) -> anyhow::Result<String> {
    let cmd = Command {
        process: process.map(str::to_string),
        format,
    };
    let mut out = Vec::new();
    run(&cmd, FakeTransport::emu().into_arc(), &mut out)?;
    Ok(String::from_utf8(out)?)
}

#[gtest]
fn test_process_as_text() -> anyhow::Result<()> {
    let text = describe(Some("hello"), Format::Text)?;

    expect_that!(
        text,
        starts_with(
            "hello(name, output_formats=None)\n\n\
             Just says a friendly Hello. Returns a literal string output with Hello plus the inputed name.\n"
        )
    );
    expect_that!(text, contains_substring("Parameters\n----------\nname : string\n"));
    expect_that!(text, contains_substring("Returns\n-------\noutput : string\n"));
    Ok(())
}

#[gtest]
fn test_process_identifier_is_case_insensitive() -> anyhow::Result<()> {
    let text = describe(Some("HELLO"), Format::Text)?;

    expect_that!(text, starts_with("hello(name, output_formats=None)"));
    Ok(())
}

#[gtest]
fn test_process_as_json() -> anyhow::Result<()> {
    let json: serde_json::Value = serde_json::from_str(&describe(Some("hello"), Format::Json)?)?;

    expect_that!(json["identifier"], eq(&serde_json::json!("hello")));
    expect_that!(json["version"], eq(&serde_json::json!("1.5")));
    expect_that!(json["inputs"][0]["identifier"], eq(&serde_json::json!("name")));
    expect_that!(json["inputs"][0]["kind"]["kind"], eq(&serde_json::json!("literal")));
    Ok(())
}

#[gtest]
fn test_process_as_yaml() -> anyhow::Result<()> {
    let yaml = describe(Some("dummyprocess"), Format::Yaml)?;

    expect_that!(yaml, starts_with("identifier: dummyprocess\ntitle: Dummy Process\n"));
    expect_that!(yaml, contains_substring("- identifier: input1\n"));
    Ok(())
}

#[gtest]
fn test_unknown_process() {
    let result = describe(Some("wordcounter"), Format::Text);

    expect_that!(
        result.map_err(|err| format!("{err:#}")),
        err(eq(
            "describing process \"wordcounter\": \
             These process names were not found on the WPS server: wordcounter"
        ))
    );
}

#[gtest]
fn test_service_as_text() -> anyhow::Result<()> {
    let text = describe(None, Format::Text)?;

    expect_that!(text, starts_with("Emu\n\n\nProcesses\n---------\n\nhello\n"));
    expect_that!(text, contains_substring("\nslowprocess\n    Counts down with reported progress.\n"));
    Ok(())
}

#[gtest]
fn test_service_as_json() -> anyhow::Result<()> {
    let json: serde_json::Value = serde_json::from_str(&describe(None, Format::Json)?)?;

    expect_that!(json["title"], eq(&serde_json::json!("Emu")));
    expect_that!(json["languages"]["default"], eq(&serde_json::json!("en-US")));
    expect_that!(json["processes"][0]["identifier"], eq(&serde_json::json!("hello")));
    Ok(())
}
