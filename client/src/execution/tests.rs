use std::{sync::Arc, time::Duration};

use googletest::prelude::*;
use testutils::TestFiles;

use super::*;
use crate::{
    binding::{Binding, Invocation},
    testutil::{
        Call, FakeTransport, dummyprocess_descriptor, hello_descriptor,
        multiple_outputs_descriptor, ncdump_descriptor, slowprocess_descriptor,
    },
    error::Error,
    transport::{ComplexData, ComplexInput, RequestKind},
};

fn engine(fake: &Arc<FakeTransport>) -> Engine {
    Engine::new(fake.clone())
        .with_interactive(true)
        .with_poll_interval(Duration::ZERO)
}

fn bound(descriptor: &ProcessDescriptor, invocation: Invocation) -> BoundArgs {
    let fake = Arc::new(FakeTransport::emu());
    let context = Arc::new(ExecutionContext::new(Engine::new(fake)));
    Binding::new(Arc::new(descriptor.clone()), context)
        .bind(invocation)
        .expect("arguments should bind")
}

/// Records events as strings, optionally asking to stop after some number of
/// events.
#[derive(Default)]
struct RecordingEvents {
    events: Vec<String>,
    stop_after: Option<usize>,
}

impl ExecutionEvents for RecordingEvents {
    fn on_event(&mut self, event: ExecutionEvent<'_>) {
        use ExecutionEvent::*;
        self.events.push(match event {
            Progress {
                percent_complete,
                message,
                ..
            } => format!("progress {percent_complete} {}", message.unwrap_or_default()),
            Completed => "completed".to_string(),
            Failed { status, .. } => format!("failed {status}"),
            Cancelled => "cancelled".to_string(),
        });
    }

    fn do_continue(&self) -> bool {
        self.stop_after.is_none_or(|n| self.events.len() < n)
    }
}

#[gtest]
fn test_select_mode() {
    let fake = Arc::new(FakeTransport::emu());
    let interactive = engine(&fake);
    let batch = Engine::new(fake.clone());

    expect_that!(
        interactive.select_mode(&slowprocess_descriptor()),
        eq(ExecutionMode::Async)
    );
    expect_that!(interactive.select_mode(&hello_descriptor()), eq(ExecutionMode::Sync));
    expect_that!(batch.select_mode(&slowprocess_descriptor()), eq(ExecutionMode::Sync));
}

#[gtest]
fn test_default_outputs_by_reference_when_complex() {
    let fake = Arc::new(FakeTransport::emu());

    let outputs = engine(&fake).choose_outputs(&multiple_outputs_descriptor(), None);

    expect_that!(
        outputs,
        elements_are![
            eq(&WireOutput::new("output", Some(true), None)),
            eq(&WireOutput::new("text", Some(true), None)),
            eq(&WireOutput::new("count", Some(false), None)),
        ]
    );
}

#[gtest]
fn test_output_override_is_verbatim() {
    let fake = Arc::new(FakeTransport::emu());
    let formats = OutputFormats::new().with("netcdf", Some(true), None);

    let outputs = engine(&fake).choose_outputs(&ncdump_descriptor(), Some(&formats));

    expect_that!(
        outputs,
        elements_are![eq(&WireOutput::new("netcdf", Some(true), None))]
    );
}

#[gtest]
fn test_build_literal_inputs() -> googletest::Result<()> {
    let fake = Arc::new(FakeTransport::emu());
    let descriptor = dummyprocess_descriptor();
    let args = bound(
        &descriptor,
        Invocation::new().arg("10").arg(20i64),
    );

    let inputs = engine(&fake).build_inputs(&descriptor, &args)?;

    expect_that!(
        inputs,
        elements_are![
            eq(&WireInput {
                identifier: "input1".into(),
                value: WireValue::Literal("10".into()),
            }),
            eq(&WireInput {
                identifier: "input2".into(),
                value: WireValue::Literal("20".into()),
            }),
        ]
    );
    Ok(())
}

#[gtest]
fn test_build_literal_inputs_rejects_uncoercible_strings() {
    let fake = Arc::new(FakeTransport::emu());
    let descriptor = dummyprocess_descriptor();
    let args = bound(&descriptor, Invocation::new().arg("ten").arg(20i64));

    expect_that!(
        engine(&fake).build_inputs(&descriptor, &args),
        err(displays_as(contains_substring("could not coerce \"ten\"")))
    );
}

fn single_complex(inputs: &[WireInput]) -> Option<&ComplexInput> {
    match inputs {
        [
            WireInput {
                value: WireValue::Complex(complex),
                ..
            },
        ] => Some(complex),
        _ => None,
    }
}

#[gtest]
fn test_build_complex_input_from_url_is_reference() -> googletest::Result<()> {
    let fake = Arc::new(FakeTransport::emu());
    let descriptor = ncdump_descriptor();
    let args = bound(
        &descriptor,
        Invocation::new().arg("http://data.test/thredds/tas.nc"),
    );

    let inputs = engine(&fake).build_inputs(&descriptor, &args)?;

    expect_that!(
        single_complex(&inputs),
        some(eq(&ComplexInput {
            data: ComplexData::Reference("http://data.test/thredds/tas.nc".into()),
            mimetype: Some("application/x-netcdf".into()),
            encoding: None,
            schema: None,
        }))
    );
    Ok(())
}

#[gtest]
fn test_build_complex_input_from_local_file_is_embedded() -> googletest::Result<()> {
    let files = TestFiles::new();
    let path = files.file("tas.nc", [0u8, 159, 146, 150]);
    let fake = Arc::new(FakeTransport::emu());
    let descriptor = ncdump_descriptor();
    let args = bound(&descriptor, Invocation::new().arg(path.as_path()));

    let inputs = engine(&fake).build_inputs(&descriptor, &args)?;

    expect_that!(
        single_complex(&inputs),
        some(eq(&ComplexInput {
            data: ComplexData::Embedded("AJ+Slg==".into()),
            mimetype: Some("application/x-netcdf".into()),
            encoding: Some("base64".into()),
            schema: None,
        }))
    );
    Ok(())
}

#[gtest]
fn test_build_complex_input_for_local_service_is_file_reference() -> googletest::Result<()> {
    let files = TestFiles::new();
    let path = files.file("tas.nc", "netcdf");
    let local = Engine::new(Arc::new(FakeTransport::new("http://localhost:5000/wps")));
    let descriptor = ncdump_descriptor();
    let args = bound(&descriptor, Invocation::new().arg(path.as_path()));

    let inputs = local.build_inputs(&descriptor, &args)?;

    let url = single_complex(&inputs).and_then(|complex| match &complex.data {
        ComplexData::Reference(url) => Some(url.as_str()),
        ComplexData::Embedded(_) => None,
    });
    expect_that!(url, some(starts_with("file://")));
    Ok(())
}

#[gtest]
fn test_build_complex_input_from_inline_text() -> googletest::Result<()> {
    let fake = Arc::new(FakeTransport::emu());
    let mut descriptor = ncdump_descriptor();
    descriptor.inputs[0].kind = DataKind::Complex(crate::testutil::formats(&["text/plain"]));
    let args = bound(&descriptor, Invocation::new().arg("just some text"));

    let inputs = engine(&fake).build_inputs(&descriptor, &args)?;

    expect_that!(
        single_complex(&inputs),
        some(eq(&ComplexInput {
            data: ComplexData::Embedded("just some text".into()),
            mimetype: Some("text/plain".into()),
            encoding: Some("utf-8".into()),
            schema: None,
        }))
    );
    Ok(())
}

#[gtest]
fn test_missing_local_file_fails() {
    let files = TestFiles::new();
    let fake = Arc::new(FakeTransport::emu());
    let descriptor = ncdump_descriptor();
    let args = bound(
        &descriptor,
        Invocation::new().arg(files.path().join("absent.nc")),
    );

    expect_that!(
        engine(&fake).build_inputs(&descriptor, &args),
        err(displays_as(contains_substring("was not found on disk")))
    );
}

fn report(status: Status, percent: Option<u8>) -> StatusReport {
    let mut report = StatusReport::new(status);
    report.percent_complete = percent;
    report.status_location = Some("http://fake.test/status/x.xml".into());
    report
}

#[gtest]
fn test_handle_status_only_moves_forward() {
    let mut handle =
        ExecutionHandle::new("p", ExecutionMode::Async, report(Status::Running, Some(40)));

    expect_that!(handle.apply(report(Status::Accepted, Some(0))), eq(false));
    expect_that!(handle.status(), eq(Status::Running));

    expect_that!(handle.apply(report(Status::Running, Some(10))), eq(true));
    expect_that!(handle.percent_complete(), eq(40));

    expect_that!(handle.apply(report(Status::Failed, None)), eq(true));
    expect_that!(handle.apply(report(Status::Succeeded, Some(100))), eq(false));
    expect_that!(handle.status(), eq(Status::Failed));
}

#[gtest]
fn test_succeeded_is_complete() {
    let handle =
        ExecutionHandle::new("p", ExecutionMode::Sync, report(Status::Succeeded, None));

    expect_that!(handle.percent_complete(), eq(100));
    expect_that!(handle.is_terminal(), eq(true));
}

#[gtest]
fn test_poll_after_terminal_does_nothing() -> googletest::Result<()> {
    let fake = Arc::new(FakeTransport::emu());
    let engine = engine(&fake);
    let mut handle =
        ExecutionHandle::new("p", ExecutionMode::Async, report(Status::Succeeded, None));

    engine.poll(&mut handle)?;
    engine.poll(&mut handle)?;

    expect_that!(
        fake.count_calls(|call| matches!(call, Call::CheckStatus(_))),
        eq(0)
    );
    Ok(())
}

#[gtest]
fn test_poll_without_location_fails() {
    let fake = Arc::new(FakeTransport::emu());
    let mut handle = ExecutionHandle::new(
        "p",
        ExecutionMode::Async,
        StatusReport::new(Status::Running),
    );

    expect_that!(
        engine(&fake).poll(&mut handle),
        err(displays_as(contains_substring("did not provide a status location")))
    );
}

fn submit_slow(engine: &Engine) -> ExecutionHandle {
    let descriptor = slowprocess_descriptor();
    engine
        .submit(
            "slowprocess",
            Vec::new(),
            engine.choose_outputs(&descriptor, None),
            engine.select_mode(&descriptor),
        )
        .expect("should submit")
}

#[gtest]
fn test_forbidden_execute_is_unauthorized() {
    // GIVEN a service that denies execute requests.
    let fake = Arc::new(FakeTransport::emu().forbid(RequestKind::Execute));
    let context = Arc::new(ExecutionContext::new(engine(&fake)));
    let binding = Binding::new(Arc::new(slowprocess_descriptor()), context);

    // WHEN the process is called.
    let result = binding.call(Invocation::new());

    // THEN access is reported as denied, and no status is requested.
    expect_that!(
        result,
        err(matches_pattern!(Error::Unauthorized {
            request: eq(&RequestKind::Execute),
        }))
    );
    expect_that!(fake.count_calls(|call| matches!(call, Call::Execute(_))), eq(1));
    expect_that!(
        fake.count_calls(|call| matches!(call, Call::CheckStatus(_))),
        eq(0)
    );
}

#[gtest]
fn test_forbidden_status_request_is_unauthorized() {
    let fake = Arc::new(FakeTransport::emu().forbid(RequestKind::GetStatus));
    let engine = engine(&fake);
    let mut handle = submit_slow(&engine);

    let result = engine.wait(&mut handle, &mut RecordingEvents::default());

    expect_that!(
        result,
        err(matches_pattern!(Error::Unauthorized {
            request: eq(&RequestKind::GetStatus),
        }))
    );
}

#[gtest]
fn test_async_wait_reports_progress() -> googletest::Result<()> {
    let fake = Arc::new(
        FakeTransport::emu().with_progress(&[(20, "Starting"), (60, "Still sleeping")]),
    );
    let engine = engine(&fake);
    let mut handle = submit_slow(&engine);
    expect_that!(handle.status(), eq(Status::Accepted));

    let mut events = RecordingEvents::default();
    engine.wait(&mut handle, &mut events)?;

    expect_that!(handle.status(), eq(Status::Succeeded));
    expect_that!(
        events.events,
        elements_are![
            eq("progress 20 Starting"),
            eq("progress 60 Still sleeping"),
            eq("completed"),
        ]
    );
    expect_that!(handle.outputs().len(), eq(1));
    Ok(())
}

#[gtest]
fn test_wait_cancels_when_asked_to_stop() -> googletest::Result<()> {
    let fake = Arc::new(
        FakeTransport::emu()
            .with_cancel()
            .with_progress(&[(10, "a"), (20, "b"), (30, "c")]),
    );
    let engine = engine(&fake);
    let mut handle = submit_slow(&engine);

    let mut events = RecordingEvents {
        stop_after: Some(1),
        ..Default::default()
    };
    engine.wait(&mut handle, &mut events)?;

    expect_that!(events.events, elements_are![eq("progress 10 a"), eq("cancelled")]);
    expect_that!(handle.cancel_requested(), eq(true));
    expect_that!(
        fake.count_calls(|call| matches!(call, Call::Cancel(_))),
        eq(1)
    );
    // The service reports the cancellation on the next status request.
    engine.poll(&mut handle)?;
    expect_that!(handle.status(), eq(Status::Cancelled));
    Ok(())
}

#[gtest]
fn test_unsupported_cancel_stops_polling_locally() -> googletest::Result<()> {
    let fake = Arc::new(FakeTransport::emu());
    let engine = engine(&fake);
    let mut handle = submit_slow(&engine);

    let outcome = engine.cancel(&mut handle)?;
    let mut events = RecordingEvents::default();
    engine.wait(&mut handle, &mut events)?;

    expect_that!(outcome, eq(CancelOutcome::Unsupported));
    expect_that!(handle.status(), eq(Status::Accepted));
    expect_that!(events.events, elements_are![eq("cancelled")]);
    expect_that!(
        fake.count_calls(|call| matches!(call, Call::CheckStatus(_))),
        eq(0)
    );
    Ok(())
}

#[gtest]
fn test_cancel_after_completion() -> googletest::Result<()> {
    let fake = Arc::new(FakeTransport::emu());
    let engine = engine(&fake);
    let mut handle =
        ExecutionHandle::new("p", ExecutionMode::Sync, report(Status::Succeeded, None));

    expect_that!(engine.cancel(&mut handle)?, eq(CancelOutcome::AlreadyTerminal));
    expect_that!(
        fake.count_calls(|call| matches!(call, Call::Cancel(_))),
        eq(0)
    );
    Ok(())
}

#[gtest]
fn test_wait_reports_failure() -> googletest::Result<()> {
    let fake = Arc::new(FakeTransport::emu());
    let engine = engine(&fake);
    let mut handle = engine.submit("fail", Vec::new(), Vec::new(), ExecutionMode::Sync)?;

    let mut events = RecordingEvents::default();
    engine.wait(&mut handle, &mut events)?;

    expect_that!(events.events, elements_are![eq("failed Failed")]);
    expect_that!(handle.exceptions().len(), eq(1));
    Ok(())
}

#[gtest]
#[test_log::test]
fn test_log_events_accepts_every_event() {
    let mut events = LogEvents::new("slowprocess");

    events.on_event(ExecutionEvent::Progress {
        status: Status::Running,
        percent_complete: 50,
        message: Some(&"x".repeat(80)),
    });
    events.on_event(ExecutionEvent::Completed);

    expect_that!(events.do_continue(), eq(true));
}
