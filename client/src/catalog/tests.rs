use std::sync::Arc;

use googletest::prelude::*;
use mockall::mock;

use super::*;
use crate::{
    model::{DataKind, InputDescriptor, LiteralType, ProcessSummary},
    testutil::{Call, FakeTransport, hello_descriptor},
    transport::{
        CancelOutcome, ExecuteRequest, RequestKind, StatusReport, TransportError,
    },
};

mock! {
    pub Transport {}

    impl Transport for Transport {
        fn base_url(&self) -> &str;
        fn capabilities(&self) -> std::result::Result<Capabilities, TransportError>;
        fn describe_process(
            &self,
            identifier: &str,
        ) -> std::result::Result<ProcessDescriptor, TransportError>;
        fn execute(
            &self,
            request: &ExecuteRequest,
        ) -> std::result::Result<StatusReport, TransportError>;
        fn check_status(&self, location: &str) -> std::result::Result<StatusReport, TransportError>;
        fn cancel(&self, location: &str) -> std::result::Result<CancelOutcome, TransportError>;
        fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError>;
        fn is_opendap(&self, url: &str) -> bool;
    }
}

fn emu_catalog() -> (Arc<FakeTransport>, Catalog) {
    let fake = Arc::new(FakeTransport::emu());
    let catalog = Catalog::load(fake.clone()).expect("should load catalog");
    (fake, catalog)
}

#[gtest]
fn test_list_process_ids() {
    let (_, catalog) = emu_catalog();

    expect_that!(
        catalog.list_process_ids(),
        elements_are![
            eq(&"hello"),
            eq(&"dummyprocess"),
            eq(&"inout"),
            eq(&"slowprocess"),
            eq(&"ncdump"),
            eq(&"multiple_outputs"),
            eq(&"fail"),
        ]
    );
}

#[gtest]
fn test_select_all() -> googletest::Result<()> {
    let (_, catalog) = emu_catalog();

    let selected = catalog.select(Selection::All)?;

    expect_that!(selected.len(), eq(7));
    expect_that!(selected.first(), some(eq("hello")));
    Ok(())
}

#[gtest]
fn test_select_is_case_insensitive_and_keeps_duplicates() -> googletest::Result<()> {
    let (_, catalog) = emu_catalog();

    let selected = catalog.select(["Hello", "HELLO", "hello"])?;

    expect_that!(selected, elements_are![eq("hello"), eq("hello"), eq("hello")]);
    Ok(())
}

#[gtest]
fn test_select_single_name() -> googletest::Result<()> {
    let (_, catalog) = emu_catalog();

    expect_that!(catalog.select("DummyProcess")?, elements_are![eq("dummyprocess")]);
    expect_that!(catalog.select(None::<&str>)?.len(), eq(7));
    Ok(())
}

#[gtest]
fn test_select_lists_every_missing_name() {
    let (_, catalog) = emu_catalog();

    let result = catalog.select(["bogus", "hello", "nope"]);

    expect_that!(
        result,
        err(matches_pattern!(Error::UnknownProcesses {
            names: elements_are![eq("bogus"), eq("nope")],
        }))
    );
    expect_that!(
        catalog.select(["bogus"]).map_err(|err| err.to_string()),
        err(eq("These process names were not found on the WPS server: bogus"))
    );
}

#[gtest]
fn test_describe_is_cached() -> googletest::Result<()> {
    let (fake, mut catalog) = emu_catalog();

    let first = catalog.describe("hello")?;
    let second = catalog.describe("HELLO")?;

    expect_that!(*first, eq(&hello_descriptor()));
    expect_that!(Arc::ptr_eq(&first, &second), eq(true));
    expect_that!(
        fake.count_calls(|call| matches!(call, Call::Describe(_))),
        eq(1)
    );
    expect_that!(catalog.cached("hello").is_some(), eq(true));
    Ok(())
}

#[gtest]
fn test_describe_unknown_process() {
    let (_, mut catalog) = emu_catalog();

    expect_that!(
        catalog.describe("bogus"),
        err(matches_pattern!(Error::UnknownProcesses {
            names: elements_are![eq("bogus")],
        }))
    );
}

#[gtest]
fn test_invalidate_refetches() -> googletest::Result<()> {
    let (fake, mut catalog) = emu_catalog();
    catalog.describe("hello")?;

    // WHEN: the catalog is invalidated.
    catalog.invalidate()?;

    // THEN: the cache is cleared and descriptions are fetched again.
    expect_that!(catalog.cached("hello").is_none(), eq(true));
    catalog.describe("hello")?;
    expect_that!(
        fake.count_calls(|call| matches!(call, Call::Describe(_))),
        eq(2)
    );
    expect_that!(
        fake.count_calls(|call| matches!(call, Call::Capabilities)),
        eq(2)
    );
    Ok(())
}

#[gtest]
fn test_identifiers_differing_by_case_collide() {
    let fake = FakeTransport::emu().with_listed("Hello");

    expect_that!(
        Catalog::load(fake.into_arc()),
        err(matches_pattern!(Error::DuplicateProcess {
            first: eq("hello"),
            second: eq("Hello"),
        }))
    );
}

#[gtest]
fn test_forbidden_listing_is_unauthorized() {
    let mut transport = MockTransport::new();
    transport.expect_capabilities().returning(|| {
        Err(TransportError::AccessForbidden {
            request: RequestKind::GetCapabilities,
        })
    });

    let result = Catalog::load(Arc::new(transport));

    expect_that!(
        result,
        err(matches_pattern!(Error::Unauthorized {
            request: eq(&RequestKind::GetCapabilities),
        }))
    );
}

#[gtest]
fn test_forbidden_describe_is_unauthorized() -> googletest::Result<()> {
    let fake = FakeTransport::emu().forbid(RequestKind::DescribeProcess);
    let mut catalog = Catalog::load(fake.into_arc())?;

    let result = catalog.describe("hello");

    expect_that!(
        result.as_ref().map_err(|err| err.to_string()),
        err(eq(
            "You are not authorized to do a request of type: DescribeProcess"
        ))
    );
    Ok(())
}

#[gtest]
fn test_other_transport_errors_propagate() {
    let mut transport = MockTransport::new();
    transport.expect_capabilities().returning(|| {
        Err(TransportError::Connection {
            url: "http://down.test/wps".into(),
            message: "connection refused".into(),
        })
    });

    expect_that!(
        Catalog::load(Arc::new(transport)),
        err(matches_pattern!(Error::Transport(matches_pattern!(
            TransportError::Connection {
                message: eq("connection refused"),
                ..
            }
        ))))
    );
}

#[gtest]
fn test_describe_rejects_inverted_cardinality() -> googletest::Result<()> {
    let mut broken = ProcessDescriptor::new("broken");
    let mut input = InputDescriptor::new("x", DataKind::literal(LiteralType::Integer));
    input.min_occurs = 2;
    input.max_occurs = 1;
    broken.inputs.push(input);

    let mut transport = MockTransport::new();
    transport.expect_capabilities().returning(|| {
        Ok(Capabilities {
            processes: vec![ProcessSummary::new("broken")],
            ..Default::default()
        })
    });
    transport
        .expect_describe_process()
        .returning(move |_| Ok(broken.clone()));
    let mut catalog = Catalog::load(Arc::new(transport))?;

    expect_that!(
        catalog.describe("broken"),
        err(matches_pattern!(Error::InvalidDescriptor {
            process: eq("broken"),
            ..
        }))
    );
    Ok(())
}

#[gtest]
fn test_filter_case_insensitive() {
    let (found, missing) =
        filter_case_insensitive(&["Hello", "bogus", "INOUT"], &["hello", "inout"]);

    expect_that!(found, elements_are![eq("Hello"), eq("INOUT")]);
    expect_that!(missing, elements_are![eq("bogus")]);
}
