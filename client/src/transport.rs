//! The contract between the client core and a service transport, and the
//! wire-level values exchanged through it.

use std::fmt;

use strum_macros::Display;

use crate::model::{Capabilities, ProcessDescriptor};

/// A connection to a processing service.
///
/// Implementations must report access-control rejections as
/// [TransportError::AccessForbidden] so that they can be told apart from
/// every other failure.
pub trait Transport: Send + Sync {
    /// URL of the service endpoint.
    fn base_url(&self) -> &str;

    fn capabilities(&self) -> Result<Capabilities, TransportError>;

    fn describe_process(&self, identifier: &str) -> Result<ProcessDescriptor, TransportError>;

    fn execute(&self, request: &ExecuteRequest) -> Result<StatusReport, TransportError>;

    /// Fetches the status document at `location`, as returned by an
    /// asynchronous execution.
    fn check_status(&self, location: &str) -> Result<StatusReport, TransportError>;

    /// Requests cancellation of the execution whose status is at `location`.
    fn cancel(&self, location: &str) -> Result<CancelOutcome, TransportError> {
        let _ = location;
        Ok(CancelOutcome::Unsupported)
    }

    /// Retrieves the content at `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError>;

    /// Whether `url` is served by an OPeNDAP server, and so may be opened
    /// remotely rather than downloaded.
    fn is_opendap(&self, url: &str) -> bool {
        let _ = url;
        false
    }
}

/// The kind of request that a transport failure relates to.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum RequestKind {
    GetCapabilities,
    DescribeProcess,
    Execute,
    GetStatus,
    Fetch,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("access forbidden for {request} request")]
    AccessForbidden { request: RequestKind },
    #[error("server certificate verification failed: {message}")]
    CertificateVerification { message: String },
    #[error("could not connect to {url}: {message}")]
    Connection { url: String, message: String },
    #[error("service reported an exception for {request} request: {}", join(.exceptions))]
    Service {
        request: RequestKind,
        exceptions: Vec<ExceptionDetail>,
    },
    #[error("malformed {request} response: {message}")]
    Malformed {
        request: RequestKind,
        message: String,
    },
    #[error("unsupported by transport: {0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join(exceptions: &[ExceptionDetail]) -> String {
    exceptions
        .iter()
        .map(ExceptionDetail::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One exception reported by the service.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExceptionDetail {
    pub code: String,
    pub locator: Option<String>,
    pub text: String,
}

impl fmt::Display for ExceptionDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(locator) = &self.locator {
            write!(f, " ({locator})")?;
        }
        if !self.text.is_empty() {
            write!(f, ": {}", self.text)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ExecutionMode {
    Sync,
    Async,
}

/// Execution status as reported by the service.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Status {
    Accepted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Rejected,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Accepted | Status::Running)
    }

    /// Position in the forward-only state machine.
    pub(crate) fn rank(self) -> u8 {
        match self {
            Status::Accepted => 0,
            Status::Running => 1,
            _ => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum CancelOutcome {
    /// The service accepted the cancellation request.
    Requested,
    /// The service cannot cancel; polling stopped locally.
    Unsupported,
    /// The execution had already finished.
    AlreadyTerminal,
}

/// Content of a complex input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ComplexData {
    Embedded(String),
    Reference(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComplexInput {
    pub data: ComplexData,
    pub mimetype: Option<String>,
    pub encoding: Option<String>,
    pub schema: Option<String>,
}

/// An input value in the form the service expects.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WireValue {
    Literal(String),
    Complex(ComplexInput),
    /// Passed through unchanged.
    BoundingBox(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WireInput {
    pub identifier: String,
    pub value: WireValue,
}

/// A requested output. `None` fields leave the choice to the service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WireOutput {
    pub identifier: String,
    pub as_reference: Option<bool>,
    pub mimetype: Option<String>,
}

impl WireOutput {
    pub fn new(
        identifier: impl Into<String>,
        as_reference: Option<bool>,
        mimetype: Option<&str>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            as_reference,
            mimetype: mimetype.map(str::to_owned),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecuteRequest {
    pub process_id: String,
    pub inputs: Vec<WireInput>,
    pub outputs: Vec<WireOutput>,
    pub mode: ExecutionMode,
}

/// Content of an output in an execution response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PayloadContent {
    Literal {
        values: Vec<String>,
        data_type: Option<String>,
    },
    Reference(String),
    Embedded {
        data: String,
        encoding: Option<String>,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputPayload {
    pub identifier: String,
    pub content: PayloadContent,
    pub mimetype: Option<String>,
}

impl OutputPayload {
    pub fn literal(identifier: impl Into<String>, values: &[&str]) -> Self {
        Self {
            identifier: identifier.into(),
            content: PayloadContent::Literal {
                values: values.iter().map(|v| v.to_string()).collect(),
                data_type: None,
            },
            mimetype: None,
        }
    }

    pub fn reference(
        identifier: impl Into<String>,
        url: impl Into<String>,
        mimetype: Option<&str>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            content: PayloadContent::Reference(url.into()),
            mimetype: mimetype.map(str::to_owned),
        }
    }
}

/// A status document, from either an execute response or a status check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusReport {
    pub status: Status,
    pub percent_complete: Option<u8>,
    pub message: Option<String>,
    pub status_location: Option<String>,
    pub outputs: Vec<OutputPayload>,
    pub exceptions: Vec<ExceptionDetail>,
}

impl StatusReport {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            percent_complete: None,
            message: None,
            status_location: None,
            outputs: Vec::new(),
            exceptions: Vec::new(),
        }
    }
}
