use std::path::PathBuf;

use crate::transport::{ExceptionDetail, RequestKind, Status, TransportError};

/// Errors produced by the client core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("You are not authorized to do a request of type: {request}")]
    Unauthorized { request: RequestKind },
    #[error(
        "These process names were not found on the WPS server: {}",
        .names.join(", ")
    )]
    UnknownProcesses { names: Vec<String> },
    #[error("process identifiers {first:?} and {second:?} differ only by case")]
    DuplicateProcess { first: String, second: String },
    #[error("invalid description of process {process:?}: {reason}")]
    InvalidDescriptor { process: String, reason: String },
    #[error(transparent)]
    TypeCoercion(#[from] TypeCoercionError),
    #[error("mimetype {mimetype:?} is not one of the supported mimetypes {supported:?}")]
    UnsupportedMimetype {
        mimetype: String,
        supported: Vec<String>,
    },
    #[error("{} should be a local file but was not found on disk", .path.display())]
    FileNotFound { path: PathBuf },
    #[error(transparent)]
    Argument(#[from] ArgumentError),
    #[error("process {process_id:?} is not complete (status: {status})")]
    ProcessNotComplete { process_id: String, status: Status },
    #[error(
        "process {process_id:?} did not succeed (status: {status}): {}",
        join_exceptions(.exceptions)
    )]
    ProcessFailed {
        process_id: String,
        status: Status,
        exceptions: Vec<ExceptionDetail>,
    },
    #[error("asynchronous execution of {process_id:?} did not provide a status location")]
    MissingStatusLocation { process_id: String },
    #[error("the execution monitor of {process_id:?} panicked")]
    MonitorPanicked { process_id: String },
    #[error(transparent)]
    UnmetDependency(#[from] UnmetDependencyError),
    #[error(transparent)]
    Transport(TransportError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for Error {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::AccessForbidden { request } => Self::Unauthorized { request },
            other => Self::Transport(other),
        }
    }
}

fn join_exceptions(exceptions: &[ExceptionDetail]) -> String {
    if exceptions.is_empty() {
        return "no exception details reported".to_string();
    }
    exceptions
        .iter()
        .map(ExceptionDetail::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A literal value could not be parsed into its declared subtype.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("could not coerce {value:?} to {subtype}")]
pub struct TypeCoercionError {
    pub subtype: String,
    pub value: String,
}

/// A converter needs an optional library that is not available in this build.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("converter {converter} has an unmet dependency: {dependency}")]
pub struct UnmetDependencyError {
    pub converter: &'static str,
    pub dependency: String,
}

/// Arguments given to a binding do not fit its parameter list.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ArgumentError {
    #[error("{binding}() takes {max} positional arguments but {got} were given")]
    TooManyPositional {
        binding: String,
        max: usize,
        got: usize,
    },
    #[error("{binding}() got an unexpected keyword argument {name:?}")]
    UnknownParameter { binding: String, name: String },
    #[error("{binding}() missing required argument {name:?}")]
    MissingArgument { binding: String, name: String },
    #[error("{binding}() got multiple values for argument {name:?}")]
    DuplicateArgument { binding: String, name: String },
    #[error("{binding}() needs at least {min} values for {name:?}, got {got}")]
    TooFewValues {
        binding: String,
        name: String,
        min: u32,
        got: usize,
    },
    #[error("{binding}() accepts at most {max} values for {name:?}, got {got}")]
    TooManyValues {
        binding: String,
        name: String,
        max: u32,
        got: usize,
    },
}
