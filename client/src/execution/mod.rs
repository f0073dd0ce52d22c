//! Submission, polling and cancellation of process executions.

use std::{path::PathBuf, sync::Arc, thread, time::Duration};

use crate::{
    binding::{BoundArgs, OutputFormats},
    convert::ConverterRegistry,
    error::Error,
    model::{ComplexFormats, DataKind, LiteralType, ProcessDescriptor},
    transport::{
        CancelOutcome, ExceptionDetail, ExecuteRequest, ExecutionMode, OutputPayload, Status,
        StatusReport, Transport, TransportError, WireInput, WireOutput, WireValue,
    },
    typebridge::{self, WireFormat, WireSource},
    value::{InputValue, LiteralValue},
};

mod events;
pub mod monitor;
#[cfg(test)]
mod tests;

pub use events::{ExecutionEvent, ExecutionEvents, LogEvents};
pub use monitor::{Monitor, StatusUpdate};

/// Delay between status requests while waiting on an asynchronous execution.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Everything that executions started by a client share.
pub struct ExecutionContext {
    pub engine: Engine,
    pub converters: ConverterRegistry,
    /// Directory for downloaded and extracted outputs. A temporary directory
    /// per execution is used when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl ExecutionContext {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            converters: ConverterRegistry::default(),
            scratch_dir: None,
        }
    }
}

/// Client side state of one execution.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionHandle {
    process_id: String,
    mode: ExecutionMode,
    status: Status,
    percent_complete: u8,
    message: Option<String>,
    status_location: Option<String>,
    outputs: Vec<OutputPayload>,
    exceptions: Vec<ExceptionDetail>,
    cancel_requested: bool,
}

impl ExecutionHandle {
    pub fn new(process_id: &str, mode: ExecutionMode, report: StatusReport) -> Self {
        let mut handle = Self {
            process_id: process_id.to_string(),
            mode,
            status: Status::Accepted,
            percent_complete: 0,
            message: None,
            status_location: None,
            outputs: Vec::new(),
            exceptions: Vec::new(),
            cancel_requested: false,
        };
        handle.apply(report);
        handle
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn percent_complete(&self) -> u8 {
        self.percent_complete
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn status_location(&self) -> Option<&str> {
        self.status_location.as_deref()
    }

    /// Outputs of a terminal execution.
    pub fn outputs(&self) -> &[OutputPayload] {
        &self.outputs
    }

    pub fn exceptions(&self) -> &[ExceptionDetail] {
        &self.exceptions
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Folds a status report into the handle. Reports received after a
    /// terminal status, or that would move the status backwards, are ignored.
    /// Returns whether the report was applied.
    pub fn apply(&mut self, report: StatusReport) -> bool {
        if self.status.is_terminal() {
            log::debug!(
                "Ignoring {} status of {}, already {}.",
                report.status,
                self.process_id,
                self.status
            );
            return false;
        }
        if report.status.rank() < self.status.rank() {
            log::debug!(
                "Ignoring {} status of {}, already {}.",
                report.status,
                self.process_id,
                self.status
            );
            return false;
        }

        self.status = report.status;
        if let Some(percent) = report.percent_complete {
            self.percent_complete = self.percent_complete.max(percent.min(100));
        }
        if self.status == Status::Succeeded {
            self.percent_complete = 100;
        }
        if report.message.is_some() {
            self.message = report.message;
        }
        if report.status_location.is_some() {
            self.status_location = report.status_location;
        }
        if self.status.is_terminal() {
            self.outputs = report.outputs;
            self.exceptions = report.exceptions;
        }
        true
    }
}

/// Turns bound arguments into requests and drives executions through a
/// [Transport].
pub struct Engine {
    transport: Arc<dyn Transport>,
    interactive: bool,
    poll_interval: Duration,
}

impl Engine {
    /// Creates a non-interactive engine, which always executes synchronously.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            interactive: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// In interactive mode processes that support it are executed
    /// asynchronously and their progress is reported while waiting.
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn select_mode(&self, descriptor: &ProcessDescriptor) -> ExecutionMode {
        if self.interactive && descriptor.supports_async {
            ExecutionMode::Async
        } else {
            ExecutionMode::Sync
        }
    }

    /// Converts bound arguments into wire inputs, one per value.
    pub fn build_inputs(
        &self,
        descriptor: &ProcessDescriptor,
        args: &BoundArgs,
    ) -> Result<Vec<WireInput>, Error> {
        let mut inputs = Vec::new();
        for (identifier, values) in &args.values {
            let Some(input) = descriptor.input(identifier) else {
                log::warn!(
                    "Ignoring value for unknown input {identifier:?} of {}.",
                    descriptor.identifier
                );
                continue;
            };
            for value in values {
                let wire = match &input.kind {
                    DataKind::Literal { subtype, .. } => {
                        WireValue::Literal(literal_text(value, *subtype)?)
                    }
                    DataKind::Complex(formats) => self.complex_input(value, formats, &input.kind)?,
                    DataKind::BoundingBox { .. } => WireValue::BoundingBox(literal_text(
                        value,
                        LiteralType::String,
                    )?),
                };
                inputs.push(WireInput {
                    identifier: identifier.clone(),
                    value: wire,
                });
            }
        }
        Ok(inputs)
    }

    fn complex_input(
        &self,
        value: &InputValue,
        formats: &ComplexFormats,
        kind: &DataKind,
    ) -> Result<WireValue, Error> {
        let supported = formats.mimetypes();
        let locator = value.as_locator().filter(|locator| {
            matches!(value, InputValue::Path(_)) || typebridge::names_location(locator)
        });

        let (mimetype, content_encoding) = match &locator {
            Some(locator) => {
                let (mimetype, encoding) = typebridge::guess_mimetype(locator, &supported)?;
                (Some(mimetype), encoding)
            }
            None => (formats.default_mimetype().map(str::to_owned), None),
        };
        let schema = formats.default_schema().map(str::to_owned);

        if typebridge::is_embeddable(self.transport.base_url(), value)? {
            // Compressed content is never valid text.
            let encoding = match content_encoding {
                Some(_) => Some("base64"),
                None => formats.default_encoding(),
            };
            let (content, encoding) = typebridge::embed(value, mimetype.as_deref(), encoding)?;
            Ok(typebridge::to_wire(
                WireSource::Content(content),
                kind,
                WireFormat {
                    encoding: Some(encoding),
                    mimetype,
                    schema,
                },
            ))
        } else {
            let url = match &locator {
                Some(locator) => typebridge::fix_url(locator),
                None => value.as_locator().unwrap_or_default(),
            };
            Ok(typebridge::to_wire(
                WireSource::Reference(url),
                kind,
                WireFormat {
                    encoding: content_encoding,
                    mimetype,
                    schema,
                },
            ))
        }
    }

    /// Decides which outputs to request, and in which form.
    ///
    /// An override is honoured verbatim. Otherwise every declared output is
    /// requested, by reference exactly when it is complex data.
    pub fn choose_outputs(
        &self,
        descriptor: &ProcessDescriptor,
        formats: Option<&OutputFormats>,
    ) -> Vec<WireOutput> {
        match formats {
            Some(formats) => formats
                .iter()
                .map(|(identifier, format)| WireOutput {
                    identifier: identifier.to_string(),
                    as_reference: format.as_ref,
                    mimetype: format.mimetype.clone(),
                })
                .collect(),
            None => descriptor
                .outputs
                .iter()
                .map(|output| WireOutput {
                    identifier: output.identifier.clone(),
                    as_reference: Some(output.kind.is_complex()),
                    mimetype: None,
                })
                .collect(),
        }
    }

    /// Sends an execute request. For synchronous executions the returned
    /// handle is already terminal.
    pub fn submit(
        &self,
        process_id: &str,
        inputs: Vec<WireInput>,
        outputs: Vec<WireOutput>,
        mode: ExecutionMode,
    ) -> Result<ExecutionHandle, Error> {
        log::info!("Executing {process_id} ({mode}).");
        let request = ExecuteRequest {
            process_id: process_id.to_string(),
            inputs,
            outputs,
            mode,
        };
        let report = self.transport.execute(&request)?;
        let handle = ExecutionHandle::new(process_id, mode, report);
        if !handle.is_terminal() && handle.status_location().is_none() {
            return Err(Error::MissingStatusLocation {
                process_id: process_id.to_string(),
            });
        }
        Ok(handle)
    }

    /// Requests the current status once. Does nothing for a terminal
    /// execution.
    pub fn poll(&self, handle: &mut ExecutionHandle) -> Result<(), Error> {
        if handle.is_terminal() {
            return Ok(());
        }
        let location = handle
            .status_location()
            .ok_or_else(|| Error::MissingStatusLocation {
                process_id: handle.process_id().to_string(),
            })?
            .to_string();
        let report = self.transport.check_status(&location)?;
        handle.apply(report);
        Ok(())
    }

    /// Asks the service to stop the execution. The handle keeps whatever
    /// status the service last reported.
    pub fn cancel(&self, handle: &mut ExecutionHandle) -> Result<CancelOutcome, Error> {
        if handle.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        handle.cancel_requested = true;
        let Some(location) = handle.status_location().map(str::to_owned) else {
            return Ok(CancelOutcome::Unsupported);
        };
        match self.transport.cancel(&location) {
            Ok(CancelOutcome::Unsupported) | Err(TransportError::Unsupported(_)) => {
                log::info!(
                    "The service cannot dismiss {}, no longer waiting on it.",
                    handle.process_id()
                );
                Ok(CancelOutcome::Unsupported)
            }
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(err.into()),
        }
    }

    /// Polls until the execution is terminal, reporting to `events`. Stops
    /// early, cancelling the execution, when `events` no longer wants to
    /// continue.
    pub fn wait(
        &self,
        handle: &mut ExecutionHandle,
        events: &mut dyn ExecutionEvents,
    ) -> Result<(), Error> {
        while !handle.is_terminal() {
            if handle.cancel_requested() {
                events.on_event(ExecutionEvent::Cancelled);
                return Ok(());
            }
            if !events.do_continue() {
                self.cancel(handle)?;
                events.on_event(ExecutionEvent::Cancelled);
                return Ok(());
            }
            thread::sleep(self.poll_interval);
            self.poll(handle)?;
            if !handle.is_terminal() {
                events.on_event(ExecutionEvent::Progress {
                    status: handle.status(),
                    percent_complete: handle.percent_complete(),
                    message: handle.message(),
                });
            }
        }

        events.on_event(match handle.status() {
            Status::Succeeded => ExecutionEvent::Completed,
            Status::Cancelled => ExecutionEvent::Cancelled,
            status => ExecutionEvent::Failed {
                status,
                exceptions: handle.exceptions(),
            },
        });
        Ok(())
    }
}

/// Text of a literal or bounding box value, normalised through `subtype`
/// when given as a string.
fn literal_text(value: &InputValue, subtype: LiteralType) -> Result<String, Error> {
    match value {
        InputValue::Literal(LiteralValue::String(text)) if subtype != LiteralType::String => {
            Ok(typebridge::parse_literal(text, subtype)?.to_string())
        }
        InputValue::Literal(literal) => Ok(literal.to_string()),
        InputValue::Path(path) => Ok(path.to_string_lossy().into_owned()),
        InputValue::Content(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}
