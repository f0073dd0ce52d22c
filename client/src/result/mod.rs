//! Retrieving the outputs of an execution.

use std::{
    cell::{OnceCell, RefCell},
    fmt, fs,
    ops::Index,
    path::PathBuf,
    sync::Arc,
};

use base64::Engine as _;
use hashbrown::HashMap;
use tempfile::TempDir;

use crate::{
    convert::{ConvertContext, Origin, Source},
    error::Error,
    execution::{ExecutionContext, ExecutionEvents, ExecutionHandle, Monitor},
    model::{DataKind, LiteralType, ProcessDescriptor},
    sanitize::sanitize,
    transport::{
        CancelOutcome, OutputPayload, PayloadContent, RequestKind, Status, TransportError,
    },
    typebridge,
    value::{Value, delist},
};


/// An execution started through a binding, and access to its outputs once it
/// has finished.
pub struct ExecutionResult {
    handle: ExecutionHandle,
    descriptor: Arc<ProcessDescriptor>,
    context: Arc<ExecutionContext>,
    scratch: OnceCell<TempDir>,
    downloads: RefCell<HashMap<String, PathBuf>>,
}

impl ExecutionResult {
    pub fn new(
        handle: ExecutionHandle,
        descriptor: Arc<ProcessDescriptor>,
        context: Arc<ExecutionContext>,
    ) -> Self {
        Self {
            handle,
            descriptor,
            context,
            scratch: OnceCell::new(),
            downloads: RefCell::new(HashMap::new()),
        }
    }

    pub fn process_id(&self) -> &str {
        self.handle.process_id()
    }

    pub fn handle(&self) -> &ExecutionHandle {
        &self.handle
    }

    pub fn status(&self) -> Status {
        self.handle.status()
    }

    pub fn percent_complete(&self) -> u8 {
        self.handle.percent_complete()
    }

    pub fn message(&self) -> Option<&str> {
        self.handle.message()
    }

    pub fn is_complete(&self) -> bool {
        self.handle.is_terminal()
    }

    pub fn is_succeeded(&self) -> bool {
        self.handle.status() == Status::Succeeded
    }

    /// Requests the current status once.
    pub fn poll(&mut self) -> Result<Status, Error> {
        self.context.engine.poll(&mut self.handle)?;
        Ok(self.handle.status())
    }

    /// Polls until the execution finishes or `events` asks to stop.
    pub fn wait(&mut self, events: &mut dyn ExecutionEvents) -> Result<(), Error> {
        self.context.engine.wait(&mut self.handle, events)
    }

    pub fn cancel(&mut self) -> Result<CancelOutcome, Error> {
        self.context.engine.cancel(&mut self.handle)
    }

    /// Waits on the execution in a background thread.
    pub fn spawn_monitor(self) -> Monitor {
        Monitor::spawn(self)
    }

    /// The outputs, in the order the service returned them.
    ///
    /// Literal outputs are typed by their declared kind. With `as_object`,
    /// complex outputs are converted into native values, and otherwise are
    /// returned as their reference URL or embedded text.
    pub fn get(&self, as_object: bool) -> Result<Outputs, Error> {
        match self.handle.status() {
            Status::Succeeded => {}
            status if !status.is_terminal() => {
                return Err(Error::ProcessNotComplete {
                    process_id: self.process_id().to_string(),
                    status,
                });
            }
            status => {
                return Err(Error::ProcessFailed {
                    process_id: self.process_id().to_string(),
                    status,
                    exceptions: self.handle.exceptions().to_vec(),
                });
            }
        }

        let mut fields = Vec::new();
        let mut values = Vec::new();
        for payload in self.handle.outputs() {
            fields.push(sanitize(&payload.identifier));
            values.push(self.process_output(payload, as_object)?);
        }
        Ok(Outputs {
            name: format!("{}Response", sanitize(self.process_id())),
            fields,
            values,
        })
    }

    fn process_output(&self, payload: &OutputPayload, as_object: bool) -> Result<Value, Error> {
        match &payload.content {
            PayloadContent::Literal { values, data_type } => {
                let kind = self.literal_kind(&payload.identifier, data_type.as_deref());
                let mut converted = Vec::with_capacity(values.len());
                for value in values {
                    converted.push(match typebridge::from_wire(Some(value), &kind)? {
                        Some(literal) => Value::Literal(literal),
                        None => Value::Empty,
                    });
                }
                Ok(match converted.len() {
                    0 => Value::Empty,
                    _ => delist(converted),
                })
            }
            PayloadContent::Reference(url) if as_object => {
                self.convert(Origin::Remote(url.clone()), payload.mimetype.as_deref())
            }
            PayloadContent::Reference(url) => Ok(Value::Reference(url.clone())),
            PayloadContent::Embedded { data, encoding } if as_object => {
                let bytes = match encoding.as_deref() {
                    Some(encoding) if encoding.eq_ignore_ascii_case("base64") => {
                        base64::engine::general_purpose::STANDARD
                            .decode(data.trim())
                            .map_err(|err| {
                                Error::Transport(TransportError::Malformed {
                                    request: RequestKind::Execute,
                                    message: format!(
                                        "output {:?} is not valid base64: {err}",
                                        payload.identifier
                                    ),
                                })
                            })?
                    }
                    _ => data.clone().into_bytes(),
                };
                self.convert(Origin::Inline(bytes), payload.mimetype.as_deref())
            }
            PayloadContent::Embedded { data, .. } => Ok(Value::Text(data.clone())),
        }
    }

    /// The kind a literal output is typed by: the declared kind, else the
    /// data type reported with the value, else a string.
    fn literal_kind(&self, identifier: &str, data_type: Option<&str>) -> DataKind {
        match self.descriptor.output(identifier) {
            Some(output) if matches!(output.kind, DataKind::Literal { .. }) => output.kind.clone(),
            _ => DataKind::literal(
                data_type
                    .map(LiteralType::from_data_type)
                    .unwrap_or(LiteralType::String),
            ),
        }
    }

    fn convert(&self, origin: Origin, mimetype: Option<&str>) -> Result<Value, Error> {
        let scratch_dir = self.scratch_dir()?;
        let context = ConvertContext {
            transport: self.context.engine.transport().as_ref(),
            scratch_dir: &scratch_dir,
            downloads: &self.downloads,
        };
        self.context
            .converters
            .convert(&Source::new(origin, mimetype, &context))
    }

    /// Directory for downloads and extracted files: the configured one, or a
    /// temporary directory removed along with this result.
    pub fn scratch_dir(&self) -> Result<PathBuf, Error> {
        if let Some(dir) = &self.context.scratch_dir {
            fs::create_dir_all(dir)?;
            return Ok(dir.clone());
        }
        if self.scratch.get().is_none() {
            let dir = tempfile::Builder::new().prefix("wpsbind-").tempdir()?;
            let _ = self.scratch.set(dir);
        }
        match self.scratch.get() {
            Some(dir) => Ok(dir.path().to_owned()),
            None => Err(Error::Io(std::io::Error::other(
                "scratch directory unavailable",
            ))),
        }
    }
}

impl fmt::Debug for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionResult")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Named, ordered outputs of a successful execution.
#[derive(Debug, PartialEq)]
pub struct Outputs {
    name: String,
    fields: Vec<String>,
    values: Vec<Value>,
}

impl Outputs {
    /// `<process>Response`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sanitized output identifiers.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The value of an output, by sanitized or original identifier.
    pub fn get(&self, field: &str) -> Option<&Value> {
        let field = sanitize(field);
        self.fields
            .iter()
            .position(|f| *f == field)
            .map(|index| &self.values[index])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(String::as_str).zip(&self.values)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl Index<usize> for Outputs {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl fmt::Display for Outputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (field, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}={value}")?;
        }
        f.write_str(")")
    }
}
