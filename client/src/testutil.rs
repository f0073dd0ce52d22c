//! An in-memory transport that emulates a small processing service.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use hashbrown::HashMap;

use crate::{
    model::{
        AllowedValue, AllowedValues, Capabilities, ComplexFormats, DataKind, Format,
        InputDescriptor, Languages, LiteralType, OutputDescriptor, ProcessDescriptor,
        ProcessSummary,
    },
    transport::{
        CancelOutcome, ComplexData, ExceptionDetail, ExecuteRequest, ExecutionMode,
        OutputPayload, PayloadContent, RequestKind, Status, StatusReport, Transport,
        TransportError, WireValue,
    },
};

pub const FAKE_URL: &str = "http://fake.test/wps";

/// Produces the outputs of a fake process, or the exceptions it fails with.
pub type Handler =
    Box<dyn Fn(&ExecuteRequest) -> Result<Vec<OutputPayload>, Vec<ExceptionDetail>> + Send + Sync>;

/// A request received by a [FakeTransport].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Capabilities,
    Describe(String),
    Execute(ExecuteRequest),
    CheckStatus(String),
    Cancel(String),
    Fetch(String),
}

struct FakeProcess {
    descriptor: ProcessDescriptor,
    handler: Handler,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    jobs: HashMap<String, VecDeque<StatusReport>>,
    next_job: usize,
}

pub struct FakeTransport {
    base_url: String,
    title: Option<String>,
    processes: Vec<FakeProcess>,
    listed_only: Vec<ProcessSummary>,
    languages: Languages,
    files: HashMap<String, Vec<u8>>,
    opendap: Vec<String>,
    forbidden: Vec<RequestKind>,
    cancel_supported: bool,
    progress: Vec<(u8, String)>,
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            title: None,
            processes: Vec::new(),
            listed_only: Vec::new(),
            languages: Languages::default(),
            files: HashMap::new(),
            opendap: Vec::new(),
            forbidden: Vec::new(),
            cancel_supported: false,
            progress: vec![(50, "Processing".to_string())],
            state: Mutex::new(FakeState::default()),
        }
    }

    /// A service offering the `hello`, `dummyprocess`, `inout`,
    /// `slowprocess`, `ncdump`, `multiple_outputs` and `fail` processes.
    pub fn emu() -> Self {
        let mut fake = Self::new(FAKE_URL)
            .with_title("Emu")
            .with_languages("en-US", &["en-US", "fr-CA"])
            .with_process(hello_descriptor(), Box::new(hello))
            .with_process(dummyprocess_descriptor(), Box::new(dummyprocess))
            .with_process(inout_descriptor(), Box::new(inout))
            .with_process(slowprocess_descriptor(), Box::new(slowprocess))
            .with_process(ncdump_descriptor(), Box::new(ncdump))
            .with_process(multiple_outputs_descriptor(), Box::new(multiple_outputs))
            .with_process(fail_descriptor(), Box::new(fail));
        fake.files.insert(
            output_url("multiple_outputs", "output.json"),
            br#"{"name": "emu", "count": 2}"#.to_vec(),
        );
        fake.files.insert(
            output_url("multiple_outputs", "output.txt"),
            b"some text".to_vec(),
        );
        fake
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_languages(mut self, default: &str, supported: &[&str]) -> Self {
        self.languages = Languages {
            default: Some(default.to_string()),
            supported: supported.iter().map(|s| s.to_string()).collect(),
        };
        self
    }

    pub fn with_process(mut self, descriptor: ProcessDescriptor, handler: Handler) -> Self {
        self.processes.push(FakeProcess {
            descriptor,
            handler,
        });
        self
    }

    /// Lists a process in the capabilities without being able to describe
    /// or run it.
    pub fn with_listed(mut self, identifier: &str) -> Self {
        self.listed_only.push(ProcessSummary::new(identifier));
        self
    }

    pub fn with_file(mut self, url: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(url.to_string(), content.into());
        self
    }

    pub fn with_opendap(mut self, url: &str) -> Self {
        self.opendap.push(url.to_string());
        self
    }

    pub fn forbid(mut self, request: RequestKind) -> Self {
        self.forbidden.push(request);
        self
    }

    pub fn with_cancel(mut self) -> Self {
        self.cancel_supported = true;
        self
    }

    /// Intermediate `(percent, message)` updates reported while an
    /// asynchronous execution runs.
    pub fn with_progress(mut self, progress: &[(u8, &str)]) -> Self {
        self.progress = progress
            .iter()
            .map(|(percent, message)| (*percent, message.to_string()))
            .collect();
        self
    }

    pub fn into_arc(self) -> Arc<dyn Transport> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Requests passed to [Transport::execute], in order.
    pub fn executed(&self) -> Vec<ExecuteRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }

    fn check_allowed(&self, request: RequestKind) -> Result<(), TransportError> {
        if self.forbidden.contains(&request) {
            Err(TransportError::AccessForbidden { request })
        } else {
            Ok(())
        }
    }

    fn process(&self, identifier: &str, request: RequestKind) -> Result<&FakeProcess, TransportError> {
        self.processes
            .iter()
            .find(|process| process.descriptor.identifier == identifier)
            .ok_or_else(|| TransportError::Service {
                request,
                exceptions: vec![ExceptionDetail {
                    code: "InvalidParameterValue".into(),
                    locator: Some("identifier".into()),
                    text: format!("Unknown process {identifier:?}"),
                }],
            })
    }
}

impl Transport for FakeTransport {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn capabilities(&self) -> Result<Capabilities, TransportError> {
        self.record(Call::Capabilities);
        self.check_allowed(RequestKind::GetCapabilities)?;
        let processes = self
            .processes
            .iter()
            .map(|process| ProcessSummary {
                identifier: process.descriptor.identifier.clone(),
                title: process.descriptor.title.clone(),
                abstract_: process.descriptor.abstract_.clone(),
            })
            .chain(self.listed_only.iter().cloned())
            .collect();
        Ok(Capabilities {
            title: self.title.clone(),
            abstract_: None,
            processes,
            languages: self.languages.clone(),
        })
    }

    fn describe_process(&self, identifier: &str) -> Result<ProcessDescriptor, TransportError> {
        self.record(Call::Describe(identifier.to_string()));
        self.check_allowed(RequestKind::DescribeProcess)?;
        Ok(self
            .process(identifier, RequestKind::DescribeProcess)?
            .descriptor
            .clone())
    }

    fn execute(&self, request: &ExecuteRequest) -> Result<StatusReport, TransportError> {
        self.record(Call::Execute(request.clone()));
        self.check_allowed(RequestKind::Execute)?;
        let process = self.process(&request.process_id, RequestKind::Execute)?;

        let mut last = match (process.handler)(request) {
            Ok(outputs) => {
                let mut report = StatusReport::new(Status::Succeeded);
                report.percent_complete = Some(100);
                report.outputs = filter_outputs(outputs, request);
                report
            }
            Err(exceptions) => {
                let mut report = StatusReport::new(Status::Failed);
                report.exceptions = exceptions;
                report
            }
        };

        if request.mode == ExecutionMode::Sync || !process.descriptor.supports_async {
            return Ok(last);
        }

        let mut state = self.lock();
        let location = format!("{}/status/{}.xml", self.base_url, state.next_job);
        state.next_job += 1;
        last.status_location = Some(location.clone());

        let mut reports: VecDeque<StatusReport> = self
            .progress
            .iter()
            .map(|(percent, message)| StatusReport {
                status: Status::Running,
                percent_complete: Some(*percent),
                message: Some(message.clone()),
                status_location: Some(location.clone()),
                outputs: Vec::new(),
                exceptions: Vec::new(),
            })
            .collect();
        reports.push_back(last);
        state.jobs.insert(location.clone(), reports);

        let mut accepted = StatusReport::new(Status::Accepted);
        accepted.percent_complete = Some(0);
        accepted.status_location = Some(location);
        Ok(accepted)
    }

    fn check_status(&self, location: &str) -> Result<StatusReport, TransportError> {
        self.record(Call::CheckStatus(location.to_string()));
        self.check_allowed(RequestKind::GetStatus)?;
        let mut state = self.lock();
        let reports = state
            .jobs
            .get_mut(location)
            .ok_or_else(|| TransportError::Malformed {
                request: RequestKind::GetStatus,
                message: format!("no job at {location}"),
            })?;
        let report = if reports.len() > 1 {
            reports.pop_front()
        } else {
            reports.front().cloned()
        };
        report.ok_or_else(|| TransportError::Malformed {
            request: RequestKind::GetStatus,
            message: format!("no status for job at {location}"),
        })
    }

    fn cancel(&self, location: &str) -> Result<CancelOutcome, TransportError> {
        self.record(Call::Cancel(location.to_string()));
        if !self.cancel_supported {
            return Ok(CancelOutcome::Unsupported);
        }
        let mut state = self.lock();
        if let Some(reports) = state.jobs.get_mut(location) {
            let mut cancelled = StatusReport::new(Status::Cancelled);
            cancelled.status_location = Some(location.to_string());
            reports.clear();
            reports.push_back(cancelled);
        }
        Ok(CancelOutcome::Requested)
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.record(Call::Fetch(url.to_string()));
        self.check_allowed(RequestKind::Fetch)?;
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Connection {
                url: url.to_string(),
                message: "404 Not Found".into(),
            })
    }

    fn is_opendap(&self, url: &str) -> bool {
        self.opendap.iter().any(|known| known == url)
    }
}

fn filter_outputs(outputs: Vec<OutputPayload>, request: &ExecuteRequest) -> Vec<OutputPayload> {
    if request.outputs.is_empty() {
        return outputs;
    }
    outputs
        .into_iter()
        .filter(|output| {
            request
                .outputs
                .iter()
                .any(|requested| requested.identifier == output.identifier)
        })
        .collect()
}

/// URL at which the fake service publishes output files.
pub fn output_url(process: &str, file_name: &str) -> String {
    format!("http://fake.test/outputs/{process}/{file_name}")
}

/// Values of the literal input `identifier` in `request`.
pub fn literal_inputs<'a>(request: &'a ExecuteRequest, identifier: &str) -> Vec<&'a str> {
    request
        .inputs
        .iter()
        .filter(|input| input.identifier == identifier)
        .filter_map(|input| match &input.value {
            WireValue::Literal(value) => Some(value.as_str()),
            _ => None,
        })
        .collect()
}

fn titled(mut descriptor: ProcessDescriptor, title: &str, abstract_: &str) -> ProcessDescriptor {
    descriptor.title = Some(title.to_string());
    descriptor.abstract_ = Some(abstract_.to_string());
    descriptor
}

fn literal_input(identifier: &str, subtype: LiteralType, title: &str) -> InputDescriptor {
    let mut input = InputDescriptor::new(identifier, DataKind::literal(subtype));
    input.title = Some(title.to_string());
    input
}

fn literal_output(identifier: &str, title: &str) -> OutputDescriptor {
    typed_output(identifier, LiteralType::String, title)
}

fn typed_output(identifier: &str, subtype: LiteralType, title: &str) -> OutputDescriptor {
    let mut output = OutputDescriptor::new(identifier, DataKind::literal(subtype));
    output.title = Some(title.to_string());
    output
}

fn complex_output(identifier: &str, mimetypes: &[&str]) -> OutputDescriptor {
    OutputDescriptor::new(identifier, DataKind::Complex(formats(mimetypes)))
}

pub fn formats(mimetypes: &[&str]) -> ComplexFormats {
    ComplexFormats {
        default: mimetypes.first().map(|mimetype| Format::new(*mimetype)),
        supported: mimetypes.iter().map(|mimetype| Format::new(*mimetype)).collect(),
    }
}

pub fn hello_descriptor() -> ProcessDescriptor {
    let mut descriptor = titled(
        ProcessDescriptor::new("hello"),
        "Say Hello",
        "Just says a friendly Hello. Returns a literal string output with Hello plus the inputed name.",
    );
    descriptor.version = Some("1.5".into());
    descriptor.inputs = vec![literal_input("name", LiteralType::String, "Your name")];
    descriptor.outputs = vec![literal_output("output", "Output response")];
    descriptor
}

fn hello(request: &ExecuteRequest) -> Result<Vec<OutputPayload>, Vec<ExceptionDetail>> {
    let name = literal_inputs(request, "name").join(" ");
    Ok(vec![OutputPayload::literal(
        "output",
        &[format!("Hello {name}").as_str()],
    )])
}

pub fn dummyprocess_descriptor() -> ProcessDescriptor {
    let mut descriptor = titled(
        ProcessDescriptor::new("dummyprocess"),
        "Dummy Process",
        "DummyProcess to check the WPS structure",
    );
    descriptor.inputs = vec![
        literal_input("input1", LiteralType::Integer, "Input1 number"),
        literal_input("input2", LiteralType::Integer, "Input2 number"),
    ];
    descriptor.outputs = vec![
        literal_output("output1", "Output1 add 1 result"),
        literal_output("output2", "Output2 subtract 1 result"),
    ];
    descriptor
}

fn dummyprocess(request: &ExecuteRequest) -> Result<Vec<OutputPayload>, Vec<ExceptionDetail>> {
    let parse = |identifier: &str| -> Result<i64, Vec<ExceptionDetail>> {
        literal_inputs(request, identifier)
            .first()
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| {
                vec![ExceptionDetail {
                    code: "MissingParameterValue".into(),
                    locator: Some(identifier.to_string()),
                    text: String::new(),
                }]
            })
    };
    let input1 = parse("input1")?;
    let input2 = parse("input2")?;
    Ok(vec![
        OutputPayload::literal("output1", &[(input1 + 1).to_string().as_str()]),
        OutputPayload::literal("output2", &[(input2 - 1).to_string().as_str()]),
    ])
}

pub fn inout_descriptor() -> ProcessDescriptor {
    let mut descriptor = titled(
        ProcessDescriptor::new("inout"),
        "In and Out",
        "Testing all WPS input and output parameters.",
    );

    let mut int = literal_input("int", LiteralType::Integer, "Integer");
    int.default_value = Some("7".into());

    let mut float = literal_input("float", LiteralType::Float, "Float");
    float.min_occurs = 0;

    let mut boolean = literal_input("boolean", LiteralType::Boolean, "Boolean");
    boolean.min_occurs = 0;
    boolean.default_value = Some("true".into());

    let mut choice = literal_input("string_choice", LiteralType::String, "String Choice");
    choice.min_occurs = 0;
    choice.default_value = Some("scissor".into());
    choice.allowed_values = AllowedValues::Values(
        ["rock", "paper", "scissor"]
            .iter()
            .map(|v| AllowedValue::Value(v.to_string()))
            .collect(),
    );

    let mut dates = literal_input("date", LiteralType::Date, "Date");
    dates.min_occurs = 0;
    dates.max_occurs = 3;

    descriptor.inputs = vec![
        float,
        int,
        literal_input("string", LiteralType::String, "String"),
        boolean,
        choice,
        dates,
    ];
    descriptor.outputs = vec![
        literal_output("string", "String"),
        typed_output("int", LiteralType::Integer, "Integer"),
        typed_output("date", LiteralType::Date, "Date"),
    ];
    descriptor
}

fn inout(request: &ExecuteRequest) -> Result<Vec<OutputPayload>, Vec<ExceptionDetail>> {
    let mut int = OutputPayload::literal("int", &literal_inputs(request, "int"));
    int.content = match int.content {
        PayloadContent::Literal { values, .. } => PayloadContent::Literal {
            values,
            data_type: Some("integer".into()),
        },
        other => other,
    };
    Ok(vec![
        OutputPayload::literal("string", &literal_inputs(request, "string")),
        int,
        OutputPayload::literal("date", &literal_inputs(request, "date")),
    ])
}

pub fn slowprocess_descriptor() -> ProcessDescriptor {
    let mut descriptor = titled(
        ProcessDescriptor::new("slowprocess"),
        "Slow Process",
        "Counts down with reported progress.",
    );
    descriptor.supports_async = true;
    descriptor.supports_status = true;
    let mut delay = literal_input("delay", LiteralType::Float, "Delay");
    delay.min_occurs = 0;
    descriptor.inputs = vec![delay];
    descriptor.outputs = vec![literal_output("sleep_output", "Sleep Output")];
    descriptor
}

fn slowprocess(_request: &ExecuteRequest) -> Result<Vec<OutputPayload>, Vec<ExceptionDetail>> {
    Ok(vec![OutputPayload::literal("sleep_output", &["done sleeping"])])
}

pub fn ncdump_descriptor() -> ProcessDescriptor {
    let mut descriptor = titled(
        ProcessDescriptor::new("ncdump"),
        "NCDump",
        "Run ncdump to retrieve netCDF header metadata.",
    );
    let mut dataset = InputDescriptor::new(
        "dataset",
        DataKind::Complex(formats(&["application/x-netcdf", "application/x-ogc-dods"])),
    );
    dataset.title = Some("Dataset".into());
    dataset.max_occurs = 10;
    descriptor.inputs = vec![dataset];
    descriptor.outputs = vec![complex_output("output", &["text/plain"])];
    descriptor
}

fn ncdump(request: &ExecuteRequest) -> Result<Vec<OutputPayload>, Vec<ExceptionDetail>> {
    let summary: Vec<String> = request
        .inputs
        .iter()
        .filter_map(|input| match &input.value {
            WireValue::Complex(complex) => Some(match &complex.data {
                ComplexData::Embedded(data) => format!("embedded:{}", data.len()),
                ComplexData::Reference(url) => format!("reference:{url}"),
            }),
            _ => None,
        })
        .collect();
    Ok(vec![OutputPayload {
        identifier: "output".into(),
        content: PayloadContent::Embedded {
            data: summary.join("\n"),
            encoding: None,
        },
        mimetype: Some("text/plain".into()),
    }])
}

pub fn multiple_outputs_descriptor() -> ProcessDescriptor {
    let mut descriptor = titled(
        ProcessDescriptor::new("multiple_outputs"),
        "Multiple Outputs",
        "Produces several complex outputs.",
    );
    descriptor.outputs = vec![
        complex_output("output", &["application/json"]),
        complex_output("text", &["text/plain"]),
        literal_output("count", "Count"),
    ];
    descriptor
}

fn multiple_outputs(_request: &ExecuteRequest) -> Result<Vec<OutputPayload>, Vec<ExceptionDetail>> {
    Ok(vec![
        OutputPayload::reference(
            "output",
            output_url("multiple_outputs", "output.json"),
            Some("application/json"),
        ),
        OutputPayload::reference(
            "text",
            output_url("multiple_outputs", "output.txt"),
            Some("text/plain"),
        ),
        OutputPayload::literal("count", &["2"]),
    ])
}

pub fn fail_descriptor() -> ProcessDescriptor {
    let mut descriptor = titled(
        ProcessDescriptor::new("fail"),
        "Fail",
        "Always fails.",
    );
    descriptor.outputs = vec![literal_output("output", "Never produced")];
    descriptor
}

fn fail(_request: &ExecuteRequest) -> Result<Vec<OutputPayload>, Vec<ExceptionDetail>> {
    Err(vec![ExceptionDetail {
        code: "NoApplicableCode".into(),
        locator: Some("fail".into()),
        text: "Process failed on purpose".into(),
    }])
}
