use std::{
    collections::HashSet,
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result, bail};
use clap::{
    Arg, ArgAction, ArgMatches,
    builder::{PossibleValuesParser, ValueParser},
};
use client::{
    Binding, Invocation, OutputFormats, Transport, WpsClient,
    binding::Parameter,
    execution::ExecutionEvents,
    model::{AllowedValue, AllowedValues, DataKind, InputDescriptor},
};

use super::{config::ServiceSettings, progress::EventDisplayer};

const OUTPUT_FORMAT: &str = "output-format";
const AS_OBJECT: &str = "as-object";
const NO_PROGRESS: &str = "no-progress";

/// Long options that no input can take.
const RESERVED_LONGS: [&str; 5] = [OUTPUT_FORMAT, AS_OBJECT, NO_PROGRESS, "help", "version"];

/// Runs the process named by the first of `args`, with the rest of `args`
/// setting its inputs, and prints its outputs.
pub fn run(
    args: &[String],
    settings: &ServiceSettings,
    transport: Arc<dyn Transport>,
    out: &mut dyn Write,
) -> Result<()> {
    let Some(name) = args.first() else {
        bail!("no process given");
    };
    let client = WpsClient::builder(transport)
        .processes(name.as_str())
        .interactive(!settings.sync)
        .poll_interval(settings.poll_interval)
        .build()
        .with_context(|| format!("loading process {name:?}"))?;
    let binding = client
        .bindings()
        .first()
        .with_context(|| format!("process {name:?} has no usable description"))?;

    let matches = command(binding)
        .try_get_matches_from(args)
        .unwrap_or_else(|err| err.exit());
    let request = Request::from_matches(binding, &matches)?;

    let continue_intent = Arc::new(AtomicBool::new(true));
    let mut events = EventDisplayer::new(
        binding.identifier(),
        request.show_progress,
        continue_intent.clone(),
    );
    ctrlc::set_handler(move || continue_intent.store(false, Ordering::SeqCst))?;

    execute(binding, request, &mut events, out)
}

/// Command line interface of a process, with one option per input.
fn command(binding: &Binding) -> clap::Command {
    let descriptor = binding.descriptor();
    let mut command = clap::Command::new(binding.identifier().to_string())
        .long_about(binding.doc().to_string());
    if let Some(title) = &descriptor.title {
        command = command.about(title.clone());
    }
    if let Some(version) = &descriptor.version {
        command = command.version(version.clone());
    }

    let mut longs: HashSet<String> = RESERVED_LONGS.iter().map(|s| s.to_string()).collect();
    for parameter in binding.parameters() {
        let Some(input) = descriptor.input(&parameter.identifier) else {
            continue;
        };
        let long = parameter.identifier.replace(' ', "-");
        if !longs.insert(long.clone()) {
            log::warn!(
                "Input {:?} of {} cannot be set: option --{long} is already taken.",
                parameter.identifier,
                binding.identifier()
            );
            continue;
        }
        command = command.arg(input_arg(parameter, input, long));
    }

    command
        .arg(
            Arg::new(OUTPUT_FORMAT)
                .long(OUTPUT_FORMAT)
                .value_name("OUTPUT[:ref|inline][:MIMETYPE]")
                .help("How to return an output: by reference or inline, and in which mimetype")
                .action(ArgAction::Append)
                .value_parser(parse_output_format),
        )
        .arg(
            Arg::new(AS_OBJECT)
                .long(AS_OBJECT)
                .help("Convert complex outputs, e.g. parse JSON, instead of printing their references")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(NO_PROGRESS)
                .long(NO_PROGRESS)
                .help("Don't show a progress bar")
                .action(ArgAction::SetTrue),
        )
}

fn input_arg(parameter: &Parameter, input: &InputDescriptor, long: String) -> Arg {
    let help = match (&input.title, &parameter.default) {
        (Some(title), Some(default)) => format!("{title}. Default: {default}"),
        (Some(title), None) => title.clone(),
        (None, Some(default)) => format!("Default: {default}"),
        (None, None) => String::new(),
    };
    let value_parser: ValueParser = match possible_values(&input.allowed_values) {
        Some(values) => PossibleValuesParser::new(values).into(),
        None => ValueParser::string(),
    };

    Arg::new(parameter.name.clone())
        .long(long)
        .help(help)
        .value_name(value_name(&input.kind))
        .required(parameter.required)
        .action(if parameter.max_occurs > 1 {
            ArgAction::Append
        } else {
            ArgAction::Set
        })
        .value_parser(value_parser)
}

fn value_name(kind: &DataKind) -> String {
    match kind {
        DataKind::Literal { subtype, .. } => subtype.to_string().to_uppercase(),
        DataKind::Complex(_) => "PATH|URL".to_string(),
        DataKind::BoundingBox { .. } => "BBOX".to_string(),
    }
}

/// The allowed values, when they are all discrete.
fn possible_values(allowed: &AllowedValues) -> Option<Vec<String>> {
    let AllowedValues::Values(values) = allowed else {
        return None;
    };
    values
        .iter()
        .map(|value| match value {
            AllowedValue::Value(value) => Some(value.clone()),
            AllowedValue::Range { .. } => None,
        })
        .collect::<Option<Vec<String>>>()
        .filter(|values| !values.is_empty())
}

/// Value of `--output-format`.
#[derive(Clone, Debug, PartialEq)]
struct OutputFormatArg {
    identifier: String,
    as_reference: Option<bool>,
    mimetype: Option<String>,
}

fn parse_output_format(value: &str) -> Result<OutputFormatArg, String> {
    let mut parts = value.splitn(3, ':');
    let identifier = parts.next().unwrap_or_default();
    if identifier.is_empty() {
        return Err("missing output identifier".to_string());
    }

    let mut as_reference = None;
    let mut mimetype = None;
    match (parts.next(), parts.next()) {
        (None, _) => {}
        (Some(second), third) => {
            match second {
                "ref" | "reference" => as_reference = Some(true),
                "inline" => as_reference = Some(false),
                "" => {}
                other if third.is_none() => mimetype = Some(other.to_string()),
                other => return Err(format!("{other:?} is neither \"ref\" nor \"inline\"")),
            }
            if let Some(third) = third.filter(|third| !third.is_empty()) {
                mimetype = Some(third.to_string());
            }
        }
    }

    Ok(OutputFormatArg {
        identifier: identifier.to_string(),
        as_reference,
        mimetype,
    })
}

/// What to run, and how to show it.
struct Request {
    invocation: Invocation,
    as_object: bool,
    show_progress: bool,
}

impl Request {
    fn from_matches(binding: &Binding, matches: &ArgMatches) -> Result<Self> {
        let mut invocation = Invocation::new();
        for parameter in binding.parameters() {
            let Ok(Some(values)) = matches.try_get_many::<String>(&parameter.name) else {
                continue;
            };
            let mut values: Vec<String> = values.cloned().collect();
            invocation = if parameter.max_occurs > 1 {
                invocation.kwarg(parameter.name.as_str(), values)
            } else {
                match values.pop() {
                    Some(value) => invocation.kwarg(parameter.name.as_str(), value),
                    None => invocation,
                }
            };
        }

        if let Some(formats) = matches.get_many::<OutputFormatArg>(OUTPUT_FORMAT) {
            let descriptor = binding.descriptor();
            let mut output_formats = OutputFormats::new();
            for format in formats {
                if descriptor.output(&format.identifier).is_none() {
                    let known: Vec<&str> = descriptor
                        .outputs
                        .iter()
                        .map(|output| output.identifier.as_str())
                        .collect();
                    bail!(
                        "{} has no output {:?}. Outputs are: {}",
                        binding.identifier(),
                        format.identifier,
                        known.join(", ")
                    );
                }
                output_formats.set(
                    &format.identifier,
                    format.as_reference,
                    format.mimetype.as_deref(),
                );
            }
            invocation = invocation.output_formats(output_formats);
        }

        Ok(Self {
            invocation,
            as_object: matches.get_flag(AS_OBJECT),
            show_progress: !matches.get_flag(NO_PROGRESS),
        })
    }
}

fn execute(
    binding: &Binding,
    request: Request,
    events: &mut dyn ExecutionEvents,
    out: &mut dyn Write,
) -> Result<()> {
    let process = binding.identifier();
    let mut result = binding
        .submit(request.invocation)
        .with_context(|| format!("executing {process}"))?;
    if !result.is_complete() {
        result
            .wait(events)
            .with_context(|| format!("waiting for {process}"))?;
    }
    if !result.is_complete() {
        bail!("Stopped waiting for {process} before it completed.");
    }

    let outputs = result
        .get(request.as_object)
        .with_context(|| format!("getting outputs of {process}"))?;
    for (name, value) in outputs.iter() {
        writeln!(out, "{name} = {value}")?;
    }
    Ok(())
}
