use std::{io::Write, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use client::{Transport, WpsClient};

/// Describes the service, or one of its processes.
#[derive(Args, Debug)]
pub struct Command {
    /// Identifier of the process to describe. Describes the service when
    /// omitted.
    process: Option<String>,

    /// How to print the description.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Format {
    /// Help text, with the call signature of processes.
    Text,
    Yaml,
    Json,
}

pub fn run(cmd: &Command, transport: Arc<dyn Transport>, out: &mut dyn Write) -> Result<()> {
    match &cmd.process {
        Some(process) => describe_process(process, cmd.format, transport, out),
        None => describe_service(cmd.format, transport, out),
    }
}

fn describe_process(
    process: &str,
    format: Format,
    transport: Arc<dyn Transport>,
    out: &mut dyn Write,
) -> Result<()> {
    let client = WpsClient::builder(transport)
        .processes(process)
        .build()
        .with_context(|| format!("describing process {process:?}"))?;
    let binding = client
        .bindings()
        .first()
        .with_context(|| format!("process {process:?} has no usable description"))?;

    let descriptor = binding.descriptor().as_ref();
    match format {
        Format::Text => writeln!(out, "{}\n\n{}", binding.signature(), binding.doc())?,
        Format::Yaml => serde_yaml_ng::to_writer(&mut *out, descriptor)?,
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, descriptor)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn describe_service(format: Format, transport: Arc<dyn Transport>, out: &mut dyn Write) -> Result<()> {
    let client = WpsClient::new(transport).with_context(|| "describing the service")?;

    let capabilities = client.capabilities();
    match format {
        Format::Text => {
            if let Some(title) = &capabilities.title {
                writeln!(out, "{title}")?;
            }
            writeln!(out, "{}", client.doc())?;
        }
        Format::Yaml => serde_yaml_ng::to_writer(&mut *out, capabilities)?,
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, capabilities)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
