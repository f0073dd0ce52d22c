use std::{io::Write, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::{Transport, transport::TransportError};
use simplelog::LevelFilter;

mod config;
mod describe;
mod language;
mod list;
mod process;
mod progress;

/// Command line client for OGC Web Processing Services.
///
/// Every process offered by the service can be run as a subcommand, e.g.
/// `wpsbind hello --name World`. Use `wpsbind <process> --help` to list the
/// inputs of a process.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    service: config::ServiceArgs,

    /// Logging level.
    #[arg(long, default_value = "Warn")]
    log_level: LevelFilter,
}

#[derive(Subcommand)]
enum Command {
    /// Lists the processes offered by the service.
    List,
    /// Describes the service or one of its processes.
    Describe(describe::Command),
    /// Shows the languages of the service.
    Language(language::Command),
    /// Runs a process offered by the service.
    #[command(external_subcommand)]
    Process(Vec<String>),
}

pub fn run() -> Result<()> {
    let args = Args::parse();

    simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default())
        .with_context(|| "configuring logging")?;

    let xdg_dirs = xdg::BaseDirectories::with_prefix("wpsbind");
    let settings = args.service.resolve(&xdg_dirs)?;

    dispatch(&args.command, &settings).map_err(|err| match hint(&err, &settings.url) {
        Some(hint) => err.context(hint),
        None => err,
    })
}

fn dispatch(command: &Command, settings: &config::ServiceSettings) -> Result<()> {
    let transport: Arc<dyn Transport> = Arc::new(
        wps_http::HttpTransport::new(settings.transport_config()?)
            .with_context(|| format!("setting up connection to {}", settings.url))?,
    );
    let mut stdout = std::io::stdout().lock();

    use Command::*;
    let result = match command {
        List => list::run(transport, &mut stdout),
        Describe(cmd) => describe::run(cmd, transport, &mut stdout),
        Language(cmd) => language::run(cmd, settings.language.as_deref(), transport, &mut stdout),
        Process(args) => process::run(args, settings, transport, &mut stdout),
    };
    result?;
    stdout.flush()?;
    Ok(())
}

const TOKEN_HINT: &str = "Access was denied. Pass an access token with --token or WPS_TOKEN.";

/// Suggests how to recover from failing to reach the service.
fn hint(err: &anyhow::Error, url: &str) -> Option<String> {
    for cause in err.chain() {
        let transport = if let Some(err) = cause.downcast_ref::<client::Error>() {
            match err {
                client::Error::Unauthorized { .. } => return Some(TOKEN_HINT.to_string()),
                client::Error::Transport(transport) => transport,
                _ => continue,
            }
        } else if let Some(transport) = cause.downcast_ref::<TransportError>() {
            transport
        } else {
            continue;
        };

        match transport {
            TransportError::CertificateVerification { .. } => {
                return Some(
                    "SSL verification of the server certificate failed. \
                     Set WPS_SSL_VERIFY=false or pass --insecure."
                        .to_string(),
                );
            }
            TransportError::Connection { .. } => {
                return Some(format!("Could not connect to Web Processing Service ({url})"));
            }
            TransportError::AccessForbidden { .. } => return Some(TOKEN_HINT.to_string()),
            _ => {}
        }
    }
    None
}
