use std::{
    collections::BTreeMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use client::execution::DEFAULT_POLL_INTERVAL;
use serde::Deserialize;
use wps_http::TransportConfig;

pub const DEFAULT_URL: &str = "http://localhost:5000/wps";
const CONFIG_FILE: &str = "config.yaml";
const CLIENT_CERT_HEADER: &str = "X-Ssl-Client-Cert";

/// Options selecting the service and how to talk to it. Each takes
/// precedence over its environment variable, which takes precedence over the
/// configuration file.
#[derive(clap::Args, Debug, Default)]
pub struct ServiceArgs {
    /// URL of the Web Processing Service.
    #[arg(long, env = "WPS_SERVICE")]
    pub url: Option<String>,

    /// Don't validate the server's certificate.
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// Whether to validate the server's certificate. "false", "0" and "no"
    /// disable validation.
    #[arg(long, env = "WPS_SSL_VERIFY", hide = true)]
    pub ssl_verify: Option<String>,

    /// Client side certificate containing both certificate and private key.
    #[arg(long, env = "WPS_CERT")]
    pub cert: Option<PathBuf>,

    /// Send the client side certificate in the X-Ssl-Client-Cert header,
    /// for services behind a proxy that terminates TLS.
    #[arg(long)]
    pub send: bool,

    /// Token to access the WPS service.
    #[arg(short, long, env = "WPS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Preferred language of the service's responses.
    #[arg(long, env = "WPS_LANGUAGE")]
    pub language: Option<String>,

    /// Execute processes in sync mode. Default: async mode.
    #[arg(short, long)]
    pub sync: bool,

    /// Path to the configuration file. Defaults to wpsbind/config.yaml in
    /// the XDG configuration directories.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ServiceArgs {
    /// Combines the arguments with the configuration file.
    pub fn resolve(&self, xdg_dirs: &xdg::BaseDirectories) -> Result<ServiceSettings> {
        let path = match &self.config {
            Some(path) => Some(path.clone()),
            None => xdg_dirs.find_config_file(CONFIG_FILE),
        };
        let file = match path {
            Some(path) => load_config(&path)?,
            None => FileConfig::default(),
        };
        self.merge(file)
    }

    pub fn merge(&self, file: FileConfig) -> Result<ServiceSettings> {
        let verify = if self.insecure {
            false
        } else {
            match &self.ssl_verify {
                Some(value) => parse_verify(value),
                None => file.verify.unwrap_or(true),
            }
        };

        let poll_interval = match file.poll_interval {
            Some(secs) => seconds(secs).with_context(|| "invalid poll_interval")?,
            None => DEFAULT_POLL_INTERVAL,
        };
        let timeout = file
            .timeout
            .map(seconds)
            .transpose()
            .with_context(|| "invalid timeout")?;

        Ok(ServiceSettings {
            url: self
                .url
                .clone()
                .or(file.url)
                .unwrap_or_else(|| DEFAULT_URL.to_string()),
            verify,
            cert: self.cert.clone().or(file.cert),
            send_cert: self.send || file.send_cert.unwrap_or(false),
            token: self.token.clone().or(file.token),
            language: self.language.clone().or(file.language),
            sync: self.sync || file.sync.unwrap_or(false),
            poll_interval,
            timeout,
            headers: file.headers.into_iter().collect(),
        })
    }
}

/// Interprets the value of `WPS_SSL_VERIFY`.
pub fn parse_verify(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no"
    )
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("{secs} is not a valid duration"))
}

/// Settings read from the YAML configuration file. Every field is optional.
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub url: Option<String>,
    pub verify: Option<bool>,
    pub cert: Option<PathBuf>,
    pub send_cert: Option<bool>,
    pub token: Option<String>,
    pub language: Option<String>,
    pub sync: Option<bool>,
    /// Seconds between status requests of asynchronous executions.
    pub poll_interval: Option<f64>,
    /// Seconds to wait for each HTTP request.
    pub timeout: Option<f64>,
    /// Extra HTTP headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

pub fn load_config(path: &Path) -> Result<FileConfig> {
    let file = File::open(path)
        .with_context(|| format!("opening configuration file {}", path.display()))?;
    parse_config(file).with_context(|| format!("reading configuration file {}", path.display()))
}

pub fn parse_config(rdr: impl Read) -> Result<FileConfig> {
    serde_yaml_ng::from_reader(rdr).with_context(|| "parsing configuration file")
}

/// Fully resolved settings.
#[derive(Debug, PartialEq)]
pub struct ServiceSettings {
    pub url: String,
    pub verify: bool,
    pub cert: Option<PathBuf>,
    pub send_cert: bool,
    pub token: Option<String>,
    pub language: Option<String>,
    pub sync: bool,
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
    pub headers: Vec<(String, String)>,
}

impl ServiceSettings {
    pub fn transport_config(&self) -> Result<TransportConfig> {
        let mut config = TransportConfig::new(&self.url)
            .with_verify(self.verify)
            .with_cert(self.cert.clone())
            .with_token(self.token.clone())
            .with_language(self.language.clone());
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        for (name, value) in &self.headers {
            config = config.with_header(name, value);
        }

        match (self.send_cert, &self.cert) {
            (true, Some(cert)) => {
                let pem = std::fs::read(cert)
                    .with_context(|| format!("reading client certificate {}", cert.display()))?;
                let encoded: String = url::form_urlencoded::byte_serialize(&pem).collect();
                config = config.with_header(CLIENT_CERT_HEADER, encoded);
            }
            (true, None) => log::warn!("No client certificate to send, ignoring --send."),
            (false, _) => {}
        }
        Ok(config)
    }
}
