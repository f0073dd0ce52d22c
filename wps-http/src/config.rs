use std::{path::PathBuf, time::Duration};

/// The only protocol version spoken by [crate::HttpTransport].
pub const WPS_VERSION: &str = "1.0.0";

/// Connection settings for a WPS endpoint.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Service endpoint, e.g. `http://localhost:5000/wps`.
    pub url: String,
    /// Whether to verify the server's TLS certificate.
    pub verify: bool,
    /// PEM file holding the client certificate chain and its PKCS#8 key.
    pub cert: Option<PathBuf>,
    /// Sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    /// Preferred language of service responses.
    pub language: Option<String>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub version: String,
    /// GetCapabilities response to use instead of asking the service.
    pub capabilities_xml: Option<String>,
    /// DescribeProcess response to use instead of asking the service. May
    /// describe any number of processes.
    pub describe_xml: Option<String>,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            verify: true,
            cert: None,
            token: None,
            language: None,
            headers: Vec::new(),
            timeout: None,
            version: WPS_VERSION.to_string(),
            capabilities_xml: None,
            describe_xml: None,
        }
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_cert(mut self, cert: Option<PathBuf>) -> Self {
        self.cert = cert;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_capabilities_xml(mut self, xml: impl Into<String>) -> Self {
        self.capabilities_xml = Some(xml.into());
        self
    }

    pub fn with_describe_xml(mut self, xml: impl Into<String>) -> Self {
        self.describe_xml = Some(xml.into());
        self
    }
}
