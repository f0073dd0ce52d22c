use std::{error::Error as StdError, fs};

use client::{
    model::{Capabilities, ProcessDescriptor},
    transport::{
        CancelOutcome, ExceptionDetail, ExecuteRequest, RequestKind, StatusReport, Transport,
        TransportError,
    },
};
use reqwest::{
    StatusCode,
    blocking::{Client, RequestBuilder},
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use url::Url;

use crate::{
    config::TransportConfig,
    xml::{self, ACCESS_FORBIDDEN, XmlError},
};

/// Speaks WPS 1.0.0 to the service at [TransportConfig::url]:
/// GetCapabilities and DescribeProcess as KVP GET requests, Execute as an
/// XML POST.
pub struct HttpTransport {
    config: TransportConfig,
    client: Client,
    /// Parsed from [TransportConfig::describe_xml].
    offline_descriptions: Option<Vec<ProcessDescriptor>>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let value = header_value(&config.url, &format!("Bearer {token}"))?;
            headers.insert(AUTHORIZATION, value);
        }
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                TransportError::Connection {
                    url: config.url.clone(),
                    message: format!("invalid header name {name:?}: {err}"),
                }
            })?;
            headers.insert(name, header_value(&config.url, value)?);
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(cert) = &config.cert {
            let pem = fs::read(cert)?;
            let identity = reqwest::Identity::from_pkcs8_pem(&pem, &pem).map_err(|err| {
                TransportError::CertificateVerification {
                    message: format!("client certificate {}: {err}", cert.display()),
                }
            })?;
            builder = builder.identity(identity);
        }
        let client = builder
            .build()
            .map_err(|err| request_error(&config.url, &err))?;

        let offline_descriptions = config
            .describe_xml
            .as_deref()
            .map(xml::parse_process_descriptions)
            .transpose()
            .map_err(|err| xml_error(RequestKind::DescribeProcess, err))?;

        Ok(Self {
            config,
            client,
            offline_descriptions,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// URL of a KVP request to the service.
    pub(crate) fn kvp_url(
        &self,
        request: &str,
        params: &[(&str, &str)],
    ) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.config.url).map_err(|err| TransportError::Connection {
            url: self.config.url.clone(),
            message: err.to_string(),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("service", "WPS")
                .append_pair("request", request)
                .append_pair("version", &self.config.version);
            for (name, value) in params {
                query.append_pair(name, value);
            }
            if let Some(language) = &self.config.language {
                query.append_pair("language", language);
            }
        }
        Ok(url)
    }

    fn send(
        &self,
        builder: RequestBuilder,
        url: &str,
        request: RequestKind,
    ) -> Result<Vec<u8>, TransportError> {
        let response = builder.send().map_err(|err| request_error(url, &err))?;
        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
            return Err(TransportError::AccessForbidden { request });
        }
        let body = response
            .bytes()
            .map_err(|err| request_error(url, &err))?
            .to_vec();
        if status.is_success() {
            return Ok(body);
        }

        let exceptions = std::str::from_utf8(&body)
            .ok()
            .and_then(xml::parse_exception_report);
        match exceptions {
            Some(exceptions) => Err(service_error(request, exceptions)),
            None => Err(TransportError::Connection {
                url: url.to_string(),
                message: format!("HTTP {status}"),
            }),
        }
    }

    fn send_xml<T>(
        &self,
        builder: RequestBuilder,
        url: &str,
        request: RequestKind,
        parse: fn(&str) -> Result<T, XmlError>,
    ) -> Result<T, TransportError> {
        let body = self.send(builder, url, request)?;
        let text = String::from_utf8(body).map_err(|err| TransportError::Malformed {
            request,
            message: err.to_string(),
        })?;
        parse(&text).map_err(|err| xml_error(request, err))
    }

    fn get_xml<T>(
        &self,
        url: &str,
        request: RequestKind,
        parse: fn(&str) -> Result<T, XmlError>,
    ) -> Result<T, TransportError> {
        log::debug!("GET {url}");
        self.send_xml(self.client.get(url), url, request, parse)
    }
}

impl Transport for HttpTransport {
    fn base_url(&self) -> &str {
        &self.config.url
    }

    fn capabilities(&self) -> Result<Capabilities, TransportError> {
        if let Some(doc) = &self.config.capabilities_xml {
            return xml::parse_capabilities(doc)
                .map_err(|err| xml_error(RequestKind::GetCapabilities, err));
        }
        let url = self.kvp_url("GetCapabilities", &[])?;
        self.get_xml(
            url.as_str(),
            RequestKind::GetCapabilities,
            xml::parse_capabilities,
        )
    }

    fn describe_process(&self, identifier: &str) -> Result<ProcessDescriptor, TransportError> {
        let descriptions = match &self.offline_descriptions {
            Some(descriptions) => descriptions.clone(),
            None => {
                let url = self.kvp_url("DescribeProcess", &[("identifier", identifier)])?;
                self.get_xml(
                    url.as_str(),
                    RequestKind::DescribeProcess,
                    xml::parse_process_descriptions,
                )?
            }
        };
        descriptions
            .into_iter()
            .find(|descriptor| descriptor.identifier.eq_ignore_ascii_case(identifier))
            .ok_or_else(|| TransportError::Service {
                request: RequestKind::DescribeProcess,
                exceptions: vec![ExceptionDetail {
                    code: "InvalidParameterValue".into(),
                    locator: Some("identifier".into()),
                    text: format!("no description of process {identifier:?}"),
                }],
            })
    }

    fn execute(&self, request: &ExecuteRequest) -> Result<StatusReport, TransportError> {
        let doc = xml::execute_document(
            request,
            &self.config.version,
            self.config.language.as_deref(),
        )?;
        log::debug!("POST {} with:\n{doc}", self.config.url);
        let builder = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(doc);
        self.send_xml(
            builder,
            &self.config.url,
            RequestKind::Execute,
            xml::parse_execute_response,
        )
    }

    fn check_status(&self, location: &str) -> Result<StatusReport, TransportError> {
        self.get_xml(location, RequestKind::GetStatus, xml::parse_execute_response)
    }

    fn cancel(&self, location: &str) -> Result<CancelOutcome, TransportError> {
        // WPS 1.0.0 has no dismiss operation.
        log::debug!("Cannot cancel {location}.");
        Ok(CancelOutcome::Unsupported)
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let local = Url::parse(url)
            .ok()
            .filter(|parsed| parsed.scheme() == "file")
            .and_then(|parsed| parsed.to_file_path().ok());
        if let Some(path) = local {
            return Ok(fs::read(path)?);
        }
        log::debug!("GET {url}");
        self.send(self.client.get(url), url, RequestKind::Fetch)
    }

    fn is_opendap(&self, url: &str) -> bool {
        match self.client.head(url).send() {
            Ok(response) => response
                .headers()
                .get("Content-Description")
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.trim().to_ascii_lowercase().starts_with("dods")),
            Err(err) => {
                log::debug!("Could not probe {url} for OPeNDAP: {err}");
                false
            }
        }
    }
}

fn header_value(url: &str, value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|err| TransportError::Connection {
        url: url.to_string(),
        message: format!("invalid header value: {err}"),
    })
}

/// Exceptions reported by the service, with access-control rejections kept
/// apart.
pub(crate) fn service_error(
    request: RequestKind,
    exceptions: Vec<ExceptionDetail>,
) -> TransportError {
    let forbidden = exceptions
        .iter()
        .any(|exception| exception.code.eq_ignore_ascii_case(ACCESS_FORBIDDEN));
    if forbidden {
        TransportError::AccessForbidden { request }
    } else {
        TransportError::Service {
            request,
            exceptions,
        }
    }
}

pub(crate) fn xml_error(request: RequestKind, err: XmlError) -> TransportError {
    match err {
        XmlError::ExceptionReport(exceptions) => service_error(request, exceptions),
        other => TransportError::Malformed {
            request,
            message: other.to_string(),
        },
    }
}

/// Tells TLS certificate failures apart from other connection failures.
fn request_error(url: &str, err: &reqwest::Error) -> TransportError {
    let mut source: Option<&dyn StdError> = Some(err);
    while let Some(current) = source {
        if current.to_string().to_lowercase().contains("certificate") {
            return TransportError::CertificateVerification {
                message: current.to_string(),
            };
        }
        source = current.source();
    }
    TransportError::Connection {
        url: url.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests;
