//! [client::Transport] for OGC Web Processing Service 1.0.0 endpoints,
//! spoken over HTTP(S).

mod config;
mod http;
mod xml;

pub use config::{TransportConfig, WPS_VERSION};
pub use http::HttpTransport;
pub use xml::XmlError;
