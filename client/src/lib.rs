//! Client for OGC Web Processing Services. Each process offered by a service
//! becomes a [binding::Binding] that can be called like a function.

pub mod binding;
pub mod catalog;
pub mod convert;
pub mod error;
pub mod execution;
pub mod model;
pub mod result;
pub mod sanitize;
pub mod service;
#[cfg(any(test, feature = "testing"))]
pub mod testutil;
pub mod transport;
pub mod typebridge;
pub mod value;

pub use binding::{Binding, Invocation, OutputFormats};
pub use error::Error;
pub use result::{ExecutionResult, Outputs};
pub use service::{WpsClient, WpsClientBuilder};
pub use transport::Transport;
pub use value::{InputValue, LiteralValue, Value};
