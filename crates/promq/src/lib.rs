//! # promq
//!
//! Authenticated instant query client for Prometheus-compatible backends.
//!
//! Runs one PromQL instant query with a bearer credential, bounded by a
//! client-side deadline, and reports the value or the warnings/errors that
//! came back.
//!
//! # Architecture
//!
//! ```text
//! Config ──► HttpTransport ──► AuthTransport ──► QueryClient ──► QueryOutcome ──► ResultReporter
//!            (reqwest)         (Bearer copy)     (POST/GET,       (value /         (stdout/stderr,
//!                                                 deadline)        warnings /        exit code)
//!                                                                  error)
//! ```
//!
//! The credential and backend address are loaded once into an immutable
//! [`Config`] and are never logged or echoed in errors.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod report;
pub mod transport;

pub use cli::{Cli, Format, LogFormat};
pub use config::{Config, Credential, Endpoint};
pub use error::{ConfigError, Error, QueryError, Result, TransportError};
pub use model::{Metric, Sample, SamplePair, SampleStream, StringValue, Value};
pub use query::{Deadline, InstantQuery, QueryClient, QueryOutcome, QueryResult};
pub use report::{ResultReporter, Verdict};
pub use transport::{AuthTransport, FakeTransport, HttpTransport, RoundTripper, authorize};

/// The expression every run evaluates.
pub const QUERY_EXPR: &str = r#"up{job="prometheus-k8s"}"#;

/// Client-side bound on the whole query call.
pub const QUERY_DEADLINE: Duration = Duration::from_secs(10);

/// Execution timeout sent to the backend.
pub const EXECUTION_TIMEOUT: Duration = Duration::from_secs(1);

/// The query issued by the binary: [`QUERY_EXPR`] evaluated now with
/// [`EXECUTION_TIMEOUT`].
#[must_use]
pub fn default_query() -> InstantQuery {
    InstantQuery::new(QUERY_EXPR).with_timeout(EXECUTION_TIMEOUT)
}

/// The authenticated client the binary uses.
pub type BackendClient = QueryClient<AuthTransport<HttpTransport>>;

/// Builds the authenticated transport chain for `config`.
///
/// Client construction (including TLS initialisation) is not bounded by any
/// [`Deadline`]: build the client first, then start the deadline for the
/// query call.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn connect(config: &Config) -> std::result::Result<BackendClient, TransportError> {
    let transport = HttpTransport::new(config)?;
    Ok(QueryClient::new(
        config.endpoint().clone(),
        AuthTransport::new(transport, config.credential().clone()),
    ))
}
