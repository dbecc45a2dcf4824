//! Time-bounded instant query execution.
//!
//! A [`QueryClient`] sends one instant query to `/api/v1/query` through any
//! [`RoundTripper`] and decodes the response envelope. The call is bounded by
//! a [`Deadline`]: when it fires, the in-flight request future is dropped
//! (closing its connection) and the call returns
//! [`QueryError::DeadlineExceeded`].

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::CONTENT_TYPE;
use http::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Endpoint;
use crate::error::{QueryError, TransportError};
use crate::model::Value;
use crate::transport::RoundTripper;

/// Path of the instant query endpoint, relative to the backend base address.
pub const QUERY_PATH: &str = "/api/v1/query";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An instant query: expression, evaluation time, server-side timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantQuery {
    expr: String,
    time: Option<DateTime<Utc>>,
    timeout: Option<Duration>,
}

impl InstantQuery {
    /// Creates a query evaluated at the time it is sent.
    #[must_use]
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            time: None,
            timeout: None,
        }
    }

    /// Evaluates the query at a fixed time.
    #[must_use]
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Sets the execution timeout sent to the server.
    ///
    /// This is advisory to the backend and independent of the client-side
    /// [`Deadline`].
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The PromQL expression.
    #[must_use]
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// The fixed evaluation time, if any.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    /// The server-side execution timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Request parameters in wire order. `now` is used when no time is set.
    fn params(&self, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("query", self.expr.clone()),
            ("time", format_time(self.time.unwrap_or(now))),
        ];
        if let Some(timeout) = self.timeout.filter(|t| !t.is_zero()) {
            params.push(("timeout", format_duration(timeout)));
        }
        params
    }
}

/// Client-side bound on a query call: an absolute instant plus a
/// cancellation token that can end the call early.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    timeout: Duration,
    token: CancellationToken,
}

impl Deadline {
    /// A deadline `timeout` from now with a fresh cancellation token.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self::with_token(timeout, CancellationToken::new())
    }

    /// A deadline `timeout` from now bound to an existing token.
    #[must_use]
    pub fn with_token(timeout: Duration, token: CancellationToken) -> Self {
        Self {
            at: Instant::now() + timeout,
            timeout,
            token,
        }
    }

    /// The configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The instant at which the deadline fires.
    #[must_use]
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before the deadline fires.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// The cancellation token observed by the call.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancels any call bound to this deadline.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// A decoded successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// The query result.
    pub value: Value,
    /// Warnings returned alongside the value.
    pub warnings: Vec<String>,
    /// Informational notices returned alongside the value.
    pub infos: Vec<String>,
}

/// The three-way classification consumed by the reporter.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// A value without warnings.
    Value(Value),
    /// A value accompanied by at least one warning.
    Warnings {
        /// The value the backend returned.
        value: Value,
        /// The warnings, never empty.
        warnings: Vec<String>,
    },
    /// The query failed.
    Error(QueryError),
}

impl QueryOutcome {
    /// Returns `true` only for a clean value.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl From<Result<QueryResult, QueryError>> for QueryOutcome {
    fn from(result: Result<QueryResult, QueryError>) -> Self {
        match result {
            Ok(QueryResult {
                value, warnings, ..
            }) if warnings.is_empty() => Self::Value(value),
            Ok(QueryResult {
                value, warnings, ..
            }) => Self::Warnings { value, warnings },
            Err(err) => Self::Error(err),
        }
    }
}

/// Response envelope of the query API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Option<Vec<String>>,
    #[serde(default)]
    infos: Option<Vec<String>>,
}

/// Executes instant queries against one backend.
#[derive(Debug, Clone)]
pub struct QueryClient<T> {
    endpoint: Endpoint,
    transport: T,
}

impl<T: RoundTripper> QueryClient<T> {
    /// Creates a client for `endpoint` sending through `transport`.
    #[must_use]
    pub const fn new(endpoint: Endpoint, transport: T) -> Self {
        Self {
            endpoint,
            transport,
        }
    }

    /// Runs `query`, returning no later than `deadline`.
    ///
    /// Warnings in a successful response are returned in the
    /// [`QueryResult`], not as an error.
    ///
    /// # Errors
    ///
    /// - [`QueryError::EmptyQuery`] if the expression is blank (nothing is sent)
    /// - [`QueryError::DeadlineExceeded`] / [`QueryError::Canceled`] if the
    ///   deadline fires or the token is canceled first
    /// - [`QueryError::Transport`] if the backend cannot be reached
    /// - [`QueryError::ServerRejected`] / [`QueryError::BadResponse`] for
    ///   error payloads and malformed responses
    pub async fn query(
        &self,
        query: &InstantQuery,
        deadline: &Deadline,
    ) -> Result<QueryResult, QueryError> {
        if query.expr().trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        if deadline.token().is_cancelled() {
            return Err(QueryError::Canceled);
        }

        debug!(
            query = query.expr(),
            server_timeout = ?query.timeout(),
            deadline = ?deadline.timeout(),
            "executing instant query"
        );
        let params = query.params(Utc::now());

        // Checked in order: a response that is ready at the same instant the
        // deadline fires is discarded.
        let result = tokio::select! {
            biased;
            () = deadline.token().cancelled() => {
                warn!("query canceled before a response arrived");
                Err(QueryError::Canceled)
            }
            () = tokio::time::sleep_until(deadline.instant()) => {
                warn!(deadline = ?deadline.timeout(), "query deadline exceeded");
                Err(QueryError::DeadlineExceeded { timeout: deadline.timeout() })
            }
            result = self.send(&params) => result,
        };

        if let Ok(ref res) = result {
            debug!(
                result_type = res.value.result_type(),
                series = res.value.series_count(),
                warnings = res.warnings.len(),
                "query complete"
            );
        }
        result
    }

    /// Runs `query` and classifies the result into a [`QueryOutcome`].
    pub async fn execute(&self, query: &InstantQuery, deadline: &Deadline) -> QueryOutcome {
        self.query(query, deadline).await.into()
    }

    /// Sends the query as a form POST, falling back to GET once if the
    /// backend does not allow or implement POST.
    async fn send(&self, params: &[(&'static str, String)]) -> Result<QueryResult, QueryError> {
        let url = self.endpoint.join(QUERY_PATH);
        let form = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        let post = Request::builder()
            .method(Method::POST)
            .uri(url.as_str())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(Bytes::from(form.clone()))
            .map_err(invalid_request)?;
        let mut response = self.transport.round_trip(&post).await?;

        if matches!(
            response.status(),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            debug!(
                status = response.status().as_u16(),
                "POST refused by backend, retrying as GET"
            );
            let mut get_url = url;
            get_url.set_query(Some(form.as_str()));
            let get = Request::builder()
                .method(Method::GET)
                .uri(get_url.as_str())
                .body(Bytes::new())
                .map_err(invalid_request)?;
            response = self.transport.round_trip(&get).await?;
        }

        decode_response(&response)
    }
}

fn invalid_request(err: http::Error) -> QueryError {
    TransportError::InvalidRequest {
        message: err.to_string(),
    }
    .into()
}

/// Status codes on which the backend sends a JSON error envelope.
fn carries_envelope(status: StatusCode) -> bool {
    status.is_success()
        || status == StatusCode::BAD_REQUEST
        || status == StatusCode::UNPROCESSABLE_ENTITY
}

fn decode_response(response: &Response<Bytes>) -> Result<QueryResult, QueryError> {
    let status = response.status();
    let code = status.as_u16();

    if !carries_envelope(status) {
        return Err(if status.is_server_error() {
            QueryError::server_rejected("server_error", format!("server error: {code}"))
        } else if status.is_client_error() {
            QueryError::server_rejected("client_error", format!("client error: {code}"))
        } else {
            QueryError::server_rejected("bad_response", format!("bad response code {code}"))
        });
    }
    if status == StatusCode::NO_CONTENT {
        return Err(QueryError::bad_response("no content in response"));
    }

    let envelope: ApiResponse = serde_json::from_slice(response.body())
        .map_err(|e| QueryError::bad_response(format!("invalid response envelope: {e}")))?;
    let warnings = envelope.warnings.unwrap_or_default();
    let infos = envelope.infos.unwrap_or_default();

    match envelope.status.as_str() {
        "error" => {
            if !warnings.is_empty() {
                warn!(count = warnings.len(), "backend returned warnings with an error");
            }
            Err(QueryError::server_rejected(
                envelope.error_type.unwrap_or_else(|| "unknown".to_string()),
                envelope.error.unwrap_or_default(),
            ))
        }
        "success" if !status.is_success() => Err(QueryError::bad_response(
            "inconsistent body for response code",
        )),
        "success" => {
            let data = envelope
                .data
                .ok_or_else(|| QueryError::bad_response("missing data in success response"))?;
            let value: Value = serde_json::from_value(data)
                .map_err(|e| QueryError::bad_response(format!("invalid result: {e}")))?;
            Ok(QueryResult {
                value,
                warnings,
                infos,
            })
        }
        other => Err(QueryError::bad_response(format!(
            "unknown response status {other:?}"
        ))),
    }
}

/// Unix seconds as a decimal float, e.g. `1435781451.781`.
fn format_time(time: DateTime<Utc>) -> String {
    let seconds =
        time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) / 1_000_000_000.0;
    seconds.to_string()
}

/// Duration in the backend's duration syntax, e.g. `1s` or `1500ms`.
fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 && duration.as_secs() > 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis().max(1))
    }
}
