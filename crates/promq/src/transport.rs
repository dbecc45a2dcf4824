//! HTTP transport layer.
//!
//! [`RoundTripper`] is the seam between the query protocol and the network.
//! [`AuthTransport`] decorates any round tripper with the bearer credential
//! without touching the caller's request: it builds a copy through
//! [`authorize`] and forwards only the copy. [`HttpTransport`] is the real
//! network implementation and [`FakeTransport`] a scripted one for tests.
//!
//! ```text
//! QueryClient ──&Request──► AuthTransport ──&Request(copy + Authorization)──► HttpTransport ──► backend
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{Request, Response, StatusCode};
use parking_lot::Mutex;
use tracing::trace;

use crate::config::{Config, Credential};
use crate::error::TransportError;

/// Sends one HTTP request and returns the complete response.
///
/// The request is borrowed immutably, so an implementation can never alter
/// the caller's copy. Dropping the returned future must abort the exchange.
#[allow(async_fn_in_trait)]
pub trait RoundTripper {
    /// Performs a single request/response exchange.
    async fn round_trip(&self, request: &Request<Bytes>)
    -> Result<Response<Bytes>, TransportError>;
}

impl<T: RoundTripper> RoundTripper for Arc<T> {
    async fn round_trip(
        &self,
        request: &Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        (**self).round_trip(request).await
    }
}

/// Returns a copy of `request` carrying `Authorization: Bearer <token>`.
///
/// Method, URI, version and body are carried over; the header map is cloned
/// and any existing `Authorization` values are replaced, so the result holds
/// exactly one. The input is left untouched.
#[must_use]
pub fn authorize(request: &Request<Bytes>, credential: &Credential) -> Request<Bytes> {
    let mut headers = request.headers().clone();
    headers.insert(AUTHORIZATION, credential.header_value().clone());

    let mut authorized = Request::new(request.body().clone());
    *authorized.method_mut() = request.method().clone();
    *authorized.uri_mut() = request.uri().clone();
    *authorized.version_mut() = request.version();
    *authorized.headers_mut() = headers;
    authorized
}

/// Round tripper decorator that injects the bearer credential.
#[derive(Debug, Clone)]
pub struct AuthTransport<T> {
    inner: T,
    credential: Credential,
}

impl<T> AuthTransport<T> {
    /// Wraps `inner`, binding `credential` for every request.
    #[must_use]
    pub const fn new(inner: T, credential: Credential) -> Self {
        Self { inner, credential }
    }
}

impl<T: RoundTripper> RoundTripper for AuthTransport<T> {
    async fn round_trip(
        &self,
        request: &Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let authorized = authorize(request, &self.credential);
        // Passed through as-is: errors are neither wrapped nor swallowed.
        self.inner.round_trip(&authorized).await
    }
}

/// Network transport backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport using the connect timeout and user agent from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(TransportError::from_reqwest)?;
        Ok(Self { client })
    }
}

impl RoundTripper for HttpTransport {
    async fn round_trip(
        &self,
        request: &Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let outgoing =
            reqwest::Request::try_from(request.clone()).map_err(TransportError::from_reqwest)?;
        let response = self
            .client
            .execute(outgoing)
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(TransportError::from_reqwest)?;

        trace!(%method, %path, status = status.as_u16(), bytes = body.len(), "round trip complete");

        let mut incoming = Response::new(body);
        *incoming.status_mut() = status;
        *incoming.version_mut() = version;
        *incoming.headers_mut() = headers;
        Ok(incoming)
    }
}

/// One scripted reply of a [`FakeTransport`].
#[derive(Debug)]
enum FakeReply {
    Response(Response<Bytes>),
    Error(TransportError),
}

#[derive(Debug, Default)]
struct FakeState {
    replies: VecDeque<FakeReply>,
    requests: Vec<Request<Bytes>>,
    delay: Duration,
}

/// Scripted in-memory transport for testing.
///
/// Replies are returned in the order they were queued. Every request seen is
/// recorded. An optional delay is applied before each reply using Tokio's
/// clock, so paused-time tests can model a slow backend.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    /// Creates a fake transport with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response with the given status and body.
    pub fn respond(&self, status: StatusCode, body: impl Into<Bytes>) -> &Self {
        let mut response = Response::new(body.into());
        *response.status_mut() = status;
        self.state
            .lock()
            .replies
            .push_back(FakeReply::Response(response));
        self
    }

    /// Queues a JSON response.
    pub fn respond_json(&self, status: StatusCode, body: &serde_json::Value) -> &Self {
        self.respond(status, body.to_string())
    }

    /// Queues a transport failure.
    pub fn fail(&self, error: TransportError) -> &Self {
        self.state.lock().replies.push_back(FakeReply::Error(error));
        self
    }

    /// Delays every reply by `delay`.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().delay = delay;
        self
    }

    /// Requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<Request<Bytes>> {
        self.state.lock().requests.clone()
    }
}

impl RoundTripper for FakeTransport {
    async fn round_trip(
        &self,
        request: &Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let delay = {
            let mut state = self.state.lock();
            state.requests.push(request.clone());
            state.delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = self.state.lock().replies.pop_front();
        match reply {
            Some(FakeReply::Response(response)) => Ok(response),
            Some(FakeReply::Error(error)) => Err(error),
            None => Err(TransportError::Request {
                message: "no scripted reply".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
    use http::{HeaderMap, Method};
    use proptest::prelude::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential() -> Credential {
        Credential::bearer("abc123").expect("credential")
    }

    fn sample_request() -> Request<Bytes> {
        Request::builder()
            .method(Method::POST)
            .uri("http://example:9090/api/v1/query")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-trace", "1")
            .body(Bytes::from_static(b"query=up"))
            .expect("request")
    }

    #[test]
    fn authorize_adds_header_to_copy_only() {
        let original = sample_request();
        let before = original.headers().clone();

        let authorized = authorize(&original, &credential());

        assert_eq!(original.headers(), &before);
        assert!(original.headers().get(AUTHORIZATION).is_none());
        assert_eq!(authorized.headers().get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(authorized.headers()[AUTHORIZATION], "Bearer abc123");
        assert_eq!(authorized.headers()["x-trace"], "1");
        assert_eq!(authorized.method(), Method::POST);
        assert_eq!(authorized.uri(), original.uri());
        assert_eq!(authorized.body(), original.body());
    }

    #[test]
    fn authorize_replaces_existing_authorization() {
        let mut original = sample_request();
        original
            .headers_mut()
            .append(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        original
            .headers_mut()
            .append(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));

        let authorized = authorize(&original, &credential());

        let values: Vec<_> = authorized.headers().get_all(AUTHORIZATION).iter().collect();
        assert_eq!(values, vec!["Bearer abc123"]);
        assert_eq!(original.headers().get_all(AUTHORIZATION).iter().count(), 2);
    }

    #[test]
    fn authorized_header_is_sensitive() {
        let authorized = authorize(&sample_request(), &credential());
        assert!(authorized.headers()[AUTHORIZATION].is_sensitive());
    }

    proptest! {
        #[test]
        fn authorize_never_mutates_caller_headers(
            headers in proptest::collection::vec(("[a-z][a-z0-9-]{0,15}", "[!-~][ -~]{0,30}"), 0..8),
            token in "[A-Za-z0-9._~+/-]{1,40}",
        ) {
            let mut original = Request::new(Bytes::new());
            for (name, value) in &headers {
                let name = HeaderName::from_bytes(name.as_bytes()).expect("name");
                let value = HeaderValue::from_str(value).expect("value");
                original.headers_mut().append(name, value);
            }
            let before: HeaderMap = original.headers().clone();
            let cred = Credential::bearer(&token).expect("credential");

            let authorized = authorize(&original, &cred);

            prop_assert_eq!(original.headers(), &before);
            let auth: Vec<_> = authorized.headers().get_all(AUTHORIZATION).iter().collect();
            prop_assert_eq!(auth.len(), 1);
            let expected = format!("Bearer {token}");
            prop_assert_eq!(auth[0].to_str().expect("ascii"), expected.as_str());
        }
    }

    #[tokio::test]
    async fn auth_transport_forwards_authorized_copy() {
        let fake = FakeTransport::new();
        fake.respond(StatusCode::OK, "ok");
        let transport = AuthTransport::new(fake.clone(), credential());

        let original = sample_request();
        let before = original.headers().clone();
        let response = transport.round_trip(&original).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &Bytes::from_static(b"ok"));
        assert_eq!(original.headers(), &before);

        let sent = fake.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].headers().get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(sent[0].headers()[AUTHORIZATION], "Bearer abc123");
    }

    #[tokio::test]
    async fn auth_transport_passes_errors_through_verbatim() {
        let fake = FakeTransport::new();
        let error = TransportError::Connect {
            message: "tcp connect error: Connection refused (os error 111)".to_string(),
        };
        fake.fail(error.clone());
        let transport = AuthTransport::new(fake, credential());

        let result = transport.round_trip(&sample_request()).await;
        assert_eq!(result.expect_err("transport error"), error);
    }

    #[tokio::test]
    async fn auth_transport_passes_error_status_through() {
        let fake = FakeTransport::new();
        fake.respond(StatusCode::SERVICE_UNAVAILABLE, "down");
        let transport = AuthTransport::new(fake, credential());

        let response = transport.round_trip(&sample_request()).await.expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body(), &Bytes::from_static(b"down"));
    }

    #[tokio::test]
    async fn http_transport_sends_bearer_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/query"))
            .and(header("authorization", "Bearer abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let config = Config::new(&server.uri(), "abc123").expect("config");
        let transport = AuthTransport::new(
            HttpTransport::new(&config).expect("transport"),
            config.credential().clone(),
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/api/v1/query", server.uri()))
            .body(Bytes::from_static(b"query=up"))
            .expect("request");

        let response = transport.round_trip(&request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &Bytes::from_static(b"{}"));
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn http_transport_reports_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let config = Config::new(&format!("http://{addr}"), "abc123").expect("config");
        let transport = HttpTransport::new(&config).expect("transport");
        let request = Request::builder()
            .uri(format!("http://{addr}/api/v1/query"))
            .body(Bytes::new())
            .expect("request");

        let err = transport.round_trip(&request).await.expect_err("refused");
        assert!(matches!(err, TransportError::Connect { .. }), "{err:?}");
        assert!(!err.to_string().contains("abc123"));
    }
}
