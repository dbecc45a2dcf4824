//! Immutable client configuration.
//!
//! The backend address and the bearer credential are read once at startup
//! from two plain-text files and never change afterwards. Both are treated
//! as secrets: their `Debug` output is redacted and no error produced here
//! echoes their contents.

use std::path::Path;
use std::time::Duration;

use http::HeaderValue;
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use crate::error::ConfigError;

/// Default time allowed for establishing a connection to the backend.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default token file name, relative to the working directory.
pub const DEFAULT_TOKEN_FILE: &str = "token";

/// Default address file name, relative to the working directory.
pub const DEFAULT_ADDRESS_FILE: &str = "address";

const BEARER_PREFIX: &str = "Bearer ";

/// A bearer credential, stored as a ready-to-send sensitive header value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    header: HeaderValue,
}

impl Credential {
    /// Builds a bearer credential from a raw token.
    ///
    /// Surrounding whitespace is trimmed. The intermediate buffer holding the
    /// plaintext is zeroized once the header value has been built.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or contains bytes that are not
    /// allowed in an HTTP header.
    pub fn bearer(token: &str) -> Result<Self, ConfigError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ConfigError::Empty { what: "credential" });
        }

        let mut value = Zeroizing::new(String::with_capacity(BEARER_PREFIX.len() + token.len()));
        value.push_str(BEARER_PREFIX);
        value.push_str(token);

        let mut header = HeaderValue::from_str(&value).map_err(|_| {
            ConfigError::invalid_credential("token contains characters not allowed in a header")
        })?;
        header.set_sensitive(true);

        Ok(Self { header })
    }

    /// The `Authorization` header value, `Bearer <token>`.
    #[must_use]
    pub fn header_value(&self) -> &HeaderValue {
        &self.header
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential([REDACTED])")
    }
}

/// Base address of the monitoring backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
}

impl Endpoint {
    /// Parses a base address. Only absolute `http` and `https` URLs are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is empty, unparsable, or uses
    /// another scheme.
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ConfigError::Empty { what: "address" });
        }

        // url::ParseError never includes the input, so it is safe to surface.
        let base = Url::parse(address).map_err(|e| ConfigError::invalid_address(e.to_string()))?;
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::invalid_address(format!(
                    "unsupported scheme '{other}', expected http or https"
                )));
            }
        }
        if base.host_str().is_none() {
            return Err(ConfigError::invalid_address("missing host"));
        }

        Ok(Self { base })
    }

    /// Resolves an API path below the base address, keeping any path prefix
    /// the base already has.
    #[must_use]
    pub fn join(&self, api_path: &str) -> Url {
        let mut url = self.base.clone();
        let path = format!(
            "{}/{}",
            self.base.path().trim_end_matches('/'),
            api_path.trim_start_matches('/')
        );
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// The parsed base URL.
    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.base
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Endpoint([REDACTED])")
    }
}

/// Process-wide configuration, constructed once and passed by value.
#[derive(Debug, Clone)]
pub struct Config {
    endpoint: Endpoint,
    credential: Credential,
    connect_timeout: Duration,
    user_agent: String,
}

impl Config {
    /// Builds a configuration from in-memory values.
    ///
    /// # Errors
    ///
    /// Returns an error if either value is empty or invalid.
    pub fn new(address: &str, token: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: Endpoint::parse(address)?,
            credential: Credential::bearer(token)?,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: concat!("promq/", env!("CARGO_PKG_VERSION")).to_string(),
        })
    }

    /// Reads the token and address files once and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if either file is missing, unreadable, empty, or
    /// holds an invalid value.
    pub fn load(token_path: &Path, address_path: &Path) -> Result<Self, ConfigError> {
        let token = read_secret(token_path)?;
        let address = read_secret(address_path)?;
        let config = Self::new(&address, &token)?;

        debug!(
            token_file = %token_path.display(),
            address_file = %address_path.display(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Overrides the connect timeout. Intended for construction time only.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Backend base address.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Bearer credential.
    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Connect timeout for the underlying transport.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// User agent sent with every request.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

fn read_secret(path: &Path) -> Result<Zeroizing<String>, ConfigError> {
    std::fs::read_to_string(path)
        .map(Zeroizing::new)
        .map_err(|e| ConfigError::from_io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_case::test_case;

    fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(contents.as_bytes()).expect("write file");
        path
    }

    #[test]
    fn credential_is_trimmed_and_prefixed() {
        let cred = Credential::bearer("  abc123\n").expect("credential");
        assert_eq!(cred.header_value(), "Bearer abc123");
        assert!(cred.header_value().is_sensitive());
    }

    #[test]
    fn credential_rejects_empty() {
        let err = Credential::bearer(" \n\t ").expect_err("empty token");
        assert!(matches!(err, ConfigError::Empty { what: "credential" }));
    }

    #[test]
    fn credential_rejects_control_bytes_without_echoing() {
        let err = Credential::bearer("sec\u{7f}ret").expect_err("invalid token");
        assert!(matches!(err, ConfigError::InvalidCredential { .. }));
        assert!(!err.to_string().contains("sec"));
    }

    #[test]
    fn credential_debug_redacted() {
        let cred = Credential::bearer("abc123").expect("credential");
        let debug = format!("{cred:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("abc123"));
    }

    #[test_case("http://example:9090" ; "plain")]
    #[test_case("https://prom.example.com" ; "tls")]
    #[test_case("  http://example:9090/\n" ; "whitespace")]
    fn endpoint_accepts(address: &str) {
        assert!(Endpoint::parse(address).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("example:9090" ; "no scheme")]
    #[test_case("ftp://example:9090" ; "wrong scheme")]
    #[test_case("not a url" ; "garbage")]
    fn endpoint_rejects(address: &str) {
        assert!(Endpoint::parse(address).is_err());
    }

    #[test]
    fn endpoint_error_does_not_echo_address() {
        let err = Endpoint::parse("ftp://secret-host:9090").expect_err("bad scheme");
        assert!(!err.to_string().contains("secret-host"));
    }

    #[test_case("http://example:9090", "http://example:9090/api/v1/query" ; "root")]
    #[test_case("http://example:9090/", "http://example:9090/api/v1/query" ; "trailing slash")]
    #[test_case("http://example:9090/prom", "http://example:9090/prom/api/v1/query" ; "prefix")]
    #[test_case("http://example:9090/prom/", "http://example:9090/prom/api/v1/query" ; "prefix slash")]
    fn endpoint_join(base: &str, expected: &str) {
        let endpoint = Endpoint::parse(base).expect("endpoint");
        assert_eq!(endpoint.join("/api/v1/query").as_str(), expected);
    }

    #[test]
    fn endpoint_debug_redacted() {
        let endpoint = Endpoint::parse("http://example:9090").expect("endpoint");
        assert!(!format!("{endpoint:?}").contains("example"));
    }

    #[test]
    fn config_load_trims_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let token = write_file(dir.path(), "token", "abc123\n");
        let address = write_file(dir.path(), "address", " http://example:9090 \n");

        let config = Config::load(&token, &address).expect("load");
        assert_eq!(config.credential().header_value(), "Bearer abc123");
        assert_eq!(config.endpoint().as_url().as_str(), "http://example:9090/");
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert!(config.user_agent().starts_with("promq/"));
    }

    #[test]
    fn config_load_missing_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let address = write_file(dir.path(), "address", "http://example:9090");

        let err = Config::load(&dir.path().join("token"), &address).expect_err("missing");
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn config_load_empty_address() {
        let dir = tempfile::tempdir().expect("tempdir");
        let token = write_file(dir.path(), "token", "abc123");
        let address = write_file(dir.path(), "address", "\n\n");

        let err = Config::load(&token, &address).expect_err("empty");
        assert!(matches!(err, ConfigError::Empty { what: "address" }));
    }

    #[test]
    fn config_debug_hides_secrets() {
        let config = Config::new("http://example:9090", "abc123").expect("config");
        let debug = format!("{config:?}");
        assert!(!debug.contains("abc123"));
        assert!(!debug.contains("example:9090"));
    }

    #[test]
    fn config_with_connect_timeout() {
        let config = Config::new("http://example:9090", "abc123")
            .expect("config")
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
    }
}
