//! Error types shared by the request builder and the response pipeline.
//!
//! Every failure a caller can observe is a variant of [`Error`]. Variants keep
//! their underlying cause as `#[source]` so the full chain stays inspectable,
//! and [`Error::is_transient`] tells retryable network failures apart from
//! terminal ones.

use std::path::PathBuf;

use thiserror::Error;

use crate::duration::DurationError;
use crate::html::BindError;

/// Boxed error used where the underlying cause has no fixed type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while building, sending or processing a request.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration option failed to apply. Raised before any network call.
    #[error("invalid request option: {message}")]
    Config {
        /// What went wrong.
        message: String,
    },

    /// The body producer failed. Never retried.
    #[error("failed to build request body: {source}")]
    Body {
        /// The underlying producer error.
        #[source]
        source: BoxError,
    },

    /// The request URL (with its query string) is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// The request timed out at the transport level.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
        /// The client error, when the timeout came from reqwest.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-transient failure reported by a custom transport.
    #[error("transport error requesting {url}: {source}")]
    Transport {
        /// The URL that failed.
        url: String,
        /// The transport's error.
        #[source]
        source: BoxError,
    },

    /// The call's context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The call's context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// HTTP error response, raised only by the `ErrorForStatus` middleware.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// A Content-Encoding decoder could not be built or failed mid-stream.
    #[error("failed to decode {encoding} content: {source}")]
    Decompress {
        /// The Content-Encoding value being decoded.
        encoding: String,
        /// The decoder error.
        #[source]
        source: std::io::Error,
    },

    /// A structured decoder (JSON, XML, YAML, text) rejected the body.
    #[error("failed to decode {format} response: {source}")]
    Decode {
        /// Format name.
        format: &'static str,
        /// The decoder error.
        #[source]
        source: BoxError,
    },

    /// Binding a document into a value failed.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// A duration string could not be parsed.
    #[error(transparent)]
    Duration(#[from] DurationError),

    /// File system error (download target, multipart source file).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A download target exists and overwriting was not requested.
    #[error("{path} already exists")]
    Exists {
        /// The existing path.
        path: PathBuf,
    },
}

impl Error {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a body construction error.
    pub fn body(source: impl Into<BoxError>) -> Self {
        Self::Body {
            source: source.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout {
            url: url.into(),
            source: None,
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a non-transient transport error.
    pub fn transport(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Maps a reqwest error, promoting timeouts to [`Error::Timeout`].
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.into(),
                source: Some(source),
            }
        } else {
            Self::network(url, source)
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status(url: impl Into<String>, status: u16, retry_after: Option<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a decompression error.
    pub fn decompress(encoding: impl Into<String>, source: std::io::Error) -> Self {
        Self::Decompress {
            encoding: encoding.into(),
            source,
        }
    }

    /// Creates a structured decode error.
    pub fn decode(format: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Decode {
            format,
            source: source.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an already-exists error.
    pub fn exists(path: impl Into<PathBuf>) -> Self {
        Self::Exists { path: path.into() }
    }

    /// Returns true for network failures worth retrying: timeouts and
    /// connection-level errors other than TLS/certificate problems.
    ///
    /// Application-level failures (HTTP status, decode, binding) are never
    /// transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Network { source, .. } => {
                !is_tls_error(source)
                    && !source.is_builder()
                    && !source.is_redirect()
                    && !source.is_decode()
            }
            _ => false,
        }
    }
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    // TLS failures are only visible through the error chain text
    let mut text = error.to_string().to_lowercase();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        text.push(' ');
        text.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }
    text.contains("certificate")
        || text.contains("tls")
        || text.contains("ssl")
        || text.contains("handshake")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_timeout_is_transient() {
        assert!(Error::timeout("http://example.com").is_transient());
    }

    #[test]
    fn test_application_errors_are_not_transient() {
        assert!(!Error::http_status("http://example.com", 503, None).is_transient());
        assert!(!Error::invalid_url("::").is_transient());
        assert!(!Error::body("boom").is_transient());
        assert!(!Error::config("bad option").is_transient());
        assert!(!Error::transport("http://example.com", "refused by policy").is_transient());
        assert!(!Error::Cancelled.is_transient());
        assert!(!Error::DeadlineExceeded.is_transient());
    }

    #[tokio::test]
    async fn test_reqwest_timeout_keeps_source() {
        use wiremock::matchers::any;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)))
            .mount(&mock_server)
            .await;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(50))
            .build()
            .unwrap();

        let source = client.get(mock_server.uri()).send().await.unwrap_err();
        assert!(source.is_timeout());
        let error = Error::from_reqwest(mock_server.uri(), source);

        assert!(matches!(error, Error::Timeout { .. }));
        assert!(error.is_transient());
        assert!(error.source().is_some());
    }

    #[test]
    fn test_timeout_without_client_error_has_no_source() {
        assert!(Error::timeout("http://example.com").source().is_none());
    }

    #[test]
    fn test_http_status_display() {
        let error = Error::http_status("https://example.com/a", 404, None);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("https://example.com/a"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_decompress_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad header");
        let error = Error::decompress("gzip", io);
        assert!(error.to_string().contains("gzip"));
        assert_eq!(error.source().unwrap().to_string(), "bad header");
    }

    #[test]
    fn test_body_error_display() {
        let error = Error::body("producer exploded");
        assert!(error.to_string().contains("producer exploded"));
    }

    #[test]
    fn test_exists_display() {
        let error = Error::exists("/tmp/file.bin");
        assert!(error.to_string().contains("/tmp/file.bin"));
    }
}
