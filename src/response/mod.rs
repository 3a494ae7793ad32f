//! Response pipeline.
//!
//! # Overview
//!
//! A delivered [`Response`] flows through a chain of [`Middleware`] into a
//! terminal [`Process`]. Middleware either inspect the response or replace
//! its body with a transformed stream:
//!
//! - [`Decompress`] decodes `Content-Encoding` (br, deflate, gzip, zstd,
//!   snappy, s2)
//! - [`Charset`] transcodes declared charsets to UTF-8
//! - [`Progress`] reports read progress
//! - [`Dump`] writes status, URL and headers (optionally the body) to a sink
//! - [`Status`] dispatches on the status code
//! - [`ErrorForStatus`] fails on 4xx/5xx
//!
//! Terminals in [`download`] and the codec modules consume the body.

mod body;
mod chain;
mod charset;
mod decompress;
mod dump;
pub mod download;
mod progress;

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use reqwest::{StatusCode, Url};

pub use body::{Body, BodyStream};
pub(crate) use body::ChannelStream;
pub use chain::{ErrorForStatus, Middleware, Process, Status, compose, noop, process_fn, status};
pub use charset::{Charset, transcode};
pub use decompress::{ContentEncoding, Decompress, decompress};
pub use dump::{DUMP_LINE, Dump};
pub use progress::{Progress, ProgressUpdate};

use crate::error::Error;

/// Everything about a response except its body.
#[derive(Debug, Clone)]
pub struct Parts {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub url: Url,
}

/// A delivered response whose body has not been read yet.
#[derive(Debug)]
pub struct Response {
    parts: Parts,
    body: Body,
}

impl Response {
    /// Assembles a response.
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, url: Url, body: Body) -> Self {
        Self::from_parts(
            Parts {
                status,
                headers,
                url,
            },
            body,
        )
    }

    #[must_use]
    pub fn from_parts(parts: Parts, body: Body) -> Self {
        Self { parts, body }
    }

    /// Converts a transport response, streaming its body.
    #[must_use]
    pub fn from_reqwest(response: reqwest::Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let url_text = url.to_string();
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| Error::from_reqwest(url_text.as_str(), e)));
        Self::new(status, headers, url, Body::from_stream(stream))
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.parts.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.parts.headers
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.parts.url
    }

    /// Declared Content-Length, if present and valid.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    #[must_use]
    pub fn into_parts(self) -> (Parts, Body) {
        (self.parts, self.body)
    }

    #[must_use]
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Replaces the body, keeping status and headers.
    #[must_use]
    pub fn map_body(self, f: impl FnOnce(Body) -> Body) -> Self {
        Self {
            parts: self.parts,
            body: f(self.body),
        }
    }

    /// Reads the whole body.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by the body stream.
    pub async fn bytes(self) -> Result<Bytes, Error> {
        self.body.bytes().await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use reqwest::header::{HeaderName, HeaderValue};

    use super::*;

    /// Builds a response for middleware tests.
    #[allow(clippy::unwrap_used)]
    pub(crate) fn response(status: u16, headers: &[(&str, &str)], body: Body) -> Response {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        Response::new(
            StatusCode::from_u16(status).unwrap(),
            map,
            Url::parse("http://example.com/test").unwrap(),
            body,
        )
    }
}
