//! Request builder.
//!
//! # Overview
//!
//! A [`Request`] collects the method, URL, query, body producer, header
//! options, retry delays, transport and response middleware. It is consumed
//! by one of the terminals ([`Request::process`], [`Request::bytes`],
//! [`Request::json`], [`Request::download`], ...), which runs the execution
//! loop once, including every retry.
//!
//! # Example
//!
//! ```no_run
//! use fetchbind::{Context, Request};
//! use fetchbind::response::{Charset, Decompress};
//!
//! # async fn run() -> Result<(), fetchbind::Error> {
//! let page = Request::browser(Context::background())
//!     .url("https://example.com/search")
//!     .query("q=rust")
//!     .process_with(Decompress)
//!     .process_with(Charset::auto())
//!     .text()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod body;
pub mod constants;
mod execute;
pub mod header;
mod preset;
mod retry;
mod transport;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use body::{BodyFn, Payload, fixed};
pub use header::HeaderOption;
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};
pub use transport::{ClientConfig, HttpTransport, Transport, default_transport};

use crate::codec;
use crate::context::Context;
use crate::error::Error;
use crate::html::{self, FieldRule, Schema, Selection, Value};
use crate::response::{Middleware, Response, download, process_fn};
use crate::template::Params;

/// Configuration applied when the request executes, in registration order.
pub type RequestOption = Box<dyn FnOnce(&mut Request) -> Result<(), Error> + Send>;

/// An HTTP request under construction.
pub struct Request {
    ctx: Context,
    options: Vec<RequestOption>,
    method: Option<Method>,
    url: String,
    query: String,
    body: Option<BodyFn>,
    headers: Vec<HeaderOption>,
    middleware: Vec<Arc<dyn Middleware>>,
    try_times: Vec<Duration>,
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("headers", &self.headers.len())
            .field("middleware", &self.middleware.len())
            .field("try_times", &self.try_times)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Starts a request bound to `ctx`.
    #[must_use]
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            options: Vec::new(),
            method: None,
            url: String::new(),
            query: String::new(),
            body: None,
            headers: Vec::new(),
            middleware: Vec::new(),
            try_times: Vec::new(),
            transport: None,
        }
    }

    /// Registers an option applied just before execution.
    #[must_use]
    pub fn with(
        mut self,
        option: impl FnOnce(&mut Request) -> Result<(), Error> + Send + 'static,
    ) -> Self {
        self.options.push(Box::new(option));
        self
    }

    /// Sets the method (default `GET`).
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets an already-encoded query string, appended to the URL with `&`
    /// if it has a `?` and with `?` otherwise.
    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Sets the body producer, called once per attempt.
    #[must_use]
    pub fn body(mut self, body: BodyFn) -> Self {
        self.body = Some(body);
        self
    }

    /// Sends an already-encoded form body.
    #[must_use]
    pub fn form(self, encoded: impl Into<String>) -> Self {
        self.body(codec::form::encode_raw(encoded))
    }

    /// Sends `pairs` as a URL-encoded form.
    #[must_use]
    pub fn form_values<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.body(codec::form::encode_pairs(pairs))
    }

    /// Sends `value` as JSON.
    #[must_use]
    pub fn json_body<T: Serialize + Send + Sync + 'static>(self, value: T) -> Self {
        self.body(codec::json::encode(value))
    }

    /// Adds header options, applied in order on every attempt.
    #[must_use]
    pub fn header_with(mut self, options: impl IntoIterator<Item = HeaderOption>) -> Self {
        self.headers.extend(options);
        self
    }

    /// Sets the retry delays: after a transient failure on attempt `i`,
    /// waits `delays[i]` and tries again. At most `delays.len() + 1`
    /// attempts are made.
    #[must_use]
    pub fn try_at(mut self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.try_times = delays.into_iter().collect();
        self
    }

    /// Uses the delays generated by `policy`.
    #[must_use]
    pub fn retry_policy(self, policy: &RetryPolicy) -> Self {
        self.try_at(policy.delays())
    }

    /// Sends through `transport` instead of the shared default.
    #[must_use]
    pub fn use_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Adds response middleware. The first one added sees the response
    /// first.
    #[must_use]
    pub fn process_with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Reads the whole body.
    ///
    /// # Errors
    ///
    /// Returns any error from execution or from reading the body.
    pub async fn bytes(self) -> Result<Bytes, Error> {
        let mut out = None;
        let slot = &mut out;
        self.process(Some(process_fn(move |resp: Response| async move {
            *slot = Some(resp.bytes().await?);
            Ok(())
        })))
        .await?;
        Ok(out.unwrap_or_default())
    }

    /// Reads the whole body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body is not valid UTF-8, or any
    /// execution error.
    pub async fn text(self) -> Result<String, Error> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::decode("text", e))
    }

    /// Decodes a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for invalid JSON, or any execution error.
    pub async fn json<T: DeserializeOwned + Send>(self) -> Result<T, Error> {
        let mut out = None;
        self.process(Some(codec::json::decode(&mut out))).await?;
        out.ok_or_else(|| not_consumed("json"))
    }

    /// Decodes an XML body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for invalid XML, or any execution error.
    pub async fn xml<T: DeserializeOwned + Send>(self) -> Result<T, Error> {
        let mut out = None;
        self.process(Some(codec::xml::decode(&mut out))).await?;
        out.ok_or_else(|| not_consumed("xml"))
    }

    /// Decodes a YAML body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for invalid YAML, or any execution error.
    pub async fn yaml<T: DeserializeOwned + Send>(self) -> Result<T, Error> {
        let mut out = None;
        self.process(Some(codec::yaml::decode(&mut out))).await?;
        out.ok_or_else(|| not_consumed("yaml"))
    }

    /// Parses the body as HTML and hands the document to `query`.
    ///
    /// # Errors
    ///
    /// Returns the error from `query`, or any execution error.
    pub async fn html_query<F>(self, query: F) -> Result<(), Error>
    where
        F: for<'h> FnOnce(Selection<'h>) -> Result<(), Error> + Send,
    {
        self.process(Some(html::query(query))).await
    }

    /// Binds the document under `root` with `schema` and converts the
    /// result into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if binding or the conversion fails, or any
    /// execution error.
    pub async fn html_bind<T: DeserializeOwned>(
        self,
        root: &str,
        schema: &Schema,
        params: &Params,
    ) -> Result<T, Error> {
        let value = self.html_bind_value(root, schema, params).await?;
        Ok(value.into_typed()?)
    }

    /// Compiles `rule` and binds the document under `root` with it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] for an invalid rule or a binding failure, or
    /// any execution error.
    pub async fn html_bind_rules(
        self,
        root: &str,
        rule: &FieldRule,
        params: &Params,
    ) -> Result<Value, Error> {
        let schema = Schema::compile(rule)?;
        self.html_bind_value(root, &schema, params).await
    }

    async fn html_bind_value(
        self,
        root: &str,
        schema: &Schema,
        params: &Params,
    ) -> Result<Value, Error> {
        let mut out = None;
        self.process(Some(html::bind_to(root, schema, params, &mut out)))
            .await?;
        out.ok_or_else(|| not_consumed("html"))
    }

    /// Saves the body to `path` and returns the path written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exists`] if the target exists and `overwrite` is
    /// false, [`Error::Io`] for file system failures, or any execution error.
    pub async fn download(
        self,
        path: impl Into<PathBuf>,
        overwrite: bool,
    ) -> Result<PathBuf, Error> {
        let path = path.into();
        let mut saved = None;
        self.process(Some(download::to_file(path.clone(), overwrite, &mut saved)))
            .await?;
        Ok(saved.unwrap_or(path))
    }
}

fn not_consumed(format: &'static str) -> Error {
    Error::decode(format, "response was handled before the body was decoded")
}
