//! fetchbind: HTTP requests with retry, a streaming response pipeline and
//! declarative HTML binding.
//!
//! # Architecture
//!
//! - [`request`] - Request builder, execution loop with retry, transports
//!   and header options
//! - [`response`] - Response envelope, middleware chain, decompression,
//!   charset transcoding, progress and download
//! - [`codec`] - JSON, XML, YAML and form bodies, streaming multipart
//! - [`html`] - Rule-driven binding of HTML documents into typed values
//! - [`template`] - `{name}` placeholder substitution
//! - [`duration`] - Human-readable durations with day units
//! - [`cookie`] - Request cookie headers and `Set-Cookie` reading
//! - [`context`] - Cancellation and deadlines
//!
//! # Example
//!
//! ```no_run
//! use fetchbind::{Context, Request};
//! use fetchbind::response::{Decompress, ErrorForStatus};
//!
//! # async fn run() -> Result<(), fetchbind::Error> {
//! let items: Vec<String> = Request::new(Context::background())
//!     .url("https://example.com/api/items")
//!     .header_with([fetchbind::request::header::accept_json()])
//!     .process_with(ErrorForStatus)
//!     .process_with(Decompress)
//!     .json()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod context;
pub mod cookie;
pub mod duration;
pub mod error;
pub mod html;
pub mod request;
pub mod response;
pub mod template;
pub mod user_agent;

// Re-export commonly used types
pub use codec::multipart::Multipart;
pub use context::Context;
pub use cookie::{Cookie, ReadCookies, cookie_add, cookie_add_str, read_cookies};
pub use duration::{Duration, DurationError};
pub use error::Error;
pub use html::{BindError, FieldRule, Kind, Schema, Selection, Value};
pub use request::{
    BodyFn, ClientConfig, HeaderOption, HttpTransport, Payload, Request, RetryPolicy, Transport,
};
pub use response::{Body, Middleware, Process, Response};
pub use template::Params;
