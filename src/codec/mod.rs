//! Body encoders and response decoders for structured formats.
//!
//! Each format module exposes `encode(value) -> BodyFn`, a body producer
//! that serializes on every attempt, and `decode(&mut out) -> Process`, a
//! terminal that reads the whole body and deserializes it into `out`.

pub mod form;
pub mod json;
pub mod multipart;
pub mod xml;
pub mod yaml;

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::error::{BoxError, Error};
use crate::request::{BodyFn, Payload};
use crate::response::{Process, Response, process_fn};

/// Builds a producer that serializes `value` with `serialize` per attempt.
fn encoder<T, E>(
    content_type: &'static str,
    value: T,
    serialize: fn(&T) -> Result<Vec<u8>, E>,
) -> BodyFn
where
    T: Send + Sync + 'static,
    E: Into<BoxError> + 'static,
{
    Arc::new(move || {
        let data = serialize(&value).map_err(Error::body)?;
        Ok(Some(Payload::new(data).content_type(content_type)))
    })
}

/// Builds a terminal that reads the body and parses it with `parse`.
fn decoder<'a, T, E>(
    format: &'static str,
    out: &'a mut Option<T>,
    parse: fn(&[u8]) -> Result<T, E>,
) -> Process<'a>
where
    T: Send + 'a,
    E: Into<BoxError> + 'a,
{
    process_fn(move |resp: Response| async move {
        let body: Bytes = resp.bytes().await?;
        debug!(format, bytes = body.len(), "decoding response body");
        *out = Some(parse(&body).map_err(|e| Error::decode(format, e))?);
        Ok(())
    })
}
