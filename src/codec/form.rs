//! URL-encoded form bodies.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as Json;

use super::decoder;
use crate::error::Error;
use crate::request::{BodyFn, Payload};
use crate::response::Process;

pub const CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Encodes `pairs` in order.
pub fn encode_pairs<I, K, V>(pairs: I) -> BodyFn
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    fixed(encoded)
}

/// Sends an already-encoded form.
pub fn encode_raw(encoded: impl Into<String>) -> BodyFn {
    fixed(encoded.into())
}

/// Encodes a flat struct or map, keys in sorted order. Strings are sent
/// as-is, numbers and booleans in their JSON spelling, arrays as repeated
/// keys, and `null` fields are skipped.
///
/// The value is flattened when the producer runs; a nested object is an
/// [`Error::Body`].
pub fn encode<T: Serialize + Send + Sync + 'static>(value: T) -> BodyFn {
    Arc::new(move || {
        let pairs = flatten(serde_json::to_value(&value).map_err(Error::body)?)?;
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        Ok(Some(Payload::new(encoded).content_type(CONTENT_TYPE)))
    })
}

/// Terminal parsing a URL-encoded body into name/value pairs.
pub fn decode<'a>(out: &'a mut Option<Vec<(String, String)>>) -> Process<'a> {
    decoder("form", out, |data| -> Result<_, Error> {
        Ok(url::form_urlencoded::parse(data).into_owned().collect())
    })
}

fn fixed(encoded: String) -> BodyFn {
    Arc::new(move || Ok(Some(Payload::new(encoded.clone()).content_type(CONTENT_TYPE))))
}

fn flatten(value: Json) -> Result<Vec<(String, String)>, Error> {
    let Json::Object(fields) = value else {
        return Err(Error::body("form values must serialize to an object"));
    };
    let mut pairs = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        match value {
            Json::Array(items) => {
                for item in items {
                    if let Some(text) = scalar(&key, item)? {
                        pairs.push((key.clone(), text));
                    }
                }
            }
            other => {
                if let Some(text) = scalar(&key, other)? {
                    pairs.push((key, text));
                }
            }
        }
    }
    Ok(pairs)
}

fn scalar(key: &str, value: Json) -> Result<Option<String>, Error> {
    match value {
        Json::Null => Ok(None),
        Json::String(s) => Ok(Some(s)),
        Json::Bool(b) => Ok(Some(b.to_string())),
        Json::Number(n) => Ok(Some(n.to_string())),
        Json::Array(_) | Json::Object(_) => Err(Error::body(format!(
            "form field {key:?} is nested; only scalars and arrays of scalars are supported"
        ))),
    }
}
