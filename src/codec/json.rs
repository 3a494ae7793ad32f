//! JSON bodies.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{decoder, encoder};
use crate::request::BodyFn;
use crate::response::Process;

pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Sends `value` serialized as JSON.
pub fn encode<T: Serialize + Send + Sync + 'static>(value: T) -> BodyFn {
    encoder(CONTENT_TYPE, value, serde_json::to_vec)
}

/// Terminal decoding a JSON body into `out`.
pub fn decode<'a, T: DeserializeOwned + Send + 'a>(out: &'a mut Option<T>) -> Process<'a> {
    decoder("json", out, |data| serde_json::from_slice(data))
}
