//! YAML bodies.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{decoder, encoder};
use crate::request::BodyFn;
use crate::response::Process;

pub const CONTENT_TYPE: &str = "application/yaml; charset=utf-8";

pub fn encode<T: Serialize + Send + Sync + 'static>(value: T) -> BodyFn {
    encoder(CONTENT_TYPE, value, |value: &T| {
        serde_yaml::to_string(value).map(String::into_bytes)
    })
}

pub fn decode<'a, T: DeserializeOwned + Send + 'a>(out: &'a mut Option<T>) -> Process<'a> {
    decoder("yaml", out, |data| serde_yaml::from_slice(data))
}
