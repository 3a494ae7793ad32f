//! XML bodies through quick-xml's serde support.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{decoder, encoder};
use crate::error::BoxError;
use crate::request::BodyFn;
use crate::response::Process;

pub const CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Sends `value` serialized as XML. The root element is named after the
/// type.
pub fn encode<T: Serialize + Send + Sync + 'static>(value: T) -> BodyFn {
    encoder(CONTENT_TYPE, value, |value: &T| {
        quick_xml::se::to_string(value).map(String::into_bytes)
    })
}

/// Terminal decoding an XML body into `out`. The body must be UTF-8; put
/// [`Charset`](crate::response::Charset) in front for other encodings.
pub fn decode<'a, T: DeserializeOwned + Send + 'a>(out: &'a mut Option<T>) -> Process<'a> {
    decoder("xml", out, |data| -> Result<T, BoxError> {
        let text = std::str::from_utf8(data)?;
        Ok(quick_xml::de::from_str(text)?)
    })
}
