//! Charset transcoding to UTF-8.

use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};
use futures_util::stream::{self, Stream, StreamExt};
use mime::Mime;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tracing::{debug, warn};

use super::chain::{Middleware, Process, process_fn};
use super::{Body, Response};
use crate::error::Error;

/// Override value that defers to the `Content-Type` header.
pub const AUTO: &str = "auto";

/// Middleware that transcodes the body to UTF-8.
///
/// The source charset comes from the override given to [`Charset::new`],
/// or from the `charset` parameter of `Content-Type`. Names are resolved
/// with the WHATWG label registry; unknown names are logged and the body
/// passes through untouched.
#[derive(Debug, Clone, Default)]
pub struct Charset {
    label: Option<String>,
}

impl Charset {
    /// Uses the charset declared by the response.
    #[must_use]
    pub fn auto() -> Self {
        Self::default()
    }

    /// Forces a charset. `"auto"` or an empty string behaves like [`Charset::auto`].
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let label = label.trim();
        if label.is_empty() || label.eq_ignore_ascii_case(AUTO) {
            return Self::auto();
        }
        Self {
            label: Some(label.to_string()),
        }
    }
}

impl Middleware for Charset {
    fn wrap<'a>(&self, next: Process<'a>) -> Process<'a> {
        let label = self.label.clone();
        process_fn(move |resp: Response| async move {
            next(transcode(resp, label.as_deref())).await
        })
    }
}

/// Wraps the body in a UTF-8 transcoder when a non-UTF-8 charset applies,
/// rewriting `Content-Type` to the bare media type.
#[must_use]
pub fn transcode(mut resp: Response, override_label: Option<&str>) -> Response {
    let media: Option<Mime> = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    let label = override_label.map(str::to_string).or_else(|| {
        media
            .as_ref()
            .and_then(|m| m.get_param(mime::CHARSET))
            .map(|c| c.as_str().to_string())
    });
    let Some(label) = label.filter(|l| !l.trim().is_empty()) else {
        return resp;
    };

    let Some(encoding) = Encoding::for_label(label.trim().as_bytes()) else {
        warn!(charset = %label, url = %resp.url(), "unsupported charset, body left undecoded");
        return resp;
    };
    if encoding == UTF_8 {
        return resp;
    }

    debug!(charset = encoding.name(), url = %resp.url(), "transcoding response body to UTF-8");
    if let Some(media) = &media
        && let Ok(value) = HeaderValue::from_str(media.essence_str())
    {
        resp.headers_mut().insert(CONTENT_TYPE, value);
    }
    resp.map_body(|body| Body::from_stream(decode_stream(body, encoding)))
}

fn decode_stream(
    body: Body,
    encoding: &'static Encoding,
) -> impl Stream<Item = Result<Bytes, Error>> + Send {
    stream::unfold(Some((body, encoding.new_decoder())), |state| async move {
        let (mut body, mut decoder) = state?;
        loop {
            match body.next().await {
                Some(Ok(chunk)) => {
                    let text = decode_chunk(&mut decoder, &chunk, false);
                    if !text.is_empty() {
                        return Some((Ok(text), Some((body, decoder))));
                    }
                }
                Some(Err(err)) => return Some((Err(err), None)),
                None => {
                    let text = decode_chunk(&mut decoder, &[], true);
                    return (!text.is_empty()).then_some((Ok(text), None));
                }
            }
        }
    })
}

fn decode_chunk(decoder: &mut Decoder, mut input: &[u8], last: bool) -> Bytes {
    let capacity = decoder
        .max_utf8_buffer_length(input.len())
        .unwrap_or(input.len());
    let mut out = String::with_capacity(capacity);
    loop {
        let (result, read, _replaced) = decoder.decode_to_string(input, &mut out, last);
        input = &input[read..];
        match result {
            CoderResult::InputEmpty => return Bytes::from(out),
            CoderResult::OutputFull => out.reserve(input.len().max(16) * 3),
        }
    }
}
