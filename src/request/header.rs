//! Header options: ordered mutations applied to every outgoing attempt.

use std::fmt;
use std::sync::Arc;

use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue,
    PRAGMA, REFERER, USER_AGENT,
};
use tracing::warn;

use super::constants::{
    ACCEPT_ANY, ACCEPT_HTML, ACCEPT_JSON, ACCEPT_XML, ALL_ENCODINGS, DEFAULT_ENCODINGS,
};

/// One header mutation. Options run in registration order, after the body
/// producer has set `Content-Type`, so a later option wins.
#[derive(Clone)]
pub struct HeaderOption(Arc<dyn Fn(&mut HeaderMap) + Send + Sync>);

impl HeaderOption {
    /// Wraps an arbitrary mutation.
    pub fn new(f: impl Fn(&mut HeaderMap) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        (self.0)(headers);
    }
}

impl fmt::Debug for HeaderOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HeaderOption").finish_non_exhaustive()
    }
}

/// Sets `key` to `values` joined with `,`. An invalid name or value is
/// logged and skipped.
pub fn header_set<I, S>(key: &str, values: I) -> HeaderOption
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = values
        .into_iter()
        .map(|v| v.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(",");
    set_raw(key, joined)
}

/// Removes `key`.
pub fn header_del(key: &str) -> HeaderOption {
    match HeaderName::from_bytes(key.as_bytes()) {
        Ok(name) => HeaderOption::new(move |headers| {
            headers.remove(&name);
        }),
        Err(e) => {
            warn!(header = key, error = %e, "ignoring invalid header name");
            HeaderOption::new(|_| {})
        }
    }
}

pub fn user_agent(agent: &str) -> HeaderOption {
    set_known(USER_AGENT, agent.to_string())
}

/// Sets `Accept` to `types` joined with `", "`.
pub fn accept<I, S>(types: I) -> HeaderOption
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    set_known(ACCEPT, join(types, ", "))
}

pub fn accept_language(languages: &str) -> HeaderOption {
    set_known(ACCEPT_LANGUAGE, languages.to_string())
}

pub fn referer(url: &str) -> HeaderOption {
    set_known(REFERER, url.to_string())
}

/// Asks every cache on the path to revalidate.
#[must_use]
pub fn no_cache() -> HeaderOption {
    let value = HeaderValue::from_static("no-cache");
    HeaderOption::new(move |headers| {
        headers.insert(CACHE_CONTROL, value.clone());
        headers.insert(PRAGMA, value.clone());
    })
}

#[must_use]
pub fn accept_html() -> HeaderOption {
    set_known(ACCEPT, ACCEPT_HTML.to_string())
}

#[must_use]
pub fn accept_json() -> HeaderOption {
    set_known(ACCEPT, ACCEPT_JSON.to_string())
}

#[must_use]
pub fn accept_xml() -> HeaderOption {
    set_known(ACCEPT, ACCEPT_XML.to_string())
}

#[must_use]
pub fn accept_any() -> HeaderOption {
    set_known(ACCEPT, ACCEPT_ANY.to_string())
}

/// Sets `Accept-Encoding`. Pair with
/// [`Decompress`](crate::response::Decompress) so the body is decoded.
pub fn accept_encoding<I, S>(encodings: I) -> HeaderOption
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    set_known(ACCEPT_ENCODING, join(encodings, ", "))
}

/// `Accept-Encoding: gzip, deflate, br`.
#[must_use]
pub fn default_encodings() -> HeaderOption {
    accept_encoding(DEFAULT_ENCODINGS)
}

/// Every encoding the decompression middleware understands.
#[must_use]
pub fn accept_all_encodings() -> HeaderOption {
    accept_encoding(ALL_ENCODINGS)
}

fn join<I, S>(items: I, sep: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

fn set_raw(key: &str, value: String) -> HeaderOption {
    match HeaderName::from_bytes(key.as_bytes()) {
        Ok(name) => set_known(name, value),
        Err(e) => {
            warn!(header = key, error = %e, "ignoring invalid header name");
            HeaderOption::new(|_| {})
        }
    }
}

pub(crate) fn set_known(name: HeaderName, value: String) -> HeaderOption {
    match HeaderValue::from_str(&value) {
        Ok(value) => HeaderOption::new(move |headers| {
            headers.insert(name.clone(), value.clone());
        }),
        Err(e) => {
            warn!(header = %name, error = %e, "ignoring invalid header value");
            HeaderOption::new(|_| {})
        }
    }
}
