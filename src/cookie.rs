//! Request cookies and reading `Set-Cookie` from responses.

use std::sync::Arc;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE};
use tracing::{debug, warn};

use crate::error::Error;
use crate::request::HeaderOption;
use crate::response::{Middleware, Process, Response, process_fn};

/// A cookie name/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parses the leading `name=value` of a `Set-Cookie` header, ignoring
    /// attributes. Surrounding quotes on the value are removed.
    #[must_use]
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let pair = header.split(';').next()?;
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some(Self::new(name, value))
    }

    fn to_header_pair(&self) -> String {
        format!(
            "{}={}",
            sanitize_name(&self.name),
            sanitize_value(&self.value)
        )
    }
}

/// Appends `cookies` to the `Cookie` header, joined with `"; "`.
///
/// Names have CR and LF replaced by `-`. Bytes not allowed in a cookie
/// value are dropped (with a warning), and values containing a space or a
/// comma are quoted.
pub fn cookie_add(cookies: &[Cookie]) -> HeaderOption {
    let pairs: Vec<String> = cookies.iter().map(Cookie::to_header_pair).collect();
    append_pairs(pairs)
}

/// Appends preformatted `name=value` strings to the `Cookie` header.
/// Empty strings are skipped.
pub fn cookie_add_str<I, S>(cookies: I) -> HeaderOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let pairs = cookies
        .into_iter()
        .map(Into::into)
        .filter(|s: &String| !s.is_empty())
        .collect();
    append_pairs(pairs)
}

fn append_pairs(pairs: Vec<String>) -> HeaderOption {
    HeaderOption::new(move |headers: &mut HeaderMap| {
        for pair in &pairs {
            let joined = match headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
                Some(current) if !current.is_empty() => format!("{current}; {pair}"),
                _ => pair.clone(),
            };
            match HeaderValue::from_str(&joined) {
                Ok(value) => {
                    headers.insert(COOKIE, value);
                }
                Err(e) => warn!(cookie = %pair, error = %e, "ignoring invalid cookie"),
            }
        }
    })
}

fn sanitize_name(name: &str) -> String {
    name.replace(['\n', '\r'], "-")
}

fn valid_value_byte(b: u8) -> bool {
    (0x20..0x7f).contains(&b) && b != b'"' && b != b';' && b != b'\\'
}

fn sanitize_value(value: &str) -> String {
    let value = if value.bytes().all(valid_value_byte) {
        value.to_string()
    } else {
        warn!(value, "invalid byte in cookie value; dropping invalid bytes");
        value
            .chars()
            .filter(|c| u8::try_from(*c).is_ok_and(valid_value_byte))
            .collect()
    };
    if value.contains([' ', ',']) {
        format!("\"{value}\"")
    } else {
        value
    }
}

type CookieReader = dyn Fn(&[Cookie]) -> Result<(), Error> + Send + Sync;

/// Middleware handing the response's `Set-Cookie` cookies to a callback
/// before the rest of the chain runs. A callback error stops the chain.
#[derive(Clone)]
pub struct ReadCookies {
    read: Arc<CookieReader>,
}

/// Creates a [`ReadCookies`] middleware.
pub fn read_cookies(
    read: impl Fn(&[Cookie]) -> Result<(), Error> + Send + Sync + 'static,
) -> ReadCookies {
    ReadCookies {
        read: Arc::new(read),
    }
}

/// Every cookie set by `resp`, in header order.
#[must_use]
pub fn response_cookies(resp: &Response) -> Vec<Cookie> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(Cookie::parse_set_cookie)
        .collect()
}

impl Middleware for ReadCookies {
    fn wrap<'a>(&self, next: Process<'a>) -> Process<'a> {
        let read = Arc::clone(&self.read);
        process_fn(move |resp: Response| async move {
            let cookies = response_cookies(&resp);
            debug!(count = cookies.len(), "read response cookies");
            (*read)(&cookies)?;
            next(resp).await
        })
    }
}
