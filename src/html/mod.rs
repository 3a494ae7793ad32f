//! Declarative HTML binding.
//!
//! # Overview
//!
//! Rules ([`FieldRule`]) are compiled into a [`Schema`] and bound against a
//! [`Selection`] of a parsed document, producing a dynamic [`Value`] that
//! can be converted into any `serde` type. The response terminals in this
//! module parse the body once it has gone through the middleware chain.
//!
//! # Example
//!
//! ```
//! use fetchbind::html::{FieldRule, Schema, Value, bind_html};
//! use fetchbind::template::Params;
//!
//! let schema = Schema::record([
//!     FieldRule::new("title").select("h1"),
//!     FieldRule::new("tags").select("li.tag").list(),
//! ])
//! .unwrap();
//! let page = r#"<h1>Hi</h1><ul><li class="tag">a</li><li class="tag">b</li></ul>"#;
//! let value = bind_html(page, "", &schema, &Params::new()).unwrap();
//! assert_eq!(value.get("title"), Some(&Value::from("Hi")));
//! ```

mod bind;
mod coerce;
mod error;
mod rule;
mod selection;
mod value;

use bytes::Bytes;
use scraper::{Html, Selector};
use tracing::debug;

pub use bind::{bind, bind_into};
pub use error::BindError;
pub use rule::{ATTR_HTML, ATTR_TEXT, FieldRule, Kind, SPLIT_WHITESPACE, Schema};
pub use selection::Selection;
pub use value::Value;

use crate::error::Error;
use crate::response::{Process, Response, process_fn};
use crate::template::Params;

/// Parses `text` and binds `schema` under the nodes matching `root`
/// (empty `root` binds against the whole document).
///
/// # Errors
///
/// Returns [`Error::Bind`] for an invalid root selector or a binding failure.
pub fn bind_html(
    text: &str,
    root: &str,
    schema: &Schema,
    params: &Params,
) -> Result<Value, Error> {
    let document = Html::parse_document(text);
    let scope = root_scope(&document, root)?;
    Ok(bind(&scope, schema, params)?)
}

fn root_scope<'a>(document: &'a Html, root: &str) -> Result<Selection<'a>, BindError> {
    let scope = Selection::document(document);
    match root.trim() {
        "" => Ok(scope),
        css => {
            let selector = Selector::parse(css).map_err(|e| BindError::Selector {
                field: String::new(),
                selector: css.to_string(),
                reason: e.to_string(),
            })?;
            Ok(scope.find(&selector))
        }
    }
}

fn body_text(body: &Bytes) -> String {
    String::from_utf8_lossy(body).into_owned()
}

/// Terminal that parses the body and hands the document to `query`.
pub fn query<'a, F>(query: F) -> Process<'a>
where
    F: for<'h> FnOnce(Selection<'h>) -> Result<(), Error> + Send + 'a,
{
    process_fn(move |resp: Response| async move {
        let body = resp.bytes().await?;
        run_query(&body, query)
    })
}

fn run_query<F>(body: &Bytes, query: F) -> Result<(), Error>
where
    F: for<'h> FnOnce(Selection<'h>) -> Result<(), Error>,
{
    let document = Html::parse_document(&body_text(body));
    query(Selection::document(&document))
}

/// Terminal that binds `schema` under `root` and stores the result in `out`.
pub fn bind_to<'a>(
    root: &'a str,
    schema: &'a Schema,
    params: &'a Params,
    out: &'a mut Option<Value>,
) -> Process<'a> {
    process_fn(move |resp: Response| async move {
        let body = resp.bytes().await?;
        debug!(bytes = body.len(), root, "binding html document");
        *out = Some(bind_html(&body_text(&body), root, schema, params)?);
        Ok(())
    })
}
