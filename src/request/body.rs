//! Request body producers.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Error;

/// One attempt's body and its content type.
pub struct Payload {
    pub(crate) content_type: Option<String>,
    pub(crate) body: reqwest::Body,
}

impl Payload {
    pub fn new(body: impl Into<reqwest::Body>) -> Self {
        Self {
            content_type: None,
            body: body.into(),
        }
    }

    /// Sets the `Content-Type` sent with this body. An empty string leaves
    /// the header unset.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        self.content_type = (!content_type.is_empty()).then_some(content_type);
        self
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Builds the body for one attempt. Called again before every retry, so
/// in-memory producers resend the same bytes. `Ok(None)` sends no body.
pub type BodyFn = Arc<dyn Fn() -> Result<Option<Payload>, Error> + Send + Sync>;

/// A producer that resends the same bytes with `content_type`.
pub fn fixed(content_type: &str, data: impl Into<Bytes>) -> BodyFn {
    let content_type = content_type.to_string();
    let data = data.into();
    Arc::new(move || Ok(Some(Payload::new(data.clone()).content_type(content_type.as_str()))))
}
