//! Writing responses to a sink for debugging.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use super::chain::{Middleware, Process, process_fn};
use super::{Body, Response};

/// Separator written before and after each dump.
pub const DUMP_LINE: &str =
    "----------------------------------------------------------------------\n";

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Middleware that writes the status line, URL and headers of every
/// response to a sink, then hands the response on unchanged.
///
/// With [`Dump::with_body`] the whole body is read, written after the
/// headers and replayed to the rest of the chain. Write failures are
/// logged and never fail the request.
#[derive(Clone)]
pub struct Dump {
    sink: Sink,
    body: bool,
}

impl Dump {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
            body: false,
        }
    }

    /// Dumps to standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    /// Also dumps the body.
    #[must_use]
    pub fn with_body(mut self) -> Self {
        self.body = true;
        self
    }
}

impl std::fmt::Debug for Dump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dump")
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

impl Middleware for Dump {
    fn wrap<'a>(&self, next: Process<'a>) -> Process<'a> {
        let sink = Arc::clone(&self.sink);
        let with_body = self.body;
        process_fn(move |resp: Response| async move {
            let mut text = head(&resp);
            let resp = if with_body {
                let (parts, body) = resp.into_parts();
                let bytes = body.bytes().await?;
                text.push_str(&String::from_utf8_lossy(&bytes));
                text.push('\n');
                Response::from_parts(parts, Body::from_bytes(bytes))
            } else {
                resp
            };
            text.push_str(DUMP_LINE);
            write_dump(&sink, &text);
            next(resp).await
        })
    }
}

fn write_dump(sink: &Sink, text: &str) {
    let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = sink.write_all(text.as_bytes()).and_then(|()| sink.flush()) {
        warn!(error = %e, "failed to write response dump");
    }
}

fn head(resp: &Response) -> String {
    let mut text = String::from(DUMP_LINE);
    let _ = writeln!(text, "{}", resp.status());
    let _ = writeln!(text, "URL: {}", resp.url());
    for (name, value) in resp.headers() {
        let _ = writeln!(text, "{name}: {}", String::from_utf8_lossy(value.as_bytes()));
    }
    text.push('\n');
    text
}
