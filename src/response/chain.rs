//! Processing chain: consumers, middleware and composition.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use tracing::debug;

use super::Response;
use crate::error::Error;

/// A response consumer. It owns the response, and therefore the body.
///
/// The lifetime lets terminals write results into caller-owned slots.
pub type Process<'a> = Box<dyn FnOnce(Response) -> BoxFuture<'a, Result<(), Error>> + Send + 'a>;

/// Turns an async closure into a [`Process`].
pub fn process_fn<'a, F, Fut>(f: F) -> Process<'a>
where
    F: FnOnce(Response) -> Fut + Send + 'a,
    Fut: Future<Output = Result<(), Error>> + Send + 'a,
{
    Box::new(move |resp| f(resp).boxed())
}

/// A consumer that ignores the response.
#[must_use]
pub fn noop<'a>() -> Process<'a> {
    process_fn(|_resp: Response| async { Ok(()) })
}

/// Wraps a consumer into another consumer.
pub trait Middleware: Send + Sync {
    fn wrap<'a>(&self, next: Process<'a>) -> Process<'a>;
}

/// Builds the effective consumer: the first middleware in `middleware`
/// sees the response first. A missing terminal becomes [`noop`].
#[must_use]
pub fn compose<'a>(terminal: Option<Process<'a>>, middleware: &[Arc<dyn Middleware>]) -> Process<'a> {
    let mut process = terminal.unwrap_or_else(noop);
    for layer in middleware.iter().rev() {
        process = layer.wrap(process);
    }
    process
}

/// Dispatches on the status code.
///
/// When the handler returns a consumer, it receives the response instead of
/// the rest of the chain.
pub struct Status<F> {
    handler: Arc<F>,
}

/// Creates a [`Status`] middleware.
pub fn status<F>(handler: F) -> Status<F>
where
    F: Fn(StatusCode) -> Option<Process<'static>> + Send + Sync + 'static,
{
    Status {
        handler: Arc::new(handler),
    }
}

impl<F> Middleware for Status<F>
where
    F: Fn(StatusCode) -> Option<Process<'static>> + Send + Sync + 'static,
{
    fn wrap<'a>(&self, next: Process<'a>) -> Process<'a> {
        let handler = Arc::clone(&self.handler);
        process_fn(move |resp: Response| async move {
            match (*handler)(resp.status()) {
                Some(replacement) => {
                    debug!(status = %resp.status(), "status handler took over response");
                    replacement(resp).await
                }
                None => next(resp).await,
            }
        })
    }
}

/// Fails with [`Error::HttpStatus`] for 4xx and 5xx responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorForStatus;

impl Middleware for ErrorForStatus {
    fn wrap<'a>(&self, next: Process<'a>) -> Process<'a> {
        process_fn(move |resp: Response| async move {
            let status = resp.status();
            if status.is_client_error() || status.is_server_error() {
                let retry_after = resp
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                return Err(Error::http_status(
                    resp.url().as_str(),
                    status.as_u16(),
                    retry_after,
                ));
            }
            next(resp).await
        })
    }
}
