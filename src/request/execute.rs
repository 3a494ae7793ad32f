//! Execution loop: build, send, retry, deliver.

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{Request, default_transport};
use crate::error::Error;
use crate::response::{Process, Response, compose};

impl Request {
    /// Executes the request and hands the response to `terminal` through
    /// the registered middleware. `None` consumes the response without
    /// reading the body.
    ///
    /// Transient failures (timeouts, connection errors) are retried after
    /// each delay set with [`try_at`](Self::try_at); every other error is
    /// returned immediately. The call, every backoff wait and the delivery
    /// are raced against the request's [`Context`](crate::Context).
    ///
    /// # Errors
    ///
    /// Returns the first failing option's error, [`Error::InvalidUrl`],
    /// the body producer's error, the last transport error,
    /// [`Error::Cancelled`] / [`Error::DeadlineExceeded`], or whatever the
    /// middleware chain returns.
    #[instrument(skip_all, fields(method = tracing::field::Empty, url = tracing::field::Empty))]
    pub async fn process<'a>(mut self, terminal: Option<Process<'a>>) -> Result<(), Error> {
        for option in std::mem::take(&mut self.options) {
            option(&mut self)?;
        }

        let method = self.method.take().unwrap_or(Method::GET);
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => default_transport()?,
        };
        let raw_url = join_query(&self.url, &self.query);
        let url = Url::parse(&raw_url).map_err(|_| Error::invalid_url(raw_url.as_str()))?;

        let span = tracing::Span::current();
        span.record("method", method.as_str());
        span.record("url", url.as_str());

        let mut attempt = 0usize;
        let response = loop {
            let mut outgoing = reqwest::Request::new(method.clone(), url.clone());
            if let Some(producer) = &self.body
                && let Some(payload) = producer().map_err(into_body_error)?
            {
                if let Some(content_type) = &payload.content_type {
                    let value = HeaderValue::from_str(content_type).map_err(Error::body)?;
                    outgoing.headers_mut().insert(CONTENT_TYPE, value);
                }
                *outgoing.body_mut() = Some(payload.body);
            }
            for option in &self.headers {
                option.apply(outgoing.headers_mut());
            }

            debug!(attempt = attempt + 1, "sending");
            match self.ctx.run(transport.send(outgoing)).await? {
                Ok(response) => break response,
                Err(err) if err.is_transient() => {
                    let Some(delay) = self.try_times.get(attempt).copied() else {
                        warn!(attempt = attempt + 1, error = %err, "request failed, no retries left");
                        return Err(err);
                    };
                    attempt += 1;
                    warn!(attempt, ?delay, error = %err, "transient failure, retrying");
                    self.ctx.run(tokio::time::sleep(delay)).await?;
                }
                Err(err) => {
                    warn!(attempt = attempt + 1, error = %err, "request failed");
                    return Err(err);
                }
            }
        };

        info!(status = %response.status(), attempts = attempt + 1, "response received");
        let process = compose(terminal, &self.middleware);
        self.ctx.run(process(Response::from_reqwest(response))).await?
    }
}

fn into_body_error(err: Error) -> Error {
    match err {
        Error::Body { .. } => err,
        other => Error::body(other),
    }
}

fn join_query(url: &str, query: &str) -> String {
    if query.is_empty() {
        url.to_string()
    } else if url.contains('?') {
        format!("{url}&{query}")
    } else {
        format!("{url}?{query}")
    }
}
