//! Read-progress reporting.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::time::Instant;

use super::chain::{Middleware, Process, process_fn};
use super::{Body, Response};

/// Default interval between progress reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest accepted report interval.
pub const MIN_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// One progress report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    /// Declared body size, when known.
    pub total: Option<u64>,
    /// Bytes read so far.
    pub read: u64,
    /// Throughput since the previous report.
    pub bytes_per_sec: f64,
}

type Report = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Middleware that reports how much of the body has been read.
///
/// Reports are emitted while the consumer reads, at most once per interval,
/// plus a final report when the body ends.
#[derive(Clone)]
pub struct Progress {
    report: Report,
    interval: Duration,
}

impl Progress {
    pub fn new(report: impl Fn(ProgressUpdate) + Send + Sync + 'static) -> Self {
        Self {
            report: Arc::new(report),
            interval: DEFAULT_REPORT_INTERVAL,
        }
    }

    /// Sets the report interval. Values below one second keep the default.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = if interval >= MIN_REPORT_INTERVAL {
            interval
        } else {
            DEFAULT_REPORT_INTERVAL
        };
        self
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Middleware for Progress {
    fn wrap<'a>(&self, next: Process<'a>) -> Process<'a> {
        let report = Arc::clone(&self.report);
        let interval = self.interval;
        process_fn(move |resp: Response| async move {
            let total = resp.content_length();
            let resp = resp.map_body(|body| track(body, total, interval, report));
            next(resp).await
        })
    }
}

struct Tracker {
    body: Body,
    total: Option<u64>,
    read: u64,
    interval: Duration,
    window_start: Instant,
    window_bytes: u64,
    report: Report,
}

impl Tracker {
    fn emit(&mut self) {
        let elapsed = self.window_start.elapsed().as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let bytes_per_sec = if elapsed > 0.0 {
            self.window_bytes as f64 / elapsed
        } else {
            0.0
        };
        (self.report)(ProgressUpdate {
            total: self.total,
            read: self.read,
            bytes_per_sec,
        });
        self.window_start = Instant::now();
        self.window_bytes = 0;
    }
}

fn track(body: Body, total: Option<u64>, interval: Duration, report: Report) -> Body {
    let tracker = Tracker {
        body,
        total,
        read: 0,
        interval,
        window_start: Instant::now(),
        window_bytes: 0,
        report,
    };
    Body::from_stream(stream::unfold(Some(tracker), |state| async move {
        let mut tracker = state?;
        match tracker.body.next().await {
            Some(Ok(chunk)) => {
                tracker.read += chunk.len() as u64;
                tracker.window_bytes += chunk.len() as u64;
                if tracker.window_start.elapsed() >= tracker.interval {
                    tracker.emit();
                }
                Some((Ok(chunk), Some(tracker)))
            }
            Some(Err(err)) => Some((Err(err), None)),
            None => {
                tracker.emit();
                None
            }
        }
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::error::Error;
    use crate::response::test_support::response;

    #[tokio::test]
    async fn test_final_report_at_end_of_stream() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(move |update| sink.lock().unwrap().push(update));

        let body = Body::from_stream(stream::iter(vec![
            Ok::<_, Error>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"defg")),
        ]));
        let process = progress.wrap(process_fn(|resp: Response| async move {
            assert_eq!(resp.bytes().await?, "abcdefg");
            Ok(())
        }));
        process(response(200, &[("content-length", "7")], body))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.read, 7);
        assert_eq!(last.total, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_after_interval() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(move |update: ProgressUpdate| {
            sink.lock().unwrap().push(update.read);
        })
        .interval(Duration::from_secs(1));

        let body = Body::from_stream(stream::unfold(0u8, |n| async move {
            if n == 3 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(600)).await;
            Some((Ok(Bytes::from_static(b"xx")), n + 1))
        }));
        let process = progress.wrap(process_fn(|resp: Response| async move {
            resp.bytes().await?;
            Ok(())
        }));
        process(response(200, &[], body)).await.unwrap();

        // 600ms: no report, 1200ms: report at 4 bytes, end: final report.
        assert_eq!(*seen.lock().unwrap(), vec![4, 6]);
    }

    #[test]
    fn test_interval_floor() {
        let progress = Progress::new(|_| {}).interval(Duration::from_millis(10));
        assert_eq!(progress.interval, DEFAULT_REPORT_INTERVAL);
        let progress = Progress::new(|_| {}).interval(Duration::from_secs(5));
        assert_eq!(progress.interval, Duration::from_secs(5));
    }
}
