//! Streaming `multipart/form-data` bodies.
//!
//! A producer task writes the parts into a one-slot channel while the
//! transport reads the other end, so a large file is never held in memory.
//! The producer is spawned by the first call to [`Multipart::body`] or
//! [`Multipart::wait_end`] and reports its outcome once through
//! [`Multipart::wait_end`].
//!
//! Cancelling the context passed to `wait_end` stops the wait, not the
//! producer: a producer parked on a send stays parked until the body
//! reader is dropped.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Error;
use crate::request::{BodyFn, Payload};
use crate::response::ChannelStream;

const CHUNK_SIZE: usize = 16 * 1024;
const BOUNDARY_BYTES: usize = 30;

type Chunk = io::Result<Bytes>;
type Source = Box<dyn AsyncRead + Send + Unpin>;

enum FileSource {
    Reader(Source),
    Path(PathBuf),
}

struct FilePart {
    field: String,
    filename: String,
    source: FileSource,
}

struct Producer {
    boundary: String,
    fields: Vec<(String, String)>,
    file: Option<FilePart>,
    tx: mpsc::Sender<Chunk>,
    done: oneshot::Sender<Result<(), Error>>,
}

struct Shared {
    boundary: String,
    started: AtomicBool,
    producer: Mutex<Option<Producer>>,
    reader: Mutex<Option<mpsc::Receiver<Chunk>>>,
    done: AsyncMutex<Option<oneshot::Receiver<Result<(), Error>>>>,
}

/// A multipart form body. Clones share the same producer and body.
#[derive(Clone)]
pub struct Multipart {
    shared: Arc<Shared>,
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Multipart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multipart")
            .field("boundary", &self.shared.boundary)
            .field("started", &self.shared.started.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Multipart {
    #[must_use]
    pub fn new() -> Self {
        let boundary = random_boundary();
        let (tx, rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();
        let producer = Producer {
            boundary: boundary.clone(),
            fields: Vec::new(),
            file: None,
            tx,
            done: done_tx,
        };
        Self {
            shared: Arc::new(Shared {
                boundary,
                started: AtomicBool::new(false),
                producer: Mutex::new(Some(producer)),
                reader: Mutex::new(Some(rx)),
                done: AsyncMutex::new(Some(done_rx)),
            }),
        }
    }

    /// Adds a scalar field. Fields are written in the order added, before
    /// the file. Ignored once the producer has started.
    #[must_use]
    pub fn field(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        self.configure(|producer| producer.fields.push((name, value)));
        self
    }

    /// Sets the file part, copied from `reader`.
    #[must_use]
    pub fn file(
        self,
        field: impl Into<String>,
        filename: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        let part = FilePart {
            field: field.into(),
            filename: filename.into(),
            source: FileSource::Reader(Box::new(reader)),
        };
        self.configure(|producer| producer.file = Some(part));
        self
    }

    /// Sets the file part from a local file, opened by the producer. The
    /// part's filename is the path's final component.
    #[must_use]
    pub fn local_file(self, field: impl Into<String>, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let part = FilePart {
            field: field.into(),
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source: FileSource::Path(path.to_path_buf()),
        };
        self.configure(|producer| producer.file = Some(part));
        self
    }

    /// `multipart/form-data; boundary=…`
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.shared.boundary)
    }

    /// Starts the producer and returns the body reading its output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Body`] if the body was already taken.
    pub fn body(&self) -> Result<Payload, Error> {
        let stream = self.take_stream()?;
        Ok(Payload::new(reqwest::Body::wrap_stream(stream)).content_type(self.content_type()))
    }

    /// A body producer for [`Request::body`](crate::Request::body).
    ///
    /// A retry calls it again, which fails with [`Error::Body`] because the
    /// stream was consumed by the first attempt.
    #[must_use]
    pub fn body_fn(&self) -> BodyFn {
        let multipart = self.clone();
        Arc::new(move || multipart.body().map(Some))
    }

    /// Waits for the producer to finish, starting it if needed.
    ///
    /// Returns `Ok(())` when the outcome was already collected by an
    /// earlier call.
    ///
    /// # Errors
    ///
    /// Returns the producer's error, or the context's error if it ends
    /// first.
    pub async fn wait_end(&self, ctx: &Context) -> Result<(), Error> {
        self.start();
        let mut done = self.shared.done.lock().await;
        let Some(rx) = done.as_mut() else {
            return Ok(());
        };
        let outcome = ctx.run(rx).await?;
        *done = None;
        outcome.unwrap_or_else(|_| Err(Error::body("multipart producer stopped without a result")))
    }

    pub(crate) fn take_stream(&self) -> Result<ChannelStream<Chunk>, Error> {
        self.start();
        self.shared
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(ChannelStream::new)
            .ok_or_else(|| Error::body("multipart body already taken"))
    }

    fn configure(&self, f: impl FnOnce(&mut Producer)) {
        let mut guard = self
            .shared
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(producer) => f(producer),
            None => warn!("multipart producer already started; ignoring new part"),
        }
    }

    fn start(&self) {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let producer = self
            .shared
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(producer) = producer {
            debug!(boundary = %producer.boundary, "starting multipart producer");
            tokio::spawn(producer.run());
        }
    }
}

impl Producer {
    async fn run(self) {
        let Self {
            boundary,
            fields,
            file,
            tx,
            done,
        } = self;
        let result = write_parts(&boundary, fields, file, &tx).await;
        if let Err(err) = &result {
            warn!(error = %err, "multipart producer failed");
        }
        let _ = done.send(result);
        drop(tx);
    }
}

async fn write_parts(
    boundary: &str,
    fields: Vec<(String, String)>,
    file: Option<FilePart>,
    tx: &mpsc::Sender<Chunk>,
) -> Result<(), Error> {
    let mut first = true;
    for (name, value) in fields {
        let mut part = part_header(boundary, first, &name, None);
        part.push_str(&value);
        send(tx, Bytes::from(part)).await?;
        first = false;
    }

    if let Some(FilePart {
        field,
        filename,
        source,
    }) = file
    {
        let mut reader: Source = match source {
            FileSource::Reader(reader) => reader,
            FileSource::Path(path) => Box::new(
                tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| Error::io(&path, e))?,
            ),
        };
        send(tx, Bytes::from(part_header(boundary, first, &field, Some(&filename)))).await?;
        first = false;

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf).await.map_err(Error::body)?;
            if n == 0 {
                break;
            }
            send(tx, Bytes::copy_from_slice(&buf[..n])).await?;
        }
    }

    let closing = if first {
        format!("--{boundary}--\r\n")
    } else {
        format!("\r\n--{boundary}--\r\n")
    };
    send(tx, Bytes::from(closing)).await
}

fn part_header(boundary: &str, first: bool, name: &str, filename: Option<&str>) -> String {
    let mut header = String::new();
    if !first {
        header.push_str("\r\n");
    }
    let _ = write!(
        header,
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"",
        escape_quotes(name)
    );
    if let Some(filename) = filename {
        let _ = write!(
            header,
            "; filename=\"{}\"\r\nContent-Type: application/octet-stream",
            escape_quotes(filename)
        );
    }
    header.push_str("\r\n\r\n");
    header
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

async fn send(tx: &mpsc::Sender<Chunk>, chunk: Bytes) -> Result<(), Error> {
    tx.send(Ok(chunk))
        .await
        .map_err(|_| Error::body("multipart body reader dropped"))
}

fn random_boundary() -> String {
    let mut raw = [0u8; BOUNDARY_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    raw.iter().fold(String::with_capacity(BOUNDARY_BYTES * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use tempfile::TempDir;

    use super::*;

    async fn collect(multipart: &Multipart) -> String {
        let chunks: Vec<Chunk> = multipart.take_stream().unwrap().collect().await;
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&chunk.unwrap());
        }
        String::from_utf8(out).unwrap()
    }

    // ==================== Layout Tests ====================

    #[tokio::test]
    async fn test_fields_then_file_then_closing() {
        let multipart = Multipart::new()
            .field("a", "1")
            .field("b", "two")
            .file("upload", "notes.txt", &b"file body"[..]);
        let boundary = multipart.shared.boundary.clone();
        let text = collect(&multipart).await;
        let expected = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\
             \r\n--{boundary}\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\ntwo\
             \r\n--{boundary}\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"notes.txt\"\r\n\
             Content-Type: application/octet-stream\r\n\r\nfile body\
             \r\n--{boundary}--\r\n"
        );
        assert_eq!(text, expected);
        multipart.wait_end(&Context::background()).await.unwrap();
    }

    #[test]
    fn test_boundary_is_hex() {
        let multipart = Multipart::new();
        let boundary = &multipart.shared.boundary;
        assert_eq!(boundary.len(), 60);
        assert!(boundary.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(multipart.content_type().ends_with(boundary.as_str()));
    }

    #[test]
    fn test_escape_quotes() {
        assert_eq!(escape_quotes(r#"a"b\c"#), r#"a\"b\\c"#);
    }

    // ==================== Lifecycle Tests ====================

    #[tokio::test]
    async fn test_body_taken_once() {
        let multipart = Multipart::new().field("a", "1");
        assert!(multipart.body().is_ok());
        assert!(matches!(multipart.body(), Err(Error::Body { .. })));
    }

    #[tokio::test]
    async fn test_second_wait_end_is_ok() {
        let multipart = Multipart::new().field("a", "1");
        let _ = collect(&multipart).await;
        let ctx = Context::background();
        multipart.wait_end(&ctx).await.unwrap();
        multipart.wait_end(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_local_file_reported_by_wait_end() {
        let temp_dir = TempDir::new().unwrap();
        let multipart = Multipart::new()
            .field("a", "1")
            .local_file("upload", temp_dir.path().join("missing.bin"));
        let text = collect(&multipart).await;
        assert!(text.contains("name=\"a\""));
        assert!(!text.ends_with("--\r\n"), "stream must be truncated: {text}");
        let err = multipart.wait_end(&Context::background()).await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[tokio::test]
    async fn test_local_file_uses_basename() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.csv");
        std::fs::write(&path, "x,y\n1,2\n").unwrap();
        let multipart = Multipart::new().local_file("f", &path);
        let text = collect(&multipart).await;
        assert!(text.contains("filename=\"report.csv\""));
        assert!(text.contains("x,y\n1,2\n"));
        multipart.wait_end(&Context::background()).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_end_cancelled_while_producer_blocked() {
        let multipart = Multipart::new().field("a", "1").field("b", "2");
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        // Nobody reads the body, so the producer parks on its second send.
        let err = multipart.wait_end(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_dropped_reader_fails_producer() {
        let multipart = Multipart::new()
            .field("a", "1")
            .field("b", "2")
            .field("c", "3");
        drop(multipart.take_stream().unwrap());
        let err = multipart.wait_end(&Context::background()).await.unwrap_err();
        assert!(matches!(err, Error::Body { .. }));
    }
}
