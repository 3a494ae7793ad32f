//! `Content-Encoding` decoding.
//!
//! The decoders are synchronous `Read` adapters, so each decoded body runs
//! one blocking worker that reads compressed chunks from a channel and
//! sends decoded chunks back. Both channels are bounded; dropping the
//! decoded body stops the worker, which in turn drops the compressed body.

use std::io::{self, Read};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::{Buf, Bytes};
use futures_util::StreamExt;
use futures_util::stream;
use reqwest::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::chain::{Middleware, Process, process_fn};
use super::{Body, ChannelStream, Response};
use crate::error::Error;

/// Chunks in flight per direction between the body and the decoder worker.
const CHANNEL_DEPTH: usize = 4;

/// Size of each decoded chunk.
const DECODE_CHUNK_SIZE: usize = 16 * 1024;

/// Brotli decoder input buffer size.
const BROTLI_BUFFER_SIZE: usize = 4096;

/// Supported `Content-Encoding` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Brotli,
    /// Raw DEFLATE stream (no zlib wrapper).
    Deflate,
    Gzip,
    Zstd,
    /// Framed Snappy.
    Snappy,
    /// Read with the framed Snappy decoder; streams using S2-only
    /// extensions fail to decode.
    S2,
}

impl ContentEncoding {
    /// Maps a header value to an encoding; unknown values yield `None`.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim() {
            "br" => Some(Self::Brotli),
            "deflate" => Some(Self::Deflate),
            "gzip" => Some(Self::Gzip),
            "zstd" | "zst" => Some(Self::Zstd),
            "snappy" => Some(Self::Snappy),
            "s2" => Some(Self::S2),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Brotli => "br",
            Self::Deflate => "deflate",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
            Self::Snappy => "snappy",
            Self::S2 => "s2",
        }
    }

    fn decoder<R: Read + Send + 'static>(self, reader: R) -> io::Result<Box<dyn Read + Send>> {
        Ok(match self {
            Self::Brotli => Box::new(brotli::Decompressor::new(reader, BROTLI_BUFFER_SIZE)),
            Self::Deflate => Box::new(flate2::read::DeflateDecoder::new(reader)),
            Self::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
            Self::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
            Self::Snappy | Self::S2 => Box::new(snap::read::FrameDecoder::new(reader)),
        })
    }
}

/// Middleware that decodes the body according to `Content-Encoding`.
///
/// The decoder is primed before the rest of the chain runs, so a body that
/// cannot be decoded at all (bad header, wrong format) fails here with
/// [`Error::Decompress`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Decompress;

impl Middleware for Decompress {
    fn wrap<'a>(&self, next: Process<'a>) -> Process<'a> {
        process_fn(move |resp: Response| async move {
            let resp = decompress(resp).await?;
            next(resp).await
        })
    }
}

/// Replaces the body with a decoded stream when the encoding is supported,
/// removing `Content-Encoding` (and the now stale `Content-Length`).
///
/// # Errors
///
/// Returns [`Error::Decompress`] when the decoder cannot produce its first
/// chunk, or the body's own error if reading it failed first.
pub async fn decompress(mut resp: Response) -> Result<Response, Error> {
    let Some(encoding) = resp
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .and_then(ContentEncoding::from_header)
    else {
        return Ok(resp);
    };

    debug!(encoding = encoding.as_str(), url = %resp.url(), "decoding response body");
    resp.headers_mut().remove(CONTENT_ENCODING);
    resp.headers_mut().remove(CONTENT_LENGTH);

    let (parts, body) = resp.into_parts();
    let decoded = spawn_decoder(encoding, body).await?;
    Ok(Response::from_parts(parts, decoded))
}

type Chunk = Result<Bytes, Error>;

async fn spawn_decoder(encoding: ContentEncoding, body: Body) -> Result<Body, Error> {
    let (raw_tx, raw_rx) = mpsc::channel::<Chunk>(CHANNEL_DEPTH);
    let (out_tx, mut out_rx) = mpsc::channel::<Chunk>(CHANNEL_DEPTH);
    let upstream_error = Arc::new(Mutex::new(None));

    tokio::spawn(pump(body, raw_tx));

    let reader = ChannelReader {
        rx: raw_rx,
        chunk: Bytes::new(),
        upstream_error: Arc::clone(&upstream_error),
    };
    tokio::task::spawn_blocking(move || decode_blocking(encoding, reader, &out_tx, &upstream_error));

    match out_rx.recv().await {
        None => Ok(Body::empty()),
        Some(Err(err)) => Err(err),
        Some(Ok(first)) => Ok(Body::from_stream(
            stream::once(async move { Ok(first) }).chain(ChannelStream::new(out_rx)),
        )),
    }
}

/// Feeds the compressed body into the decoder worker.
async fn pump(mut body: Body, tx: mpsc::Sender<Chunk>) {
    while let Some(item) = body.next().await {
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            break;
        }
    }
}

fn decode_blocking(
    encoding: ContentEncoding,
    reader: ChannelReader,
    out: &mpsc::Sender<Chunk>,
    upstream_error: &Mutex<Option<Error>>,
) {
    let result = encoding
        .decoder(reader)
        .and_then(|mut decoder| copy_chunks(&mut *decoder, out));

    if let Err(io_err) = result {
        let err = upstream_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| Error::decompress(encoding.as_str(), io_err));
        warn!(encoding = encoding.as_str(), error = %err, "response body decoding failed");
        let _ = out.blocking_send(Err(err));
    }
}

fn copy_chunks(decoder: &mut dyn Read, out: &mpsc::Sender<Chunk>) -> io::Result<()> {
    loop {
        let mut buf = vec![0u8; DECODE_CHUNK_SIZE];
        let n = match decoder.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        buf.truncate(n);
        if out.blocking_send(Ok(Bytes::from(buf))).is_err() {
            // Decoded body was dropped.
            return Ok(());
        }
    }
}

/// Blocking `Read` over the compressed chunk channel.
///
/// A body error is parked in `upstream_error` so the worker can report it
/// as-is instead of as a decoding failure.
struct ChannelReader {
    rx: mpsc::Receiver<Chunk>,
    chunk: Bytes,
    upstream_error: Arc<Mutex<Option<Error>>>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.chunk.is_empty() {
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => self.chunk = chunk,
                Some(Err(err)) => {
                    let message = err.to_string();
                    *self
                        .upstream_error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(err);
                    return Err(io::Error::other(message));
                }
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len());
        buf[..n].copy_from_slice(&self.chunk[..n]);
        self.chunk.advance(n);
        Ok(n)
    }
}
