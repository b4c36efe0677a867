//! Resumable ranged reads of a remote resource.

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::{Buf, Bytes};
use mediacat_common::{Error, Result};
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use tracing::{debug, trace, warn};

/// Default bound on waiting for response headers or the next body chunk.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

struct OpenStream {
    response: reqwest::Response,
    /// Offset of the next byte the stream will yield.
    position: u64,
    pending: Bytes,
}

/// Positional reads over a single resource URL.
///
/// A sequential read continues the open response. A read at any other offset
/// drops it and issues a fresh `Range: bytes=<offset>-` request.
pub struct RangeReader {
    client: reqwest::Client,
    url: String,
    size: Option<u64>,
    stream: Option<OpenStream>,
    connections: u64,
    read_timeout: Duration,
}

impl RangeReader {
    /// Nothing is fetched until the first read.
    pub fn new(client: reqwest::Client, url: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            client,
            url: url.into(),
            size,
            stream: None,
            connections: 0,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Bound every wait on the server. A stalled wait fails the attempt.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Total size, once known.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Offset the open stream would continue from.
    pub fn position(&self) -> Option<u64> {
        self.stream.as_ref().map(|s| s.position)
    }

    /// Number of range requests issued so far.
    pub fn connections(&self) -> u64 {
        self.connections
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns fewer bytes only at the end of the resource, and `0` at or
    /// past it. A failed attempt is retried once on a fresh connection.
    pub async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.size.is_some_and(|size| offset >= size) {
            return Ok(0);
        }

        match self.read_once(offset, buf).await {
            Ok(n) => Ok(n),
            Err(e) => {
                warn!("Read of {} at {} failed ({e}), reconnecting", self.url, offset);
                self.stream = None;
                let retry = self.read_once(offset, buf).await;
                if retry.is_err() {
                    self.stream = None;
                }
                retry
            }
        }
    }

    async fn read_once(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let stream = match self.stream.take() {
            Some(stream) if stream.position == offset => stream,
            previous => {
                if let Some(previous) = previous {
                    debug!(
                        "Seek from {} to {} on {}, reopening",
                        previous.position, offset, self.url
                    );
                }
                match self.connect(offset).await? {
                    Some(stream) => stream,
                    None => return Ok(0),
                }
            }
        };
        let read_timeout = self.read_timeout;
        let stream = self.stream.insert(stream);

        let mut filled = 0;
        while filled < buf.len() {
            if stream.pending.is_empty() {
                match bounded(read_timeout, stream.response.chunk()).await? {
                    Some(chunk) => stream.pending = chunk,
                    None => break,
                }
            }
            let n = stream.pending.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&stream.pending[..n]);
            stream.pending.advance(n);
            filled += n;
        }
        stream.position += filled as u64;
        trace!("Read {} bytes at {} from {}", filled, offset, self.url);
        Ok(filled)
    }

    /// Open a stream at `offset`; `None` when the offset is past the end.
    async fn connect(&mut self, offset: u64) -> Result<Option<OpenStream>> {
        self.connections += 1;
        let request = self
            .client
            .get(&self.url)
            .header(RANGE, format!("bytes={offset}-"))
            .send();
        let response = bounded(self.read_timeout, request).await?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let (start, size) = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_content_range)
                    .ok_or_else(|| Error::internal("partial response without Content-Range"))?;
                if start != offset {
                    return Err(Error::internal(format!(
                        "server resumed {} at {start} instead of {offset}",
                        self.url
                    )));
                }
                self.size = Some(size);
            }
            StatusCode::OK if offset == 0 => {
                if let Some(len) = response.content_length() {
                    self.size = Some(len);
                }
            }
            StatusCode::OK => {
                return Err(Error::internal(format!(
                    "server ignored the range request for {}",
                    self.url
                )));
            }
            StatusCode::RANGE_NOT_SATISFIABLE => return Ok(None),
            StatusCode::NOT_FOUND => return Err(Error::no_such_object(&self.url)),
            status => {
                return Err(Error::internal(format!("{} answered {status}", self.url)));
            }
        }

        Ok(Some(OpenStream {
            response,
            position: offset,
            pending: Bytes::new(),
        }))
    }
}

fn transfer_error(err: reqwest::Error) -> Error {
    Error::from(io::Error::other(err))
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = reqwest::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(transfer_error),
        Err(_) => Err(Error::from(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no response within {limit:?}"),
        ))),
    }
}

/// Parse `bytes <start>-<end>/<size>` into `(start, size)`.
fn parse_content_range(value: &str) -> Option<(u64, u64)> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, size) = rest.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    Some((start.trim().parse().ok()?, size.trim().parse().ok()?))
}
