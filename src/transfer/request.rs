//! Request line and header parsing for the range transfer protocol.

use mediacat_common::{Error, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Request method. Only GET and HEAD are served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Other(String),
}

impl Method {
    fn parse(s: &str) -> Self {
        match s {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            other => Method::Other(other.to_string()),
        }
    }
}

/// The window named by a `Range: bytes=...` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=start-` or `bytes=start-end` (end inclusive).
    From { start: u64, end: Option<u64> },
    /// `bytes=-n`: the final `n` bytes.
    Suffix(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub range: Option<RangeSpec>,
}

/// A resolved byte window, end inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub size: u64,
    /// The client asked for a range, so the answer is 206.
    pub partial: bool,
}

impl ByteRange {
    pub fn length(&self) -> u64 {
        if self.size == 0 {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.size)
    }
}

/// Parse a `Range` header value.
///
/// Unparsable values yield `None` and the request is served in full.
pub fn parse_range_value(value: &str) -> Option<RangeSpec> {
    let rest = value.trim().strip_prefix("bytes=")?;
    let (start, end) = rest.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        return end.parse().ok().map(RangeSpec::Suffix);
    }
    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some(RangeSpec::From { start, end })
}

/// Work out which bytes of a `size`-byte resource to send.
///
/// A start at or beyond the end fails with `InvalidRange`; an end past the
/// last byte is clamped.
pub fn effective_range(range: Option<RangeSpec>, size: u64) -> Result<ByteRange> {
    let (start, end) = match range {
        None => {
            return Ok(ByteRange {
                start: 0,
                end: size.saturating_sub(1),
                size,
                partial: false,
            })
        }
        Some(RangeSpec::From { start, end }) => (start, end.unwrap_or(u64::MAX)),
        Some(RangeSpec::Suffix(n)) => (size.saturating_sub(n), u64::MAX),
    };

    if start >= size {
        return Err(Error::InvalidRange { start, size });
    }
    let end = end.min(size - 1);
    if end < start {
        return Err(Error::InvalidRange { start, size });
    }
    Ok(ByteRange {
        start,
        end,
        size,
        partial: true,
    })
}

/// Read a request line and headers, at most `max_bytes` in total.
///
/// Every header other than `Range` is discarded.
pub async fn read_request<R>(reader: R, max_bytes: usize) -> Result<Request>
where
    R: AsyncBufRead + Unpin,
{
    let mut reader = reader.take(max_bytes as u64);
    let mut line = String::new();

    let request_line = loop {
        line.clear();
        read_line(&mut reader, &mut line).await?;
        // Tolerate stray blank lines before the request line.
        if !line.trim().is_empty() {
            break line.trim().to_string();
        }
    };

    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .map(Method::parse)
        .ok_or_else(|| Error::malformed("empty request line"))?;
    let path = parts
        .next()
        .filter(|p| p.starts_with('/'))
        .ok_or_else(|| Error::malformed(format!("bad request line '{request_line}'")))?
        .to_string();
    if let Some(version) = parts.next() {
        if !version.starts_with("HTTP/") {
            return Err(Error::malformed(format!("bad protocol version '{version}'")));
        }
    }

    let mut range = None;
    loop {
        line.clear();
        read_line(&mut reader, &mut line).await?;
        let header = line.trim();
        if header.is_empty() {
            break;
        }
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| Error::malformed(format!("bad header '{header}'")))?;
        if name.trim().eq_ignore_ascii_case("range") {
            range = parse_range_value(value);
        }
    }

    Ok(Request {
        method,
        path,
        range,
    })
}

async fn read_line<R>(reader: &mut tokio::io::Take<R>, line: &mut String) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let n = reader
        .read_line(line)
        .await
        .map_err(|e| Error::malformed(format!("unreadable request: {e}")))?;
    if n == 0 || !line.ends_with('\n') {
        return Err(if reader.limit() == 0 {
            Error::malformed("request headers too large")
        } else {
            Error::malformed("connection closed mid-request")
        });
    }
    Ok(())
}
