//! The range transfer server.
//!
//! One task per accepted connection. Each connection carries exactly one
//! request and is closed after the response. The accept loop reaps finished
//! tasks as it goes; on cancellation it stops accepting and waits for the
//! remaining ones, which stop after their current chunk.

use std::io::{self, SeekFrom};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mediacat_common::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use super::request::{effective_range, read_request, ByteRange, Method, Request};
use super::resources::{ResourceHandle, ResourceInfo, VirtualResources};
use crate::config::TransferConfig;

pub struct TransferServer {
    listener: TcpListener,
    config: Arc<TransferConfig>,
    cancel: CancellationToken,
    next_connection: AtomicU64,
}

impl TransferServer {
    /// Bind the listener. Port 0 picks a free port; see [`Self::local_addr`].
    pub async fn bind(
        addr: SocketAddr,
        config: TransferConfig,
        cancel: CancellationToken,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            config: Arc::new(config),
            cancel,
            next_connection: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve `resources` until the cancellation token fires.
    pub async fn run(self, resources: Arc<dyn VirtualResources>) {
        match self.local_addr() {
            Ok(addr) => info!("Transfer server listening on {addr}"),
            Err(e) => warn!("Transfer server listening on unknown address: {e}"),
        }

        let mut workers = JoinSet::new();
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
                            let span = info_span!("conn", id, %peer);
                            let resources = Arc::clone(&resources);
                            let config = Arc::clone(&self.config);
                            let cancel = self.cancel.clone();
                            workers.spawn(
                                handle_connection(stream, resources, config, cancel).instrument(span),
                            );
                        }
                        Err(e) => {
                            debug!("Accept error: {e}");
                        }
                    }
                }
                Some(done) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = done {
                        warn!("Connection task failed: {e}");
                    }
                }
                _ = self.cancel.cancelled() => break,
            }
        }

        debug!("Waiting for {} open connections", workers.len());
        while let Some(done) = workers.join_next().await {
            if let Err(e) = done {
                warn!("Connection task failed: {e}");
            }
        }
        info!("Transfer server stopped");
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    resources: Arc<dyn VirtualResources>,
    config: Arc<TransferConfig>,
    cancel: CancellationToken,
) {
    let (read_half, mut writer) = stream.split();
    let mut reader = BufReader::new(read_half);

    let request = match timeout(
        config.header_timeout(),
        read_request(&mut reader, config.max_header_bytes),
    )
    .await
    {
        Ok(Ok(request)) => request,
        Ok(Err(e)) => {
            debug!("Rejecting request: {e}");
            if let Err(e) = write_error(&mut writer, &e).await {
                trace!("Error response not delivered: {e}");
            }
            return;
        }
        Err(_) => {
            debug!("Request headers not received in time");
            if let Err(e) = write_error(&mut writer, &Error::malformed("header timeout")).await {
                trace!("Error response not delivered: {e}");
            }
            return;
        }
    };

    if let Err(e) = respond(&mut writer, request, resources.as_ref(), &config, &cancel).await {
        if e.kind() == io::ErrorKind::BrokenPipe || e.kind() == io::ErrorKind::ConnectionReset {
            trace!("Client went away: {e}");
        } else {
            debug!("Transfer failed: {e}");
        }
    }
    if let Err(e) = writer.shutdown().await {
        trace!("Shutdown of client stream failed: {e}");
    }
}

async fn respond<W>(
    writer: &mut W,
    request: Request,
    resources: &dyn VirtualResources,
    config: &TransferConfig,
    cancel: &CancellationToken,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head_only = match &request.method {
        Method::Get => false,
        Method::Head => true,
        Method::Other(m) => {
            debug!("{} {} -> 501", m, request.path);
            return write_status(writer, 501, &[]).await;
        }
    };
    let path = request.path.split('?').next().unwrap_or(&request.path);

    let info = match resources.info(path).await {
        Ok(info) => info,
        Err(e) => {
            debug!("{} -> {}: {e}", path, e.http_status());
            return write_error(writer, &e).await;
        }
    };
    let range = match effective_range(request.range, info.size) {
        Ok(range) => range,
        Err(e) => {
            debug!("{} -> 416: {e}", path);
            return write_error(writer, &e).await;
        }
    };

    let handle = if head_only {
        None
    } else {
        match open_at(resources, path, range.start).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                debug!("{} -> {}: {e}", path, e.http_status());
                return write_error(writer, &e).await;
            }
        }
    };

    let status = if range.partial { 206 } else { 200 };
    debug!(
        "{:?} {} -> {} ({} bytes)",
        request.method,
        path,
        status,
        range.length()
    );
    write_headers(writer, status, &info, &range).await?;

    if let Some(handle) = handle {
        send_body(writer, handle, range.length(), config, cancel).await?;
    }
    writer.flush().await
}

async fn open_at(
    resources: &dyn VirtualResources,
    path: &str,
    start: u64,
) -> Result<ResourceHandle> {
    let mut handle = resources.open(path).await?;
    if start > 0 {
        handle.seek(SeekFrom::Start(start)).await?;
    }
    Ok(handle)
}

/// Copy `length` bytes in chunks, each write bounded by the I/O timeout.
///
/// Cancellation is only observed between chunks.
async fn send_body<W>(
    writer: &mut W,
    mut handle: ResourceHandle,
    length: u64,
    config: &TransferConfig,
    cancel: &CancellationToken,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let chunk = config.chunk_size.max(1);
    let mut buf = vec![0u8; chunk.min(usize::try_from(length).unwrap_or(chunk))];
    let mut remaining = length;

    while remaining > 0 {
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = handle.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "resource shorter than advertised",
            ));
        }

        timeout(config.io_timeout(), writer.write_all(&buf[..n]))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))??;
        remaining -= n as u64;

        if remaining > 0 && cancel.is_cancelled() {
            debug!("Shutting down with {} bytes unsent", remaining);
            break;
        }
    }
    Ok(())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        206 => "Partial Content",
        400 => "Bad Request",
        404 => "Not Found",
        416 => "Range Not Satisfiable",
        501 => "Not Implemented",
        _ => "Internal Server Error",
    }
}

fn http_date(time: std::time::SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

async fn write_headers<W>(
    writer: &mut W,
    status: u16,
    info: &ResourceInfo,
    range: &ByteRange,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!(
        "HTTP/1.1 {status} {}\r\nContent-type: {}\r\nContent-length: {}\r\nAccept-Ranges: bytes\r\n",
        reason(status),
        info.mime,
        range.length()
    );
    if range.partial {
        head.push_str(&format!("Content-Range: {}\r\n", range.content_range()));
    }
    if let Some(mtime) = info.mtime {
        head.push_str(&format!("Last-Modified: {}\r\n", http_date(mtime)));
    }
    if let Some(format) = &info.dlna {
        head.push_str(&format!(
            "transferMode.dlna.org: {}\r\ncontentFeatures.dlna.org: {}\r\n",
            format.transfer_mode(),
            format.content_features()
        ));
    }
    head.push_str("Connection: close\r\n\r\n");
    writer.write_all(head.as_bytes()).await
}

async fn write_status<W>(writer: &mut W, status: u16, extra: &[(&str, String)]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!("HTTP/1.1 {status} {}\r\n", reason(status));
    for (name, value) in extra {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("Content-length: 0\r\nConnection: close\r\n\r\n");
    writer.write_all(head.as_bytes()).await?;
    writer.flush().await
}

async fn write_error<W>(writer: &mut W, err: &Error) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match err {
        Error::InvalidRange { size, .. } => {
            write_status(writer, 416, &[("Content-Range", format!("bytes */{size}"))]).await
        }
        other => write_status(writer, other.http_status(), &[]).await,
    }
}
