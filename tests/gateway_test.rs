//! Gateway resolution, caching and ranged reads against a live service.

mod common;

use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use common::{item_url, pattern, TestHarness, TRACK_SIZE};
use mediacat::config::GatewayConfig;
use mediacat::gateway::{BrowseClient, Gateway, LocalBrowseClient, RangeReader};
use mediacat_common::paths::MediaKind;
use mediacat_common::{CatalogEntry, Error, ItemClass, ObjectId, Resource, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Counts every browse call passed through to the wrapped client.
struct CountingClient {
    inner: LocalBrowseClient,
    calls: AtomicUsize,
}

impl CountingClient {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowseClient for CountingClient {
    async fn browse_metadata(&self, id: &ObjectId) -> Result<CatalogEntry> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.browse_metadata(id).await
    }

    async fn browse_children(&self, id: &ObjectId) -> Result<Vec<CatalogEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.browse_children(id).await
    }
}

fn counting_gateway(harness: &TestHarness, capacity: usize) -> (Arc<CountingClient>, Gateway) {
    let client = Arc::new(CountingClient {
        inner: LocalBrowseClient::new(harness.service.directory().clone()),
        calls: AtomicUsize::new(0),
    });
    let config = GatewayConfig {
        cache_capacity: capacity,
        ..GatewayConfig::default()
    };
    let gateway = Gateway::new(&config).with_device("deviceA", client.clone());
    (client, gateway)
}

/// How the scripted server answers one connection.
#[derive(Debug, Clone, Copy)]
enum Reply {
    /// Read the request, then close without answering.
    Hangup,
    /// Read the request and keep the connection open without answering.
    Stall,
    /// 206 from the requested offset.
    Honor,
    /// 206 that always starts at the given offset.
    PartialFrom(u64),
    /// 200 with the whole body.
    Whole,
}

/// Offset of the `Range: bytes=<n>-` header, after consuming the request.
async fn read_range_start(stream: &mut TcpStream) -> u64 {
    let mut reader = BufReader::new(stream);
    let mut offset = 0;
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let header = line.trim_end().to_ascii_lowercase();
        if header.is_empty() {
            break;
        }
        if let Some(value) = header.strip_prefix("range: bytes=") {
            offset = value.trim_end_matches('-').parse().unwrap_or(0);
        }
    }
    offset
}

/// Serve `body` at one URL, answering the n-th connection with `script[n]`.
async fn scripted_server(body: Vec<u8>, script: Vec<Reply>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut stalled = Vec::new();
        for reply in script {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let offset = read_range_start(&mut stream).await;
            let size = body.len() as u64;
            let (head, start) = match reply {
                Reply::Hangup => continue,
                Reply::Stall => {
                    stalled.push(stream);
                    continue;
                }
                Reply::Whole => (
                    format!("HTTP/1.1 200 OK\r\nContent-Length: {size}\r\nConnection: close\r\n\r\n"),
                    0,
                ),
                Reply::Honor | Reply::PartialFrom(_) => {
                    let start = match reply {
                        Reply::PartialFrom(start) => start,
                        _ => offset,
                    };
                    (
                        format!(
                            "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {start}-{}/{size}\r\nConnection: close\r\n\r\n",
                            size - start,
                            size - 1
                        ),
                        start,
                    )
                }
            };
            if stream.write_all(head.as_bytes()).await.is_err()
                || stream.write_all(&body[start as usize..]).await.is_err()
            {
                continue;
            }
            stream.shutdown().await.ok();
        }
        // Stalled connections stay open for the rest of the test.
        std::future::pending::<()>().await;
    });
    format!("http://{addr}/content/scripted")
}

#[tokio::test]
async fn second_resolution_is_served_from_cache() {
    let harness = TestHarness::indexed().await;
    let (client, gateway) = counting_gateway(&harness, 16);

    let first = gateway.resolve("/deviceA/Music/track.mp3").await.unwrap();
    assert!(!first.is_container);
    assert_eq!(first.size, Some(TRACK_SIZE as u64));
    assert_eq!(first.device, "deviceA");
    assert_eq!(first.url.as_deref(), Some(item_url(&harness, "track.mp3").as_str()));
    let calls = client.calls();
    assert!(calls > 0);

    let second = gateway.resolve("/deviceA/Music/track.mp3").await.unwrap();
    assert_eq!(second, first);
    assert_eq!(client.calls(), calls);
}

#[tokio::test]
async fn least_recently_used_path_is_evicted_first() {
    let harness = TestHarness::scanning().await;
    let (client, gateway) = counting_gateway(&harness, 3);

    // Cache: clip, Videos, device root.
    gateway.resolve("/deviceA/Videos/clip.mp4").await.unwrap();
    // Touches the device root; Videos is now the tail and goes.
    gateway.resolve("/deviceA/cover.jpg").await.unwrap();
    assert_eq!(gateway.cache().len(), 3);
    assert!(gateway.cache().get("/deviceA/Videos").is_none());

    // A cached hit costs nothing and moves clip ahead of cover.
    let before = client.calls();
    gateway.resolve("/deviceA/Videos/clip.mp4").await.unwrap();
    assert_eq!(client.calls(), before);

    gateway.resolve("/deviceA/Music").await.unwrap();
    assert!(gateway.cache().get("/deviceA/cover.jpg").is_none());
    assert!(gateway.cache().get("/deviceA/Videos/clip.mp4").is_some());
}

#[tokio::test]
async fn missing_component_is_resolution_failure() {
    let harness = TestHarness::scanning().await;
    let (_client, gateway) = counting_gateway(&harness, 16);

    let err = gateway.resolve("/deviceA/Music/missing.mp3").await.unwrap_err();
    assert!(matches!(err, Error::ResolutionFailure(_)));
    assert!(err.is_not_found());
    assert!(gateway.resolve("/deviceB/Music").await.is_err());
}

#[tokio::test]
async fn readdir_and_getattr() {
    let harness = TestHarness::scanning().await;
    let gateway = harness.service.gateway(&GatewayConfig::default());

    assert_eq!(gateway.readdir("/").await.unwrap(), ["den"]);
    assert_eq!(
        gateway.readdir("/den").await.unwrap(),
        ["Music", "Videos", "cover.jpg"]
    );
    let attr = gateway.getattr("/den/Videos/clip.mp4").await.unwrap();
    assert!(!attr.is_dir);
    assert_eq!(attr.size, 32);
    assert!(gateway.getattr("/den/Videos").await.unwrap().is_dir);
}

#[tokio::test]
async fn handle_reads_whole_file_in_pieces() {
    let harness = TestHarness::indexed().await;
    let gateway = harness.service.gateway(&GatewayConfig::default());

    let handle = gateway.open("/den/Music/track.mp3").await.unwrap();
    let mut body = Vec::new();
    let mut buf = [0u8; 300];
    loop {
        let n = gateway.read(handle, body.len() as u64, &mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    assert_eq!(body, pattern(TRACK_SIZE));
    // Sequential reads share a single ranged stream.
    assert_eq!(gateway.connections(handle).await, Some(1));
    assert!(gateway.release(handle));
}

#[tokio::test]
async fn rewind_reopens_the_stream() {
    let harness = TestHarness::scanning().await;
    let url = item_url(&harness, "track.mp3");
    let expected = pattern(TRACK_SIZE);

    let mut reader = RangeReader::new(reqwest::Client::new(), url, None);
    let mut buf = [0u8; 100];

    assert_eq!(reader.read_at(0, &mut buf).await.unwrap(), 100);
    assert_eq!(&buf[..], &expected[..100]);
    assert_eq!(reader.read_at(100, &mut buf).await.unwrap(), 100);
    assert_eq!(&buf[..], &expected[100..200]);
    assert_eq!(reader.connections(), 1);
    assert_eq!(reader.size(), Some(TRACK_SIZE as u64));

    // Rewind.
    assert_eq!(reader.read_at(0, &mut buf).await.unwrap(), 100);
    assert_eq!(&buf[..], &expected[..100]);
    assert_eq!(reader.connections(), 2);
    assert_eq!(reader.position(), Some(100));

    // Seek forward.
    assert_eq!(reader.read_at(950, &mut buf).await.unwrap(), 50);
    assert_eq!(&buf[..50], &expected[950..]);
    assert_eq!(reader.connections(), 3);

    assert_eq!(reader.read_at(TRACK_SIZE as u64, &mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn read_past_end_with_unknown_size() {
    let harness = TestHarness::scanning().await;
    let url = item_url(&harness, "cover.jpg");

    let mut reader = RangeReader::new(reqwest::Client::new(), url, None);
    let mut buf = [0u8; 8];
    assert_eq!(reader.read_at(16, &mut buf).await.unwrap(), 0);
    assert_eq!(reader.connections(), 1);
}

#[tokio::test]
async fn names_with_edge_whitespace_resolve() {
    for harness in [TestHarness::scanning().await, TestHarness::indexed().await] {
        let body = pattern(48);
        fs::write(harness.media_root().join("Music/ live .mp3"), &body).unwrap();
        harness
            .service
            .rebuild_catalog(&harness.config.catalog)
            .await
            .unwrap();
        let gateway = harness.service.gateway(&GatewayConfig::default());

        let names = gateway.readdir("/den/Music").await.unwrap();
        assert!(names.iter().any(|n| n == " live .mp3"), "{names:?}");

        let entry = gateway.resolve("/den/Music/ live .mp3").await.unwrap();
        assert_eq!(entry.size, Some(48));

        let handle = gateway.open("/den/Music/ live .mp3").await.unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(gateway.read(handle, 0, &mut buf).await.unwrap(), 48);
        assert_eq!(&buf[..48], &body[..]);
    }
}

#[tokio::test]
async fn dropped_connection_is_retried_once() {
    let body = pattern(64);
    let url = scripted_server(body.clone(), vec![Reply::Hangup, Reply::Honor]).await;

    let mut reader = RangeReader::new(reqwest::Client::new(), url, None);
    let mut buf = [0u8; 64];
    assert_eq!(reader.read_at(0, &mut buf).await.unwrap(), 64);
    assert_eq!(&buf[..], &body[..]);
    assert_eq!(reader.connections(), 2);
}

#[tokio::test]
async fn second_drop_surfaces_the_error() {
    let url = scripted_server(pattern(64), vec![Reply::Hangup, Reply::Hangup]).await;

    let mut reader = RangeReader::new(reqwest::Client::new(), url, None);
    let mut buf = [0u8; 16];
    let err = reader.read_at(0, &mut buf).await.unwrap_err();
    assert_matches!(err, Error::Io { .. });
    assert_eq!(reader.connections(), 2);
    assert_eq!(reader.position(), None);
}

#[tokio::test]
async fn resume_at_wrong_offset_is_rejected() {
    let url = scripted_server(
        pattern(64),
        vec![Reply::PartialFrom(0), Reply::PartialFrom(0)],
    )
    .await;

    let mut reader = RangeReader::new(reqwest::Client::new(), url, None);
    let mut buf = [0u8; 16];
    let err = reader.read_at(5, &mut buf).await.unwrap_err();
    assert_matches!(err, Error::Internal(ref msg) if msg.contains("instead of 5"));
    assert_eq!(reader.connections(), 2);
}

#[tokio::test]
async fn ignored_range_is_rejected() {
    let url = scripted_server(pattern(64), vec![Reply::Whole, Reply::Whole]).await;

    let mut reader = RangeReader::new(reqwest::Client::new(), url, None);
    let mut buf = [0u8; 16];
    let err = reader.read_at(5, &mut buf).await.unwrap_err();
    assert_matches!(err, Error::Internal(ref msg) if msg.contains("ignored the range"));
}

#[tokio::test]
async fn silent_server_times_out() {
    let url = scripted_server(pattern(64), vec![Reply::Stall, Reply::Stall]).await;

    let mut reader = RangeReader::new(reqwest::Client::new(), url, None)
        .with_read_timeout(Duration::from_millis(200));
    let mut buf = [0u8; 16];
    let err = tokio::time::timeout(Duration::from_secs(5), reader.read_at(0, &mut buf))
        .await
        .expect("read did not give up")
        .unwrap_err();
    assert_matches!(err, Error::Io { ref source } if source.kind() == io::ErrorKind::TimedOut);
    assert_eq!(reader.connections(), 2);
}

/// Root plus one item whose bytes live at `url`.
struct SingleItemDevice {
    url: String,
}

impl SingleItemDevice {
    fn item(&self) -> CatalogEntry {
        CatalogEntry::item(
            ObjectId::new("0$1"),
            ObjectId::root(),
            "stuck.mp3",
            ItemClass::for_kind(MediaKind::Audio),
            Resource {
                path: None,
                url: Some(self.url.clone()),
                mime: "audio/mpeg".into(),
                size: 64,
                duration: None,
                protocol_info: "http-get:*:audio/mpeg:*".into(),
            },
        )
    }
}

#[async_trait]
impl BrowseClient for SingleItemDevice {
    async fn browse_metadata(&self, id: &ObjectId) -> Result<CatalogEntry> {
        if id.is_root() {
            Ok(CatalogEntry::container(
                ObjectId::root(),
                ObjectId::root_parent(),
                "root",
            ))
        } else {
            Ok(self.item())
        }
    }

    async fn browse_children(&self, _id: &ObjectId) -> Result<Vec<CatalogEntry>> {
        Ok(vec![self.item()])
    }
}

#[tokio::test]
async fn gateway_reads_use_configured_timeout() {
    let url = scripted_server(pattern(64), vec![Reply::Stall, Reply::Stall]).await;
    let config = GatewayConfig {
        read_timeout_ms: 200,
        ..GatewayConfig::default()
    };
    let gateway =
        Gateway::new(&config).with_device("stuck", Arc::new(SingleItemDevice { url }));

    let handle = gateway.open("/stuck/stuck.mp3").await.unwrap();
    let mut buf = [0u8; 16];
    let result = tokio::time::timeout(Duration::from_secs(5), gateway.read(handle, 0, &mut buf))
        .await
        .expect("read did not give up");
    assert!(result.is_err());
}
