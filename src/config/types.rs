use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Device name announced to clients and used as the first gateway path
    /// component.
    #[serde(default = "default_friendly_name")]
    pub friendly_name: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    49152
}
fn default_friendly_name() -> String {
    "mediacat".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            friendly_name: default_friendly_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Walk the media directory directly.
    #[default]
    Scanning,
    /// Serve from the SQLite index.
    Indexed,
}

/// What a children browse on an item returns.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NonContainerBrowse {
    /// Fail with "no such container".
    #[default]
    Error,
    /// Succeed with an empty window.
    Empty,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Media directory the catalog is built from.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Scanning backend: keep a resident tree built at startup instead of
    /// re-walking on every call.
    #[serde(default = "default_recursive")]
    pub recursive: bool,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Rebuild the index from `root` on every start.
    #[serde(default)]
    pub reset: bool,

    /// How long a storage call waits on a locked database (milliseconds).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default)]
    pub non_container_browse: NonContainerBrowse,
}

fn default_recursive() -> bool {
    true
}
fn default_db_path() -> PathBuf {
    PathBuf::from("mediacat.db")
}
fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            root: None,
            recursive: default_recursive(),
            db_path: default_db_path(),
            reset: false,
            busy_timeout_ms: default_busy_timeout_ms(),
            non_container_browse: NonContainerBrowse::default(),
        }
    }
}

impl CatalogConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    /// Time allowed for reading the request line and headers (milliseconds).
    #[serde(default = "default_header_timeout_ms")]
    pub header_timeout_ms: u64,

    /// Bound on each body write (milliseconds).
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Bytes per body write; shutdown is checked between chunks.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
}

fn default_header_timeout_ms() -> u64 {
    5000
}
fn default_io_timeout_ms() -> u64 {
    30_000
}
fn default_chunk_size() -> usize {
    64 * 1024
}
fn default_max_header_bytes() -> usize {
    8192
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            header_timeout_ms: default_header_timeout_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            chunk_size: default_chunk_size(),
            max_header_bytes: default_max_header_bytes(),
        }
    }
}

impl TransferConfig {
    pub fn header_timeout(&self) -> Duration {
        Duration::from_millis(self.header_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Resolved paths kept in the lookup cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Bound on opening a connection to the transfer server (milliseconds).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Bound on waiting for response headers or the next body chunk
    /// (milliseconds).
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_cache_capacity() -> usize {
    256
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_read_timeout_ms() -> u64 {
    30_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl GatewayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
