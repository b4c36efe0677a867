//! Range transfer protocol: the server that streams resource bytes and the
//! request parsing and range arithmetic it is built on.

mod request;
mod resources;
mod server;

pub use request::{effective_range, parse_range_value, read_request, ByteRange, Method, RangeSpec, Request};
pub use resources::{
    FileResources, MemoryResources, MountTable, ResourceHandle, ResourceInfo, ResourceReader,
    VirtualResources,
};
pub use server::TransferServer;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Base URL clients should use to reach a server bound to `addr`.
///
/// An unspecified bind address is published as loopback.
pub fn base_url(addr: SocketAddr) -> String {
    let ip = if addr.ip().is_unspecified() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        addr.ip()
    };
    format!("http://{}", SocketAddr::new(ip, addr.port()))
}
