//! Wiring for a running media server: catalog, browse engine, generated
//! documents and the transfer server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use quick_xml::escape::escape;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::browse::ContentDirectory;
use crate::catalog::{build_catalog, Catalog};
use crate::config::{CatalogConfig, Config, GatewayConfig};
use crate::didl::CONTENT_PREFIX;
use crate::gateway::{Gateway, LocalBrowseClient};
use crate::transfer::{base_url, FileResources, MemoryResources, MountTable, TransferServer};

/// Path the device description is published under.
pub const DESCRIPTION_PATH: &str = "/description.xml";

/// A transfer server answering for one catalog.
pub struct MediaService {
    friendly_name: String,
    directory: Arc<ContentDirectory>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl MediaService {
    /// Bind to `config.server` and start serving `catalog`.
    ///
    /// The server stops when `cancel` fires or [`Self::shutdown`] is called.
    pub async fn start(
        config: &Config,
        catalog: Arc<dyn Catalog>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid server address {}:{}",
                    config.server.host, config.server.port
                )
            })?;

        let server = TransferServer::bind(addr, config.transfer.clone(), cancel.clone())
            .await
            .with_context(|| format!("Failed to bind to {addr}"))?;
        let local_addr = server.local_addr()?;

        let directory = Arc::new(ContentDirectory::new(
            catalog,
            config.catalog.non_container_browse,
            base_url(local_addr),
        ));
        let documents = Arc::new(MemoryResources::new());
        documents.insert(
            DESCRIPTION_PATH,
            "text/xml; charset=\"utf-8\"",
            description_document(&config.server.friendly_name),
        );

        let mounts = MountTable::new()
            .mount(CONTENT_PREFIX, Arc::new(FileResources::new(directory.clone())))
            .mount("/", documents);
        let handle = tokio::spawn(server.run(Arc::new(mounts)));

        tracing::info!(
            "Serving the {} catalog as '{}' at {}",
            directory.catalog().backend_name(),
            config.server.friendly_name,
            directory.base_url()
        );

        Ok(Self {
            friendly_name: config.server.friendly_name.clone(),
            directory,
            local_addr,
            cancel,
            handle,
        })
    }

    pub fn directory(&self) -> &Arc<ContentDirectory> {
        &self.directory
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn base_url(&self) -> &str {
        self.directory.base_url()
    }

    /// Rebuild the catalog from `config` and swap it in.
    ///
    /// The indexed backend always re-imports its root. Returns the new
    /// system update id.
    pub async fn rebuild_catalog(&self, config: &CatalogConfig) -> anyhow::Result<u32> {
        let mut config = config.clone();
        config.reset = true;
        let catalog = tokio::task::spawn_blocking(move || build_catalog(&config))
            .await
            .context("Catalog rebuild task failed")??;

        let update_id = self.directory.replace_catalog(catalog);
        tracing::info!("Catalog rebuilt, system update id {}", update_id);
        Ok(update_id)
    }

    /// A gateway that sees this service as the device named by
    /// `server.friendly_name`.
    pub fn gateway(&self, config: &GatewayConfig) -> Gateway {
        Gateway::new(config).with_device(
            self.friendly_name.clone(),
            Arc::new(LocalBrowseClient::new(self.directory.clone())),
        )
    }

    /// Wait until the server stops on its own (cancellation from outside).
    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!("Transfer server task failed: {e}");
        }
    }

    /// Stop accepting, let open transfers finish their current chunk, and
    /// wait for the server to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.wait().await;
    }
}

/// Device description served from memory.
pub fn description_document(friendly_name: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<root xmlns="urn:schemas-upnp-org:device-1-0">"#,
            "<specVersion><major>1</major><minor>0</minor></specVersion>",
            "<device>",
            "<deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>",
            "<friendlyName>{}</friendlyName>",
            "<manufacturer>mediacat</manufacturer>",
            "<modelName>mediacat</modelName>",
            "<modelNumber>{}</modelNumber>",
            "<serviceList><service>",
            "<serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>",
            "<serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>",
            "</service></serviceList>",
            "</device></root>"
        ),
        escape(friendly_name),
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_escapes_name() {
        let doc = description_document("Tom & Jerry's");
        assert!(doc.contains("<friendlyName>Tom &amp; Jerry&apos;s</friendlyName>"));
        assert!(doc.contains("ContentDirectory:1"));
    }
}
