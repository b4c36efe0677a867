mod cli;

use mediacat::{
    browse::ContentDirectory,
    catalog::{build_catalog, IndexedCatalog},
    config::{self, Config},
    service::MediaService,
    transfer::base_url,
};
use mediacat_common::{BrowseWindow, ObjectId};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use tokio_util::sync::CancellationToken;

async fn start_server(config: Config) -> Result<()> {
    tracing::info!("Starting mediacat");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let catalog = tokio::task::spawn_blocking({
        let catalog_config = config.catalog.clone();
        move || build_catalog(&catalog_config)
    })
    .await??;

    let cancel = CancellationToken::new();
    let service = MediaService::start(&config, catalog, cancel.clone()).await?;
    serve_until_shutdown(&service, &config, cancel).await?;

    tracing::info!("Shutting down...");
    service.wait().await;
    Ok(())
}

/// Wait for shutdown. On unix, SIGHUP rebuilds the catalog in place.
#[cfg_attr(not(unix), allow(unused_variables))]
async fn serve_until_shutdown(
    service: &MediaService,
    config: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    let shutdown = shutdown_signal(cancel);
    tokio::pin!(shutdown);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup =
            signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        loop {
            tokio::select! {
                _ = &mut shutdown => return Ok(()),
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    tracing::info!("SIGHUP received, rebuilding catalog");
                    if let Err(e) = service.rebuild_catalog(&config.catalog).await {
                        tracing::warn!("Catalog rebuild failed: {e:#}");
                    }
                }
            }
        }
    }

    shutdown.await;
    Ok(())
}

/// Resolves on Ctrl+C, SIGTERM, or when `cancel` fires, and cancels it.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
    cancel.cancel();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediacat=trace,mediacat_db=debug,mediacat_common=debug".to_string()
        } else {
            "mediacat=debug,mediacat_db=info,mediacat_common=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config::validate_config(&config)?;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(config))
        }
        Commands::Index { reset } => index(cli.config.as_deref(), reset),
        Commands::Browse {
            id,
            children,
            start,
            count,
        } => browse(cli.config.as_deref(), &id, children, BrowseWindow::new(start, count)),
        Commands::Search {
            criteria,
            start,
            count,
        } => search(cli.config.as_deref(), &criteria, BrowseWindow::new(start, count)),
        Commands::Ls { path } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(gateway_ls(cli.config.as_deref(), &path))
        }
        Commands::Cat { path } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(gateway_cat(cli.config.as_deref(), &path))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediacat {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn index(config_path: Option<&Path>, reset: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let root = config
        .catalog
        .root
        .as_deref()
        .context("Indexing requires catalog.root")?;

    let db_path = config.catalog.db_path.to_string_lossy();
    let catalog = IndexedCatalog::open(&db_path, config.catalog.busy_timeout())
        .with_context(|| format!("Failed to open index {db_path}"))?;

    if !reset && !catalog.is_empty()? {
        println!("Index {} is already populated; use --reset to rebuild", db_path);
        return Ok(());
    }

    let stats = catalog.import(root)?;
    println!("Indexed {:?} into {}", root, db_path);
    println!("  Containers: {}", stats.containers);
    println!("  Items: {}", stats.items);
    println!("  Skipped: {}", stats.skipped);
    Ok(())
}

/// Browse engine over the configured catalog, publishing resources under
/// the configured server address.
fn local_directory(config_path: Option<&Path>) -> Result<ContentDirectory> {
    let config = config::load_config_or_default(config_path)?;
    let catalog = build_catalog(&config.catalog)?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    Ok(ContentDirectory::new(
        catalog,
        config.catalog.non_container_browse,
        base_url(addr),
    ))
}

fn browse(config_path: Option<&Path>, id: &str, children: bool, window: BrowseWindow) -> Result<()> {
    let directory = local_directory(config_path)?;
    let id = ObjectId::new(id);
    let resp = if children {
        directory.browse_children(&id, window)?
    } else {
        directory.browse_metadata(&id)?
    };
    println!("{}", resp.result);
    eprintln!(
        "Returned {} of {} (update id {})",
        resp.number_returned, resp.total_matches, resp.update_id
    );
    Ok(())
}

fn search(config_path: Option<&Path>, criteria: &str, window: BrowseWindow) -> Result<()> {
    let directory = local_directory(config_path)?;
    let resp = directory.search(&ObjectId::root(), criteria, window)?;
    println!("{}", resp.result);
    eprintln!(
        "Returned {} of {} (update id {})",
        resp.number_returned, resp.total_matches, resp.update_id
    );
    Ok(())
}

/// Serve the configured catalog on a loopback port for the gateway commands.
async fn loopback_service(config_path: Option<&Path>) -> Result<(Config, MediaService)> {
    let mut config = config::load_config_or_default(config_path)?;
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;

    let catalog = tokio::task::spawn_blocking({
        let catalog_config = config.catalog.clone();
        move || build_catalog(&catalog_config)
    })
    .await??;
    let service = MediaService::start(&config, catalog, CancellationToken::new()).await?;
    Ok((config, service))
}

async fn gateway_ls(config_path: Option<&Path>, path: &str) -> Result<()> {
    let (config, service) = loopback_service(config_path).await?;
    let gateway = service.gateway(&config.gateway);

    let attr = gateway.getattr(path).await?;
    if attr.is_dir {
        for name in gateway.readdir(path).await? {
            println!("{name}");
        }
    } else {
        println!("{}\t{}", attr.size, path);
    }

    service.shutdown().await;
    Ok(())
}

async fn gateway_cat(config_path: Option<&Path>, path: &str) -> Result<()> {
    let (config, service) = loopback_service(config_path).await?;
    let gateway = service.gateway(&config.gateway);

    let handle = gateway.open(path).await?;
    let mut buf = vec![0u8; config.transfer.chunk_size.max(1)];
    let mut offset = 0u64;
    let mut stdout = std::io::stdout().lock();
    loop {
        let n = gateway.read(handle, offset, &mut buf).await?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n])?;
        offset += n as u64;
    }
    stdout.flush()?;
    gateway.release(handle);
    tracing::debug!("Copied {} bytes from {}", offset, path);

    service.shutdown().await;
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Device name: {}", config.server.friendly_name);
            println!("  Backend: {:?}", config.catalog.backend);
            if let Some(root) = &config.catalog.root {
                println!("  Root: {}", root.display());
            }
            println!("  Index: {}", config.catalog.db_path.display());
            println!("  Gateway cache: {} paths", config.gateway.cache_capacity);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
