use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediacat")]
#[command(author, version, about = "Media catalog server with range transfers")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the configured catalog until interrupted
    Start {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Populate the indexed store from the catalog root
    Index {
        /// Drop the existing index first
        #[arg(long)]
        reset: bool,
    },

    /// Print the result document for one entry or its children
    Browse {
        /// Entry id ("0" is the root)
        #[arg(default_value = "0")]
        id: String,

        /// List direct children instead of the entry itself
        #[arg(long)]
        children: bool,

        /// First result to return
        #[arg(long, default_value = "0")]
        start: u32,

        /// Maximum results (0 = all)
        #[arg(long, default_value = "0")]
        count: u32,
    },

    /// Search below the root by class criteria
    Search {
        /// Criteria, e.g. 'upnp:class derivedfrom "object.item.audioItem"'
        criteria: String,

        /// First result to return
        #[arg(long, default_value = "0")]
        start: u32,

        /// Maximum results (0 = all)
        #[arg(long, default_value = "0")]
        count: u32,
    },

    /// List a gateway path (/<device>/...)
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Copy a file from a gateway path to stdout
    Cat { path: String },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
