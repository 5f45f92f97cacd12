//! Command-line interface.
//!
//! ```bash
//! # Discover the variants of a subject (probes the asset host once, then cached)
//! dexsprite discover 25
//! dexsprite discover 1.2 --json
//!
//! # Cheap look at the first couple of variants, never cached
//! dexsprite discover 25 --preview
//!
//! # Queue several subjects for background discovery and image warming
//! dexsprite --effective-type 3g prefetch 1 4 7 25
//!
//! # Route a request through the interception proxy
//! dexsprite fetch https://cdn.example/sprites/25a.png
//!
//! # Drop variant lists past their TTL
//! dexsprite cache prune
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Sprite artwork variant discovery, caching and prefetching.
#[derive(Debug, Parser)]
#[command(name = "dexsprite")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Config file (.toml, .yaml or .json)
    #[arg(short, long, global = true, env = "DEXSPRITE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub network: NetworkArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the connection quality the prefetch queue paces itself by.
#[derive(Debug, Clone, Default, Args)]
pub struct NetworkArgs {
    /// Pretend the connection is this quality (slow-2g, 2g, 3g, 4g)
    #[arg(long, global = true, value_name = "TYPE")]
    pub effective_type: Option<String>,

    /// Pretend the user asked to save data; background prefetching halts
    #[arg(long, global = true)]
    pub save_data: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Discover the variants of a subject
    Discover(DiscoverArgs),
    /// Queue subjects for background discovery and image warming
    Prefetch(PrefetchArgs),
    /// Handle a client message, e.g. a PREFETCH_SPRITE_VARIANTS payload
    Warm(WarmArgs),
    /// Send one request through the interception proxy
    Fetch(FetchArgs),
    /// Manage preferred variants
    #[command(subcommand)]
    Preferred(PreferredCommand),
    /// Manage the caches
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Print the filename suffix for a variant index
    Suffix {
        index: usize,
    },
    /// Print the variant index for a filename suffix
    Index {
        suffix: String,
    },
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Subject id: a single id (`25`) or a fusion pair (`1.2`)
    #[arg(value_name = "ID")]
    pub id: String,

    /// Stop after this many variants
    #[arg(short, long, value_name = "N")]
    pub depth: Option<usize>,

    /// Only look at the first few variants and don't cache the result
    #[arg(long)]
    pub preview: bool,

    /// Print the API response body instead of one suffix per line
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct PrefetchArgs {
    #[arg(value_name = "ID", required = true)]
    pub ids: Vec<String>,

    /// Only discover, don't download images
    #[arg(long)]
    pub no_warm: bool,
}

#[derive(Debug, Args)]
pub struct WarmArgs {
    /// Message JSON; read from stdin if omitted
    #[arg(value_name = "JSON")]
    pub message: Option<String>,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    #[arg(value_name = "URL")]
    pub url: String,

    /// Mark the request as a page navigation
    #[arg(long)]
    pub navigate: bool,

    /// Write the response body to stdout
    #[arg(long)]
    pub body: bool,
}

#[derive(Debug, Subcommand)]
pub enum PreferredCommand {
    /// Show the preferred variant for a subject
    Get { id: String },
    /// Set the preferred variant for a subject
    Set { id: String, suffix: String },
    /// Forget the preferred variant for a subject
    Clear {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,
        /// Forget every preferred variant
        #[arg(long)]
        all: bool,
    },
    /// List every preferred variant
    List,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Drop every discovered variant list (preferences are kept)
    Clear {
        /// Also delete cached images and pages
        #[arg(long)]
        resources: bool,
    },
    /// Drop discovered variant lists older than the configured TTL
    Prune,
    /// Show cache sizes
    Stats,
}
