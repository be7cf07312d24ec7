mod catalog;
mod cli;
mod config;
mod health;
mod orchestrator;
mod parser;
mod providers;
mod reconcile;
mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cli::{health::health_cmd, list::list_cmd, search::search_cmd, sync::sync_cmd,
    watch::watch_cmd, ColorMode};

#[derive(
    Parser, Default, Clone, Copy, ValueEnum, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum RequestedColorMode {
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Parser)]
#[command(name = "modelwatch")]
#[command(
    about = "Aggregate AI model availability across heterogeneous providers",
    version = "0.0.1"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Use the specified config file instead of the default search path
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = RequestedColorMode::default())]
    color: RequestedColorMode,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch provider listings and reconcile the catalog
    Sync(SyncArgs),
    /// List cataloged models or configured providers
    List(ListArgs),
    /// Probe provider health and print a summary
    Health(HealthArgs),
    /// Search the cataloged models
    Search(SearchArgs),
    /// Run the scheduled jobs until interrupted
    Watch,
}

#[derive(Parser, Default)]
pub(crate) struct SyncArgs {
    /// Restrict the pass to one provider
    #[arg(short, long)]
    provider: Option<String>,
    /// Skip providers whose snapshot records are still fresh
    #[arg(long)]
    incremental: bool,
    /// Never retire stale records, only age them
    #[arg(long)]
    keep_stale: bool,
}

/// Possible listings
#[derive(Subcommand)]
pub(crate) enum ListObject {
    /// Cataloged models
    Models(ListModelArgs),
    /// Configured providers
    Providers,
}

/// Output formats
#[derive(
    Parser, ValueEnum, Default, Clone, Copy, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ListingFormat {
    /// Format the output as a table
    #[default]
    Table,
    /// Format the output as JSON
    Json,
    /// Format the output as a table without a header
    HeaderlessTable,
}

#[derive(Parser)]
pub(crate) struct ListArgs {
    /// Output the listing with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
    /// List the specified object
    #[command(subcommand)]
    object: ListObject,
}

#[derive(Parser, Default)]
pub(crate) struct ListModelArgs {
    /// Limit listing to the specified provider
    #[arg(short, long)]
    provider: Option<String>,
    /// Limit listing to free-tier models
    #[arg(long)]
    free: bool,
}

#[derive(Parser, Default)]
pub(crate) struct HealthArgs {
    /// Run diagnostic checks alongside the probe
    #[arg(short, long)]
    detailed: bool,
}

#[derive(
    Parser, ValueEnum, Default, Clone, Copy, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum SortField {
    #[default]
    Downloads,
    Likes,
    Id,
}

#[derive(Parser, Default)]
pub(crate) struct SearchArgs {
    /// Substring to match against model ids
    query: Option<String>,
    /// Limit matches to one capability tag (e.g. embeddings)
    #[arg(short, long)]
    capability: Option<String>,
    /// Limit matches to one provider
    #[arg(short, long)]
    provider: Option<String>,
    /// Limit matches to free-tier models
    #[arg(long)]
    free: bool,
    /// Maximum number of results
    #[arg(short, long, default_value_t = 50)]
    limit: usize,
    /// Minimum download count
    #[arg(long, default_value_t = 0)]
    min_downloads: u64,
    /// Only popular models (10k+ downloads)
    #[arg(long)]
    popular: bool,
    /// Sort results by the specified field
    #[arg(short, long, default_value_t = SortField::default())]
    sort: SortField,
    /// Sort ascending instead of descending
    #[arg(long)]
    asc: bool,
    /// Export the results to a CSV file instead of printing them
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Output the results with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let color = ColorMode::resolve_auto(cli.color);
    utils::errors::configure_color(color);

    let config = config::read_config(cli.config.clone());

    match &cli.command {
        Commands::Sync(args) => sync_cmd(&config, args).await,
        Commands::List(args) => list_cmd(&config, args),
        Commands::Health(args) => health_cmd(&config, color, args).await,
        Commands::Search(args) => search_cmd(&config, args),
        Commands::Watch => watch_cmd(&config).await,
    }
}
