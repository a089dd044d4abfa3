use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod workspace;

use workspace::{Workspace, WorkspacePaths};

#[derive(Parser)]
#[command(name = "geonet")]
#[command(about = "Network topology extraction and resilience analysis", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Analytics config (TOML); missing file means defaults
    #[arg(long, global = true, default_value = "geonet.toml")]
    config: PathBuf,

    /// Repository snapshot read at start and written back after mutating commands
    #[arg(long, global = true, default_value = ".geonet/state.json")]
    state: PathBuf,

    /// Blob store root
    #[arg(long, global = true, default_value = ".geonet/blobs")]
    blobs: PathBuf,

    /// Project that new records belong to
    #[arg(long, global = true, default_value_t = 1)]
    project: u64,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a network from a GeoJSON file of lines and points
    Extract(commands::network::ExtractArgs),

    /// Greatest connected component of a network, optionally without some nodes
    Gcc(commands::network::GccArgs),

    /// Rank network nodes by a centrality measure
    Rank(commands::network::RankArgs),

    /// Convert uploaded files (zip, GeoJSON, GeoTIFF) into a new dataset
    Convert(commands::dataset::ConvertArgs),

    /// List, inspect and run analysis types
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    #[command(subcommand)]
    command: commands::analyze::AnalyzeCommand,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let paths = WorkspacePaths {
        config: cli.config,
        state: cli.state,
        blobs: cli.blobs,
    };
    let workspace = Workspace::open(paths, cli.project).await?;

    let output = match cli.command {
        Commands::Extract(args) => commands::network::extract(&workspace, args).await?,
        Commands::Gcc(args) => commands::network::gcc(&workspace, &args)?,
        Commands::Rank(args) => commands::network::rank(&workspace, &args)?,
        Commands::Convert(args) => commands::dataset::convert(&workspace, args).await?,
        Commands::Analyze(args) => commands::analyze::run(&workspace, args.command).await?,
    };

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{rendered}");
    Ok(())
}
