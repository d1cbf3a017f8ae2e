//! CLI application for Chilean tax document OCR processing.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{config, lookup, parse, run, rut};

/// Chilean DTE OCR - Extract structured data from Chilean tax documents
#[derive(Parser)]
#[command(name = "dteocr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (overrides the configured log level)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and format RUTs
    Rut(rut::RutArgs),

    /// Extract invoice fields from text files
    Parse(parse::ParseArgs),

    /// Look up a taxpayer in the SII registry
    Lookup(lookup::LookupArgs),

    /// Process pending documents
    Run(run::RunArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let allow_missing = matches!(cli.command, Commands::Config(_));
    let settings = commands::load_config(cli.config.as_deref(), allow_missing)?;

    // Set up logging: -v wins over the configured level
    let filter = match cli.verbose {
        0 => EnvFilter::try_new(&settings.logging.level).unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Execute command
    match cli.command {
        Commands::Rut(args) => rut::run(args),
        Commands::Parse(args) => parse::run(args),
        Commands::Lookup(args) => lookup::run(args, &settings).await,
        Commands::Run(args) => run::run(args, &settings).await,
        Commands::Config(args) => config::run(args, cli.config.as_deref(), &settings),
    }
}
