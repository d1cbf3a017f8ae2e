//! Config command - inspect and create the JSON configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;

use dteocr_core::models::config::DteConfig;

use super::default_config_path;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration (file plus environment) as JSON
    Show,

    /// Write a configuration file with the default settings
    Init(InitArgs),
}

#[derive(Args)]
struct InitArgs {
    /// Where to write the file (defaults to --config or the user config dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Replace an existing file
    #[arg(long)]
    force: bool,
}

pub fn run(args: ConfigArgs, config_path: Option<&Path>, effective: &DteConfig) -> anyhow::Result<()> {
    let config_path = config_path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    match args.command {
        ConfigCommand::Show => show(&config_path, effective),
        ConfigCommand::Init(init) => write_defaults(init.output.unwrap_or(config_path), init.force),
    }
}

/// Source file and problems go to stderr, keeping stdout valid JSON.
fn show(config_path: &Path, effective: &DteConfig) -> anyhow::Result<()> {
    let source = if config_path.exists() {
        style("loaded").green()
    } else {
        style("missing, using defaults").yellow()
    };
    eprintln!("{} {} ({})", style("ℹ").blue(), config_path.display(), source);

    println!("{}", serde_json::to_string_pretty(effective)?);

    if let Err(e) = effective.validate() {
        eprintln!("{} {}", style("!").yellow(), e);
    }
    Ok(())
}

fn write_defaults(path: PathBuf, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (pass --force to replace it)", path.display());
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    // Environment overrides are not persisted.
    DteConfig::default().save(&path)?;
    println!("{} Wrote default settings to {}", style("✓").green(), path.display());
    Ok(())
}
