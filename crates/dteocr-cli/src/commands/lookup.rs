//! Lookup command - query the SII taxpayer registry.

use clap::Args;
use console::style;

use dteocr_core::models::config::DteConfig;
use dteocr_core::registry::Lookup;
use dteocr_core::rut::Rut;

use super::build_registry;

/// Arguments for the lookup command.
#[derive(Args)]
pub struct LookupArgs {
    /// Taxpayer RUT
    rut: String,

    /// Ignore the cached record and query the registry
    #[arg(long)]
    refresh: bool,

    /// Print the record as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: LookupArgs, config: &DteConfig) -> anyhow::Result<()> {
    config.validate()?;

    let rut = Rut::parse(&args.rut)
        .ok_or_else(|| anyhow::anyhow!("Not a RUT: {:?}", args.rut))?;
    if !rut.is_valid() {
        anyhow::bail!("RUT {} fails its check digit", rut);
    }

    let client = build_registry(config).await?;
    let lookup = if args.refresh {
        client.refresh(&rut).await?
    } else {
        client.lookup(&rut).await?
    };

    let (record, source) = match lookup {
        Lookup::Cached(record) => (record, "cache"),
        Lookup::Fetched(record) => (record, "SII"),
        Lookup::NotFound => anyhow::bail!("The SII registry has no data for {}", rut),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("{} {} ({})", style("✓").green(), record.identifier, source);
    println!("  Razón social: {}", record.legal_name);
    let optional = [
        ("Giro", &record.business_activity),
        ("Actividad", &record.economic_activity),
        ("Dirección", &record.address),
        ("Comuna", &record.commune),
        ("Región", &record.region),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            println!("  {}: {}", label, value);
        }
    }
    println!(
        "  Verified:     {}",
        record.last_verified_at.format("%Y-%m-%d %H:%M UTC")
    );

    Ok(())
}
