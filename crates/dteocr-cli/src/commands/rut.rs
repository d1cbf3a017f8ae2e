//! Rut command - validate and format taxpayer identifiers.

use clap::Args;
use console::style;

use dteocr_core::rut::{check_digit, Rut};

/// Arguments for the rut command.
#[derive(Args)]
pub struct RutArgs {
    /// RUTs in any common notation (12.345.678-5, 12345678-5, 123456785)
    #[arg(required = true)]
    ruts: Vec<String>,
}

pub fn run(args: RutArgs) -> anyhow::Result<()> {
    let mut rejected = 0;

    for input in &args.ruts {
        match Rut::parse(input) {
            Some(rut) if rut.is_valid() => {
                println!("{} {}", style("✓").green(), rut);
            }
            Some(rut) => {
                rejected += 1;
                println!(
                    "{} {} (check digit should be {})",
                    style("✗").red(),
                    rut,
                    check_digit(rut.body())
                );
            }
            None => {
                rejected += 1;
                println!("{} {:?} is not a RUT", style("✗").red(), input);
            }
        }
    }

    if rejected > 0 {
        anyhow::bail!("{} of {} RUTs are invalid", rejected, args.ruts.len());
    }

    Ok(())
}
