//! Parse command - extract invoice fields from OCR text files.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use serde::Serialize;
use tracing::info;

use dteocr_core::invoice::{InvoiceParser, RuleBasedParser};
use dteocr_core::models::invoice::ParsedInvoiceRecord;

/// Arguments for the parse command.
#[derive(Args)]
pub struct ParseArgs {
    /// Text files holding recognized document text
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Report record consistency issues (amounts, issuer checksum)
    #[arg(long)]
    validate: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output, one object per file
    Json,
    /// Plain text summary
    Text,
}

#[derive(Serialize)]
struct ParseOutput<'a> {
    file: String,
    record: &'a ParsedInvoiceRecord,
    warnings: &'a [String],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<String>,
}

pub fn run(args: ParseArgs) -> anyhow::Result<()> {
    let parser = RuleBasedParser::new();

    for path in &args.files {
        if !path.exists() {
            anyhow::bail!("Input file not found: {}", path.display());
        }

        info!("Parsing {}", path.display());
        let text = fs::read_to_string(path)?;
        let result = parser.parse(&text);
        let issues = if args.validate {
            result.record.validate()
        } else {
            Vec::new()
        };

        match args.format {
            OutputFormat::Json => {
                let output = ParseOutput {
                    file: path.display().to_string(),
                    record: &result.record,
                    warnings: &result.warnings,
                    issues,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                println!("{}", style(path.display()).bold());
                print!("{}", format_text(&result.record));
                for warning in &result.warnings {
                    println!("  {} {}", style("!").yellow(), warning);
                }
                for issue in &issues {
                    println!("  {} {}", style("✗").red(), issue);
                }
                println!();
            }
        }
    }

    Ok(())
}

fn format_text(record: &ParsedInvoiceRecord) -> String {
    fn line(label: &str, value: Option<String>) -> String {
        format!("  {:<10} {}\n", label, value.unwrap_or_else(|| "-".to_string()))
    }

    let mut output = String::new();
    output.push_str(&line("Type:", Some(record.document_type.to_string())));
    output.push_str(&line("Folio:", record.document_number.map(|n| n.to_string())));
    output.push_str(&line("Date:", record.issue_date.map(|d| d.to_string())));
    output.push_str(&line("Issuer:", record.issuer_id.map(|r| r.to_string())));
    output.push_str(&line("Recipient:", record.recipient_id.map(|r| r.to_string())));
    output.push_str(&line("Net:", record.net_amount.map(|a| a.to_string())));
    output.push_str(&line("IVA:", record.tax_amount.map(|a| a.to_string())));
    output.push_str(&line("Total:", record.total_amount.map(|a| a.to_string())));
    output
}
