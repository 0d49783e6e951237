use anyhow::Context;
use clap::Parser;
use span_loadgen::otlp::{sample_request, span_count};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Writes a single-span OTLP JSON request, timestamped now, for use with
/// `span_loadgen --input`.
#[derive(Parser, Debug)]
#[command(name = "sample_span")]
#[command(version)]
struct Cli {
    /// Output file
    #[arg(default_value = "valid-sample-span.json")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let request = sample_request();
    let json = serde_json::to_string_pretty(&request).context("failed to serialize sample request")?;

    std::fs::write(&cli.output, json).with_context(|| format!("failed to write {}", cli.output.display()))?;

    info!(path = %cli.output.display(), spans = span_count(&request), "sample span written");
    Ok(())
}
