//! Command-line entry point for netuid-fetch

use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use netuid_fetch::cli::Cli;
use netuid_fetch::output::write_json;
use netuid_fetch::{CommandSource, Error, Result, RunReport, fetch_all, wait_for_signal};

/// Initialize tracing; `LOG_FORMAT=json` switches to one JSON object per line
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netuid_fetch=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let code = match run(&cli).await {
        Ok(_) => 0,
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: &Cli) -> Result<RunReport> {
    let config = cli.load_config()?;
    config.validate()?;

    let source = CommandSource::from_config(&config.source);
    // Fail before discovery or any worker starts
    let path = source.locate().map_err(|_| Error::ToolMissing {
        program: source.program().to_string(),
    })?;
    tracing::debug!(program = %path.display(), "Located external tool");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            wait_for_signal().await;
            tracing::warn!("Interrupt received, abandoning in-flight calls");
            cancel.cancel();
        }
    });

    let report = fetch_all(config, Arc::new(source), &cancel).await?;

    if let Some(path) = &cli.report {
        write_json(path, &report).await?;
        tracing::info!(path = %path.display(), "Wrote run report");
    }
    Ok(report)
}
