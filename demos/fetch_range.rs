//! Fetch a small range of subnets using the library directly
//!
//! Shows how to:
//! - Build a configuration in code instead of from flags
//! - Run both passes with Ctrl+C support
//! - Inspect the run report
//!
//! ```bash
//! cargo run --example fetch_range
//! ```

use netuid_fetch::{CommandSource, Config, fetch_all, wait_for_signal};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("netuid_fetch=info")
        .init();

    let mut config = Config::default();
    config.ids.start = 1;
    config.ids.end = 8;
    config.fetch.concurrency = 2;
    config.fetch.qps = 1.0;
    config.fetch.timeout = Duration::from_secs(30);
    config.output_dir = "demo_netuid_data".into();

    let source = CommandSource::from_config(&config.source);
    let program = source.locate()?;
    println!("Using {}", program.display());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            wait_for_signal().await;
            cancel.cancel();
        }
    });

    let report = fetch_all(config, Arc::new(source), &cancel).await?;

    for pass in &report.passes {
        println!(
            "{} lane: {}/{} succeeded",
            pass.lane, pass.succeeded, pass.attempted
        );
    }
    if !report.is_complete() {
        println!("Likely missing or broken: {:?}", report.unresolved);
    }
    Ok(())
}
