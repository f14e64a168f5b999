use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use leaselock::stress::run_counter_stress;
use leaselock::{verbosity_filter, Cli, Commands, LockHandle, LockOptions, MemoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_filter(cli.verbosity)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = LockOptions::load(cli.config.as_deref())?;
    info!(?options, "lock options loaded");

    match cli.command {
        Commands::Stress {
            resource,
            workers,
            iterations,
            counter,
            latency_ms,
            json,
        } => {
            let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(latency_ms)));
            let counter = counter.unwrap_or_else(|| std::env::temp_dir().join("leaselock-counter.log"));
            let report =
                run_counter_stress(store, options, &resource, workers, iterations, &counter).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Counter value is {}", report.counter);
                println!("Successful increments: {} {:?}", report.total, report.per_worker);
                println!("Failed acquisitions: {:?}", report.failures);
            }
            if !report.consistent() {
                bail!(
                    "counter error: increased {} times, but counter file holds {}",
                    report.total,
                    report.counter
                );
            }
        }
        Commands::Probe { resource, blocking } => {
            let lock = LockHandle::with_options(resource, Arc::new(MemoryStore::new()), options)?;
            println!("key: {}", lock.key());
            println!("locked before acquire: {}", lock.locked().await);
            let validity = lock.acquire(blocking).await?;
            println!("acquired, validity: {:?}", validity);
            println!("holder: {:?}", lock.holder().await?);
            println!("locked after acquire: {}", lock.locked().await);
            lock.release().await?;
            println!("locked after release: {}", lock.locked().await);
        }
    }
    Ok(())
}
