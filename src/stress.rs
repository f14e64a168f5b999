// Counter stress run
//
// Every worker loops: acquire (blocking), read the counter file, write it back
// incremented, release. If the lock ever admits two workers at once an
// increment is lost and the final counter falls short of the success count.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::lock::LockHandle;
use crate::options::LockOptions;
use crate::store::StoreAdapter;

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub workers: usize,
    pub iterations: usize,
    /// Successful critical sections per worker
    pub per_worker: Vec<usize>,
    /// Acquire failures (timeouts, expired validity) per worker
    pub failures: Vec<usize>,
    pub total: usize,
    pub counter: u64,
}

impl StressReport {
    pub fn consistent(&self) -> bool {
        self.total as u64 == self.counter
    }
}

pub async fn run_counter_stress(
    store: Arc<dyn StoreAdapter>,
    options: LockOptions,
    resource: &str,
    workers: usize,
    iterations: usize,
    counter: &Path,
) -> Result<StressReport> {
    fs::write(counter, b"0")
        .await
        .with_context(|| format!("resetting counter {}", counter.display()))?;

    let mut tasks = Vec::with_capacity(workers);
    for worker in 0..workers {
        let lock = LockHandle::with_options(
            resource,
            store.clone(),
            options.clone().with_owner(format!("worker-{worker}")),
        )?;
        tasks.push(tokio::spawn(run_worker(lock, iterations, counter.to_path_buf())));
    }

    let mut per_worker = Vec::with_capacity(workers);
    let mut failures = Vec::with_capacity(workers);
    for joined in join_all(tasks).await {
        let (done, failed) = joined.map_err(|err| anyhow!("worker panicked: {err}"))??;
        per_worker.push(done);
        failures.push(failed);
    }

    let total = per_worker.iter().sum();
    let report = StressReport {
        workers,
        iterations,
        per_worker,
        failures,
        total,
        counter: read_counter(counter).await?,
    };
    info!(total = report.total, counter = report.counter, "stress run finished");
    Ok(report)
}

async fn run_worker(lock: LockHandle, iterations: usize, counter: PathBuf) -> Result<(usize, usize)> {
    let mut done = 0;
    let mut failed = 0;
    for _ in 0..iterations {
        if let Err(err) = lock.acquire(true).await {
            if err.is_transport() {
                return Err(err.into());
            }
            warn!(owner = lock.owner(), error = %err, "acquire failed");
            failed += 1;
            continue;
        }
        let value = read_counter(&counter).await?;
        fs::write(&counter, (value + 1).to_string()).await?;
        done += 1;
        lock.release().await?;
    }
    debug!(owner = lock.owner(), done, failed, "worker finished");
    Ok((done, failed))
}

async fn read_counter(path: &Path) -> Result<u64> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading counter {}", path.display()))?;
    raw.trim()
        .parse()
        .with_context(|| format!("counter {} holds {:?}", path.display(), raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_small_run_is_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("counter.log");
        let options = LockOptions::default()
            .with_namespace("stress")
            .with_retry_interval(Duration::from_millis(1));

        let report = run_counter_stress(
            Arc::new(MemoryStore::new()),
            options,
            "counter",
            3,
            10,
            &counter,
        )
        .await
        .unwrap();

        assert!(report.consistent(), "{report:?}");
        assert_eq!(report.total, 30);
        assert_eq!(report.per_worker, vec![10, 10, 10]);
        assert_eq!(report.failures, vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn test_store_outage_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("counter.log");
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);

        let result =
            run_counter_stress(store, LockOptions::default(), "counter", 2, 5, &counter).await;
        assert!(result.is_err());
    }
}
