// Lease lock handle
//
// A handle is configuration only. Whether the lock is held is a fact about the
// store and is always read from it; nothing is cached between calls, so one
// handle can be reused for any number of acquire/release cycles. Each acquire
// keeps its retry state on its own stack frame.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{LockError, Result};
use crate::options::LockOptions;
use crate::store::{lock_key, CreateOutcome, DeleteOutcome, StoreAdapter};
use crate::validity::{self, Validity, ValidityCheck};

/// Outcome of a single conditional create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Held,
    Contended,
}

#[derive(Debug, Clone)]
pub struct LockHandle {
    resource: String,
    key: String,
    options: LockOptions,
    store: Arc<dyn StoreAdapter>,
}

impl LockHandle {
    /// Handle for `resource` with default options
    pub fn new(resource: impl Into<String>, store: Arc<dyn StoreAdapter>) -> Result<Self> {
        Self::with_options(resource, store, LockOptions::default())
    }

    pub fn with_options(
        resource: impl Into<String>,
        store: Arc<dyn StoreAdapter>,
        options: LockOptions,
    ) -> Result<Self> {
        let resource = resource.into();
        if resource.is_empty() {
            return Err(LockError::InvalidOptions(
                "resource name must not be empty".into(),
            ));
        }
        options.validate()?;
        Ok(Self {
            key: lock_key(&options.namespace, &resource),
            resource,
            options,
            store,
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Store key guarded by this handle
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    pub fn owner(&self) -> &str {
        &self.options.owner
    }

    async fn acquire_once(&self) -> Result<Attempt> {
        let outcome = self
            .store
            .create_if_absent(&self.key, &self.options.owner, self.options.lease.ttl())
            .await
            .map_err(|err| {
                warn!(key = %self.key, error = %err, "store fault while acquiring lock");
                LockError::from(err)
            })?;
        Ok(match outcome {
            CreateOutcome::Created => Attempt::Held,
            CreateOutcome::AlreadyExists => Attempt::Contended,
        })
    }

    /// Acquire the lock.
    ///
    /// Non-blocking mode makes exactly one attempt and reports
    /// [`LockError::Contention`] if the key is taken. Blocking mode retries
    /// every `retry_interval` until `acquire_timeout` is spent, then reports
    /// [`LockError::Timeout`]; a zero timeout degrades to a single attempt.
    /// Store faults end the call immediately with [`LockError::Transport`].
    ///
    /// On success returns how long the caller may rely on holding the lock.
    /// If acquisition consumed the whole lease the key is still written but
    /// [`LockError::ExpiredValidity`] is returned.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn acquire(&self, blocking: bool) -> Result<Validity> {
        self.acquire_inner(blocking, None).await
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`LockError::Cancelled`] as soon as `cancel` fires.
    #[instrument(skip(self, cancel), fields(key = %self.key))]
    pub async fn acquire_with_cancel(
        &self,
        blocking: bool,
        cancel: &CancellationToken,
    ) -> Result<Validity> {
        self.acquire_inner(blocking, Some(cancel)).await
    }

    async fn acquire_inner(
        &self,
        blocking: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<Validity> {
        let start = Instant::now();

        if !blocking || self.options.acquire_timeout.is_zero() {
            self.check_cancelled(cancel)?;
            if self.acquire_once().await? == Attempt::Contended {
                debug!("lock held elsewhere");
                return Err(LockError::Contention {
                    key: self.key.clone(),
                });
            }
            return self.validity_since(start);
        }

        // a budget too large to represent never runs out
        let deadline = start.checked_add(self.options.acquire_timeout);
        let mut attempts: u32 = 0;
        loop {
            self.check_cancelled(cancel)?;
            attempts += 1;
            if self.acquire_once().await? == Attempt::Held {
                break;
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                warn!(
                    attempts,
                    timeout = ?self.options.acquire_timeout,
                    "gave up acquiring lock"
                );
                return Err(LockError::Timeout {
                    key: self.key.clone(),
                    timeout: self.options.acquire_timeout,
                });
            }

            // never sleep past the deadline
            let pause = match deadline {
                Some(deadline) => self.options.retry_interval.min(deadline - now),
                None => self.options.retry_interval,
            };
            debug!(attempts, ?pause, "lock contended, retrying");
            self.pause(pause, cancel).await?;
        }

        self.validity_since(start)
    }

    fn check_cancelled(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        match cancel {
            Some(token) if token.is_cancelled() => Err(LockError::Cancelled {
                key: self.key.clone(),
            }),
            _ => Ok(()),
        }
    }

    async fn pause(&self, pause: Duration, cancel: Option<&CancellationToken>) -> Result<()> {
        if pause.is_zero() {
            tokio::task::yield_now().await;
            return Ok(());
        }
        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(LockError::Cancelled {
                        key: self.key.clone(),
                    }),
                    _ = sleep(pause) => Ok(()),
                }
            }
            None => {
                sleep(pause).await;
                Ok(())
            }
        }
    }

    fn validity_since(&self, start: Instant) -> Result<Validity> {
        match validity::compute(self.options.lease, start.elapsed(), self.options.drift_factor) {
            ValidityCheck::Valid(validity) => {
                info!(?validity, "lock acquired");
                Ok(validity)
            }
            ValidityCheck::Expired { elapsed, drift } => {
                warn!(?elapsed, ?drift, "lock acquired with no validity left");
                Err(LockError::ExpiredValidity {
                    key: self.key.clone(),
                    elapsed,
                    drift,
                })
            }
        }
    }

    /// Whether the key currently exists in the store, whoever owns it.
    ///
    /// Read failures are reported as `false`.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn locked(&self) -> bool {
        match self.store.read(&self.key).await {
            Ok(value) => value.is_some(),
            Err(err) => {
                debug!(error = %err, "probe failed, reporting unlocked");
                false
            }
        }
    }

    /// Owner token currently stored under the key
    pub async fn holder(&self) -> Result<Option<String>> {
        Ok(self.store.read(&self.key).await?)
    }

    /// Delete the key unconditionally. Releasing an absent key succeeds.
    ///
    /// This does not check who holds the lock; see
    /// [`release_owned`](Self::release_owned).
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn release(&self) -> Result<()> {
        self.store.delete(&self.key).await.map_err(|err| {
            warn!(error = %err, "store fault while releasing lock");
            LockError::from(err)
        })?;
        info!("lock released");
        Ok(())
    }

    /// Delete the key only if it holds this handle's owner token.
    ///
    /// Fails with [`LockError::NotOwner`] if another owner holds it; an
    /// absent key succeeds as with [`release`](Self::release).
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn release_owned(&self) -> Result<()> {
        match self
            .store
            .compare_and_delete(&self.key, &self.options.owner)
            .await?
        {
            DeleteOutcome::Deleted => {
                info!("lock released");
                Ok(())
            }
            DeleteOutcome::Absent => {
                debug!("lock already gone");
                Ok(())
            }
            DeleteOutcome::Mismatch { current } => Err(LockError::NotOwner {
                key: self.key.clone(),
                holder: current,
            }),
        }
    }
}
