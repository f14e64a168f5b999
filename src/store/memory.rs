// In-process TTL store
//
// Honors the adapter contract with per-key atomicity from DashMap's entry API.
// Expiry is lazy: an expired record is treated as absent and replaced or
// dropped the next time its key is touched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::{sleep, Instant};
use tracing::trace;

use super::{CreateOutcome, DeleteOutcome, StoreAdapter, StoreResult};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct Record {
    value: String,
    expires_at: Option<Instant>,
}

impl Record {
    fn new(value: &str, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value: value.to_string(),
            // a TTL past the clock's range behaves as no expiry
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    records: DashMap<String, Record>,
    available: AtomicBool,
    /// Simulated round-trip added to every operation
    latency: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            available: AtomicBool::new(true),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new()
        }
    }

    /// Toggle whether operations reach the store. While unavailable every
    /// operation fails with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of live (unexpired) records
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.records.iter().filter(|r| !r.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn round_trip(&self) -> StoreResult<()> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".into()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn create_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> StoreResult<CreateOutcome> {
        self.round_trip().await?;
        let now = Instant::now();
        let outcome = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_expired(now) {
                    existing.insert(Record::new(value, ttl, now));
                    CreateOutcome::Created
                } else {
                    CreateOutcome::AlreadyExists
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Record::new(value, ttl, now));
                CreateOutcome::Created
            }
        };
        trace!(key, ?outcome, "create_if_absent");
        Ok(outcome)
    }

    async fn read(&self, key: &str) -> StoreResult<Option<String>> {
        self.round_trip().await?;
        let now = Instant::now();
        self.records.remove_if(key, |_, record| record.is_expired(now));
        Ok(self.records.get(key).map(|record| record.value.clone()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.round_trip().await?;
        self.records.remove(key);
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<DeleteOutcome> {
        self.round_trip().await?;
        let now = Instant::now();
        let outcome = match self.records.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                if existing.get().is_expired(now) {
                    existing.remove();
                    DeleteOutcome::Absent
                } else if existing.get().value == expected {
                    existing.remove();
                    DeleteOutcome::Deleted
                } else {
                    DeleteOutcome::Mismatch {
                        current: existing.get().value.clone(),
                    }
                }
            }
            Entry::Vacant(_) => DeleteOutcome::Absent,
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_is_exclusive() {
        let store = MemoryStore::new();
        let first = store.create_if_absent("/ns/res", "a", None).await.unwrap();
        let second = store.create_if_absent("/ns/res", "b", None).await.unwrap();
        assert_eq!(first, CreateOutcome::Created);
        assert_eq!(second, CreateOutcome::AlreadyExists);
        assert_eq!(store.read("/ns/res").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .create_if_absent("/ns/res", "a", Some(Duration::from_secs(5)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert!(store.read("/ns/res").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.read("/ns/res").await.unwrap(), None);
        assert!(store.is_empty());

        let again = store
            .create_if_absent("/ns/res", "b", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(again, CreateOutcome::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_is_replaced_on_create() {
        let store = MemoryStore::new();
        store
            .create_if_absent("/ns/res", "a", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let outcome = store.create_if_absent("/ns/res", "b", None).await.unwrap();
        assert_eq!(outcome, CreateOutcome::Created);
        assert_eq!(store.read("/ns/res").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.delete("/ns/missing").await.unwrap();
        store.create_if_absent("/ns/res", "a", None).await.unwrap();
        store.delete("/ns/res").await.unwrap();
        store.delete("/ns/res").await.unwrap();
        assert_eq!(store.read("/ns/res").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.create_if_absent("/ns/res", "a", None).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.read("/ns/res").await.is_err());
        assert!(store.delete("/ns/res").await.is_err());

        store.set_available(true);
        assert_eq!(
            store.create_if_absent("/ns/res", "a", None).await.unwrap(),
            CreateOutcome::Created
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_beyond_clock_range_never_expires() {
        let store = MemoryStore::new();
        let outcome = store
            .create_if_absent("/ns/res", "a", Some(Duration::MAX))
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Created);

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert_eq!(store.read("/ns/res").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_compare_and_delete_checks_value() {
        let store = MemoryStore::new();
        store.create_if_absent("/ns/res", "a", None).await.unwrap();
        assert_eq!(
            store.compare_and_delete("/ns/res", "b").await.unwrap(),
            DeleteOutcome::Mismatch {
                current: "a".to_string()
            }
        );
        assert_eq!(
            store.compare_and_delete("/ns/res", "a").await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            store.compare_and_delete("/ns/res", "a").await.unwrap(),
            DeleteOutcome::Absent
        );
    }
}
