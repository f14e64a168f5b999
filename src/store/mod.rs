// Store adapter boundary
//
// The lock protocol needs exactly three atomic operations from the backing
// key-value store: create-if-absent with a TTL, read and delete. Replication,
// consensus and connection management belong to the adapter.

pub mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result of a conditional create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Key did not exist and now holds the given value
    Created,
    /// Key already existed; nothing was written
    AlreadyExists,
}

/// Result of a value-checked delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Absent,
    /// Key exists with a different value and was left in place
    Mismatch { current: String },
}

#[async_trait]
pub trait StoreAdapter: Send + Sync + std::fmt::Debug {
    /// Create `key` with `value` only if it does not exist. `ttl: None` means no expiry.
    ///
    /// Must be atomic and linearizable across every client of the store.
    async fn create_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> StoreResult<CreateOutcome>;

    /// Current value of `key`, `None` if absent
    async fn read(&self, key: &str) -> StoreResult<Option<String>>;

    /// Remove `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Remove `key` only if it currently holds `expected`.
    ///
    /// The provided implementation is a read followed by a delete and is not
    /// atomic: a key that expires and is re-created in between can be removed.
    /// Adapters whose store offers compare-and-delete should override it.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<DeleteOutcome> {
        match self.read(key).await? {
            None => Ok(DeleteOutcome::Absent),
            Some(current) if current == expected => {
                self.delete(key).await?;
                Ok(DeleteOutcome::Deleted)
            }
            Some(current) => Ok(DeleteOutcome::Mismatch { current }),
        }
    }
}

/// Key under which a resource's lock record lives: `/namespace/resource`
pub fn lock_key(namespace: &str, resource: &str) -> String {
    format!("/{}/{}", namespace, resource)
}
