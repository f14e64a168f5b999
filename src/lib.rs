//! Lease locks over a shared key-value store.
//!
//! A [`LockHandle`] guards one named resource by creating the key
//! `/namespace/resource` with a TTL through a [`StoreAdapter`]. The store's
//! conditional create is the only synchronization point; the handle itself
//! holds configuration and nothing else.
//!
//! ```no_run
//! use std::sync::Arc;
//! use leaselock::prelude::*;
//!
//! # async fn run() -> leaselock::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let lock = LockHandle::with_options(
//!     "orders",
//!     store,
//!     LockOptions::default().with_owner("worker-1"),
//! )?;
//!
//! let validity = lock.acquire(true).await?;
//! // safe to act for `validity`
//! lock.release().await?;
//! # let _ = validity;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod lock;
pub mod options;
pub mod prelude;
pub mod store;
pub mod stress;
pub mod validity;

mod cli;
pub use cli::{verbosity_filter, Cli, Commands};

pub use error::{LockError, Result, StoreError};
pub use lock::LockHandle;
pub use options::{Lease, LockOptions};
pub use store::{lock_key, CreateOutcome, DeleteOutcome, MemoryStore, StoreAdapter};
pub use validity::Validity;
