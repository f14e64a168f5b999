pub use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

pub use crate::error::{LockError, Result, StoreError};
pub use crate::lock::LockHandle;
pub use crate::options::{Lease, LockOptions};
pub use crate::store::{CreateOutcome, DeleteOutcome, MemoryStore, StoreAdapter, StoreResult};
pub use crate::validity::Validity;
