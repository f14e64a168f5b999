use std::time::Duration;

use thiserror::Error;

/// Faults reported by a [`StoreAdapter`](crate::store::StoreAdapter).
///
/// "Key already exists" and "key not found" are not faults; adapters report
/// those through their return values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Lock {key:?} is held by another owner")]
    Contention { key: String },

    #[error("Transport error: {0}")]
    Transport(#[from] StoreError),

    #[error("Timeout elapsed after {:.3} seconds while trying to acquire lock {key:?}", .timeout.as_secs_f64())]
    Timeout { key: String, timeout: Duration },

    #[error("Lock {key:?} acquired but already expired: spent {elapsed:?} acquiring with {drift:?} drift margin")]
    ExpiredValidity {
        key: String,
        elapsed: Duration,
        drift: Duration,
    },

    #[error("Lock {key:?} is owned by {holder:?}, not by this handle")]
    NotOwner { key: String, holder: String },

    #[error("Acquisition of lock {key:?} was cancelled")]
    Cancelled { key: String },

    #[error("Invalid lock options: {0}")]
    InvalidOptions(String),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl LockError {
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::Contention { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, LockError::Transport(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }

    /// Configured budget reported by a [`LockError::Timeout`].
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            LockError::Timeout { timeout, .. } => Some(*timeout),
            _ => None,
        }
    }
}

impl From<figment::Error> for LockError {
    fn from(err: figment::Error) -> Self {
        LockError::Config(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_reports_budget() {
        let err = LockError::Timeout {
            key: "/lock/res".to_string(),
            timeout: Duration::from_millis(10_500),
        };
        assert!(err.to_string().contains("10.500 seconds"));
        assert_eq!(err.timeout(), Some(Duration::from_millis(10_500)));
        assert!(err.is_timeout());
        assert!(!err.is_contention());
    }

    #[test]
    fn test_store_error_converts_to_transport() {
        let err: LockError = StoreError::Unavailable("connection refused".into()).into();
        assert!(err.is_transport());
        assert!(!err.is_contention());
        assert_eq!(err.timeout(), None);
    }
}
