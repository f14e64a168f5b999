// Lock configuration surface
//
// Options are immutable once a handle is built. Defaults match the key layout
// and timings used by existing deployments sharing a store.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LockError, Result};

pub const DEFAULT_NAMESPACE: &str = "LockDefault";
pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_DRIFT_FACTOR: f64 = 0.001;
pub const DEFAULT_OWNER: &str = "dfltowner";

/// Environment variable prefix read by [`LockOptions::load`]
pub const ENV_PREFIX: &str = "LEASELOCK_";

/// Time-to-live applied to the lock key when it is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lease {
    /// Key expires after the given duration
    Expires(Duration),
    /// Key never expires and must be released explicitly
    Never,
}

impl Lease {
    /// TTL to hand to the store, `None` for no expiry
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            Lease::Expires(duration) => Some(*duration),
            Lease::Never => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, Lease::Expires(_))
    }
}

impl Default for Lease {
    fn default() -> Self {
        Lease::Expires(DEFAULT_LEASE)
    }
}

impl From<Duration> for Lease {
    fn from(duration: Duration) -> Self {
        Lease::Expires(duration)
    }
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lease::Expires(duration) => write!(f, "{}", humantime::format_duration(*duration)),
            Lease::Never => f.write_str("never"),
        }
    }
}

impl Serialize for Lease {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Lease {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(LeaseVisitor)
    }
}

struct LeaseVisitor;

impl<'de> Visitor<'de> for LeaseVisitor {
    type Value = Lease;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a duration such as \"60s\", a number of seconds, or \"never\"")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Lease, E> {
        match v.trim() {
            "never" | "none" | "infinite" => Ok(Lease::Never),
            other => match other.parse::<f64>() {
                Ok(secs) => self.visit_f64(secs),
                Err(_) => humantime::parse_duration(other)
                    .map(Lease::Expires)
                    .map_err(E::custom),
            },
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Lease, E> {
        if v < 0 {
            Ok(Lease::Never)
        } else {
            Ok(Lease::Expires(Duration::from_secs(v.unsigned_abs())))
        }
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Lease, E> {
        Ok(Lease::Expires(Duration::from_secs(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Lease, E> {
        if v < 0.0 {
            Ok(Lease::Never)
        } else {
            Duration::try_from_secs_f64(v)
                .map(Lease::Expires)
                .map_err(E::custom)
        }
    }
}

/// Serde adapter for plain durations: humantime strings or seconds
mod duration_serde {
    use super::*;

    pub fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Duration, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a duration such as \"100ms\" or a number of seconds")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Duration, E> {
            match v.trim().parse::<f64>() {
                Ok(secs) => self.visit_f64(secs),
                Err(_) => humantime::parse_duration(v.trim()).map_err(E::custom),
            }
        }

        // negative values clamp to zero: a zero acquire timeout makes one attempt
        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Duration, E> {
            Ok(Duration::from_secs(u64::try_from(v).unwrap_or(0)))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Duration, E> {
            if v < 0.0 {
                return Ok(Duration::ZERO);
            }
            Duration::try_from_secs_f64(v).map_err(E::custom)
        }
    }
}

/// Configuration for one lock handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockOptions {
    /// Key prefix isolating this lock's keyspace
    pub namespace: String,

    /// TTL applied to the key on creation
    pub lease: Lease,

    /// Budget for a blocking acquire
    #[serde(with = "duration_serde")]
    pub acquire_timeout: Duration,

    /// Sleep between failed attempts
    #[serde(with = "duration_serde")]
    pub retry_interval: Duration,

    /// Fraction of the lease reserved as clock-skew margin
    pub drift_factor: f64,

    /// Value written into the key; informational unless `release_owned` is used
    pub owner: String,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            lease: Lease::default(),
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            drift_factor: DEFAULT_DRIFT_FACTOR,
            owner: DEFAULT_OWNER.to_string(),
        }
    }
}

impl LockOptions {
    /// Layer defaults, an optional TOML file, then `LEASELOCK_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(LockOptions::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let options: LockOptions = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(LockError::InvalidOptions("namespace must not be empty".into()));
        }
        if !self.drift_factor.is_finite() || !(0.0..1.0).contains(&self.drift_factor) {
            return Err(LockError::InvalidOptions(format!(
                "drift_factor must be in [0, 1), got {}",
                self.drift_factor
            )));
        }
        Ok(())
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_lease(mut self, lease: impl Into<Lease>) -> Self {
        self.lease = lease.into();
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_drift_factor(mut self, drift_factor: f64) -> Self {
        self.drift_factor = drift_factor;
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }
}
