// Lease validity arithmetic
//
// validity = lease - elapsed - lease * drift_factor
//
// `elapsed` is measured from just before the first attempt to just after the
// successful one, so it includes every retry and sleep.

use std::time::Duration;

use crate::options::Lease;

/// Remaining window in which the caller may assume exclusive ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Validity {
    /// Safe for this long after acquisition returned
    Bounded(Duration),
    /// Key has no TTL; held until released
    Unbounded,
}

impl Validity {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Validity::Bounded(remaining) => Some(*remaining),
            Validity::Unbounded => None,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, Validity::Unbounded)
    }
}

/// Clock-skew margin reserved out of a lease
pub fn drift_margin(lease: Duration, drift_factor: f64) -> Duration {
    if drift_factor.is_finite() && drift_factor > 0.0 {
        lease.mul_f64(drift_factor.min(1.0))
    } else {
        Duration::ZERO
    }
}

/// Outcome of the validity computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityCheck {
    Valid(Validity),
    /// Acquisition took long enough that nothing is left of the lease
    Expired { elapsed: Duration, drift: Duration },
}

pub fn compute(lease: Lease, elapsed: Duration, drift_factor: f64) -> ValidityCheck {
    let duration = match lease {
        Lease::Never => return ValidityCheck::Valid(Validity::Unbounded),
        Lease::Expires(duration) => duration,
    };
    let drift = drift_margin(duration, drift_factor);
    match duration
        .checked_sub(elapsed)
        .and_then(|left| left.checked_sub(drift))
    {
        Some(remaining) if !remaining.is_zero() => {
            ValidityCheck::Valid(Validity::Bounded(remaining))
        }
        _ => ValidityCheck::Expired { elapsed, drift },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sixty_second_lease() {
        let check = compute(
            Lease::Expires(Duration::from_secs(60)),
            Duration::from_millis(10),
            0.001,
        );
        // 60 - 0.01 - 0.06
        let remaining = match check {
            ValidityCheck::Valid(Validity::Bounded(remaining)) => remaining,
            other => panic!("unexpected {other:?}"),
        };
        let expected = Duration::from_millis(59_930);
        let diff = remaining.abs_diff(expected);
        assert!(diff < Duration::from_micros(1), "{remaining:?}");
    }

    #[test]
    fn test_unbounded_ignores_drift() {
        let check = compute(Lease::Never, Duration::from_secs(3600), 0.5);
        assert_eq!(check, ValidityCheck::Valid(Validity::Unbounded));
        assert_eq!(Validity::Unbounded.as_duration(), None);
    }

    #[test]
    fn test_expired_when_acquire_outlasts_lease() {
        let check = compute(
            Lease::Expires(Duration::from_secs(1)),
            Duration::from_millis(1200),
            0.001,
        );
        match check {
            ValidityCheck::Expired { elapsed, .. } => {
                assert_eq!(elapsed, Duration::from_millis(1200))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_drift_consumes_what_is_left() {
        let check = compute(
            Lease::Expires(Duration::from_secs(1)),
            Duration::from_millis(950),
            0.1,
        );
        assert!(matches!(check, ValidityCheck::Expired { .. }));
    }

    proptest! {
        #[test]
        fn validity_strictly_below_lease(
            lease_ms in 1u64..10_000_000,
            elapsed_us in 1u64..1_000_000,
            drift_factor in 0.0001f64..0.9999,
        ) {
            let lease = Duration::from_millis(lease_ms);
            let check = compute(Lease::Expires(lease), Duration::from_micros(elapsed_us), drift_factor);
            if let ValidityCheck::Valid(Validity::Bounded(remaining)) = check {
                prop_assert!(remaining < lease);
            }
        }

        #[test]
        fn longer_acquisition_never_increases_validity(
            lease_ms in 1u64..1_000_000,
            a_ms in 0u64..1_000_000,
            b_ms in 0u64..1_000_000,
        ) {
            let lease = Lease::Expires(Duration::from_millis(lease_ms));
            let (short, long) = (a_ms.min(b_ms), a_ms.max(b_ms));
            let left = |ms| match compute(lease, Duration::from_millis(ms), 0.001) {
                ValidityCheck::Valid(v) => v.as_duration().unwrap_or_default(),
                ValidityCheck::Expired { .. } => Duration::ZERO,
            };
            prop_assert!(left(long) <= left(short));
        }
    }
}
