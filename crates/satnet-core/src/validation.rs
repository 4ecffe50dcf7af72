//! Bundle validation
//!
//! Run on every ingress and again before every egress attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bundle::{Bundle, MAX_HOP_COUNT};
use crate::error::BundleError;

/// Default maximum payload size (10 MiB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Limits applied by [`validate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLimits {
    /// Highest hop count a bundle may carry
    pub max_hop_count: u8,
    /// Largest accepted payload in bytes
    pub max_payload_size: usize,
}

impl Default for BundleLimits {
    fn default() -> Self {
        Self {
            max_hop_count: MAX_HOP_COUNT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl BundleLimits {
    /// Set the maximum payload size
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the maximum hop count
    pub fn with_max_hop_count(mut self, hops: u8) -> Self {
        self.max_hop_count = hops;
        self
    }
}

/// Validate a bundle against `limits` at time `now`
///
/// Checks run in a fixed order (endpoints, hop count, expiry, size) so the
/// reported reason is stable when several checks would fail.
pub fn validate(bundle: &Bundle, now: DateTime<Utc>, limits: &BundleLimits) -> Result<(), BundleError> {
    if bundle.source.is_empty() {
        return Err(BundleError::EmptySource);
    }
    if bundle.destination.is_empty() {
        return Err(BundleError::EmptyDestination);
    }
    if bundle.hop_count > limits.max_hop_count {
        return Err(BundleError::HopLimitExceeded {
            hop_count: bundle.hop_count,
            max: limits.max_hop_count,
        });
    }
    if bundle.is_expired(now) {
        return Err(BundleError::Expired);
    }
    if bundle.size() > limits.max_payload_size {
        return Err(BundleError::SizeExceedsMax {
            size: bundle.size(),
            max: limits.max_payload_size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bundle::Priority;
    use crate::eid::Eid;

    fn bundle() -> Bundle {
        Bundle::new(
            "dtn://earth",
            "dtn://mars/rover",
            vec![0u8; 64],
            Priority::Normal,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_valid_bundle() {
        assert!(validate(&bundle(), Utc::now(), &BundleLimits::default()).is_ok());
    }

    #[test]
    fn test_empty_endpoints() {
        let mut b = bundle();
        b.source = Eid::none();
        assert_eq!(
            validate(&b, Utc::now(), &BundleLimits::default()),
            Err(BundleError::EmptySource)
        );

        let mut b = bundle();
        b.destination = Eid::none();
        assert_eq!(
            validate(&b, Utc::now(), &BundleLimits::default()),
            Err(BundleError::EmptyDestination)
        );
    }

    #[test]
    fn test_hop_limit() {
        let limits = BundleLimits::default().with_max_hop_count(3);
        let mut b = bundle();
        b.hop_count = 3;
        assert!(validate(&b, Utc::now(), &limits).is_ok());

        b.hop_count = 4;
        assert!(matches!(
            validate(&b, Utc::now(), &limits),
            Err(BundleError::HopLimitExceeded { hop_count: 4, max: 3 })
        ));
    }

    #[test]
    fn test_expired() {
        let b = bundle();
        let later = b.creation_timestamp + chrono::Duration::seconds(61);
        assert_eq!(
            validate(&b, later, &BundleLimits::default()),
            Err(BundleError::Expired)
        );
    }

    #[test]
    fn test_size_limit() {
        let limits = BundleLimits::default().with_max_payload_size(32);
        assert_eq!(
            validate(&bundle(), Utc::now(), &limits),
            Err(BundleError::SizeExceedsMax { size: 64, max: 32 })
        );
    }
}
