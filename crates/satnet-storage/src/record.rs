//! Stored bundle records and query filters

use chrono::{DateTime, Utc};
use satnet_core::{Bundle, BundleId, Priority};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a stored bundle
///
/// Transitions only move forward: `Pending -> InTransit -> {Delivered, Failed}`,
/// and `Pending` may jump straight to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    Pending,
    InTransit,
    Delivered,
    Failed,
}

impl BundleStatus {
    fn rank(self) -> u8 {
        match self {
            BundleStatus::Pending => 0,
            BundleStatus::InTransit => 1,
            BundleStatus::Delivered | BundleStatus::Failed => 2,
        }
    }

    /// Delivered and failed records never change status again
    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Check whether moving from `self` to `next` is allowed
    ///
    /// Re-asserting the current status is accepted as a no-op.
    pub fn can_transition_to(self, next: BundleStatus) -> bool {
        self == next || next.rank() > self.rank()
    }
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BundleStatus::Pending => "pending",
            BundleStatus::InTransit => "in_transit",
            BundleStatus::Delivered => "delivered",
            BundleStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A bundle as held by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBundleRecord {
    pub bundle: Bundle,
    pub status: BundleStatus,
    pub stored_at: DateTime<Utc>,
    /// Monotonic insertion counter, breaks `stored_at` ties
    pub sequence: u64,
}

impl StoredBundleRecord {
    /// Wrap a freshly stored bundle
    ///
    /// `stored_at` is kept at millisecond precision, matching what the
    /// durable backend can represent.
    pub fn new(bundle: Bundle, stored_at: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            bundle,
            status: BundleStatus::Pending,
            stored_at: DateTime::from_timestamp_millis(stored_at.timestamp_millis())
                .unwrap_or(stored_at),
            sequence,
        }
    }

    pub fn id(&self) -> BundleId {
        self.bundle.id
    }
}

/// Outcome of a successful `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The bundle was inserted
    Stored,
    /// The bundle was inserted after evicting another one
    StoredAfterEviction { evicted: BundleId },
    /// A record with this ID already exists; nothing changed
    AlreadyStored,
}

impl PutOutcome {
    /// Whether a new record was created
    pub fn is_new(&self) -> bool {
        !matches!(self, PutOutcome::AlreadyStored)
    }
}

/// Filter for [`BundleStore::list`](crate::BundleStore::list)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleFilter {
    /// Only bundles whose destination starts with this string
    pub destination_prefix: Option<String>,
    /// Only bundles in this status
    pub status: Option<BundleStatus>,
    /// Only bundles at or above this priority
    pub min_priority: Option<Priority>,
}

impl BundleFilter {
    /// Match everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Only pending bundles
    pub fn pending() -> Self {
        Self::default().with_status(BundleStatus::Pending)
    }

    pub fn with_destination_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.destination_prefix = Some(prefix.into());
        self
    }

    pub fn with_status(mut self, status: BundleStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_min_priority(mut self, priority: Priority) -> Self {
        self.min_priority = Some(priority);
        self
    }

    /// Check whether a record passes the filter
    pub fn matches(&self, record: &StoredBundleRecord) -> bool {
        let prefix_ok = self.destination_prefix.as_ref().is_none_or(|prefix| {
            record
                .bundle
                .destination
                .as_str()
                .starts_with(prefix.as_str())
        });
        let status_ok = self.status.is_none_or(|status| record.status == status);
        let priority_ok = self
            .min_priority
            .is_none_or(|min| record.bundle.priority >= min);

        prefix_ok && status_ok && priority_ok
    }
}

/// Number of records in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_transit: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl StatusCounts {
    /// Count one record
    pub fn record(&mut self, status: BundleStatus) {
        match status {
            BundleStatus::Pending => self.pending += 1,
            BundleStatus::InTransit => self.in_transit += 1,
            BundleStatus::Delivered => self.delivered += 1,
            BundleStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_transit + self.delivered + self.failed
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_status_transitions() {
        use BundleStatus::*;

        assert!(Pending.can_transition_to(InTransit));
        assert!(Pending.can_transition_to(Delivered));
        assert!(Pending.can_transition_to(Failed));
        assert!(InTransit.can_transition_to(Delivered));
        assert!(InTransit.can_transition_to(Failed));
        assert!(InTransit.can_transition_to(InTransit));

        assert!(!InTransit.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Pending));

        assert!(Delivered.is_terminal());
        assert!(!InTransit.is_terminal());
    }

    #[test]
    fn test_filter_matching() {
        let bundle = Bundle::new(
            "dtn://earth",
            "dtn://mars/rover",
            vec![],
            Priority::Normal,
            Duration::from_secs(60),
        );
        let record = StoredBundleRecord::new(bundle, Utc::now(), 0);

        assert!(BundleFilter::all().matches(&record));
        assert!(BundleFilter::pending().matches(&record));
        assert!(
            BundleFilter::all()
                .with_destination_prefix("dtn://mars")
                .matches(&record)
        );
        assert!(
            !BundleFilter::all()
                .with_destination_prefix("dtn://earth")
                .matches(&record)
        );
        assert!(
            !BundleFilter::all()
                .with_status(BundleStatus::Delivered)
                .matches(&record)
        );
        assert!(
            !BundleFilter::all()
                .with_min_priority(Priority::Expedited)
                .matches(&record)
        );
    }

    #[test]
    fn test_status_counts() {
        let mut counts = StatusCounts::default();
        counts.record(BundleStatus::Pending);
        counts.record(BundleStatus::Pending);
        counts.record(BundleStatus::Failed);

        assert_eq!(counts.pending, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 3);
    }
}
