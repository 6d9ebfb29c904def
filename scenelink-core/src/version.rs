//! Remote version markers for ordering scene updates.
//!
//! A remote update carries up to two independent counters:
//!
//! ```text
//! ┌────────────┬────────────┐
//! │ revision   │ sequence   │
//! │ Option<i64>│ Option<i64>│
//! └────────────┴────────────┘
//!        ▲            ▲
//!        │            └── preferred when both sides have it
//!        └── fallback ordering
//! ```
//!
//! When neither counter is comparable the update is treated as fresh
//! (fail-open). Equality is stale, so duplicate retransmissions of the same
//! version are dropped as no-ops.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Loosely ordered version of a remote scene update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVersion {
    pub revision: Option<i64>,
    pub sequence: Option<i64>,
}

impl RemoteVersion {
    /// Version with neither counter known.
    pub const UNKNOWN: RemoteVersion = RemoteVersion {
        revision: None,
        sequence: None,
    };

    pub fn new(revision: Option<i64>, sequence: Option<i64>) -> Self {
        Self { revision, sequence }
    }

    pub fn with_sequence(sequence: i64) -> Self {
        Self {
            revision: None,
            sequence: Some(sequence),
        }
    }

    pub fn with_revision(revision: i64) -> Self {
        Self {
            revision: Some(revision),
            sequence: None,
        }
    }

    /// True if either counter is present.
    pub fn is_known(&self) -> bool {
        self.revision.is_some() || self.sequence.is_some()
    }

    /// Number of counters present (0..=2).
    pub fn known_fields(&self) -> usize {
        usize::from(self.revision.is_some()) + usize::from(self.sequence.is_some())
    }

    /// Whether `self` is not newer than `baseline`.
    ///
    /// Compares by sequence when both sides have one, else by revision,
    /// else reports fresh.
    pub fn is_stale_against(&self, baseline: &RemoteVersion) -> bool {
        is_stale(self, baseline)
    }

    /// Field-wise merge keeping every known counter.
    pub fn merged_with(&self, incoming: &RemoteVersion) -> RemoteVersion {
        merge(self, incoming)
    }
}

fn compare_counters(a: Option<i64>, b: Option<i64>) -> Option<Ordering> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => None,
    }
}

/// `incoming <= baseline` under the sequence-then-revision rule.
pub fn is_stale(incoming: &RemoteVersion, baseline: &RemoteVersion) -> bool {
    if let Some(order) = compare_counters(incoming.sequence, baseline.sequence) {
        return order != Ordering::Greater;
    }
    if let Some(order) = compare_counters(incoming.revision, baseline.revision) {
        return order != Ordering::Greater;
    }
    false
}

/// Keep `incoming`'s counters where known, otherwise `previous`'s.
///
/// Never regresses a known counter to unknown.
pub fn merge(previous: &RemoteVersion, incoming: &RemoteVersion) -> RemoteVersion {
    RemoteVersion {
        revision: incoming.revision.or(previous.revision),
        sequence: incoming.sequence.or(previous.sequence),
    }
}

/// True if either counter is present.
pub fn is_known(version: &RemoteVersion) -> bool {
    version.is_known()
}
