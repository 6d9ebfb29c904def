//! Apply/defer/drop decisions for incoming remote scene updates.
//!
//! Evaluation order for one incoming message:
//!
//! ```text
//! incoming ──► stale vs applied? ──yes──► IgnoreStale(BehindApplied)
//!                  │ no
//!                  ▼
//!              stale vs newest queued? ──yes──► IgnoreStale(BehindQueued)
//!                  │ no
//!                  ▼
//!              hold && local edits? ──yes──► Defer (bounded push)
//!                  │ no
//!                  ▼
//!               ApplyNow
//! ```
//!
//! Version order, not arrival order, decides whether a message is honored:
//! an older message arriving late is dropped even while newer ones wait in
//! the queue.

use serde::{Deserialize, Serialize};

use crate::deferred::{DeferredEnvelope, DeferredQueue};
use crate::version::{is_stale, RemoteVersion};

/// Why an update was classified stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// Not newer than the last applied remote version.
    BehindApplied,
    /// Not newer than the newest known version already queued.
    BehindQueued,
}

/// Outcome for a single incoming remote message.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncDecision {
    ApplyNow {
        version: RemoteVersion,
    },
    Defer {
        /// Queue after the bounded push; callers rebind to it.
        queue: DeferredQueue,
        queued: DeferredEnvelope,
        version: RemoteVersion,
    },
    IgnoreStale {
        version: RemoteVersion,
        reason: StaleReason,
    },
}

impl SyncDecision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ApplyNow { .. } => "apply_now",
            Self::Defer { .. } => "defer",
            Self::IgnoreStale { .. } => "ignore_stale",
        }
    }

    pub fn version(&self) -> RemoteVersion {
        match self {
            Self::ApplyNow { version } | Self::Defer { version, .. } | Self::IgnoreStale { version, .. } => *version,
        }
    }
}

/// Inputs to [`decide_incoming`].
#[derive(Debug, Clone, Copy)]
pub struct IncomingContext<'a> {
    pub applied_version: RemoteVersion,
    pub deferred_queue: &'a DeferredQueue,
    pub deferred_queue_limit: usize,
    pub has_local_edits: bool,
    pub hold_enabled: bool,
}

/// Classify `incoming` as apply-now, defer or ignore-stale.
pub fn decide_incoming(context: IncomingContext<'_>, incoming: DeferredEnvelope) -> SyncDecision {
    let version = incoming.version();
    if is_stale(&version, &context.applied_version) {
        return SyncDecision::IgnoreStale {
            version,
            reason: StaleReason::BehindApplied,
        };
    }

    let queued_version = context.deferred_queue.latest_known_version();
    if is_stale(&version, &queued_version) {
        return SyncDecision::IgnoreStale {
            version,
            reason: StaleReason::BehindQueued,
        };
    }

    if context.hold_enabled && context.has_local_edits {
        let queue = context
            .deferred_queue
            .pushed(incoming.clone(), context.deferred_queue_limit);
        return SyncDecision::Defer {
            queue,
            queued: incoming,
            version,
        };
    }

    SyncDecision::ApplyNow { version }
}

/// Release behaviour configured for the hold toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldReleasePolicy {
    pub auto_apply_on_release: bool,
    pub require_confirm_on_release: bool,
}

/// Result of a hold toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldTransition {
    pub changed: bool,
    pub next_enabled: bool,
    pub pending_confirm: bool,
    /// Caller should run the deferred-apply procedure right away.
    pub should_auto_apply: bool,
}

/// Decide what toggling hold from `current` to `next` implies.
///
/// Enabling is always a plain flip. Disabling with a non-empty queue
/// either waits for confirmation, auto-applies, or leaves the queue for a
/// manual apply, depending on `policy`.
pub fn decide_hold_transition(
    current_enabled: bool,
    next_enabled: bool,
    deferred_count: usize,
    policy: HoldReleasePolicy,
) -> HoldTransition {
    if current_enabled == next_enabled {
        return HoldTransition {
            changed: false,
            next_enabled: current_enabled,
            pending_confirm: false,
            should_auto_apply: false,
        };
    }

    if !next_enabled && deferred_count > 0 && policy.auto_apply_on_release {
        return HoldTransition {
            changed: true,
            next_enabled: false,
            pending_confirm: policy.require_confirm_on_release,
            should_auto_apply: !policy.require_confirm_on_release,
        };
    }

    HoldTransition {
        changed: true,
        next_enabled,
        pending_confirm: false,
        should_auto_apply: false,
    }
}
