//! Pure scene reducers.
//!
//! Each reducer takes the current [`SceneState`] by reference and returns a
//! new state plus an outcome. Nothing here mutates its input or touches the
//! undo history; `history_reset` tells the session to clear it.
//!
//! | Reducer                         | Drives                              |
//! |---------------------------------|-------------------------------------|
//! | [`reduce_incoming`]             | one remote patch/snapshot           |
//! | [`reduce_applied_remote`]       | adopting a parsed remote scene      |
//! | [`select_for_apply_and_reduce`] | replaying the deferred queue        |
//! | [`reduce_hold_enabled`]         | hold toggle                         |

use serde_json::Value;

use crate::deferred::{DeferredApplyMode, DeferredEnvelope, DeferredQueue, PatchKind};
use crate::scene::{parse_scene_message, ParsedScene, SceneBaseline};
use crate::state::{RemoteOverride, SceneSource, SceneState};
use crate::sync::{decide_hold_transition, decide_incoming, HoldReleasePolicy, HoldTransition, IncomingContext, StaleReason, SyncDecision};
use crate::version::{is_stale, RemoteVersion};

pub const DEFERRED_QUEUE_INVALID: &str = "deferred remote queue invalid";

/// New state plus what happened.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduced<O> {
    pub state: SceneState,
    pub outcome: O,
    /// Undo history no longer matches the state and must be cleared.
    pub history_reset: bool,
}

impl<O> Reduced<O> {
    fn keep(state: SceneState, outcome: O) -> Self {
        Self {
            state,
            outcome,
            history_reset: false,
        }
    }
}

/// Outcome of [`reduce_incoming`].
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingOutcome {
    /// Message did not parse; `scene_error` is set.
    Invalid,
    IgnoredStale {
        version: RemoteVersion,
        reason: StaleReason,
    },
    Deferred {
        queue_len: usize,
        version: RemoteVersion,
    },
    Applied {
        version: RemoteVersion,
        overwrote_local_edits: bool,
    },
}

/// Knobs for [`reduce_incoming`].
#[derive(Debug, Clone, Copy)]
pub struct IncomingSettings {
    pub deferred_queue_limit: usize,
    pub has_local_edits: bool,
}

/// Parse, classify and apply or defer one remote scene message.
pub fn reduce_incoming(
    state: &SceneState,
    kind: PatchKind,
    message: &Value,
    settings: IncomingSettings,
) -> Reduced<IncomingOutcome> {
    let Some(parsed) = parse_scene_message(kind, message, state.baseline()) else {
        let mut next = state.clone();
        next.scene_error = Some(format!("{} invalid", kind.as_str()));
        return Reduced::keep(next, IncomingOutcome::Invalid);
    };

    let envelope = DeferredEnvelope::new(kind, message.clone(), parsed.received_at, parsed.version());
    let context = IncomingContext {
        applied_version: state.applied_version,
        deferred_queue: &state.deferred,
        deferred_queue_limit: settings.deferred_queue_limit,
        has_local_edits: settings.has_local_edits,
        hold_enabled: state.hold.enabled,
    };

    match decide_incoming(context, envelope) {
        SyncDecision::IgnoreStale { version, reason } => {
            Reduced::keep(state.clone(), IncomingOutcome::IgnoredStale { version, reason })
        }
        SyncDecision::Defer { queue, version, .. } => {
            let mut next = state.clone();
            next.last_event_at = Some(parsed.received_at);
            let queue_len = queue.len();
            next.deferred = queue;
            Reduced::keep(next, IncomingOutcome::Deferred { queue_len, version })
        }
        SyncDecision::ApplyNow { version } => Reduced {
            state: reduce_applied_remote(state, parsed, kind, settings.has_local_edits),
            outcome: IncomingOutcome::Applied {
                version,
                overwrote_local_edits: settings.has_local_edits,
            },
            history_reset: true,
        },
    }
}

/// Adopt a parsed remote scene.
///
/// Clears the deferred queue and any pending confirm, keeps the selection
/// only if the placement survived, and marks a remote override when local
/// edits were overwritten.
pub fn reduce_applied_remote(state: &SceneState, parsed: ParsedScene, kind: PatchKind, overwrote_local_edits: bool) -> SceneState {
    let version = parsed.version();
    let selected_placement = state
        .selected_placement
        .clone()
        .filter(|id| parsed.placements.iter().any(|placement| &placement.id == id));

    let mut next = state.clone();
    next.scene_id = parsed.scene_id.unwrap_or_else(|| state.scene_id.clone());
    next.source = SceneSource::Scene;
    next.placements = parsed.placements;
    next.room = parsed.room;
    next.avatar = parsed.avatar;
    next.revision = parsed.revision.unwrap_or(state.revision + 1);
    next.sequence = parsed.sequence.unwrap_or(state.sequence);
    next.applied_version = state.applied_version.merged_with(&version);
    next.deferred = DeferredQueue::new();
    next.hold.pending_confirm = false;
    next.scene_error = None;
    next.selected_placement = selected_placement;
    next.last_event_at = Some(parsed.received_at);
    if overwrote_local_edits {
        next.remote_override = Some(RemoteOverride {
            kind,
            at: parsed.received_at,
        });
    }
    next
}

/// Outcome of [`select_for_apply_and_reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredApplyOutcome {
    /// Nothing was queued.
    Empty,
    /// Every selected entry was stale against the applied version.
    AllStale { dropped: usize },
    /// No entry applied; `invalid` when none of them even parsed.
    NothingApplied { invalid: bool },
    Applied {
        applied: usize,
        dropped_stale: usize,
        skipped_invalid: usize,
    },
}

impl DeferredApplyOutcome {
    pub fn applied(&self) -> usize {
        match self {
            Self::Applied { applied, .. } => *applied,
            _ => 0,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::NothingApplied { invalid: true })
    }
}

/// Replay the deferred queue per `mode`.
///
/// Entries are filtered against the applied version first, then parsed in
/// order against a running baseline so patches compose. The queue is
/// cleared whatever the outcome.
pub fn select_for_apply_and_reduce(
    state: &SceneState,
    mode: DeferredApplyMode,
    has_local_edits: bool,
) -> Reduced<DeferredApplyOutcome> {
    if state.deferred.is_empty() {
        let mut next = state.clone();
        next.hold.pending_confirm = false;
        return Reduced::keep(next, DeferredApplyOutcome::Empty);
    }

    let selected = state.deferred.select_for_apply(mode);
    let fresh: Vec<&DeferredEnvelope> = selected
        .iter()
        .copied()
        .filter(|entry| !is_stale(&entry.version(), &state.applied_version))
        .collect();
    let mut dropped_stale = selected.len() - fresh.len();

    if fresh.is_empty() {
        log::debug!("deferred apply dropped {dropped_stale} stale entries");
        let mut next = state.clone();
        next.deferred = DeferredQueue::new();
        next.hold.pending_confirm = false;
        next.scene_error = None;
        return Reduced::keep(next, DeferredApplyOutcome::AllStale { dropped: dropped_stale });
    }

    let mut running_version = state.applied_version;
    let mut current: Option<(ParsedScene, PatchKind)> = None;
    let mut applied = 0;
    let mut parsed_any = false;
    let mut skipped_invalid = 0;

    for entry in fresh {
        let baseline = match &current {
            Some((parsed, _)) => SceneBaseline {
                placements: &parsed.placements,
                room: &parsed.room,
                avatar: &parsed.avatar,
            },
            None => state.baseline(),
        };
        let Some(parsed) = parse_scene_message(entry.kind, &entry.message, baseline) else {
            skipped_invalid += 1;
            continue;
        };
        parsed_any = true;
        if is_stale(&parsed.version(), &running_version) {
            dropped_stale += 1;
            continue;
        }
        running_version = running_version.merged_with(&parsed.version());
        current = Some((parsed, entry.kind));
        applied += 1;
    }

    let Some((parsed, kind)) = current else {
        let mut next = state.clone();
        next.deferred = DeferredQueue::new();
        next.hold.pending_confirm = false;
        if !parsed_any {
            next.scene_error = Some(DEFERRED_QUEUE_INVALID.to_string());
        }
        return Reduced::keep(next, DeferredApplyOutcome::NothingApplied { invalid: !parsed_any });
    };

    let mut next = reduce_applied_remote(state, parsed, kind, has_local_edits);
    next.applied_version = running_version;
    Reduced {
        state: next,
        outcome: DeferredApplyOutcome::Applied {
            applied,
            dropped_stale,
            skipped_invalid,
        },
        history_reset: true,
    }
}

/// Flip the hold flag per the release policy.
///
/// The returned transition says whether the caller should run the deferred
/// apply right away.
pub fn reduce_hold_enabled(state: &SceneState, enabled: bool, policy: HoldReleasePolicy) -> Reduced<HoldTransition> {
    let transition = decide_hold_transition(state.hold.enabled, enabled, state.deferred.len(), policy);
    let mut next = state.clone();
    if transition.changed {
        next.hold.enabled = transition.next_enabled;
        next.hold.pending_confirm = transition.pending_confirm;
    }
    Reduced::keep(next, transition)
}
