//! Bounded queue of remote scene updates withheld while hold is active.
//!
//! Insertion order is arrival order. When the queue grows past its limit the
//! oldest entries are evicted first. Updates are value-style: `pushed`
//! returns a new queue and leaves the receiver untouched, so every
//! transition can be replayed in isolation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

use crate::clock::Timestamp;
use crate::version::RemoteVersion;

/// Which flavour of scene payload a remote message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    ScenePatch,
    SceneSnapshot,
}

impl PatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScenePatch => "scene_patch",
            Self::SceneSnapshot => "scene_snapshot",
        }
    }

    /// Short label used in event summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ScenePatch => "patch",
            Self::SceneSnapshot => "snapshot",
        }
    }
}

/// How many deferred entries to replay when the queue is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredApplyMode {
    /// Replay every entry in arrival order.
    ApplyAll,
    /// Replay only the newest entry.
    #[default]
    LatestOnly,
}

impl DeferredApplyMode {
    /// Parse a config token (`apply_all|all|latest_only|latest`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "apply_all" | "all" => Some(Self::ApplyAll),
            "latest_only" | "latest" => Some(Self::LatestOnly),
            _ => None,
        }
    }
}

/// Immutable snapshot of one remote message held for later replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredEnvelope {
    pub kind: PatchKind,
    pub message: Value,
    pub received_at: Timestamp,
    pub revision: Option<i64>,
    pub sequence: Option<i64>,
}

impl DeferredEnvelope {
    pub fn new(kind: PatchKind, message: Value, received_at: Timestamp, version: RemoteVersion) -> Self {
        Self {
            kind,
            message,
            received_at,
            revision: version.revision,
            sequence: version.sequence,
        }
    }

    pub fn version(&self) -> RemoteVersion {
        RemoteVersion::new(self.revision, self.sequence)
    }
}

/// Ordered, capacity-bounded store of deferred envelopes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeferredQueue {
    entries: VecDeque<DeferredEnvelope>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue with `entry` appended, trimmed from the front to `limit`.
    ///
    /// A zero limit is treated as 1.
    #[must_use]
    pub fn pushed(&self, entry: DeferredEnvelope, limit: usize) -> Self {
        let limit = limit.max(1);
        let mut entries = self.entries.clone();
        entries.push_back(entry);
        while entries.len() > limit {
            entries.pop_front();
        }
        Self { entries }
    }

    /// Entries to replay for `mode`. Does not consume the queue.
    pub fn select_for_apply(&self, mode: DeferredApplyMode) -> Vec<&DeferredEnvelope> {
        match mode {
            DeferredApplyMode::ApplyAll => self.entries.iter().collect(),
            DeferredApplyMode::LatestOnly => self.entries.back().into_iter().collect(),
        }
    }

    /// Version of the newest entry whose version is known.
    ///
    /// Entries with neither counter are skipped; an all-unknown queue yields
    /// [`RemoteVersion::UNKNOWN`].
    pub fn latest_known_version(&self) -> RemoteVersion {
        self.entries
            .iter()
            .rev()
            .map(DeferredEnvelope::version)
            .find(RemoteVersion::is_known)
            .unwrap_or(RemoteVersion::UNKNOWN)
    }

    pub fn last(&self) -> Option<&DeferredEnvelope> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeferredEnvelope> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Free-function form of [`DeferredQueue::pushed`].
pub fn push(queue: &DeferredQueue, entry: DeferredEnvelope, limit: usize) -> DeferredQueue {
    queue.pushed(entry, limit)
}

/// Free-function form of [`DeferredQueue::select_for_apply`].
pub fn select_for_apply(queue: &DeferredQueue, mode: DeferredApplyMode) -> Vec<&DeferredEnvelope> {
    queue.select_for_apply(mode)
}
