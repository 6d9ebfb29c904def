//! Scene state record owned by the session.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::deferred::{DeferredQueue, PatchKind};
use crate::pose::{default_pose, PoseJoints};
use crate::scene::{Avatar, Placement, Room, SceneBaseline};
use crate::version::RemoteVersion;

pub const DEFAULT_SCENE_ID: &str = "scene-1";

/// Where the current placements came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneSource {
    #[default]
    Default,
    Scene,
    LocalEdit,
}

/// Bridge connection status as seen by the state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoldState {
    pub enabled: bool,
    /// Hold was released over a non-empty queue and waits for an apply.
    pub pending_confirm: bool,
}

/// Set when a remote apply overwrote local edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOverride {
    pub kind: PatchKind,
    pub at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeMeta {
    pub enabled: bool,
    pub url: String,
    pub status: SessionStatus,
    pub error: Option<String>,
    pub last_pose_at: Option<Timestamp>,
    pub non_zero_axes: i64,
    pub sequence: i64,
}

/// Everything the host renders. Cheap to clone for undo snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneState {
    pub scene_id: String,
    pub source: SceneSource,
    pub placements: Vec<Placement>,
    pub room: Room,
    pub avatar: Avatar,
    pub pose: PoseJoints,
    pub revision: i64,
    pub sequence: i64,
    pub applied_version: RemoteVersion,
    pub deferred: DeferredQueue,
    pub hold: HoldState,
    pub remote_override: Option<RemoteOverride>,
    pub scene_error: Option<String>,
    pub selected_placement: Option<String>,
    pub edit_enabled: bool,
    pub last_event_at: Option<Timestamp>,
    pub bridge: BridgeMeta,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            scene_id: DEFAULT_SCENE_ID.to_string(),
            source: SceneSource::Default,
            placements: Vec::new(),
            room: Room::default(),
            avatar: Avatar::default(),
            pose: default_pose(),
            revision: 0,
            sequence: 0,
            applied_version: RemoteVersion::UNKNOWN,
            deferred: DeferredQueue::new(),
            hold: HoldState::default(),
            remote_override: None,
            scene_error: None,
            selected_placement: None,
            edit_enabled: true,
            last_event_at: None,
            bridge: BridgeMeta::default(),
        }
    }
}

impl SceneState {
    pub fn baseline(&self) -> SceneBaseline<'_> {
        SceneBaseline {
            placements: &self.placements,
            room: &self.room,
            avatar: &self.avatar,
        }
    }

    pub fn placement(&self, id: &str) -> Option<&Placement> {
        self.placements.iter().find(|placement| placement.id == id)
    }
}

/// Uncommitted authored changes exist that a blind remote apply would
/// destroy.
pub fn has_local_edits(state: &SceneState, undo_depth: usize, redo_depth: usize) -> bool {
    state.source == SceneSource::LocalEdit || undo_depth > 0 || redo_depth > 0
}
