//! App command vocabulary and local scene commands.

use serde::{Deserialize, Serialize};

use crate::error::SceneError;
use crate::scene::Placement;

/// Every command the host can issue into the engine.
///
/// Serialized as `{"kind": "<snake_case>", ...camelCase fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AppCommand {
    RunSceneCommand { command: SceneCommand },
    UndoSceneEdit,
    RedoSceneEdit,
    ClearScene,
    ApplyDeferredSceneRemote,
    ClearSceneDeferredRemote,
    ClearSceneRemoteOverride,
    ToggleSceneRemoteHold,
    SetSceneRemoteHold { enabled: bool },
    ToggleSceneEdit,
    SetSelectedPlacement { placement_id: Option<String> },
    SetBridgeEnabled { enabled: bool },
    SetBridgeUrl { url: String },
    SetSceneId { scene_id: String },
    RequestEngineStats,
    RequestEngineSimPreview,
    SetEngineCapabilityEnabled { capability_id: String, enabled: bool },
    ClearSceneEventLog,
    SetSceneEventLogPaused { enabled: bool },
}

impl AppCommand {
    /// The serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunSceneCommand { .. } => "run_scene_command",
            Self::UndoSceneEdit => "undo_scene_edit",
            Self::RedoSceneEdit => "redo_scene_edit",
            Self::ClearScene => "clear_scene",
            Self::ApplyDeferredSceneRemote => "apply_deferred_scene_remote",
            Self::ClearSceneDeferredRemote => "clear_scene_deferred_remote",
            Self::ClearSceneRemoteOverride => "clear_scene_remote_override",
            Self::ToggleSceneRemoteHold => "toggle_scene_remote_hold",
            Self::SetSceneRemoteHold { .. } => "set_scene_remote_hold",
            Self::ToggleSceneEdit => "toggle_scene_edit",
            Self::SetSelectedPlacement { .. } => "set_selected_placement",
            Self::SetBridgeEnabled { .. } => "set_bridge_enabled",
            Self::SetBridgeUrl { .. } => "set_bridge_url",
            Self::SetSceneId { .. } => "set_scene_id",
            Self::RequestEngineStats => "request_engine_stats",
            Self::RequestEngineSimPreview => "request_engine_sim_preview",
            Self::SetEngineCapabilityEnabled { .. } => "set_engine_capability_enabled",
            Self::ClearSceneEventLog => "clear_scene_event_log",
            Self::SetSceneEventLogPaused { .. } => "set_scene_event_log_paused",
        }
    }
}

/// A local edit to the placement list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SceneCommand {
    UpsertPlacement { placement: Placement },
    RemovePlacement { id: String },
    MovePlacement { id: String, delta_m: [f64; 2] },
    RotatePlacement { id: String, delta_deg: f64 },
}

impl SceneCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpsertPlacement { .. } => "upsert_placement",
            Self::RemovePlacement { .. } => "remove_placement",
            Self::MovePlacement { .. } => "move_placement",
            Self::RotatePlacement { .. } => "rotate_placement",
        }
    }

    pub fn target_id(&self) -> &str {
        match self {
            Self::UpsertPlacement { placement } => &placement.id,
            Self::RemovePlacement { id } | Self::MovePlacement { id, .. } | Self::RotatePlacement { id, .. } => id,
        }
    }

    /// Undo label, e.g. `move_placement chair-1`.
    pub fn label(&self) -> String {
        format!("{} {}", self.kind(), self.target_id())
    }

    /// Placements after the command, `Ok(None)` when nothing would change.
    pub fn apply(&self, placements: &[Placement]) -> Result<Option<Vec<Placement>>, SceneError> {
        match self {
            Self::UpsertPlacement { placement } => {
                validate(placement)?;
                let mut next = placements.to_vec();
                match next.iter().position(|existing| existing.id == placement.id) {
                    Some(index) if next[index] == *placement => return Ok(None),
                    Some(index) => next[index] = placement.clone(),
                    None => next.push(placement.clone()),
                }
                Ok(Some(next))
            }
            Self::RemovePlacement { id } => {
                find(placements, id)?;
                Ok(Some(placements.iter().filter(|placement| &placement.id != id).cloned().collect()))
            }
            Self::MovePlacement { id, delta_m } => {
                find(placements, id)?;
                if !delta_m.iter().all(|delta| delta.is_finite()) {
                    return Err(SceneError::InvalidPlacement(format!("non-finite move for {id}")));
                }
                if delta_m == &[0.0, 0.0] {
                    return Ok(None);
                }
                Ok(Some(edit(placements, id, |placement| {
                    placement.position_m[0] += delta_m[0];
                    placement.position_m[1] += delta_m[1];
                })))
            }
            Self::RotatePlacement { id, delta_deg } => {
                let current = find(placements, id)?;
                if !delta_deg.is_finite() {
                    return Err(SceneError::InvalidPlacement(format!("non-finite rotation for {id}")));
                }
                let rotation_deg = normalize_degrees(current.rotation_deg + delta_deg);
                if rotation_deg == current.rotation_deg {
                    return Ok(None);
                }
                Ok(Some(edit(placements, id, |placement| placement.rotation_deg = rotation_deg)))
            }
        }
    }
}

fn find<'a>(placements: &'a [Placement], id: &str) -> Result<&'a Placement, SceneError> {
    placements
        .iter()
        .find(|placement| placement.id == id)
        .ok_or_else(|| SceneError::PlacementNotFound(id.to_string()))
}

fn edit(placements: &[Placement], id: &str, change: impl Fn(&mut Placement)) -> Vec<Placement> {
    let mut next = placements.to_vec();
    next.iter_mut().filter(|placement| placement.id == id).for_each(change);
    next
}

fn validate(placement: &Placement) -> Result<(), SceneError> {
    if placement.id.trim().is_empty() || placement.asset_id.trim().is_empty() {
        return Err(SceneError::InvalidPlacement("id and assetId are required".into()));
    }
    if !placement.position_m.iter().all(|axis| axis.is_finite()) || !placement.rotation_deg.is_finite() {
        return Err(SceneError::InvalidPlacement(format!("non-finite transform for {}", placement.id)));
    }
    Ok(())
}

/// Wrap into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
