//! Outbound payload builders.

use serde_json::{json, Value};

use scenelink_core::engine::CommandMeta;
use scenelink_core::session::SceneEffect;

/// `{kind: "scene_subscribe", sceneId}`.
pub fn scene_subscribe(scene_id: &str) -> Value {
    json!({ "kind": "scene_subscribe", "sceneId": scene_id })
}

/// `{kind: "scene_patch", sceneId, patch}` plus command metadata when known.
pub fn scene_patch(scene_id: &str, patch: Value, meta: Option<&CommandMeta>) -> Value {
    let mut payload = json!({ "kind": "scene_patch", "sceneId": scene_id, "patch": patch });
    if let (Some(meta), Some(object)) = (meta, payload.as_object_mut()) {
        object.insert("commandId".into(), json!(meta.command_id));
        object.insert("commandAt".into(), json!(meta.at));
        object.insert("source".into(), json!(meta.source));
        if let Some(correlation_id) = &meta.correlation_id {
            object.insert("correlationId".into(), json!(correlation_id));
        }
    }
    payload
}

/// Outbound patch for a committed local edit, `None` when it changed nothing.
pub fn scene_patch_for_effect(effect: &SceneEffect) -> Option<Value> {
    let patch = effect.patch()?;
    Some(scene_patch(&effect.scene_id, patch, effect.meta.as_ref()))
}
