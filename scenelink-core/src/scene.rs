//! Scene model and remote payload parsing.
//!
//! Remote scene messages come in two shapes:
//!
//! | Kind     | Body                                              |
//! |----------|---------------------------------------------------|
//! | snapshot | `{scene: {placements, room?, avatar?}}` or flat   |
//! | patch    | `{patch: {removes?, upserts?, room?, avatar?}}`   |
//!
//! Both are parsed against a baseline (current placements, room and
//! avatar). Anything the message omits falls back to the baseline.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::clock::{now_millis, Timestamp};
use crate::deferred::PatchKind;
use crate::json::{as_object, first_of, read_float, read_integer, read_pair, read_text, read_timestamp, Object};
use crate::version::RemoteVersion;

/// One placed asset on the floor plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub id: String,
    pub asset_id: String,
    /// `[x, z]` in metres.
    pub position_m: [f64; 2],
    #[serde(default)]
    pub rotation_deg: f64,
}

impl Placement {
    pub fn new(id: impl Into<String>, asset_id: impl Into<String>, position_m: [f64; 2]) -> Self {
        Self {
            id: id.into(),
            asset_id: asset_id.into(),
            position_m,
            rotation_deg: 0.0,
        }
    }

    /// Parse one placement. Requires non-blank `id` and `assetId` and a
    /// finite position.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = as_object(value)?;
        Some(Self {
            id: read_text(first_of(object, &["id"]))?,
            asset_id: read_text(first_of(object, &["assetId", "asset_id"]))?,
            position_m: read_pair(first_of(object, &["positionM", "position_m"]))?,
            rotation_deg: match first_of(object, &["rotationDeg", "rotation_deg"]) {
                Some(value) => read_float(Some(value))?,
                None => 0.0,
            },
        })
    }
}

/// Room bounds in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub width_m: f64,
    pub depth_m: f64,
    pub height_m: f64,
}

impl Default for Room {
    fn default() -> Self {
        Self {
            width_m: 6.0,
            depth_m: 4.0,
            height_m: 2.8,
        }
    }
}

impl Room {
    fn from_value(value: &Value) -> Option<Self> {
        let object = as_object(value)?;
        let dimension = |keys: &[&str]| read_float(first_of(object, keys)).filter(|metres| *metres > 0.0);
        Some(Self {
            width_m: dimension(&["widthM", "width_m"])?,
            depth_m: dimension(&["depthM", "depth_m"])?,
            height_m: dimension(&["heightM", "height_m"])?,
        })
    }
}

/// Tracked avatar pose on the plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Avatar {
    pub object_id: Option<String>,
    pub track_id: Option<String>,
    pub plan_position_m: [f64; 2],
    pub rotation_deg: f64,
}

impl Avatar {
    /// Overlay the fields present in `value` on top of `base`.
    fn merged_from(value: &Value, base: &Avatar) -> Option<Self> {
        let object = as_object(value)?;
        Some(Self {
            object_id: read_text(first_of(object, &["objectId", "object_id"])).or_else(|| base.object_id.clone()),
            track_id: read_text(first_of(object, &["trackId", "track_id"])).or_else(|| base.track_id.clone()),
            plan_position_m: read_pair(first_of(object, &["planPositionM", "plan_position_m"]))
                .unwrap_or(base.plan_position_m),
            rotation_deg: read_float(first_of(object, &["rotationDeg", "rotation_deg"])).unwrap_or(base.rotation_deg),
        })
    }
}

/// Current scene content a remote message is parsed against.
#[derive(Debug, Clone, Copy)]
pub struct SceneBaseline<'a> {
    pub placements: &'a [Placement],
    pub room: &'a Room,
    pub avatar: &'a Avatar,
}

/// Result of parsing a remote scene message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScene {
    pub scene_id: Option<String>,
    pub placements: Vec<Placement>,
    pub room: Room,
    pub avatar: Avatar,
    pub revision: Option<i64>,
    pub sequence: Option<i64>,
    pub received_at: Timestamp,
}

impl ParsedScene {
    pub fn version(&self) -> RemoteVersion {
        RemoteVersion::new(self.revision, self.sequence)
    }
}

struct Envelope {
    scene_id: Option<String>,
    revision: Option<i64>,
    sequence: Option<i64>,
    received_at: Timestamp,
}

fn read_envelope(object: &Object) -> Envelope {
    let received_at = match first_of(object, &["receivedAt", "timestamp"]) {
        Some(raw) => read_timestamp(Some(raw)).unwrap_or_else(|| {
            log::warn!("unreadable scene receivedAt {raw}, using arrival time");
            now_millis()
        }),
        None => now_millis(),
    };
    Envelope {
        scene_id: read_text(first_of(object, &["sceneId", "scene_id"])),
        revision: read_integer(object.get("revision")),
        sequence: read_integer(object.get("sequence")),
        received_at,
    }
}

fn read_placements(value: &Value) -> Option<Vec<Placement>> {
    value.as_array()?.iter().map(Placement::from_value).collect()
}

fn overlay_room_and_avatar(body: &Object, baseline: &SceneBaseline<'_>) -> (Room, Avatar) {
    let room = body.get("room").and_then(Room::from_value).unwrap_or(*baseline.room);
    let avatar = body
        .get("avatar")
        .and_then(|value| Avatar::merged_from(value, baseline.avatar))
        .unwrap_or_else(|| baseline.avatar.clone());
    (room, avatar)
}

/// Parse a full scene snapshot.
///
/// Returns `None` when `placements` is missing or any entry is invalid.
pub fn parse_scene_snapshot(message: &Value, baseline: SceneBaseline<'_>) -> Option<ParsedScene> {
    let object = as_object(message)?;
    let body = object.get("scene").and_then(as_object).unwrap_or(object);
    let placements = read_placements(body.get("placements")?)?;
    let (room, avatar) = overlay_room_and_avatar(body, &baseline);
    let envelope = read_envelope(object);
    Some(ParsedScene {
        scene_id: envelope.scene_id,
        placements,
        room,
        avatar,
        revision: envelope.revision,
        sequence: envelope.sequence,
        received_at: envelope.received_at,
    })
}

/// Apply a scene patch to the baseline placements.
///
/// Removes are applied first, then upserts replace by id or append.
pub fn parse_scene_patch(message: &Value, baseline: SceneBaseline<'_>) -> Option<ParsedScene> {
    let object = as_object(message)?;
    let patch = object.get("patch").and_then(as_object)?;

    let removes: HashSet<String> = match patch.get("removes") {
        Some(Value::Array(ids)) => ids.iter().filter_map(|id| read_text(Some(id))).collect(),
        Some(Value::Null) | None => HashSet::new(),
        Some(_) => return None,
    };
    let upserts = match patch.get("upserts") {
        Some(Value::Null) | None => Vec::new(),
        Some(value) => read_placements(value)?,
    };

    let mut placements: Vec<Placement> = baseline
        .placements
        .iter()
        .filter(|placement| !removes.contains(&placement.id))
        .cloned()
        .collect();
    for upsert in upserts {
        match placements.iter_mut().find(|placement| placement.id == upsert.id) {
            Some(existing) => *existing = upsert,
            None => placements.push(upsert),
        }
    }

    let (room, avatar) = overlay_room_and_avatar(patch, &baseline);
    let envelope = read_envelope(object);
    Some(ParsedScene {
        scene_id: envelope.scene_id,
        placements,
        room,
        avatar,
        revision: envelope.revision,
        sequence: envelope.sequence,
        received_at: envelope.received_at,
    })
}

/// Dispatch to the parser for `kind`.
pub fn parse_scene_message(kind: PatchKind, message: &Value, baseline: SceneBaseline<'_>) -> Option<ParsedScene> {
    match kind {
        PatchKind::ScenePatch => parse_scene_patch(message, baseline),
        PatchKind::SceneSnapshot => parse_scene_snapshot(message, baseline),
    }
}

/// Diff two placement lists into `{upserts, removes}`.
///
/// `None` when the lists hold the same placements.
pub fn build_scene_patch(previous: &[Placement], next: &[Placement]) -> Option<Value> {
    let upserts: Vec<&Placement> = next
        .iter()
        .filter(|placement| !previous.contains(placement))
        .collect();
    let next_ids: HashSet<&str> = next.iter().map(|placement| placement.id.as_str()).collect();
    let removes: Vec<&str> = previous
        .iter()
        .map(|placement| placement.id.as_str())
        .filter(|id| !next_ids.contains(id))
        .collect();

    if upserts.is_empty() && removes.is_empty() {
        return None;
    }
    Some(json!({ "upserts": upserts, "removes": removes }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_placements() -> Vec<Placement> {
        vec![
            Placement::new("p-1", "shelf", [0.0, 0.0]),
            Placement::new("p-2", "fridge", [1.0, 2.0]),
        ]
    }

    fn with_baseline<R>(placements: &[Placement], f: impl FnOnce(SceneBaseline<'_>) -> R) -> R {
        let room = Room::default();
        let avatar = Avatar::default();
        f(SceneBaseline {
            placements,
            room: &room,
            avatar: &avatar,
        })
    }

    #[test]
    fn test_snapshot_nested_scene() {
        let message = json!({
            "kind": "scene_snapshot",
            "sceneId": "scene-7",
            "sequence": 3,
            "receivedAt": 1_700,
            "scene": {
                "placements": [{ "id": "a", "assetId": "shelf", "positionM": [1, 1] }],
                "room": { "widthM": 10, "depthM": 8, "heightM": 3 }
            }
        });
        let parsed = with_baseline(&base_placements(), |base| parse_scene_snapshot(&message, base)).unwrap();
        assert_eq!(parsed.scene_id.as_deref(), Some("scene-7"));
        assert_eq!(parsed.placements.len(), 1);
        assert_eq!(parsed.room.width_m, 10.0);
        assert_eq!(parsed.version(), RemoteVersion::with_sequence(3));
        assert_eq!(parsed.received_at, 1_700);
    }

    #[test]
    fn test_received_at_accepts_iso_strings() {
        let message = json!({
            "kind": "scene_snapshot",
            "receivedAt": "2024-01-01T00:00:00Z",
            "placements": [{ "id": "a", "assetId": "shelf", "positionM": [0, 0] }]
        });
        let parsed = with_baseline(&[], |base| parse_scene_snapshot(&message, base)).unwrap();
        assert_eq!(parsed.received_at, 1_704_067_200_000);

        let patch = json!({ "timestamp": "2024-01-01T00:00:01.500Z", "patch": { "removes": ["p-1"] } });
        let parsed = with_baseline(&base_placements(), |base| parse_scene_patch(&patch, base)).unwrap();
        assert_eq!(parsed.received_at, 1_704_067_201_500);
    }

    #[test]
    fn test_unreadable_received_at_uses_arrival_time() {
        let before = now_millis();
        let message = json!({ "receivedAt": "not a date", "placements": [] });
        let parsed = with_baseline(&[], |base| parse_scene_snapshot(&message, base)).unwrap();
        assert!(parsed.received_at >= before);
    }

    #[test]
    fn test_snapshot_flat_and_room_fallback() {
        let message = json!({ "placements": [], "revision": "4" });
        let parsed = with_baseline(&base_placements(), |base| parse_scene_snapshot(&message, base)).unwrap();
        assert!(parsed.placements.is_empty());
        assert_eq!(parsed.room, Room::default());
        assert_eq!(parsed.revision, Some(4));
    }

    #[test]
    fn test_snapshot_rejects_invalid_placement() {
        let message = json!({ "placements": [{ "id": "a", "positionM": [0, 0] }] });
        assert!(with_baseline(&[], |base| parse_scene_snapshot(&message, base)).is_none());
        let missing = json!({ "scene": {} });
        assert!(with_baseline(&[], |base| parse_scene_snapshot(&missing, base)).is_none());
    }

    #[test]
    fn test_patch_removes_then_upserts() {
        let message = json!({
            "kind": "scene_patch",
            "patch": {
                "removes": ["p-1"],
                "upserts": [
                    { "id": "p-2", "assetId": "fridge", "positionM": [5, 5], "rotationDeg": 90 },
                    { "id": "p-3", "assetId": "table", "positionM": [2, 2] }
                ]
            }
        });
        let parsed = with_baseline(&base_placements(), |base| parse_scene_patch(&message, base)).unwrap();
        let ids: Vec<_> = parsed.placements.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p-2", "p-3"]);
        assert_eq!(parsed.placements[0].position_m, [5.0, 5.0]);
        assert_eq!(parsed.placements[0].rotation_deg, 90.0);
    }

    #[test]
    fn test_patch_requires_patch_object() {
        let message = json!({ "kind": "scene_patch", "upserts": [] });
        assert!(with_baseline(&base_placements(), |base| parse_scene_patch(&message, base)).is_none());
    }

    #[test]
    fn test_patch_avatar_overlays_baseline() {
        let room = Room::default();
        let avatar = Avatar {
            object_id: Some("obj".into()),
            track_id: Some("t-1".into()),
            plan_position_m: [1.0, 1.0],
            rotation_deg: 10.0,
        };
        let message = json!({ "patch": { "avatar": { "rotationDeg": 45 } } });
        let parsed = parse_scene_patch(
            &message,
            SceneBaseline {
                placements: &[],
                room: &room,
                avatar: &avatar,
            },
        )
        .unwrap();
        assert_eq!(parsed.avatar.track_id.as_deref(), Some("t-1"));
        assert_eq!(parsed.avatar.plan_position_m, [1.0, 1.0]);
        assert_eq!(parsed.avatar.rotation_deg, 45.0);
    }

    #[test]
    fn test_build_scene_patch() {
        let previous = base_placements();
        let mut next = previous.clone();
        next[1].position_m = [3.0, 3.0];
        next.remove(0);
        next.push(Placement::new("p-9", "crate", [0.0, 1.0]));

        let patch = build_scene_patch(&previous, &next).unwrap();
        assert_eq!(patch["removes"], json!(["p-1"]));
        let upserted: Vec<_> = patch["upserts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(upserted, vec!["p-2", "p-9"]);

        assert!(build_scene_patch(&previous, &previous).is_none());
    }

    #[test]
    fn test_placement_serializes_camel_case() {
        let value = serde_json::to_value(Placement::new("a", "shelf", [1.0, 2.0])).unwrap();
        assert_eq!(
            value,
            json!({ "id": "a", "assetId": "shelf", "positionM": [1.0, 2.0], "rotationDeg": 0.0 })
        );
    }
}
