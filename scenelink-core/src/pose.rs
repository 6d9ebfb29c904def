//! Avatar joint pose fed by `bridge_pose` snapshots.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::json::{as_object, first_of, read_float, Object};
use crate::scene::Avatar;

/// Joint rotation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointAngles {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub type PoseJoints = BTreeMap<String, JointAngles>;

type AxisRange = (f64, f64);

/// Tracked joints with their `(x, y, z)` limits in degrees.
pub const JOINT_LIMITS: [(&str, [AxisRange; 3]); 10] = [
    ("torsoBase", [(-100.0, 100.0), (-70.0, 70.0), (-70.0, 70.0)]),
    ("head", [(-60.0, 60.0), (-75.0, 75.0), (-45.0, 45.0)]),
    ("leftUpperArm", [(-100.0, 85.0), (-95.0, 95.0), (-95.0, 95.0)]),
    ("leftForearm", [(-10.0, 140.0), (-40.0, 40.0), (-55.0, 55.0)]),
    ("rightUpperArm", [(-100.0, 85.0), (-95.0, 95.0), (-95.0, 95.0)]),
    ("rightForearm", [(-10.0, 140.0), (-40.0, 40.0), (-55.0, 55.0)]),
    ("leftThigh", [(-120.0, 70.0), (-60.0, 60.0), (-60.0, 60.0)]),
    ("leftFoot", [(-60.0, 60.0), (-35.0, 35.0), (-35.0, 35.0)]),
    ("rightThigh", [(-120.0, 70.0), (-60.0, 60.0), (-60.0, 60.0)]),
    ("rightFoot", [(-60.0, 60.0), (-35.0, 35.0), (-35.0, 35.0)]),
];

/// Every tracked joint at zero.
pub fn default_pose() -> PoseJoints {
    JOINT_LIMITS
        .iter()
        .map(|(joint, _)| (joint.to_string(), JointAngles::default()))
        .collect()
}

fn clamp_axis(value: Option<f64>, current: f64, (min, max): AxisRange) -> f64 {
    match value {
        Some(value) => value.clamp(min, max),
        None => current,
    }
}

/// Avatar identity carried by a pose packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoseIdentity {
    pub object_id: Option<String>,
    pub track_id: Option<String>,
}

impl PoseIdentity {
    pub fn from_packet(packet: &Object) -> Self {
        let text = |keys: &[&str]| first_of(packet, keys).and_then(Value::as_str).map(str::to_string);
        Self {
            object_id: text(&["objectId", "object_id", "characterObjectId", "character_object_id"]),
            track_id: text(&["trackId", "track_id", "characterTrackId", "character_track_id"]),
        }
    }
}

/// Pose and avatar after a snapshot, or `None` when nothing changed.
///
/// Joints come from `packet.joints` or the payload itself. A packet for a
/// different tracked avatar is ignored. Axis values are clamped to the
/// joint limits; non-numeric axes keep their current value.
pub fn apply_pose_snapshot(pose: &PoseJoints, avatar: &Avatar, payload: &Value) -> Option<(PoseJoints, Avatar)> {
    let packet = as_object(payload)?;
    let joints = packet.get("joints").and_then(as_object).unwrap_or(packet);
    let identity = PoseIdentity::from_packet(packet);

    if let (Some(incoming), Some(current)) = (&identity.track_id, &avatar.track_id) {
        if incoming != current {
            log::debug!("pose for track {incoming} ignored, tracking {current}");
            return None;
        }
    }

    let mut next_pose = pose.clone();
    let mut changed = false;
    for (joint, [x_range, y_range, z_range]) in JOINT_LIMITS {
        let Some(values) = joints.get(joint).and_then(as_object) else {
            continue;
        };
        let current = pose.get(joint).copied().unwrap_or_default();
        let next = JointAngles {
            x: clamp_axis(read_float(values.get("x")), current.x, x_range),
            y: clamp_axis(read_float(values.get("y")), current.y, y_range),
            z: clamp_axis(read_float(values.get("z")), current.z, z_range),
        };
        if next != current {
            next_pose.insert(joint.to_string(), next);
            changed = true;
        }
    }

    let identity_changed = identity.track_id.as_ref().is_some_and(|id| avatar.track_id.as_ref() != Some(id))
        || identity.object_id.as_ref().is_some_and(|id| avatar.object_id.as_ref() != Some(id));
    if !changed && !identity_changed {
        return None;
    }

    let mut next_avatar = avatar.clone();
    if identity.track_id.is_some() {
        next_avatar.track_id = identity.track_id;
    }
    if identity.object_id.is_some() {
        next_avatar.object_id = identity.object_id;
    }
    Some((next_pose, next_avatar))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_pose_covers_every_joint() {
        let pose = default_pose();
        assert_eq!(pose.len(), JOINT_LIMITS.len());
        assert!(pose.values().all(|angles| *angles == JointAngles::default()));
    }

    #[test]
    fn test_snapshot_clamps_and_keeps_missing_axes() {
        let pose = default_pose();
        let (next, _) = apply_pose_snapshot(
            &pose,
            &Avatar::default(),
            &json!({ "joints": { "head": { "x": 500.0, "y": -10.0 }, "unknownJoint": { "x": 1.0 } } }),
        )
        .unwrap();
        assert_eq!(next["head"], JointAngles { x: 60.0, y: -10.0, z: 0.0 });
        assert!(!next.contains_key("unknownJoint"));
    }

    #[test]
    fn test_flat_payload_accepted() {
        let (next, _) =
            apply_pose_snapshot(&default_pose(), &Avatar::default(), &json!({ "leftFoot": { "z": 10 } })).unwrap();
        assert_eq!(next["leftFoot"].z, 10.0);
    }

    #[test]
    fn test_other_track_ignored() {
        let avatar = Avatar {
            track_id: Some("t-1".into()),
            ..Avatar::default()
        };
        let payload = json!({ "trackId": "t-2", "joints": { "head": { "x": 5 } } });
        assert!(apply_pose_snapshot(&default_pose(), &avatar, &payload).is_none());
    }

    #[test]
    fn test_identity_adopted() {
        let payload = json!({ "characterTrackId": "t-9", "objectId": "o-1" });
        let (_, avatar) = apply_pose_snapshot(&default_pose(), &Avatar::default(), &payload).unwrap();
        assert_eq!(avatar.track_id.as_deref(), Some("t-9"));
        assert_eq!(avatar.object_id.as_deref(), Some("o-1"));
    }

    #[test]
    fn test_unchanged_snapshot_is_none() {
        let payload = json!({ "joints": { "head": { "x": 0, "y": 0, "z": 0 } } });
        assert!(apply_pose_snapshot(&default_pose(), &Avatar::default(), &payload).is_none());
    }
}
