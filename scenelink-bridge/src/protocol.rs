//! Inbound wire protocol.
//!
//! Every frame is a JSON object with a required `kind`:
//!
//! | `kind`                                               | Classified as   |
//! |------------------------------------------------------|-----------------|
//! | `bridge_error`                                       | `BridgeError`   |
//! | `bridge_pose`                                        | `BridgePose`    |
//! | `bridge_scene_patch`, `scene_patch`                  | `Scene(patch)`  |
//! | `bridge_scene_snapshot`, `scene_snapshot`, `scene_update` | `Scene(snapshot)` |
//! | anything else                                        | `Other`         |
//!
//! Non-objects and objects without a usable `kind` are `Invalid`.

use serde_json::Value;
use thiserror::Error;

use scenelink_core::clock::Timestamp;
use scenelink_core::deferred::PatchKind;
use scenelink_core::json::{as_object, first_of, read_integer, read_text, read_timestamp, Object};

/// Frame-level decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    InvalidJson(String),
}

/// Why an inbound value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    NotObject,
    MissingKind,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotObject => "not_object",
            Self::MissingKind => "missing_kind",
        }
    }
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Invalid {
        reason: InvalidReason,
    },
    BridgeError {
        detail: Option<String>,
        message: Value,
    },
    BridgePose {
        message: Value,
        non_zero_axes: Option<i64>,
        sequence: Option<i64>,
        received_at: Option<Timestamp>,
    },
    Scene {
        kind: PatchKind,
        raw_kind: String,
        message: Value,
    },
    Other {
        kind: String,
        message: Value,
    },
}

impl InboundMessage {
    /// Wire `kind`, or `invalid`.
    pub fn kind(&self) -> &str {
        match self {
            Self::Invalid { .. } => "invalid",
            Self::BridgeError { .. } => "bridge_error",
            Self::BridgePose { .. } => "bridge_pose",
            Self::Scene { raw_kind, .. } => raw_kind,
            Self::Other { kind, .. } => kind,
        }
    }

    pub fn message(&self) -> Option<&Value> {
        match self {
            Self::Invalid { .. } => None,
            Self::BridgeError { message, .. }
            | Self::BridgePose { message, .. }
            | Self::Scene { message, .. }
            | Self::Other { message, .. } => Some(message),
        }
    }
}

/// Scene payload flavour for a wire `kind`.
pub fn scene_kind(kind: &str) -> Option<PatchKind> {
    match kind {
        "bridge_scene_patch" | "scene_patch" => Some(PatchKind::ScenePatch),
        "bridge_scene_snapshot" | "scene_snapshot" | "scene_update" => Some(PatchKind::SceneSnapshot),
        _ => None,
    }
}

/// Parse a text frame into JSON.
pub fn decode_frame(text: &str) -> Result<Value, ProtocolError> {
    serde_json::from_str(text).map_err(|err| ProtocolError::InvalidJson(err.to_string()))
}

fn read_received_at(packet: &Object) -> Option<Timestamp> {
    let raw = first_of(packet, &["receivedAt", "timestamp"])?;
    let at = read_timestamp(Some(raw));
    if at.is_none() {
        log::warn!("unreadable bridge_pose receivedAt {raw}");
    }
    at
}

/// Classify a decoded inbound value.
pub fn parse_inbound(value: &Value) -> InboundMessage {
    let Some(packet) = as_object(value) else {
        return InboundMessage::Invalid {
            reason: InvalidReason::NotObject,
        };
    };
    let Some(kind) = read_text(packet.get("kind")) else {
        return InboundMessage::Invalid {
            reason: InvalidReason::MissingKind,
        };
    };

    match kind.as_str() {
        "bridge_error" => InboundMessage::BridgeError {
            detail: read_text(first_of(packet, &["details", "message", "code"])),
            message: value.clone(),
        },
        "bridge_pose" => InboundMessage::BridgePose {
            message: value.clone(),
            non_zero_axes: read_integer(packet.get("nonZeroAxes")),
            sequence: read_integer(packet.get("sequence")),
            received_at: read_received_at(packet),
        },
        other => match scene_kind(other) {
            Some(patch_kind) => InboundMessage::Scene {
                kind: patch_kind,
                raw_kind: kind,
                message: value.clone(),
            },
            None => InboundMessage::Other {
                kind,
                message: value.clone(),
            },
        },
    }
}
