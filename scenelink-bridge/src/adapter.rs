//! Inbound messages and transport events → session state.

use serde_json::{json, Value};

use scenelink_core::clock::{now_millis, Timestamp};
use scenelink_core::deferred::PatchKind;
use scenelink_core::events::{infer_event_source, summarize_event, EventInput, EventLevel};
use scenelink_core::session::SceneSession;

use crate::protocol::{parse_inbound, InboundMessage};
use crate::transport::{LifecycleEvent, TransportEvent};

const TRANSPORT_SOURCE: &str = "frontend.bridge";
const INBOUND_SOURCE: &str = "bridge.inbound";

/// A single state change derived from an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeAction {
    SetBridgeError(Option<String>),
    ApplyPoseSnapshot(Value),
    SetBridgeMeta {
        non_zero_axes: i64,
        sequence: i64,
        at: Timestamp,
    },
    ApplyScene {
        kind: PatchKind,
        message: Value,
    },
}

/// State the adapter writes to.
pub trait BridgeStatePort {
    fn set_bridge_error(&mut self, error: Option<String>);
    fn apply_pose_snapshot(&mut self, payload: &Value);
    fn set_bridge_meta(&mut self, non_zero_axes: i64, sequence: i64, at: Timestamp);
    fn apply_scene(&mut self, kind: PatchKind, message: &Value);
}

impl BridgeStatePort for SceneSession {
    fn set_bridge_error(&mut self, error: Option<String>) {
        SceneSession::set_bridge_error(self, error);
    }

    fn apply_pose_snapshot(&mut self, payload: &Value) {
        SceneSession::apply_pose_snapshot(self, payload);
    }

    fn set_bridge_meta(&mut self, non_zero_axes: i64, sequence: i64, at: Timestamp) {
        SceneSession::set_bridge_meta(self, non_zero_axes, sequence, at);
    }

    fn apply_scene(&mut self, kind: PatchKind, message: &Value) {
        self.apply_remote(kind, message);
    }
}

pub fn map_inbound_to_actions(message: &InboundMessage) -> Vec<BridgeAction> {
    match message {
        InboundMessage::BridgeError { detail, .. } => vec![BridgeAction::SetBridgeError(Some(
            detail.clone().unwrap_or_else(|| "bridge_error".to_string()),
        ))],
        InboundMessage::BridgePose {
            message,
            non_zero_axes,
            sequence,
            received_at,
        } => vec![
            BridgeAction::ApplyPoseSnapshot(message.clone()),
            BridgeAction::SetBridgeMeta {
                non_zero_axes: non_zero_axes.unwrap_or(0),
                sequence: sequence.unwrap_or(0),
                at: received_at.unwrap_or_else(now_millis),
            },
            BridgeAction::SetBridgeError(None),
        ],
        InboundMessage::Scene { kind, message, .. } => vec![
            BridgeAction::ApplyScene {
                kind: *kind,
                message: message.clone(),
            },
            BridgeAction::SetBridgeError(None),
        ],
        InboundMessage::Invalid { .. } | InboundMessage::Other { .. } => Vec::new(),
    }
}

pub fn apply_actions<P: BridgeStatePort>(port: &mut P, actions: Vec<BridgeAction>) {
    for action in actions {
        match action {
            BridgeAction::SetBridgeError(error) => port.set_bridge_error(error),
            BridgeAction::ApplyPoseSnapshot(payload) => port.apply_pose_snapshot(&payload),
            BridgeAction::SetBridgeMeta {
                non_zero_axes,
                sequence,
                at,
            } => port.set_bridge_meta(non_zero_axes, sequence, at),
            BridgeAction::ApplyScene { kind, message } => port.apply_scene(kind, &message),
        }
    }
}

/// Event log entry for a lifecycle transition.
pub fn lifecycle_event_input(event: &LifecycleEvent) -> EventInput {
    let input = EventInput::new(event.kind(), TRANSPORT_SOURCE);
    match event {
        LifecycleEvent::Connecting { url } => input
            .summary(format!("connecting {url}"))
            .payload(json!({ "url": url })),
        LifecycleEvent::Connected { url } => input
            .summary(format!("connected {url}"))
            .payload(json!({ "url": url })),
        LifecycleEvent::Disconnected { url, will_reconnect } => {
            let (level, summary) = if *will_reconnect {
                (EventLevel::Warn, format!("disconnected {url} (reconnect pending)"))
            } else {
                (EventLevel::Info, format!("disconnected {url}"))
            };
            input
                .level(level)
                .summary(summary)
                .payload(json!({ "url": url, "willReconnect": will_reconnect }))
        }
        LifecycleEvent::ReconnectScheduled { delay } => {
            let delay_ms = delay.as_millis() as u64;
            input
                .level(EventLevel::Warn)
                .summary(format!("reconnect in {delay_ms}ms"))
                .payload(json!({ "delayMs": delay_ms }))
        }
        LifecycleEvent::SocketCreateError { url, error } => input
            .level(EventLevel::Error)
            .summary(format!("socket create failed: {error}"))
            .payload(json!({ "url": url, "error": error })),
        LifecycleEvent::SocketError { error } => input
            .level(EventLevel::Error)
            .summary(format!("socket error: {error}"))
            .payload(json!({ "error": error })),
        LifecycleEvent::InboundJsonInvalid { error } => EventInput::new(event.kind(), INBOUND_SOURCE)
            .level(EventLevel::Warn)
            .summary(error.clone())
            .payload(json!({ "error": error })),
        LifecycleEvent::SceneSubscribe { scene_id, sent } => {
            let level = if *sent { EventLevel::Info } else { EventLevel::Warn };
            EventInput::new(event.kind(), "frontend.scene")
                .level(level)
                .summary(format!("subscribe scene:{scene_id}"))
                .payload(json!({ "sceneId": scene_id, "sent": sent }))
        }
    }
}

/// Event log entry for an inbound message.
pub fn inbound_event_input(message: &InboundMessage) -> EventInput {
    match message {
        InboundMessage::Invalid { reason } => EventInput::new("bridge_inbound_invalid", INBOUND_SOURCE)
            .level(EventLevel::Warn)
            .summary(format!("invalid inbound: {}", reason.as_str()))
            .payload(json!({ "reason": reason.as_str() })),
        _ => {
            let kind = message.kind();
            let payload = message.message();
            let level = match message {
                InboundMessage::BridgeError { .. } => EventLevel::Error,
                InboundMessage::BridgePose { .. } => EventLevel::Debug,
                _ => EventLevel::Info,
            };
            let mut input = EventInput::new(kind, infer_event_source(kind, payload, INBOUND_SOURCE))
                .level(level)
                .summary(format!("in {}", summarize_event(kind, payload)));
            if let Some(payload) = payload {
                input = input.payload(payload.clone());
            }
            input
        }
    }
}

/// Route drained transport events into the session.
pub fn route_transport_events(session: &mut SceneSession, events: Vec<TransportEvent>) {
    for event in events {
        match event {
            TransportEvent::Status(status) => session.set_bridge_status(status),
            TransportEvent::Error(error) => SceneSession::set_bridge_error(session, error),
            TransportEvent::Lifecycle(lifecycle) => session.log_event(lifecycle_event_input(&lifecycle)),
            TransportEvent::Inbound(value) => {
                let message = parse_inbound(&value);
                session.log_event(inbound_event_input(&message));
                apply_actions(session, map_inbound_to_actions(&message));
            }
            TransportEvent::Outbound { payload, sent } => session.record_outbound(&payload, sent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenelink_core::config::RuntimeConfig;
    use scenelink_core::state::{SceneSource, SessionStatus};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingPort {
        calls: Vec<String>,
    }

    impl BridgeStatePort for RecordingPort {
        fn set_bridge_error(&mut self, error: Option<String>) {
            self.calls.push(format!("error:{}", error.unwrap_or_default()));
        }

        fn apply_pose_snapshot(&mut self, _payload: &Value) {
            self.calls.push("pose".into());
        }

        fn set_bridge_meta(&mut self, non_zero_axes: i64, sequence: i64, _at: Timestamp) {
            self.calls.push(format!("meta:{non_zero_axes}:{sequence}"));
        }

        fn apply_scene(&mut self, kind: PatchKind, _message: &Value) {
            self.calls.push(format!("scene:{}", kind.as_str()));
        }
    }

    #[test]
    fn test_error_defaults_detail() {
        let actions = map_inbound_to_actions(&parse_inbound(&json!({ "kind": "bridge_error" })));
        assert_eq!(actions, vec![BridgeAction::SetBridgeError(Some("bridge_error".into()))]);
    }

    #[test]
    fn test_pose_actions_in_order() {
        let mut port = RecordingPort::default();
        let message = parse_inbound(&json!({ "kind": "bridge_pose", "nonZeroAxes": 4 }));
        apply_actions(&mut port, map_inbound_to_actions(&message));
        assert_eq!(port.calls, vec!["pose", "meta:4:0", "error:"]);
    }

    #[test]
    fn test_other_and_invalid_do_nothing() {
        assert!(map_inbound_to_actions(&parse_inbound(&json!({ "kind": "hello" }))).is_empty());
        assert!(map_inbound_to_actions(&parse_inbound(&json!(42))).is_empty());
    }

    #[test]
    fn test_route_applies_scene_snapshot() {
        let mut session = SceneSession::new(RuntimeConfig::default());
        session.set_bridge_error(Some("stale".into()));
        let snapshot = json!({
            "kind": "scene_snapshot",
            "revision": 3,
            "scene": { "placements": [{ "id": "p1", "assetId": "chair", "positionM": [1.0, 2.0] }] },
        });
        route_transport_events(
            &mut session,
            vec![
                TransportEvent::Status(SessionStatus::Connected),
                TransportEvent::Inbound(snapshot),
            ],
        );
        assert_eq!(session.state().bridge.status, SessionStatus::Connected);
        assert_eq!(session.state().source, SceneSource::Scene);
        assert_eq!(session.state().placements.len(), 1);
        assert_eq!(session.state().bridge.error, None);
        assert!(session.events().last_of_kind("scene_snapshot").is_some());
    }

    #[test]
    fn test_route_logs_lifecycle_and_outbound() {
        let mut session = SceneSession::new(RuntimeConfig::default());
        route_transport_events(
            &mut session,
            vec![
                TransportEvent::Lifecycle(LifecycleEvent::ReconnectScheduled {
                    delay: Duration::from_millis(1200),
                }),
                TransportEvent::Outbound {
                    payload: json!({ "kind": "scene_subscribe", "sceneId": "scene-1" }),
                    sent: false,
                },
                TransportEvent::Inbound(json!("nope")),
            ],
        );
        let reconnect = session.events().last_of_kind("bridge_reconnect_scheduled").unwrap();
        assert_eq!(reconnect.level, EventLevel::Warn);
        assert_eq!(reconnect.summary, "reconnect in 1200ms");
        let outbound = session.events().last_of_kind("scene_subscribe").unwrap();
        assert!(outbound.summary.starts_with("out(drop)"));
        assert!(session.events().last_of_kind("bridge_inbound_invalid").is_some());
    }
}
