//! The local editing session.
//!
//! `SceneSession` owns the scene state, the undo history, the event log and
//! the runtime config. Hosts inject it into the command engine (as the
//! [`CommandPort`]) and into the bridge adapter; nothing reaches it through
//! globals.
//!
//! ```text
//!  bridge inbound ──► apply_remote ──► reduce_incoming ──┐
//!  AppCommand ──► CommandEngine ──► execute ─────────────┼──► SceneState
//!                                    │                   │      + history
//!                                    └► run_scene_command┘      + event log
//!                                                │
//!                                                ▼
//!                                     HostEffect queue (publish, bridge, caps)
//! ```
//!
//! Effects the session cannot perform itself (socket I/O, registry toggles)
//! are queued as [`HostEffect`]s and drained by the host with
//! [`SceneSession::take_effects`].

use serde_json::{json, Value};

use crate::clock::Timestamp;
use crate::commands::{AppCommand, SceneCommand};
use crate::config::RuntimeConfig;
use crate::deferred::{DeferredQueue, PatchKind};
use crate::engine::{CapabilityFailure, CapabilityStatus, CommandEnvelope, CommandMeta, CommandPort, EventEnvelope, ToggleOutcome};
use crate::error::SceneError;
use crate::events::{infer_event_source, summarize_event, EventInput, EventLevel, EventLog};
use crate::json::{as_object, read_text};
use crate::pose;
use crate::reduce::{
    reduce_hold_enabled, reduce_incoming, select_for_apply_and_reduce, DeferredApplyOutcome, IncomingOutcome,
    IncomingSettings, Reduced,
};
use crate::scene::{build_scene_patch, Placement};
use crate::state::{has_local_edits, SceneSource, SceneState, SessionStatus, DEFAULT_SCENE_ID};
use crate::sync::HoldTransition;
use crate::undo::{UndoEntry, UndoManager};
use crate::version::RemoteVersion;

const SCENE_SYNC_SOURCE: &str = "frontend.scene_sync";
const SCENE_ENGINE_SOURCE: &str = "frontend.scene_engine";
const COMMAND_BUS_SOURCE: &str = "frontend.command_bus";
const ENGINE_RUNTIME_SOURCE: &str = "frontend.engine_runtime";

/// A committed local change to the placements.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneEffect {
    pub scene_id: String,
    pub previous: Vec<Placement>,
    pub next: Vec<Placement>,
    pub meta: Option<CommandMeta>,
}

impl SceneEffect {
    /// `{upserts, removes}` diff, `None` when the lists match.
    pub fn patch(&self) -> Option<Value> {
        build_scene_patch(&self.previous, &self.next)
    }
}

/// Work the host performs on the session's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEffect {
    /// Publish a local edit as an outbound `scene_patch`.
    Publish(SceneEffect),
    SetBridgeEnabled(bool),
    SetBridgeUrl(String),
    /// Scene id changed; the transport should re-subscribe.
    SubscribeScene(String),
    SetCapabilityEnabled { capability_id: String, enabled: bool },
}

fn describe_version(version: &RemoteVersion) -> String {
    let counter = |value: Option<i64>| value.map_or_else(|| "-".to_string(), |value| value.to_string());
    format!("seq:{} rev:{}", counter(version.sequence), counter(version.revision))
}

fn normalize_scene_id(scene_id: &str) -> String {
    let trimmed = scene_id.trim();
    if trimmed.is_empty() {
        DEFAULT_SCENE_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

fn keep_selection(selected: Option<String>, placements: &[Placement]) -> Option<String> {
    selected.filter(|id| placements.iter().any(|placement| &placement.id == id))
}

pub struct SceneSession {
    state: SceneState,
    history: UndoManager<SceneState>,
    log: EventLog,
    config: RuntimeConfig,
    effects: Vec<HostEffect>,
}

impl SceneSession {
    pub fn new(config: RuntimeConfig) -> Self {
        let mut state = SceneState {
            scene_id: normalize_scene_id(&config.scene_id),
            edit_enabled: config.scene_edit_enabled,
            ..SceneState::default()
        };
        state.bridge.enabled = config.bridge_enabled;
        state.bridge.url = config.bridge_url.clone();
        Self {
            state,
            history: UndoManager::new(config.undo_limit),
            log: EventLog::new(config.event_log_limit),
            config,
            effects: Vec::new(),
        }
    }

    pub fn state(&self) -> &SceneState {
        &self.state
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn events(&self) -> &EventLog {
        &self.log
    }

    pub fn history(&self) -> &UndoManager<SceneState> {
        &self.history
    }

    pub fn has_local_edits(&self) -> bool {
        has_local_edits(&self.state, self.history.undo_depth(), self.history.redo_depth())
    }

    /// Drain queued host effects in the order they were produced.
    pub fn take_effects(&mut self) -> Vec<HostEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Drop undo/redo history, e.g. when the host shuts down.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn commit<O>(&mut self, reduced: Reduced<O>) -> O {
        self.state = reduced.state;
        if reduced.history_reset {
            self.history.clear();
        }
        reduced.outcome
    }

    pub fn log_event(&mut self, input: EventInput) {
        self.log.push(input);
    }

    // Remote sync

    /// Classify and apply, defer or drop one remote scene message.
    pub fn apply_remote(&mut self, kind: PatchKind, message: &Value) -> IncomingOutcome {
        let settings = IncomingSettings {
            deferred_queue_limit: self.config.deferred_queue_limit,
            has_local_edits: self.has_local_edits(),
        };
        let reduced = reduce_incoming(&self.state, kind, message, settings);
        let outcome = self.commit(reduced);

        let label = kind.label();
        let input = match &outcome {
            IncomingOutcome::Invalid => EventInput::new(format!("{}_invalid", kind.as_str()), SCENE_SYNC_SOURCE)
                .level(EventLevel::Warn)
                .summary(format!("invalid {label}")),
            IncomingOutcome::IgnoredStale { version, reason } => {
                EventInput::new(format!("{}_ignored_stale", kind.as_str()), SCENE_SYNC_SOURCE)
                    .level(EventLevel::Debug)
                    .summary(format!("ignored stale {label} {}", describe_version(version)))
                    .version(version.revision, version.sequence)
                    .payload(json!({ "reason": reason }))
            }
            IncomingOutcome::Deferred { queue_len, version } => {
                EventInput::new(format!("{}_deferred", kind.as_str()), SCENE_SYNC_SOURCE)
                    .summary(format!("deferred {label} queue:{queue_len}"))
                    .version(version.revision, version.sequence)
            }
            IncomingOutcome::Applied {
                version,
                overwrote_local_edits,
            } => {
                let suffix = if *overwrote_local_edits { " (overwrote local edits)" } else { "" };
                EventInput::new(format!("{}_applied", kind.as_str()), SCENE_SYNC_SOURCE)
                    .summary(format!("applied {label} {}{suffix}", describe_version(version)))
                    .version(version.revision, version.sequence)
            }
        };
        self.log_event(input.scene_id(self.state.scene_id.clone()));
        outcome
    }

    /// Replay the deferred queue. Also the confirm path after a hold
    /// release that required confirmation.
    pub fn apply_deferred(&mut self) -> DeferredApplyOutcome {
        let before = self.state.deferred.len();
        let reduced = select_for_apply_and_reduce(&self.state, self.config.deferred_apply_mode, self.has_local_edits());
        let outcome = self.commit(reduced);

        let input = if outcome.is_error() {
            EventInput::new("scene_deferred_apply", SCENE_SYNC_SOURCE)
                .level(EventLevel::Warn)
                .summary(format!("deferred apply error after:{}", self.state.deferred.len()))
        } else {
            EventInput::new("scene_deferred_apply", SCENE_SYNC_SOURCE)
                .summary(format!("deferred apply before:{before} applied:{}", outcome.applied()))
        };
        self.log_event(input.payload(json!({ "before": before, "outcome": format!("{outcome:?}") })));
        outcome
    }

    /// Drop every deferred update without applying it.
    pub fn clear_deferred(&mut self) -> usize {
        let dropped = self.state.deferred.len();
        self.state.deferred = DeferredQueue::new();
        self.state.hold.pending_confirm = false;
        self.log_event(
            EventInput::new("scene_deferred_clear", SCENE_SYNC_SOURCE).summary(format!("deferred cleared:{dropped}")),
        );
        dropped
    }

    pub fn set_hold_enabled(&mut self, enabled: bool) -> HoldTransition {
        let reduced = reduce_hold_enabled(&self.state, enabled, self.config.hold_release_policy());
        let transition = self.commit(reduced);
        if !transition.changed {
            return transition;
        }

        let state = if transition.next_enabled { "enabled" } else { "disabled" };
        self.log_event(
            EventInput::new("scene_remote_hold_toggle", SCENE_SYNC_SOURCE)
                .summary(format!("remote hold {state}"))
                .payload(json!({
                    "enabled": transition.next_enabled,
                    "pendingConfirm": transition.pending_confirm,
                    "deferred": self.state.deferred.len(),
                })),
        );
        if transition.should_auto_apply {
            self.log_event(
                EventInput::new("scene_remote_hold_release_auto_apply", SCENE_SYNC_SOURCE)
                    .summary("hold released -> auto apply deferred"),
            );
            self.apply_deferred();
        }
        transition
    }

    pub fn toggle_hold(&mut self) -> HoldTransition {
        self.set_hold_enabled(!self.state.hold.enabled)
    }

    pub fn clear_remote_override(&mut self) {
        if self.state.remote_override.take().is_some() {
            self.log_event(EventInput::new("scene_remote_override_clear", SCENE_SYNC_SOURCE).summary("override cleared"));
        }
    }

    // Local edits

    /// Run a local scene command. Rejections and no-ops are logged; an
    /// applied command is pushed onto the undo history.
    pub fn run_scene_command(
        &mut self,
        command: &SceneCommand,
        meta: Option<CommandMeta>,
    ) -> Result<Option<SceneEffect>, SceneError> {
        let result = if self.state.edit_enabled {
            command.apply(&self.state.placements)
        } else {
            Err(SceneError::EditingDisabled)
        };
        match result {
            Err(err) => {
                if err == SceneError::EditingDisabled {
                    self.state.scene_error = Some(err.to_string());
                }
                self.log_event(
                    EventInput::new("scene_engine_rejected", SCENE_ENGINE_SOURCE)
                        .level(EventLevel::Warn)
                        .summary(format!("{} rejected ({})", command.kind(), err.reason()))
                        .payload(json!({ "reason": err.reason(), "detail": err.to_string(), "id": command.target_id() })),
                );
                Err(err)
            }
            Ok(None) => {
                self.log_event(
                    EventInput::new("scene_engine_noop", SCENE_ENGINE_SOURCE)
                        .level(EventLevel::Debug)
                        .summary(format!("{} noop", command.label())),
                );
                Ok(None)
            }
            Ok(Some(next)) => {
                let effect = self.commit_local_edit(command.label(), next, meta);
                self.log_event(
                    EventInput::new("scene_engine_applied", SCENE_ENGINE_SOURCE)
                        .summary(format!("{} applied", command.label()))
                        .payload(json!({ "placements": effect.next.len() })),
                );
                Ok(Some(effect))
            }
        }
    }

    /// Remove every placement as one undoable local edit.
    pub fn clear_scene(&mut self, meta: Option<CommandMeta>) -> Result<Option<SceneEffect>, SceneError> {
        if !self.state.edit_enabled {
            self.log_event(
                EventInput::new("scene_engine_rejected", SCENE_ENGINE_SOURCE)
                    .level(EventLevel::Warn)
                    .summary("clear_scene rejected (editing_disabled)"),
            );
            return Err(SceneError::EditingDisabled);
        }
        if self.state.placements.is_empty() {
            return Ok(None);
        }
        let effect = self.commit_local_edit("clear_scene".to_string(), Vec::new(), meta);
        self.log_event(
            EventInput::new("scene_engine_applied", SCENE_ENGINE_SOURCE)
                .summary(format!("clear_scene removed:{}", effect.previous.len())),
        );
        Ok(Some(effect))
    }

    fn commit_local_edit(&mut self, label: String, next: Vec<Placement>, meta: Option<CommandMeta>) -> SceneEffect {
        let previous = std::mem::replace(&mut self.state.placements, next.clone());
        self.state.source = SceneSource::LocalEdit;
        self.state.scene_error = None;
        self.state.selected_placement = keep_selection(self.state.selected_placement.take(), &next);

        let (undo_to, redo_to) = (previous.clone(), next.clone());
        self.history.push(UndoEntry::new(
            label,
            meta.clone(),
            move |state: &mut SceneState| restore_placements(state, &undo_to),
            move |state: &mut SceneState| restore_placements(state, &redo_to),
        ));

        let effect = SceneEffect {
            scene_id: self.state.scene_id.clone(),
            previous,
            next,
            meta,
        };
        self.queue_publish(&effect);
        effect
    }

    fn queue_publish(&mut self, effect: &SceneEffect) {
        if self.config.publish_local_edits && effect.patch().is_some() {
            self.effects.push(HostEffect::Publish(effect.clone()));
        }
    }

    pub fn undo(&mut self) -> Option<SceneEffect> {
        self.step_history("scene_undo", |history, state| history.undo(state))
    }

    pub fn redo(&mut self) -> Option<SceneEffect> {
        self.step_history("scene_redo", |history, state| history.redo(state))
    }

    fn step_history(
        &mut self,
        kind: &str,
        step: impl FnOnce(&mut UndoManager<SceneState>, &mut SceneState) -> Option<String>,
    ) -> Option<SceneEffect> {
        let previous = self.state.placements.clone();
        let Some(label) = step(&mut self.history, &mut self.state) else {
            self.log_event(
                EventInput::new(kind, SCENE_ENGINE_SOURCE)
                    .level(EventLevel::Debug)
                    .summary("nothing to step"),
            );
            return None;
        };
        self.log_event(EventInput::new(kind, SCENE_ENGINE_SOURCE).summary(label));
        let effect = SceneEffect {
            scene_id: self.state.scene_id.clone(),
            previous,
            next: self.state.placements.clone(),
            meta: None,
        };
        self.queue_publish(&effect);
        Some(effect)
    }

    /// Back to an empty scene. Scene id, edit flag, hold flag and bridge
    /// meta survive; history is cleared.
    pub fn reset(&mut self) {
        let previous = std::mem::take(&mut self.state);
        self.state.scene_id = previous.scene_id;
        self.state.edit_enabled = previous.edit_enabled;
        self.state.hold.enabled = previous.hold.enabled;
        self.state.bridge = previous.bridge;
        self.history.clear();
        self.log_event(EventInput::new("scene_reset", SCENE_ENGINE_SOURCE).summary("scene reset"));
    }

    /// Switch scene stream. Blank ids fall back to the default. Returns
    /// whether the id changed.
    pub fn set_scene_id(&mut self, scene_id: &str) -> bool {
        let scene_id = normalize_scene_id(scene_id);
        if scene_id == self.state.scene_id {
            return false;
        }
        self.state.scene_id = scene_id.clone();
        self.state.applied_version = RemoteVersion::UNKNOWN;
        self.state.deferred = DeferredQueue::new();
        self.state.hold.pending_confirm = false;
        self.history.clear();
        self.log_event(
            EventInput::new("scene_id_changed", SCENE_SYNC_SOURCE)
                .summary(format!("scene:{scene_id}"))
                .scene_id(scene_id.clone()),
        );
        self.effects.push(HostEffect::SubscribeScene(scene_id));
        true
    }

    pub fn set_scene_edit_enabled(&mut self, enabled: bool) {
        if self.state.edit_enabled == enabled {
            return;
        }
        self.state.edit_enabled = enabled;
        if enabled && self.state.scene_error == Some(SceneError::EditingDisabled.to_string()) {
            self.state.scene_error = None;
        }
        let state = if enabled { "enabled" } else { "disabled" };
        self.log_event(EventInput::new("scene_edit_toggle", SCENE_ENGINE_SOURCE).summary(format!("scene edit {state}")));
    }

    pub fn toggle_scene_edit(&mut self) {
        self.set_scene_edit_enabled(!self.state.edit_enabled);
    }

    /// Select a placement by id, or clear with `None`.
    pub fn set_selected_placement(&mut self, placement_id: Option<String>) -> Result<(), SceneError> {
        let placement_id = placement_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty());
        if let Some(id) = &placement_id {
            if self.state.placement(id).is_none() {
                let err = SceneError::PlacementNotFound(id.clone());
                self.log_event(
                    EventInput::new("scene_selection_rejected", SCENE_ENGINE_SOURCE)
                        .level(EventLevel::Warn)
                        .summary(err.to_string()),
                );
                return Err(err);
            }
        }
        self.state.selected_placement = placement_id;
        Ok(())
    }

    // Bridge-fed state

    /// Apply a `bridge_pose` payload. Returns whether pose or identity
    /// changed.
    pub fn apply_pose_snapshot(&mut self, payload: &Value) -> bool {
        match pose::apply_pose_snapshot(&self.state.pose, &self.state.avatar, payload) {
            Some((pose, avatar)) => {
                self.state.pose = pose;
                self.state.avatar = avatar;
                true
            }
            None => false,
        }
    }

    pub fn set_bridge_status(&mut self, status: SessionStatus) {
        self.state.bridge.status = status;
    }

    pub fn set_bridge_error(&mut self, error: Option<String>) {
        self.state.bridge.error = error;
    }

    pub fn set_bridge_meta(&mut self, non_zero_axes: i64, sequence: i64, at: Timestamp) {
        self.state.bridge.non_zero_axes = non_zero_axes;
        self.state.bridge.sequence = sequence;
        self.state.bridge.last_pose_at = Some(at);
    }

    pub fn set_bridge_enabled(&mut self, enabled: bool) {
        if self.state.bridge.enabled == enabled {
            return;
        }
        self.state.bridge.enabled = enabled;
        self.effects.push(HostEffect::SetBridgeEnabled(enabled));
    }

    pub fn set_bridge_url(&mut self, url: &str) {
        let url = url.trim().to_string();
        if self.state.bridge.url == url {
            return;
        }
        self.state.bridge.url = url.clone();
        self.effects.push(HostEffect::SetBridgeUrl(url));
    }

    // Observability

    pub fn clear_event_log(&mut self) {
        self.log.clear();
    }

    pub fn set_event_log_paused(&mut self, paused: bool) {
        self.log.set_paused(paused);
    }

    /// Log an outbound payload, `out` when sent and `out(drop)` otherwise.
    pub fn record_outbound(&mut self, payload: &Value, sent: bool) {
        let kind = payload
            .as_object()
            .and_then(|packet| read_text(packet.get("kind")))
            .unwrap_or_else(|| "unknown".to_string());
        let summary = summarize_event(&kind, Some(payload));
        let (level, summary) = if sent {
            (EventLevel::Info, format!("out {summary}"))
        } else {
            (EventLevel::Warn, format!("out(drop) {summary}"))
        };
        let source = infer_event_source(&kind, Some(payload), "frontend.outbound");
        self.log_event(EventInput::new(kind, source).level(level).summary(summary).payload(payload.clone()));
    }

    /// Log a command entering the bus.
    pub fn record_command(&mut self, envelope: &CommandEnvelope<AppCommand>) {
        let kind = envelope.command.kind();
        self.log_event(
            EventInput::new("app_command", COMMAND_BUS_SOURCE)
                .level(EventLevel::Debug)
                .summary(format!("cmd {kind} from {}", envelope.source))
                .payload(json!({
                    "commandId": envelope.id,
                    "correlationId": envelope.correlation_id,
                    "command": envelope.command,
                })),
        );
    }

    pub fn record_capability_toggle(&mut self, capability_id: &str, enabled: bool, outcome: ToggleOutcome) {
        let payload = json!({ "capabilityId": capability_id, "enabled": enabled, "outcome": outcome });
        let input = match outcome {
            ToggleOutcome::NotFound => EventInput::new("engine_capability_unknown", ENGINE_RUNTIME_SOURCE)
                .level(EventLevel::Warn)
                .summary(format!("unknown capability {capability_id}")),
            _ => {
                let state = if enabled { "on" } else { "off" };
                EventInput::new("engine_capability_toggle", ENGINE_RUNTIME_SOURCE)
                    .summary(format!("capability {capability_id} {state} ({})", outcome.as_str()))
            }
        };
        self.log_event(input.payload(payload));
    }

    pub fn record_capability_policy(&mut self, statuses: &[CapabilityStatus]) {
        let profile = self.config.capability_profile.as_str();
        self.log_event(
            EventInput::new("engine_capability_policy", ENGINE_RUNTIME_SOURCE)
                .summary(format!("cap profile={profile}"))
                .payload(json!({ "profile": profile, "capabilities": statuses })),
        );
    }

    fn record_unavailable(&mut self, kind: &str, reason: &str) {
        self.log_event(
            EventInput::new(kind, ENGINE_RUNTIME_SOURCE)
                .level(EventLevel::Warn)
                .summary(reason.to_string())
                .payload(json!({ "reason": reason })),
        );
    }
}

fn restore_placements(state: &mut SceneState, placements: &[Placement]) {
    state.placements = placements.to_vec();
    state.source = SceneSource::LocalEdit;
    state.selected_placement = keep_selection(state.selected_placement.take(), placements);
}

impl CommandPort<AppCommand, Value, SceneState> for SceneSession {
    fn state(&self) -> &SceneState {
        &self.state
    }

    fn execute(&mut self, envelope: &CommandEnvelope<AppCommand>) {
        let meta = envelope.meta();
        match &envelope.command {
            AppCommand::RunSceneCommand { command } => {
                if let Err(err) = self.run_scene_command(command, Some(meta)) {
                    log::debug!("{} rejected: {err}", envelope.id);
                }
            }
            AppCommand::UndoSceneEdit => {
                self.undo();
            }
            AppCommand::RedoSceneEdit => {
                self.redo();
            }
            AppCommand::ClearScene => {
                if let Err(err) = self.clear_scene(Some(meta)) {
                    log::debug!("{} rejected: {err}", envelope.id);
                }
            }
            AppCommand::ApplyDeferredSceneRemote => {
                self.apply_deferred();
            }
            AppCommand::ClearSceneDeferredRemote => {
                self.clear_deferred();
            }
            AppCommand::ClearSceneRemoteOverride => self.clear_remote_override(),
            AppCommand::ToggleSceneRemoteHold => {
                self.toggle_hold();
            }
            AppCommand::SetSceneRemoteHold { enabled } => {
                self.set_hold_enabled(*enabled);
            }
            AppCommand::ToggleSceneEdit => self.toggle_scene_edit(),
            AppCommand::SetSelectedPlacement { placement_id } => {
                // rejection already logged
                let _ = self.set_selected_placement(placement_id.clone());
            }
            AppCommand::SetBridgeEnabled { enabled } => self.set_bridge_enabled(*enabled),
            AppCommand::SetBridgeUrl { url } => self.set_bridge_url(url),
            AppCommand::SetSceneId { scene_id } => {
                self.set_scene_id(scene_id);
            }
            AppCommand::RequestEngineStats => {
                self.record_unavailable("engine_stats_unavailable", "engine.stats capability disabled")
            }
            AppCommand::RequestEngineSimPreview => {
                self.record_unavailable("engine_sim_preview_unavailable", "engine.sim.preview capability disabled")
            }
            AppCommand::SetEngineCapabilityEnabled { capability_id, enabled } => {
                self.effects.push(HostEffect::SetCapabilityEnabled {
                    capability_id: capability_id.clone(),
                    enabled: *enabled,
                });
            }
            AppCommand::ClearSceneEventLog => self.clear_event_log(),
            AppCommand::SetSceneEventLogPaused { enabled } => self.set_event_log_paused(*enabled),
        }
    }

    fn on_event(&mut self, event: &EventEnvelope<Value>) {
        let mut input = EventInput::new("engine_runtime_event", ENGINE_RUNTIME_SOURCE)
            .level(EventLevel::Debug)
            .summary(format!("engine {} ({})", event.kind, event.source))
            .payload(json!({
                "eventId": event.id,
                "kind": event.kind,
                "commandId": event.command_id,
                "correlationId": event.correlation_id,
                "payload": event.payload,
            }));
        if let Some(packet) = as_object(&event.payload) {
            if let Some(scene_id) = read_text(packet.get("sceneId")) {
                input = input.scene_id(scene_id);
            }
        }
        self.log_event(input.at(event.at));
    }

    fn on_capability_error(&mut self, failure: &CapabilityFailure<AppCommand>) {
        self.log_event(
            EventInput::new("engine_capability_error", ENGINE_RUNTIME_SOURCE)
                .level(EventLevel::Warn)
                .summary(format!(
                    "capability {} failed on {}",
                    failure.capability_id,
                    failure.envelope.command.kind()
                ))
                .payload(json!({
                    "capabilityId": failure.capability_id,
                    "commandId": failure.envelope.id,
                    "error": failure.error.to_string(),
                })),
        );
    }
}

impl Default for SceneSession {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for SceneSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneSession")
            .field("scene_id", &self.state.scene_id)
            .field("history", &self.history)
            .field("events", &self.log.len())
            .field("pending_effects", &self.effects.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::default_catalog;
    use crate::engine::{CommandEngine, CommandOptions};

    fn session() -> SceneSession {
        SceneSession::new(RuntimeConfig {
            publish_local_edits: true,
            ..RuntimeConfig::default()
        })
    }

    fn snapshot(sequence: i64, ids: &[&str]) -> Value {
        let placements: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "id": id, "assetId": "chair", "positionM": [0.0, 0.0] }))
            .collect();
        json!({ "kind": "scene_snapshot", "sequence": sequence, "scene": { "placements": placements } })
    }

    fn seeded() -> SceneSession {
        let mut session = session();
        session.apply_remote(PatchKind::SceneSnapshot, &snapshot(1, &["a", "b"]));
        session
    }

    fn move_a() -> SceneCommand {
        SceneCommand::MovePlacement {
            id: "a".into(),
            delta_m: [1.0, 0.0],
        }
    }

    #[test]
    fn test_new_session_uses_config() {
        let session = SceneSession::new(RuntimeConfig {
            scene_id: "  ".into(),
            scene_edit_enabled: false,
            ..RuntimeConfig::default()
        });
        assert_eq!(session.state().scene_id, DEFAULT_SCENE_ID);
        assert!(!session.state().edit_enabled);
        assert_eq!(session.state().bridge.url, "ws://localhost:8765");
        assert!(!session.has_local_edits());
    }

    #[test]
    fn test_local_edit_undo_redo() {
        let mut session = seeded();
        let effect = session.run_scene_command(&move_a(), None).unwrap().unwrap();
        assert!(effect.patch().is_some());
        assert_eq!(session.state().placement("a").unwrap().position_m, [1.0, 0.0]);
        assert_eq!(session.state().source, SceneSource::LocalEdit);
        assert!(session.has_local_edits());

        session.undo().unwrap();
        assert_eq!(session.state().placement("a").unwrap().position_m, [0.0, 0.0]);
        assert_eq!(session.history().redo_depth(), 1);

        session.redo().unwrap();
        assert_eq!(session.state().placement("a").unwrap().position_m, [1.0, 0.0]);
        assert!(session.redo().is_none());

        let published = session
            .take_effects()
            .into_iter()
            .filter(|effect| matches!(effect, HostEffect::Publish(_)))
            .count();
        assert_eq!(published, 3);
    }

    #[test]
    fn test_rejections_logged() {
        let mut session = seeded();
        let err = session
            .run_scene_command(&SceneCommand::RemovePlacement { id: "zzz".into() }, None)
            .unwrap_err();
        assert_eq!(err, SceneError::PlacementNotFound("zzz".into()));
        let event = session.events().last().unwrap();
        assert_eq!(event.kind, "scene_engine_rejected");
        assert_eq!(event.summary, "remove_placement rejected (placement_not_found)");
        assert_eq!(event.level, EventLevel::Warn);
    }

    #[test]
    fn test_editing_disabled_error_cleared_on_enable() {
        let mut session = seeded();
        session.set_scene_edit_enabled(false);
        assert_eq!(session.run_scene_command(&move_a(), None), Err(SceneError::EditingDisabled));
        assert!(session.state().scene_error.is_some());
        session.toggle_scene_edit();
        assert!(session.state().edit_enabled);
        assert_eq!(session.state().scene_error, None);
    }

    #[test]
    fn test_noop_command_is_debug() {
        let mut session = seeded();
        let noop = SceneCommand::RotatePlacement {
            id: "a".into(),
            delta_deg: 0.0,
        };
        assert_eq!(session.run_scene_command(&noop, None), Ok(None));
        assert_eq!(session.events().last().unwrap().kind, "scene_engine_noop");
        assert!(!session.has_local_edits());
    }

    #[test]
    fn test_hold_defers_then_auto_applies_on_release() {
        let mut session = seeded();
        session.run_scene_command(&move_a(), None).unwrap();
        session.set_hold_enabled(true);

        let outcome = session.apply_remote(PatchKind::SceneSnapshot, &snapshot(2, &["z"]));
        assert!(matches!(outcome, IncomingOutcome::Deferred { queue_len: 1, .. }));
        assert_eq!(session.events().last().unwrap().kind, "scene_snapshot_deferred");
        assert!(session.state().placement("a").is_some());

        let transition = session.set_hold_enabled(false);
        assert!(transition.should_auto_apply);
        assert!(session.state().placement("z").is_some());
        assert!(session.state().deferred.is_empty());
        assert!(session.history().is_empty());
        assert!(session.state().remote_override.is_some());
        assert!(session.events().last_of_kind("scene_remote_hold_release_auto_apply").is_some());

        session.clear_remote_override();
        assert_eq!(session.state().remote_override, None);
    }

    #[test]
    fn test_release_with_confirm_waits() {
        let mut session = SceneSession::new(RuntimeConfig {
            require_confirm_on_release: true,
            ..RuntimeConfig::default()
        });
        session.apply_remote(PatchKind::SceneSnapshot, &snapshot(1, &["a"]));
        session.run_scene_command(&move_a(), None).unwrap();
        session.toggle_hold();
        session.apply_remote(PatchKind::SceneSnapshot, &snapshot(2, &["z"]));

        session.toggle_hold();
        assert!(session.state().hold.pending_confirm);
        assert_eq!(session.state().deferred.len(), 1);

        let outcome = session.apply_deferred();
        assert_eq!(outcome.applied(), 1);
        assert!(!session.state().hold.pending_confirm);
        let event = session.events().last_of_kind("scene_deferred_apply").unwrap();
        assert_eq!(event.summary, "deferred apply before:1 applied:1");
    }

    #[test]
    fn test_stale_remote_logged_at_debug() {
        let mut session = seeded();
        let outcome = session.apply_remote(PatchKind::SceneSnapshot, &snapshot(1, &["a"]));
        assert!(matches!(outcome, IncomingOutcome::IgnoredStale { .. }));
        let event = session.events().last().unwrap();
        assert_eq!(event.kind, "scene_snapshot_ignored_stale");
        assert_eq!(event.level, EventLevel::Debug);
        assert_eq!(event.summary, "ignored stale snapshot seq:1 rev:-");
    }

    #[test]
    fn test_clear_deferred_and_scene() {
        let mut session = seeded();
        session.run_scene_command(&move_a(), None).unwrap();
        session.set_hold_enabled(true);
        session.apply_remote(PatchKind::SceneSnapshot, &snapshot(5, &["x"]));
        assert_eq!(session.clear_deferred(), 1);

        let effect = session.clear_scene(None).unwrap().unwrap();
        assert_eq!(effect.previous.len(), 2);
        assert!(session.state().placements.is_empty());
        assert_eq!(session.clear_scene(None), Ok(None));
    }

    #[test]
    fn test_scene_id_change_resets_stream() {
        let mut session = seeded();
        session.take_effects();
        assert!(!session.set_scene_id(" scene-1 "));
        assert!(session.set_scene_id("lab"));
        assert_eq!(session.state().applied_version, RemoteVersion::UNKNOWN);
        assert_eq!(session.take_effects(), vec![HostEffect::SubscribeScene("lab".into())]);
    }

    #[test]
    fn test_selection() {
        let mut session = seeded();
        session.set_selected_placement(Some("b".into())).unwrap();
        assert!(session.set_selected_placement(Some("nope".into())).is_err());
        assert_eq!(session.state().selected_placement.as_deref(), Some("b"));

        session
            .run_scene_command(&SceneCommand::RemovePlacement { id: "b".into() }, None)
            .unwrap();
        assert_eq!(session.state().selected_placement, None);
    }

    #[test]
    fn test_reset_keeps_identity() {
        let mut session = seeded();
        session.set_scene_id("lab");
        session.run_scene_command(&move_a(), None).unwrap();
        session.reset();
        assert_eq!(session.state().scene_id, "lab");
        assert!(session.state().placements.is_empty());
        assert!(session.history().is_empty());
        assert_eq!(session.state().source, SceneSource::Default);
    }

    #[test]
    fn test_outbound_recording() {
        let mut session = session();
        session.record_outbound(&json!({ "kind": "scene_subscribe", "sceneId": "s" }), true);
        let event = session.events().last().unwrap();
        assert_eq!(event.summary, "out subscribe scene:s");
        assert_eq!(event.source, "frontend.scene");

        session.record_outbound(&json!({ "kind": "scene_patch", "patch": { "upserts": [], "removes": ["a"] } }), false);
        let event = session.events().last().unwrap();
        assert_eq!(event.summary, "out(drop) upserts:0 removes:1");
        assert_eq!(event.level, EventLevel::Warn);
    }

    #[test]
    fn test_engine_dispatch_through_session() {
        let config = RuntimeConfig {
            capabilities_disabled: vec!["engine.stats".into()],
            ..RuntimeConfig::default()
        };
        let catalog = default_catalog(&config).unwrap();
        let mut engine = CommandEngine::new();
        catalog.install_defaults(engine.registry_mut());
        let mut session = SceneSession::new(config);
        session.apply_remote(PatchKind::SceneSnapshot, &snapshot(1, &["a"]));

        let command = AppCommand::RunSceneCommand { command: move_a() };
        let envelope = CommandEnvelope::new(command, CommandOptions::from_source("ui.console"));
        session.record_command(&envelope);
        engine.dispatch_envelope(envelope, &mut session);
        assert_eq!(session.state().placement("a").unwrap().position_m, [1.0, 0.0]);
        assert_eq!(session.history().undo_depth(), 1);

        engine.dispatch(AppCommand::RequestEngineStats, CommandOptions::default(), &mut session);
        assert!(session.events().last_of_kind("engine_stats_unavailable").is_some());

        engine.dispatch(AppCommand::RequestEngineSimPreview, CommandOptions::default(), &mut session);
        let event = session.events().last().unwrap();
        assert_eq!(event.kind, "engine_runtime_event");
        assert_eq!(event.summary, "engine engine.sim_preview_snapshot (engine.capability.sim_preview)");

        engine.dispatch(
            AppCommand::SetEngineCapabilityEnabled {
                capability_id: "engine.stats".into(),
                enabled: true,
            },
            CommandOptions::default(),
            &mut session,
        );
        assert!(session.take_effects().contains(&HostEffect::SetCapabilityEnabled {
            capability_id: "engine.stats".into(),
            enabled: true,
        }));
    }

    #[test]
    fn test_pose_snapshot_and_bridge_meta() {
        let mut session = session();
        assert!(session.apply_pose_snapshot(&json!({ "joints": { "head": { "y": 20 } } })));
        assert_eq!(session.state().pose["head"].y, 20.0);
        session.set_bridge_meta(3, 42, 1000);
        assert_eq!(session.state().bridge.sequence, 42);
        assert_eq!(session.state().bridge.last_pose_at, Some(1000));
    }
}
