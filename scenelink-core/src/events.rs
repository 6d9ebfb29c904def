//! Bounded scene event log.
//!
//! Every entry is mirrored to the `log` facade under the
//! `scenelink::events` target at the entry's level, whether or not the
//! in-memory log is paused.
//!
//! | Field      | Filled from                                     |
//! |------------|-------------------------------------------------|
//! | `revision` | explicit value, else payload `revision`         |
//! | `sequence` | explicit value, else payload `sequence`         |
//! | `scene_id` | explicit value, else payload `sceneId`          |
//! | `summary`  | explicit value, else [`summarize_event`]        |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::{now_millis, Timestamp};
use crate::json::{as_object, first_of, read_integer, read_text, Object};

pub const LOG_TARGET: &str = "scenelink::events";

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_log_level(&self) -> log::Level {
        match self {
            Self::Debug => log::Level::Debug,
            Self::Info => log::Level::Info,
            Self::Warn => log::Level::Warn,
            Self::Error => log::Level::Error,
        }
    }
}

/// One recorded scene event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneEvent {
    pub id: String,
    pub at: Timestamp,
    pub kind: String,
    pub level: EventLevel,
    pub payload: Option<Value>,
    pub revision: Option<i64>,
    pub sequence: Option<i64>,
    pub scene_id: Option<String>,
    pub source: String,
    pub summary: String,
}

/// Builder for a [`SceneEvent`].
#[derive(Debug, Clone)]
pub struct EventInput {
    pub kind: String,
    pub source: String,
    pub level: EventLevel,
    pub payload: Option<Value>,
    pub revision: Option<i64>,
    pub sequence: Option<i64>,
    pub scene_id: Option<String>,
    pub summary: Option<String>,
    pub at: Option<Timestamp>,
}

impl EventInput {
    pub fn new(kind: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source: source.into(),
            level: EventLevel::Info,
            payload: None,
            revision: None,
            sequence: None,
            scene_id: None,
            summary: None,
            at: None,
        }
    }

    pub fn level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn version(mut self, revision: Option<i64>, sequence: Option<i64>) -> Self {
        self.revision = revision;
        self.sequence = sequence;
        self
    }

    pub fn scene_id(mut self, scene_id: impl Into<String>) -> Self {
        self.scene_id = Some(scene_id.into());
        self
    }

    pub fn at(mut self, at: Timestamp) -> Self {
        self.at = Some(at);
        self
    }

    /// Stamp the input into a full entry.
    pub fn build(self) -> SceneEvent {
        let packet = self.payload.as_ref().and_then(as_object);
        let revision = self.revision.or_else(|| packet.and_then(|p| read_integer(p.get("revision"))));
        let sequence = self.sequence.or_else(|| packet.and_then(|p| read_integer(p.get("sequence"))));
        let scene_id = self.scene_id.or_else(|| packet.and_then(infer_scene_id));
        let summary = self
            .summary
            .unwrap_or_else(|| summarize_event(&self.kind, self.payload.as_ref()));
        let n = EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1;
        SceneEvent {
            id: format!("ev-{n}"),
            at: self.at.unwrap_or_else(now_millis),
            kind: self.kind,
            level: self.level,
            payload: self.payload,
            revision,
            sequence,
            scene_id,
            source: self.source,
            summary,
        }
    }
}

fn infer_scene_id(packet: &Object) -> Option<String> {
    read_text(first_of(packet, &["sceneId", "scene_id"]))
}

fn array_len(object: &Object, key: &str) -> Option<usize> {
    object.get(key)?.as_array().map(Vec::len)
}

fn summarize_counts(payload: Option<&Value>) -> Option<String> {
    let packet = as_object(payload?)?;
    let body = packet
        .get("patch")
        .and_then(as_object)
        .or_else(|| packet.get("scene").and_then(as_object))
        .unwrap_or(packet);
    let upserts = array_len(body, "upserts");
    let removes = array_len(body, "removes");
    if upserts.is_some() || removes.is_some() {
        return Some(format!(
            "upserts:{} removes:{}",
            upserts.unwrap_or(0),
            removes.unwrap_or(0)
        ));
    }
    if let Some(entities) = array_len(body, "entities") {
        return Some(format!("entities:{entities}"));
    }
    array_len(body, "placements").map(|placements| format!("placements:{placements}"))
}

fn summarize_pose(payload: Option<&Value>) -> Option<String> {
    let packet = as_object(payload?)?;
    let mut fields = Vec::new();
    if let Some(sequence) = read_integer(packet.get("sequence")) {
        fields.push(format!("seq:{sequence}"));
    }
    if let Some(axes) = read_integer(packet.get("nonZeroAxes")) {
        fields.push(format!("axes:{axes}"));
    }
    (!fields.is_empty()).then(|| fields.join(" "))
}

fn summarize_error(payload: Option<&Value>) -> Option<String> {
    let packet = as_object(payload?)?;
    read_text(first_of(packet, &["details", "message", "code"])).map(|detail| format!("error:{detail}"))
}

/// True for inbound kinds that carry scene content.
pub fn is_scene_kind(kind: &str) -> bool {
    matches!(
        kind,
        "bridge_scene_patch" | "scene_patch" | "bridge_scene_snapshot" | "scene_snapshot" | "scene_update"
    )
}

/// One-line summary for traffic of `kind`.
pub fn summarize_event(kind: &str, payload: Option<&Value>) -> String {
    match kind {
        "bridge_pose" => summarize_pose(payload).unwrap_or_else(|| "pose".to_string()),
        "bridge_error" => summarize_error(payload).unwrap_or_else(|| "bridge error".to_string()),
        "scene_subscribe" => match payload.and_then(as_object).and_then(infer_scene_id) {
            Some(scene_id) => format!("subscribe scene:{scene_id}"),
            None => "subscribe scene".to_string(),
        },
        kind if is_scene_kind(kind) => summarize_counts(payload).unwrap_or_else(|| "scene".to_string()),
        other => other.to_string(),
    }
}

/// Source label for traffic of `kind`.
///
/// An explicit `source|specialist|producer` field in the payload wins.
pub fn infer_event_source(kind: &str, payload: Option<&Value>, fallback: &str) -> String {
    let explicit = payload
        .and_then(as_object)
        .and_then(|packet| read_text(first_of(packet, &["source", "specialist", "producer"])));
    if let Some(source) = explicit {
        return source;
    }
    match kind {
        "bridge_pose" => "bridge.pose",
        "bridge_scene_patch" | "scene_patch" => "bridge.scene_patch",
        "bridge_scene_snapshot" | "scene_snapshot" | "scene_update" => "bridge.scene",
        "scene_subscribe" => "frontend.scene",
        _ => fallback,
    }
    .to_string()
}

/// Ring of recent scene events with a pause switch.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<SceneEvent>,
    limit: usize,
    paused: bool,
    dropped_while_paused: usize,
}

impl EventLog {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
            paused: false,
            dropped_while_paused: 0,
        }
    }

    /// Record an event. While paused the entry is only mirrored to `log`
    /// and counted as dropped.
    pub fn push(&mut self, input: EventInput) -> Option<&SceneEvent> {
        let entry = input.build();
        log::log!(
            target: LOG_TARGET,
            entry.level.as_log_level(),
            "[{}] {} {}",
            entry.source,
            entry.kind,
            entry.summary
        );
        if self.paused {
            self.dropped_while_paused += 1;
            return None;
        }
        self.append(entry);
        self.entries.back()
    }

    fn append(&mut self, entry: SceneEvent) {
        self.entries.push_back(entry);
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    /// Pause or resume. Resuming after drops appends an `event_log_resume`
    /// warning.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        if paused || self.dropped_while_paused == 0 {
            return;
        }
        let dropped = std::mem::take(&mut self.dropped_while_paused);
        let entry = EventInput::new("event_log_resume", "frontend.terminal")
            .level(EventLevel::Warn)
            .summary(format!("dropped while paused: {dropped}"))
            .build();
        log::warn!(target: LOG_TARGET, "[{}] {} {}", entry.source, entry.kind, entry.summary);
        self.append(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dropped_while_paused = 0;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn dropped_while_paused(&self) -> usize {
        self.dropped_while_paused
    }

    pub fn entries(&self) -> impl Iterator<Item = &SceneEvent> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&SceneEvent> {
        self.entries.back()
    }

    /// Most recent entry of `kind`.
    pub fn last_of_kind(&self, kind: &str) -> Option<&SceneEvent> {
        self.entries.iter().rev().find(|entry| entry.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_infers_from_payload() {
        let event = EventInput::new("scene_patch", "bridge.inbound")
            .payload(json!({ "sceneId": "s-2", "revision": 3, "sequence": "9", "patch": { "upserts": [1, 2] } }))
            .build();
        assert!(event.id.starts_with("ev-"));
        assert_eq!(event.scene_id.as_deref(), Some("s-2"));
        assert_eq!(event.revision, Some(3));
        assert_eq!(event.sequence, Some(9));
        assert_eq!(event.summary, "upserts:2 removes:0");
        assert_eq!(event.level, EventLevel::Info);
    }

    #[test]
    fn test_explicit_fields_win() {
        let event = EventInput::new("x", "test")
            .payload(json!({ "sceneId": "from-payload", "sequence": 1 }))
            .scene_id("explicit")
            .version(None, Some(5))
            .summary("custom")
            .build();
        assert_eq!(event.scene_id.as_deref(), Some("explicit"));
        assert_eq!(event.sequence, Some(5));
        assert_eq!(event.summary, "custom");
    }

    #[test]
    fn test_summaries() {
        assert_eq!(
            summarize_event("bridge_pose", Some(&json!({ "sequence": 4, "nonZeroAxes": 2 }))),
            "seq:4 axes:2"
        );
        assert_eq!(summarize_event("bridge_pose", None), "pose");
        assert_eq!(
            summarize_event("bridge_error", Some(&json!({ "code": "E42" }))),
            "error:E42"
        );
        assert_eq!(
            summarize_event("scene_update", Some(&json!({ "scene": { "placements": [1, 2, 3] } }))),
            "placements:3"
        );
        assert_eq!(
            summarize_event("scene_subscribe", Some(&json!({ "sceneId": "s" }))),
            "subscribe scene:s"
        );
        assert_eq!(summarize_event("custom_kind", None), "custom_kind");
    }

    #[test]
    fn test_infer_source() {
        assert_eq!(infer_event_source("bridge_pose", None, "fallback"), "bridge.pose");
        assert_eq!(infer_event_source("scene_update", None, "fallback"), "bridge.scene");
        assert_eq!(
            infer_event_source("scene_patch", Some(&json!({ "source": "planner" })), "fallback"),
            "planner"
        );
        assert_eq!(infer_event_source("other", None, "fallback"), "fallback");
    }

    #[test]
    fn test_log_is_bounded() {
        let mut log = EventLog::new(2);
        for n in 0..4 {
            log.push(EventInput::new(format!("k{n}"), "test"));
        }
        let kinds: Vec<_> = log.entries().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["k2", "k3"]);
    }

    #[test]
    fn test_pause_counts_drops_and_resume_reports() {
        let mut log = EventLog::new(10);
        log.set_paused(true);
        assert!(log.push(EventInput::new("a", "test")).is_none());
        assert!(log.push(EventInput::new("b", "test")).is_none());
        assert_eq!(log.dropped_while_paused(), 2);
        assert!(log.is_empty());

        log.set_paused(false);
        let resume = log.last().unwrap();
        assert_eq!(resume.kind, "event_log_resume");
        assert_eq!(resume.level, EventLevel::Warn);
        assert_eq!(resume.summary, "dropped while paused: 2");
        assert_eq!(log.dropped_while_paused(), 0);
    }

    #[test]
    fn test_resume_without_drops_is_silent() {
        let mut log = EventLog::new(10);
        log.set_paused(true);
        log.set_paused(false);
        assert!(log.is_empty());
    }

    #[test]
    fn test_clear_resets_drop_counter() {
        let mut log = EventLog::new(10);
        log.push(EventInput::new("a", "test"));
        log.set_paused(true);
        log.push(EventInput::new("b", "test"));
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.dropped_while_paused(), 0);
    }
}
