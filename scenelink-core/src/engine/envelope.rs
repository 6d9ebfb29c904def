//! Command and event envelopes.
//!
//! Every command is wrapped exactly once; every capability emission gets
//! its own event envelope pointing back at the command. Ids come from two
//! independent process-wide counters, so they are unique and increase
//! monotonically in creation order.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::{now_millis, Timestamp};

static COMMAND_SEQUENCE: AtomicU64 = AtomicU64::new(0);
static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub const DEFAULT_COMMAND_PREFIX: &str = "cmd";
pub const DEFAULT_COMMAND_SOURCE: &str = "ui.unknown";
pub const DEFAULT_EVENT_PREFIX: &str = "engine-ev";
pub const DEFAULT_EVENT_SOURCE: &str = "engine.runtime";

fn next_id(counter: &AtomicU64, prefix: &str) -> String {
    let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{prefix}-{n}")
}

/// Overrides applied when wrapping a command.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    pub at: Option<Timestamp>,
    pub correlation_id: Option<String>,
    pub id: Option<String>,
    pub source: Option<String>,
}

impl CommandOptions {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Immutable wrapper stamping a command with id, time and origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope<C> {
    pub id: String,
    pub command: C,
    pub source: String,
    pub correlation_id: Option<String>,
    pub at: Timestamp,
}

impl<C> CommandEnvelope<C> {
    pub fn new(command: C, options: CommandOptions) -> Self {
        Self {
            id: options
                .id
                .unwrap_or_else(|| next_id(&COMMAND_SEQUENCE, DEFAULT_COMMAND_PREFIX)),
            command,
            source: options.source.unwrap_or_else(|| DEFAULT_COMMAND_SOURCE.to_string()),
            correlation_id: options.correlation_id,
            at: options.at.unwrap_or_else(now_millis),
        }
    }

    pub fn meta(&self) -> CommandMeta {
        CommandMeta::from_envelope(self)
    }
}

/// Overrides applied when wrapping an event.
#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    pub at: Option<Timestamp>,
    pub command_id: Option<String>,
    pub correlation_id: Option<String>,
    pub id: Option<String>,
    pub source: Option<String>,
}

/// Immutable wrapper for an event emitted during dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<E> {
    pub id: String,
    pub command_id: Option<String>,
    pub correlation_id: Option<String>,
    pub kind: String,
    pub payload: E,
    pub source: String,
    pub at: Timestamp,
}

impl<E> EventEnvelope<E> {
    pub fn new(kind: impl Into<String>, payload: E, options: EventOptions) -> Self {
        Self {
            id: options
                .id
                .unwrap_or_else(|| next_id(&EVENT_SEQUENCE, DEFAULT_EVENT_PREFIX)),
            command_id: options.command_id,
            correlation_id: options.correlation_id,
            kind: kind.into(),
            payload,
            source: options.source.unwrap_or_else(|| DEFAULT_EVENT_SOURCE.to_string()),
            at: options.at.unwrap_or_else(now_millis),
        }
    }
}

/// Origin of a command, detached from the command itself.
///
/// Carried into undo entries and outbound patches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMeta {
    pub command_id: String,
    pub correlation_id: Option<String>,
    pub source: String,
    pub at: Timestamp,
}

impl CommandMeta {
    pub fn from_envelope<C>(envelope: &CommandEnvelope<C>) -> Self {
        Self {
            command_id: envelope.id.clone(),
            correlation_id: envelope.correlation_id.clone(),
            source: envelope.source.clone(),
            at: envelope.at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_suffix(id: &str) -> u64 {
        id.rsplit('-').next().unwrap().parse().unwrap()
    }

    #[test]
    fn test_command_ids_increase() {
        let first = CommandEnvelope::new("a", CommandOptions::default());
        let second = CommandEnvelope::new("b", CommandOptions::default());
        assert!(first.id.starts_with("cmd-"));
        assert!(numeric_suffix(&second.id) > numeric_suffix(&first.id));
        assert_eq!(first.source, DEFAULT_COMMAND_SOURCE);
        assert!(first.correlation_id.is_none());
    }

    #[test]
    fn test_command_options_override() {
        let envelope = CommandEnvelope::new(
            1u8,
            CommandOptions {
                at: Some(42),
                id: Some("fixed".into()),
                ..CommandOptions::from_source("ui.console").with_correlation("corr-1")
            },
        );
        assert_eq!(envelope.id, "fixed");
        assert_eq!(envelope.at, 42);
        assert_eq!(envelope.source, "ui.console");
        assert_eq!(envelope.correlation_id.as_deref(), Some("corr-1"));

        let meta = envelope.meta();
        assert_eq!(meta.command_id, "fixed");
        assert_eq!(meta.correlation_id.as_deref(), Some("corr-1"));
    }

    #[test]
    fn test_event_defaults() {
        let event = EventEnvelope::new("engine.ping", (), EventOptions::default());
        assert!(event.id.starts_with("engine-ev-"));
        assert_eq!(event.source, DEFAULT_EVENT_SOURCE);
        assert!(event.command_id.is_none());
    }

    #[test]
    fn test_event_counter_is_independent() {
        let event = EventEnvelope::new("k", (), EventOptions::default());
        let command = CommandEnvelope::new((), CommandOptions::default());
        let next_event = EventEnvelope::new("k", (), EventOptions::default());
        assert!(command.id.starts_with("cmd-"));
        assert!(numeric_suffix(&next_event.id) > numeric_suffix(&event.id));
    }
}
