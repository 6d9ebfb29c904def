//! Capability contract: pluggable middleware in front of the command port.

use crate::clock::Timestamp;
use crate::error::CapabilityError;

use super::envelope::{CommandEnvelope, EventEnvelope, EventOptions};

/// Per-emit overrides. Command id and correlation are filled in by the
/// engine.
#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    pub at: Option<Timestamp>,
    pub correlation_id: Option<String>,
    pub source: Option<String>,
}

impl EmitOptions {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }
}

/// What a capability reports after handling a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOutcome {
    /// Skip the command port for this command.
    pub stop_dispatch: bool,
}

impl ExecuteOutcome {
    pub const CONTINUE: ExecuteOutcome = ExecuteOutcome { stop_dispatch: false };
    pub const STOP: ExecuteOutcome = ExecuteOutcome { stop_dispatch: true };
}

/// View handed to a capability for one command.
pub struct CapabilityContext<'a, C, E, S> {
    pub envelope: &'a CommandEnvelope<C>,
    pub state: &'a S,
    events: &'a mut Vec<EventEnvelope<E>>,
}

impl<'a, C, E, S> CapabilityContext<'a, C, E, S> {
    pub(crate) fn new(
        envelope: &'a CommandEnvelope<C>,
        state: &'a S,
        events: &'a mut Vec<EventEnvelope<E>>,
    ) -> Self {
        Self { envelope, state, events }
    }

    pub fn command(&self) -> &C {
        &self.envelope.command
    }

    /// Emit an event correlated to the command being dispatched.
    pub fn emit(&mut self, kind: impl Into<String>, payload: E, options: EmitOptions) {
        let event = EventEnvelope::new(
            kind,
            payload,
            EventOptions {
                at: options.at,
                command_id: Some(self.envelope.id.clone()),
                correlation_id: options
                    .correlation_id
                    .or_else(|| self.envelope.correlation_id.clone()),
                id: None,
                source: options.source,
            },
        );
        self.events.push(event);
    }
}

/// Command-dispatch middleware identified by a stable string id.
///
/// A panic inside `execute` is caught by the engine and reported as
/// [`CapabilityError::Panicked`] in unwinding builds. The release profile
/// aborts on panic, so implementations should return `Err` instead.
pub trait Capability<C, E, S>: Send {
    fn id(&self) -> &str;

    fn can_handle(&self, command: &C) -> bool;

    fn execute(&mut self, ctx: &mut CapabilityContext<'_, C, E, S>) -> Result<ExecuteOutcome, CapabilityError>;
}
