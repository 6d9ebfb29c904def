//! Command engine: envelope stamping, capability pass, port dispatch.
//!
//! ```text
//! command ──► CommandEnvelope ──► matched capabilities (in order)
//!                                   │ emits ─────────────► port.on_event (after each capability)
//!                                   │ Err or panic ──────► port.on_capability_error
//!                                   ▼
//!                         any stop_dispatch? ──yes──► done
//!                                   │ no
//!                                   ▼
//!                             port.execute(envelope)
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{CapabilityError, RegistryError};

use super::capability::CapabilityContext;
use super::envelope::{CommandEnvelope, CommandOptions, EventEnvelope};
use super::registry::{BoxedCapability, CapabilityRegistry};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A capability failure isolated during dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityFailure<C> {
    pub capability_id: String,
    pub envelope: CommandEnvelope<C>,
    pub error: CapabilityError,
}

/// Execution target behind the engine.
pub trait CommandPort<C, E, S> {
    /// State snapshot handed to capabilities.
    fn state(&self) -> &S;

    /// Run a command that no capability intercepted.
    fn execute(&mut self, envelope: &CommandEnvelope<C>);

    /// Sink for every event emitted during dispatch.
    fn on_event(&mut self, _event: &EventEnvelope<E>) {}

    /// Sink for isolated capability failures.
    fn on_capability_error(&mut self, _failure: &CapabilityFailure<C>) {}
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult<C, E> {
    pub dispatched_to_port: bool,
    pub emitted_events: Vec<EventEnvelope<E>>,
    pub envelope: CommandEnvelope<C>,
    /// Capabilities that ran without error, in order.
    pub handled_by: Vec<String>,
    pub failures: Vec<CapabilityFailure<C>>,
}

/// Envelope-stamped command bus with a capability registry.
pub struct CommandEngine<C, E, S> {
    registry: CapabilityRegistry<C, E, S>,
}

impl<C, E, S> Default for CommandEngine<C, E, S> {
    fn default() -> Self {
        Self {
            registry: CapabilityRegistry::new(),
        }
    }
}

impl<C: Clone, E, S> CommandEngine<C, E, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: CapabilityRegistry<C, E, S>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CapabilityRegistry<C, E, S> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CapabilityRegistry<C, E, S> {
        &mut self.registry
    }

    pub fn register_capability(&mut self, capability: BoxedCapability<C, E, S>) -> Result<(), RegistryError> {
        self.registry.register(capability)
    }

    pub fn unregister_capability(&mut self, id: &str) -> bool {
        self.registry.unregister(id)
    }

    pub fn clear_capabilities(&mut self) {
        self.registry.clear();
    }

    /// Wrap `command` in a fresh envelope and dispatch it.
    pub fn dispatch<P>(&mut self, command: C, options: CommandOptions, port: &mut P) -> DispatchResult<C, E>
    where
        P: CommandPort<C, E, S>,
    {
        self.dispatch_envelope(CommandEnvelope::new(command, options), port)
    }

    /// Dispatch a pre-built envelope.
    pub fn dispatch_envelope<P>(&mut self, envelope: CommandEnvelope<C>, port: &mut P) -> DispatchResult<C, E>
    where
        P: CommandPort<C, E, S>,
    {
        let mut emitted_events = Vec::new();
        let mut handled_by = Vec::new();
        let mut failures = Vec::new();
        let mut stop_dispatch = false;

        for capability in self.registry.iter_mut() {
            if !capability.can_handle(&envelope.command) {
                continue;
            }
            let mut pending = Vec::new();
            let result = {
                let mut ctx = CapabilityContext::new(&envelope, port.state(), &mut pending);
                panic::catch_unwind(AssertUnwindSafe(|| capability.execute(&mut ctx)))
                    .unwrap_or_else(|payload| Err(CapabilityError::Panicked(panic_message(payload.as_ref()))))
            };
            for event in pending {
                port.on_event(&event);
                emitted_events.push(event);
            }
            match result {
                Ok(outcome) => {
                    handled_by.push(capability.id().to_string());
                    stop_dispatch |= outcome.stop_dispatch;
                }
                Err(error) => {
                    log::warn!("capability {} failed on {}: {error}", capability.id(), envelope.id);
                    let failure = CapabilityFailure {
                        capability_id: capability.id().to_string(),
                        envelope: envelope.clone(),
                        error,
                    };
                    port.on_capability_error(&failure);
                    failures.push(failure);
                }
            }
        }

        if !stop_dispatch {
            port.execute(&envelope);
        }

        DispatchResult {
            dispatched_to_port: !stop_dispatch,
            emitted_events,
            envelope,
            handled_by,
            failures,
        }
    }
}
