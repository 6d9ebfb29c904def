//! Command engine with a pluggable capability registry.
//!
//! Generic over the command type `C`, the event payload type `E` and the
//! state snapshot type `S` that capabilities can read.

pub mod capability;
pub mod catalog;
pub mod envelope;
pub mod registry;
pub mod runtime;

pub use capability::{Capability, CapabilityContext, EmitOptions, ExecuteOutcome};
pub use catalog::{CapabilityCatalog, CapabilityDefinition, CapabilityStatus, ToggleOutcome};
pub use envelope::{CommandEnvelope, CommandMeta, CommandOptions, EventEnvelope, EventOptions};
pub use registry::{BoxedCapability, CapabilityRegistry};
pub use runtime::{CapabilityFailure, CommandEngine, CommandPort, DispatchResult};
