//! Known capability definitions and their enable/disable toggling.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::RegistryError;

use super::registry::{BoxedCapability, CapabilityRegistry};

type Factory<C, E, S> = Box<dyn Fn() -> BoxedCapability<C, E, S> + Send>;

/// Blueprint for a capability that can be switched on at runtime.
pub struct CapabilityDefinition<C, E, S> {
    pub id: String,
    pub description: String,
    pub default_enabled: bool,
    factory: Factory<C, E, S>,
}

impl<C, E, S> CapabilityDefinition<C, E, S> {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        default_enabled: bool,
        factory: impl Fn() -> BoxedCapability<C, E, S> + Send + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            default_enabled,
            factory: Box::new(factory),
        }
    }
}

/// Result of a toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    Changed,
    Noop,
    NotFound,
}

impl ToggleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Changed => "changed",
            Self::Noop => "noop",
            Self::NotFound => "not_found",
        }
    }
}

/// Reported state of one defined capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityStatus {
    pub id: String,
    pub description: String,
    pub default_enabled: bool,
    pub enabled: bool,
}

/// Catalog of definitions. Enabled means "registered in the registry".
pub struct CapabilityCatalog<C, E, S> {
    definitions: BTreeMap<String, CapabilityDefinition<C, E, S>>,
}

impl<C, E, S> Default for CapabilityCatalog<C, E, S> {
    fn default() -> Self {
        Self {
            definitions: BTreeMap::new(),
        }
    }
}

impl<C, E, S> CapabilityCatalog<C, E, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, definition: CapabilityDefinition<C, E, S>) -> Result<(), RegistryError> {
        if self.definitions.contains_key(&definition.id) {
            return Err(RegistryError::DuplicateCapability(definition.id));
        }
        self.definitions.insert(definition.id.clone(), definition);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&CapabilityDefinition<C, E, S>> {
        self.definitions.get(id)
    }

    /// Register or unregister `id` so its enabled state matches `enabled`.
    pub fn set_enabled(&self, registry: &mut CapabilityRegistry<C, E, S>, id: &str, enabled: bool) -> ToggleOutcome {
        let Some(definition) = self.definitions.get(id) else {
            return ToggleOutcome::NotFound;
        };
        if registry.contains(id) == enabled {
            return ToggleOutcome::Noop;
        }
        if enabled {
            match registry.register((definition.factory)()) {
                Ok(()) => ToggleOutcome::Changed,
                Err(err) => {
                    log::warn!("capability {id} not enabled: {err}");
                    ToggleOutcome::Noop
                }
            }
        } else {
            registry.unregister(id);
            ToggleOutcome::Changed
        }
    }

    /// Enable every definition whose default is on.
    pub fn install_defaults(&self, registry: &mut CapabilityRegistry<C, E, S>) {
        for definition in self.definitions.values().filter(|definition| definition.default_enabled) {
            self.set_enabled(registry, &definition.id, true);
        }
    }

    /// Status of every definition, sorted by id.
    pub fn statuses(&self, registry: &CapabilityRegistry<C, E, S>) -> Vec<CapabilityStatus> {
        self.definitions
            .values()
            .map(|definition| CapabilityStatus {
                id: definition.id.clone(),
                description: definition.description.clone(),
                default_enabled: definition.default_enabled,
                enabled: registry.contains(&definition.id),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl<C, E, S> fmt::Debug for CapabilityCatalog<C, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.definitions.keys()).finish()
    }
}
