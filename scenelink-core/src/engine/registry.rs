//! Ordered capability registry keyed by id.

use std::fmt;

use crate::error::RegistryError;

use super::capability::Capability;

pub type BoxedCapability<C, E, S> = Box<dyn Capability<C, E, S>>;

/// Capabilities in registration order. Ids are unique.
pub struct CapabilityRegistry<C, E, S> {
    capabilities: Vec<BoxedCapability<C, E, S>>,
}

impl<C, E, S> Default for CapabilityRegistry<C, E, S> {
    fn default() -> Self {
        Self {
            capabilities: Vec::new(),
        }
    }
}

impl<C, E, S> CapabilityRegistry<C, E, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: BoxedCapability<C, E, S>) -> Result<(), RegistryError> {
        if self.contains(capability.id()) {
            return Err(RegistryError::DuplicateCapability(capability.id().to_string()));
        }
        log::debug!("registered capability {}", capability.id());
        self.capabilities.push(capability);
        Ok(())
    }

    /// Remove by id. Returns whether anything was removed.
    pub fn unregister(&mut self, id: &str) -> bool {
        let before = self.capabilities.len();
        self.capabilities.retain(|capability| capability.id() != id);
        let removed = self.capabilities.len() != before;
        if removed {
            log::debug!("unregistered capability {id}");
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.capabilities.iter().any(|capability| capability.id() == id)
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.capabilities.iter().map(|capability| capability.id()).collect()
    }

    /// Ids of capabilities that accept `command`, in registration order.
    pub fn matching(&self, command: &C) -> Vec<&str> {
        self.capabilities
            .iter()
            .filter(|capability| capability.can_handle(command))
            .map(|capability| capability.id())
            .collect()
    }

    pub fn clear(&mut self) {
        self.capabilities.clear();
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut BoxedCapability<C, E, S>> {
        self.capabilities.iter_mut()
    }
}

impl<C, E, S> fmt::Debug for CapabilityRegistry<C, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
