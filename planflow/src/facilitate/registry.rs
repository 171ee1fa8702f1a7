//! Type-keyed facilitator registry, populated once at startup.

use super::{Facilitator, FacilitatorType};
use crate::errors::ConfigurationError;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps facilitator type tags to handler instances.
///
/// Exactly one facilitator may be registered per type; a second
/// registration is a configuration error surfaced immediately.
#[derive(Default)]
pub struct FacilitatorRegistry {
    facilitators: HashMap<FacilitatorType, Arc<dyn Facilitator>>,
}

impl FacilitatorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a facilitator under its declared type.
    pub fn register(&mut self, facilitator: Arc<dyn Facilitator>) -> Result<(), ConfigurationError> {
        let facilitator_type = facilitator.facilitator_type();
        if self.facilitators.insert(facilitator_type, facilitator).is_some() {
            return Err(ConfigurationError::DuplicateFacilitator {
                facilitator_type: facilitator_type.to_string(),
            });
        }
        Ok(())
    }

    /// Resolves the facilitator registered for a type.
    #[must_use]
    pub fn resolve(&self, facilitator_type: FacilitatorType) -> Option<Arc<dyn Facilitator>> {
        self.facilitators.get(&facilitator_type).cloned()
    }

    /// Returns the number of registered facilitators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facilitators.len()
    }

    /// Returns true if no facilitators are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facilitators.is_empty()
    }
}

impl std::fmt::Debug for FacilitatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorRegistry")
            .field("types", &self.facilitators.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facilitate::ChildrenFacilitator;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = FacilitatorRegistry::new();
        registry.register(Arc::new(ChildrenFacilitator::new())).unwrap();

        assert!(registry.resolve(FacilitatorType::Children).is_some());
        assert!(registry.resolve(FacilitatorType::Sync).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = FacilitatorRegistry::new();
        registry.register(Arc::new(ChildrenFacilitator::new())).unwrap();
        let result = registry.register(Arc::new(ChildrenFacilitator::new()));
        assert!(matches!(result, Err(ConfigurationError::DuplicateFacilitator { .. })));
    }
}
