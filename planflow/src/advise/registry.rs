//! Type-keyed adviser registry, populated once at startup.

use super::{Adviser, AdviserType, IgnoreFailureAdviser, OnAbortAdviser, OnFailAdviser, OnMarkSuccessAdviser, OnSuccessAdviser, RetryAdviser};
use crate::errors::ConfigurationError;
use crate::interrupt::InterruptManager;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps adviser type tags to handler instances.
///
/// Populated from an explicit list during process init; registration after
/// that is a configuration error surfaced immediately.
#[derive(Default)]
pub struct AdviserRegistry {
    advisers: HashMap<AdviserType, Arc<dyn Adviser>>,
}

impl AdviserRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with all built-in advisers registered.
    #[must_use]
    pub fn with_defaults(interrupts: Arc<InterruptManager>) -> Self {
        let mut registry = Self::new();
        // The explicit built-in list; registration cannot collide here.
        let _ = registry.register(Arc::new(RetryAdviser::new()));
        let _ = registry.register(Arc::new(IgnoreFailureAdviser::new(interrupts)));
        let _ = registry.register(Arc::new(OnSuccessAdviser));
        let _ = registry.register(Arc::new(OnFailAdviser));
        let _ = registry.register(Arc::new(OnAbortAdviser));
        let _ = registry.register(Arc::new(OnMarkSuccessAdviser));
        registry
    }

    /// Registers an adviser under its declared type.
    pub fn register(&mut self, adviser: Arc<dyn Adviser>) -> Result<(), ConfigurationError> {
        let adviser_type = adviser.adviser_type();
        if self.advisers.insert(adviser_type, adviser).is_some() {
            return Err(ConfigurationError::DuplicateAdviser {
                adviser_type: adviser_type.to_string(),
            });
        }
        Ok(())
    }

    /// Resolves the adviser registered for a type.
    #[must_use]
    pub fn resolve(&self, adviser_type: AdviserType) -> Option<Arc<dyn Adviser>> {
        self.advisers.get(&adviser_type).cloned()
    }

    /// Returns the number of registered advisers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.advisers.len()
    }

    /// Returns true if no advisers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.advisers.is_empty()
    }
}

impl std::fmt::Debug for AdviserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdviserRegistry")
            .field("types", &self.advisers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryExecutionStore;

    fn interrupt_manager() -> Arc<InterruptManager> {
        Arc::new(InterruptManager::new(Arc::new(InMemoryExecutionStore::new())))
    }

    #[test]
    fn test_defaults_cover_all_builtin_types() {
        let registry = AdviserRegistry::with_defaults(interrupt_manager());
        assert_eq!(registry.len(), 6);
        assert!(registry.resolve(AdviserType::Retry).is_some());
        assert!(registry.resolve(AdviserType::IgnoreFailure).is_some());
        assert!(registry.resolve(AdviserType::OnSuccess).is_some());
        assert!(registry.resolve(AdviserType::OnFail).is_some());
        assert!(registry.resolve(AdviserType::OnAbort).is_some());
        assert!(registry.resolve(AdviserType::OnMarkSuccess).is_some());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = AdviserRegistry::new();
        registry.register(Arc::new(OnSuccessAdviser)).unwrap();
        let result = registry.register(Arc::new(OnSuccessAdviser));
        assert!(matches!(result, Err(ConfigurationError::DuplicateAdviser { .. })));
    }

    #[test]
    fn test_resolve_unknown_type() {
        let registry = AdviserRegistry::new();
        assert!(registry.resolve(AdviserType::Retry).is_none());
    }
}
