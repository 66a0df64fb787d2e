//! Stage registry: maps stage identifiers to stage factories.

use crate::core::error::StageError;
use crate::pipeline::stage::Stage;
use indexmap::IndexMap;
use std::sync::Arc;

/// Turns a stage identifier into an executable stage.
pub trait StageResolver: Send + Sync {
    /// Resolve `id` to a stage.
    fn resolve(&self, id: &str) -> Result<Arc<dyn Stage>, StageError>;
}

impl<F> StageResolver for F
where
    F: Fn(&str) -> Result<Arc<dyn Stage>, StageError> + Send + Sync,
{
    fn resolve(&self, id: &str) -> Result<Arc<dyn Stage>, StageError> {
        self(id)
    }
}

/// Factory function for creating stage instances.
pub type StageFactory = Arc<dyn Fn() -> Arc<dyn Stage> + Send + Sync>;

/// Registry entry containing the factory and bookkeeping.
#[derive(Clone)]
pub struct RegistryEntry {
    /// How the stage is produced.
    pub provider: StageProvider,
    /// Short description for listings.
    pub description: String,
    /// Whether this stage is enabled.
    pub enabled: bool,
}

/// How a registry entry produces its stage.
#[derive(Clone)]
pub enum StageProvider {
    /// A fresh stage per resolution.
    Factory(StageFactory),
    /// One shared instance handed out on every resolution.
    Shared(Arc<dyn Stage>),
}

/// Registry of available stages, keyed by identifier.
///
/// This is the default [`StageResolver`]. Identifiers keep registration order
/// so listings are stable.
pub struct StageRegistry {
    stages: IndexMap<String, RegistryEntry>,
}

impl StageRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            stages: IndexMap::new(),
        }
    }

    /// Create a registry pre-populated with the built-in stages of both dialects.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::stages::register_all(&mut registry);
        registry
    }

    /// Register a stage factory under `id`, replacing any previous entry.
    pub fn register<F>(&mut self, id: impl Into<String>, description: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Stage> + Send + Sync + 'static,
    {
        self.stages.insert(
            id.into(),
            RegistryEntry {
                provider: StageProvider::Factory(Arc::new(factory)),
                description: description.into(),
                enabled: true,
            },
        );
    }

    /// Register one stage instance shared by every resolution of `id`.
    pub fn register_shared(&mut self, id: impl Into<String>, stage: Arc<dyn Stage>) {
        let description = stage.name().to_string();
        self.stages.insert(
            id.into(),
            RegistryEntry {
                provider: StageProvider::Shared(stage),
                description,
                enabled: true,
            },
        );
    }

    /// Create a stage by identifier, if registered and enabled.
    pub fn create(&self, id: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(id).filter(|e| e.enabled).map(|e| match &e.provider {
            StageProvider::Factory(f) => f(),
            StageProvider::Shared(s) => Arc::clone(s),
        })
    }

    /// Get a registry entry.
    pub fn get_entry(&self, id: &str) -> Option<&RegistryEntry> {
        self.stages.get(id)
    }

    /// Check if a stage is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.stages.contains_key(id)
    }

    /// Get all registered stage identifiers.
    pub fn stage_ids(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(|s| s.as_str())
    }

    /// Get all registered stages.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &RegistryEntry)> {
        self.stages.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Enable or disable a stage.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        if let Some(entry) = self.stages.get_mut(id) {
            entry.enabled = enabled;
            true
        } else {
            false
        }
    }

    /// Unregister a stage.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.stages.shift_remove(id).is_some()
    }

    /// Get the total number of registered stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl StageResolver for StageRegistry {
    fn resolve(&self, id: &str) -> Result<Arc<dyn Stage>, StageError> {
        match self.stages.get(id) {
            None => Err(StageError::NotFound { id: id.to_string() }),
            Some(entry) if !entry.enabled => Err(StageError::Disabled { id: id.to_string() }),
            Some(_) => self
                .create(id)
                .ok_or_else(|| StageError::NotFound { id: id.to_string() }),
        }
    }
}

/// Builder for creating a customized registry.
pub struct RegistryBuilder {
    registry: StageRegistry,
    include_builtins: bool,
}

impl RegistryBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            registry: StageRegistry::new(),
            include_builtins: true,
        }
    }

    /// Include or exclude built-in stages.
    pub fn with_builtins(mut self, include: bool) -> Self {
        self.include_builtins = include;
        self
    }

    /// Register a custom stage. Custom stages override built-ins with the same id.
    pub fn register<F>(mut self, id: impl Into<String>, description: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Stage> + Send + Sync + 'static,
    {
        self.registry.register(id, description, factory);
        self
    }

    /// Build the registry.
    pub fn build(self) -> StageRegistry {
        let mut registry = if self.include_builtins {
            StageRegistry::with_builtins()
        } else {
            StageRegistry::new()
        };
        for (id, entry) in self.registry.stages {
            registry.stages.insert(id, entry);
        }
        registry
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::IdentityStage;
    use crate::pipeline::Dialect;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = StageRegistry::new();
        registry.register("urn:test:id", "identity", || Arc::new(IdentityStage));

        assert!(registry.contains("urn:test:id"));
        let stage = registry.resolve("urn:test:id").unwrap();
        assert_eq!(stage.name(), "identity");
    }

    #[test]
    fn test_unknown_stage() {
        let registry = StageRegistry::new();
        let err = registry.resolve("urn:nope").err().unwrap();
        assert!(matches!(err, StageError::NotFound { .. }));
    }

    #[test]
    fn test_enable_disable() {
        let mut registry = StageRegistry::new();
        registry.register("s", "identity", || Arc::new(IdentityStage));

        registry.set_enabled("s", false);
        assert!(registry.create("s").is_none());
        assert!(matches!(registry.resolve("s").err().unwrap(), StageError::Disabled { .. }));

        registry.set_enabled("s", true);
        assert!(registry.resolve("s").is_ok());
    }

    #[test]
    fn test_unregister() {
        let mut registry = StageRegistry::new();
        registry.register("s", "identity", || Arc::new(IdentityStage));
        assert!(registry.unregister("s"));
        assert!(!registry.contains("s"));
        assert!(!registry.unregister("s"));
    }

    #[test]
    fn test_builtins_cover_both_dialects() {
        let registry = StageRegistry::with_builtins();
        for dialect in [Dialect::Legacy, Dialect::Modern] {
            for id in dialect.steps() {
                assert!(registry.resolve(id).is_ok(), "missing {}", id);
            }
        }
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_builder_overrides_builtin() {
        let id = Dialect::Legacy.steps()[0];
        let registry = RegistryBuilder::new()
            .register(id, "identity", || Arc::new(IdentityStage))
            .build();
        assert_eq!(registry.resolve(id).unwrap().name(), "identity");
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |id: &str| -> Result<Arc<dyn Stage>, StageError> {
            if id == "only" {
                Ok(Arc::new(IdentityStage))
            } else {
                Err(StageError::NotFound { id: id.to_string() })
            }
        };
        assert!(resolver.resolve("only").is_ok());
        assert!(resolver.resolve("other").is_err());
    }
}
