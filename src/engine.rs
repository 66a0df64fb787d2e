//! Transformation engine handle.
//!
//! The engine owns the stage resolver and is the single place where sources
//! are loaded, stage identifiers become runnable programs and compiled
//! artifacts become validation programs. One engine can be shared between
//! many compilers.

use crate::core::error::{ProgramError, StageError, TreeError};
use crate::core::source::Source;
use crate::core::tree::Document;
use crate::core::types::CompilerOptions;
use crate::pipeline::StageProgram;
use crate::stages::{StageRegistry, StageResolver};
use crate::validation::ValidationProgram;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Shared handle for loading, resolving and binding.
#[derive(Default)]
pub struct TransformEngine {
    resolver: RwLock<Option<Arc<dyn StageResolver>>>,
}

impl TransformEngine {
    /// An engine without a resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine that resolves stages with `resolver`.
    pub fn with_resolver(resolver: Arc<dyn StageResolver>) -> Self {
        Self {
            resolver: RwLock::new(Some(resolver)),
        }
    }

    /// The installed resolver, if any.
    pub fn resolver(&self) -> Option<Arc<dyn StageResolver>> {
        self.resolver.read().clone()
    }

    /// Replace the resolver.
    pub fn set_resolver(&self, resolver: Arc<dyn StageResolver>) {
        *self.resolver.write() = Some(resolver);
    }

    /// Install the built-in registry unless a resolver is already present.
    ///
    /// Returns `true` if the default was installed.
    pub fn install_default_resolver(&self) -> bool {
        let mut slot = self.resolver.write();
        if slot.is_some() {
            return false;
        }
        log::debug!("Installing default stage resolver");
        *slot = Some(Arc::new(StageRegistry::with_builtins()));
        true
    }

    /// Load a source into a tree tagged with its system id.
    pub fn load(&self, source: &Source) -> Result<Document, TreeError> {
        source.load()
    }

    /// Resolve `id` and attach every option as a stage parameter.
    pub fn new_stage_program(&self, id: &str, options: &CompilerOptions) -> Result<StageProgram, StageError> {
        let resolver = self.resolver().ok_or_else(|| StageError::NotFound { id: id.to_string() })?;
        let stage = resolver.resolve(id)?;
        Ok(StageProgram::new(id, stage).with_parameters(options))
    }

    /// Bind a compiled artifact into an executable program.
    pub fn new_validation_program(&self, artifact: &Document) -> Result<ValidationProgram, ProgramError> {
        ValidationProgram::bind(artifact)
    }
}

impl fmt::Debug for TransformEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformEngine")
            .field("resolver", &self.resolver.read().as_ref().map(|_| "<resolver>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Parameters;
    use crate::pipeline::{Dialect, IdentityStage, Stage};

    #[test]
    fn test_default_resolver_installed_once() {
        let engine = TransformEngine::new();
        assert!(engine.resolver().is_none());
        assert!(engine.install_default_resolver());
        assert!(!engine.install_default_resolver());
        assert!(engine.resolver().is_some());
    }

    #[test]
    fn test_stage_program_without_resolver() {
        let engine = TransformEngine::new();
        let err = engine.new_stage_program("urn:x", &Parameters::new()).unwrap_err();
        assert!(matches!(err, StageError::NotFound { ref id } if id == "urn:x"));
    }

    #[test]
    fn test_stage_program_carries_options() {
        let engine = TransformEngine::new();
        engine.install_default_resolver();
        let options = Parameters::new().with("phase", "full").with("strict", true);
        let program = engine.new_stage_program(Dialect::Legacy.steps()[0], &options).unwrap();
        assert_eq!(program.id(), Dialect::Legacy.steps()[0]);
        assert_eq!(program.parameters().phase(), Some("full"));
        assert!(program.parameters().contains("strict"));
    }

    #[test]
    fn test_custom_resolver() {
        let resolver = |id: &str| -> Result<Arc<dyn Stage>, StageError> {
            match id {
                "urn:identity" => Ok(Arc::new(IdentityStage)),
                other => Err(StageError::NotFound { id: other.to_string() }),
            }
        };
        let engine = TransformEngine::with_resolver(Arc::new(resolver));
        assert!(engine.new_stage_program("urn:identity", &Parameters::new()).is_ok());
        assert!(engine.new_stage_program("urn:other", &Parameters::new()).is_err());
        assert!(!engine.install_default_resolver());
    }
}
