//! Lazily built, shared validator.
//!
//! The first caller to need a validator builds it; concurrent callers wait
//! for that build and then share the same instance. A failed build leaves
//! the cache empty so a later call can try again.

use crate::validation::validator::Validator;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Holds at most one validator, built on first use.
#[derive(Debug, Default)]
pub struct ValidatorCache {
    slot: OnceLock<Arc<Validator>>,
    guard: Mutex<()>,
    constructions: AtomicUsize,
}

impl ValidatorCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached validator, if one has been built.
    pub fn get(&self) -> Option<Arc<Validator>> {
        self.slot.get().cloned()
    }

    /// Whether a validator has been built.
    pub fn is_initialized(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Number of successful builds. Never exceeds one.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::Acquire)
    }

    /// Return the cached validator, building it with `init` if absent.
    ///
    /// `init` runs at most once per successful build, under the cache lock.
    pub fn get_or_try_init<F, E>(&self, init: F) -> Result<Arc<Validator>, E>
    where
        F: FnOnce() -> Result<Validator, E>,
    {
        if let Some(validator) = self.slot.get() {
            return Ok(Arc::clone(validator));
        }

        let _lock = self.guard.lock();
        if let Some(validator) = self.slot.get() {
            return Ok(Arc::clone(validator));
        }

        let validator = Arc::new(init()?);
        self.constructions.fetch_add(1, Ordering::AcqRel);
        log::debug!("Built validator");
        Ok(Arc::clone(self.slot.get_or_init(|| validator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tree::Document;
    use crate::stages::PROGRAM_NS;
    use crate::validation::program::ValidationProgram;

    fn build() -> Result<Validator, String> {
        let doc = Document::parse(&format!(r#"<program xmlns="{}" dialect="xslt"/>"#, PROGRAM_NS), None)
            .map_err(|e| e.to_string())?;
        let program = ValidationProgram::bind(&doc).map_err(|e| e.to_string())?;
        Ok(Validator::new(program))
    }

    #[test]
    fn test_builds_once() {
        let cache = ValidatorCache::new();
        assert!(!cache.is_initialized());

        let first = cache.get_or_try_init(build).unwrap();
        let second = cache.get_or_try_init(|| -> Result<Validator, String> { panic!("rebuilt") }).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.constructions(), 1);
    }

    #[test]
    fn test_failure_leaves_cache_empty() {
        let cache = ValidatorCache::new();
        let err = cache.get_or_try_init(|| Err::<Validator, _>("broken".to_string()));
        assert_eq!(err.unwrap_err(), "broken");
        assert!(cache.get().is_none());
        assert_eq!(cache.constructions(), 0);

        assert!(cache.get_or_try_init(build).is_ok());
        assert!(cache.is_initialized());
    }

    #[test]
    fn test_concurrent_callers_share_one_build() {
        let cache = ValidatorCache::new();
        let built: Vec<Arc<Validator>> = crossbeam::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|_| cache.get_or_try_init(build).unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
        .unwrap();

        assert_eq!(cache.constructions(), 1);
        assert!(built.iter().all(|v| Arc::ptr_eq(v, &built[0])));
    }
}
