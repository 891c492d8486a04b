//! Effect registry
//!
//! Static map from effect kind to factory. The map is fixed once built, so a
//! kind resolves the same way for the whole process.

use super::isolation::IsolationEffect;
use super::{EffectInstantiator, EffectKind, EffectUnit};
use crate::error::EffectError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces a fresh effect instance
pub type EffectFactory = Arc<dyn Fn() -> Result<Box<dyn EffectUnit>, EffectError> + Send + Sync>;

/// Factory-backed instantiator
#[derive(Clone, Default)]
pub struct EffectRegistry {
    factories: HashMap<EffectKind, EffectFactory>,
}

impl EffectRegistry {
    /// Registry that resolves nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in isolation effect under
    /// [`EffectKind::SOUND_ISOLATION`]
    pub fn builtin() -> Self {
        Self::empty().with(EffectKind::SOUND_ISOLATION, || {
            Ok(Box::new(IsolationEffect::new()) as Box<dyn EffectUnit>)
        })
    }

    /// Add or replace the factory for `kind`
    pub fn with<F>(mut self, kind: EffectKind, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn EffectUnit>, EffectError> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
        self
    }
}

impl EffectInstantiator for EffectRegistry {
    fn instantiate(&self, kind: &EffectKind) -> Option<Box<dyn EffectUnit>> {
        let Some(factory) = self.factories.get(kind) else {
            debug!(kind = %kind, "no effect component matches");
            return None;
        };

        match factory() {
            Ok(unit) => {
                debug!(kind = %kind, name = unit.name(), "effect instantiated");
                Some(unit)
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "effect component failed to instantiate");
                None
            }
        }
    }
}

lazy_static::lazy_static! {
    static ref BUILTIN_REGISTRY: Arc<EffectRegistry> = Arc::new(EffectRegistry::builtin());
}

/// Process-wide registry of built-in effects
pub fn builtin_registry() -> Arc<EffectRegistry> {
    BUILTIN_REGISTRY.clone()
}

/// Instantiator used when the caller does not supply one
///
/// On macOS kinds resolve through the AudioComponent registry; elsewhere
/// through the built-in registry.
pub fn default_instantiator() -> Arc<dyn EffectInstantiator> {
    #[cfg(target_os = "macos")]
    {
        let instantiator: Arc<dyn EffectInstantiator> =
            Arc::new(super::audio_unit::AudioComponentInstantiator::new());
        instantiator
    }
    #[cfg(not(target_os = "macos"))]
    {
        let registry: Arc<dyn EffectInstantiator> = builtin_registry();
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::FourCc;

    #[test]
    fn test_builtin_resolves_sound_isolation() {
        let registry = EffectRegistry::builtin();
        let unit = registry.instantiate(&EffectKind::SOUND_ISOLATION).unwrap();
        assert_eq!(unit.kind(), EffectKind::SOUND_ISOLATION);
    }

    #[test]
    fn test_unknown_kind_is_none() {
        let registry = EffectRegistry::builtin();
        let kind = EffectKind::new(
            FourCc::from_bytes(*b"aufx"),
            FourCc::from_bytes(*b"none"),
            FourCc::from_bytes(*b"test"),
        );
        assert!(registry.instantiate(&kind).is_none());
        assert!(EffectRegistry::empty()
            .instantiate(&EffectKind::SOUND_ISOLATION)
            .is_none());
    }

    #[test]
    fn test_failing_factory_is_none() {
        let registry = EffectRegistry::empty().with(EffectKind::SOUND_ISOLATION, || {
            Err(EffectError::Factory("no license".to_string()))
        });
        assert!(registry.instantiate(&EffectKind::SOUND_ISOLATION).is_none());
    }

    #[test]
    fn test_each_instantiation_is_fresh() {
        let registry = builtin_registry();
        let a = registry.instantiate(&EffectKind::SOUND_ISOLATION).unwrap();
        let b = registry.instantiate(&EffectKind::SOUND_ISOLATION).unwrap();
        let ta = a.parameters().parameter_tree().unwrap();
        let tb = b.parameters().parameter_tree().unwrap();
        assert!(!Arc::ptr_eq(&ta, &tb));
    }
}
