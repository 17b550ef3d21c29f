use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;

/// Named detector backends.
///
/// Backends are shared behind `Arc` because in-flight rounds call them from
/// several worker threads at once.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn DetectorBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Register a backend under its `name()`, replacing any previous one.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        self.backends.insert(name, Arc::new(backend));
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DetectorBackend>> {
        self.backends.get(name).cloned()
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a backend by name; the error lists what is registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DetectorBackend>> {
        self.get(name).ok_or_else(|| {
            anyhow!(
                "unknown detector backend '{}' (registered: {})",
                name,
                self.list().join(", ")
            )
        })
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::SyntheticBackend;

    #[test]
    fn resolves_registered_backends_by_name() {
        let mut registry = BackendRegistry::new();
        assert!(registry.resolve("synthetic").is_err());

        registry.register(SyntheticBackend::new());
        assert_eq!(registry.list(), vec!["synthetic"]);
        assert_eq!(registry.resolve("synthetic").unwrap().name(), "synthetic");

        let err = registry.resolve("onnx").err().unwrap();
        assert!(err.to_string().contains("unknown detector backend 'onnx'"));
        assert!(err.to_string().contains("registered: synthetic"));
    }
}
