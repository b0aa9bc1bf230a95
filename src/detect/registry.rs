use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;

/// Detector handle shared between the registry and running sampling loops.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
pub type SharedDetector = Arc<Mutex<dyn DetectorBackend>>;

/// Thread-safe registry of detector backends, keyed by configured name.
#[derive(Clone, Default)]
pub struct DetectorRegistry {
    backends: HashMap<String, SharedDetector>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under `name`, replacing any previous one.
    pub fn register<B: DetectorBackend + 'static>(&mut self, name: impl Into<String>, backend: B) {
        self.backends
            .insert(name.into(), Arc::new(Mutex::new(backend)));
    }

    /// Register an already-shared backend (e.g. one a test keeps a handle to).
    pub fn register_shared(&mut self, name: impl Into<String>, backend: SharedDetector) {
        self.backends.insert(name.into(), backend);
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<SharedDetector> {
        self.backends.get(name).cloned()
    }

    /// Resolve a configured detector name.
    pub fn resolve(&self, name: &str) -> Result<SharedDetector> {
        self.get(name)
            .ok_or_else(|| anyhow!("unable to get vision service {} for count classifier", name))
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}
