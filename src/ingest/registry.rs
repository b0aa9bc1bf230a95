use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::FrameSource;

/// Source handle shared between the registry and running sampling loops.
pub type SharedSource = Arc<Mutex<dyn FrameSource>>;

/// Registry of frame sources, keyed by camera name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, SharedSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under `name`, replacing any previous one.
    pub fn register<S: FrameSource + 'static>(&mut self, name: impl Into<String>, source: S) {
        self.sources
            .insert(name.into(), Arc::new(Mutex::new(source)));
    }

    pub fn get(&self, name: &str) -> Option<SharedSource> {
        self.sources.get(name).cloned()
    }

    /// Resolve a configured camera name.
    pub fn resolve(&self, name: &str) -> Result<SharedSource> {
        self.get(name)
            .ok_or_else(|| anyhow!("unable to get camera {} for count classifier", name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// List registered sources, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }
}
