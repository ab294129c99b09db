//! Backend registry: explicit map from backend name to constructor.

use std::collections::HashMap;
use std::sync::Arc;

use super::{BoxedStore, MemoryStore, RelayStore, StoreConfig};
use crate::error::{Result, StoreError};

/// Builds one storage handle from backend addresses and options
pub type Constructor = Arc<dyn Fn(&[String], &StoreConfig) -> Result<BoxedStore> + Send + Sync>;

/// Named backend constructors, populated at process start
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: HashMap<String, Constructor>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in backends.
    ///
    /// `memory` handles all share one key space owned by this registry.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        let memory = MemoryStore::new();
        registry.register("memory", move |_, _| Ok(Box::new(memory.clone()) as BoxedStore));
        registry.register("relay", |addresses, config| {
            Ok(Box::new(RelayStore::new(addresses, config)?) as BoxedStore)
        });

        registry
    }

    /// Register or replace a constructor
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&[String], &StoreConfig) -> Result<BoxedStore> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered backend names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Open a new handle on the named backend
    pub fn open(
        &self,
        name: &str,
        addresses: &[String],
        config: &StoreConfig,
    ) -> Result<BoxedStore> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| StoreError::UnknownBackend(name.to_string()))?;
        constructor(addresses, config)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
