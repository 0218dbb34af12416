//! Backend plugin registry.
//!
//! Holds the set of registered backend adapters in registration order and
//! provides the iteration primitive the enumeration engine fans out over.
//! Global initialize/finalize delegate to each backend's hooks; individual
//! failures are logged and aggregated into a single `Exception`.

use std::ops::ControlFlow;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::adapter::BackendAdapter;
use crate::error::{AccelError, Result};

pub struct PluginRegistry {
    adapters: RwLock<Vec<Arc<dyn BackendAdapter>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(Vec::new()),
        }
    }

    /// Register a backend. Registration order fixes iteration order.
    pub fn register(&self, adapter: Arc<dyn BackendAdapter>) {
        tracing::info!("backend registered: {}", adapter.name());
        self.adapters.write().push(adapter);
    }

    /// Run every backend's startup hook.
    pub fn initialize(&self) -> Result<()> {
        let mut errors = 0u32;
        for adapter in self.adapters.read().iter() {
            if let Err(err) = adapter.initialize() {
                tracing::warn!(backend = adapter.name(), %err, "backend initialization failed");
                errors += 1;
            }
        }
        if errors > 0 {
            return Err(AccelError::Exception);
        }
        Ok(())
    }

    /// Run every backend's shutdown hook.
    pub fn finalize(&self) -> Result<()> {
        let mut errors = 0u32;
        for adapter in self.adapters.read().iter() {
            if let Err(err) = adapter.finalize() {
                tracing::warn!(backend = adapter.name(), %err, "backend finalization failed");
                errors += 1;
            }
        }
        if errors > 0 {
            return Err(AccelError::Exception);
        }
        Ok(())
    }

    /// Invoke `f` once per adapter in registration order until it breaks.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<dyn BackendAdapter>) -> ControlFlow<()>,
    {
        for adapter in self.adapters.read().iter() {
            if f(adapter).is_break() {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.adapters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
