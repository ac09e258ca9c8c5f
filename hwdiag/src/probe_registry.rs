//! Probe registry.
//!
//! Provides a `ProbeRegistry` struct mapping probe kind names from the
//! `[[test]]` entries to probe factories. The registry is built at startup
//! and passed to `DiagCore` by value; there is no global state.

use crate::probes::register_all_probes;
use hwdiag_common::prelude::*;
use std::collections::HashMap;

/// Registry of available device probes.
pub struct ProbeRegistry {
    factories: HashMap<&'static str, ProbeFactory>,
}

impl ProbeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every built-in probe.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        register_all_probes(&mut registry);
        registry
    }

    /// Register a probe factory.
    ///
    /// # Panics
    /// Panics if a probe with the same kind is already registered.
    pub fn register(&mut self, kind: &'static str, factory: ProbeFactory) {
        if self.factories.contains_key(kind) {
            panic!("Probe '{kind}' is already registered");
        }
        self.factories.insert(kind, factory);
    }

    /// Get a probe factory by kind.
    pub fn get_factory(&self, kind: &str) -> Option<ProbeFactory> {
        self.factories.get(kind).copied()
    }

    /// Returns true if `kind` has a registered probe.
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Create a probe instance by kind.
    ///
    /// # Errors
    /// Returns `ProbeError::UnexpectedFault` if no probe with the given kind
    /// is registered.
    pub fn create(&self, kind: &str) -> Result<Box<dyn DeviceProbe>, ProbeError> {
        let factory = self.get_factory(kind).ok_or_else(|| {
            ProbeError::UnexpectedFault(format!("no probe registered for kind '{kind}'"))
        })?;
        Ok(factory())
    }

    /// List all registered probe kinds, sorted.
    pub fn list_probes(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
