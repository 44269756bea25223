//! Capability Registry — name → handler table shared between the loop and
//! the `register_capability` meta-capability.
//!
//! Entries are only ever added. Inserts go through an internal `RwLock` so a
//! handler holding an `Arc` to the registry can register new entries; lookups
//! clone the `Arc` out, so no lock is held while a handler runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::info;

use super::base::Capability;

/// Typed failures of registry mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("capability '{0}' is already registered")]
    DuplicateName(String),
    #[error("no extension named '{0}' in the catalog")]
    UnknownExtension(String),
    #[error("invalid registration args: {0}")]
    InvalidArgs(String),
}

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

/// Stores capabilities keyed by exact name.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: RwLock<HashMap<String, Arc<dyn Capability>>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock still holds a consistent map: inserts are single operations.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn Capability>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn Capability>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a capability. Fails if the name is taken.
    pub fn register(&self, capability: Arc<dyn Capability>) -> Result<(), RegistryError> {
        let name = capability.name().to_string();
        let mut entries = self.write();
        if entries.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        info!(capability = %name, "registered capability");
        entries.insert(name, capability);
        Ok(())
    }

    /// Look up a capability by exact name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.read().get(name).cloned()
    }

    /// Check if a capability is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Names of all registered capabilities, sorted for determinism.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// `(name, description)` pairs for every capability, sorted by name.
    pub fn listing(&self) -> Vec<(String, String)> {
        let mut listing: Vec<(String, String)> = self
            .read()
            .values()
            .map(|c| (c.name().to_string(), c.description()))
            .collect();
        listing.sort();
        listing
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Minimal test capability.
    struct Echo(&'static str);

    #[async_trait]
    impl Capability for Echo {
        fn name(&self) -> &str {
            self.0
        }
        fn documentation(&self) -> &str {
            "Echoes back the input.\nArgs: any text."
        }
        async fn execute(&self, args: &str) -> anyhow::Result<String> {
            Ok(format!("Echo: {args}"))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let reg = CapabilityRegistry::new();
        reg.register(Arc::new(Echo("echo"))).unwrap();
        assert!(reg.contains("echo"));
        assert!(!reg.contains("Echo"));
        assert!(reg.get("echo").is_some());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let reg = CapabilityRegistry::new();
        reg.register(Arc::new(Echo("echo"))).unwrap();
        let err = reg.register(Arc::new(Echo("echo"))).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("echo".into()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_names_sorted() {
        let reg = CapabilityRegistry::new();
        reg.register(Arc::new(Echo("zeta"))).unwrap();
        reg.register(Arc::new(Echo("alpha"))).unwrap();
        assert_eq!(reg.names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_listing_uses_first_doc_line() {
        let reg = CapabilityRegistry::new();
        reg.register(Arc::new(Echo("echo"))).unwrap();
        assert_eq!(
            reg.listing(),
            vec![("echo".to_string(), "Echoes back the input.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_shared_insert_through_arc() {
        let reg = Arc::new(CapabilityRegistry::new());
        let handle = Arc::clone(&reg);
        handle.register(Arc::new(Echo("late"))).unwrap();
        let cap = reg.get("late").unwrap();
        assert_eq!(cap.execute("x").await.unwrap(), "Echo: x");
    }

    #[test]
    fn test_default_empty() {
        assert!(CapabilityRegistry::default().is_empty());
    }
}
