//! Runtime capability registration through a reviewed, compiled-in catalog.
//!
//! `register_capability` never loads code. The oracle names an extension id
//! from [`ExtensionCatalog`]; its factory builds the handler and the result
//! is inserted into the shared registry under a collision guard.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::info;

use super::base::{require_args, Capability};
use super::filesystem::{EditFileCapability, ListDirCapability};
use super::registry::{CapabilityRegistry, RegistryError};

/// Inputs every extension factory may draw on.
#[derive(Clone, Debug, Default)]
pub struct ExtensionContext {
    /// Directory file-based extensions are confined to, if any.
    pub allowed_dir: Option<PathBuf>,
}

type Factory = fn(&ExtensionContext) -> Arc<dyn Capability>;

/// One reviewed extension.
#[derive(Clone)]
pub struct Extension {
    pub id: &'static str,
    pub summary: &'static str,
    factory: Factory,
}

impl Extension {
    pub fn new(id: &'static str, summary: &'static str, factory: Factory) -> Self {
        Self { id, summary, factory }
    }
}

fn list_dir(ctx: &ExtensionContext) -> Arc<dyn Capability> {
    Arc::new(ListDirCapability::new(ctx.allowed_dir.clone()))
}

fn edit_file(ctx: &ExtensionContext) -> Arc<dyn Capability> {
    Arc::new(EditFileCapability::new(ctx.allowed_dir.clone()))
}

fn current_time(_ctx: &ExtensionContext) -> Arc<dyn Capability> {
    Arc::new(CurrentTimeCapability)
}

// ─────────────────────────────────────────────
// ExtensionCatalog
// ─────────────────────────────────────────────

/// The set of capabilities that may be registered at runtime.
#[derive(Clone, Default)]
pub struct ExtensionCatalog {
    extensions: BTreeMap<&'static str, Extension>,
}

impl ExtensionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog shipped with the binary.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.add(Extension::new("list_dir", "list directory entries", list_dir));
        catalog.add(Extension::new("edit_file", "replace text inside a file", edit_file));
        catalog.add(Extension::new("current_time", "report the local date and time", current_time));
        catalog
    }

    pub fn add(&mut self, extension: Extension) {
        self.extensions.insert(extension.id, extension);
    }

    pub fn get(&self, id: &str) -> Option<&Extension> {
        self.extensions.get(id)
    }

    /// Extension ids, sorted.
    pub fn ids(&self) -> Vec<&'static str> {
        self.extensions.keys().copied().collect()
    }

    /// Build the handler for `id`.
    pub fn instantiate(
        &self,
        id: &str,
        ctx: &ExtensionContext,
    ) -> Result<Arc<dyn Capability>, RegistryError> {
        self.get(id)
            .map(|ext| (ext.factory)(ctx))
            .ok_or_else(|| RegistryError::UnknownExtension(id.to_string()))
    }
}

impl std::fmt::Debug for ExtensionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.extensions.keys()).finish()
    }
}

// ─────────────────────────────────────────────
// RegisterCapability (meta-capability)
// ─────────────────────────────────────────────

/// Adds catalog extensions to the registry that owns it.
///
/// Holds a `Weak` handle: the registry owns this capability, so a strong
/// reference would form a cycle.
pub struct RegisterCapability {
    registry: Weak<CapabilityRegistry>,
    catalog: ExtensionCatalog,
    ctx: ExtensionContext,
    documentation: String,
}

impl RegisterCapability {
    pub fn new(
        registry: &Arc<CapabilityRegistry>,
        catalog: ExtensionCatalog,
        ctx: ExtensionContext,
    ) -> Self {
        let listed: Vec<String> = catalog
            .extensions
            .values()
            .map(|e| format!("{} ({})", e.id, e.summary))
            .collect();
        // Only the first line reaches the capability list.
        let documentation = format!(
            "Register a capability from the built-in catalog ({}). Args: \"name|extension\" or \"extension\".\n\
             Extensions: {}.",
            catalog.ids().join(", "),
            listed.join(", ")
        );
        Self {
            registry: Arc::downgrade(registry),
            catalog,
            ctx,
            documentation,
        }
    }

    /// Parse `"name|extension"` or `"extension"` into `(name, extension)`.
    fn parse_args(args: &str) -> Result<(String, String), RegistryError> {
        let trimmed = args.trim();
        let (name, ext) = match trimmed.split_once('|') {
            Some((name, ext)) => (name.trim(), ext.trim()),
            None => (trimmed, trimmed),
        };
        if name.is_empty() || ext.is_empty() {
            return Err(RegistryError::InvalidArgs(format!(
                "expected \"name|extension\" or \"extension\", got \"{trimmed}\""
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(RegistryError::InvalidArgs(format!(
                "capability name '{name}' may only contain letters, digits, '_' and '-'"
            )));
        }
        Ok((name.to_string(), ext.to_string()))
    }
}

#[async_trait]
impl Capability for RegisterCapability {
    fn name(&self) -> &str {
        "register_capability"
    }

    fn documentation(&self) -> &str {
        &self.documentation
    }

    async fn execute(&self, args: &str) -> anyhow::Result<String> {
        let args = require_args(args, "register_capability", "an extension id")?;
        let (name, ext) = Self::parse_args(args)?;

        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("capability registry is no longer available"))?;

        if registry.contains(&name) {
            return Err(RegistryError::DuplicateName(name).into());
        }

        let handler = self.catalog.instantiate(&ext, &self.ctx)?;
        let capability: Arc<dyn Capability> = if handler.name() == name {
            handler
        } else {
            Arc::new(Renamed {
                name: name.clone(),
                inner: handler,
            })
        };

        registry.register(capability)?;
        info!(capability = %name, extension = %ext, "capability registered at runtime");
        Ok(format!(
            "Registered capability '{name}' (extension '{ext}'). It is now available."
        ))
    }
}

/// A catalog handler exposed under a caller-chosen name.
struct Renamed {
    name: String,
    inner: Arc<dyn Capability>,
}

#[async_trait]
impl Capability for Renamed {
    fn name(&self) -> &str {
        &self.name
    }

    fn documentation(&self) -> &str {
        self.inner.documentation()
    }

    async fn execute(&self, args: &str) -> anyhow::Result<String> {
        self.inner.execute(args).await
    }
}

// ─────────────────────────────────────────────
// CurrentTimeCapability
// ─────────────────────────────────────────────

/// Reports the local date and time.
pub struct CurrentTimeCapability;

#[async_trait]
impl Capability for CurrentTimeCapability {
    fn name(&self) -> &str {
        "current_time"
    }

    fn documentation(&self) -> &str {
        "Get the current local date and time. Args: ignored."
    }

    async fn execute(&self, _args: &str) -> anyhow::Result<String> {
        let now = chrono::Local::now();
        Ok(now.format("%Y-%m-%d %H:%M:%S (%A) %:z").to_string())
    }
}
