//! Capabilities the agent may request: trait, registry, executor, built-ins.

pub mod base;
pub mod executor;
pub mod extensions;
pub mod filesystem;
pub mod registry;
pub mod shell;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;

use agentry_core::config::schema::ToolsConfig;

pub use base::Capability;
pub use executor::{CapabilityExecutor, CapabilityResult, FailureClassifier};
pub use extensions::{ExtensionCatalog, ExtensionContext, RegisterCapability};
pub use registry::{CapabilityRegistry, RegistryError};

use filesystem::{ReadFileCapability, WriteFileCapability};
use shell::RunCmdCapability;
use web::SearchWebCapability;

/// Settings for the built-in capability set.
#[derive(Clone, Debug)]
pub struct CapabilityOptions {
    /// Working directory for `run_cmd`; also the file sandbox when restricted.
    pub workspace: PathBuf,
    pub restrict_to_workspace: bool,
    pub exec_timeout: u64,
    pub brave_api_key: Option<String>,
    pub search_max_results: u32,
}

impl CapabilityOptions {
    pub fn from_config(workspace: PathBuf, tools: &ToolsConfig) -> Self {
        Self {
            workspace,
            restrict_to_workspace: tools.restrict_to_workspace,
            exec_timeout: tools.exec.timeout,
            brave_api_key: Some(tools.web.search.api_key.clone()).filter(|k| !k.is_empty()),
            search_max_results: tools.web.search.max_results,
        }
    }
}

/// Build the registry with the built-in capabilities and the
/// `register_capability` meta-capability over the builtin catalog.
pub fn builtin_registry(opts: &CapabilityOptions) -> Result<Arc<CapabilityRegistry>, RegistryError> {
    let registry = Arc::new(CapabilityRegistry::new());
    let allowed_dir = opts.restrict_to_workspace.then(|| opts.workspace.clone());

    registry.register(Arc::new(WriteFileCapability::new(allowed_dir.clone())))?;
    registry.register(Arc::new(ReadFileCapability::new(allowed_dir.clone())))?;
    registry.register(Arc::new(RunCmdCapability::new(
        opts.workspace.clone(),
        Some(opts.exec_timeout),
        opts.restrict_to_workspace,
    )))?;
    registry.register(Arc::new(SearchWebCapability::new(
        opts.brave_api_key.clone(),
        Some(opts.search_max_results),
    )))?;

    let meta = RegisterCapability::new(
        &registry,
        ExtensionCatalog::builtin(),
        ExtensionContext { allowed_dir },
    );
    registry.register(Arc::new(meta))?;

    Ok(registry)
}
