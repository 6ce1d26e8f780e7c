use std::path::{Path, PathBuf};

use async_trait::async_trait;
use onec_rdbg::ModuleId;
use parking_lot::RwLock;

use crate::config::LaunchConfig;
use crate::error::DebugResult;

/// Maps source files to debug server module identities and back.
///
/// Parsing the configuration dump on disk is the provider's business; the
/// adapter only asks for lookups once [`MetadataProvider::init`] succeeded.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn init(&self, config: &LaunchConfig) -> DebugResult<()>;

    fn module_by_path(&self, path: &Path) -> Option<ModuleId>;

    fn path_by_module(&self, module: &ModuleId) -> Option<PathBuf>;
}

/// Upper-cases the first character of a path (`c:\src` and `C:\src` name the
/// same file on Windows).
pub fn capitalize_first_char(path: &str) -> String {
    let mut chars = path.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A fixed path/module table.
#[derive(Debug, Default)]
pub struct InMemoryMetadata {
    modules: RwLock<Vec<(PathBuf, ModuleId)>>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, module: ModuleId) {
        let path = path.into();
        let mut modules = self.modules.write();
        modules.retain(|(known, _)| *known != path);
        modules.push((path, module));
    }
}

#[async_trait]
impl MetadataProvider for InMemoryMetadata {
    async fn init(&self, _config: &LaunchConfig) -> DebugResult<()> {
        Ok(())
    }

    fn module_by_path(&self, path: &Path) -> Option<ModuleId> {
        self.modules
            .read()
            .iter()
            .find(|(known, _)| known == path)
            .map(|(_, module)| module.clone())
    }

    fn path_by_module(&self, module: &ModuleId) -> Option<PathBuf> {
        self.modules
            .read()
            .iter()
            .find(|(_, known)| known == module)
            .map(|(path, _)| path.clone())
    }
}
