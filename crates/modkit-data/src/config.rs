//! Settings files for the loader and manager.

use modkit_core::loader::{LoaderConfig, PackageLoader};
use modkit_core::manager::{ManagerConfig, PackageManager};
use modkit_core::ownership::OwnershipBackends;
use serde::Deserialize;
use std::path::Path;

use crate::loader::{DataLoadError, deserialize_file};
use crate::manifest::FileManifestReader;

/// Top-level settings file: a `[loader]` and a `[manager]` section, both
/// optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModkitConfig {
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
}

impl ModkitConfig {
    /// Read settings from a YAML, RON, TOML, or JSON file.
    pub fn load(path: &Path) -> Result<Self, DataLoadError> {
        deserialize_file(path)
    }

    /// Build a manager that reads manifests from disk with these settings.
    pub fn build_manager(
        &self,
        backends: OwnershipBackends,
    ) -> Result<PackageManager, DataLoadError> {
        let reader = FileManifestReader::with_file_name(&self.loader.manifest_file_name)?;
        let loader = PackageLoader::from_config(&self.loader, Box::new(reader), backends);
        Ok(PackageManager::new(loader).with_config(&self.manager))
    }
}
