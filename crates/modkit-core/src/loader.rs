//! Package discovery on disk.
//!
//! [`PackageLoader`] scans registered search paths for package directories.
//! A directory qualifies when it directly contains the manifest file named by
//! the [`ManifestReader`] (default `mod.yaml`). Scans are non-recursive and
//! never abort on a single bad directory: the failure is logged and the
//! directory skipped.

use crate::manifest::{ManifestError, ManifestRecord};
use crate::ownership::OwnershipBackends;
use crate::package::Package;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Manifest filename used when none is configured.
pub const DEFAULT_MANIFEST_FILENAME: &str = "mod.yaml";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while reading a single package directory.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// No manifest file in the directory.
    #[error("manifest not found: {0}")]
    NotFound(PathBuf),

    /// The manifest exists but could not be turned into a valid record.
    #[error("invalid manifest {path}: {detail}")]
    InvalidManifest { path: PathBuf, detail: String },

    #[error("invalid manifest {path}: {source}")]
    Validation {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// ManifestReader
// ---------------------------------------------------------------------------

/// Turns a package directory's manifest file into a [`ManifestRecord`].
pub trait ManifestReader {
    /// Name of the manifest file inside a package directory.
    fn manifest_file_name(&self) -> &str;

    /// Read the manifest of the package in `dir`.
    fn read(&self, dir: &Path) -> Result<ManifestRecord, LoaderError>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    #[serde(default = "default_manifest_file_name")]
    pub manifest_file_name: String,
}

fn default_manifest_file_name() -> String {
    DEFAULT_MANIFEST_FILENAME.to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            manifest_file_name: default_manifest_file_name(),
        }
    }
}

// ---------------------------------------------------------------------------
// PackageLoader
// ---------------------------------------------------------------------------

/// Discovers packages under a list of search paths.
pub struct PackageLoader {
    reader: Box<dyn ManifestReader>,
    backends: OwnershipBackends,
    search_paths: Vec<PathBuf>,
}

impl PackageLoader {
    pub fn new(reader: Box<dyn ManifestReader>, backends: OwnershipBackends) -> Self {
        Self {
            reader,
            backends,
            search_paths: Vec::new(),
        }
    }

    /// Build a loader and register every search path from `config`.
    pub fn from_config(
        config: &LoaderConfig,
        reader: Box<dyn ManifestReader>,
        backends: OwnershipBackends,
    ) -> Self {
        let mut loader = Self::new(reader, backends);
        for path in &config.search_paths {
            loader.add_search_path(path);
        }
        loader
    }

    /// Register a search path. Duplicates are ignored; order is preserved.
    pub fn add_search_path(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if !self.search_paths.iter().any(|p| p == path) {
            self.search_paths.push(path.to_path_buf());
        }
    }

    /// Returns true if the path was registered.
    pub fn remove_search_path(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let before = self.search_paths.len();
        self.search_paths.retain(|p| p != path);
        self.search_paths.len() != before
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn backends(&self) -> &OwnershipBackends {
        &self.backends
    }

    pub fn manifest_file_name(&self) -> &str {
        self.reader.manifest_file_name()
    }

    /// Discover packages under every search path, in registration order.
    pub fn discover(&self) -> Vec<Package> {
        let packages: Vec<Package> = self
            .search_paths
            .iter()
            .flat_map(|path| self.discover_at(path))
            .collect();
        info!(
            count = packages.len(),
            search_paths = self.search_paths.len(),
            "package discovery finished"
        );
        packages
    }

    /// Discover packages in the immediate subdirectories of `path`.
    ///
    /// Subdirectories are visited in name order so results do not depend on
    /// the filesystem's enumeration order.
    pub fn discover_at(&self, path: &Path) -> Vec<Package> {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read search path");
                return Vec::new();
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot read directory entry");
                    None
                }
            })
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        let manifest_name = self.reader.manifest_file_name();
        let mut packages = Vec::new();
        for dir in dirs {
            if !dir.join(manifest_name).is_file() {
                continue;
            }
            match self.load_mod(&dir) {
                Ok(package) => {
                    debug!(package = package.id(), path = %dir.display(), "discovered package");
                    packages.push(package);
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "skipping package directory");
                }
            }
        }
        packages
    }

    /// Build a package from a single directory.
    ///
    /// DLC manifests get their typed extension and the ownership backend their
    /// `ownership_method` selects.
    pub fn load_mod(&self, dir: &Path) -> Result<Package, LoaderError> {
        let manifest_path = dir.join(self.reader.manifest_file_name());
        if !manifest_path.is_file() {
            return Err(LoaderError::NotFound(manifest_path));
        }

        let record = self.reader.read(dir)?;
        record.validate().map_err(|source| LoaderError::Validation {
            path: manifest_path,
            source,
        })?;

        let backend = if record.is_dlc {
            self.backends.attach(&record, dir)
        } else {
            None
        };

        let mut package = Package::new(record, dir);
        package.set_ownership_backend(backend);
        Ok(package)
    }
}

impl std::fmt::Debug for PackageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageLoader")
            .field("manifest_file_name", &self.reader.manifest_file_name())
            .field("search_paths", &self.search_paths)
            .field("backends", &self.backends)
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{DlcType, OwnershipMethod};
    use crate::package::DlcExtension;
    use crate::test_utils::{MemoryManifestReader, dlc_manifest, manifest};
    use std::fs;

    fn loader_for(reader: MemoryManifestReader) -> PackageLoader {
        PackageLoader::new(Box::new(reader), OwnershipBackends::new())
    }

    #[test]
    fn discover_at_finds_manifest_dirs_only() {
        let root = tempfile::tempdir().unwrap();
        let mut reader = MemoryManifestReader::new();
        reader.stage(root.path(), manifest("beta"));
        reader.stage(root.path(), manifest("alpha"));
        fs::create_dir_all(root.path().join("no_manifest")).unwrap();
        fs::write(root.path().join("stray.txt"), "not a dir").unwrap();

        let loader = loader_for(reader);
        let ids: Vec<String> = loader
            .discover_at(root.path())
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
    }

    #[test]
    fn discover_at_is_not_recursive() {
        let root = tempfile::tempdir().unwrap();
        let mut reader = MemoryManifestReader::new();
        let outer = reader.stage(root.path(), manifest("outer"));
        reader.stage(&outer, manifest("nested"));

        let loader = loader_for(reader);
        let found = loader.discover_at(root.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "outer");
    }

    #[test]
    fn broken_manifest_skips_only_that_dir() {
        let root = tempfile::tempdir().unwrap();
        let mut reader = MemoryManifestReader::new();
        reader.stage(root.path(), manifest("good"));
        let bad = reader.stage(root.path(), manifest("bad"));
        reader.insert_broken(&bad);

        let loader = loader_for(reader);
        let found = loader.discover_at(root.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "good");
    }

    #[test]
    fn missing_search_path_yields_nothing() {
        let loader = loader_for(MemoryManifestReader::new());
        assert!(loader.discover_at(Path::new("/definitely/not/here")).is_empty());
    }

    #[test]
    fn discover_concatenates_in_registration_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let mut reader = MemoryManifestReader::new();
        reader.stage(second.path(), manifest("aaa"));
        reader.stage(first.path(), manifest("zzz"));

        let mut loader = loader_for(reader);
        loader.add_search_path(first.path());
        loader.add_search_path(second.path());
        loader.add_search_path(first.path());
        assert_eq!(loader.search_paths().len(), 2);

        let ids: Vec<String> = loader.discover().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, vec!["zzz", "aaa"]);

        assert!(loader.remove_search_path(first.path()));
        assert!(!loader.remove_search_path(first.path()));
        assert_eq!(loader.discover().len(), 1);
    }

    #[test]
    fn load_mod_without_manifest_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let loader = loader_for(MemoryManifestReader::new());
        assert!(matches!(
            loader.load_mod(root.path()),
            Err(LoaderError::NotFound(_))
        ));
    }

    #[test]
    fn load_mod_rejects_invalid_record() {
        let root = tempfile::tempdir().unwrap();
        let mut reader = MemoryManifestReader::new();
        let dir = root.path().join("blank");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DEFAULT_MANIFEST_FILENAME), "").unwrap();
        reader.insert(&dir, manifest(""));

        let loader = loader_for(reader);
        assert!(matches!(
            loader.load_mod(&dir),
            Err(LoaderError::Validation {
                source: ManifestError::MissingId,
                ..
            })
        ));
    }

    #[test]
    fn load_mod_builds_dlc_with_backend() {
        let root = tempfile::tempdir().unwrap();
        let mut reader = MemoryManifestReader::new();
        let mut m = dlc_manifest("frontier", DlcType::Map);
        m.ownership_method = OwnershipMethod::Manifest;
        m.dlc_content.map_ids = vec!["frontier_valley".to_string()];
        let dir = reader.stage(root.path(), m);

        let loader = loader_for(reader);
        let package = loader.load_mod(&dir).unwrap();
        let dlc = package.dlc().expect("dlc part");
        assert_eq!(dlc.backend().map(|b| b.backend_id()), Some("manifest"));
        assert!(matches!(dlc.extension(), DlcExtension::Map { .. }));
    }

    #[test]
    fn load_mod_license_dlc_registers_directory() {
        let root = tempfile::tempdir().unwrap();
        let mut reader = MemoryManifestReader::new();
        let mut m = dlc_manifest("deluxe", DlcType::Cosmetic);
        m.ownership_method = OwnershipMethod::License;
        let dir = reader.stage(root.path(), m);
        fs::write(dir.join("license.key"), "KEY").unwrap();

        let loader = loader_for(reader);
        let mut package = loader.load_mod(&dir).unwrap();
        assert_eq!(
            loader.backends().license.license_path("deluxe"),
            Some(dir.join("license.key"))
        );
        let state = package.dlc_mut().unwrap().verify_ownership().unwrap();
        assert_eq!(state, crate::package::OwnershipState::Owned);
    }

    #[test]
    fn config_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.manifest_file_name, "mod.yaml");
        assert!(config.search_paths.is_empty());
    }

    #[test]
    fn from_config_registers_paths() {
        let config = LoaderConfig {
            search_paths: vec![PathBuf::from("mods"), PathBuf::from("dlc")],
            ..LoaderConfig::default()
        };
        let loader = PackageLoader::from_config(
            &config,
            Box::new(MemoryManifestReader::new()),
            OwnershipBackends::new(),
        );
        assert_eq!(loader.search_paths(), config.search_paths.as_slice());
    }
}
