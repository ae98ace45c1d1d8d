//! Resolution of on-disk manifests into [`ManifestRecord`]s, and the
//! file-backed [`ManifestReader`].

use modkit_core::loader::{DEFAULT_MANIFEST_FILENAME, LoaderError, ManifestReader};
use modkit_core::manifest::{
    Dependency, DlcType, ManifestRecord, OwnershipMethod, PackageKind, Priority,
};
use std::path::{Path, PathBuf};

use crate::loader::{DataLoadError, deserialize_file, detect_format};
use crate::schema::*;

// ===========================================================================
// Resolution
// ===========================================================================

/// Read and resolve the manifest at `path`.
pub fn load_manifest(path: &Path) -> Result<ManifestRecord, DataLoadError> {
    let data: ManifestData = deserialize_file(path)?;
    resolve_manifest(data, path)
}

/// Turn a deserialized manifest into a record. `path` is only used for error
/// reports.
pub fn resolve_manifest(data: ManifestData, path: &Path) -> Result<ManifestRecord, DataLoadError> {
    let id = data
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| DataLoadError::Parse {
            file: path.to_path_buf(),
            detail: "missing required field 'id'".to_string(),
        })?;

    let kind = match data.kind.as_deref() {
        None => PackageKind::default(),
        Some(kind) => parse_kind(kind, path)?,
    };
    let priority = match data.priority {
        None => Priority::NORMAL,
        Some(PriorityData::Value(v)) => v,
        Some(PriorityData::Named(name)) => {
            Priority::from_name(&name).ok_or_else(|| invalid(path, "priority", &name))?
        }
    };
    let dlc_type = data
        .dlc_type
        .as_deref()
        .map(|t| parse_dlc_type(t, path))
        .transpose()?;
    let ownership_method = match data.ownership_method.as_deref() {
        None => OwnershipMethod::None,
        Some(method) => {
            OwnershipMethod::parse(method).ok_or_else(|| invalid(path, "ownership_method", method))?
        }
    };

    let dependencies = data
        .dependencies
        .into_iter()
        .map(|dep| match dep {
            DependencyData::Short(mod_id) => Dependency::required(mod_id),
            DependencyData::Full {
                mod_id,
                min_version,
                optional,
            } => Dependency {
                mod_id,
                min_version,
                optional,
            },
        })
        .collect();

    Ok(ManifestRecord {
        id,
        name: data.name,
        version: data.version,
        author: data.author,
        description: data.description,
        kind,
        priority,
        dependencies,
        load_after: data.load_after,
        load_before: data.load_before,
        data_path: data.data_path,
        entry_point: data.entry_point,
        is_dlc: data.is_dlc,
        dlc_type,
        steam_app_id: data.steam_app_id,
        store_id: data.store_id,
        price_string: data.price_string,
        release_date: data.release_date,
        min_game_version: data.min_game_version,
        ownership_method,
        trial_enabled: data.trial_enabled,
        trial_content_ids: data.trial_content_ids,
        dlc_content: data.content,
    })
}

fn invalid(path: &Path, field: &'static str, value: &str) -> DataLoadError {
    DataLoadError::InvalidValue {
        file: path.to_path_buf(),
        field,
        value: value.to_string(),
    }
}

fn parse_kind(kind: &str, file: &Path) -> Result<PackageKind, DataLoadError> {
    match kind.to_ascii_lowercase().as_str() {
        "data" => Ok(PackageKind::Data),
        "script" => Ok(PackageKind::Script),
        "native" => Ok(PackageKind::Native),
        _ => Err(invalid(file, "type", kind)),
    }
}

fn parse_dlc_type(dlc_type: &str, file: &Path) -> Result<DlcType, DataLoadError> {
    match dlc_type.to_ascii_lowercase().as_str() {
        "expansion" => Ok(DlcType::Expansion),
        "cosmetic" => Ok(DlcType::Cosmetic),
        "quest" => Ok(DlcType::Quest),
        "item" => Ok(DlcType::Item),
        "character" => Ok(DlcType::Character),
        "map" => Ok(DlcType::Map),
        _ => Err(invalid(file, "dlc_type", dlc_type)),
    }
}

// ===========================================================================
// FileManifestReader
// ===========================================================================

/// Reads manifests from disk. The format follows the manifest file's
/// extension.
#[derive(Debug, Clone)]
pub struct FileManifestReader {
    file_name: String,
}

impl Default for FileManifestReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FileManifestReader {
    /// Reads `mod.yaml`.
    pub fn new() -> Self {
        Self {
            file_name: DEFAULT_MANIFEST_FILENAME.to_string(),
        }
    }

    /// Reads `file_name` instead. Fails if its extension is not a supported
    /// format.
    pub fn with_file_name(file_name: impl Into<String>) -> Result<Self, DataLoadError> {
        let file_name = file_name.into();
        detect_format(Path::new(&file_name))?;
        Ok(Self { file_name })
    }

    pub fn manifest_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }
}

impl ManifestReader for FileManifestReader {
    fn manifest_file_name(&self) -> &str {
        &self.file_name
    }

    fn read(&self, dir: &Path) -> Result<ManifestRecord, LoaderError> {
        let path = self.manifest_path(dir);
        if !path.is_file() {
            return Err(LoaderError::NotFound(path));
        }
        Ok(load_manifest(&path)?)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
