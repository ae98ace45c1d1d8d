//! Package manifest records.
//!
//! A [`ManifestRecord`] is the immutable-after-load description of a mod or
//! DLC package: identity, load-ordering hints, dependencies, and the
//! DLC-specific store and ownership fields. Records are produced by a
//! [`ManifestReader`](crate::loader::ManifestReader) and never mutated by the
//! manager afterwards.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Named load priorities. Lower values load earlier.
pub struct Priority;

impl Priority {
    pub const FIRST: i32 = -1000;
    pub const EARLY: i32 = -100;
    pub const NORMAL: i32 = 0;
    pub const LATE: i32 = 100;
    pub const LAST: i32 = 1000;

    /// Resolve a priority name (case-insensitive). Returns `None` for
    /// unknown names.
    pub fn from_name(name: &str) -> Option<i32> {
        match name.to_ascii_lowercase().as_str() {
            "first" | "highest" => Some(Self::FIRST),
            "early" | "high" => Some(Self::EARLY),
            "normal" | "default" => Some(Self::NORMAL),
            "late" | "low" => Some(Self::LATE),
            "last" | "lowest" => Some(Self::LAST),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// How a package's content is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    /// Assets and data files only.
    #[default]
    Data,
    /// Script content, handed to a scripting engine.
    Script,
    /// A native module with init/shutdown entry points.
    Native,
}

/// The DLC subtype, which selects the typed extension built at discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlcType {
    Expansion,
    Cosmetic,
    Quest,
    Item,
    Character,
    Map,
}

/// Which ownership backend verifies a DLC package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipMethod {
    /// DRM-free: no backend is attached.
    #[default]
    None,
    Steam,
    License,
    Manifest,
}

impl OwnershipMethod {
    /// Parse a method name as written in manifests. Unknown names map to
    /// `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "" => Some(Self::None),
            "steam" => Some(Self::Steam),
            "license" => Some(Self::License),
            "manifest" => Some(Self::Manifest),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Steam => "steam",
            Self::License => "license",
            Self::Manifest => "manifest",
        }
    }
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// A dependency on another package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub mod_id: String,
    #[serde(default)]
    pub min_version: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

impl Dependency {
    /// A required dependency with no version constraint.
    pub fn required(mod_id: impl Into<String>) -> Self {
        Self {
            mod_id: mod_id.into(),
            min_version: None,
            optional: false,
        }
    }

    /// An optional dependency: ordered before the dependent when present,
    /// never blocks loading.
    pub fn optional(mod_id: impl Into<String>) -> Self {
        Self {
            mod_id: mod_id.into(),
            min_version: None,
            optional: true,
        }
    }

    pub fn with_min_version(mut self, version: impl Into<String>) -> Self {
        self.min_version = Some(version.into());
        self
    }
}

// ---------------------------------------------------------------------------
// DLC content lists
// ---------------------------------------------------------------------------

/// Subtype-specific content declared by a DLC manifest. Only the fields
/// relevant to the manifest's [`DlcType`] are consulted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DlcContent {
    pub area_ids: Vec<String>,
    pub level_cap_increase: Option<u32>,
    pub cosmetic_ids: Vec<String>,
    pub quest_ids: Vec<String>,
    pub estimated_hours: Option<f32>,
    pub item_ids: Vec<String>,
    pub character_ids: Vec<String>,
    pub playable: bool,
    pub companion: bool,
    pub map_ids: Vec<String>,
    pub supports_multiplayer: bool,
}

// ---------------------------------------------------------------------------
// ManifestRecord
// ---------------------------------------------------------------------------

/// Metadata describing one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kind: PackageKind,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub load_after: Vec<String>,
    #[serde(default)]
    pub load_before: Vec<String>,
    #[serde(default)]
    pub data_path: Option<String>,
    #[serde(default)]
    pub entry_point: Option<String>,

    // -- DLC --
    #[serde(default)]
    pub is_dlc: bool,
    #[serde(default)]
    pub dlc_type: Option<DlcType>,
    #[serde(default)]
    pub steam_app_id: Option<u32>,
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default)]
    pub price_string: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub min_game_version: Option<String>,
    #[serde(default)]
    pub ownership_method: OwnershipMethod,
    #[serde(default)]
    pub trial_enabled: bool,
    #[serde(default)]
    pub trial_content_ids: Vec<String>,
    #[serde(default)]
    pub dlc_content: DlcContent,
}

/// Data directory used when a manifest does not name one.
pub const DEFAULT_DATA_PATH: &str = "data";

impl ManifestRecord {
    /// A minimal data package record with every optional field at its default.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            version: None,
            author: None,
            description: None,
            kind: PackageKind::Data,
            priority: Priority::NORMAL,
            dependencies: Vec::new(),
            load_after: Vec::new(),
            load_before: Vec::new(),
            data_path: None,
            entry_point: None,
            is_dlc: false,
            dlc_type: None,
            steam_app_id: None,
            store_id: None,
            price_string: None,
            release_date: None,
            min_game_version: None,
            ownership_method: OwnershipMethod::None,
            trial_enabled: false,
            trial_content_ids: Vec::new(),
            dlc_content: DlcContent::default(),
        }
    }

    /// Check the invariants every registered record must satisfy.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.id.trim().is_empty() {
            return Err(ManifestError::MissingId);
        }
        if let Some(dep) = self.dependencies.iter().find(|d| d.mod_id == self.id) {
            return Err(ManifestError::SelfDependency(dep.mod_id.clone()));
        }
        if let Some(dep) = self.dependencies.iter().find(|d| d.mod_id.trim().is_empty()) {
            return Err(ManifestError::EmptyDependencyId {
                id: self.id.clone(),
                optional: dep.optional,
            });
        }
        Ok(())
    }

    /// Human-readable name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Relative data directory, falling back to [`DEFAULT_DATA_PATH`].
    pub fn data_dir(&self) -> &str {
        self.data_path.as_deref().unwrap_or(DEFAULT_DATA_PATH)
    }

    /// Dependencies that block loading when absent or disabled.
    pub fn required_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| !d.optional)
    }

    /// Every id this package must load after: all dependencies (required and
    /// optional) followed by the `load_after` hints.
    pub fn ordering_predecessors(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .map(|d| d.mod_id.as_str())
            .chain(self.load_after.iter().map(String::as_str))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Manifest invariants violated by a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest has no id")]
    MissingId,
    #[error("package '{0}' depends on itself")]
    SelfDependency(String),
    #[error("package '{id}' declares a dependency with an empty id (optional: {optional})")]
    EmptyDependencyId { id: String, optional: bool },
}

// ===========================================================================
// Tests
// ===========================================================================
