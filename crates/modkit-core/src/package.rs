//! Packages: a manifest plus mutable lifecycle state.
//!
//! A [`Package`] is created at discovery time in [`PackageState::Discovered`]
//! and driven by the manager through `Loading` into `Loaded` or `Failed`.
//! DLC packages carry an extra [`Dlc`] part holding the ownership state
//! machine, the shared ownership backend, and the trial content set. A DLC
//! must verify as owned (or trial) before the generic load runs.
//!
//! ```text
//! Discovered -> Loading -> Loaded <-> Disabled
//!                      \-> Failed
//! Loaded -> Unloaded (unload, idempotent)
//! ```

use crate::content::ContentProvider;
use crate::manifest::{DlcContent, DlcType, ManifestRecord, PackageKind};
use crate::native::{NativeError, NativeLoader, NativeModule, PackageInfo};
use crate::ownership::{OwnershipBackend, OwnershipError};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Lifecycle state of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageState {
    Discovered,
    Loading,
    Loaded,
    Failed,
    Disabled,
    Unloaded,
}

/// Ownership state of a DLC package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OwnershipState {
    /// Not verified yet.
    #[default]
    Unknown,
    NotOwned,
    Owned,
    /// Not owned, but the trial content subset is accessible.
    Trial,
    /// The last verification failed for a reason other than "not owned".
    Error,
}

/// Result of [`Package::can_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadReadiness {
    Ready,
    AlreadyLoaded,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading a single package.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackageError {
    #[error("package '{0}' is disabled")]
    Disabled(String),

    /// Load was attempted before and failed. Call
    /// [`Package::clear_failure`] to retry.
    #[error("package '{id}' previously failed to load: {reason}")]
    PreviouslyFailed { id: String, reason: String },

    #[error("DLC '{id}' is not owned")]
    NotOwned { id: String },

    #[error("ownership check for DLC '{id}' failed: {source}")]
    Ownership {
        id: String,
        #[source]
        source: OwnershipError,
    },

    #[error("failed to load package '{id}': {reason}")]
    LoadFailed { id: String, reason: String },

    #[error("native module for package '{id}' could not be opened: {source}")]
    Native {
        id: String,
        #[source]
        source: NativeError,
    },
}

// ---------------------------------------------------------------------------
// DLC extension
// ---------------------------------------------------------------------------

/// Typed payload for each DLC subtype.
#[derive(Debug, Clone, PartialEq)]
pub enum DlcExtension {
    /// DLC with no declared subtype.
    Generic,
    Expansion {
        area_ids: Vec<String>,
        level_cap_increase: Option<u32>,
    },
    Cosmetic {
        cosmetic_ids: Vec<String>,
    },
    Quest {
        quest_ids: Vec<String>,
        estimated_hours: Option<f32>,
    },
    Item {
        item_ids: Vec<String>,
    },
    Character {
        character_ids: Vec<String>,
        playable: bool,
        companion: bool,
    },
    Map {
        map_ids: Vec<String>,
        supports_multiplayer: bool,
    },
}

impl DlcExtension {
    /// Build the extension selected by `dlc_type` from the manifest's content
    /// lists.
    pub fn from_manifest(dlc_type: Option<DlcType>, content: &DlcContent) -> Self {
        match dlc_type {
            None => Self::Generic,
            Some(DlcType::Expansion) => Self::Expansion {
                area_ids: content.area_ids.clone(),
                level_cap_increase: content.level_cap_increase,
            },
            Some(DlcType::Cosmetic) => Self::Cosmetic {
                cosmetic_ids: content.cosmetic_ids.clone(),
            },
            Some(DlcType::Quest) => Self::Quest {
                quest_ids: content.quest_ids.clone(),
                estimated_hours: content.estimated_hours,
            },
            Some(DlcType::Item) => Self::Item {
                item_ids: content.item_ids.clone(),
            },
            Some(DlcType::Character) => Self::Character {
                character_ids: content.character_ids.clone(),
                playable: content.playable,
                companion: content.companion,
            },
            Some(DlcType::Map) => Self::Map {
                map_ids: content.map_ids.clone(),
                supports_multiplayer: content.supports_multiplayer,
            },
        }
    }

    pub fn dlc_type(&self) -> Option<DlcType> {
        match self {
            Self::Generic => None,
            Self::Expansion { .. } => Some(DlcType::Expansion),
            Self::Cosmetic { .. } => Some(DlcType::Cosmetic),
            Self::Quest { .. } => Some(DlcType::Quest),
            Self::Item { .. } => Some(DlcType::Item),
            Self::Character { .. } => Some(DlcType::Character),
            Self::Map { .. } => Some(DlcType::Map),
        }
    }

    /// Content ids this DLC declares, in manifest order.
    pub fn content_ids(&self) -> &[String] {
        match self {
            Self::Generic => &[],
            Self::Expansion { area_ids, .. } => area_ids,
            Self::Cosmetic { cosmetic_ids } => cosmetic_ids,
            Self::Quest { quest_ids, .. } => quest_ids,
            Self::Item { item_ids } => item_ids,
            Self::Character { character_ids, .. } => character_ids,
            Self::Map { map_ids, .. } => map_ids,
        }
    }
}

// ---------------------------------------------------------------------------
// DLC events
// ---------------------------------------------------------------------------

/// Notifications emitted by a DLC package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DlcEvent {
    /// Verification resolved to a different state than before.
    OwnershipChanged {
        id: String,
        old: OwnershipState,
        new: OwnershipState,
    },
    /// Access to `content_id` was denied; the game should offer the purchase.
    PurchasePrompted { id: String, content_id: String },
}

// ---------------------------------------------------------------------------
// Dlc
// ---------------------------------------------------------------------------

/// The DLC-only part of a package.
pub struct Dlc {
    id: String,
    ownership: OwnershipState,
    backend: Option<Arc<dyn OwnershipBackend>>,
    trial_enabled: bool,
    trial_content: BTreeSet<String>,
    extension: DlcExtension,
    events: Vec<DlcEvent>,
}

impl Dlc {
    /// Build the DLC part from a manifest. No backend is attached.
    pub fn from_manifest(manifest: &ManifestRecord) -> Self {
        Self {
            id: manifest.id.clone(),
            ownership: OwnershipState::Unknown,
            backend: None,
            trial_enabled: manifest.trial_enabled,
            trial_content: manifest.trial_content_ids.iter().cloned().collect(),
            extension: DlcExtension::from_manifest(manifest.dlc_type, &manifest.dlc_content),
            events: Vec::new(),
        }
    }

    pub fn ownership(&self) -> OwnershipState {
        self.ownership
    }

    pub fn backend(&self) -> Option<&Arc<dyn OwnershipBackend>> {
        self.backend.as_ref()
    }

    /// Attach (or detach, with `None`) the shared ownership backend.
    pub fn set_backend(&mut self, backend: Option<Arc<dyn OwnershipBackend>>) {
        self.backend = backend;
    }

    pub fn extension(&self) -> &DlcExtension {
        &self.extension
    }

    pub fn trial_enabled(&self) -> bool {
        self.trial_enabled
    }

    pub fn set_trial_enabled(&mut self, enabled: bool) {
        self.trial_enabled = enabled;
    }

    pub fn trial_content(&self) -> &BTreeSet<String> {
        &self.trial_content
    }

    pub fn add_trial_content(&mut self, content_id: &str) {
        self.trial_content.insert(content_id.to_string());
    }

    pub fn is_trial_content(&self, content_id: &str) -> bool {
        self.trial_content.contains(content_id)
    }

    /// Ask the backend whether this DLC is owned and update the state.
    ///
    /// No backend means DRM-free: always owned. A "not owned" answer resolves
    /// to `Trial` when trial access is enabled. Any other backend error sets
    /// the state to `Error` and is returned.
    pub fn verify_ownership(&mut self) -> Result<OwnershipState, OwnershipError> {
        let Some(backend) = self.backend.clone() else {
            self.set_ownership(OwnershipState::Owned);
            return Ok(self.ownership);
        };

        match backend.check_ownership(&self.id) {
            Ok(()) => self.set_ownership(OwnershipState::Owned),
            Err(e) if e.is_not_owned() => {
                let state = if self.trial_enabled {
                    OwnershipState::Trial
                } else {
                    OwnershipState::NotOwned
                };
                self.set_ownership(state);
            }
            Err(e) => {
                warn!(
                    dlc = %self.id,
                    backend = backend.backend_id(),
                    error = %e,
                    "ownership check failed"
                );
                self.set_ownership(OwnershipState::Error);
                return Err(e);
            }
        }
        Ok(self.ownership)
    }

    /// Owned or in trial.
    pub fn is_owned(&self) -> bool {
        matches!(self.ownership, OwnershipState::Owned | OwnershipState::Trial)
    }

    /// Whether `content_id` may be used. Denial emits one
    /// [`DlcEvent::PurchasePrompted`].
    pub fn is_content_accessible(&mut self, content_id: &str) -> bool {
        let accessible = match self.ownership {
            OwnershipState::Owned => true,
            OwnershipState::Trial => self.trial_content.contains(content_id),
            _ => false,
        };
        if !accessible {
            self.events.push(DlcEvent::PurchasePrompted {
                id: self.id.clone(),
                content_id: content_id.to_string(),
            });
        }
        accessible
    }

    /// Drain all pending events.
    pub fn drain_events(&mut self) -> Vec<DlcEvent> {
        std::mem::take(&mut self.events)
    }

    /// Read-only view of pending events.
    pub fn pending_events(&self) -> &[DlcEvent] {
        &self.events
    }

    fn set_ownership(&mut self, new: OwnershipState) {
        let old = self.ownership;
        if old == new {
            return;
        }
        self.ownership = new;
        debug!(dlc = %self.id, ?old, ?new, "ownership changed");
        self.events.push(DlcEvent::OwnershipChanged {
            id: self.id.clone(),
            old,
            new,
        });
    }
}

impl std::fmt::Debug for Dlc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dlc")
            .field("id", &self.id)
            .field("ownership", &self.ownership)
            .field("backend", &self.backend.as_ref().map(|b| b.backend_id()))
            .field("trial_enabled", &self.trial_enabled)
            .field("trial_content", &self.trial_content)
            .field("extension", &self.extension)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Package
// ---------------------------------------------------------------------------

/// A discovered mod or DLC.
pub struct Package {
    manifest: ManifestRecord,
    base_path: PathBuf,
    data_path: PathBuf,
    state: PackageState,
    enabled: bool,
    /// Set while load side effects are in place (module open, content live).
    resident: bool,
    last_error: Option<String>,
    content: Option<Arc<dyn ContentProvider>>,
    native_content: Option<Arc<dyn ContentProvider>>,
    native: Option<Box<dyn NativeModule>>,
    dlc: Option<Dlc>,
}

impl Package {
    /// Wrap a manifest found at `base_path`. DLC manifests get a [`Dlc`] part
    /// with no backend attached.
    pub fn new(manifest: ManifestRecord, base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        let data_path = base_path.join(manifest.data_dir());
        let dlc = manifest.is_dlc.then(|| Dlc::from_manifest(&manifest));
        Self {
            manifest,
            base_path,
            data_path,
            state: PackageState::Discovered,
            enabled: true,
            resident: false,
            last_error: None,
            content: None,
            native_content: None,
            native: None,
            dlc,
        }
    }

    // -- Accessors --

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn manifest(&self) -> &ManifestRecord {
        &self.manifest
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn state(&self) -> PackageState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_loaded(&self) -> bool {
        self.state == PackageState::Loaded
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_dlc(&self) -> bool {
        self.dlc.is_some()
    }

    pub fn dlc(&self) -> Option<&Dlc> {
        self.dlc.as_ref()
    }

    pub fn dlc_mut(&mut self) -> Option<&mut Dlc> {
        self.dlc.as_mut()
    }

    /// Attach the shared ownership backend. Ignored for non-DLC packages.
    pub fn set_ownership_backend(&mut self, backend: Option<Arc<dyn OwnershipBackend>>) {
        if let Some(dlc) = self.dlc.as_mut() {
            dlc.set_backend(backend);
        }
    }

    /// Content exposed by this package: the native module's provider when one
    /// is live, otherwise the host-attached provider.
    pub fn content_provider(&self) -> Option<&Arc<dyn ContentProvider>> {
        self.native_content.as_ref().or(self.content.as_ref())
    }

    /// Attach a content provider supplied by the host.
    pub fn set_content_provider(&mut self, provider: Arc<dyn ContentProvider>) {
        self.content = Some(provider);
    }

    /// Snapshot handed to native entry points.
    pub fn info(&self) -> PackageInfo {
        PackageInfo {
            id: self.manifest.id.clone(),
            version: self.manifest.version.clone(),
            base_path: self.base_path.clone(),
            data_path: self.data_path.clone(),
        }
    }

    /// Non-DLC content is always accessible.
    pub fn is_content_accessible(&mut self, content_id: &str) -> bool {
        match self.dlc.as_mut() {
            Some(dlc) => dlc.is_content_accessible(content_id),
            None => true,
        }
    }

    // -- Lifecycle --

    /// Pre-load check.
    pub fn can_load(&self) -> Result<LoadReadiness, PackageError> {
        if !self.enabled {
            return Err(PackageError::Disabled(self.manifest.id.clone()));
        }
        match self.state {
            PackageState::Loaded => Ok(LoadReadiness::AlreadyLoaded),
            PackageState::Failed => Err(PackageError::PreviouslyFailed {
                id: self.manifest.id.clone(),
                reason: self.last_error.clone().unwrap_or_default(),
            }),
            _ => Ok(LoadReadiness::Ready),
        }
    }

    /// Reset a failed package so the next load retries it.
    pub fn clear_failure(&mut self) {
        if self.state == PackageState::Failed {
            self.state = PackageState::Discovered;
            self.last_error = None;
        }
    }

    /// Mark the package failed without attempting a load.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = PackageState::Failed;
        self.last_error = Some(reason.into());
    }

    /// Load the package. A second call on a loaded package returns `Ok`
    /// without repeating any side effect.
    pub fn load(&mut self, native: &mut dyn NativeLoader) -> Result<(), PackageError> {
        if self.can_load()? == LoadReadiness::AlreadyLoaded {
            return Ok(());
        }

        self.state = PackageState::Loading;

        if let Some(dlc) = self.dlc.as_mut() {
            match dlc.verify_ownership() {
                Ok(OwnershipState::Owned | OwnershipState::Trial) => {}
                Ok(_) => {
                    let err = PackageError::NotOwned {
                        id: self.manifest.id.clone(),
                    };
                    return Err(self.fail(err));
                }
                Err(source) => {
                    let err = PackageError::Ownership {
                        id: self.manifest.id.clone(),
                        source,
                    };
                    return Err(self.fail(err));
                }
            }
        }

        let result = match self.manifest.kind {
            PackageKind::Data => self.load_data(),
            PackageKind::Script => self.load_script(),
            PackageKind::Native => self.load_native(native),
        };

        match result {
            Ok(()) => {
                self.state = PackageState::Loaded;
                self.resident = true;
                self.last_error = None;
                debug!(package = %self.manifest.id, kind = ?self.manifest.kind, "package loaded");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Reverse of [`load`](Self::load). Safe to call repeatedly.
    pub fn unload(&mut self) {
        if !self.resident {
            return;
        }
        if let Some(mut module) = self.native.take() {
            if module.has_shutdown() {
                let info = self.info();
                module.shutdown(&info);
            }
        }
        self.native_content = None;
        self.resident = false;
        self.state = if self.enabled {
            PackageState::Unloaded
        } else {
            PackageState::Disabled
        };
        debug!(package = %self.manifest.id, "package unloaded");
    }

    /// Enable or disable. A loaded package that is disabled stays resident and
    /// returns to `Loaded` when re-enabled. A failed package stays `Failed`
    /// until [`clear_failure`](Self::clear_failure).
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        self.state = match (enabled, self.state) {
            (_, PackageState::Failed) => PackageState::Failed,
            (false, _) => PackageState::Disabled,
            (true, PackageState::Disabled) if self.resident => PackageState::Loaded,
            (true, PackageState::Disabled) => PackageState::Discovered,
            (true, state) => state,
        };
    }

    // -- Kind-specific load steps --

    fn load_data(&self) -> Result<(), PackageError> {
        if !self.data_path.is_dir() {
            warn!(
                package = %self.manifest.id,
                path = %self.data_path.display(),
                "data directory not found"
            );
        }
        Ok(())
    }

    fn load_script(&self) -> Result<(), PackageError> {
        debug!(package = %self.manifest.id, "script package accepted without a scripting engine");
        Ok(())
    }

    fn load_native(&mut self, loader: &mut dyn NativeLoader) -> Result<(), PackageError> {
        let entry_point = self
            .manifest
            .entry_point
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| PackageError::LoadFailed {
                id: self.manifest.id.clone(),
                reason: "native package has no entry_point".to_string(),
            })?;

        let path = self.base_path.join(entry_point);
        let mut module = loader.open(&path).map_err(|source| PackageError::Native {
            id: self.manifest.id.clone(),
            source,
        })?;

        let info = self.info();
        if !module.init(&info) {
            return Err(PackageError::LoadFailed {
                id: self.manifest.id.clone(),
                reason: format!("{} init returned false", path.display()),
            });
        }

        self.native_content = module.content_provider();
        self.native = Some(module);
        Ok(())
    }

    fn fail(&mut self, err: PackageError) -> PackageError {
        warn!(package = %self.manifest.id, error = %err, "package failed to load");
        self.state = PackageState::Failed;
        self.last_error = Some(err.to_string());
        err
    }
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("id", &self.manifest.id)
            .field("base_path", &self.base_path)
            .field("state", &self.state)
            .field("enabled", &self.enabled)
            .field("last_error", &self.last_error)
            .field("has_native_module", &self.native.is_some())
            .field("dlc", &self.dlc)
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
