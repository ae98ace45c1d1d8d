//! DLC ownership verification backends.
//!
//! An [`OwnershipBackend`] answers one question: does the player own DLC
//! package `id`? Three implementations ship with the crate:
//!
//! - [`ManifestOwnershipBackend`] -- trusts an explicit id -> owned map with a
//!   fallback default. Useful for development builds and DRM-free stores.
//! - [`LicenseOwnershipBackend`] -- looks for a license file inside the
//!   package directory and optionally runs a caller-supplied validator on it.
//! - [`SteamOwnershipBackend`] -- maps package ids to platform app ids and asks
//!   a live [`PlatformSession`].
//!
//! Backends are shared as `Arc<dyn OwnershipBackend>` across every DLC package
//! that uses the same verification method. Registration calls take `&self`
//! and must complete before verification starts.

use crate::manifest::{ManifestRecord, OwnershipMethod};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an ownership check did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OwnershipError {
    /// The player does not own the DLC. Trial access may still apply.
    #[error("DLC '{id}' is not owned")]
    NotOwned { id: String },

    /// A license exists but is empty or was rejected by the validator.
    #[error("invalid license for DLC '{id}': {reason}")]
    InvalidLicense { id: String, reason: String },

    /// The backend cannot answer right now (platform offline, not initialized).
    #[error("ownership backend '{backend}' is unavailable")]
    Unavailable { backend: String },

    /// Any other backend failure.
    #[error("ownership backend '{backend}' failed: {detail}")]
    Failed { backend: String, detail: String },
}

impl OwnershipError {
    /// True for the plain "not owned" answer, the only error that can fall
    /// back to trial access.
    pub fn is_not_owned(&self) -> bool {
        matches!(self, Self::NotOwned { .. })
    }
}

// ---------------------------------------------------------------------------
// OwnershipBackend trait
// ---------------------------------------------------------------------------

/// A pluggable strategy for verifying DLC ownership.
pub trait OwnershipBackend: Send + Sync {
    /// Verify that DLC `id` is owned.
    fn check_ownership(&self, id: &str) -> Result<(), OwnershipError>;

    /// Refresh cached ownership data. No-op by default.
    fn refresh(&self) -> Result<(), OwnershipError> {
        Ok(())
    }

    /// Stable identifier for logs and diagnostics.
    fn backend_id(&self) -> &str;
}

impl std::fmt::Debug for dyn OwnershipBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipBackend")
            .field("backend_id", &self.backend_id())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Manifest trust
// ---------------------------------------------------------------------------

/// Trusts an explicit ownership table.
#[derive(Debug, Default)]
pub struct ManifestOwnershipBackend {
    owned: RwLock<HashMap<String, bool>>,
    all_owned: RwLock<bool>,
}

impl ManifestOwnershipBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that reports every unregistered DLC as owned.
    pub fn all_owned() -> Self {
        let backend = Self::default();
        backend.set_all_owned(true);
        backend
    }

    /// Record ownership for one DLC. Overrides the default.
    pub fn set_owned(&self, id: &str, owned: bool) {
        self.owned.write().insert(id.to_string(), owned);
    }

    /// Set the answer for DLC ids with no explicit entry.
    pub fn set_all_owned(&self, all_owned: bool) {
        *self.all_owned.write() = all_owned;
    }

    pub fn is_all_owned(&self) -> bool {
        *self.all_owned.read()
    }

    /// Remove every explicit entry. The default is kept.
    pub fn clear(&self) {
        self.owned.write().clear();
    }
}

impl OwnershipBackend for ManifestOwnershipBackend {
    fn check_ownership(&self, id: &str) -> Result<(), OwnershipError> {
        let owned = self
            .owned
            .read()
            .get(id)
            .copied()
            .unwrap_or_else(|| self.is_all_owned());
        if owned {
            Ok(())
        } else {
            Err(OwnershipError::NotOwned { id: id.to_string() })
        }
    }

    fn backend_id(&self) -> &str {
        "manifest"
    }
}

// ---------------------------------------------------------------------------
// License file
// ---------------------------------------------------------------------------

/// License filename looked up when none is configured.
pub const DEFAULT_LICENSE_FILENAME: &str = "license.key";

/// Validates license file contents. Receives the DLC id and the file text.
pub type LicenseValidator = Box<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Verifies ownership by the presence of a license file in the DLC directory.
pub struct LicenseOwnershipBackend {
    base_paths: RwLock<HashMap<String, PathBuf>>,
    license_filename: RwLock<String>,
    validator: RwLock<Option<LicenseValidator>>,
}

impl Default for LicenseOwnershipBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LicenseOwnershipBackend {
    pub fn new() -> Self {
        Self {
            base_paths: RwLock::new(HashMap::new()),
            license_filename: RwLock::new(DEFAULT_LICENSE_FILENAME.to_string()),
            validator: RwLock::new(None),
        }
    }

    /// Associate a DLC id with the directory holding its license file.
    pub fn register_dlc(&self, id: &str, base_path: &Path) {
        self.base_paths
            .write()
            .insert(id.to_string(), base_path.to_path_buf());
    }

    pub fn unregister_dlc(&self, id: &str) {
        self.base_paths.write().remove(id);
    }

    pub fn set_license_filename(&self, filename: &str) {
        *self.license_filename.write() = filename.to_string();
    }

    pub fn license_filename(&self) -> String {
        self.license_filename.read().clone()
    }

    /// Install a content validator. Replaces any previous one.
    pub fn set_validator<F>(&self, validator: F)
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        *self.validator.write() = Some(Box::new(validator));
    }

    pub fn clear_validator(&self) {
        *self.validator.write() = None;
    }

    /// Full path of the license file for `id`, if the id is registered.
    pub fn license_path(&self, id: &str) -> Option<PathBuf> {
        let base = self.base_paths.read().get(id).cloned()?;
        Some(base.join(self.license_filename.read().as_str()))
    }
}

impl std::fmt::Debug for LicenseOwnershipBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseOwnershipBackend")
            .field("base_paths", &*self.base_paths.read())
            .field("license_filename", &*self.license_filename.read())
            .field("has_validator", &self.validator.read().is_some())
            .finish()
    }
}

impl OwnershipBackend for LicenseOwnershipBackend {
    fn check_ownership(&self, id: &str) -> Result<(), OwnershipError> {
        let path = self
            .license_path(id)
            .ok_or_else(|| OwnershipError::NotOwned { id: id.to_string() })?;

        if !path.is_file() {
            return Err(OwnershipError::NotOwned { id: id.to_string() });
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| OwnershipError::Failed {
            backend: self.backend_id().to_string(),
            detail: format!("{}: {e}", path.display()),
        })?;

        if contents.trim().is_empty() {
            return Err(OwnershipError::InvalidLicense {
                id: id.to_string(),
                reason: "license file is empty".to_string(),
            });
        }

        if let Some(validator) = self.validator.read().as_ref() {
            if !validator(id, &contents) {
                return Err(OwnershipError::InvalidLicense {
                    id: id.to_string(),
                    reason: "license rejected by validator".to_string(),
                });
            }
        }

        Ok(())
    }

    fn backend_id(&self) -> &str {
        "license"
    }
}

// ---------------------------------------------------------------------------
// Platform (Steam)
// ---------------------------------------------------------------------------

/// The slice of a platform SDK session the Steam backend needs.
pub trait PlatformSession: Send + Sync {
    /// Whether the platform client is running and the session initialized.
    fn is_live(&self) -> bool;

    /// Whether the logged-in user owns (has installed rights to) `app_id`.
    fn is_dlc_owned(&self, app_id: u32) -> bool;

    /// Pump the platform's callback queue.
    fn run_callbacks(&self);
}

/// Verifies ownership through a platform session.
pub struct SteamOwnershipBackend {
    session: Arc<dyn PlatformSession>,
    app_ids: RwLock<HashMap<String, u32>>,
}

impl SteamOwnershipBackend {
    pub fn new(session: Arc<dyn PlatformSession>) -> Self {
        Self {
            session,
            app_ids: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_dlc(&self, id: &str, app_id: u32) {
        self.app_ids.write().insert(id.to_string(), app_id);
    }

    pub fn unregister_dlc(&self, id: &str) {
        self.app_ids.write().remove(id);
    }

    pub fn app_id_for(&self, id: &str) -> Option<u32> {
        self.app_ids.read().get(id).copied()
    }

    fn unavailable(&self) -> OwnershipError {
        OwnershipError::Unavailable {
            backend: self.backend_id().to_string(),
        }
    }
}

impl std::fmt::Debug for SteamOwnershipBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteamOwnershipBackend")
            .field("live", &self.session.is_live())
            .field("app_ids", &*self.app_ids.read())
            .finish()
    }
}

impl OwnershipBackend for SteamOwnershipBackend {
    fn check_ownership(&self, id: &str) -> Result<(), OwnershipError> {
        if !self.session.is_live() {
            return Err(self.unavailable());
        }
        let app_id = self
            .app_id_for(id)
            .ok_or_else(|| OwnershipError::NotOwned { id: id.to_string() })?;
        if self.session.is_dlc_owned(app_id) {
            Ok(())
        } else {
            Err(OwnershipError::NotOwned { id: id.to_string() })
        }
    }

    fn refresh(&self) -> Result<(), OwnershipError> {
        if !self.session.is_live() {
            return Err(self.unavailable());
        }
        self.session.run_callbacks();
        Ok(())
    }

    fn backend_id(&self) -> &str {
        "steam"
    }
}

// ---------------------------------------------------------------------------
// Backend bundle
// ---------------------------------------------------------------------------

/// One shared backend instance per verification method.
#[derive(Debug, Clone)]
pub struct OwnershipBackends {
    pub manifest: Arc<ManifestOwnershipBackend>,
    pub license: Arc<LicenseOwnershipBackend>,
    pub steam: Option<Arc<SteamOwnershipBackend>>,
}

impl Default for OwnershipBackends {
    fn default() -> Self {
        Self::new()
    }
}

impl OwnershipBackends {
    /// Manifest and license backends, no platform session.
    pub fn new() -> Self {
        Self {
            manifest: Arc::new(ManifestOwnershipBackend::new()),
            license: Arc::new(LicenseOwnershipBackend::new()),
            steam: None,
        }
    }

    pub fn with_steam(mut self, session: Arc<dyn PlatformSession>) -> Self {
        self.steam = Some(Arc::new(SteamOwnershipBackend::new(session)));
        self
    }

    /// The shared backend for `method`, if one is configured.
    pub fn for_method(&self, method: OwnershipMethod) -> Option<Arc<dyn OwnershipBackend>> {
        match method {
            OwnershipMethod::None => None,
            OwnershipMethod::Manifest => Some(self.manifest.clone() as Arc<dyn OwnershipBackend>),
            OwnershipMethod::License => Some(self.license.clone() as Arc<dyn OwnershipBackend>),
            OwnershipMethod::Steam => self
                .steam
                .as_ref()
                .map(|s| s.clone() as Arc<dyn OwnershipBackend>),
        }
    }

    /// Register a DLC package with the backend its manifest asks for and
    /// return that backend.
    ///
    /// A steam DLC without a configured platform session gets a backend that
    /// always reports [`OwnershipError::Unavailable`], so it fails closed
    /// instead of being treated as DRM-free.
    pub fn attach(
        &self,
        record: &ManifestRecord,
        base_path: &Path,
    ) -> Option<Arc<dyn OwnershipBackend>> {
        match record.ownership_method {
            OwnershipMethod::None => None,
            OwnershipMethod::Manifest => self.for_method(OwnershipMethod::Manifest),
            OwnershipMethod::License => {
                self.license.register_dlc(&record.id, base_path);
                self.for_method(OwnershipMethod::License)
            }
            OwnershipMethod::Steam => match &self.steam {
                Some(steam) => {
                    if let Some(app_id) = record.steam_app_id {
                        steam.register_dlc(&record.id, app_id);
                    }
                    Some(steam.clone() as Arc<dyn OwnershipBackend>)
                }
                None => Some(Arc::new(UnconfiguredSteam) as Arc<dyn OwnershipBackend>),
            },
        }
    }

    /// Every configured backend, each once.
    pub fn all(&self) -> Vec<Arc<dyn OwnershipBackend>> {
        let mut all: Vec<Arc<dyn OwnershipBackend>> = vec![
            self.manifest.clone() as Arc<dyn OwnershipBackend>,
            self.license.clone() as Arc<dyn OwnershipBackend>,
        ];
        if let Some(steam) = &self.steam {
            all.push(steam.clone() as Arc<dyn OwnershipBackend>);
        }
        all
    }
}

/// Stand-in for the steam backend when no platform session exists.
#[derive(Debug)]
struct UnconfiguredSteam;

impl OwnershipBackend for UnconfiguredSteam {
    fn check_ownership(&self, _id: &str) -> Result<(), OwnershipError> {
        Err(OwnershipError::Unavailable {
            backend: self.backend_id().to_string(),
        })
    }

    fn backend_id(&self) -> &str {
        "steam"
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakePlatform;
    use std::fs;

    // -----------------------------------------------------------------------
    // Manifest trust
    // -----------------------------------------------------------------------

    #[test]
    fn manifest_unregistered_defaults_to_not_owned() {
        let backend = ManifestOwnershipBackend::new();
        let err = backend.check_ownership("expansion").unwrap_err();
        assert_eq!(
            err,
            OwnershipError::NotOwned {
                id: "expansion".to_string()
            }
        );
        assert!(err.is_not_owned());
    }

    #[test]
    fn manifest_all_owned_default() {
        let backend = ManifestOwnershipBackend::all_owned();
        assert!(backend.check_ownership("anything").is_ok());
    }

    #[test]
    fn manifest_explicit_entry_overrides_default() {
        let backend = ManifestOwnershipBackend::all_owned();
        backend.set_owned("revoked", false);
        backend.set_owned("granted", true);
        assert!(backend.check_ownership("revoked").is_err());
        assert!(backend.check_ownership("granted").is_ok());

        backend.clear();
        assert!(backend.check_ownership("revoked").is_ok());
    }

    #[test]
    fn manifest_refresh_is_noop() {
        let backend = ManifestOwnershipBackend::new();
        assert!(backend.refresh().is_ok());
        assert_eq!(backend.backend_id(), "manifest");
    }

    // -----------------------------------------------------------------------
    // License file
    // -----------------------------------------------------------------------

    #[test]
    fn license_unregistered_is_not_owned() {
        let backend = LicenseOwnershipBackend::new();
        assert!(backend.check_ownership("dlc").unwrap_err().is_not_owned());
    }

    #[test]
    fn license_missing_file_is_not_owned() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LicenseOwnershipBackend::new();
        backend.register_dlc("dlc", dir.path());
        assert!(backend.check_ownership("dlc").unwrap_err().is_not_owned());
    }

    #[test]
    fn license_present_is_owned() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("license.key"), "ABCD-1234").unwrap();
        let backend = LicenseOwnershipBackend::new();
        backend.register_dlc("dlc", dir.path());
        assert!(backend.check_ownership("dlc").is_ok());
    }

    #[test]
    fn license_empty_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("license.key"), "  \n").unwrap();
        let backend = LicenseOwnershipBackend::new();
        backend.register_dlc("dlc", dir.path());
        assert!(matches!(
            backend.check_ownership("dlc"),
            Err(OwnershipError::InvalidLicense { .. })
        ));
    }

    #[test]
    fn license_validator_rejection_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("license.key"), "forged").unwrap();
        let backend = LicenseOwnershipBackend::new();
        backend.register_dlc("dlc", dir.path());
        backend.set_validator(|id, contents| contents.trim() == format!("KEY-{id}"));
        assert!(matches!(
            backend.check_ownership("dlc"),
            Err(OwnershipError::InvalidLicense { .. })
        ));

        fs::write(dir.path().join("license.key"), "KEY-dlc").unwrap();
        assert!(backend.check_ownership("dlc").is_ok());

        backend.clear_validator();
        fs::write(dir.path().join("license.key"), "forged").unwrap();
        assert!(backend.check_ownership("dlc").is_ok());
    }

    #[test]
    fn license_custom_filename() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("owner.lic"), "ok").unwrap();
        let backend = LicenseOwnershipBackend::new();
        backend.register_dlc("dlc", dir.path());
        assert!(backend.check_ownership("dlc").is_err());

        backend.set_license_filename("owner.lic");
        assert_eq!(backend.license_filename(), "owner.lic");
        assert!(backend.check_ownership("dlc").is_ok());

        backend.unregister_dlc("dlc");
        assert!(backend.check_ownership("dlc").is_err());
    }

    // -----------------------------------------------------------------------
    // Steam
    // -----------------------------------------------------------------------

    #[test]
    fn steam_offline_is_unavailable() {
        let platform = Arc::new(FakePlatform::offline());
        let backend = SteamOwnershipBackend::new(platform.clone());
        backend.register_dlc("dlc", 480);
        assert!(matches!(
            backend.check_ownership("dlc"),
            Err(OwnershipError::Unavailable { .. })
        ));
        assert!(backend.refresh().is_err());
    }

    #[test]
    fn steam_owned_app_id() {
        let platform = Arc::new(FakePlatform::live(&[480]));
        let backend = SteamOwnershipBackend::new(platform.clone());
        backend.register_dlc("owned", 480);
        backend.register_dlc("unowned", 481);
        assert!(backend.check_ownership("owned").is_ok());
        assert!(backend.check_ownership("unowned").unwrap_err().is_not_owned());
        assert!(backend.check_ownership("unregistered").unwrap_err().is_not_owned());
    }

    #[test]
    fn steam_refresh_pumps_callbacks() {
        let platform = Arc::new(FakePlatform::live(&[]));
        let backend = SteamOwnershipBackend::new(platform.clone());
        backend.refresh().unwrap();
        backend.refresh().unwrap();
        assert_eq!(platform.callback_pumps(), 2);
    }

    // -----------------------------------------------------------------------
    // Bundle
    // -----------------------------------------------------------------------

    #[test]
    fn bundle_attach_registers_license_path() {
        let backends = OwnershipBackends::new();
        let mut record = ManifestRecord::new("dlc");
        record.is_dlc = true;
        record.ownership_method = OwnershipMethod::License;
        let backend = backends.attach(&record, Path::new("/games/mods/dlc")).unwrap();
        assert_eq!(backend.backend_id(), "license");
        assert_eq!(
            backends.license.license_path("dlc"),
            Some(PathBuf::from("/games/mods/dlc/license.key"))
        );
    }

    #[test]
    fn bundle_attach_none_is_drm_free() {
        let backends = OwnershipBackends::new();
        let record = ManifestRecord::new("dlc");
        assert!(backends.attach(&record, Path::new(".")).is_none());
    }

    #[test]
    fn bundle_attach_steam_without_session_fails_closed() {
        let backends = OwnershipBackends::new();
        let mut record = ManifestRecord::new("dlc");
        record.ownership_method = OwnershipMethod::Steam;
        record.steam_app_id = Some(10);
        let backend = backends.attach(&record, Path::new(".")).unwrap();
        assert!(matches!(
            backend.check_ownership("dlc"),
            Err(OwnershipError::Unavailable { .. })
        ));
    }

    #[test]
    fn bundle_attach_steam_registers_app_id() {
        let backends = OwnershipBackends::new().with_steam(Arc::new(FakePlatform::live(&[10])));
        let mut record = ManifestRecord::new("dlc");
        record.ownership_method = OwnershipMethod::Steam;
        record.steam_app_id = Some(10);
        let backend = backends.attach(&record, Path::new(".")).unwrap();
        assert!(backend.check_ownership("dlc").is_ok());
        assert_eq!(backends.all().len(), 3);
    }

    #[test]
    fn error_display_messages() {
        let msg = format!(
            "{}",
            OwnershipError::Unavailable {
                backend: "steam".to_string()
            }
        );
        assert!(msg.contains("unavailable"), "got: {msg}");
        let msg = format!(
            "{}",
            OwnershipError::InvalidLicense {
                id: "dlc".to_string(),
                reason: "empty".to_string()
            }
        );
        assert!(msg.contains("dlc") && msg.contains("empty"), "got: {msg}");
    }
}
