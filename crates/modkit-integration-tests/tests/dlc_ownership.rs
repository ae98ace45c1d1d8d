//! Integration test: DLC ownership across backends
//!
//! DLC packages discovered from disk pick their ownership backend from the
//! manifest's `ownership_method`. These tests run each backend through
//! discovery and loading, then flip ownership and re-verify.

use modkit_core::loader::PackageLoader;
use modkit_core::manager::{ManagerConfig, ManagerError, PackageManager};
use modkit_core::manifest::DlcType;
use modkit_core::ownership::OwnershipBackends;
use modkit_core::package::{DlcEvent, DlcExtension, OwnershipState, PackageState};
use modkit_core::test_utils::FakePlatform;
use modkit_data::FileManifestReader;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn package_dir(root: &Path, id: &str, manifest: &str) -> PathBuf {
    let path = root.join(id);
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("mod.yaml"), manifest).unwrap();
    path
}

fn manager(root: &Path, backends: OwnershipBackends) -> PackageManager {
    let mut loader = PackageLoader::new(Box::new(FileManifestReader::new()), backends);
    loader.add_search_path(root);
    let mut mgr = PackageManager::new(loader);
    let mut errors = Vec::new();
    mgr.discover(&mut errors);
    assert!(errors.is_empty(), "{errors:?}");
    mgr
}

fn ownership(mgr: &PackageManager, id: &str) -> OwnershipState {
    mgr.get(id).unwrap().dlc().unwrap().ownership()
}

// ===========================================================================
// License files
// ===========================================================================

#[test]
fn license_file_controls_access() {
    let root = tempfile::tempdir().unwrap();
    let dir = package_dir(
        root.path(),
        "frozen_north",
        "id: frozen_north\nis_dlc: true\ndlc_type: expansion\nownership_method: license\n\
         content:\n  area_ids: [glacier]\n  level_cap_increase: 10\n",
    );

    let backends = OwnershipBackends::new();
    let mut mgr = manager(root.path(), backends.clone());

    assert!(!mgr.load_all());
    assert_eq!(ownership(&mgr, "frozen_north"), OwnershipState::NotOwned);

    fs::write(dir.join("license.key"), "ABCD-1234").unwrap();
    backends
        .license
        .set_validator(|_, contents| contents.trim().starts_with("ABCD"));
    mgr.get_mut("frozen_north").unwrap().clear_failure();
    mgr.load_package("frozen_north").unwrap();

    let package = mgr.get("frozen_north").unwrap();
    assert!(package.is_loaded());
    assert_eq!(
        package.dlc().unwrap().extension(),
        &DlcExtension::Expansion {
            area_ids: vec!["glacier".to_string()],
            level_cap_increase: Some(10),
        }
    );
    assert_eq!(mgr.owned_dlc().count(), 1);
}

#[test]
fn rejected_license_is_an_ownership_error() {
    let root = tempfile::tempdir().unwrap();
    let dir = package_dir(
        root.path(),
        "skins",
        "id: skins\nis_dlc: true\ndlc_type: cosmetic\nownership_method: license\n",
    );
    fs::write(dir.join("license.key"), "forged").unwrap();

    let backends = OwnershipBackends::new();
    backends.license.set_validator(|id, contents| contents.contains(id));
    let mut mgr = manager(root.path(), backends);

    assert!(!mgr.load_all());
    assert_eq!(ownership(&mgr, "skins"), OwnershipState::Error);
    let error = mgr.get("skins").unwrap().last_error().unwrap().to_string();
    assert!(error.contains("validator"), "got: {error}");
}

// ===========================================================================
// Manifest trust
// ===========================================================================

#[test]
fn manifest_trust_with_trial_content() {
    let root = tempfile::tempdir().unwrap();
    package_dir(
        root.path(),
        "saga",
        "id: saga\nis_dlc: true\ndlc_type: quest\nownership_method: manifest\n\
         trial_enabled: true\ntrial_content_ids: [prologue]\n\
         content:\n  quest_ids: [prologue, epilogue]\n  estimated_hours: 6.5\n",
    );

    let backends = OwnershipBackends::new();
    let mut mgr = manager(root.path(), backends.clone());
    assert!(mgr.load_all());
    assert_eq!(ownership(&mgr, "saga"), OwnershipState::Trial);

    let saga = mgr.get_mut("saga").unwrap();
    assert!(saga.is_content_accessible("prologue"));
    assert!(!saga.is_content_accessible("epilogue"));

    backends.manifest.set_owned("saga", true);
    assert!(mgr.refresh_ownership().is_empty());
    assert_eq!(ownership(&mgr, "saga"), OwnershipState::Owned);
    assert!(mgr.get_mut("saga").unwrap().is_content_accessible("epilogue"));

    let events = mgr.drain_dlc_events();
    assert_eq!(
        events,
        vec![
            DlcEvent::OwnershipChanged {
                id: "saga".to_string(),
                old: OwnershipState::Unknown,
                new: OwnershipState::Trial,
            },
            DlcEvent::PurchasePrompted {
                id: "saga".to_string(),
                content_id: "epilogue".to_string(),
            },
            DlcEvent::OwnershipChanged {
                id: "saga".to_string(),
                old: OwnershipState::Trial,
                new: OwnershipState::Owned,
            },
        ]
    );
}

#[test]
fn drm_free_dlc_loads_without_backend() {
    let root = tempfile::tempdir().unwrap();
    package_dir(root.path(), "bonus", "id: bonus\nis_dlc: true\ndlc_type: item\n");

    let mut mgr = manager(root.path(), OwnershipBackends::new());
    assert!(mgr.get("bonus").unwrap().dlc().unwrap().backend().is_none());
    assert!(mgr.load_all());
    assert_eq!(ownership(&mgr, "bonus"), OwnershipState::Owned);
    assert_eq!(mgr.dlc_packages().count(), 1);
}

// ===========================================================================
// Platform (steam)
// ===========================================================================

#[test]
fn steam_ownership_follows_platform() {
    let root = tempfile::tempdir().unwrap();
    package_dir(
        root.path(),
        "arena",
        "id: arena\nis_dlc: true\ndlc_type: map\nownership_method: steam\nsteam_app_id: 9001\n",
    );

    let platform = Arc::new(FakePlatform::offline());
    let backends = OwnershipBackends::new().with_steam(platform.clone());
    let mut mgr = manager(root.path(), backends);

    assert!(!mgr.load_all());
    assert_eq!(ownership(&mgr, "arena"), OwnershipState::Error);
    assert_eq!(mgr.refresh_ownership().len(), 2);
    assert_eq!(platform.callback_pumps(), 0);

    platform.set_live(true);
    assert!(mgr.refresh_ownership().is_empty());
    assert_eq!(platform.callback_pumps(), 1);
    assert_eq!(ownership(&mgr, "arena"), OwnershipState::NotOwned);

    platform.grant(9001);
    mgr.get_mut("arena").unwrap().clear_failure();
    mgr.load_package("arena").unwrap();
    assert_eq!(ownership(&mgr, "arena"), OwnershipState::Owned);
    assert_eq!(mgr.get("arena").unwrap().dlc().unwrap().extension().dlc_type(), Some(DlcType::Map));
}

#[test]
fn steam_dlc_without_platform_fails_closed() {
    let root = tempfile::tempdir().unwrap();
    package_dir(
        root.path(),
        "arena",
        "id: arena\nis_dlc: true\nownership_method: steam\nsteam_app_id: 9001\n",
    );

    let mut mgr = manager(root.path(), OwnershipBackends::new());
    assert!(!mgr.load_all());
    assert_eq!(ownership(&mgr, "arena"), OwnershipState::Error);
    assert_eq!(mgr.get("arena").unwrap().state(), PackageState::Failed);
}

// ===========================================================================
// Game version gate
// ===========================================================================

#[test]
fn min_game_version_gates_dlc() {
    let root = tempfile::tempdir().unwrap();
    package_dir(
        root.path(),
        "future",
        "id: future\nis_dlc: true\nmin_game_version: \"3.0\"\n",
    );
    package_dir(root.path(), "present", "id: present\nis_dlc: true\nmin_game_version: \"2.1\"\n");

    let mut mgr = manager(root.path(), OwnershipBackends::new()).with_config(&ManagerConfig {
        game_version: Some("2.4.1".to_string()),
    });
    assert!(!mgr.load_all());
    assert!(mgr.is_loaded("present"));
    assert!(!mgr.is_loaded("future"));

    mgr.get_mut("future").unwrap().clear_failure();
    assert!(matches!(
        mgr.load_package("future"),
        Err(ManagerError::GameVersion { ref required, .. }) if required == "3.0"
    ));
}
