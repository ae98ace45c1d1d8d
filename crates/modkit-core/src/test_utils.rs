//! Shared fixtures for unit and integration tests.
//!
//! Provides manifest builders, an in-memory [`ManifestReader`], a scriptable
//! native loader, and a fake platform session.

use crate::content::ContentProvider;
use crate::loader::{LoaderError, ManifestReader};
use crate::manifest::{Dependency, DlcType, ManifestRecord};
use crate::native::{NativeError, NativeLoader, NativeModule, PackageInfo};
use crate::ownership::PlatformSession;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

// ---------------------------------------------------------------------------
// Manifest builders
// ---------------------------------------------------------------------------

/// A plain data package manifest.
pub fn manifest(id: &str) -> ManifestRecord {
    ManifestRecord::new(id)
}

/// A data package manifest with a priority and required dependencies.
pub fn manifest_with(id: &str, priority: i32, deps: &[&str]) -> ManifestRecord {
    let mut m = ManifestRecord::new(id);
    m.priority = priority;
    m.dependencies = deps.iter().map(|d| Dependency::required(*d)).collect();
    m
}

/// A DLC manifest of the given subtype, with no ownership method.
pub fn dlc_manifest(id: &str, dlc_type: DlcType) -> ManifestRecord {
    let mut m = ManifestRecord::new(id);
    m.is_dlc = true;
    m.dlc_type = Some(dlc_type);
    m
}

// ---------------------------------------------------------------------------
// In-memory manifest reader
// ---------------------------------------------------------------------------

/// Serves manifests from memory, keyed by package directory. The directory
/// still has to exist on disk and contain the manifest file for discovery to
/// pick it up; the file contents are ignored.
#[derive(Debug, Clone)]
pub struct MemoryManifestReader {
    file_name: String,
    records: HashMap<PathBuf, ManifestRecord>,
    broken: HashSet<PathBuf>,
}

impl Default for MemoryManifestReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManifestReader {
    pub fn new() -> Self {
        Self {
            file_name: crate::loader::DEFAULT_MANIFEST_FILENAME.to_string(),
            records: HashMap::new(),
            broken: HashSet::new(),
        }
    }

    /// Serve `record` for the package directory `dir`.
    pub fn insert(&mut self, dir: &Path, record: ManifestRecord) {
        self.records.insert(dir.to_path_buf(), record);
    }

    /// Make reads for `dir` fail as malformed.
    pub fn insert_broken(&mut self, dir: &Path) {
        self.broken.insert(dir.to_path_buf());
    }

    /// Create `root/<id>/` with an empty manifest file and serve `record` for it.
    pub fn stage(&mut self, root: &Path, record: ManifestRecord) -> PathBuf {
        let dir = root.join(&record.id);
        std::fs::create_dir_all(&dir).expect("create package dir");
        std::fs::write(dir.join(&self.file_name), "").expect("write manifest");
        self.insert(&dir, record);
        dir
    }
}

impl ManifestReader for MemoryManifestReader {
    fn manifest_file_name(&self) -> &str {
        &self.file_name
    }

    fn read(&self, dir: &Path) -> Result<ManifestRecord, LoaderError> {
        if self.broken.contains(dir) {
            return Err(LoaderError::InvalidManifest {
                path: dir.join(&self.file_name),
                detail: "malformed".to_string(),
            });
        }
        self.records
            .get(dir)
            .cloned()
            .ok_or_else(|| LoaderError::NotFound(dir.join(&self.file_name)))
    }
}

// ---------------------------------------------------------------------------
// Native loader
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct NativeCounters {
    opened: usize,
    init_calls: usize,
    shutdown_calls: usize,
    shutdown_order: Vec<String>,
}

/// A native loader whose modules record every call.
#[derive(Clone, Default)]
pub struct FakeNativeLoader {
    counters: Rc<RefCell<NativeCounters>>,
    fail_init: bool,
    has_shutdown: bool,
    missing: HashSet<PathBuf>,
    content: Option<Arc<dyn ContentProvider>>,
}

impl FakeNativeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modules return `false` from init.
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Modules export a shutdown entry point.
    pub fn with_shutdown(mut self) -> Self {
        self.has_shutdown = true;
        self
    }

    /// Modules expose `content` after init.
    pub fn with_content(mut self, content: Arc<dyn ContentProvider>) -> Self {
        self.content = Some(content);
        self
    }

    /// Opening `path` fails with `NotFound`.
    pub fn with_missing(mut self, path: &Path) -> Self {
        self.missing.insert(path.to_path_buf());
        self
    }

    pub fn opened(&self) -> usize {
        self.counters.borrow().opened
    }

    pub fn init_calls(&self) -> usize {
        self.counters.borrow().init_calls
    }

    pub fn shutdown_calls(&self) -> usize {
        self.counters.borrow().shutdown_calls
    }

    /// Package ids in the order their modules were shut down.
    pub fn shutdown_order(&self) -> Vec<String> {
        self.counters.borrow().shutdown_order.clone()
    }
}

impl NativeLoader for FakeNativeLoader {
    fn open(&mut self, path: &Path) -> Result<Box<dyn NativeModule>, NativeError> {
        if self.missing.contains(path) {
            return Err(NativeError::NotFound(path.to_path_buf()));
        }
        self.counters.borrow_mut().opened += 1;
        Ok(Box::new(FakeModule {
            counters: self.counters.clone(),
            fail_init: self.fail_init,
            has_shutdown: self.has_shutdown,
            content: self.content.clone(),
        }))
    }
}

struct FakeModule {
    counters: Rc<RefCell<NativeCounters>>,
    fail_init: bool,
    has_shutdown: bool,
    content: Option<Arc<dyn ContentProvider>>,
}

impl NativeModule for FakeModule {
    fn init(&mut self, _package: &PackageInfo) -> bool {
        self.counters.borrow_mut().init_calls += 1;
        !self.fail_init
    }

    fn has_shutdown(&self) -> bool {
        self.has_shutdown
    }

    fn shutdown(&mut self, package: &PackageInfo) {
        let mut counters = self.counters.borrow_mut();
        counters.shutdown_calls += 1;
        counters.shutdown_order.push(package.id.clone());
    }

    fn content_provider(&self) -> Option<Arc<dyn ContentProvider>> {
        self.content.clone()
    }
}

// ---------------------------------------------------------------------------
// Platform session
// ---------------------------------------------------------------------------

/// A platform session with a fixed set of owned app ids.
#[derive(Debug, Default)]
pub struct FakePlatform {
    live: AtomicBool,
    owned: Mutex<HashSet<u32>>,
    pumps: AtomicUsize,
}

impl FakePlatform {
    pub fn live(owned: &[u32]) -> Self {
        Self {
            live: AtomicBool::new(true),
            owned: Mutex::new(owned.iter().copied().collect()),
            pumps: AtomicUsize::new(0),
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    pub fn grant(&self, app_id: u32) {
        self.owned.lock().insert(app_id);
    }

    pub fn callback_pumps(&self) -> usize {
        self.pumps.load(Ordering::SeqCst)
    }
}

impl PlatformSession for FakePlatform {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn is_dlc_owned(&self, app_id: u32) -> bool {
        self.owned.lock().contains(&app_id)
    }

    fn run_callbacks(&self) {
        self.pumps.fetch_add(1, Ordering::SeqCst);
    }
}
