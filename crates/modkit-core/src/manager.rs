//! The package registry and load sequencer.
//!
//! [`PackageManager`] owns every discovered package, computes a load order
//! that respects dependencies and ordering hints, drives loading and
//! unloading, resolves override paths, and aggregates content across loaded
//! packages.
//!
//! # Load order
//!
//! Ordering edges run from each package to:
//!
//! - every dependency id (required and optional),
//! - every `load_after` id,
//! - and, in reverse, from every package naming it in `load_before`.
//!
//! Edges to ids that are unknown or disabled are ignored at ordering time;
//! whether a required dependency is satisfied is checked again at load time.
//!
//! Ordering runs in two passes. A depth-first pass seeded in discovery order
//! marks packages in progress and detects cycles; a cycle stops that branch,
//! is recorded, and excludes every package that can only be ordered through
//! it. The admitted packages are then sorted with Kahn's algorithm, taking
//! ready packages from a min-heap keyed by `(priority, discovery index)`, so
//! priority only breaks ties between packages the edges leave unordered and
//! can never pull a package ahead of something it must follow.

use crate::content::{
    BtNodeType, ConsoleCommand, ContentProvider, EntityType, ItemDef, LocaleEntry, QuestDef,
    SceneDef,
};
use crate::loader::PackageLoader;
use crate::native::{NativeLoader, UnsupportedNativeLoader};
use crate::ownership::{OwnershipBackend, OwnershipError};
use crate::package::{DlcEvent, LoadReadiness, Package, PackageError, PackageState};
use semver::Version;
use serde::Deserialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a required dependency is not satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingReason {
    NotFound,
    Disabled,
    Failed,
    Version { required: String, found: Option<String> },
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not installed"),
            Self::Disabled => write!(f, "disabled"),
            Self::Failed => write!(f, "failed to load"),
            Self::Version { required, found } => write!(
                f,
                "version {} does not satisfy >= {required}",
                found.as_deref().unwrap_or("<none>")
            ),
        }
    }
}

/// Errors reported by the manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("duplicate package id '{id}' at {path}")]
    DuplicateId { id: String, path: PathBuf },

    #[error("package '{id}' requires '{dependency}', which is {reason}")]
    MissingDependency {
        id: String,
        dependency: String,
        reason: MissingReason,
    },

    #[error("unknown package '{0}'")]
    UnknownPackage(String),

    #[error("dependency cycle: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    #[error("package '{0}' is not in the load order (disabled or part of a cycle)")]
    NotInLoadOrder(String),

    #[error("package '{id}' requires game version {required}, running {current}")]
    GameVersion {
        id: String,
        required: String,
        current: String,
    },

    #[error(transparent)]
    Package(#[from] PackageError),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Notifications emitted by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    Discovered { count: usize },
    LoadOrderComputed { order: Vec<String> },
    CycleDetected { cycle: Vec<String> },
    PackageLoaded { id: String },
    PackageFailed { id: String, reason: String },
    PackageUnloaded { id: String },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Manager settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ManagerConfig {
    /// Running game version, checked against `min_game_version`. `None`
    /// disables the check.
    #[serde(default)]
    pub game_version: Option<String>,
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Admitted,
    Rejected,
}

struct OrderWalk<'a> {
    preds: &'a [Vec<usize>],
    marks: Vec<Mark>,
    cycles: Vec<Vec<usize>>,
}

impl OrderWalk<'_> {
    /// Returns whether `root` can be ordered.
    ///
    /// Iterative depth-first walk over predecessors. Each frame holds a node
    /// and the index of its next predecessor to visit; the frame stack is
    /// the current path, so a predecessor already on it closes a cycle.
    fn visit(&mut self, root: usize) -> bool {
        match self.marks[root] {
            Mark::Admitted => return true,
            Mark::Rejected => return false,
            Mark::InProgress | Mark::Unvisited => {}
        }

        self.marks[root] = Mark::InProgress;
        let mut frames: Vec<(usize, usize)> = vec![(root, 0)];
        // Outcome of the last finished frame, or of the last predecessor seen.
        let mut ok = true;

        while let Some(frame) = frames.last_mut() {
            let (node, next) = *frame;
            if !ok || next == self.preds[node].len() {
                frames.pop();
                self.marks[node] = if ok { Mark::Admitted } else { Mark::Rejected };
                continue;
            }
            frame.1 += 1;

            let pred = self.preds[node][next];
            match self.marks[pred] {
                Mark::Admitted => {}
                Mark::Rejected => ok = false,
                Mark::InProgress => {
                    let start = frames.iter().position(|&(n, _)| n == pred).unwrap_or(0);
                    let mut cycle: Vec<usize> = frames[start..].iter().map(|&(n, _)| n).collect();
                    cycle.push(pred);
                    self.cycles.push(cycle);
                    ok = false;
                }
                Mark::Unvisited => {
                    self.marks[pred] = Mark::InProgress;
                    frames.push((pred, 0));
                }
            }
        }
        ok
    }
}

// ---------------------------------------------------------------------------
// PackageManager
// ---------------------------------------------------------------------------

/// Registry of packages plus their computed load order and loaded set.
pub struct PackageManager {
    loader: PackageLoader,
    native: Box<dyn NativeLoader>,
    packages: Vec<Package>,
    index: HashMap<String, usize>,
    load_order: Vec<String>,
    order_dirty: bool,
    loaded: Vec<String>,
    cycles: Vec<Vec<String>>,
    game_version: Option<String>,
    events: Vec<ManagerEvent>,
}

impl PackageManager {
    /// A manager with no native loading support.
    pub fn new(loader: PackageLoader) -> Self {
        Self {
            loader,
            native: Box::new(UnsupportedNativeLoader),
            packages: Vec::new(),
            index: HashMap::new(),
            load_order: Vec::new(),
            order_dirty: false,
            loaded: Vec::new(),
            cycles: Vec::new(),
            game_version: None,
            events: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: &ManagerConfig) -> Self {
        self.game_version = config.game_version.clone();
        self
    }

    pub fn with_native_loader(mut self, native: Box<dyn NativeLoader>) -> Self {
        self.native = native;
        self
    }

    pub fn set_native_loader(&mut self, native: Box<dyn NativeLoader>) {
        self.native = native;
    }

    pub fn set_game_version(&mut self, version: Option<String>) {
        self.game_version = version;
    }

    pub fn game_version(&self) -> Option<&str> {
        self.game_version.as_deref()
    }

    pub fn loader(&self) -> &PackageLoader {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut PackageLoader {
        &mut self.loader
    }

    // -- Registry --

    /// Rebuild the registry from the loader's search paths.
    ///
    /// Anything loaded is unloaded first. Duplicate ids keep the first
    /// package discovered; the rest are dropped and reported to `errors`,
    /// as is every dependency cycle found while ordering. Returns the number
    /// of registered packages.
    pub fn discover(&mut self, errors: &mut Vec<ManagerError>) -> usize {
        self.unload_all();
        self.packages.clear();
        self.index.clear();
        self.load_order.clear();
        self.cycles.clear();

        for package in self.loader.discover() {
            if self.index.contains_key(package.id()) {
                warn!(
                    package = package.id(),
                    path = %package.base_path().display(),
                    "duplicate package id, keeping the first one"
                );
                errors.push(ManagerError::DuplicateId {
                    id: package.id().to_string(),
                    path: package.base_path().to_path_buf(),
                });
                continue;
            }
            self.insert(package);
        }

        self.compute_load_order();
        errors.extend(self.cycles.iter().cloned().map(ManagerError::CycleDetected));

        let count = self.packages.len();
        info!(count, "packages registered");
        self.events.push(ManagerEvent::Discovered { count });
        count
    }

    /// Register a package built outside the loader.
    pub fn register(&mut self, package: Package) -> Result<(), ManagerError> {
        if self.index.contains_key(package.id()) {
            return Err(ManagerError::DuplicateId {
                id: package.id().to_string(),
                path: package.base_path().to_path_buf(),
            });
        }
        self.insert(package);
        Ok(())
    }

    fn insert(&mut self, package: Package) {
        self.index.insert(package.id().to_string(), self.packages.len());
        self.packages.push(package);
        self.order_dirty = true;
    }

    pub fn get(&self, id: &str) -> Option<&Package> {
        self.index.get(id).map(|&i| &self.packages[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Package> {
        self.index.get(id).map(|&i| &mut self.packages[i])
    }

    /// All packages in discovery order.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn dlc_packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter().filter(|p| p.is_dlc())
    }

    /// DLC packages whose last verification resolved to owned or trial.
    pub fn owned_dlc(&self) -> impl Iterator<Item = &Package> {
        self.dlc_packages()
            .filter(|p| p.dlc().is_some_and(|d| d.is_owned()))
    }

    /// Enable or disable a package. The load order is recomputed on the next
    /// load.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), ManagerError> {
        let package = self
            .get_mut(id)
            .ok_or_else(|| ManagerError::UnknownPackage(id.to_string()))?;
        package.set_enabled(enabled);
        self.order_dirty = true;
        Ok(())
    }

    // -- Ordering --

    /// Compute the load order over enabled packages.
    pub fn compute_load_order(&mut self) -> &[String] {
        let n = self.packages.len();
        let enabled: Vec<bool> = self.packages.iter().map(Package::is_enabled).collect();
        let lookup = |id: &str| self.index.get(id).copied().filter(|&i| enabled[i]);

        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, package) in self.packages.iter().enumerate() {
            if !enabled[i] {
                continue;
            }
            let manifest = package.manifest();
            for pred in manifest.ordering_predecessors().filter_map(lookup) {
                preds[i].push(pred);
            }
            for succ in manifest.load_before.iter().filter_map(|id| lookup(id)) {
                preds[succ].push(i);
            }
        }
        let mut seen = vec![false; n];
        for list in &mut preds {
            list.retain(|&p| !std::mem::replace(&mut seen[p], true));
            for &p in list.iter() {
                seen[p] = false;
            }
        }

        let mut walk = OrderWalk {
            preds: &preds,
            marks: vec![Mark::Unvisited; n],
            cycles: Vec::new(),
        };
        for i in (0..n).filter(|&i| enabled[i]) {
            walk.visit(i);
        }
        let admitted: Vec<bool> = walk.marks.iter().map(|m| *m == Mark::Admitted).collect();
        let cycles = walk.cycles;

        let mut in_degree = vec![0usize; n];
        let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in (0..n).filter(|&i| admitted[i]) {
            in_degree[i] = preds[i].len();
            for &p in &preds[i] {
                succs[p].push(i);
            }
        }

        let mut ready: BinaryHeap<Reverse<(i32, usize)>> = (0..n)
            .filter(|&i| admitted[i] && in_degree[i] == 0)
            .map(|i| Reverse((self.packages[i].manifest().priority, i)))
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse((_, i))) = ready.pop() {
            order.push(self.packages[i].id().to_string());
            for &s in &succs[i] {
                in_degree[s] -= 1;
                if in_degree[s] == 0 {
                    ready.push(Reverse((self.packages[s].manifest().priority, s)));
                }
            }
        }

        self.cycles = cycles
            .into_iter()
            .map(|c| c.into_iter().map(|i| self.packages[i].id().to_string()).collect())
            .collect();
        for cycle in &self.cycles {
            warn!(cycle = %cycle.join(" -> "), "dependency cycle detected");
            self.events.push(ManagerEvent::CycleDetected {
                cycle: cycle.clone(),
            });
        }

        debug!(order = ?order, "load order computed");
        self.events.push(ManagerEvent::LoadOrderComputed {
            order: order.clone(),
        });
        self.load_order = order;
        self.order_dirty = false;
        &self.load_order
    }

    /// The last computed load order.
    pub fn load_order(&self) -> &[String] {
        &self.load_order
    }

    /// Whether the last ordering pass hit a cycle.
    pub fn has_cycle(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Every cycle found by the last ordering pass, each closed on its first id.
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    // -- Loading --

    /// Check that every required dependency of `id` is registered, enabled,
    /// not failed, and new enough. Optional dependencies never block.
    pub fn check_dependencies(&self, id: &str) -> Result<(), ManagerError> {
        let package = self
            .get(id)
            .ok_or_else(|| ManagerError::UnknownPackage(id.to_string()))?;

        for dep in package.manifest().required_dependencies() {
            let missing = |reason| ManagerError::MissingDependency {
                id: id.to_string(),
                dependency: dep.mod_id.clone(),
                reason,
            };
            let Some(target) = self.get(&dep.mod_id) else {
                return Err(missing(MissingReason::NotFound));
            };
            if !target.is_enabled() {
                return Err(missing(MissingReason::Disabled));
            }
            if target.state() == PackageState::Failed {
                return Err(missing(MissingReason::Failed));
            }
            if let Some(required) = &dep.min_version {
                let found = target.manifest().version.clone();
                if !version_satisfies(found.as_deref(), required) {
                    return Err(missing(MissingReason::Version {
                        required: required.clone(),
                        found,
                    }));
                }
            }
        }
        Ok(())
    }

    /// Load every package in load order.
    ///
    /// Each failure is logged and recorded on the package; the remaining
    /// packages are still attempted. Returns true only when every enabled
    /// package loaded.
    pub fn load_all(&mut self) -> bool {
        if self.order_dirty {
            self.compute_load_order();
        }

        let order = self.load_order.clone();
        let mut failed = 0usize;
        for id in &order {
            if self.load_in_order(id).is_err() {
                failed += 1;
            }
        }

        let excluded = self
            .packages
            .iter()
            .filter(|p| p.is_enabled() && !self.load_order.iter().any(|id| id == p.id()))
            .count();
        info!(
            loaded = self.loaded.len(),
            failed,
            excluded,
            "load pass finished"
        );
        failed == 0 && excluded == 0
    }

    /// Load one package with the same checks `load_all` applies. The package
    /// must be in the current load order.
    pub fn load_package(&mut self, id: &str) -> Result<(), ManagerError> {
        if self.get(id).is_none() {
            return Err(ManagerError::UnknownPackage(id.to_string()));
        }
        if self.order_dirty {
            self.compute_load_order();
        }
        if !self.load_order.iter().any(|o| o == id) {
            return Err(ManagerError::NotInLoadOrder(id.to_string()));
        }
        self.load_in_order(id)
    }

    fn load_in_order(&mut self, id: &str) -> Result<(), ManagerError> {
        let index = self.index[id];
        match self.packages[index].can_load() {
            Ok(LoadReadiness::AlreadyLoaded) => {
                self.track_loaded(id);
                return Ok(());
            }
            Ok(LoadReadiness::Ready) => {}
            Err(e) => {
                self.events.push(ManagerEvent::PackageFailed {
                    id: id.to_string(),
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        }

        let result = self
            .check_dependencies(id)
            .and_then(|()| self.check_game_version(id));
        if let Err(e) = result {
            warn!(package = id, error = %e, "package skipped");
            if let Some(package) = self.get_mut(id) {
                package.mark_failed(e.to_string());
            }
            self.events.push(ManagerEvent::PackageFailed {
                id: id.to_string(),
                reason: e.to_string(),
            });
            return Err(e);
        }

        match self.packages[index].load(self.native.as_mut()) {
            Ok(()) => {
                self.track_loaded(id);
                Ok(())
            }
            Err(e) => {
                self.events.push(ManagerEvent::PackageFailed {
                    id: id.to_string(),
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    fn track_loaded(&mut self, id: &str) {
        if !self.loaded.iter().any(|l| l == id) {
            self.loaded.push(id.to_string());
            self.events.push(ManagerEvent::PackageLoaded { id: id.to_string() });
        }
    }

    fn check_game_version(&self, id: &str) -> Result<(), ManagerError> {
        let (Some(package), Some(current)) = (self.get(id), self.game_version.as_deref()) else {
            return Ok(());
        };
        let Some(required) = package.manifest().min_game_version.as_deref() else {
            return Ok(());
        };
        if version_satisfies(Some(current), required) {
            Ok(())
        } else {
            Err(ManagerError::GameVersion {
                id: id.to_string(),
                required: required.to_string(),
                current: current.to_string(),
            })
        }
    }

    /// Unload every loaded package in exact reverse load order.
    pub fn unload_all(&mut self) {
        let loaded = std::mem::take(&mut self.loaded);
        for id in loaded.iter().rev() {
            if let Some(package) = self.get_mut(id) {
                package.unload();
            }
            self.events.push(ManagerEvent::PackageUnloaded { id: id.clone() });
        }
    }

    /// Unload a single package. Returns false if it was not loaded.
    pub fn unload_package(&mut self, id: &str) -> bool {
        let Some(pos) = self.loaded.iter().position(|l| l == id) else {
            return false;
        };
        self.loaded.remove(pos);
        if let Some(package) = self.get_mut(id) {
            package.unload();
        }
        self.events.push(ManagerEvent::PackageUnloaded { id: id.to_string() });
        true
    }

    /// Ids of loaded packages, in the order they were loaded.
    pub fn loaded_ids(&self) -> &[String] {
        &self.loaded
    }

    /// Loaded packages in load order.
    pub fn loaded_packages(&self) -> impl DoubleEndedIterator<Item = &Package> {
        self.loaded.iter().filter_map(|id| self.get(id))
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.loaded.iter().any(|l| l == id)
    }

    /// Loaded packages that are currently enabled. A package disabled while
    /// loaded stays resident but serves no files or content.
    fn active_packages(&self) -> impl DoubleEndedIterator<Item = &Package> {
        self.loaded_packages().filter(|p| p.is_enabled())
    }

    // -- Overrides --

    /// Find `relative` in the enabled loaded packages, last-loaded first.
    ///
    /// Each package is searched at its root, then under its data directory.
    /// Absolute paths and paths escaping the package with `..` never match.
    pub fn resolve_path(&self, relative: impl AsRef<Path>) -> Option<PathBuf> {
        let relative = relative.as_ref();
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }

        self.active_packages().rev().find_map(|package| {
            [package.base_path(), package.data_path()]
                .into_iter()
                .map(|root| root.join(relative))
                .find(|candidate| candidate.is_file())
        })
    }

    // -- Ownership --

    /// Refresh each distinct ownership backend attached to a DLC, then
    /// re-verify every DLC. Returns the errors encountered.
    pub fn refresh_ownership(&mut self) -> Vec<OwnershipError> {
        let mut backends: Vec<Arc<dyn OwnershipBackend>> = Vec::new();
        for backend in self.dlc_packages().filter_map(|p| p.dlc()?.backend()) {
            if !backends.iter().any(|b| Arc::ptr_eq(b, backend)) {
                backends.push(backend.clone());
            }
        }

        let mut errors: Vec<OwnershipError> =
            backends.iter().filter_map(|b| b.refresh().err()).collect();
        for package in self.packages.iter_mut() {
            if let Some(dlc) = package.dlc_mut() {
                if let Err(e) = dlc.verify_ownership() {
                    errors.push(e);
                }
            }
        }
        errors
    }

    // -- Events --

    /// Drain manager events.
    pub fn drain_events(&mut self) -> Vec<ManagerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending_events(&self) -> &[ManagerEvent] {
        &self.events
    }

    /// Drain events from every DLC package, in discovery order.
    pub fn drain_dlc_events(&mut self) -> Vec<DlcEvent> {
        self.packages
            .iter_mut()
            .filter_map(Package::dlc_mut)
            .flat_map(|dlc| dlc.drain_events())
            .collect()
    }

    // -- Content aggregation --

    fn collect<T>(&self, get: impl Fn(&dyn ContentProvider) -> Vec<T>) -> Vec<T> {
        self.active_packages()
            .filter_map(Package::content_provider)
            .flat_map(|provider| get(&**provider))
            .collect()
    }

    pub fn entity_types(&self) -> Vec<EntityType> {
        self.collect(|p| p.entity_types())
    }

    pub fn item_defs(&self) -> Vec<ItemDef> {
        self.collect(|p| p.item_defs())
    }

    pub fn quest_defs(&self) -> Vec<QuestDef> {
        self.collect(|p| p.quest_defs())
    }

    pub fn commands(&self) -> Vec<ConsoleCommand> {
        self.collect(|p| p.commands())
    }

    pub fn locales(&self) -> Vec<LocaleEntry> {
        self.collect(|p| p.locales())
    }

    pub fn scenes(&self) -> Vec<SceneDef> {
        self.collect(|p| p.scenes())
    }

    pub fn bt_node_types(&self) -> Vec<BtNodeType> {
        self.collect(|p| p.bt_node_types())
    }
}

impl std::fmt::Debug for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageManager")
            .field("loader", &self.loader)
            .field("packages", &self.packages)
            .field("load_order", &self.load_order)
            .field("loaded", &self.loaded)
            .field("cycles", &self.cycles)
            .field("game_version", &self.game_version)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// Parse a version, padding missing minor/patch components ("1.2" -> 1.2.0).
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(v) = Version::parse(raw) {
        return Some(v);
    }
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    Version::parse(&padded).ok()
}

/// Whether `found` is at least `required`.
///
/// A missing `found` never satisfies a constraint. If either side does not
/// parse as a version the constraint is not enforced.
fn version_satisfies(found: Option<&str>, required: &str) -> bool {
    let Some(found) = found else {
        return false;
    };
    match (parse_version(found), parse_version(required)) {
        (Some(found), Some(required)) => found >= required,
        _ => {
            debug!(found, required, "unparsable version, constraint not enforced");
            true
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
