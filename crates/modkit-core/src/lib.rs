//! Modkit Core -- package discovery, load ordering, and DLC ownership for
//! moddable games.
//!
//! A game points a [`loader::PackageLoader`] at one or more search paths.
//! Every immediate subdirectory holding a manifest becomes a
//! [`package::Package`]. The [`manager::PackageManager`] owns the packages,
//! orders them, loads them, and answers questions about the loaded set.
//!
//! # Load Pipeline
//!
//! 1. **Discover** -- Scan search paths, read manifests, drop duplicate ids.
//! 2. **Order** -- Sort enabled packages so dependencies and `load_after`
//!    targets come first; priority breaks ties; cycles are reported and the
//!    packages caught in them excluded.
//! 3. **Load** -- For each package in order, check required dependencies and
//!    version constraints, verify DLC ownership, then run the kind-specific
//!    load step (data, script, or native).
//! 4. **Serve** -- Resolve override paths last-loaded-first and concatenate
//!    content from loaded packages.
//! 5. **Unload** -- Tear down in exact reverse load order.
//!
//! ```rust,ignore
//! let mut loader = PackageLoader::new(reader, OwnershipBackends::new());
//! loader.add_search_path("mods");
//! let mut manager = PackageManager::new(loader);
//! let mut errors = Vec::new();
//! manager.discover(&mut errors);
//! manager.load_all();
//! let texture = manager.resolve_path("textures/stone.png");
//! ```
//!
//! # Key Types
//!
//! - [`manifest::ManifestRecord`] -- Declarative package description.
//! - [`package::Package`] -- A manifest plus lifecycle state; DLC packages
//!   carry a [`package::Dlc`] part.
//! - [`ownership::OwnershipBackend`] -- Answers "is this DLC owned?". Manifest,
//!   license-file, and platform (steam) backends are provided.
//! - [`native::NativeLoader`] -- Host hook that opens native modules.
//! - [`content::ContentProvider`] -- Per-package content the manager
//!   aggregates.

pub mod content;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod native;
pub mod ownership;
pub mod package;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
