//! Native module boundary.
//!
//! The host injects a [`NativeLoader`] that knows how to turn an entry-point
//! path into a [`NativeModule`]. The package layer only sees "opened",
//! "initialized", and "shut down"; symbol resolution stays on the host side.

use crate::content::ContentProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a native module learns about the package it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub id: String,
    pub version: Option<String>,
    pub base_path: PathBuf,
    pub data_path: PathBuf,
}

/// An opened native module.
pub trait NativeModule {
    /// Run the module's init entry point. `false` means initialization failed.
    fn init(&mut self, package: &PackageInfo) -> bool;

    /// Whether the module exports a shutdown entry point.
    fn has_shutdown(&self) -> bool {
        false
    }

    /// Run the module's shutdown entry point.
    fn shutdown(&mut self, package: &PackageInfo) {
        let _ = package;
    }

    /// Content the module exposes after a successful init.
    fn content_provider(&self) -> Option<Arc<dyn ContentProvider>> {
        None
    }
}

/// Opens native modules by path.
pub trait NativeLoader {
    fn open(&mut self, path: &Path) -> Result<Box<dyn NativeModule>, NativeError>;
}

/// Errors reported by a [`NativeLoader`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    #[error("native module not found: {0}")]
    NotFound(PathBuf),
    #[error("missing symbol '{symbol}' in {path}")]
    MissingSymbol { path: PathBuf, symbol: String },
    #[error("native loading is not supported by this host")]
    Unsupported,
    #[error("failed to open native module {path}: {detail}")]
    Open { path: PathBuf, detail: String },
}

/// Loader used when the host provides none. Every open fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedNativeLoader;

impl NativeLoader for UnsupportedNativeLoader {
    fn open(&mut self, _path: &Path) -> Result<Box<dyn NativeModule>, NativeError> {
        Err(NativeError::Unsupported)
    }
}
