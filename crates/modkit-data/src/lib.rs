pub mod config;
pub mod loader;
pub mod manifest;
pub mod schema;

pub use config::ModkitConfig;
pub use loader::{DataLoadError, Format};
pub use manifest::{FileManifestReader, load_manifest};
