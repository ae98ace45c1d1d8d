//! Format detection and deserialization helpers.
//!
//! Manifests and settings files may be written as YAML, RON, TOML, or JSON;
//! the format is chosen from the file extension.

use modkit_core::loader::LoaderError;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while reading data files.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A field holds a value outside its allowed set.
    #[error("invalid {field} '{value}' in {file}")]
    InvalidValue {
        file: PathBuf,
        field: &'static str,
        value: String,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DataLoadError {
    fn into_loader_error(self) -> LoaderError {
        match self {
            Self::Io(e) => LoaderError::Io(e),
            Self::UnsupportedFormat { ref file }
            | Self::Parse { ref file, .. }
            | Self::InvalidValue { ref file, .. } => LoaderError::InvalidManifest {
                path: file.clone(),
                detail: self.to_string(),
            },
        }
    }
}

impl From<DataLoadError> for LoaderError {
    fn from(e: DataLoadError) -> Self {
        e.into_loader_error()
    }
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => Ok(Format::Yaml),
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Deserialize `content` as `format`. `path` is only used for error reports.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    path: &Path,
) -> Result<T, DataLoadError> {
    let parse_err = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };

    match format {
        Format::Yaml => serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string())),
        Format::Ron => ron::from_str(content).map_err(|e| parse_err(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format, path)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    // -----------------------------------------------------------------------
    // detect_format
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("mod.yaml")).unwrap(), Format::Yaml);
        assert_eq!(detect_format(Path::new("mod.yml")).unwrap(), Format::Yaml);
        assert_eq!(detect_format(Path::new("mod.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("mod.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("mod.json")).unwrap(), Format::Json);
    }

    #[test]
    fn detect_format_unsupported() {
        let result = detect_format(Path::new("mod.ini"));
        assert!(matches!(
            result,
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn detect_format_no_extension() {
        let result = detect_format(Path::new("mod"));
        assert!(matches!(
            result,
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // deserialize_file
    // -----------------------------------------------------------------------

    #[test]
    fn deserialize_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let files = [
            ("a.yaml", "name: iron\ncount: 3\n"),
            ("b.ron", "(name: \"iron\", count: 3)"),
            ("c.toml", "name = \"iron\"\ncount = 3\n"),
            ("d.json", r#"{"name": "iron", "count": 3}"#),
        ];
        for (file, content) in files {
            let path = dir.path().join(file);
            fs::write(&path, content).unwrap();
            let sample: Sample = deserialize_file(&path).unwrap();
            assert_eq!(
                sample,
                Sample {
                    name: "iron".to_string(),
                    count: 3
                },
                "format of {file}"
            );
        }
    }

    #[test]
    fn deserialize_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = deserialize_file::<Sample>(&path).unwrap_err();
        assert!(matches!(err, DataLoadError::Parse { ref file, .. } if file == &path));
    }

    #[test]
    fn deserialize_missing_file_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = deserialize_file::<Sample>(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, DataLoadError::Io(_)));
    }

    // -----------------------------------------------------------------------
    // Conversion into LoaderError
    // -----------------------------------------------------------------------

    #[test]
    fn parse_error_becomes_invalid_manifest() {
        let err: LoaderError = DataLoadError::Parse {
            file: PathBuf::from("mods/a/mod.yaml"),
            detail: "bad indent".to_string(),
        }
        .into();
        match err {
            LoaderError::InvalidManifest { path, detail } => {
                assert_eq!(path, PathBuf::from("mods/a/mod.yaml"));
                assert!(detail.contains("bad indent"), "got: {detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn io_error_stays_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LoaderError = DataLoadError::Io(io).into();
        assert!(matches!(err, LoaderError::Io(_)));
    }
}
