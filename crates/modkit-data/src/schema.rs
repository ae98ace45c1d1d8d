//! Serde structs for the on-disk manifest format.
//!
//! The on-disk form is more forgiving than [`ManifestRecord`]: priorities may
//! be names or integers, dependencies may be bare ids or full tables, and
//! enum-like fields are case-insensitive strings. [`crate::manifest`] turns a
//! [`ManifestData`] into a validated record.
//!
//! [`ManifestRecord`]: modkit_core::manifest::ManifestRecord

use modkit_core::manifest::DlcContent;
use serde::Deserialize;

// ===========================================================================
// Priority
// ===========================================================================

/// A load priority, supporting both a named form and an integer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PriorityData {
    /// Integer form: `priority: -50`.
    Value(i32),
    /// Named form: `priority: early`.
    Named(String),
}

// ===========================================================================
// Dependencies
// ===========================================================================

/// A dependency entry, supporting both short form and full form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DependencyData {
    /// Short form: `- core` (required, no version constraint).
    Short(String),
    /// Full form with explicit fields.
    Full {
        #[serde(alias = "id")]
        mod_id: String,
        #[serde(default)]
        min_version: Option<String>,
        #[serde(default)]
        optional: bool,
    },
}

// ===========================================================================
// Manifest
// ===========================================================================

/// A package manifest as written on disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<String>,
    #[serde(default)]
    pub priority: Option<PriorityData>,
    #[serde(default)]
    pub dependencies: Vec<DependencyData>,
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
    pub dlc_type: Option<String>,
    #[serde(default)]
    pub steam_app_id: Option<u32>,
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default, alias = "price")]
    pub price_string: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub min_game_version: Option<String>,
    #[serde(default)]
    pub ownership_method: Option<String>,
    #[serde(default)]
    pub trial_enabled: bool,
    #[serde(default)]
    pub trial_content_ids: Vec<String>,
    /// Subtype content lists (`area_ids`, `quest_ids`, ...).
    #[serde(default, alias = "dlc_content")]
    pub content: DlcContent,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_accepts_both_forms() {
        let named: PriorityData = serde_json::from_str(r#""late""#).unwrap();
        assert_eq!(named, PriorityData::Named("late".to_string()));
        let value: PriorityData = serde_json::from_str("-7").unwrap();
        assert_eq!(value, PriorityData::Value(-7));
    }

    #[test]
    fn dependency_short_and_full_forms() {
        let deps: Vec<DependencyData> = serde_yaml::from_str(
            "- core\n- id: ui\n  min_version: \"1.2\"\n- mod_id: extras\n  optional: true\n",
        )
        .unwrap();
        assert_eq!(
            deps,
            vec![
                DependencyData::Short("core".to_string()),
                DependencyData::Full {
                    mod_id: "ui".to_string(),
                    min_version: Some("1.2".to_string()),
                    optional: false,
                },
                DependencyData::Full {
                    mod_id: "extras".to_string(),
                    min_version: None,
                    optional: true,
                },
            ]
        );
    }

    #[test]
    fn manifest_defaults_when_fields_absent() {
        let data: ManifestData = serde_yaml::from_str("id: bare\n").unwrap();
        assert_eq!(data.id.as_deref(), Some("bare"));
        assert!(data.kind.is_none());
        assert!(data.priority.is_none());
        assert!(data.dependencies.is_empty());
        assert!(!data.is_dlc);
        assert_eq!(data.content, DlcContent::default());
    }

    #[test]
    fn manifest_reads_dlc_content_table() {
        let data: ManifestData = toml::from_str(
            r#"
id = "heroes"
is_dlc = true
dlc_type = "character"
steam_app_id = 480

[content]
character_ids = ["knight", "mage"]
playable = true
"#,
        )
        .unwrap();
        assert_eq!(data.steam_app_id, Some(480));
        assert_eq!(data.content.character_ids, vec!["knight", "mage"]);
        assert!(data.content.playable);
        assert!(!data.content.companion);
    }
}
