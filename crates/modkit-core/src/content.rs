//! Typed content exposed by loaded packages.
//!
//! A loaded package may expose any number of content collections through the
//! [`ContentProvider`] trait. Every getter defaults to an empty collection, so
//! a provider only overrides what it actually ships. The manager concatenates
//! collections across packages in load order.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Content records
// ---------------------------------------------------------------------------

/// An entity type a package adds to the game world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    pub name: String,
    pub components: Vec<String>,
}

/// An item definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDef {
    pub id: String,
    pub name: String,
    pub stack_size: u32,
}

/// A quest definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestDef {
    pub id: String,
    pub title: String,
    pub stages: Vec<String>,
}

/// A console command registered by a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleCommand {
    pub name: String,
    pub help: String,
}

/// A locale table: one language, key -> translated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleEntry {
    pub language: String,
    pub strings: HashMap<String, String>,
}

/// A scene a package contributes, addressed relative to the package root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneDef {
    pub id: String,
    pub path: String,
}

/// A behavior-tree node type for the AI system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtNodeType {
    pub name: String,
    pub category: String,
}

// ---------------------------------------------------------------------------
// ContentProvider
// ---------------------------------------------------------------------------

/// Content collections a package can expose. All getters default to empty.
pub trait ContentProvider: Send + Sync {
    fn entity_types(&self) -> Vec<EntityType> {
        Vec::new()
    }

    fn item_defs(&self) -> Vec<ItemDef> {
        Vec::new()
    }

    fn quest_defs(&self) -> Vec<QuestDef> {
        Vec::new()
    }

    fn commands(&self) -> Vec<ConsoleCommand> {
        Vec::new()
    }

    fn locales(&self) -> Vec<LocaleEntry> {
        Vec::new()
    }

    fn scenes(&self) -> Vec<SceneDef> {
        Vec::new()
    }

    fn bt_node_types(&self) -> Vec<BtNodeType> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// StaticContent
// ---------------------------------------------------------------------------

/// A provider backed by fixed collections, built with chained `with_*` calls.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    pub entity_types: Vec<EntityType>,
    pub item_defs: Vec<ItemDef>,
    pub quest_defs: Vec<QuestDef>,
    pub commands: Vec<ConsoleCommand>,
    pub locales: Vec<LocaleEntry>,
    pub scenes: Vec<SceneDef>,
    pub bt_node_types: Vec<BtNodeType>,
}

impl StaticContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, name: &str, components: &[&str]) -> Self {
        self.entity_types.push(EntityType {
            name: name.to_string(),
            components: components.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn with_item(mut self, id: &str, name: &str, stack_size: u32) -> Self {
        self.item_defs.push(ItemDef {
            id: id.to_string(),
            name: name.to_string(),
            stack_size,
        });
        self
    }

    pub fn with_quest(mut self, id: &str, title: &str, stages: &[&str]) -> Self {
        self.quest_defs.push(QuestDef {
            id: id.to_string(),
            title: title.to_string(),
            stages: stages.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn with_command(mut self, name: &str, help: &str) -> Self {
        self.commands.push(ConsoleCommand {
            name: name.to_string(),
            help: help.to_string(),
        });
        self
    }

    pub fn with_locale(mut self, language: &str, strings: &[(&str, &str)]) -> Self {
        self.locales.push(LocaleEntry {
            language: language.to_string(),
            strings: strings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self
    }

    pub fn with_scene(mut self, id: &str, path: &str) -> Self {
        self.scenes.push(SceneDef {
            id: id.to_string(),
            path: path.to_string(),
        });
        self
    }

    pub fn with_bt_node(mut self, name: &str, category: &str) -> Self {
        self.bt_node_types.push(BtNodeType {
            name: name.to_string(),
            category: category.to_string(),
        });
        self
    }
}

impl ContentProvider for StaticContent {
    fn entity_types(&self) -> Vec<EntityType> {
        self.entity_types.clone()
    }

    fn item_defs(&self) -> Vec<ItemDef> {
        self.item_defs.clone()
    }

    fn quest_defs(&self) -> Vec<QuestDef> {
        self.quest_defs.clone()
    }

    fn commands(&self) -> Vec<ConsoleCommand> {
        self.commands.clone()
    }

    fn locales(&self) -> Vec<LocaleEntry> {
        self.locales.clone()
    }

    fn scenes(&self) -> Vec<SceneDef> {
        self.scenes.clone()
    }

    fn bt_node_types(&self) -> Vec<BtNodeType> {
        self.bt_node_types.clone()
    }
}
