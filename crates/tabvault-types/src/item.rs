use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Color assigned to groups when the original color is unknown or stripped.
pub const DEFAULT_GROUP_COLOR: &str = "grey";

/// A tab archived into the vault.
///
/// The `was_*` flags record the state the live tab had when it was archived;
/// the live tab may no longer exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedTab {
    pub id: String,
    #[serde(default)]
    pub original_id: Option<i64>,
    /// Archive time in milliseconds since the Unix epoch.
    pub saved_at: i64,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub was_pinned: bool,
    #[serde(default)]
    pub was_muted: bool,
    #[serde(default)]
    pub was_frozen: bool,
}

/// A tab group archived into the vault together with its tabs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedGroup {
    pub id: String,
    #[serde(default)]
    pub original_id: Option<i64>,
    pub saved_at: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub tabs: Vec<ArchivedTab>,
}

fn default_color() -> String {
    DEFAULT_GROUP_COLOR.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArchivedItem {
    Tab(ArchivedTab),
    Group(ArchivedGroup),
}

impl ArchivedItem {
    pub fn id(&self) -> &str {
        match self {
            ArchivedItem::Tab(t) => &t.id,
            ArchivedItem::Group(g) => &g.id,
        }
    }

    pub fn saved_at(&self) -> i64 {
        match self {
            ArchivedItem::Tab(t) => t.saved_at,
            ArchivedItem::Group(g) => g.saved_at,
        }
    }

    /// Number of tabs this item contributes (1 for a tab, member count for a group).
    pub fn tab_count(&self) -> usize {
        match self {
            ArchivedItem::Tab(_) => 1,
            ArchivedItem::Group(g) => g.tabs.len(),
        }
    }
}

/// The ordered archived collection as held in memory between load and save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultSnapshot {
    pub items: Vec<ArchivedItem>,
}

impl VaultSnapshot {
    pub fn new(items: Vec<ArchivedItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn tab_count(&self) -> usize {
        self.items.iter().map(ArchivedItem::tab_count).sum()
    }

    /// Find a top-level item by id.
    pub fn find(&self, id: &str) -> Option<&ArchivedItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Enforce vault-wide id uniqueness, including ids of tabs nested in groups.
    pub fn check_unique_ids(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for item in &self.items {
            if !seen.insert(item.id()) {
                return Err(VaultError::DuplicateItemId(item.id().to_string()));
            }
            if let ArchivedItem::Group(group) = item {
                for tab in &group.tabs {
                    if !seen.insert(&tab.id) {
                        return Err(VaultError::DuplicateItemId(tab.id.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<ArchivedItem>> for VaultSnapshot {
    fn from(items: Vec<ArchivedItem>) -> Self {
        Self { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: &str) -> ArchivedTab {
        ArchivedTab {
            id: id.to_string(),
            original_id: Some(7),
            saved_at: 1_700_000_000_000,
            title: format!("tab {id}"),
            url: "https://example.com/".into(),
            fav_icon_url: None,
            was_pinned: false,
            was_muted: false,
            was_frozen: false,
        }
    }

    #[test]
    fn named_json_uses_type_tag_and_camel_case() {
        let item = ArchivedItem::Tab(tab("a"));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "tab");
        assert_eq!(json["originalId"], 7);
        assert_eq!(json["savedAt"], 1_700_000_000_000i64);
        assert_eq!(json["wasPinned"], false);
    }

    #[test]
    fn group_defaults_when_fields_missing() {
        let json = r#"{"type":"group","id":"g1","savedAt":1}"#;
        let item: ArchivedItem = serde_json::from_str(json).unwrap();
        match item {
            ArchivedItem::Group(g) => {
                assert_eq!(g.color, DEFAULT_GROUP_COLOR);
                assert!(g.tabs.is_empty());
                assert!(!g.collapsed);
            }
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_nested_id_is_rejected() {
        let group = ArchivedGroup {
            id: "g".into(),
            original_id: None,
            saved_at: 1,
            title: "g".into(),
            color: "blue".into(),
            collapsed: false,
            tabs: vec![tab("a")],
        };
        let snapshot = VaultSnapshot::new(vec![
            ArchivedItem::Tab(tab("a")),
            ArchivedItem::Group(group),
        ]);
        match snapshot.check_unique_ids() {
            Err(VaultError::DuplicateItemId(id)) => assert_eq!(id, "a"),
            other => panic!("expected duplicate id, got {other:?}"),
        }
    }

    #[test]
    fn unique_ids_pass() {
        let snapshot = VaultSnapshot::new(vec![
            ArchivedItem::Tab(tab("a")),
            ArchivedItem::Tab(tab("b")),
        ]);
        assert!(snapshot.check_unique_ids().is_ok());
        assert_eq!(snapshot.tab_count(), 2);
        assert!(snapshot.find("b").is_some());
    }
}
