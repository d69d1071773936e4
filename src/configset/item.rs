//! Normalized configuration item model and the generic merge algorithm.
//!
//! Every supported file format parses into a flat ordered list of
//! `ConfigItem`s, so one merge algorithm serves all of them. Hierarchical
//! and line-oriented sources encode structural position in `path`/`key`
//! instead of nesting.

use serde::{Deserialize, Serialize};

/// One configuration fact, normalized out of its source format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigItem {
    /// Identity assigned by the owning store; 0 for freshly parsed items.
    #[serde(default)]
    pub id: u64,
    /// Owning LocalResource, if any.
    #[serde(default)]
    pub resource_id: Option<u64>,
    /// Hierarchical location. Empty for flat/root items. For section files
    /// this is the grouped-value key; for trees the slash-joined ancestry.
    #[serde(default)]
    pub path: String,
    /// Section name or attribute bag, format-dependent.
    #[serde(default)]
    pub category: String,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
    /// Multiple items may legally share (category, path, key).
    #[serde(default)]
    pub duplicate_key: bool,
    /// Marks an item for removal during merge rather than inclusion.
    #[serde(default)]
    pub ignore: bool,
}

impl ConfigItem {
    pub fn new(
        category: impl Into<String>,
        path: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            resource_id: None,
            path: path.into(),
            category: category.into(),
            key: key.into(),
            value: value.into(),
            friendly_name: None,
            duplicate_key: false,
            ignore: false,
        }
    }

    /// Match on the unique-key tuple (category, path, key).
    pub fn same_slot(&self, other: &ConfigItem) -> bool {
        self.category == other.category && self.path == other.path && self.key == other.key
    }

    /// Match on the full tuple, used for duplicate-key items.
    pub fn same_fact(&self, other: &ConfigItem) -> bool {
        self.same_slot(other) && self.value == other.value
    }
}

/// Merge `priority` items into `existing`.
///
/// Duplicate-key items match by full tuple: an `ignore` match is removed,
/// a present match is left alone, anything else is appended. Unique-key
/// items match by (category, path, key): an `ignore` match is removed, a
/// match has its value (and id, unless `keep_existing_ids`) overwritten,
/// anything else is appended.
///
/// Result order is `existing`'s insertion order followed by appended new
/// items, so re-serialization stays close to the original document layout.
pub fn merge(
    existing: &[ConfigItem],
    priority: &[ConfigItem],
    keep_existing_ids: bool,
) -> Vec<ConfigItem> {
    let mut merged: Vec<ConfigItem> = existing.to_vec();

    for item in priority {
        if item.duplicate_key {
            let found = merged.iter().position(|e| e.same_fact(item));
            match (item.ignore, found) {
                (true, Some(i)) => {
                    merged.remove(i);
                }
                (true, None) => {}
                (false, Some(_)) => {}
                (false, None) => merged.push(item.clone()),
            }
        } else {
            let found = merged.iter().position(|e| e.same_slot(item));
            match (item.ignore, found) {
                (true, Some(i)) => {
                    merged.remove(i);
                }
                (true, None) => {}
                (false, Some(i)) => {
                    merged[i].value = item.value.clone();
                    if !keep_existing_ids {
                        merged[i].id = item.id;
                    }
                }
                (false, None) => merged.push(item.clone()),
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: &str, key: &str, value: &str) -> ConfigItem {
        ConfigItem::new(category, "", key, value)
    }

    #[test]
    fn merge_overwrites_unique_keys_in_place() {
        let existing = vec![
            item("Server", "MaxPlayers", "20"),
            item("Server", "Port", "7777"),
        ];
        let priority = vec![item("Server", "MaxPlayers", "70")];

        let merged = merge(&existing, &priority, false);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].value, "70");
        assert_eq!(merged[1].key, "Port");
    }

    #[test]
    fn merge_appends_new_items_after_existing() {
        let existing = vec![item("Server", "Port", "7777")];
        let priority = vec![item("Server", "MaxPlayers", "70")];

        let merged = merge(&existing, &priority, false);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].key, "MaxPlayers");
    }

    #[test]
    fn merge_ignore_removes_exactly_the_matching_item() {
        let existing = vec![
            item("Server", "Port", "7777"),
            item("Server", "MaxPlayers", "20"),
            item("Server", "Password", "x"),
        ];
        let mut drop_players = item("Server", "MaxPlayers", "");
        drop_players.ignore = true;

        let merged = merge(&existing, &[drop_players], false);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].key, "Port");
        assert_eq!(merged[1].key, "Password");
    }

    #[test]
    fn merge_ignore_without_match_is_a_no_op() {
        let existing = vec![item("Server", "Port", "7777")];
        let mut missing = item("Server", "Nothing", "");
        missing.ignore = true;

        let merged = merge(&existing, &[missing], false);
        assert_eq!(merged, existing);
    }

    #[test]
    fn merge_duplicate_key_matches_on_full_tuple() {
        let mut mod_a = item("Mods", "ModId", "100");
        mod_a.duplicate_key = true;
        let mut mod_b = item("Mods", "ModId", "200");
        mod_b.duplicate_key = true;

        let existing = vec![mod_a.clone()];
        // Same value is a no-op, new value is appended.
        let merged = merge(&existing, &[mod_a.clone(), mod_b.clone()], false);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].value, "200");

        // Ignore on a duplicate-key item removes only the exact value.
        let mut drop_a = mod_a.clone();
        drop_a.ignore = true;
        let merged = merge(&merged, &[drop_a], false);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, "200");
    }

    #[test]
    fn merge_is_idempotent_without_duplicate_keys() {
        let existing = vec![
            item("Server", "Port", "7777"),
            item("Rules", "PvP", "true"),
        ];
        let priority = vec![
            item("Server", "Port", "7778"),
            item("Rules", "Difficulty", "1.0"),
        ];

        let once = merge(&existing, &priority, false);
        let twice = merge(&once, &priority, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_keep_existing_ids_preserves_identity() {
        let mut old = item("Server", "Port", "7777");
        old.id = 41;
        let mut new = item("Server", "Port", "7778");
        new.id = 99;

        let merged = merge(&[old.clone()], &[new.clone()], true);
        assert_eq!(merged[0].id, 41);
        assert_eq!(merged[0].value, "7778");

        let merged = merge(&[old], &[new], false);
        assert_eq!(merged[0].id, 99);
    }
}
