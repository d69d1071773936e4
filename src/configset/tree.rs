//! Hierarchical tree codec (JSON documents).
//!
//! Structural position is encoded in the item rather than by nesting:
//! `path` is the slash-joined ancestry of the leaf and `key` the leaf name,
//! so the generic merge algorithm applies unchanged. Arrays and other
//! non-scalar leaves are carried as a single item holding the serialized
//! subtree, replaced wholesale on update.

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use super::item::ConfigItem;

pub fn parse(doc: &str) -> Result<Vec<ConfigItem>> {
    let root: Value = serde_json::from_str(doc).context("parsing tree document")?;
    let mut items = Vec::new();
    walk(&root, "", &mut items);
    Ok(items)
}

fn walk(value: &Value, path: &str, items: &mut Vec<ConfigItem>) {
    let Value::Object(map) = value else {
        return;
    };
    for (key, child) in map {
        match child {
            Value::Object(_) => {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}/{}", path, key)
                };
                walk(child, &child_path, items);
            }
            Value::String(s) => items.push(ConfigItem::new("", path, key, s.clone())),
            other => items.push(ConfigItem::new("", path, key, other.to_string())),
        }
    }
}

pub fn render(items: &[ConfigItem]) -> Result<String> {
    let mut root = Map::new();
    for item in items {
        let slot = descend(&mut root, &item.path);
        slot.insert(item.key.clone(), leaf_value(&item.value));
    }
    serde_json::to_string_pretty(&Value::Object(root)).context("rendering tree document")
}

/// Walk to the object at `path`, rebuilding intermediate segments on demand.
/// A segment occupied by a scalar is replaced with an object wholesale.
fn descend<'a>(root: &'a mut Map<String, Value>, path: &str) -> &'a mut Map<String, Value> {
    let mut current = root;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry.as_object_mut().unwrap_or_else(|| unreachable!());
    }
    current
}

/// Item values that parse as non-string JSON (numbers, bools, arrays,
/// objects, null) are re-embedded as such; everything else stays a string.
fn leaf_value(value: &str) -> Value {
    match serde_json::from_str::<Value>(value) {
        Ok(Value::String(_)) | Err(_) => Value::String(value.to_string()),
        Ok(parsed) => parsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "server": {
            "name": "arena-1",
            "network": { "port": 7777, "public": true },
            "admins": ["ana", "bo"]
        },
        "motd": "welcome"
    }"#;

    #[test]
    fn parses_nested_paths_and_scalar_leaves() {
        let items = parse(DOC).unwrap();

        let port = items.iter().find(|i| i.key == "port").unwrap();
        assert_eq!(port.path, "server/network");
        assert_eq!(port.value, "7777");

        let motd = items.iter().find(|i| i.key == "motd").unwrap();
        assert_eq!(motd.path, "");
        assert_eq!(motd.value, "welcome");

        let admins = items.iter().find(|i| i.key == "admins").unwrap();
        assert_eq!(admins.value, r#"["ana","bo"]"#);
    }

    #[test]
    fn round_trip_reproduces_all_pairs() {
        let items = parse(DOC).unwrap();
        let rendered = render(&items).unwrap();
        let mut reparsed = parse(&rendered).unwrap();

        // Object key order is not part of the contract; compare as sets.
        let mut expected = items.clone();
        expected.sort_by(|a, b| (&a.path, &a.key).cmp(&(&b.path, &b.key)));
        reparsed.sort_by(|a, b| (&a.path, &a.key).cmp(&(&b.path, &b.key)));
        assert_eq!(expected, reparsed);
    }

    #[test]
    fn render_rebuilds_missing_intermediate_segments() {
        let items = vec![ConfigItem::new("", "a/b/c", "leaf", "1")];
        let rendered = render(&items).unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["a"]["b"]["c"]["leaf"], 1);
    }

    #[test]
    fn array_leaves_replace_wholesale() {
        let existing = parse(r#"{"admins": ["ana"]}"#).unwrap();
        let update = vec![ConfigItem::new("", "", "admins", r#"["bo","cy"]"#)];
        let merged = crate::configset::item::merge(&existing, &update, false);
        let rendered = render(&merged).unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["admins"], serde_json::json!(["bo", "cy"]));
    }
}
