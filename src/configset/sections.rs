//! Section/key-value codec (INI-style game config files).
//!
//! Plain lines become root items of their section. Grouped values like
//! `OverrideEngram=(EngramClassName="X",Hidden=true)` are flattened: each
//! inner pair becomes an item whose `path` is the grouping key. On render,
//! items sharing a path are regrouped into one synthesized key with a
//! comma-joined, parenthesized value list.

use super::item::ConfigItem;

pub fn parse(doc: &str) -> Vec<ConfigItem> {
    let mut items = Vec::new();
    let mut section = String::new();

    for line in doc.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            section = trimmed[1..trimmed.len() - 1].to_string();
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if let Some(inner) = grouped_value(value) {
            for pair in split_pairs(inner) {
                let (k, v) = pair
                    .split_once('=')
                    .map(|(k, v)| (k.trim(), v.trim()))
                    .unwrap_or((pair.trim(), ""));
                items.push(ConfigItem::new(section.clone(), key, k, v));
            }
        } else {
            items.push(ConfigItem::new(section.clone(), "", key, value));
        }
    }

    mark_duplicates(&mut items);
    items
}

pub fn render(items: &[ConfigItem]) -> String {
    let mut out = String::new();
    let mut categories: Vec<&str> = Vec::new();
    for item in items {
        if !categories.contains(&item.category.as_str()) {
            categories.push(&item.category);
        }
    }

    for (i, category) in categories.iter().enumerate() {
        if !category.is_empty() {
            if i > 0 || !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", category));
        }
        let mut grouped_done: Vec<&str> = Vec::new();
        for item in items.iter().filter(|i| i.category == *category) {
            if item.path.is_empty() {
                out.push_str(&format!("{}={}\n", item.key, item.value));
            } else if !grouped_done.contains(&item.path.as_str()) {
                grouped_done.push(&item.path);
                let pairs: Vec<String> = items
                    .iter()
                    .filter(|i| i.category == *category && i.path == item.path)
                    .map(|i| format!("{}={}", i.key, i.value))
                    .collect();
                out.push_str(&format!("{}=({})\n", item.path, pairs.join(",")));
            }
        }
    }

    out
}

/// Returns the inner pair list if `value` is a parenthesized group.
fn grouped_value(value: &str) -> Option<&str> {
    let inner = value.strip_prefix('(')?.strip_suffix(')')?;
    if inner.contains('=') {
        Some(inner)
    } else {
        None
    }
}

/// Split a grouped value on commas, ignoring commas inside double quotes.
fn split_pairs(inner: &str) -> Vec<&str> {
    let mut pairs = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in inner.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                pairs.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < inner.len() {
        pairs.push(&inner[start..]);
    }
    pairs
}

/// Plain keys that repeat within a section are legal duplicates (mod lists
/// and the like); flag them so the merge algorithm matches on full tuples.
fn mark_duplicates(items: &mut [ConfigItem]) {
    let slots: Vec<(String, String)> = items
        .iter()
        .filter(|i| i.path.is_empty())
        .map(|i| (i.category.clone(), i.key.clone()))
        .collect();
    for item in items.iter_mut().filter(|i| i.path.is_empty()) {
        let n = slots
            .iter()
            .filter(|(c, k)| *c == item.category && *k == item.key)
            .count();
        if n > 1 {
            item.duplicate_key = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
[ServerSettings]
MaxPlayers=70
ServerPassword=
ModId=111111
ModId=222222
OverrideEngram=(EngramClassName=\"EngramEntry_Flare\",EngramHidden=true,EngramPointsCost=12)

[SessionSettings]
SessionName=My Server
";

    #[test]
    fn parses_plain_grouped_and_duplicate_keys() {
        let items = parse(DOC);

        let max = items.iter().find(|i| i.key == "MaxPlayers").unwrap();
        assert_eq!(max.category, "ServerSettings");
        assert_eq!(max.value, "70");
        assert!(!max.duplicate_key);

        let mods: Vec<_> = items.iter().filter(|i| i.key == "ModId").collect();
        assert_eq!(mods.len(), 2);
        assert!(mods.iter().all(|i| i.duplicate_key));

        let grouped: Vec<_> = items.iter().filter(|i| i.path == "OverrideEngram").collect();
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[1].key, "EngramHidden");
        assert_eq!(grouped[1].value, "true");

        let session = items.iter().find(|i| i.key == "SessionName").unwrap();
        assert_eq!(session.category, "SessionSettings");
    }

    #[test]
    fn round_trip_preserves_every_pair_and_grouping() {
        let items = parse(DOC);
        let rendered = render(&items);
        let reparsed = parse(&rendered);
        assert_eq!(items, reparsed);
    }

    #[test]
    fn render_regroups_path_items_into_one_key() {
        let items = vec![
            ConfigItem::new("S", "Group", "a", "1"),
            ConfigItem::new("S", "Group", "b", "2"),
        ];
        assert_eq!(render(&items), "[S]\nGroup=(a=1,b=2)\n");
    }

    #[test]
    fn quoted_commas_stay_inside_one_pair() {
        let items = parse("[S]\nG=(name=\"a,b\",x=1)\n");
        let grouped: Vec<_> = items.iter().filter(|i| i.path == "G").collect();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].value, "\"a,b\"");
    }
}
