//! Flat key-value codec (launcher/property files without sections).

use super::item::ConfigItem;

pub fn parse(doc: &str) -> Vec<ConfigItem> {
    let mut items = Vec::new();
    for line in doc.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (key, value) = trimmed
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .unwrap_or((trimmed, ""));
        items.push(ConfigItem::new("", "", key, value));
    }
    items
}

/// Render back to `key=value` lines. The map is flat, so repeated keys are
/// deduped with the last value winning; key order follows first appearance.
pub fn render(items: &[ConfigItem]) -> String {
    let mut keys: Vec<&str> = Vec::new();
    for item in items {
        if !keys.contains(&item.key.as_str()) {
            keys.push(&item.key);
        }
    }

    let mut out = String::new();
    for key in keys {
        let value = items
            .iter()
            .rev()
            .find(|i| i.key == key)
            .map(|i| i.value.as_str())
            .unwrap_or_default();
        out.push_str(&format!("{}={}\n", key, value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_round_trips_flat_pairs() {
        let doc = "query_port=27015\nrcon_port=27020\nmotd=Welcome\n";
        let items = parse(doc);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].key, "query_port");
        assert_eq!(items[0].value, "27015");
        assert!(items[0].path.is_empty() && items[0].category.is_empty());

        assert_eq!(render(&items), doc);
    }

    #[test]
    fn render_dedupes_with_last_value_winning() {
        let items = parse("a=1\nb=2\na=3\n");
        assert_eq!(render(&items), "a=3\nb=2\n");
    }

    #[test]
    fn bare_keys_get_empty_values() {
        let items = parse("flag\n");
        assert_eq!(items[0].key, "flag");
        assert_eq!(items[0].value, "");
    }
}
