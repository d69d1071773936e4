//! Line-oriented codec (startup scripts, raw command files).
//!
//! Each line becomes an item keyed by its 1-based line number, so the merge
//! algorithm can overwrite or remove individual lines by numeric key.

use super::item::ConfigItem;

pub fn parse(doc: &str) -> Vec<ConfigItem> {
    doc.lines()
        .enumerate()
        .map(|(i, line)| ConfigItem::new("", "", (i + 1).to_string(), line))
        .collect()
}

/// Render items back to text. Lines are placed by numeric key; any gap line
/// numbers are filled with blank lines first, then each item overwrites its
/// slot (last write wins for a repeated key).
pub fn render(items: &[ConfigItem]) -> String {
    let max = items
        .iter()
        .filter_map(|i| i.key.parse::<usize>().ok())
        .max()
        .unwrap_or(0);

    let mut lines = vec![String::new(); max];
    for item in items {
        if let Ok(n) = item.key.parse::<usize>() {
            if n >= 1 {
                lines[n - 1] = item.value.clone();
            }
        }
    }

    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_keyed_by_number() {
        let items = parse("first\n\nthird\n");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].key, "1");
        assert_eq!(items[2].key, "3");
        assert_eq!(items[2].value, "third");
    }

    #[test]
    fn round_trip_reproduces_the_document() {
        let doc = "start.sh -port 7777\n\nexec cleanup\n";
        assert_eq!(render(&parse(doc)), doc);
    }

    #[test]
    fn render_fills_gaps_with_blank_lines() {
        let items = vec![
            ConfigItem::new("", "", "1", "first"),
            ConfigItem::new("", "", "4", "fourth"),
        ];
        assert_eq!(render(&items), "first\n\n\nfourth\n");
    }

    #[test]
    fn merge_overwrites_a_single_line() {
        let existing = parse("a\nb\nc\n");
        let patch = vec![ConfigItem::new("", "", "2", "B")];
        let merged = crate::configset::item::merge(&existing, &patch, false);
        assert_eq!(render(&merged), "a\nB\nc\n");
    }
}
