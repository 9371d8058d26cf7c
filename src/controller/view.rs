//! Render model of the style list.

use super::styles::StyleRegistry;

/// Text shown when no styles are loaded.
pub const EMPTY_STYLE_LIST: &str = "No styles loaded.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRow {
    pub name: String,
    pub meta: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleListView {
    Empty,
    Rows(Vec<StyleRow>),
}

impl StyleListView {
    pub fn from_registry(registry: &StyleRegistry) -> Self {
        if registry.is_empty() {
            return StyleListView::Empty;
        }
        let rows = registry
            .iter()
            .map(|entry| {
                let mut parts = Vec::with_capacity(2);
                if !entry.size_label.is_empty() {
                    parts.push(entry.size_label.clone());
                }
                if entry.storage_name != entry.original_name {
                    parts.push(format!("saved as {}", entry.storage_name));
                }
                StyleRow {
                    name: entry.original_name.clone(),
                    meta: parts.join(" · "),
                }
            })
            .collect();
        StyleListView::Rows(rows)
    }

    /// Number of entries, shown next to the list.
    pub fn count(&self) -> usize {
        match self {
            StyleListView::Empty => 0,
            StyleListView::Rows(rows) => rows.len(),
        }
    }

    pub fn rows(&self) -> &[StyleRow] {
        match self {
            StyleListView::Empty => &[],
            StyleListView::Rows(rows) => rows,
        }
    }

    /// Plain-text rendering, one row per line.
    pub fn render(&self) -> String {
        match self {
            StyleListView::Empty => EMPTY_STYLE_LIST.to_string(),
            StyleListView::Rows(rows) => rows
                .iter()
                .map(|row| format!("{}  {}", row.name, row.meta))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::styles::StyleUpload;

    #[test]
    fn test_empty_view() {
        let view = StyleListView::from_registry(&StyleRegistry::new());
        assert_eq!(view, StyleListView::Empty);
        assert_eq!(view.count(), 0);
        assert_eq!(view.render(), "No styles loaded.");
    }

    #[test]
    fn test_rows_show_size_and_storage_name() {
        let mut registry = StyleRegistry::new();
        registry.add_batch(vec![
            StyleUpload::new("plain.sty", "x".repeat(1536)),
            StyleUpload::new("dir/nested.sty", "y"),
        ]);

        let view = StyleListView::from_registry(&registry);
        assert_eq!(view.count(), 2);
        assert_eq!(
            view.rows(),
            &[
                StyleRow {
                    name: "plain.sty".to_string(),
                    meta: "1.5 KB".to_string(),
                },
                StyleRow {
                    name: "dir/nested.sty".to_string(),
                    meta: "0.0 KB · saved as dir_nested.sty".to_string(),
                },
            ]
        );
    }
}
