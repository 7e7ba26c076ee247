//! Records held by the indexed store

use serde::{Deserialize, Serialize};

/// An application value with a stable primary key.
///
/// `text_fields` feeds substring search and `tags` feeds tag filtering.
pub trait Record: Clone + Send + Sync + 'static {
    fn key(&self) -> &str;

    fn text_fields(&self) -> Vec<&str>;

    fn tags(&self) -> &[String];

    /// Whether any text field contains `needle`, which must already be
    /// normalized with [`normalize_query`]
    fn matches_text(&self, needle: &str) -> bool {
        self.text_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }

    /// Case-insensitive tag membership; `tag` must already be normalized
    fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|t| t.to_lowercase() == tag)
    }
}

/// Trim and lowercase a query so equivalent queries share a cache key
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// A saved link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Bookmark {
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

impl Record for Bookmark {
    fn key(&self) -> &str {
        &self.id
    }

    fn text_fields(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.url.as_str()]
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Rust Book "), "rust book");
        assert_eq!(normalize_query("   "), "");
    }

    #[test]
    fn test_bookmark_matching() {
        let bookmark = Bookmark::new("1", "The Rust Book", "https://doc.rust-lang.org/book")
            .with_tags(["Rust", "docs"]);

        assert!(bookmark.matches_text("rust book"));
        assert!(bookmark.matches_text("doc.rust-lang"));
        assert!(!bookmark.matches_text("python"));
        assert!(bookmark.has_tag("rust"));
        assert!(!bookmark.has_tag("go"));
    }

    #[test]
    fn test_bookmark_json_without_tags() {
        let bookmark: Bookmark =
            serde_json::from_str(r#"{"id":"7","title":"Tokio","url":"https://tokio.rs"}"#)
                .unwrap();
        assert!(bookmark.tags.is_empty());
        assert_eq!(bookmark.key(), "7");
    }
}
