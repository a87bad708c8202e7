//! Content objects handed to the scanner.
//!
//! - `Object`: one extracted artifact (a blob at a revision, or a commit message)
//! - `Origin`: which kind of artifact it is
//! - `Metadata`: ordered provenance entries; a value may be flagged as primary key

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    FileContent,
    CommitMessage,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::FileContent => "file-content",
            Origin::CommitMessage => "commit-message",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAttributes {
    /// Marks the value as the identity of the underlying content. Advisory only:
    /// nothing in this crate deduplicates on it.
    pub primary_key: bool,
}

impl MetadataAttributes {
    pub fn primary_key() -> Self {
        Self { primary_key: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
    #[serde(flatten)]
    pub attributes: MetadataAttributes,
}

/// Insertion-ordered metadata. Setting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Vec<MetadataEntry>);

impl Metadata {
    pub fn set(&mut self, key: &str, value: impl Into<String>, attributes: MetadataAttributes) {
        let value = value.into();
        match self.0.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.value = value;
                entry.attributes = attributes;
            }
            None => self.0.push(MetadataEntry {
                key: key.to_string(),
                value,
                attributes,
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetadataEntry> {
        self.0.iter().find(|e| e.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetadataEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// Path of the file at that revision, or `commit-<hash>` for messages
    pub id: String,
    pub origin: Origin,
    pub content: Vec<u8>,
    pub metadata: Metadata,
}

impl Object {
    pub fn new(id: impl Into<String>, origin: Origin, content: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            origin,
            content,
            metadata: Metadata::default(),
        }
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>, attributes: MetadataAttributes) {
        self.metadata.set(key, value, attributes);
    }

    /// Shorthand for reading a metadata value by key.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|e| e.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_keeps_insertion_order() {
        let mut obj = Object::new("a.txt", Origin::FileContent, b"x".to_vec());
        obj.set_metadata("commit", "abc", MetadataAttributes::default());
        obj.set_metadata("uniq-id", "def", MetadataAttributes::primary_key());

        let keys: Vec<&str> = obj.metadata.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["commit", "uniq-id"]);
        assert!(obj.metadata.get("uniq-id").unwrap().attributes.primary_key);
        assert!(!obj.metadata.get("commit").unwrap().attributes.primary_key);
    }

    #[test]
    fn test_metadata_set_replaces_in_place() {
        let mut meta = Metadata::default();
        meta.set("a", "1", MetadataAttributes::default());
        meta.set("b", "2", MetadataAttributes::default());
        meta.set("a", "3", MetadataAttributes::primary_key());

        assert_eq!(meta.len(), 2);
        let first = meta.iter().next().unwrap();
        assert_eq!(first.key, "a");
        assert_eq!(first.value, "3");
        assert!(first.attributes.primary_key);
    }

    #[test]
    fn test_metadata_serializes_as_ordered_list() {
        let mut meta = Metadata::default();
        meta.set("commit", "abc", MetadataAttributes::default());
        meta.set("uniq-id", "def", MetadataAttributes::primary_key());

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"key": "commit", "value": "abc", "primary_key": false},
                {"key": "uniq-id", "value": "def", "primary_key": true},
            ])
        );
    }

    #[test]
    fn test_origin_tags() {
        assert_eq!(Origin::FileContent.as_str(), "file-content");
        assert_eq!(Origin::CommitMessage.to_string(), "commit-message");
        assert_eq!(
            serde_json::to_value(Origin::CommitMessage).unwrap(),
            serde_json::json!("commit-message")
        );
    }
}
