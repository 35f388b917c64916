use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Titles mapped to their lower-cased tags, in the order the model returned them.
pub type BookTagMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    pub author: String,
}

impl Book {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            author: author.into(),
        }
    }

    pub fn with_id(id: i64, title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            title: title.into(),
            author: author.into(),
        }
    }
}

/// Controlled vocabulary entry. Serialized as `{"id": .., "tag": ..}`, which is
/// the shape the vocabulary prompt shows the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    #[serde(rename = "tag", alias = "name")]
    pub name: String,
}
