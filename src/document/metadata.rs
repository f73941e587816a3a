use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static TAG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*@([A-Za-z][\w-]*)\s*:\s*(\S.*?)\s*$").expect("static regex"));

/// `@key: value` tags found in a document. Keys are lowercased; when a key
/// repeats, the last occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentTags {
    inner: BTreeMap<String, String>,
}

impl DocumentTags {
    pub fn new() -> Self {
        DocumentTags {
            inner: BTreeMap::new(),
        }
    }

    pub fn extract(text: &str) -> Self {
        let mut tags = DocumentTags::new();
        for line in text.lines() {
            if let Some(caps) = TAG_LINE.captures(line) {
                tags.insert(&caps[1], &caps[2]);
            }
        }
        tags
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .insert(key.as_ref().to_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
