use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{DocumentTags, StructuralModel};
use crate::types::identifiers::{ContentHash, TemplateId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub created_at: DateTime<Utc>, // informational only
    pub source_document_ref: Option<String>,
    #[serde(default, skip_serializing_if = "DocumentTags::is_empty")]
    pub tags: DocumentTags,
}

impl TemplateMetadata {
    pub fn new(source_document_ref: Option<String>) -> Self {
        Self {
            created_at: Utc::now(),
            source_document_ref,
            tags: DocumentTags::new(),
        }
    }

    pub fn with_tags(mut self, tags: DocumentTags) -> Self {
        self.tags = tags;
        self
    }
}

/// One immutable version of a template family.
///
/// Records are only produced by `TemplateStore` writes. The single field that
/// ever changes after the fact is `active`, cleared by a soft delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub template_id: TemplateId,
    pub name: String,
    pub category: String,
    pub version: u32,
    pub content_hash: ContentHash,
    pub structural_model: StructuralModel,
    pub metadata: TemplateMetadata,
    pub active: bool,
}

/// Whether a store write appended a version or found identical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Created,
    /// An active version with the same content hash already existed and was
    /// returned unchanged.
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct StoreOutcome {
    pub template: Template,
    pub status: WriteStatus,
}

impl StoreOutcome {
    pub fn is_duplicate(&self) -> bool {
        self.status == WriteStatus::Duplicate
    }
}
