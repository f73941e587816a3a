//! Entry points used by report, proposal and project tooling.

use std::path::Path;

use thiserror::Error;

use crate::config::{ConfigError, EngineConfig};
use crate::document::{
    DocumentFormat, DocumentScanner, ParseWarning, ScanError, ScanReport, TemplateValidator,
    ValidationIssue,
};
use crate::io::{FileAccess, FileAccessError, FsFileAccess};
use crate::matching::{MatchError, SimilarityEngine, TemplateMatch, TemplateMatcher};
use crate::store::{
    MemoryBackend, StorageBackend, StoreError, Template, TemplateMetadata, TemplateStore,
    WriteStatus,
};
use crate::types::cancel::CancelFlag;
use crate::types::identifiers::TemplateId;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Could not read document: {0}")]
    File(#[from] FileAccessError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Outcome of `scan_and_store_template`.
#[derive(Debug, Clone)]
pub struct StoredTemplate {
    pub template: Template,
    pub status: WriteStatus,
    pub warnings: Vec<ParseWarning>,
    pub issues: Vec<ValidationIssue>,
}

pub struct TemplateService<B: StorageBackend = MemoryBackend, F: FileAccess = FsFileAccess> {
    config: EngineConfig,
    scanner: DocumentScanner,
    matcher: TemplateMatcher<SimilarityEngine>,
    validator: TemplateValidator,
    store: TemplateStore<B>,
    files: F,
}

impl TemplateService<MemoryBackend, FsFileAccess> {
    pub fn in_memory(config: EngineConfig) -> Result<Self, ServiceError> {
        Self::new(config, TemplateStore::in_memory(), FsFileAccess)
    }
}

impl<B: StorageBackend, F: FileAccess> TemplateService<B, F> {
    pub fn new(config: EngineConfig, store: TemplateStore<B>, files: F) -> Result<Self, ServiceError> {
        config.validate()?;
        let engine = SimilarityEngine::new(config.weights).map_err(ConfigError::from)?;
        Ok(Self {
            scanner: DocumentScanner::new(config.delimiters.clone(), config.plain_heading_max_chars),
            matcher: TemplateMatcher::new(engine),
            validator: TemplateValidator::default(),
            store: store.with_max_write_retries(config.max_write_retries),
            files,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &TemplateStore<B> {
        &self.store
    }

    pub fn scanner(&self) -> &DocumentScanner {
        &self.scanner
    }

    pub fn matcher(&self) -> &TemplateMatcher<SimilarityEngine> {
        &self.matcher
    }

    /// Read a file and scan it with the format implied by its extension.
    pub fn scan_file(&self, path: &Path, cancel: Option<&CancelFlag>) -> Result<ScanReport, ServiceError> {
        let loaded = self.files.read(path)?;
        let format = DocumentFormat::from_extension(&loaded.format_hint)
            .ok_or_else(|| ScanError::UnsupportedFormat(loaded.format_hint.clone()))?;
        Ok(self.scanner.scan_format(&loaded.content, format, cancel)?)
    }

    /// Scan a reference document and persist it as a template version.
    ///
    /// Storing byte-identical content again returns the existing version
    /// with `WriteStatus::Duplicate`.
    pub fn scan_and_store_template(
        &self,
        file_path: &Path,
        name: &str,
        category: &str,
    ) -> Result<StoredTemplate, ServiceError> {
        let report = self.scan_file(file_path, None)?;
        for warning in &report.warnings {
            tracing::warn!(path = %file_path.display(), %warning, "placeholder parse warning");
        }

        let issues = self.validator.validate(&report.model, category);
        let metadata = TemplateMetadata::new(Some(file_path.display().to_string())).with_tags(report.tags);
        let outcome = self.store.create(name, category, report.model, metadata)?;

        Ok(StoredTemplate {
            template: outcome.template,
            status: outcome.status,
            warnings: report.warnings,
            issues,
        })
    }

    /// Rank stored templates by similarity to the document at `file_path`,
    /// returning at most `default_top_k` matches.
    pub fn find_similar_templates(
        &self,
        file_path: &Path,
        category: Option<&str>,
    ) -> Result<Vec<TemplateMatch>, ServiceError> {
        self.find_similar_templates_with_cancel(file_path, category, self.config.default_top_k, None)
    }

    pub fn find_similar_templates_with_cancel(
        &self,
        file_path: &Path,
        category: Option<&str>,
        top_k: usize,
        cancel: Option<&CancelFlag>,
    ) -> Result<Vec<TemplateMatch>, ServiceError> {
        let report = self.scan_file(file_path, cancel)?;
        let matches = self
            .matcher
            .find_similar_with_cancel(&self.store, &report.model, category, top_k, cancel)?;
        Ok(matches)
    }

    pub fn get_template(&self, template_id: &str, version: Option<u32>) -> Result<Template, ServiceError> {
        let id = TemplateId::parse(template_id).map_err(StoreError::from)?;
        Ok(self.store.get(&id, version)?)
    }
}
