use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use super::template::Template;
use crate::types::identifiers::TemplateId;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt record {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("Backend lock poisoned")]
    LockPoisoned,
}

/// Key/document store addressed by `(template_id, version)`.
///
/// `put` overwrites the record at its key; the store only ever rewrites an
/// existing key to flip the `active` flag.
pub trait StorageBackend: Send + Sync {
    fn load_all(&self) -> Result<Vec<Template>, BackendError>;

    fn put(&self, template: &Template) -> Result<(), BackendError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<(TemplateId, u32), Template>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn load_all(&self) -> Result<Vec<Template>, BackendError> {
        let records = self.records.lock().map_err(|_| BackendError::LockPoisoned)?;
        Ok(records.values().cloned().collect())
    }

    fn put(&self, template: &Template) -> Result<(), BackendError> {
        let mut records = self.records.lock().map_err(|_| BackendError::LockPoisoned)?;
        records.insert(
            (template.template_id.clone(), template.version),
            template.clone(),
        );
        Ok(())
    }
}

/// One JSON file per version: `<root>/<template_id>/v<version>.json`.
///
/// Each write goes to a temp file that is synced and then renamed over the
/// final name, so readers never observe a half-written record.
#[derive(Debug, Clone)]
pub struct JsonDirBackend {
    root: PathBuf,
}

impl JsonDirBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, template_id: &TemplateId, version: u32) -> PathBuf {
        self.root
            .join(template_id.as_str())
            .join(format!("v{version}.json"))
    }

    fn load_record(path: &Path, dir_id: &TemplateId, version: u32) -> Result<Template, BackendError> {
        let corrupt = |reason: String| BackendError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let f = fs::File::open(path)?;
        let template: Template = serde_json::from_reader(f)?;

        if &template.template_id != dir_id {
            return Err(corrupt(format!(
                "record id {} does not match directory {}",
                template.template_id, dir_id
            )));
        }
        if template.version != version {
            return Err(corrupt(format!(
                "record version {} does not match file name v{}",
                template.version, version
            )));
        }

        // Recompute from the stored model
        let expected = template.structural_model.content_hash();
        if expected != template.content_hash {
            return Err(corrupt(format!(
                "content hash mismatch: record says {}, model hashes to {}",
                template.content_hash, expected
            )));
        }

        Ok(template)
    }
}

fn parse_version_file(name: &str) -> Option<u32> {
    name.strip_prefix('v')?.strip_suffix(".json")?.parse().ok()
}

impl StorageBackend for JsonDirBackend {
    fn load_all(&self) -> Result<Vec<Template>, BackendError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut loaded = Vec::new();
        for family_dir in fs::read_dir(&self.root)? {
            let family_dir = family_dir?;
            if !family_dir.file_type()?.is_dir() {
                continue;
            }
            let Some(dir_name) = family_dir.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(dir_id) = TemplateId::parse(&dir_name) else {
                continue;
            };

            for entry in fs::read_dir(family_dir.path())? {
                let entry = entry?;
                let file_name = entry.file_name();
                // Stale temp files from an interrupted write are skipped.
                let Some(version) = file_name.to_str().and_then(parse_version_file) else {
                    continue;
                };
                loaded.push(Self::load_record(&entry.path(), &dir_id, version)?);
            }
        }

        loaded.sort_by(|a, b| {
            a.template_id
                .cmp(&b.template_id)
                .then(a.version.cmp(&b.version))
        });
        Ok(loaded)
    }

    fn put(&self, template: &Template) -> Result<(), BackendError> {
        let final_path = self.record_path(&template.template_id, template.version);
        let dir = final_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir)?;

        let temp_path = final_path.with_extension("json.tmp");
        let f = fs::File::create(&temp_path)?;
        serde_json::to_writer_pretty(&f, template)?;
        f.sync_all()?;

        fs::rename(&temp_path, &final_path)?;
        Ok(())
    }
}
