use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use thiserror::Error;

use super::backend::{BackendError, MemoryBackend, StorageBackend};
use super::template::{StoreOutcome, Template, TemplateMetadata, WriteStatus};
use crate::document::StructuralModel;
use crate::types::identifiers::{ContentHash, TemplateId, TemplateIdError};

pub const DEFAULT_MAX_WRITE_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Template family not found: {0}")]
    FamilyNotFound(TemplateId),
    #[error("Template family {0} has no active version")]
    FamilyDeleted(TemplateId),
    #[error("Version {version} of template {template_id} not found")]
    VersionNotFound { template_id: TemplateId, version: u32 },
    #[error("Concurrent write on {template_id}: expected latest version {expected}, found {found}")]
    ConcurrentWriteConflict {
        template_id: TemplateId,
        expected: u32,
        found: u32,
    },
    #[error("Invalid template identity: {0}")]
    InvalidIdentity(#[from] TemplateIdError),
    #[error("Storage backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Store integrity error: {0}")]
    Integrity(String),
    #[error("Template store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::FamilyNotFound(_)
                | StoreError::FamilyDeleted(_)
                | StoreError::VersionNotFound { .. }
        )
    }

    /// Re-read the latest version and reapply.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConcurrentWriteConflict { .. })
    }
}

#[derive(Debug, Clone)]
struct Family {
    name: String,
    category: String,
    /// Highest version ever written, active or not.
    latest_version: u32,
}

/// Arena of immutable versions keyed by `(template_id, version)`.
#[derive(Debug, Default)]
struct StoreState {
    families: BTreeMap<TemplateId, Family>,
    records: BTreeMap<(TemplateId, u32), Template>,
}

impl StoreState {
    fn versions<'a>(&'a self, id: &TemplateId) -> impl DoubleEndedIterator<Item = &'a Template> + 'a {
        self.records
            .range((id.clone(), 0)..=(id.clone(), u32::MAX))
            .map(|(_, t)| t)
    }

    fn latest_active(&self, id: &TemplateId) -> Option<&Template> {
        self.versions(id).rev().find(|t| t.active)
    }

    fn active_with_hash(&self, id: &TemplateId, hash: &ContentHash) -> Option<&Template> {
        self.versions(id).rev().find(|t| t.active && &t.content_hash == hash)
    }

    fn insert(&mut self, template: Template) {
        let family = self
            .families
            .entry(template.template_id.clone())
            .or_insert_with(|| Family {
                name: template.name.clone(),
                category: template.category.clone(),
                latest_version: 0,
            });
        family.latest_version = family.latest_version.max(template.version);
        self.records
            .insert((template.template_id.clone(), template.version), template);
    }
}

enum MetadataSource {
    Provided(TemplateMetadata),
    /// Carry `source_document_ref` and tags forward from the latest version.
    Inherit,
}

/// Versioned, content-deduplicated template store.
///
/// Reads share a read lock. Writes to one family are serialized by that
/// family's lock: the version a write builds on is checked against the
/// family's latest (compare-and-increment), persisted, and only then
/// published to the arena under a brief write lock. Backend I/O never runs
/// under the store-wide lock.
pub struct TemplateStore<B: StorageBackend = MemoryBackend> {
    backend: B,
    state: RwLock<StoreState>,
    family_locks: Mutex<BTreeMap<TemplateId, Arc<Mutex<()>>>>,
    max_write_retries: u32,
}

impl TemplateStore<MemoryBackend> {
    pub fn in_memory() -> Self {
        Self {
            backend: MemoryBackend::new(),
            state: RwLock::new(StoreState::default()),
            family_locks: Mutex::new(BTreeMap::new()),
            max_write_retries: DEFAULT_MAX_WRITE_RETRIES,
        }
    }
}

impl<B: StorageBackend> TemplateStore<B> {
    /// Open a store over a backend, loading and checking every record.
    pub fn open(backend: B) -> Result<Self, StoreError> {
        let records = backend.load_all()?;
        let mut state = StoreState::default();
        for record in records {
            let expected_id = TemplateId::for_family(&record.name, &record.category)?;
            if record.version == 0 {
                return Err(StoreError::Integrity(format!(
                    "record {} has version 0",
                    record.template_id
                )));
            }
            if expected_id != record.template_id {
                return Err(StoreError::Integrity(format!(
                    "record {} v{} does not belong to family ({}, {})",
                    record.template_id, record.version, record.name, record.category
                )));
            }
            state.insert(record);
        }

        for (id, family) in &state.families {
            let count = state.versions(id).count();
            if count != family.latest_version as usize {
                return Err(StoreError::Integrity(format!(
                    "family {id} has {count} records but latest version {}",
                    family.latest_version
                )));
            }
        }

        tracing::info!(
            families = state.families.len(),
            records = state.records.len(),
            "template store opened"
        );

        Ok(Self {
            backend,
            state: RwLock::new(state),
            family_locks: Mutex::new(BTreeMap::new()),
            max_write_retries: DEFAULT_MAX_WRITE_RETRIES,
        })
    }

    pub fn with_max_write_retries(mut self, retries: u32) -> Self {
        self.max_write_retries = retries;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn family_lock(&self, template_id: &TemplateId) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self.family_locks.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Arc::clone(locks.entry(template_id.clone()).or_default()))
    }

    /// Store a model as a template version.
    ///
    /// A new family starts at version 1. When an active version of the family
    /// already has the same content hash, that version is returned with
    /// `WriteStatus::Duplicate` and nothing is written. Otherwise a new
    /// version is appended.
    pub fn create(
        &self,
        name: &str,
        category: &str,
        structural_model: StructuralModel,
        metadata: TemplateMetadata,
    ) -> Result<StoreOutcome, StoreError> {
        let template_id = TemplateId::for_family(name, category)?;
        let content_hash = structural_model.content_hash();

        let mut attempt = 0;
        loop {
            let observed = {
                let state = self.read()?;
                if let Some(existing) = state.active_with_hash(&template_id, &content_hash) {
                    tracing::info!(
                        template_id = %template_id,
                        version = existing.version,
                        content_hash = existing.content_hash.short(),
                        "identical template content already stored"
                    );
                    return Ok(StoreOutcome {
                        template: existing.clone(),
                        status: WriteStatus::Duplicate,
                    });
                }
                state.families.get(&template_id).map_or(0, |f| f.latest_version)
            };

            let result = self.commit(
                &template_id,
                Some((name.trim(), category.trim())),
                observed,
                &structural_model,
                &content_hash,
                MetadataSource::Provided(metadata.clone()),
            );
            match result {
                Ok(template) => {
                    return Ok(StoreOutcome {
                        template,
                        status: WriteStatus::Created,
                    })
                }
                Err(err) if err.is_retryable() && attempt < self.max_write_retries => {
                    attempt += 1;
                    tracing::warn!(template_id = %template_id, attempt, "create lost a version race, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Append a new version to an existing family, retrying against the
    /// freshly observed latest version when another writer wins the race.
    pub fn update(
        &self,
        template_id: &TemplateId,
        structural_model: StructuralModel,
    ) -> Result<Template, StoreError> {
        let mut attempt = 0;
        loop {
            let observed = {
                let state = self.read()?;
                state
                    .families
                    .get(template_id)
                    .map(|f| f.latest_version)
                    .ok_or_else(|| StoreError::FamilyNotFound(template_id.clone()))?
            };
            match self.update_expecting(template_id, observed, structural_model.clone()) {
                Err(err) if err.is_retryable() && attempt < self.max_write_retries => {
                    attempt += 1;
                    tracing::warn!(template_id = %template_id, attempt, "update lost a version race, retrying");
                }
                other => return other,
            }
        }
    }

    /// Append version `expected_version + 1`, failing with
    /// `ConcurrentWriteConflict` if the family's latest version has moved.
    pub fn update_expecting(
        &self,
        template_id: &TemplateId,
        expected_version: u32,
        structural_model: StructuralModel,
    ) -> Result<Template, StoreError> {
        let content_hash = structural_model.content_hash();
        self.commit(
            template_id,
            None,
            expected_version,
            &structural_model,
            &content_hash,
            MetadataSource::Inherit,
        )
    }

    /// The single point where versions are appended.
    fn commit(
        &self,
        template_id: &TemplateId,
        identity: Option<(&str, &str)>,
        expected_version: u32,
        structural_model: &StructuralModel,
        content_hash: &ContentHash,
        metadata: MetadataSource,
    ) -> Result<Template, StoreError> {
        let lock = self.family_lock(template_id)?;
        let _family = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let template = {
            let state = self.read()?;

            let (name, category, found) = match (state.families.get(template_id), identity) {
                (Some(family), _) => (family.name.clone(), family.category.clone(), family.latest_version),
                (None, Some((name, category))) => (name.to_string(), category.to_string(), 0),
                (None, None) => return Err(StoreError::FamilyNotFound(template_id.clone())),
            };

            if found != expected_version {
                return Err(StoreError::ConcurrentWriteConflict {
                    template_id: template_id.clone(),
                    expected: expected_version,
                    found,
                });
            }

            let metadata = match metadata {
                MetadataSource::Provided(metadata) => metadata,
                MetadataSource::Inherit => {
                    let previous = state.versions(template_id).next_back();
                    TemplateMetadata {
                        created_at: Utc::now(),
                        source_document_ref: previous.and_then(|t| t.metadata.source_document_ref.clone()),
                        tags: previous.map(|t| t.metadata.tags.clone()).unwrap_or_default(),
                    }
                }
            };

            Template {
                template_id: template_id.clone(),
                name,
                category,
                version: expected_version + 1,
                content_hash: content_hash.clone(),
                structural_model: structural_model.clone(),
                metadata,
                active: true,
            }
        };

        // Persist first; the arena only sees fully written versions. The
        // family lock keeps the observed version current until publication.
        self.backend.put(&template)?;
        self.write()?.insert(template.clone());

        tracing::info!(
            template_id = %template.template_id,
            version = template.version,
            content_hash = template.content_hash.short(),
            "template version stored"
        );

        Ok(template)
    }

    /// Fetch a specific version, or the latest active version when `version`
    /// is `None`. Explicit versions are returned even when soft-deleted.
    pub fn get(&self, template_id: &TemplateId, version: Option<u32>) -> Result<Template, StoreError> {
        let state = self.read()?;
        if !state.families.contains_key(template_id) {
            return Err(StoreError::FamilyNotFound(template_id.clone()));
        }

        match version {
            Some(version) => state
                .records
                .get(&(template_id.clone(), version))
                .cloned()
                .ok_or_else(|| StoreError::VersionNotFound {
                    template_id: template_id.clone(),
                    version,
                }),
            None => state
                .latest_active(template_id)
                .cloned()
                .ok_or_else(|| StoreError::FamilyDeleted(template_id.clone())),
        }
    }

    /// Latest active version of every family, ordered by (category, name).
    pub fn list(&self, category: Option<&str>) -> Result<Vec<Template>, StoreError> {
        let state = self.read()?;
        let mut latest: Vec<Template> = state
            .families
            .iter()
            .filter(|(_, family)| category.map_or(true, |c| family.category == c.trim()))
            .filter_map(|(id, _)| state.latest_active(id).cloned())
            .collect();

        latest.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(latest)
    }

    /// Every version of a family, oldest first, including inactive ones.
    pub fn history(&self, template_id: &TemplateId) -> Result<Vec<Template>, StoreError> {
        let state = self.read()?;
        if !state.families.contains_key(template_id) {
            return Err(StoreError::FamilyNotFound(template_id.clone()));
        }
        Ok(state.versions(template_id).cloned().collect())
    }

    /// Soft-delete: mark every version of the family inactive.
    ///
    /// All-or-nothing: if a backend write fails, versions already flipped are
    /// written back as active and the arena is left unchanged. A version that
    /// cannot be restored stays inactive in both places.
    pub fn delete(&self, template_id: &TemplateId) -> Result<(), StoreError> {
        let lock = self.family_lock(template_id)?;
        let _family = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let deactivated: Vec<Template> = {
            let state = self.read()?;
            if !state.families.contains_key(template_id) {
                return Err(StoreError::FamilyNotFound(template_id.clone()));
            }
            state
                .versions(template_id)
                .filter(|t| t.active)
                .map(|t| Template {
                    active: false,
                    ..t.clone()
                })
                .collect()
        };

        for (written, template) in deactivated.iter().enumerate() {
            if let Err(err) = self.backend.put(template) {
                let stuck = self.restore_active(&deactivated[..written]);
                tracing::warn!(
                    template_id = %template_id,
                    version = template.version,
                    unrestored = stuck.len(),
                    "soft delete failed, rolled back"
                );
                let mut state = self.write()?;
                for template in stuck {
                    state.insert(template);
                }
                return Err(err.into());
            }
        }

        let count = deactivated.len();
        let mut state = self.write()?;
        for template in deactivated {
            state.insert(template);
        }

        tracing::info!(template_id = %template_id, versions = count, "template family deactivated");
        Ok(())
    }

    /// Write `flipped` back as active; returns the versions that could not be
    /// restored and therefore remain inactive on the backend.
    fn restore_active(&self, flipped: &[Template]) -> Vec<Template> {
        flipped
            .iter()
            .filter(|template| {
                let restored = Template {
                    active: true,
                    ..(*template).clone()
                };
                self.backend.put(&restored).is_err()
            })
            .cloned()
            .collect()
    }
}
