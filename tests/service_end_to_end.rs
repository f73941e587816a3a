use std::fs;
use std::path::Path;

use template_core::config::EngineConfig;
use template_core::document::{ScanError, ValidationIssue};
use template_core::io::{FileAccess, FileAccessError, LoadedDocument};
use template_core::matching::MatchError;
use template_core::store::{JsonDirBackend, StoreError, TemplateStore, WriteStatus};
use template_core::types::{CancelFlag, TemplateIdError};
use template_core::{ServiceError, TemplateService};
use tempfile::tempdir;

const PROGRESS_REPORT: &str = "@author: Field Team\n\n# Objectives\nDeliver {project_name} on time.\n\n# Budget\nFunding for {project_name} is fixed.\n";

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn golden_scan_store_and_fetch() {
    let dir = tempdir().unwrap();
    let service = TemplateService::in_memory(EngineConfig::v0()).unwrap();
    let path = write(dir.path(), "progress.md", PROGRESS_REPORT);

    let stored = service
        .scan_and_store_template(&path, "progress_report", "reports")
        .unwrap();
    assert_eq!(stored.status, WriteStatus::Created);
    assert_eq!(stored.template.version, 1);
    assert_eq!(stored.template.structural_model.section_count(), 3);
    assert_eq!(
        stored.template.metadata.source_document_ref.as_deref(),
        Some(path.display().to_string().as_str())
    );
    assert_eq!(stored.template.metadata.tags.get("author"), Some("Field Team"));
    assert!(stored.warnings.is_empty());
    assert!(stored
        .issues
        .contains(&ValidationIssue::MissingPlaceholder { name: "progress".into() }));

    let again = service
        .scan_and_store_template(&path, "progress_report", "reports")
        .unwrap();
    assert_eq!(again.status, WriteStatus::Duplicate);
    assert_eq!(again.template.version, 1);

    let fetched = service
        .get_template(stored.template.template_id.as_str(), None)
        .unwrap();
    assert_eq!(fetched, stored.template);
    let pinned = service
        .get_template(stored.template.template_id.as_str(), Some(1))
        .unwrap();
    assert_eq!(pinned, stored.template);
}

#[test]
fn golden_find_similar_templates() {
    let dir = tempdir().unwrap();
    let service = TemplateService::in_memory(EngineConfig::v0()).unwrap();

    let full = write(
        dir.path(),
        "full.md",
        "# Objectives\n{project_name}\n# Budget\n{amount}\n# Timeline\n{start_date}",
    );
    let short = write(dir.path(), "short.txt", "Summary\n\nNotes for {client}.\n");
    service.scan_and_store_template(&full, "full_plan", "proposals").unwrap();
    service.scan_and_store_template(&short, "short_note", "reports").unwrap();

    let candidate = write(
        dir.path(),
        "candidate.md",
        "# Objectives\n{project_name}\n# Timeline\n{start_date}",
    );
    let matches = service.find_similar_templates(&candidate, None).unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].template.name, "full_plan");
    assert!(matches[0].score() > matches[1].score());

    let filtered = service
        .find_similar_templates(&candidate, Some("reports"))
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].template.name, "short_note");

    match service.find_similar_templates(&candidate, Some("research")) {
        Err(ServiceError::Match(MatchError::NoTemplatesAvailable { .. })) => {}
        other => panic!("expected empty pool error, got {other:?}"),
    }
}

#[test]
fn invariant_default_top_k_bounds_results() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::from_json_str(r#"{ "default_top_k": 2 }"#).unwrap();
    let service = TemplateService::in_memory(config).unwrap();

    for i in 0..4 {
        let path = write(dir.path(), &format!("t{i}.md"), &format!("# Part {i}\nbody {i}"));
        service
            .scan_and_store_template(&path, &format!("template_{i}"), "reports")
            .unwrap();
    }
    let candidate = write(dir.path(), "c.md", "# Part\nbody");
    assert_eq!(service.find_similar_templates(&candidate, None).unwrap().len(), 2);
}

#[test]
fn invariant_service_errors_surface_by_kind() {
    let dir = tempdir().unwrap();
    let service = TemplateService::in_memory(EngineConfig::v0()).unwrap();

    let docx = write(dir.path(), "letter.docx", "binary-ish");
    assert!(matches!(
        service.scan_and_store_template(&docx, "letter", "letters"),
        Err(ServiceError::Scan(ScanError::UnsupportedFormat(ext))) if ext == "docx"
    ));

    let empty = write(dir.path(), "empty.md", "  \n\n");
    assert!(matches!(
        service.scan_and_store_template(&empty, "empty", "reports"),
        Err(ServiceError::Scan(ScanError::EmptyDocument))
    ));

    assert!(matches!(
        service.scan_and_store_template(&dir.path().join("missing.md"), "missing", "reports"),
        Err(ServiceError::File(FileAccessError::Io(_)))
    ));

    assert!(matches!(
        service.get_template("not-an-id", None),
        Err(ServiceError::Store(StoreError::InvalidIdentity(TemplateIdError::Malformed(_))))
    ));
    match service.get_template("tpl_0123456789abcdef", None) {
        Err(ServiceError::Store(err)) => assert!(err.is_not_found()),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn invariant_invalid_config_is_refused() {
    let mut config = EngineConfig::v0();
    config.default_top_k = 0;
    assert!(matches!(
        TemplateService::in_memory(config),
        Err(ServiceError::Config(_))
    ));
}

#[test]
fn invariant_cancelled_search_returns_nothing() {
    let dir = tempdir().unwrap();
    let service = TemplateService::in_memory(EngineConfig::v0()).unwrap();
    let path = write(dir.path(), "progress.md", PROGRESS_REPORT);
    service
        .scan_and_store_template(&path, "progress_report", "reports")
        .unwrap();

    let cancel = CancelFlag::new();
    cancel.cancel();
    let result = service.find_similar_templates_with_cancel(&path, None, 5, Some(&cancel));
    assert!(matches!(result, Err(ServiceError::Scan(ScanError::Cancelled))));
}

/// Serves documents from memory instead of the filesystem.
struct FixedFiles;

impl FileAccess for FixedFiles {
    fn read(&self, path: &Path) -> Result<LoadedDocument, FileAccessError> {
        Ok(LoadedDocument {
            content: format!("<h1>{}</h1><p>Dear {{client}}</p>", path.display()),
            format_hint: "html".into(),
        })
    }
}

#[test]
fn invariant_persistent_service_with_custom_file_access() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("store");

    let id = {
        let store = TemplateStore::open(JsonDirBackend::new(&root)).unwrap();
        let service = TemplateService::new(EngineConfig::v0(), store, FixedFiles).unwrap();
        let stored = service
            .scan_and_store_template(Path::new("Welcome Letter"), "welcome", "letters")
            .unwrap();
        assert_eq!(stored.template.structural_model.sections()[0].heading, "Welcome Letter");
        stored.template.template_id
    };

    let store = TemplateStore::open(JsonDirBackend::new(&root)).unwrap();
    let service = TemplateService::new(EngineConfig::v0(), store, FixedFiles).unwrap();
    let fetched = service.get_template(id.as_str(), None).unwrap();
    assert_eq!(fetched.name, "welcome");
    let names: Vec<&str> = fetched.structural_model.placeholder_names().collect();
    assert_eq!(names, ["client"]);
}
