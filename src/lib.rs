//! Deterministic template structure extraction and similarity matching.
//!
//! `template-core` scans reference documents into structural models
//! (sections, placeholders, formatting signals), stores them as immutable,
//! content-addressed template versions, and ranks stored templates by
//! similarity to a new document. Scanning and scoring are pure: identical
//! inputs always produce identical models, hashes and rankings.
//!
//! Rendering final documents from a template is left to callers.

pub mod config;
pub mod document;
pub mod io;
pub mod matching;
pub mod service;
pub mod store;
pub mod types;

pub use config::{ConfigError, EngineConfig};
pub use service::{ServiceError, StoredTemplate, TemplateService};
