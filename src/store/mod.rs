pub mod backend;
pub mod store;
pub mod template;

pub use backend::{BackendError, JsonDirBackend, MemoryBackend, StorageBackend};
pub use store::{StoreError, TemplateStore, DEFAULT_MAX_WRITE_RETRIES};
pub use template::{StoreOutcome, Template, TemplateMetadata, WriteStatus};
