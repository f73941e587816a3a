use std::fs;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileAccessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Content must be valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Raw document text plus the format hint inferred from its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub content: String,
    /// File extension, lowercased; empty when the path has none.
    pub format_hint: String,
}

/// Source of document text. Implementations do a bounded, synchronous read.
pub trait FileAccess: Send + Sync {
    fn read(&self, path: &Path) -> Result<LoadedDocument, FileAccessError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsFileAccess;

impl FileAccess for FsFileAccess {
    fn read(&self, path: &Path) -> Result<LoadedDocument, FileAccessError> {
        let bytes = fs::read(path)?;
        let content = String::from_utf8(bytes)?;
        let format_hint = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        Ok(LoadedDocument {
            content,
            format_hint,
        })
    }
}
