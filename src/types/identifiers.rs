use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Stable identifier of a template family.
///
/// Derived from `(name, category)` so the same family always resolves to the
/// same id, across processes and store instances.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

#[derive(Debug, Error)]
pub enum TemplateIdError {
    #[error("Template name must not be empty")]
    EmptyName,
    #[error("Template category must not be empty")]
    EmptyCategory,
    #[error("Malformed template id: {0}")]
    Malformed(String),
}

impl TemplateId {
    const PREFIX: &'static str = "tpl_";
    const HEX_LEN: usize = 16;

    /// Derive the family id from a template name and category.
    ///
    /// Both parts are trimmed first; the separator byte keeps
    /// `("ab", "c")` and `("a", "bc")` apart.
    pub fn for_family(name: &str, category: &str) -> Result<Self, TemplateIdError> {
        let name = name.trim();
        let category = category.trim();
        if name.is_empty() {
            return Err(TemplateIdError::EmptyName);
        }
        if category.is_empty() {
            return Err(TemplateIdError::EmptyCategory);
        }

        let mut hasher = Sha256::new();
        hasher.update(category.as_bytes());
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        let hex = hex::encode(hasher.finalize());

        Ok(TemplateId(format!("{}{}", Self::PREFIX, &hex[..Self::HEX_LEN])))
    }

    /// Parse an id received from a caller or read back from storage.
    pub fn parse(raw: &str) -> Result<Self, TemplateIdError> {
        let hex_part = raw
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| TemplateIdError::Malformed(raw.to_string()))?;
        let well_formed = hex_part.len() == Self::HEX_LEN
            && hex_part.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !well_formed {
            return Err(TemplateIdError::Malformed(raw.to_string()));
        }
        Ok(TemplateId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content hash of a canonicalized structural model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn from_canonical(canonical: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical);

        let hash = hasher.finalize();
        let hex = hex::encode(hash);

        ContentHash(format!("sha256:{hex}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, used in log lines.
    pub fn short(&self) -> &str {
        let hex = self.0.strip_prefix("sha256:").unwrap_or(&self.0);
        &hex[..hex.len().min(12)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
