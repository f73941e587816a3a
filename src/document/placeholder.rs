use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{Placeholder, PlaceholderPosition, Section};

static TOKEN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// Delimiter pair enclosing a placeholder token name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelimiterGrammar {
    pub open: String,
    pub close: String,
}

impl Default for DelimiterGrammar {
    fn default() -> Self {
        Self {
            open: "{".into(),
            close: "}".into(),
        }
    }
}

impl DelimiterGrammar {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.open.is_empty()
            && !self.close.is_empty()
            && !self.open.contains('\n')
            && !self.close.contains('\n')
    }
}

/// Non-fatal problem found while extracting placeholders.
///
/// Offending text is left out of the placeholder set; extraction continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseWarning {
    #[error("unterminated placeholder delimiter in section {section} at byte {offset}")]
    Unterminated { section: usize, offset: usize },

    #[error("invalid placeholder name {token:?} in section {section} at byte {offset}")]
    InvalidName {
        section: usize,
        offset: usize,
        token: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Distinct tokens sorted by name; positions in document order.
    pub placeholders: Vec<Placeholder>,
    pub warnings: Vec<ParseWarning>,
}

pub struct PlaceholderExtractor {
    grammar: DelimiterGrammar,
}

impl Default for PlaceholderExtractor {
    fn default() -> Self {
        Self::new(DelimiterGrammar::default())
    }
}

impl PlaceholderExtractor {
    pub fn new(grammar: DelimiterGrammar) -> Self {
        Self { grammar }
    }

    /// Extract placeholders from every section body, in section order.
    pub fn extract(&self, sections: &[Section]) -> Extraction {
        let mut found: BTreeMap<String, Vec<PlaceholderPosition>> = BTreeMap::new();
        let mut warnings = Vec::new();

        for section in sections {
            self.scan_text(section.position, &section.body, &mut found, &mut warnings);
        }

        let placeholders = found
            .into_iter()
            .map(|(name, positions)| Placeholder { name, positions })
            .collect();

        Extraction {
            placeholders,
            warnings,
        }
    }

    /// Extract from a single piece of text, reported as section 0.
    pub fn extract_text(&self, text: &str) -> Extraction {
        let mut found = BTreeMap::new();
        let mut warnings = Vec::new();
        self.scan_text(0, text, &mut found, &mut warnings);
        Extraction {
            placeholders: found
                .into_iter()
                .map(|(name, positions)| Placeholder { name, positions })
                .collect(),
            warnings,
        }
    }

    fn scan_text(
        &self,
        section: usize,
        text: &str,
        found: &mut BTreeMap<String, Vec<PlaceholderPosition>>,
        warnings: &mut Vec<ParseWarning>,
    ) {
        // An empty delimiter matches everywhere; nothing can be a token.
        if !self.grammar.is_valid() {
            return;
        }
        let open = self.grammar.open.as_str();
        let close = self.grammar.close.as_str();
        let symmetric = open == close;

        let mut cursor = 0;
        while let Some(rel) = text[cursor..].find(open) {
            let start = cursor + rel;
            let inner_start = start + open.len();

            // A token never spans lines.
            let line_end = text[inner_start..]
                .find('\n')
                .map_or(text.len(), |p| inner_start + p);

            let Some(close_at) = text[inner_start..line_end].find(close).map(|p| inner_start + p)
            else {
                warnings.push(ParseWarning::Unterminated { section, offset: start });
                cursor = inner_start;
                continue;
            };

            if !symmetric {
                if let Some(nested) = text[inner_start..close_at].find(open) {
                    warnings.push(ParseWarning::Unterminated { section, offset: start });
                    cursor = inner_start + nested;
                    continue;
                }
            }

            let token = &text[inner_start..close_at];
            if TOKEN_NAME.is_match(token) {
                found
                    .entry(token.to_string())
                    .or_default()
                    .push(PlaceholderPosition { section, offset: start });
            } else {
                warnings.push(ParseWarning::InvalidName {
                    section,
                    offset: start,
                    token: token.to_string(),
                });
            }
            cursor = close_at + close.len();
        }
    }
}
