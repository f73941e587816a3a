use thiserror::Error;

use super::format::{DocumentFormat, SegmentOptions};
use super::metadata::DocumentTags;
use super::model::StructuralModel;
use super::placeholder::{DelimiterGrammar, ParseWarning, PlaceholderExtractor};
use super::profile::FormatPatternAnalyzer;
use crate::types::cancel::CancelFlag;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Unsupported document format: {0:?}")]
    UnsupportedFormat(String),
    #[error("Document has no content after normalization")]
    EmptyDocument,
    #[error("Scan cancelled")]
    Cancelled,
}

/// Result of a successful scan: the immutable model plus everything the
/// scan noticed that is not part of the model itself.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub format: DocumentFormat,
    pub model: StructuralModel,
    pub warnings: Vec<ParseWarning>,
    pub tags: DocumentTags,
}

/// Turns raw document text into a `StructuralModel`.
///
/// Stateless apart from its configuration, so one scanner can be shared
/// across threads.
pub struct DocumentScanner {
    extractor: PlaceholderExtractor,
    analyzer: FormatPatternAnalyzer,
    options: SegmentOptions,
}

impl Default for DocumentScanner {
    fn default() -> Self {
        Self::new(DelimiterGrammar::default(), 60)
    }
}

impl DocumentScanner {
    pub fn new(grammar: DelimiterGrammar, plain_heading_max_chars: usize) -> Self {
        Self {
            extractor: PlaceholderExtractor::new(grammar),
            analyzer: FormatPatternAnalyzer,
            options: SegmentOptions {
                plain_heading_max_chars,
            },
        }
    }

    /// Scan with a textual format hint (`markdown`, `plain`, `richtext`).
    pub fn scan(&self, content: &str, format_hint: &str) -> Result<ScanReport, ScanError> {
        let format = DocumentFormat::from_hint(format_hint)?;
        self.scan_format(content, format, None)
    }

    pub fn scan_format(
        &self,
        content: &str,
        format: DocumentFormat,
        cancel: Option<&CancelFlag>,
    ) -> Result<ScanReport, ScanError> {
        let normalized = normalize(content);
        let prepared = format.prepare(&normalized);
        if prepared.trim().is_empty() {
            return Err(ScanError::EmptyDocument);
        }

        let sections = match format.segment(&prepared, &self.options, cancel) {
            Ok(sections) => sections,
            Err(err) => {
                if matches!(err, ScanError::Cancelled) {
                    tracing::debug!(format = %format, "scan cancelled, partial sections discarded");
                }
                return Err(err);
            }
        };

        let extraction = self.extractor.extract(&sections);
        let profile = self.analyzer.analyze(&sections);
        let tags = DocumentTags::extract(&prepared);
        let model = StructuralModel::new(sections, extraction.placeholders, profile);

        tracing::debug!(
            format = %format,
            sections = model.section_count(),
            placeholders = model.placeholders().len(),
            warnings = extraction.warnings.len(),
            "document scanned"
        );

        Ok(ScanReport {
            format,
            model,
            warnings: extraction.warnings,
            tags,
        })
    }
}

/// Strip a BOM, unify line endings to LF and drop trailing whitespace.
fn normalize(content: &str) -> String {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    content
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handles_bom_and_crlf() {
        assert_eq!(normalize("\u{feff}a  \r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn whitespace_only_is_empty() {
        let scanner = DocumentScanner::default();
        assert!(matches!(scanner.scan(" \r\n\t\n", "markdown"), Err(ScanError::EmptyDocument)));
    }

    #[test]
    fn richtext_markup_only_is_empty() {
        let scanner = DocumentScanner::default();
        assert!(matches!(scanner.scan("<p></p><br>", "richtext"), Err(ScanError::EmptyDocument)));
    }
}
