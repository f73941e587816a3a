use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::model::Section;
use super::scanner::ScanError;
use crate::types::cancel::CancelFlag;

static ATX_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(#{1,6})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").expect("static regex")
});
static SETEXT_UNDERLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(={2,}|-{2,})[ \t]*$").expect("static regex"));
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})").expect("static regex"));
static OUTLINE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)*)\.?\s+(\S.*)$").expect("static regex"));
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-•*+]\s").expect("static regex"));

static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(<(?:h[1-6]|p|li|tr|table|/table|div|br|ul|ol|/ul|/ol)\b[^>]*>)")
        .expect("static regex")
});
static HTML_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>\s*$").expect("static regex")
});
static STYLED_PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^\s*<p\b[^>]*\bstyle\s*=\s*"(?:heading\s*([1-6])|(title)|(subtitle))"[^>]*>(.*?)</p\s*>\s*$"#)
        .expect("static regex")
});
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*<li\b[^>]*>(.*?)(?:</li\s*>)?\s*$").expect("static regex"));
static TABLE_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*<tr\b[^>]*>(.*?)(?:</tr\s*>)?\s*$").expect("static regex"));
static TABLE_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<t[dh]\b[^>]*>(.*?)(?:</t[dh]\s*>|$)").expect("static regex"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

/// Source format of a document, selected explicitly by the caller's hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Markdown,
    Plain,
    #[serde(rename = "richtext")]
    RichText,
}

impl DocumentFormat {
    pub fn from_hint(hint: &str) -> Result<Self, ScanError> {
        match hint.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(DocumentFormat::Markdown),
            "plain" | "text" | "txt" => Ok(DocumentFormat::Plain),
            "richtext" | "html" | "htm" | "rtx" => Ok(DocumentFormat::RichText),
            _ => Err(ScanError::UnsupportedFormat(hint.to_string())),
        }
    }

    /// Infer the format from a file extension; `None` when unrecognized.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(DocumentFormat::Markdown),
            "txt" | "text" => Some(DocumentFormat::Plain),
            "html" | "htm" | "rtx" => Some(DocumentFormat::RichText),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Plain => "plain",
            DocumentFormat::RichText => "richtext",
        }
    }

    /// Text preparation that must happen before the emptiness check.
    pub(crate) fn prepare(&self, text: &str) -> String {
        match self {
            DocumentFormat::RichText => flatten_richtext(text),
            DocumentFormat::Markdown | DocumentFormat::Plain => text.to_string(),
        }
    }

    /// Split prepared, LF-normalized text into sections.
    pub(crate) fn segment(
        &self,
        text: &str,
        options: &SegmentOptions,
        cancel: Option<&CancelFlag>,
    ) -> Result<Vec<Section>, ScanError> {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut builder = SectionBuilder::new(cancel);
        match self {
            DocumentFormat::Markdown => segment_markdown(&lines, &mut builder)?,
            DocumentFormat::Plain => segment_plain(&lines, options, &mut builder)?,
            DocumentFormat::RichText => segment_richtext(&lines, &mut builder)?,
        }
        Ok(builder.finish())
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SegmentOptions {
    pub plain_heading_max_chars: usize,
}

/// Accumulates lines into sections. The builder starts in an implicit root
/// section (level 0, empty heading) that is only kept when it has content or
/// when the document has no headings at all.
struct SectionBuilder<'c> {
    cancel: Option<&'c CancelFlag>,
    sections: Vec<Section>,
    heading: Option<(String, u8)>,
    body: Vec<String>,
}

impl<'c> SectionBuilder<'c> {
    fn new(cancel: Option<&'c CancelFlag>) -> Self {
        Self {
            cancel,
            sections: Vec::new(),
            heading: None,
            body: Vec::new(),
        }
    }

    fn push_line(&mut self, line: &str) {
        self.body.push(line.to_string());
    }

    fn body_is_empty(&self) -> bool {
        self.body.iter().all(|l| l.trim().is_empty())
    }

    fn start_section(&mut self, heading: &str, level: u8) -> Result<(), ScanError> {
        if self.cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(ScanError::Cancelled);
        }
        self.flush();
        self.heading = Some((heading.trim().to_string(), level));
        Ok(())
    }

    fn flush(&mut self) {
        let body = join_body(&self.body);
        self.body.clear();
        match self.heading.take() {
            Some((heading, level)) => self.push(heading, level, body),
            None if !body.is_empty() => self.push(String::new(), 0, body),
            None => {}
        }
    }

    fn push(&mut self, heading: String, level: u8, body: String) {
        let position = self.sections.len();
        self.sections.push(Section {
            heading,
            level,
            body,
            position,
        });
    }

    fn finish(mut self) -> Vec<Section> {
        self.flush();
        if self.sections.is_empty() {
            self.push(String::new(), 0, String::new());
        }
        self.sections
    }
}

/// Drop leading/trailing blank lines, keep interior layout.
fn join_body(lines: &[String]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e]
            .iter()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn segment_markdown(lines: &[&str], builder: &mut SectionBuilder<'_>) -> Result<(), ScanError> {
    let mut fence: Option<String> = None;
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if let Some(marker) = &fence {
            if line.trim_start().starts_with(marker.as_str()) {
                fence = None;
            }
            builder.push_line(line);
            i += 1;
            continue;
        }
        if let Some(caps) = FENCE.captures(line) {
            let marker = &caps[1];
            fence = Some(marker[..3].to_string());
            builder.push_line(line);
            i += 1;
            continue;
        }

        if let Some(caps) = ATX_HEADING.captures(line) {
            let level = caps[1].len() as u8;
            builder.start_section(&caps[2], level)?;
            i += 1;
            continue;
        }

        let paragraph_start = i == 0 || lines[i - 1].trim().is_empty() || builder.body_is_empty();
        if paragraph_start
            && !line.trim().is_empty()
            && !line.starts_with("    ")
            && !BULLET.is_match(line.trim_start())
            && i + 1 < lines.len()
        {
            if let Some(caps) = SETEXT_UNDERLINE.captures(lines[i + 1]) {
                let level = if caps[1].starts_with('=') { 1 } else { 2 };
                builder.start_section(line, level)?;
                i += 2;
                continue;
            }
        }

        builder.push_line(line);
        i += 1;
    }
    Ok(())
}

fn segment_plain(
    lines: &[&str],
    options: &SegmentOptions,
    builder: &mut SectionBuilder<'_>,
) -> Result<(), ScanError> {
    for (i, line) in lines.iter().enumerate() {
        let blank_before = i == 0 || lines[i - 1].trim().is_empty();
        let blank_after = i + 1 == lines.len() || lines[i + 1].trim().is_empty();
        if blank_before && blank_after {
            if let Some((heading, level)) = plain_heading(line, options) {
                builder.start_section(&heading, level)?;
                continue;
            }
        }
        builder.push_line(line);
    }
    Ok(())
}

/// A short, capitalized line that does not read like a sentence.
fn plain_heading(line: &str, options: &SegmentOptions) -> Option<(String, u8)> {
    let trimmed = line.trim();
    if trimmed.is_empty()
        || trimmed.chars().count() > options.plain_heading_max_chars
        || trimmed.split_whitespace().count() > 10
        || trimmed.ends_with(&['.', ',', ';', '!', '?'][..])
        || BULLET.is_match(trimmed)
    {
        return None;
    }

    let (level, title) = match OUTLINE_NUMBER.captures(trimmed) {
        Some(caps) => {
            let depth = caps[1].split('.').count().min(u8::MAX as usize) as u8;
            (depth, caps.get(2).map_or("", |m| m.as_str()))
        }
        None => (1, trimmed),
    };

    let first = title.chars().find(|c| c.is_alphabetic())?;
    if !first.is_uppercase() || !title.starts_with(first) {
        return None;
    }

    Some((trimmed.trim_end_matches(':').trim_end().to_string(), level))
}

fn segment_richtext(lines: &[&str], builder: &mut SectionBuilder<'_>) -> Result<(), ScanError> {
    for line in lines {
        if let Some((heading, level)) = richtext_heading(line) {
            builder.start_section(&heading, level)?;
        } else {
            builder.push_line(line);
        }
    }
    Ok(())
}

/// Heading lines survive flattening untouched; everything else is reduced to
/// plain text by `flatten_richtext`.
fn richtext_heading(line: &str) -> Option<(String, u8)> {
    if let Some(caps) = HTML_HEADING.captures(line) {
        let level = caps[1].parse::<u8>().ok()?;
        return Some((inline_text(&caps[2]), level));
    }
    let caps = STYLED_PARAGRAPH.captures(line)?;
    let level = if let Some(n) = caps.get(1) {
        n.as_str().parse::<u8>().ok()?
    } else if caps.get(2).is_some() {
        1
    } else {
        2
    };
    Some((inline_text(&caps[4]), level))
}

/// One block element per line; list items become `- ` lines, table rows
/// become pipe rows, other markup is stripped. Heading elements are kept as
/// markup so segmentation can still see them.
fn flatten_richtext(text: &str) -> String {
    let split = BLOCK_TAG.replace_all(text, "\n$1");
    let mut out: Vec<String> = Vec::new();

    for raw in split.split('\n') {
        if raw.trim().is_empty() {
            out.push(String::new());
            continue;
        }
        if richtext_heading(raw).is_some() {
            out.push(raw.trim().to_string());
            continue;
        }
        if let Some(caps) = LIST_ITEM.captures(raw) {
            out.push(format!("- {}", inline_text(&caps[1])));
            continue;
        }
        if let Some(caps) = TABLE_ROW.captures(raw) {
            let cells: Vec<String> = TABLE_CELL
                .captures_iter(&caps[1])
                .map(|c| inline_text(&c[1]))
                .collect();
            if !cells.is_empty() {
                out.push(format!("| {} |", cells.join(" | ")));
            }
            continue;
        }
        let plain = inline_text(raw);
        if !plain.is_empty() {
            out.push(plain);
        }
    }

    out.join("\n")
}

fn inline_text(fragment: &str) -> String {
    let stripped = ANY_TAG.replace_all(fragment, "");
    stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SegmentOptions {
        SegmentOptions {
            plain_heading_max_chars: 60,
        }
    }

    fn headings(sections: &[Section]) -> Vec<(&str, u8)> {
        sections.iter().map(|s| (s.heading.as_str(), s.level)).collect()
    }

    #[test]
    fn hint_parsing() {
        assert_eq!(DocumentFormat::from_hint("Markdown").unwrap(), DocumentFormat::Markdown);
        assert_eq!(DocumentFormat::from_hint("richtext").unwrap(), DocumentFormat::RichText);
        for ext in ["md", "markdown", "txt", "text", "html", "htm", "rtx"] {
            assert_eq!(
                DocumentFormat::from_hint(ext).ok(),
                DocumentFormat::from_extension(ext),
                "hint and extension disagree on {ext}"
            );
        }
        assert!(matches!(
            DocumentFormat::from_hint("docx"),
            Err(ScanError::UnsupportedFormat(h)) if h == "docx"
        ));
    }

    #[test]
    fn atx_closing_hashes_are_dropped() {
        let sections = DocumentFormat::Markdown
            .segment("## Budget ##\nbody\n### C#", &options(), None)
            .unwrap();
        assert_eq!(headings(&sections), [("Budget", 2), ("C#", 3)]);
    }

    #[test]
    fn fenced_code_is_never_a_heading() {
        let text = "# Intro\n```\n# not a heading\n```\n## Next";
        let sections = DocumentFormat::Markdown.segment(text, &options(), None).unwrap();
        assert_eq!(headings(&sections), [("Intro", 1), ("Next", 2)]);
        assert!(sections[0].body.contains("# not a heading"));
    }

    #[test]
    fn setext_headings() {
        let text = "Title\n=====\nintro\n\nPart\n----\nmore";
        let sections = DocumentFormat::Markdown.segment(text, &options(), None).unwrap();
        assert_eq!(headings(&sections), [("Title", 1), ("Part", 2)]);
    }

    #[test]
    fn preamble_becomes_root_section() {
        let sections = DocumentFormat::Markdown
            .segment("lead text\n\n# One\nbody", &options(), None)
            .unwrap();
        assert_eq!(headings(&sections), [("", 0), ("One", 1)]);
        assert_eq!(sections[0].body, "lead text");
    }

    #[test]
    fn plain_headings_need_blank_lines_and_capitals() {
        let text = "OVERVIEW\n\nThe project starts now.\n\n2.1 Scope\n\nnot a heading\n\nEnds with period.";
        let sections = DocumentFormat::Plain.segment(text, &options(), None).unwrap();
        assert_eq!(headings(&sections), [("OVERVIEW", 1), ("2.1 Scope", 2)]);
        assert!(sections[1].body.contains("not a heading"));
    }

    #[test]
    fn richtext_headings_and_lists() {
        let text = flatten_richtext(
            "<h1>Report</h1><p>Intro &amp; scope</p><p style=\"Heading 2\">Tasks</p><ul><li>one</li><li>two</li></ul>",
        );
        let sections = DocumentFormat::RichText.segment(&text, &options(), None).unwrap();
        assert_eq!(headings(&sections), [("Report", 1), ("Tasks", 2)]);
        assert_eq!(sections[0].body, "Intro & scope");
        assert_eq!(sections[1].body, "- one\n- two");
    }

    #[test]
    fn richtext_table_rows_become_pipe_rows() {
        let text = flatten_richtext("<table><tr><th>Item</th><th>Cost</th></tr><tr><td>Tent</td><td>40</td></tr></table>");
        assert!(text.contains("| Item | Cost |"));
        assert!(text.contains("| Tent | 40 |"));
    }

    #[test]
    fn cancellation_stops_at_next_heading() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = DocumentFormat::Markdown.segment("# A\n# B", &options(), Some(&cancel));
        assert!(matches!(result, Err(ScanError::Cancelled)));
    }
}
