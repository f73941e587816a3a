use serde::{Deserialize, Serialize};

use crate::types::identifiers::ContentHash;

/// One heading-delimited division of a document.
///
/// Level 0 is reserved for the root/preamble section (text before the first
/// heading, or the whole body when no heading was detected).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub level: u8,
    pub body: String,
    pub position: usize,
}

/// Where a placeholder token occurs: section position plus byte offset of
/// the opening delimiter inside that section's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaceholderPosition {
    pub section: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub name: String,
    pub positions: Vec<PlaceholderPosition>,
}

/// Fixed-shape formatting feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatProfile {
    pub heading_depths: Vec<u8>,
    /// Mean body length in characters.
    pub average_section_length: f64,
    /// Fraction of non-blank body lines that are bullet or numbered items.
    pub list_density: f64,
    pub has_tables: bool,
}

/// The parsed representation of a document.
///
/// Built once by the scanner and never mutated afterwards; all accessors are
/// read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralModel {
    sections: Vec<Section>,
    placeholders: Vec<Placeholder>,
    format_profile: FormatProfile,
}

impl StructuralModel {
    /// `placeholders` must already be unique by name; they are stored sorted.
    pub(crate) fn new(
        sections: Vec<Section>,
        mut placeholders: Vec<Placeholder>,
        format_profile: FormatProfile,
    ) -> Self {
        placeholders.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            sections,
            placeholders,
            format_profile,
        }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    pub fn placeholder_names(&self) -> impl Iterator<Item = &str> {
        self.placeholders.iter().map(|p| p.name.as_str())
    }

    pub fn format_profile(&self) -> &FormatProfile {
        &self.format_profile
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Canonical byte form used for hashing.
    ///
    /// Line endings are normalized to LF, every line is right-trimmed and the
    /// whole text trimmed; sections keep their document order, placeholders
    /// are sorted by name. Every field is length-prefixed so no two distinct
    /// models share an encoding.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();

        push_field(&mut out, "sections", &self.sections.len().to_string());
        for section in &self.sections {
            push_field(&mut out, "level", &section.level.to_string());
            push_field(&mut out, "heading", &canonical_text(&section.heading));
            push_field(&mut out, "body", &canonical_text(&section.body));
        }

        let mut names: Vec<&str> = self.placeholder_names().collect();
        names.sort_unstable();
        push_field(&mut out, "placeholders", &names.len().to_string());
        for name in names {
            push_field(&mut out, "name", name);
        }

        let profile = &self.format_profile;
        let depths: Vec<String> = profile.heading_depths.iter().map(|d| d.to_string()).collect();
        push_field(&mut out, "depths", &depths.join(","));
        push_field(&mut out, "avg_len", &format!("{:.6}", profile.average_section_length));
        push_field(&mut out, "list_density", &format!("{:.6}", profile.list_density));
        push_field(&mut out, "tables", if profile.has_tables { "1" } else { "0" });

        out
    }

    pub fn content_hash(&self) -> ContentHash {
        ContentHash::from_canonical(&self.canonical_bytes())
    }
}

fn push_field(out: &mut Vec<u8>, key: &str, value: &str) {
    out.extend_from_slice(key.as_bytes());
    out.push(b'=');
    out.extend_from_slice(value.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(value.as_bytes());
    out.push(b'\n');
}

/// LF line endings, right-trimmed lines, trimmed ends.
pub(crate) fn canonical_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.split('\n').map(str::trim_end).collect();
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> FormatProfile {
        FormatProfile {
            heading_depths: vec![2],
            average_section_length: 4.0,
            list_density: 0.0,
            has_tables: false,
        }
    }

    fn section(heading: &str, body: &str) -> Section {
        Section {
            heading: heading.into(),
            level: 2,
            body: body.into(),
            position: 0,
        }
    }

    #[test]
    fn canonical_text_normalizes_line_endings_and_trailing_space() {
        assert_eq!(canonical_text("  a  \r\nb\t\rc\n\n"), "a\nb\nc");
    }

    #[test]
    fn hash_ignores_crlf_and_trailing_whitespace() {
        let unix = StructuralModel::new(vec![section("Intro", "one\ntwo")], vec![], profile());
        let dos = StructuralModel::new(vec![section("Intro ", "one  \r\ntwo\r\n")], vec![], profile());
        assert_eq!(unix.content_hash(), dos.content_hash());
    }

    #[test]
    fn hash_depends_on_section_order() {
        let ab = StructuralModel::new(vec![section("A", ""), section("B", "")], vec![], profile());
        let ba = StructuralModel::new(vec![section("B", ""), section("A", "")], vec![], profile());
        assert_ne!(ab.content_hash(), ba.content_hash());
    }

    #[test]
    fn length_prefix_separates_field_boundaries() {
        let joined = StructuralModel::new(vec![section("ab", "c")], vec![], profile());
        let split = StructuralModel::new(vec![section("a", "bc")], vec![], profile());
        assert_ne!(joined.content_hash(), split.content_hash());
    }

    #[test]
    fn placeholders_are_sorted_on_construction() {
        let model = StructuralModel::new(
            vec![section("A", "")],
            vec![
                Placeholder { name: "zeta".into(), positions: vec![] },
                Placeholder { name: "alpha".into(), positions: vec![] },
            ],
            profile(),
        );
        let names: Vec<&str> = model.placeholder_names().collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }
}
