use std::sync::LazyLock;

use regex::Regex;

use super::model::{FormatProfile, Section};

static BULLET_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-•*+]\s+\S").expect("static regex"));
static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d{1,3}[.)]\s+\S").expect("static regex"));
static PIPE_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\|.*\|\s*$").expect("static regex"));

/// Derives a `FormatProfile` from section data. Pure; holds no state.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatPatternAnalyzer;

impl FormatPatternAnalyzer {
    pub fn analyze(&self, sections: &[Section]) -> FormatProfile {
        let heading_depths = sections.iter().map(|s| s.level).collect();

        let total_chars: usize = sections.iter().map(|s| s.body.chars().count()).sum();
        let average_section_length = if sections.is_empty() {
            0.0
        } else {
            total_chars as f64 / sections.len() as f64
        };

        let mut content_lines = 0usize;
        let mut list_lines = 0usize;
        for line in sections.iter().flat_map(|s| s.body.lines()) {
            if line.trim().is_empty() {
                continue;
            }
            content_lines += 1;
            if is_list_item(line) {
                list_lines += 1;
            }
        }
        let list_density = if content_lines == 0 {
            0.0
        } else {
            list_lines as f64 / content_lines as f64
        };

        let has_tables = sections.iter().any(|s| has_table(&s.body));

        FormatProfile {
            heading_depths,
            average_section_length,
            list_density,
            has_tables,
        }
    }
}

pub(crate) fn is_list_item(line: &str) -> bool {
    BULLET_ITEM.is_match(line) || NUMBERED_ITEM.is_match(line)
}

/// Two consecutive pipe rows, or two consecutive lines with the same
/// non-zero number of tab separators.
fn has_table(body: &str) -> bool {
    let lines: Vec<&str> = body.lines().collect();
    lines.windows(2).any(|pair| {
        let pipes = PIPE_ROW.is_match(pair[0]) && PIPE_ROW.is_match(pair[1]);
        let tabs_a = pair[0].matches('\t').count();
        let tabs_b = pair[1].matches('\t').count();
        pipes || (tabs_a > 0 && tabs_a == tabs_b)
    })
}
