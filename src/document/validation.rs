use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::model::StructuralModel;

/// Structural problem in a template candidate. Advisory only: storage never
/// refuses a model because of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// A heading nests more than one level below its predecessor.
    HeadingJump { position: usize, from: u8, to: u8 },
    /// A placeholder the category expects is absent.
    MissingPlaceholder { name: String },
    /// A table row has a different cell count from the table's first row.
    InconsistentTable {
        position: usize,
        row: usize,
        expected: usize,
        found: usize,
    },
}

pub struct TemplateValidator {
    required: BTreeMap<String, Vec<String>>,
}

impl Default for TemplateValidator {
    fn default() -> Self {
        let mut required = BTreeMap::new();
        required.insert(
            "proposal".to_string(),
            to_owned(&["project_title", "duration", "location", "budget", "objectives", "activities"]),
        );
        required.insert(
            "report".to_string(),
            to_owned(&["project_title", "reporting_period", "prepared_by", "activities", "progress", "challenges"]),
        );
        required.insert(
            "research".to_string(),
            to_owned(&["title", "researcher", "objectives", "methodology", "findings"]),
        );
        Self { required }
    }
}

fn to_owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

impl TemplateValidator {
    /// A validator with no category requirements.
    pub fn empty() -> Self {
        Self {
            required: BTreeMap::new(),
        }
    }

    pub fn require(&mut self, category: impl Into<String>, placeholders: &[&str]) {
        self.required.insert(category.into(), to_owned(placeholders));
    }

    /// Required placeholders for a category; a trailing plural `s` is ignored
    /// so `reports` shares the `report` list.
    pub fn required_for(&self, category: &str) -> &[String] {
        let key = category.trim().to_lowercase();
        self.required
            .get(&key)
            .or_else(|| key.strip_suffix('s').and_then(|singular| self.required.get(singular)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn validate(&self, model: &StructuralModel, category: &str) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let mut previous = 1u8;
        for section in model.sections().iter().filter(|s| s.level > 0) {
            if section.level > previous.saturating_add(1) {
                issues.push(ValidationIssue::HeadingJump {
                    position: section.position,
                    from: previous,
                    to: section.level,
                });
            }
            previous = section.level;
        }

        let present: BTreeSet<&str> = model.placeholder_names().collect();
        for name in self.required_for(category) {
            if !present.contains(name.as_str()) {
                issues.push(ValidationIssue::MissingPlaceholder { name: name.clone() });
            }
        }

        for section in model.sections() {
            check_tables(section.position, &section.body, &mut issues);
        }

        issues
    }
}

fn check_tables(position: usize, body: &str, issues: &mut Vec<ValidationIssue>) {
    let mut expected: Option<usize> = None;
    let mut row = 0;
    for line in body.lines() {
        let trimmed = line.trim();
        if !(trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 1) {
            expected = None;
            row = 0;
            continue;
        }
        let cells = trimmed[1..trimmed.len() - 1].split('|').count();
        row += 1;
        match expected {
            None => expected = Some(cells),
            Some(n) if n != cells => issues.push(ValidationIssue::InconsistentTable {
                position,
                row,
                expected: n,
                found: cells,
            }),
            Some(_) => {}
        }
    }
}
