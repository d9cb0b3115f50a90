use std::collections::BTreeSet;

use crate::model::{normalize_column, SubmissionType, ValidationError};
use crate::schema::Schema;

/// Header deficiencies of one submission. Lists are sorted, so the result
/// does not depend on the order of the header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub submission: SubmissionType,
    /// Required columns absent from the header (schema spelling).
    pub missing: Vec<String>,
    /// Header columns the schema does not define (header spelling).
    pub unexpected: Vec<String>,
    /// Header columns that appear more than once.
    pub duplicates: Vec<String>,
}

impl SchemaError {
    pub fn message(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing required column(s): {}", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("unexpected column(s): {}", self.unexpected.join(", ")));
        }
        if !self.duplicates.is_empty() {
            parts.push(format!("duplicate column(s): {}", self.duplicates.join(", ")));
        }
        format!("file headers are incorrect: {}", parts.join("; "))
    }

    pub fn to_validation_error(&self) -> ValidationError {
        ValidationError::header(self.submission, self.message())
    }
}

/// Check a header line against a schema by set equality.
///
/// Missing and unexpected columns are both errors; duplicates are errors even
/// when the de-duplicated set would match.
pub fn validate(header: &[String], schema: &Schema) -> Option<SchemaError> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    let mut unexpected = BTreeSet::new();

    for name in header {
        let norm = normalize_column(name);
        if !seen.insert(norm.clone()) {
            duplicates.insert(name.trim().to_string());
            continue;
        }
        if !schema.normalized().contains(&norm) {
            unexpected.insert(name.trim().to_string());
        }
    }

    let missing: Vec<String> = schema
        .columns()
        .iter()
        .filter(|c| !seen.contains(&normalize_column(c)))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if missing.is_empty() && unexpected.is_empty() && duplicates.is_empty() {
        return None;
    }

    Some(SchemaError {
        submission: schema.submission(),
        missing,
        unexpected: unexpected.into_iter().collect(),
        duplicates: duplicates.into_iter().collect(),
    })
}
