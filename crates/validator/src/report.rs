use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Severity, SubmissionType, ValidationError};

/// How far one submission got through its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Header accepted and stream fully read. Row errors may still exist.
    Valid,
    NotUploaded,
    IncorrectType,
    HeaderInvalid,
    StreamFailed,
    /// Second stream supplied for an already supplied type; ignored.
    Duplicate,
}

impl FileStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::NotUploaded => write!(f, "not uploaded"),
            Self::IncorrectType => write!(f, "incorrect type"),
            Self::HeaderInvalid => write!(f, "header invalid"),
            Self::StreamFailed => write!(f, "stream failed"),
            Self::Duplicate => write!(f, "duplicate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub submission: SubmissionType,
    pub file_name: Option<String>,
    pub status: FileStatus,
    pub rows_read: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub rows_read: u64,
    /// Entry count per rule id.
    pub by_rule: BTreeMap<String, usize>,
}

/// Final output of a validation request. Contains no timestamps, so equal
/// input serializes to equal bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub structurally_valid: bool,
    pub summary: ReportSummary,
    pub files: Vec<FileOutcome>,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    pub fn outcome(&self, submission: SubmissionType) -> Option<&FileOutcome> {
        self.files.iter().find(|f| f.submission == submission)
    }

    pub fn errors_for(&self, submission: SubmissionType) -> impl Iterator<Item = &ValidationError> {
        self.errors
            .iter()
            .filter(move |e| e.submission == Some(submission))
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }
}

/// Merge the entries of every stage into one deterministically ordered report.
pub fn aggregate(
    file_errors: Vec<ValidationError>,
    row_errors: Vec<ValidationError>,
    cross_file_errors: Vec<ValidationError>,
    mut files: Vec<FileOutcome>,
) -> ValidationReport {
    let mut errors = file_errors;
    errors.extend(row_errors);
    errors.extend(cross_file_errors);
    errors.sort();

    files.sort_by(|a, b| {
        a.submission
            .cmp(&b.submission)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });

    let summary = compute_summary(&errors, &files);
    let structurally_valid = SubmissionType::ALL.iter().all(|t| {
        files
            .iter()
            .any(|f| f.submission == *t && f.status == FileStatus::Valid)
    }) && files.iter().all(|f| f.status != FileStatus::Duplicate);

    ValidationReport {
        structurally_valid,
        summary,
        files,
        errors,
    }
}

fn compute_summary(errors: &[ValidationError], files: &[FileOutcome]) -> ReportSummary {
    let mut summary = ReportSummary {
        total: errors.len(),
        rows_read: files.iter().map(|f| f.rows_read).sum(),
        ..Default::default()
    };
    for e in errors {
        match e.severity {
            Severity::Error => summary.errors += 1,
            Severity::Warning => summary.warnings += 1,
            Severity::Info => summary.infos += 1,
        }
        *summary.by_rule.entry(e.rule_id.clone()).or_insert(0) += 1;
    }
    summary
}
