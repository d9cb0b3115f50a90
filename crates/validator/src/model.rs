use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ValidatorError;

// ---------------------------------------------------------------------------
// Submission types
// ---------------------------------------------------------------------------

/// The four submissions of a reporting period, in fixed enumeration order.
/// The derived `Ord` is that order and drives report sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    Appropriation,
    ObjectClassProgramActivity,
    Award,
    AwardFinancial,
}

impl SubmissionType {
    pub const ALL: [SubmissionType; 4] = [
        Self::Appropriation,
        Self::ObjectClassProgramActivity,
        Self::Award,
        Self::AwardFinancial,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Appropriation => "appropriation",
            Self::ObjectClassProgramActivity => "object_class_program_activity",
            Self::Award => "award",
            Self::AwardFinancial => "award_financial",
        }
    }

    /// Canonical upload file name (`appropriation.csv`, ...).
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name())
    }
}

impl std::fmt::Display for SubmissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SubmissionType {
    type Err = ValidatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_end_matches(".csv").replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| ValidatorError::config(format!("unknown submission type '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Canonical form used for case- and whitespace-insensitive column matching.
pub fn normalize_column(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Header of one parsed stream: original names plus a normalized lookup table.
#[derive(Debug, Clone)]
pub struct Columns {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Columns {
    pub fn new(names: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            positions.entry(normalize_column(name)).or_insert(i);
        }
        Self { names, positions }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(&normalize_column(name)).copied()
    }
}

/// One data line of a submission. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Row {
    pub submission: SubmissionType,
    /// 1-based, header excluded.
    pub index: u64,
    columns: Arc<Columns>,
    values: Vec<String>,
}

impl Row {
    pub fn new(
        submission: SubmissionType,
        index: u64,
        columns: Arc<Columns>,
        values: Vec<String>,
    ) -> Self {
        Self {
            submission,
            index,
            columns,
            values,
        }
    }

    /// Raw value of a column, matched case-insensitively.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .position(column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Raw value or the empty string when the column is absent.
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Budgetary key (TAS)
// ---------------------------------------------------------------------------

/// Columns that make up the TAS, in key order.
pub const KEY_COLUMNS: [&str; 6] = [
    "AllocationTransferAgencyIdentifier",
    "AgencyIdentifier",
    "BeginningPeriodOfAvailability",
    "EndingPeriodOfAvailability",
    "AvailabilityTypeCode",
    "MainAccountCode",
];

/// Composite Treasury Account Symbol. Equality is exact on all six
/// components; a blank component is a valid value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BudgetaryKey {
    pub allocation_transfer_agency: String,
    pub agency: String,
    pub beginning_period: String,
    pub ending_period: String,
    pub availability_type: String,
    pub main_account: String,
}

impl BudgetaryKey {
    pub fn from_row(row: &Row) -> Self {
        let [ata, aid, bpoa, epoa, atc, main] = KEY_COLUMNS.map(|c| row.value(c).to_string());
        Self {
            allocation_transfer_agency: ata,
            agency: aid,
            beginning_period: bpoa,
            ending_period: epoa,
            availability_type: atc,
            main_account: main,
        }
    }
}

impl std::fmt::Display for BudgetaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}",
            self.allocation_transfer_agency,
            self.agency,
            self.beginning_period,
            self.ending_period,
            self.availability_type,
            self.main_account,
        )
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Severities a rule may declare. `info` is reserved for engine notices.
    pub fn parse_rule_severity(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// Whole-file problem (not uploaded, wrong type, unreadable stream).
    File,
    Header,
    Row,
    CrossFile,
}

/// Reserved rule ids for entries not produced by a loaded rule.
pub const RULE_SCHEMA: &str = "schema";
pub const RULE_PARSE: &str = "parse";
pub const RULE_UPLOAD: &str = "upload";
pub const RULE_RECONCILIATION: &str = "reconciliation";

/// One finding in the report. Immutable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Absent for run-level notices.
    pub submission: Option<SubmissionType>,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
    /// Field name, TAS, or award identifier the entry is about.
    pub target: String,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
}

impl ValidationError {
    pub fn file(submission: SubmissionType, message: impl Into<String>) -> Self {
        Self {
            submission: Some(submission),
            location: Location::File,
            row: None,
            target: submission.file_name(),
            rule_id: RULE_UPLOAD.into(),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn header(submission: SubmissionType, message: impl Into<String>) -> Self {
        Self {
            submission: Some(submission),
            location: Location::Header,
            row: None,
            target: "header".into(),
            rule_id: RULE_SCHEMA.into(),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn row(
        submission: SubmissionType,
        row: u64,
        target: impl Into<String>,
        rule_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            submission: Some(submission),
            location: Location::Row,
            row: Some(row),
            target: target.into(),
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
        }
    }

    pub fn cross_file(
        submission: Option<SubmissionType>,
        target: impl Into<String>,
        rule_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            submission,
            location: Location::CrossFile,
            row: None,
            target: target.into(),
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
        }
    }

    fn phase(&self) -> u8 {
        match self.location {
            Location::File | Location::Header => 0,
            Location::Row => 1,
            Location::CrossFile => 2,
        }
    }
}

impl Ord for ValidationError {
    /// File/header entries by submission, then row entries by
    /// (submission, row, rule id), then cross-file entries by (key, rule id).
    /// Remaining fields break ties so the order is total.
    fn cmp(&self, other: &Self) -> Ordering {
        self.phase().cmp(&other.phase()).then_with(|| {
            let primary = if self.phase() == 2 {
                self.target
                    .cmp(&other.target)
                    .then_with(|| self.rule_id.cmp(&other.rule_id))
                    .then_with(|| self.submission.cmp(&other.submission))
            } else {
                self.submission
                    .cmp(&other.submission)
                    .then_with(|| self.location.cmp(&other.location))
                    .then_with(|| self.row.cmp(&other.row))
                    .then_with(|| self.rule_id.cmp(&other.rule_id))
                    .then_with(|| self.target.cmp(&other.target))
            };
            primary
                .then_with(|| self.severity.cmp(&other.severity))
                .then_with(|| self.message.cmp(&other.message))
                .then_with(|| self.location.cmp(&other.location))
                .then_with(|| self.row.cmp(&other.row))
                .then_with(|| self.target.cmp(&other.target))
        })
    }
}

impl PartialOrd for ValidationError {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
