use thiserror::Error;

/// Fatal errors raised while building the validator (startup-time failures).
///
/// Per-request problems (bad headers, bad rows, reconciliation mismatches) are
/// never returned as `Err`; they are recorded as entries in the report.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Bad schema, config, or unknown submission name.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Rule definitions could not be loaded.
    #[error("rule load error: {0}")]
    RuleLoad(#[from] RuleLoadError),
    /// IO error (config file, rules directory, etc.).
    #[error("IO error: {0}")]
    Io(String),
}

impl ValidatorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum RuleLoadError {
    /// TOML parse / deserialization error.
    #[error("{source_name}: {message}")]
    Parse { source_name: String, message: String },
    /// Two rules share an id.
    #[error("duplicate rule id '{0}'")]
    DuplicateId(String),
    /// Severity is not `error` or `warning`.
    #[error("rule '{rule}': unknown severity '{value}' (expected \"error\" or \"warning\")")]
    UnknownSeverity { rule: String, value: String },
    /// A rule references a column the submission's schema does not have.
    #[error("rule '{rule}': field '{field}' is not a column of {submission}")]
    UnknownField {
        rule: String,
        field: String,
        submission: String,
    },
    /// Structurally invalid rule (empty applies_to, bad regex, scope mismatch, ...).
    #[error("rule '{rule}': {message}")]
    Invalid { rule: String, message: String },
    /// Rules directory or file could not be read.
    #[error("cannot read rules from {path}: {message}")]
    Io { path: String, message: String },
}

impl RuleLoadError {
    pub(crate) fn invalid(rule: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}
