//! Request orchestration: per-file pipelines in parallel, then the
//! cross-file barrier, then the report.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use rust_decimal::Decimal;

use crate::config::{ValidatorConfig, DEFAULT_BATCH_SIZE};
use crate::error::ValidatorError;
use crate::header;
use crate::index::{FileIndex, FileIndexer};
use crate::model::{Row, SubmissionType, ValidationError};
use crate::reader::SubmissionReader;
use crate::reconcile::reconcile;
use crate::report::{aggregate, FileOutcome, FileStatus, ValidationReport};
use crate::rules::eval::evaluate_row;
use crate::rules::{Rule, RuleRepository, Scope};
use crate::schema::SchemaRegistry;

/// Rule directory used when the config does not name one.
pub const DEFAULT_RULES_DIR: &str = "rules";

/// One uploaded submission.
pub struct SubmissionInput {
    pub submission: SubmissionType,
    /// Original upload name; checked for a `.csv` extension when present.
    pub file_name: Option<String>,
    pub stream: Box<dyn Read + Send>,
}

impl SubmissionInput {
    pub fn new(submission: SubmissionType, stream: impl Read + Send + 'static) -> Self {
        Self {
            submission,
            file_name: None,
            stream: Box::new(stream),
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Open a file on disk; the file name is taken from the path.
    pub fn from_path(submission: SubmissionType, path: &Path) -> Result<Self, ValidatorError> {
        let file = std::fs::File::open(path)
            .map_err(|e| ValidatorError::Io(format!("cannot open {}: {e}", path.display())))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(submission, std::io::BufReader::new(file)).with_file_name(name))
    }
}

impl std::fmt::Debug for SubmissionInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionInput")
            .field("submission", &self.submission)
            .field("file_name", &self.file_name)
            .finish_non_exhaustive()
    }
}

/// Validation engine. Registries are immutable and shared; one engine can
/// serve any number of requests.
#[derive(Debug, Clone)]
pub struct Validator {
    schemas: Arc<SchemaRegistry>,
    rules: Arc<RuleRepository>,
    tolerance: Decimal,
    batch_size: usize,
}

impl Validator {
    pub fn new(schemas: Arc<SchemaRegistry>, rules: Arc<RuleRepository>) -> Self {
        Self {
            schemas,
            rules,
            tolerance: Decimal::ZERO,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Decimal) -> Self {
        self.tolerance = tolerance.abs();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Build the registries a config describes.
    pub fn from_config(config: &ValidatorConfig) -> Result<Self, ValidatorError> {
        config.validate()?;
        let schemas = match &config.schema.file {
            Some(path) => SchemaRegistry::load(path)?,
            None => SchemaRegistry::builtin(),
        };
        let rules_dir = config
            .rules
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_DIR));
        let rules = RuleRepository::load(&rules_dir, &schemas)?;
        Ok(Self::new(Arc::new(schemas), Arc::new(rules))
            .with_tolerance(config.tolerance()?)
            .with_batch_size(config.engine.batch_size))
    }

    /// Load a fresh rule set against this validator's schemas and swap it in.
    /// Clones made earlier keep the snapshot they were built with; on error
    /// the current rules stay in place.
    pub fn reload_rules(&mut self, source: &Path) -> Result<(), ValidatorError> {
        let rules = RuleRepository::load(source, &self.schemas)?;
        tracing::info!(
            source = %source.display(),
            rules = rules.len(),
            "rule set reloaded"
        );
        self.rules = Arc::new(rules);
        Ok(())
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn rules(&self) -> &RuleRepository {
        &self.rules
    }

    pub fn tolerance(&self) -> Decimal {
        self.tolerance
    }

    /// Validate one reporting period's submissions. Never fails: every
    /// problem found is an entry in the report.
    pub fn validate(&self, inputs: Vec<SubmissionInput>) -> ValidationReport {
        tracing::info!(files = inputs.len(), rules = self.rules.len(), "validation started");

        let mut file_errors = Vec::new();
        let mut outcomes = Vec::new();
        let mut seen = BTreeSet::new();
        let mut accepted = Vec::new();

        for input in inputs {
            if seen.insert(input.submission) {
                accepted.push(input);
                continue;
            }
            tracing::warn!(submission = %input.submission, "duplicate submission ignored");
            file_errors.push(ValidationError::file(
                input.submission,
                format!(
                    "{} was supplied more than once; the additional file was ignored",
                    input.submission
                ),
            ));
            outcomes.push(FileOutcome {
                submission: input.submission,
                file_name: input.file_name,
                status: FileStatus::Duplicate,
                rows_read: 0,
            });
        }

        for submission in SubmissionType::ALL {
            if seen.contains(&submission) {
                continue;
            }
            tracing::warn!(%submission, "file not uploaded");
            file_errors.push(ValidationError::file(submission, "file not uploaded"));
            outcomes.push(FileOutcome {
                submission,
                file_name: None,
                status: FileStatus::NotUploaded,
                rows_read: 0,
            });
        }

        let runs: Vec<FileRun> = accepted
            .into_par_iter()
            .map(|input| self.run_file(input))
            .collect();

        // Barrier: every pipeline has finished.
        let mut row_errors = Vec::new();
        let mut available = BTreeMap::new();
        for run in runs {
            file_errors.extend(run.file_errors);
            row_errors.extend(run.row_errors);
            if let Some(index) = run.index.filter(|_| run.outcome.status.is_available()) {
                available.insert(run.outcome.submission, index);
            }
            outcomes.push(run.outcome);
        }

        let cross_rules = self.rules.cross_file_rules();
        let cross_errors = reconcile(&available, &cross_rules, self.tolerance);

        let report = aggregate(file_errors, row_errors, cross_errors, outcomes);
        tracing::info!(
            errors = report.summary.errors,
            warnings = report.summary.warnings,
            rows = report.summary.rows_read,
            structurally_valid = report.structurally_valid,
            "validation finished"
        );
        report
    }

    fn run_file(&self, input: SubmissionInput) -> FileRun {
        let SubmissionInput {
            submission,
            file_name,
            stream,
        } = input;
        let mut run = FileRun::new(submission, file_name);

        if let Some(name) = &run.outcome.file_name {
            if !has_csv_extension(name) {
                tracing::warn!(%submission, file = %name, "file is of incorrect type");
                return run.fail(
                    FileStatus::IncorrectType,
                    ValidationError::file(submission, "file is of incorrect type"),
                );
            }
        }

        let schema = match self.schemas.schema_for(submission) {
            Ok(schema) => schema,
            Err(e) => {
                return run.fail(
                    FileStatus::HeaderInvalid,
                    ValidationError::file(submission, e.to_string()),
                )
            }
        };

        let reader = match SubmissionReader::open(submission, stream) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!(%submission, error = %e, "header could not be read");
                let status = if e.is_fatal() {
                    FileStatus::StreamFailed
                } else {
                    FileStatus::HeaderInvalid
                };
                return run.fail(status, e.to_validation_error());
            }
        };

        if let Some(err) = header::validate(reader.header(), schema) {
            tracing::warn!(%submission, "file headers are incorrect");
            return run.fail(FileStatus::HeaderInvalid, err.to_validation_error());
        }

        let rules: Vec<&Rule> = self
            .rules
            .rules()
            .iter()
            .filter(|r| r.scope != Scope::CrossFile && r.applies(submission))
            .collect();
        let mut indexer = FileIndexer::new(schema, &self.rules);
        let mut batch: Vec<Row> = Vec::with_capacity(self.batch_size);
        let mut batches = 0usize;
        let mut stream_failed = false;

        for item in reader {
            match item {
                Ok(row) => {
                    run.outcome.rows_read += 1;
                    batch.push(row);
                    if batch.len() >= self.batch_size {
                        run.row_errors.extend(evaluate_batch(&batch, &rules));
                        for row in batch.drain(..) {
                            indexer.add(&row);
                        }
                        batches += 1;
                    }
                }
                Err(e) if e.is_fatal() => {
                    tracing::warn!(%submission, error = %e, "stream failed");
                    run.file_errors.push(e.to_validation_error());
                    stream_failed = true;
                    break;
                }
                Err(e) => {
                    run.outcome.rows_read += 1;
                    run.row_errors.push(e.to_validation_error());
                }
            }
        }

        if !batch.is_empty() {
            run.row_errors.extend(evaluate_batch(&batch, &rules));
            for row in batch.drain(..) {
                indexer.add(&row);
            }
            batches += 1;
        }

        tracing::debug!(
            %submission,
            rows = run.outcome.rows_read,
            batches,
            row_errors = run.row_errors.len(),
            "file processed"
        );

        if stream_failed {
            run.outcome.status = FileStatus::StreamFailed;
        } else {
            run.outcome.status = FileStatus::Valid;
            run.index = Some(indexer.finish());
        }
        run
    }
}

/// Rows are independent; evaluate a batch in parallel, keeping row order.
fn evaluate_batch(batch: &[Row], rules: &[&Rule]) -> Vec<ValidationError> {
    batch
        .par_iter()
        .flat_map_iter(|row| evaluate_row(row, rules))
        .collect()
}

fn has_csv_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

struct FileRun {
    outcome: FileOutcome,
    file_errors: Vec<ValidationError>,
    row_errors: Vec<ValidationError>,
    /// Present only when the file is available for reconciliation.
    index: Option<FileIndex>,
}

impl FileRun {
    fn new(submission: SubmissionType, file_name: Option<String>) -> Self {
        Self {
            outcome: FileOutcome {
                submission,
                file_name,
                status: FileStatus::Valid,
                rows_read: 0,
            },
            file_errors: Vec::new(),
            row_errors: Vec::new(),
            index: None,
        }
    }

    fn fail(mut self, status: FileStatus, error: ValidationError) -> Self {
        self.outcome.status = status;
        self.file_errors.push(error);
        self
    }
}
