//! `dataact validate`: run the validator over one reporting period.

use std::path::{Path, PathBuf};

use clap::Args;

use dataact_validator::report::FileStatus;
use dataact_validator::{
    Location, SubmissionInput, SubmissionType, ValidationError, ValidationReport, Validator,
};

use crate::exit_codes::{EXIT_IO, EXIT_VALIDATION_ERRORS};
use crate::{load_config, CliError};

#[derive(Args)]
pub struct ValidateArgs {
    /// Directory holding the canonically named files (appropriation.csv, ...)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Appropriation file (overrides --dir)
    #[arg(long)]
    appropriation: Option<PathBuf>,

    /// Object class and program activity file (overrides --dir)
    #[arg(long)]
    object_class_program_activity: Option<PathBuf>,

    /// Award file (overrides --dir)
    #[arg(long)]
    award: Option<PathBuf>,

    /// Award financial file (overrides --dir)
    #[arg(long)]
    award_financial: Option<PathBuf>,

    /// Rule directory or file (overrides the config)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Config file
    #[arg(long, env = "DATAACT_CONFIG")]
    config: Option<PathBuf>,

    /// Print the JSON report to stdout instead of the listing
    #[arg(long)]
    json: bool,

    /// Also write the JSON report to a file
    #[arg(long)]
    output: Option<PathBuf>,
}

impl ValidateArgs {
    fn explicit(&self, submission: SubmissionType) -> Option<&PathBuf> {
        match submission {
            SubmissionType::Appropriation => self.appropriation.as_ref(),
            SubmissionType::ObjectClassProgramActivity => {
                self.object_class_program_activity.as_ref()
            }
            SubmissionType::Award => self.award.as_ref(),
            SubmissionType::AwardFinancial => self.award_financial.as_ref(),
        }
    }

    /// Path to read for a submission, if any. Explicit flags win over `--dir`;
    /// a canonical file missing from `--dir` counts as not uploaded.
    fn path_for(&self, submission: SubmissionType) -> Option<PathBuf> {
        if let Some(path) = self.explicit(submission) {
            return Some(path.clone());
        }
        let candidate = self.dir.as_ref()?.join(submission.file_name());
        candidate.is_file().then_some(candidate)
    }
}

pub fn cmd_validate(args: ValidateArgs) -> Result<(), CliError> {
    let any_explicit = SubmissionType::ALL.iter().any(|t| args.explicit(*t).is_some());
    if args.dir.is_none() && !any_explicit {
        return Err(CliError::args("no submission files given")
            .with_hint("pass --dir or at least one per-file flag such as --appropriation"));
    }
    if let Some(dir) = &args.dir {
        if !dir.is_dir() {
            return Err(CliError::io(format!("{} is not a directory", dir.display())));
        }
    }

    let mut config = load_config(args.config.as_ref())?;
    if let Some(rules) = &args.rules {
        config.rules.dir = Some(rules.clone());
    }
    let validator = Validator::from_config(&config)?;

    let mut inputs = Vec::new();
    for submission in SubmissionType::ALL {
        if let Some(path) = args.path_for(submission) {
            tracing::debug!(%submission, path = %path.display(), "input resolved");
            inputs.push(SubmissionInput::from_path(submission, &path)?);
        }
    }

    let report = validator.validate(inputs);

    let json = report
        .to_json()
        .map_err(|e| CliError::new(EXIT_IO, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = args.output {
        write_report(path, &json)?;
        eprintln!("wrote {}", path.display());
    }

    if args.json {
        print!("{json}");
    } else {
        for entry in &report.errors {
            println!("{}", format_entry(entry));
        }
    }

    print_summary(&report);

    if report.has_errors() {
        return Err(CliError::new(
            EXIT_VALIDATION_ERRORS,
            format!("validation found {} error(s)", report.summary.errors),
        ));
    }
    Ok(())
}

fn write_report(path: &Path, json: &str) -> Result<(), CliError> {
    std::fs::write(path, json)
        .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))
}

/// One listing line: severity, rule, where, what.
fn format_entry(e: &ValidationError) -> String {
    let submission = e.submission.map(|s| s.name()).unwrap_or("-");
    let place = match (e.location, e.row) {
        (Location::Row, Some(row)) => format!("{submission}:{row}"),
        _ => submission.to_string(),
    };
    format!(
        "{:<7} {:<14} {} {}: {}",
        e.severity.to_string(),
        e.rule_id,
        place,
        e.target,
        e.message
    )
}

/// Human summary to stderr.
fn print_summary(report: &ValidationReport) {
    for file in &report.files {
        let name = file
            .file_name
            .clone()
            .unwrap_or_else(|| file.submission.file_name());
        if file.status == FileStatus::Valid {
            eprintln!("{:<33} {} rows", name, file.rows_read);
        } else {
            eprintln!("{:<33} {}", name, file.status);
        }
    }
    let s = &report.summary;
    eprintln!(
        "{} rows: {} errors, {} warnings, {} notices{}",
        s.rows_read,
        s.errors,
        s.warnings,
        s.infos,
        if report.structurally_valid {
            ""
        } else {
            " (not all files structurally valid)"
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataact_validator::Severity;

    #[test]
    fn row_entries_show_row_number() {
        let e = ValidationError::row(
            SubmissionType::AwardFinancial,
            12,
            "TransactionObligatedAmount",
            "AF-010",
            Severity::Error,
            "bad amount",
        );
        assert_eq!(
            format_entry(&e),
            "error   AF-010         award_financial:12 TransactionObligatedAmount: bad amount"
        );
    }

    #[test]
    fn run_level_notice_has_no_submission() {
        let e = ValidationError::cross_file(None, "reconciliation-skipped", "reconciliation", Severity::Info, "skipped");
        assert!(format_entry(&e).starts_with("info    reconciliation - reconciliation-skipped"));
    }
}
