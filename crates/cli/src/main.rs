// dataact - validate DATA Act agency submissions from the command line

mod exit_codes;
mod rules;
mod validate;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use dataact_validator::{SchemaRegistry, SubmissionType, ValidatorConfig, ValidatorError};
use exit_codes::{validator_exit_code, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "dataact")]
#[command(about = "Validate the four DATA Act submission files of a reporting period")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate submission files and print the report
    #[command(after_help = "\
Examples:
  dataact validate --dir submissions/2016-Q4
  dataact validate --dir submissions/2016-Q4 --json
  dataact validate --appropriation approp.csv --award-financial af.csv
  dataact validate --dir submissions/2016-Q4 --config dataact.toml --output report.json

Exit codes:
  0  no errors (warnings allowed)
  1  I/O failure
  3  validation errors found
  4  config or rule set rejected")]
    Validate(validate::ValidateArgs),

    /// Inspect the rule set
    #[command(subcommand)]
    Rules(rules::RulesCommands),

    /// Print the required columns of a submission type
    #[command(after_help = "\
Examples:
  dataact schema appropriation
  dataact schema award_financial --config dataact.toml")]
    Schema {
        /// Submission type (appropriation, object_class_program_activity, award, award_financial)
        submission: String,

        /// Config file (may point at an external schema file)
        #[arg(long, env = "DATAACT_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate(args) => validate::cmd_validate(args),
        Commands::Rules(cmd) => rules::cmd_rules(cmd),
        Commands::Schema { submission, config } => cmd_schema(&submission, config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Logs go to stderr so stdout carries only the report. `RUST_LOG`
/// overrides the default `warn` level.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(exit_codes::EXIT_IO, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ValidatorError> for CliError {
    fn from(err: ValidatorError) -> Self {
        let code = validator_exit_code(&err);
        let hint = match &err {
            ValidatorError::RuleLoad(_) => {
                Some("run `dataact rules check` to validate the rule set".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}

/// Load the config file if one was given, defaults otherwise.
pub fn load_config(path: Option<&PathBuf>) -> Result<ValidatorConfig, CliError> {
    match path {
        Some(path) => Ok(ValidatorConfig::load(path)?),
        None => Ok(ValidatorConfig::default()),
    }
}

fn cmd_schema(submission: &str, config: Option<PathBuf>) -> Result<(), CliError> {
    let submission: SubmissionType = submission.parse().map_err(|e: ValidatorError| {
        CliError::args(e.to_string()).with_hint(
            "expected one of: appropriation, object_class_program_activity, award, award_financial",
        )
    })?;

    let config = load_config(config.as_ref())?;
    let registry = match &config.schema.file {
        Some(path) => SchemaRegistry::load(path)?,
        None => SchemaRegistry::builtin(),
    };
    let schema = registry.schema_for(submission)?;

    println!("{} ({} columns)", submission.file_name(), schema.columns().len());
    for column in schema.columns() {
        println!("  {column}");
    }
    Ok(())
}
