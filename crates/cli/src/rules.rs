//! `dataact rules`: rule set inspection.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Subcommand;
use serde::Serialize;

use dataact_validator::engine::DEFAULT_RULES_DIR;
use dataact_validator::{RuleRepository, SchemaRegistry};

use crate::{load_config, CliError};

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Load and validate the rule set without running it
    #[command(after_help = "\
Examples:
  dataact rules check
  dataact rules check --rules ./rules --json")]
    Check {
        /// Rule directory or file (overrides the config)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Config file
        #[arg(long, env = "DATAACT_CONFIG")]
        config: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct RuleSetSummary {
    source: String,
    total: usize,
    by_scope: BTreeMap<String, usize>,
    rule_ids: Vec<String>,
}

pub fn cmd_rules(cmd: RulesCommands) -> Result<(), CliError> {
    match cmd {
        RulesCommands::Check { rules, config, json } => cmd_rules_check(rules, config, json),
    }
}

fn cmd_rules_check(
    rules: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let config = load_config(config.as_ref())?;
    let schemas = match &config.schema.file {
        Some(path) => SchemaRegistry::load(path)?,
        None => SchemaRegistry::builtin(),
    };
    let source = rules
        .or(config.rules.dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_DIR));

    let repo = RuleRepository::load(&source, &schemas)
        .map_err(|e| CliError::from(dataact_validator::ValidatorError::from(e)))?;

    let summary = RuleSetSummary {
        source: source.display().to_string(),
        total: repo.len(),
        by_scope: repo
            .count_by_scope()
            .into_iter()
            .map(|(scope, n)| (scope.to_string(), n))
            .collect(),
        rule_ids: repo.rules().iter().map(|r| r.id.clone()).collect(),
    };

    if json {
        let out = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        println!("{out}");
    } else {
        println!("{}: {} rule(s)", summary.source, summary.total);
        for (scope, n) in &summary.by_scope {
            println!("  {scope:<10} {n}");
        }
    }
    Ok(())
}
