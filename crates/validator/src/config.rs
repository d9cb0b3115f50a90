use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ValidatorError;

pub const DEFAULT_BATCH_SIZE: usize = 4096;
pub const DEFAULT_TOLERANCE: &str = "0.00";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Contents of `dataact.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    /// Rule directory or single rule file.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// External schema file; the built-in registry is used when absent.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconciliationConfig {
    /// Default `amount_match` tolerance, as a decimal string.
    #[serde(default = "default_tolerance")]
    pub tolerance: String,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
        }
    }
}

fn default_tolerance() -> String {
    DEFAULT_TOLERANCE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Rows buffered per evaluation batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ValidatorConfig {
    pub fn from_toml(input: &str) -> Result<Self, ValidatorError> {
        let config: ValidatorConfig = toml::from_str(input)
            .map_err(|e| ValidatorError::config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file. Relative paths inside it are resolved against the
    /// file's own directory.
    pub fn load(path: &Path) -> Result<Self, ValidatorError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ValidatorError::Io(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.rules.dir = config.rules.dir.map(|p| base.join(p));
        config.schema.file = config.schema.file.map(|p| base.join(p));
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidatorError> {
        self.tolerance()?;

        if self.engine.batch_size == 0 {
            return Err(ValidatorError::config("engine.batch_size must be > 0"));
        }

        Ok(())
    }

    /// Parsed default tolerance.
    pub fn tolerance(&self) -> Result<Decimal, ValidatorError> {
        let raw = self.reconciliation.tolerance.trim();
        let tolerance = Decimal::from_str(raw).map_err(|_| {
            ValidatorError::config(format!(
                "reconciliation.tolerance must be a decimal number, got '{raw}'"
            ))
        })?;
        if tolerance.is_sign_negative() && !tolerance.is_zero() {
            return Err(ValidatorError::config(format!(
                "reconciliation.tolerance must be >= 0, got '{raw}'"
            )));
        }
        Ok(tolerance)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
