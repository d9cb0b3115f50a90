//! `dataact-validator`: validation engine for DATA Act agency submissions.
//!
//! Checks the four submission files of a reporting period against their
//! templates, applies data-driven field and row rules, and reconciles the
//! files against each other by Treasury Account Symbol. Pure engine crate:
//! receives readable streams, returns a deterministic report.

pub mod config;
pub mod engine;
pub mod error;
pub mod header;
pub mod index;
pub mod model;
pub mod reader;
pub mod reconcile;
pub mod report;
pub mod rules;
pub mod schema;

pub use config::ValidatorConfig;
pub use engine::{SubmissionInput, Validator};
pub use error::{RuleLoadError, ValidatorError};
pub use model::{BudgetaryKey, Location, Severity, SubmissionType, ValidationError};
pub use report::{FileOutcome, FileStatus, ValidationReport};
pub use rules::RuleRepository;
pub use schema::{Schema, SchemaRegistry};
