//! Data-driven rules: definitions, loading, and the row evaluator.

pub mod eval;
pub mod predicate;
pub mod repository;

use std::collections::BTreeSet;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{Severity, SubmissionType};

pub use predicate::{AmountRef, DatePart, Predicate};
pub use repository::RuleRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Field,
    Row,
    #[serde(alias = "cross-file")]
    CrossFile,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field => write!(f, "field"),
            Self::Row => write!(f, "row"),
            Self::CrossFile => write!(f, "cross_file"),
        }
    }
}

/// A validated rule, ready for evaluation.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub scope: Scope,
    /// Sorted, de-duplicated.
    pub applies_to: Vec<SubmissionType>,
    /// Target fields: declared fields for field scope, predicate fields otherwise.
    pub fields: Vec<String>,
    pub predicate: Predicate,
    pub severity: Severity,
    pub message: Option<String>,
    /// Parsed `amount_match` tolerance override.
    pub tolerance: Option<Decimal>,
    pub(crate) pattern: Option<Regex>,
}

impl Rule {
    pub fn applies(&self, submission: SubmissionType) -> bool {
        self.applies_to.contains(&submission)
    }

    /// Every submission a cross-file rule needs before it can run.
    pub fn involved(&self) -> BTreeSet<SubmissionType> {
        let mut set: BTreeSet<SubmissionType> = self.applies_to.iter().copied().collect();
        match &self.predicate {
            Predicate::KeyPresence { required_in } => set.extend(required_in.iter().copied()),
            Predicate::AmountMatch { left, right, .. } => {
                set.insert(left.submission);
                set.insert(right.submission);
            }
            Predicate::AwardLink { target, .. } => {
                set.insert(*target);
            }
            _ => {}
        }
        set
    }
}
