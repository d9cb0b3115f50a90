//! Declarative rule predicates. Each variant is one check kind; parameters
//! come straight from the rule file and are interpreted by `rules::eval`
//! (field/row scope) or `reconcile` (cross-file scope).

use serde::Deserialize;

use crate::model::SubmissionType;

use super::Scope;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    // -- field scope -------------------------------------------------------
    /// Value must be non-blank after trimming.
    Required,
    /// Signed/unsigned integer or decimal.
    Numeric {
        #[serde(default = "default_true")]
        allow_sign: bool,
        #[serde(default = "default_true")]
        allow_decimal: bool,
        #[serde(default)]
        max_decimal_places: Option<usize>,
    },
    /// Length in characters.
    Length {
        #[serde(default)]
        exact: Option<usize>,
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    /// Full-match regular expression.
    Pattern { regex: String },
    /// Enumerated value set.
    OneOf {
        values: Vec<String>,
        #[serde(default)]
        ignore_case: bool,
    },
    /// Day (1-31), month (1-12) or four-digit year component.
    DatePart { part: DatePart },

    // -- row scope ---------------------------------------------------------
    /// When `when` equals one of `equals`, every `then` field must be non-blank.
    RequiredIf {
        when: String,
        equals: Vec<String>,
        then: Vec<String>,
    },
    /// At least one of the listed fields is non-blank.
    AnyPresent { any_of: Vec<String> },
    /// Three components form a real calendar date (when all are present).
    ValidDate {
        day: String,
        month: String,
        year: String,
    },
    /// Numeric value of `earlier` must not exceed `later` (when both present).
    NotAfter { earlier: String, later: String },

    // -- cross-file scope --------------------------------------------------
    /// Every key of the `applies_to` submissions exists in one of `required_in`.
    KeyPresence { required_in: Vec<SubmissionType> },
    /// Per-key totals of two amount fields agree within a tolerance.
    AmountMatch {
        left: AmountRef,
        right: AmountRef,
        /// Decimal string; falls back to the configured default.
        #[serde(default)]
        tolerance: Option<String>,
    },
    /// Award identifiers referenced by `applies_to` rows exist in `target`.
    AwardLink {
        target: SubmissionType,
        link_fields: Vec<String>,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AmountRef {
    pub submission: SubmissionType,
    pub field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    Day,
    Month,
    Year,
}

impl std::fmt::Display for DatePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "day (1-31)"),
            Self::Month => write!(f, "month (1-12)"),
            Self::Year => write!(f, "four-digit year"),
        }
    }
}

impl Predicate {
    /// The scope a predicate kind belongs to.
    pub fn scope(&self) -> Scope {
        match self {
            Self::Required
            | Self::Numeric { .. }
            | Self::Length { .. }
            | Self::Pattern { .. }
            | Self::OneOf { .. }
            | Self::DatePart { .. } => Scope::Field,
            Self::RequiredIf { .. }
            | Self::AnyPresent { .. }
            | Self::ValidDate { .. }
            | Self::NotAfter { .. } => Scope::Row,
            Self::KeyPresence { .. } | Self::AmountMatch { .. } | Self::AwardLink { .. } => {
                Scope::CrossFile
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Numeric { .. } => "numeric",
            Self::Length { .. } => "length",
            Self::Pattern { .. } => "pattern",
            Self::OneOf { .. } => "one_of",
            Self::DatePart { .. } => "date_part",
            Self::RequiredIf { .. } => "required_if",
            Self::AnyPresent { .. } => "any_present",
            Self::ValidDate { .. } => "valid_date",
            Self::NotAfter { .. } => "not_after",
            Self::KeyPresence { .. } => "key_presence",
            Self::AmountMatch { .. } => "amount_match",
            Self::AwardLink { .. } => "award_link",
        }
    }

    /// Fields a row-scope predicate reads, in declaration order.
    pub fn row_fields(&self) -> Vec<String> {
        match self {
            Self::RequiredIf { when, then, .. } => {
                let mut fields = vec![when.clone()];
                fields.extend(then.iter().cloned());
                fields
            }
            Self::AnyPresent { any_of } => any_of.clone(),
            Self::ValidDate { day, month, year } => {
                vec![day.clone(), month.clone(), year.clone()]
            }
            Self::NotAfter { earlier, later } => vec![earlier.clone(), later.clone()],
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Value checks shared by the evaluator
// ---------------------------------------------------------------------------

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Optional sign, ASCII digits, optional `.digits` fraction.
pub fn is_numeric(
    value: &str,
    allow_sign: bool,
    allow_decimal: bool,
    max_decimal_places: Option<usize>,
) -> bool {
    let mut s = value.trim();
    if let Some(rest) = s.strip_prefix(['+', '-']) {
        if !allow_sign {
            return false;
        }
        s = rest;
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => {
            if !allow_decimal {
                return false;
            }
            (i, Some(f))
        }
        None => (s, None),
    };

    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) {
        return false;
    }
    match frac_part {
        Some(f) => {
            if f.is_empty() || !all_digits(f) {
                return false;
            }
            if let Some(max) = max_decimal_places {
                if f.len() > max {
                    return false;
                }
            }
            true
        }
        None => !int_part.is_empty(),
    }
}

pub fn is_date_part(value: &str, part: DatePart) -> bool {
    let v = value.trim();
    if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match part {
        DatePart::Year => v.len() == 4,
        DatePart::Month => matches!(v.parse::<u32>(), Ok(1..=12)),
        DatePart::Day => matches!(v.parse::<u32>(), Ok(1..=31)),
    }
}
