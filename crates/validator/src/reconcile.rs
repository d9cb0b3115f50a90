//! Cross-file reconciliation over the per-file indexes.
//!
//! Runs after every file pipeline has finished. A rule only runs when all
//! the submissions it involves are available; skipped rules are summarised
//! in a single info notice instead of producing cross-file errors.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::index::{FileIndex, KeyIndex};
use crate::model::{Severity, SubmissionType, ValidationError, RULE_RECONCILIATION};
use crate::rules::eval::render;
use crate::rules::{Predicate, Rule};

/// Target of the notice listing rules that could not run.
pub const SKIPPED_TARGET: &str = "reconciliation-skipped";

/// Rows listed per unmatched award before the list is abbreviated.
const MAX_LISTED_ROWS: usize = 10;

pub fn reconcile(
    available: &BTreeMap<SubmissionType, FileIndex>,
    rules: &[&Rule],
    default_tolerance: Decimal,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut skipped: Vec<&str> = Vec::new();
    let mut unavailable: BTreeSet<SubmissionType> = BTreeSet::new();

    for rule in rules {
        let missing: Vec<SubmissionType> = rule
            .involved()
            .into_iter()
            .filter(|t| !available.contains_key(t))
            .collect();
        if !missing.is_empty() {
            tracing::debug!(rule = %rule.id, ?missing, "cross-file rule skipped");
            skipped.push(&rule.id);
            unavailable.extend(missing);
            continue;
        }

        match &rule.predicate {
            Predicate::KeyPresence { required_in } => {
                key_presence(available, rule, required_in, &mut errors)
            }
            Predicate::AmountMatch { left, right, .. } => {
                let tolerance = rule.tolerance.unwrap_or(default_tolerance);
                if let (Some(l), Some(r)) = (
                    keys_of(available, left.submission),
                    keys_of(available, right.submission),
                ) {
                    amount_match(rule, (l, &left.field), (r, &right.field), tolerance, &mut errors);
                }
            }
            Predicate::AwardLink { target, .. } => {
                award_link(available, rule, *target, &mut errors)
            }
            _ => {}
        }
    }

    if !skipped.is_empty() {
        let names: Vec<&str> = unavailable.iter().map(|t| t.name()).collect();
        tracing::warn!(
            unavailable = %names.join(", "),
            rules = skipped.len(),
            "cross-file checks skipped"
        );
        errors.push(ValidationError::cross_file(
            None,
            SKIPPED_TARGET,
            RULE_RECONCILIATION,
            Severity::Info,
            format!(
                "cross-file checks skipped because {} could not be validated: {}",
                names.join(", "),
                skipped.join(", ")
            ),
        ));
    }

    errors
}

fn keys_of(
    available: &BTreeMap<SubmissionType, FileIndex>,
    submission: SubmissionType,
) -> Option<&KeyIndex> {
    available.get(&submission).and_then(|f| f.keys.as_ref())
}

fn message(rule: &Rule, default: String, vars: &[(&str, &str)]) -> String {
    match &rule.message {
        Some(template) => {
            let mut all = vars.to_vec();
            all.push(("rule", rule.id.as_str()));
            all.push(("detail", default.as_str()));
            render(template, &all)
        }
        None => default,
    }
}

fn key_presence(
    available: &BTreeMap<SubmissionType, FileIndex>,
    rule: &Rule,
    required_in: &[SubmissionType],
    errors: &mut Vec<ValidationError>,
) {
    let lookups: Vec<&KeyIndex> = required_in
        .iter()
        .filter_map(|t| keys_of(available, *t))
        .collect();
    let required_names = required_in
        .iter()
        .map(|t| t.name())
        .collect::<Vec<_>>()
        .join(" or ");

    for source in &rule.applies_to {
        let Some(keys) = keys_of(available, *source) else {
            continue;
        };
        for agg in keys.iter() {
            if lookups.iter().any(|idx| idx.contains(&agg.key)) {
                continue;
            }
            let key = agg.key.to_string();
            let detail = format!(
                "TAS {key} in {source} ({} row(s)) has no matching entry in {required_names}",
                agg.row_count
            );
            let text = message(
                rule,
                detail,
                &[("key", key.as_str()), ("submission", source.name())],
            );
            errors.push(ValidationError::cross_file(
                Some(*source),
                key,
                rule.id.as_str(),
                rule.severity,
                text,
            ));
        }
    }
}

fn amount_match(
    rule: &Rule,
    (left, left_field): (&KeyIndex, &str),
    (right, right_field): (&KeyIndex, &str),
    tolerance: Decimal,
    errors: &mut Vec<ValidationError>,
) {
    for agg in left.iter() {
        let Some(other) = right.get(&agg.key) else {
            continue;
        };
        let l = agg.sum(left_field);
        let r = other.sum(right_field);
        let difference = (l - r).abs();
        if difference <= tolerance {
            continue;
        }
        let key = agg.key.to_string();
        let detail = format!(
            "{}.{left_field} total {l} does not match {}.{right_field} total {r} for TAS {key} \
             (difference {difference}, tolerance {tolerance})",
            left.submission(),
            right.submission(),
        );
        let text = message(
            rule,
            detail,
            &[("key", key.as_str()), ("submission", left.submission().name())],
        );
        errors.push(ValidationError::cross_file(
            Some(left.submission()),
            key,
            rule.id.as_str(),
            rule.severity,
            text,
        ));
    }
}

fn award_link(
    available: &BTreeMap<SubmissionType, FileIndex>,
    rule: &Rule,
    target: SubmissionType,
    errors: &mut Vec<ValidationError>,
) {
    let identifiers = available
        .get(&target)
        .and_then(|f| f.awards.identifiers.get(&rule.id));

    for source in &rule.applies_to {
        let Some(references) = available
            .get(source)
            .and_then(|f| f.awards.references.get(&rule.id))
        else {
            continue;
        };
        for (award, rows) in references {
            if identifiers.is_some_and(|ids| ids.contains(award)) {
                continue;
            }
            let award_text = award.to_string();
            let detail = format!(
                "award {award_text} referenced by {source} row(s) {} does not exist in {target}",
                list_rows(rows)
            );
            let text = message(
                rule,
                detail,
                &[("key", award_text.as_str()), ("submission", source.name())],
            );
            errors.push(ValidationError::cross_file(
                Some(*source),
                award_text,
                rule.id.as_str(),
                rule.severity,
                text,
            ));
        }
    }
}

fn list_rows(rows: &[u64]) -> String {
    let shown: Vec<String> = rows
        .iter()
        .take(MAX_LISTED_ROWS)
        .map(|r| r.to_string())
        .collect();
    let mut out = shown.join(", ");
    if rows.len() > MAX_LISTED_ROWS {
        out.push_str(&format!(" and {} more", rows.len() - MAX_LISTED_ROWS));
    }
    out
}
