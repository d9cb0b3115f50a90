//! Key indexer: single-pass, per-file aggregation of rows by TAS, plus the
//! award identifier index used by `award_link` checks.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::model::{BudgetaryKey, Row, SubmissionType};
use crate::rules::predicate::is_numeric;
use crate::rules::{Predicate, Rule, RuleRepository};
use crate::schema::Schema;

/// Parse an amount as an exact signed decimal. Uses the same grammar as the
/// `numeric` rule, so a value that rule rejects contributes nothing. Blank or
/// unparseable values yield `None`; the caller treats them as zero.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if !is_numeric(s, true, true, None) {
        return None;
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    Decimal::from_str(s).ok()
}

// ---------------------------------------------------------------------------
// TAS aggregates
// ---------------------------------------------------------------------------

/// Rows of one submission sharing one TAS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyAggregate {
    pub key: BudgetaryKey,
    pub submission: SubmissionType,
    pub row_count: usize,
    /// Exact sum per reconcilable amount field.
    pub sums: BTreeMap<String, Decimal>,
}

impl KeyAggregate {
    pub fn sum(&self, field: &str) -> Decimal {
        self.sums.get(field).copied().unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIndex {
    submission: SubmissionType,
    amount_fields: Vec<String>,
    aggregates: BTreeMap<BudgetaryKey, KeyAggregate>,
}

impl KeyIndex {
    pub fn new(submission: SubmissionType, amount_fields: Vec<String>) -> Self {
        Self {
            submission,
            amount_fields,
            aggregates: BTreeMap::new(),
        }
    }

    /// Build an index from a row sequence in one pass.
    pub fn index<'a>(
        rows: impl IntoIterator<Item = &'a Row>,
        submission: SubmissionType,
        amount_fields: &[String],
    ) -> Self {
        let mut index = Self::new(submission, amount_fields.to_vec());
        for row in rows {
            index.add(row);
        }
        index
    }

    pub fn add(&mut self, row: &Row) {
        let key = BudgetaryKey::from_row(row);
        let submission = self.submission;
        let amount_fields = &self.amount_fields;
        let entry = self
            .aggregates
            .entry(key.clone())
            .or_insert_with(|| KeyAggregate {
                key,
                submission,
                row_count: 0,
                sums: amount_fields
                    .iter()
                    .map(|f| (f.clone(), Decimal::ZERO))
                    .collect(),
            });
        entry.row_count += 1;
        for field in amount_fields {
            if let Some(amount) = parse_amount(row.value(field)) {
                if let Some(sum) = entry.sums.get_mut(field) {
                    *sum = sum.saturating_add(amount);
                }
            }
        }
    }

    /// Fold another partial index of the same submission into this one.
    pub fn merge(&mut self, other: KeyIndex) {
        for (key, agg) in other.aggregates {
            match self.aggregates.get_mut(&key) {
                Some(existing) => {
                    existing.row_count += agg.row_count;
                    for (field, amount) in agg.sums {
                        let sum = existing.sums.entry(field).or_insert(Decimal::ZERO);
                        *sum = sum.saturating_add(amount);
                    }
                }
                None => {
                    self.aggregates.insert(key, agg);
                }
            }
        }
    }

    pub fn submission(&self) -> SubmissionType {
        self.submission
    }

    pub fn get(&self, key: &BudgetaryKey) -> Option<&KeyAggregate> {
        self.aggregates.get(key)
    }

    pub fn contains(&self, key: &BudgetaryKey) -> bool {
        self.aggregates.contains_key(key)
    }

    /// Aggregates in key order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyAggregate> {
        self.aggregates.values()
    }

    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Award identifiers
// ---------------------------------------------------------------------------

/// Values of an `award_link` rule's link fields, in rule order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AwardRef(pub Vec<String>);

impl AwardRef {
    fn from_row(row: &Row, fields: &[String]) -> Self {
        Self(fields.iter().map(|f| row.value(f).to_string()).collect())
    }

    fn is_blank(&self) -> bool {
        self.0.iter().all(|v| v.trim().is_empty())
    }
}

impl std::fmt::Display for AwardRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwardIndex {
    /// Identifiers present in a link target, per rule id.
    pub identifiers: BTreeMap<String, BTreeSet<AwardRef>>,
    /// Identifiers referenced by a link source, per rule id, with referencing rows.
    pub references: BTreeMap<String, BTreeMap<AwardRef, Vec<u64>>>,
}

// ---------------------------------------------------------------------------
// Per-file indexer
// ---------------------------------------------------------------------------

/// Everything the reconciler needs from one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIndex {
    pub submission: SubmissionType,
    /// `None` when the submission does not carry the TAS columns.
    pub keys: Option<KeyIndex>,
    pub awards: AwardIndex,
}

struct LinkRole {
    rule_id: String,
    fields: Vec<String>,
    is_source: bool,
    is_target: bool,
}

/// Incremental builder for a `FileIndex`; rows may be fed in any order.
pub struct FileIndexer {
    submission: SubmissionType,
    keys: Option<KeyIndex>,
    links: Vec<LinkRole>,
    awards: AwardIndex,
}

impl FileIndexer {
    pub fn new(schema: &Schema, rules: &RuleRepository) -> Self {
        let submission = schema.submission();
        let keys = schema
            .has_budgetary_key()
            .then(|| KeyIndex::new(submission, rules.reconcilable_fields(submission)));
        let links = rules
            .cross_file_rules()
            .into_iter()
            .filter_map(|rule| link_role(rule, submission))
            .collect();
        Self {
            submission,
            keys,
            links,
            awards: AwardIndex::default(),
        }
    }

    pub fn add(&mut self, row: &Row) {
        if let Some(keys) = self.keys.as_mut() {
            keys.add(row);
        }
        for link in &self.links {
            let award = AwardRef::from_row(row, &link.fields);
            if award.is_blank() {
                continue;
            }
            if link.is_target {
                self.awards
                    .identifiers
                    .entry(link.rule_id.clone())
                    .or_default()
                    .insert(award.clone());
            }
            if link.is_source {
                self.awards
                    .references
                    .entry(link.rule_id.clone())
                    .or_default()
                    .entry(award)
                    .or_default()
                    .push(row.index);
            }
        }
    }

    pub fn finish(mut self) -> FileIndex {
        for refs in self.awards.references.values_mut() {
            for rows in refs.values_mut() {
                rows.sort_unstable();
            }
        }
        FileIndex {
            submission: self.submission,
            keys: self.keys,
            awards: self.awards,
        }
    }
}

fn link_role(rule: &Rule, submission: SubmissionType) -> Option<LinkRole> {
    let Predicate::AwardLink { target, link_fields } = &rule.predicate else {
        return None;
    };
    let is_source = rule.applies(submission);
    let is_target = *target == submission;
    (is_source || is_target).then(|| LinkRole {
        rule_id: rule.id.clone(),
        fields: link_fields.clone(),
        is_source,
        is_target,
    })
}
