//! Rule loading and validation.
//!
//! Rules live in TOML files, one `[[rule]]` table per rule:
//!
//! ```toml
//! [[rule]]
//! id = "AF-030"
//! scope = "field"
//! applies_to = ["award_financial"]
//! fields = ["TransactionObligatedAmount"]
//! severity = "error"
//! kind = "numeric"
//! max_decimal_places = 2
//! message = "{field} must be a dollar amount, found '{value}'"
//! ```
//!
//! A rules directory is read in file-name order. Every rule is checked
//! against the schema registry at load time; a single bad rule rejects the
//! whole set.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::RuleLoadError;
use crate::model::{Severity, SubmissionType, KEY_COLUMNS};
use crate::schema::{Schema, SchemaRegistry};

use super::{Predicate, Rule, Scope};

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rule: Vec<RuleDef>,
}

#[derive(Debug, Deserialize)]
struct RuleDef {
    id: String,
    scope: Scope,
    #[serde(default)]
    applies_to: Vec<SubmissionType>,
    #[serde(default)]
    fields: Vec<String>,
    severity: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    predicate: Predicate,
}

/// Immutable, id-ordered rule snapshot.
#[derive(Debug, Clone, Default)]
pub struct RuleRepository {
    rules: Vec<Rule>,
}

impl RuleRepository {
    /// Parse rules from one TOML document.
    pub fn from_toml(input: &str, schemas: &SchemaRegistry) -> Result<Self, RuleLoadError> {
        Self::from_sources(vec![("<inline>".to_string(), input.to_string())], schemas)
    }

    /// Load rules from a directory of `*.toml` files or from a single file.
    pub fn load(path: &Path, schemas: &SchemaRegistry) -> Result<Self, RuleLoadError> {
        let io_err = |e: std::io::Error| RuleLoadError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let mut files = Vec::new();
        if path.is_dir() {
            for entry in std::fs::read_dir(path).map_err(io_err)? {
                let entry_path = entry.map_err(io_err)?.path();
                if entry_path.extension().is_some_and(|ext| ext == "toml") {
                    files.push(entry_path);
                }
            }
            files.sort();
        } else {
            files.push(path.to_path_buf());
        }

        let mut sources = Vec::with_capacity(files.len());
        for file in files {
            let text = std::fs::read_to_string(&file).map_err(|e| RuleLoadError::Io {
                path: file.display().to_string(),
                message: e.to_string(),
            })?;
            sources.push((file.display().to_string(), text));
        }

        if sources.is_empty() {
            tracing::warn!(path = %path.display(), "no rule files found");
        }

        Self::from_sources(sources, schemas)
    }

    fn from_sources(
        sources: Vec<(String, String)>,
        schemas: &SchemaRegistry,
    ) -> Result<Self, RuleLoadError> {
        let mut rules = Vec::new();
        let mut seen = HashSet::new();

        for (source_name, text) in sources {
            let file: RuleFile = toml::from_str(&text).map_err(|e| RuleLoadError::Parse {
                source_name: source_name.clone(),
                message: e.to_string(),
            })?;

            for def in file.rule {
                let rule = compile(def, schemas)?;
                if !seen.insert(rule.id.clone()) {
                    return Err(RuleLoadError::DuplicateId(rule.id));
                }
                rules.push(rule);
            }
        }

        rules.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::info!(rules = rules.len(), "loaded rule set");
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Applicable rules of one scope, by rule id ascending.
    pub fn rules_for(&self, submission: SubmissionType, scope: Scope) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.scope == scope && r.applies(submission))
            .collect()
    }

    pub fn cross_file_rules(&self) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.scope == Scope::CrossFile)
            .collect()
    }

    /// Amount fields `amount_match` rules compare for this submission. These
    /// are the fields the key indexer sums.
    pub fn reconcilable_fields(&self, submission: SubmissionType) -> Vec<String> {
        let mut fields = BTreeSet::new();
        for rule in &self.rules {
            if let Predicate::AmountMatch { left, right, .. } = &rule.predicate {
                for side in [left, right] {
                    if side.submission == submission {
                        fields.insert(side.field.clone());
                    }
                }
            }
        }
        fields.into_iter().collect()
    }

    pub fn count_by_scope(&self) -> BTreeMap<Scope, usize> {
        let mut counts = BTreeMap::new();
        for rule in &self.rules {
            *counts.entry(rule.scope).or_insert(0) += 1;
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn compile(def: RuleDef, schemas: &SchemaRegistry) -> Result<Rule, RuleLoadError> {
    let id = def.id.trim().to_string();
    if id.is_empty() {
        return Err(RuleLoadError::invalid("<blank>", "rule id is blank"));
    }

    let severity = Severity::parse_rule_severity(&def.severity).ok_or_else(|| {
        RuleLoadError::UnknownSeverity {
            rule: id.clone(),
            value: def.severity.clone(),
        }
    })?;

    let mut predicate = def.predicate;
    if predicate.scope() != def.scope {
        return Err(RuleLoadError::invalid(
            &id,
            format!(
                "kind '{}' is a {}-scope check but the rule declares scope '{}'",
                predicate.kind_name(),
                predicate.scope(),
                def.scope
            ),
        ));
    }

    let mut applies_to: BTreeSet<SubmissionType> = def.applies_to.iter().copied().collect();
    if let Predicate::AmountMatch { left, right, .. } = &predicate {
        applies_to.insert(left.submission);
        applies_to.insert(right.submission);
    }
    if applies_to.is_empty() {
        return Err(RuleLoadError::invalid(&id, "applies_to is empty"));
    }
    let applies_to: Vec<SubmissionType> = applies_to.into_iter().collect();

    let schema = |t: SubmissionType| {
        schemas
            .schema_for(t)
            .map_err(|e| RuleLoadError::invalid(&id, e.to_string()))
    };

    let mut pattern = None;
    let mut tolerance = None;

    let fields = match def.scope {
        Scope::Field => {
            if def.fields.is_empty() {
                return Err(RuleLoadError::invalid(&id, "field rules need at least one field"));
            }
            check_field_params(&id, &predicate, &mut pattern)?;
            canonical_fields(&id, &def.fields, &applies_to, &schema)?
        }
        Scope::Row => {
            reject_top_level_fields(&id, &def.fields)?;
            check_row_params(&id, &predicate)?;
            canonical_fields(&id, &predicate.row_fields(), &applies_to, &schema)?
        }
        Scope::CrossFile => {
            reject_top_level_fields(&id, &def.fields)?;
            match &mut predicate {
                Predicate::KeyPresence { required_in } => {
                    if required_in.is_empty() {
                        return Err(RuleLoadError::invalid(&id, "required_in is empty"));
                    }
                    required_in.sort();
                    required_in.dedup();
                    let involved: BTreeSet<SubmissionType> =
                        applies_to.iter().chain(required_in.iter()).copied().collect();
                    for t in involved {
                        require_key_columns(&id, schema(t)?)?;
                    }
                    KEY_COLUMNS.iter().map(|c| c.to_string()).collect()
                }
                Predicate::AmountMatch {
                    left,
                    right,
                    tolerance: raw_tolerance,
                } => {
                    for side in [&mut *left, &mut *right] {
                        let s = schema(side.submission)?;
                        require_key_columns(&id, s)?;
                        side.field = canonical(&id, s, &side.field)?;
                    }
                    if let Some(raw) = raw_tolerance {
                        let parsed = Decimal::from_str(raw.trim()).map_err(|e| {
                            RuleLoadError::invalid(&id, format!("invalid tolerance '{raw}': {e}"))
                        })?;
                        if parsed.is_sign_negative() {
                            return Err(RuleLoadError::invalid(&id, "tolerance must not be negative"));
                        }
                        tolerance = Some(parsed);
                    }
                    vec![left.field.clone(), right.field.clone()]
                }
                Predicate::AwardLink {
                    target,
                    link_fields,
                } => {
                    if link_fields.is_empty() {
                        return Err(RuleLoadError::invalid(&id, "link_fields is empty"));
                    }
                    if applies_to.contains(target) {
                        return Err(RuleLoadError::invalid(
                            &id,
                            format!("award_link target {target} cannot also be a source"),
                        ));
                    }
                    let mut involved = applies_to.clone();
                    involved.push(*target);
                    let canon = canonical_fields(&id, link_fields, &involved, &schema)?;
                    *link_fields = canon.clone();
                    canon
                }
                _ => unreachable!("scope checked above"),
            }
        }
    };

    Ok(Rule {
        id,
        scope: def.scope,
        applies_to,
        fields,
        predicate,
        severity,
        message: def.message.filter(|m| !m.trim().is_empty()),
        tolerance,
        pattern,
    })
}

fn reject_top_level_fields(id: &str, fields: &[String]) -> Result<(), RuleLoadError> {
    if fields.is_empty() {
        Ok(())
    } else {
        Err(RuleLoadError::invalid(
            id,
            "`fields` is only valid on field-scope rules; name row and cross-file fields in the check itself",
        ))
    }
}

fn check_field_params(
    id: &str,
    predicate: &Predicate,
    pattern: &mut Option<Regex>,
) -> Result<(), RuleLoadError> {
    match predicate {
        Predicate::Pattern { regex } => {
            let compiled = Regex::new(&format!("^(?:{regex})$"))
                .map_err(|e| RuleLoadError::invalid(id, format!("invalid regex: {e}")))?;
            *pattern = Some(compiled);
        }
        Predicate::OneOf { values, .. } if values.is_empty() => {
            return Err(RuleLoadError::invalid(id, "one_of needs at least one value"));
        }
        Predicate::Length { exact, min, max } => {
            if exact.is_none() && min.is_none() && max.is_none() {
                return Err(RuleLoadError::invalid(id, "length needs exact, min or max"));
            }
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    return Err(RuleLoadError::invalid(id, "length min is greater than max"));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_row_params(id: &str, predicate: &Predicate) -> Result<(), RuleLoadError> {
    match predicate {
        Predicate::RequiredIf { equals, then, .. } => {
            if equals.is_empty() || then.is_empty() {
                return Err(RuleLoadError::invalid(id, "required_if needs equals and then"));
            }
        }
        Predicate::AnyPresent { any_of } if any_of.len() < 2 => {
            return Err(RuleLoadError::invalid(id, "any_present needs at least two fields"));
        }
        _ => {}
    }
    Ok(())
}

fn require_key_columns(id: &str, schema: &Schema) -> Result<(), RuleLoadError> {
    match KEY_COLUMNS.iter().find(|c| !schema.contains(c)) {
        Some(missing) => Err(RuleLoadError::UnknownField {
            rule: id.to_string(),
            field: missing.to_string(),
            submission: schema.submission().to_string(),
        }),
        None => Ok(()),
    }
}

fn canonical(id: &str, schema: &Schema, field: &str) -> Result<String, RuleLoadError> {
    schema
        .canonical(field)
        .map(str::to_string)
        .ok_or_else(|| RuleLoadError::UnknownField {
            rule: id.to_string(),
            field: field.to_string(),
            submission: schema.submission().to_string(),
        })
}

/// Check every field against every applicable schema; return schema spellings.
fn canonical_fields<'a>(
    id: &str,
    fields: &[String],
    submissions: &[SubmissionType],
    schema: &dyn Fn(SubmissionType) -> Result<&'a Schema, RuleLoadError>,
) -> Result<Vec<String>, RuleLoadError> {
    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        let mut spelled = None;
        for &t in submissions {
            let name = canonical(id, schema(t)?, field)?;
            spelled.get_or_insert(name);
        }
        out.push(spelled.unwrap_or_else(|| field.trim().to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(input: &str) -> Result<RuleRepository, RuleLoadError> {
        RuleRepository::from_toml(input, &SchemaRegistry::builtin())
    }

    const TWO_RULES: &str = r#"
[[rule]]
id = "A2"
scope = "field"
applies_to = ["appropriation"]
fields = ["MainAccountCode"]
severity = "error"
kind = "pattern"
regex = "[0-9]{4}"

[[rule]]
id = "A1"
scope = "field"
applies_to = ["appropriation", "award_financial"]
fields = ["agencyidentifier"]
severity = "warning"
kind = "required"
"#;

    #[test]
    fn loads_and_orders_by_id() {
        let repo = load(TWO_RULES).unwrap();
        assert_eq!(repo.len(), 2);
        let ids: Vec<&str> = repo
            .rules_for(SubmissionType::Appropriation, Scope::Field)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["A1", "A2"]);
        assert_eq!(repo.rules_for(SubmissionType::AwardFinancial, Scope::Field).len(), 1);
        assert!(repo.rules_for(SubmissionType::Award, Scope::Field).is_empty());
        // canonical spelling from the schema
        assert_eq!(repo.get("A1").unwrap().fields, vec!["AgencyIdentifier".to_string()]);
        assert_eq!(repo.get("A1").unwrap().severity, Severity::Warning);
    }

    #[test]
    fn rejects_duplicate_id() {
        let input = format!("{TWO_RULES}\n{}", &TWO_RULES[..TWO_RULES.find("[[rule]]\nid = \"A1\"").unwrap()]);
        let err = load(&input).unwrap_err();
        assert!(matches!(err, RuleLoadError::DuplicateId(ref id) if id == "A2"));
    }

    #[test]
    fn rejects_unknown_field() {
        let input = r#"
[[rule]]
id = "X1"
scope = "field"
applies_to = ["award"]
fields = ["MainAccountCode"]
severity = "error"
kind = "required"
"#;
        let err = load(input).unwrap_err();
        assert!(matches!(err, RuleLoadError::UnknownField { ref field, .. } if field == "MainAccountCode"));
        assert!(err.to_string().contains("not a column of award"));
    }

    #[test]
    fn rejects_unknown_severity() {
        let input = r#"
[[rule]]
id = "X1"
scope = "field"
applies_to = ["award"]
fields = ["FainAwardNumber"]
severity = "fatal"
kind = "required"
"#;
        let err = load(input).unwrap_err();
        assert!(matches!(err, RuleLoadError::UnknownSeverity { ref value, .. } if value == "fatal"));
    }

    #[test]
    fn rejects_unknown_kind() {
        let input = r#"
[[rule]]
id = "X1"
scope = "field"
applies_to = ["award"]
fields = ["FainAwardNumber"]
severity = "error"
kind = "telepathy"
"#;
        assert!(matches!(load(input).unwrap_err(), RuleLoadError::Parse { .. }));
    }

    #[test]
    fn rejects_scope_mismatch() {
        let input = r#"
[[rule]]
id = "X1"
scope = "row"
applies_to = ["award"]
fields = ["FainAwardNumber"]
severity = "error"
kind = "required"
"#;
        let err = load(input).unwrap_err();
        assert!(err.to_string().contains("field-scope check"));
    }

    #[test]
    fn rejects_bad_regex() {
        let input = r#"
[[rule]]
id = "X1"
scope = "field"
applies_to = ["award"]
fields = ["FainAwardNumber"]
severity = "error"
kind = "pattern"
regex = "([0-9]"
"#;
        let err = load(input).unwrap_err();
        assert!(err.to_string().contains("invalid regex"));
    }

    #[test]
    fn row_rule_fields_checked() {
        let input = r#"
[[rule]]
id = "AW-100"
scope = "row"
applies_to = ["award"]
severity = "error"
kind = "required_if"
when = "TypeOfAction"
equals = ["X"]
then = ["ReasonForModification"]
"#;
        let repo = load(input).unwrap();
        let rule = repo.get("AW-100").unwrap();
        assert_eq!(rule.fields, vec!["TypeOfAction".to_string(), "ReasonForModification".to_string()]);

        let bad = input.replace("ReasonForModification", "ReasonForMod");
        assert!(matches!(load(&bad).unwrap_err(), RuleLoadError::UnknownField { .. }));
    }

    #[test]
    fn amount_match_derives_applies_to_and_reconcilable_fields() {
        let input = r#"
[[rule]]
id = "C-200"
scope = "cross_file"
severity = "error"
kind = "amount_match"
left = { submission = "object_class_program_activity", field = "obligatedamount" }
right = { submission = "award_financial", field = "TransactionObligatedAmount" }
tolerance = "0.01"
"#;
        let repo = load(input).unwrap();
        let rule = repo.get("C-200").unwrap();
        assert_eq!(
            rule.applies_to,
            vec![SubmissionType::ObjectClassProgramActivity, SubmissionType::AwardFinancial]
        );
        assert_eq!(rule.tolerance, Some(Decimal::new(1, 2)));
        assert_eq!(
            repo.reconcilable_fields(SubmissionType::ObjectClassProgramActivity),
            vec!["ObligatedAmount".to_string()]
        );
        assert!(repo.reconcilable_fields(SubmissionType::Appropriation).is_empty());
    }

    #[test]
    fn key_presence_requires_key_columns() {
        let input = r#"
[[rule]]
id = "C-100"
scope = "cross-file"
applies_to = ["award"]
severity = "error"
kind = "key_presence"
required_in = ["appropriation"]
"#;
        let err = load(input).unwrap_err();
        assert!(err.to_string().contains("AllocationTransferAgencyIdentifier"));
    }

    #[test]
    fn award_link_fields_must_exist_on_both_sides() {
        let input = r#"
[[rule]]
id = "C-300"
scope = "cross_file"
applies_to = ["award_financial"]
severity = "error"
kind = "award_link"
target = "award"
link_fields = ["ParentAwardNumber", "ObjectClass"]
"#;
        let err = load(input).unwrap_err();
        assert!(matches!(err, RuleLoadError::UnknownField { ref submission, .. } if submission == "award"));
    }

    #[test]
    fn load_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.toml"), &TWO_RULES[TWO_RULES.find("[[rule]]\nid = \"A1\"").unwrap()..]).unwrap();
        std::fs::write(dir.path().join("a.toml"), &TWO_RULES[..TWO_RULES.find("[[rule]]\nid = \"A1\"").unwrap()]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let repo = RuleRepository::load(dir.path(), &SchemaRegistry::builtin()).unwrap();
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.count_by_scope().get(&Scope::Field), Some(&2));
    }

    #[test]
    fn load_missing_path_is_io_error() {
        let err = RuleRepository::load(Path::new("/nonexistent/rules.toml"), &SchemaRegistry::builtin())
            .unwrap_err();
        assert!(matches!(err, RuleLoadError::Io { .. }));
    }
}
