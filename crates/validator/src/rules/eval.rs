//! Row rule evaluator: interprets field- and row-scope predicates against
//! one row at a time. Rows are independent, so callers may evaluate them in
//! any order or in parallel.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::model::{Row, Severity, ValidationError};

use super::predicate::{is_blank, is_date_part, is_numeric};
use super::{Predicate, Rule, Scope};

/// Result of applying one predicate to one value or row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    /// Check failed; carries the default human-readable detail.
    Fail(String),
    /// Check could not be evaluated on this row.
    Unevaluable(String),
}

/// Evaluate every rule against a row. `rules` must already be filtered to
/// the row's submission and ordered by id; the output keeps that order.
pub fn evaluate_row(row: &Row, rules: &[&Rule]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for rule in rules {
        match rule.scope {
            Scope::Field => {
                for field in &rule.fields {
                    let outcome = check_field(rule, row, field);
                    if let Some(err) = to_error(rule, row, field, outcome) {
                        errors.push(err);
                    }
                }
            }
            Scope::Row => {
                let outcome = check_row(rule, row);
                if let Some(err) = to_error(rule, row, &rule.fields.join(","), outcome) {
                    errors.push(err);
                }
            }
            Scope::CrossFile => {}
        }
    }
    errors
}

fn to_error(rule: &Rule, row: &Row, target: &str, outcome: Outcome) -> Option<ValidationError> {
    let (severity, message) = match outcome {
        Outcome::Pass => return None,
        Outcome::Fail(detail) => {
            let value = if rule.scope == Scope::Field { row.value(target) } else { "" };
            let message = match &rule.message {
                Some(template) => {
                    let fields = rule.fields.join(", ");
                    let index = row.index.to_string();
                    render(
                        template,
                        &[
                            ("field", target),
                            ("fields", fields.as_str()),
                            ("value", value),
                            ("row", index.as_str()),
                            ("rule", rule.id.as_str()),
                            ("submission", row.submission.name()),
                            ("detail", detail.as_str()),
                        ],
                    )
                }
                None => detail,
            };
            (rule.severity, message)
        }
        Outcome::Unevaluable(reason) => (
            Severity::Error,
            format!("rule could not be evaluated: {reason}"),
        ),
    };

    Some(ValidationError::row(
        row.submission,
        row.index,
        target,
        rule.id.clone(),
        severity,
        message,
    ))
}

/// Substitute `{name}` placeholders. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

// ---------------------------------------------------------------------------
// Field scope
// ---------------------------------------------------------------------------

pub fn check_field(rule: &Rule, row: &Row, field: &str) -> Outcome {
    let Some(raw) = row.get(field) else {
        return Outcome::Unevaluable(format!("column '{field}' is not present in the row"));
    };
    let value = raw.trim();

    if let Predicate::Required = rule.predicate {
        return if value.is_empty() {
            Outcome::Fail(format!("{field} is required"))
        } else {
            Outcome::Pass
        };
    }

    // Format checks do not apply to blank values; blankness is `required`'s job.
    if value.is_empty() {
        return Outcome::Pass;
    }

    match &rule.predicate {
        Predicate::Numeric {
            allow_sign,
            allow_decimal,
            max_decimal_places,
        } => {
            if is_numeric(value, *allow_sign, *allow_decimal, *max_decimal_places) {
                Outcome::Pass
            } else {
                let mut shape = String::from(if *allow_decimal { "a number" } else { "a whole number" });
                if let Some(places) = max_decimal_places {
                    shape.push_str(&format!(" with at most {places} decimal place(s)"));
                }
                if !allow_sign {
                    shape.push_str(" without a sign");
                }
                Outcome::Fail(format!("{field} must be {shape}, found '{value}'"))
            }
        }
        Predicate::Length { exact, min, max } => {
            let len = value.chars().count();
            let ok = exact.map_or(true, |n| len == n)
                && min.map_or(true, |n| len >= n)
                && max.map_or(true, |n| len <= n);
            if ok {
                Outcome::Pass
            } else {
                let bound = match (exact, min, max) {
                    (Some(n), _, _) => format!("exactly {n}"),
                    (None, Some(lo), Some(hi)) => format!("between {lo} and {hi}"),
                    (None, Some(lo), None) => format!("at least {lo}"),
                    (None, None, Some(hi)) => format!("at most {hi}"),
                    (None, None, None) => "any number of".to_string(),
                };
                Outcome::Fail(format!(
                    "{field} must be {bound} character(s) long, found '{value}' ({len})"
                ))
            }
        }
        Predicate::Pattern { regex } => match &rule.pattern {
            Some(re) if re.is_match(value) => Outcome::Pass,
            Some(_) => Outcome::Fail(format!(
                "{field} does not match the required format {regex}, found '{value}'"
            )),
            None => Outcome::Unevaluable(format!("pattern for {field} was not compiled")),
        },
        Predicate::OneOf {
            values,
            ignore_case,
        } => {
            let hit = values.iter().any(|v| {
                if *ignore_case {
                    v.trim().eq_ignore_ascii_case(value)
                } else {
                    v.trim() == value
                }
            });
            if hit {
                Outcome::Pass
            } else {
                Outcome::Fail(format!(
                    "{field} must be one of {}, found '{value}'",
                    values.join(", ")
                ))
            }
        }
        Predicate::DatePart { part } => {
            if is_date_part(value, *part) {
                Outcome::Pass
            } else {
                Outcome::Fail(format!("{field} must be a {part}, found '{value}'"))
            }
        }
        other => Outcome::Unevaluable(format!(
            "'{}' is not a field-scope check",
            other.kind_name()
        )),
    }
}

// ---------------------------------------------------------------------------
// Row scope
// ---------------------------------------------------------------------------

pub fn check_row(rule: &Rule, row: &Row) -> Outcome {
    if let Some(missing) = rule.fields.iter().find(|f| row.get(f).is_none()) {
        return Outcome::Unevaluable(format!("column '{missing}' is not present in the row"));
    }

    match &rule.predicate {
        Predicate::RequiredIf { when, equals, then } => {
            let trigger = row.value(when).trim();
            if !equals.iter().any(|v| v.trim() == trigger) {
                return Outcome::Pass;
            }
            let blank: Vec<&str> = then
                .iter()
                .filter(|f| is_blank(row.value(f)))
                .map(String::as_str)
                .collect();
            if blank.is_empty() {
                Outcome::Pass
            } else {
                Outcome::Fail(format!(
                    "{} required when {when} is '{trigger}'",
                    blank.join(", ")
                ))
            }
        }
        Predicate::AnyPresent { any_of } => {
            if any_of.iter().any(|f| !is_blank(row.value(f))) {
                Outcome::Pass
            } else {
                Outcome::Fail(format!("at least one of {} is required", any_of.join(", ")))
            }
        }
        Predicate::ValidDate { day, month, year } => {
            let parts = [row.value(year), row.value(month), row.value(day)].map(str::trim);
            if parts.iter().any(|p| p.is_empty()) {
                return Outcome::Pass;
            }
            let parsed: Result<Vec<i64>, _> = parts.iter().map(|p| p.parse::<i64>()).collect();
            let Ok(nums) = parsed else {
                return Outcome::Unevaluable(format!(
                    "{year}/{month}/{day} are not all whole numbers"
                ));
            };
            let date = i32::try_from(nums[0]).ok().and_then(|y| {
                let m = u32::try_from(nums[1]).ok()?;
                let d = u32::try_from(nums[2]).ok()?;
                NaiveDate::from_ymd_opt(y, m, d)
            });
            match date {
                Some(_) => Outcome::Pass,
                None => Outcome::Fail(format!(
                    "{}-{}-{} ({year}, {month}, {day}) is not a valid calendar date",
                    parts[0], parts[1], parts[2]
                )),
            }
        }
        Predicate::NotAfter { earlier, later } => {
            let a = row.value(earlier).trim();
            let b = row.value(later).trim();
            if a.is_empty() || b.is_empty() {
                return Outcome::Pass;
            }
            match (a.parse::<Decimal>(), b.parse::<Decimal>()) {
                (Ok(x), Ok(y)) if x <= y => Outcome::Pass,
                (Ok(_), Ok(_)) => {
                    Outcome::Fail(format!("{earlier} ({a}) is after {later} ({b})"))
                }
                _ => Outcome::Unevaluable(format!(
                    "{earlier} '{a}' or {later} '{b}' is not numeric"
                )),
            }
        }
        other => Outcome::Unevaluable(format!(
            "'{}' is not a row-scope check",
            other.kind_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Columns, SubmissionType};
    use crate::rules::RuleRepository;
    use crate::schema::SchemaRegistry;
    use std::sync::Arc;

    const RULES: &str = r#"
[[rule]]
id = "AW-001"
scope = "field"
applies_to = ["award"]
fields = ["FainAwardNumber"]
severity = "error"
kind = "required"

[[rule]]
id = "AW-002"
scope = "field"
applies_to = ["award"]
fields = ["ActionDateMonth"]
severity = "error"
kind = "date_part"
part = "month"

[[rule]]
id = "AW-003"
scope = "field"
applies_to = ["award"]
fields = ["TypeOfAction"]
severity = "warning"
kind = "one_of"
values = ["A", "B", "C", "X"]
message = "row {row}: {field} '{value}' is not a known action ({detail})"

[[rule]]
id = "AW-004"
scope = "field"
applies_to = ["award"]
fields = ["NonFederalFundingAmount"]
severity = "error"
kind = "numeric"
max_decimal_places = 2

[[rule]]
id = "AW-005"
scope = "field"
applies_to = ["award"]
fields = ["AwardingAgencyCode"]
severity = "error"
kind = "length"
exact = 3

[[rule]]
id = "AW-100"
scope = "row"
applies_to = ["award"]
severity = "error"
kind = "required_if"
when = "TypeOfAction"
equals = ["X"]
then = ["ReasonForModification"]

[[rule]]
id = "AW-101"
scope = "row"
applies_to = ["award"]
severity = "error"
kind = "valid_date"
day = "ActionDateDay"
month = "ActionDateMonth"
year = "ActionDateYear"
"#;

    fn award_row(overrides: &[(&str, &str)]) -> Row {
        let registry = SchemaRegistry::builtin();
        let columns: Vec<String> = registry
            .schema_for(SubmissionType::Award)
            .unwrap()
            .columns()
            .to_vec();
        let values = columns
            .iter()
            .map(|c| {
                overrides
                    .iter()
                    .find(|(k, _)| k == c)
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_else(|| match c.as_str() {
                        "FainAwardNumber" => "FAIN-1".into(),
                        "ActionDateDay" => "15".into(),
                        "ActionDateMonth" => "06".into(),
                        "ActionDateYear" => "2016".into(),
                        "TypeOfAction" => "A".into(),
                        "AwardingAgencyCode" => "097".into(),
                        "NonFederalFundingAmount" => "100.00".into(),
                        _ => String::new(),
                    })
            })
            .collect();
        Row::new(SubmissionType::Award, 7, Arc::new(Columns::new(columns)), values)
    }

    fn eval(row: &Row) -> Vec<ValidationError> {
        let repo = RuleRepository::from_toml(RULES, &SchemaRegistry::builtin()).unwrap();
        let mut rules = repo.rules_for(SubmissionType::Award, Scope::Field);
        rules.extend(repo.rules_for(SubmissionType::Award, Scope::Row));
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        evaluate_row(row, &rules)
    }

    #[test]
    fn clean_row_has_no_errors() {
        assert!(eval(&award_row(&[])).is_empty());
    }

    #[test]
    fn one_violation_one_error() {
        let errors = eval(&award_row(&[("FainAwardNumber", "  ")]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule_id, "AW-001");
        assert_eq!(errors[0].target, "FainAwardNumber");
        assert_eq!(errors[0].row, Some(7));
        assert_eq!(errors[0].message, "FainAwardNumber is required");
    }

    #[test]
    fn template_placeholders() {
        let errors = eval(&award_row(&[("TypeOfAction", "Q")]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity, Severity::Warning);
        assert_eq!(
            errors[0].message,
            "row 7: TypeOfAction 'Q' is not a known action (TypeOfAction must be one of A, B, C, X, found 'Q')"
        );
    }

    #[test]
    fn conditional_requirement() {
        let errors = eval(&award_row(&[("TypeOfAction", "X")]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule_id, "AW-100");
        assert_eq!(errors[0].target, "TypeOfAction,ReasonForModification");
        assert!(errors[0].message.contains("ReasonForModification required when TypeOfAction is 'X'"));

        let ok = eval(&award_row(&[("TypeOfAction", "X"), ("ReasonForModification", "A")]));
        assert!(ok.is_empty());
    }

    #[test]
    fn calendar_date_checked_across_fields() {
        let errors = eval(&award_row(&[("ActionDateDay", "31"), ("ActionDateMonth", "02")]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule_id, "AW-101");
        assert!(errors[0].message.contains("2016-02-31"));
    }

    #[test]
    fn blank_values_skip_format_checks() {
        let errors = eval(&award_row(&[("NonFederalFundingAmount", ""), ("AwardingAgencyCode", "")]));
        assert!(errors.is_empty());
    }

    #[test]
    fn numeric_and_length_failures() {
        let errors = eval(&award_row(&[("NonFederalFundingAmount", "12.345"), ("AwardingAgencyCode", "97")]));
        let ids: Vec<&str> = errors.iter().map(|e| e.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["AW-004", "AW-005"]);
        assert!(errors[0].message.contains("at most 2 decimal place(s)"));
    }

    #[test]
    fn unevaluable_date_is_error_citing_rule() {
        let errors = eval(&award_row(&[("ActionDateYear", "20x6")]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule_id, "AW-101");
        assert_eq!(errors[0].severity, Severity::Error);
        assert!(errors[0].message.starts_with("rule could not be evaluated"));
    }

    #[test]
    fn render_leaves_unknown_placeholders() {
        assert_eq!(render("{a} and {b}", &[("a", "1")]), "1 and {b}");
    }
}
