use std::path::PathBuf;
use std::sync::Arc;

use dataact_validator::report::FileStatus;
use dataact_validator::{
    Location, RuleRepository, SchemaRegistry, Severity, SubmissionInput, SubmissionType,
    ValidationReport, Validator, ValidatorConfig,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn rules_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../rules")
}

fn validator() -> Validator {
    let schemas = SchemaRegistry::builtin();
    let rules = RuleRepository::load(&rules_dir(), &schemas).unwrap();
    Validator::new(Arc::new(schemas), Arc::new(rules))
}

/// The four files of a scenario. Files the scenario directory does not
/// override come from `valid/`.
fn scenario(name: &str) -> Vec<SubmissionInput> {
    SubmissionType::ALL
        .iter()
        .map(|t| {
            let overridden = fixtures_dir().join(name).join(t.file_name());
            let path = if overridden.exists() {
                overridden
            } else {
                fixtures_dir().join("valid").join(t.file_name())
            };
            SubmissionInput::from_path(*t, &path)
                .unwrap_or_else(|e| panic!("cannot open {}: {e}", path.display()))
        })
        .collect()
}

fn run(name: &str) -> ValidationReport {
    validator().validate(scenario(name))
}

// -------------------------------------------------------------------------
// Scenarios
// -------------------------------------------------------------------------

#[test]
fn default_rules_load() {
    let schemas = SchemaRegistry::builtin();
    let rules = RuleRepository::load(&rules_dir(), &schemas).unwrap();
    assert!(rules.get("C-100").is_some());
    assert!(rules.get("AF-010").is_some());
    assert!(rules.get("C-310").is_some());
    assert_eq!(rules.cross_file_rules().len(), 5);
}

#[test]
fn clean_period_has_no_entries() {
    let report = run("valid");
    assert!(report.errors.is_empty(), "{:#?}", report.errors);
    assert!(report.structurally_valid);
    assert!(!report.has_errors());
    assert_eq!(report.summary.rows_read, 10);
    for outcome in &report.files {
        assert_eq!(outcome.status, FileStatus::Valid);
    }
}

#[test]
fn missing_column_fails_only_that_file() {
    let report = run("missing_column");

    let header: Vec<_> = report
        .errors
        .iter()
        .filter(|e| e.location == Location::Header)
        .collect();
    assert_eq!(header.len(), 1);
    assert_eq!(header[0].submission, Some(SubmissionType::Appropriation));
    assert_eq!(header[0].rule_id, "schema");
    assert!(header[0].message.contains("MainAccountCode"), "{}", header[0].message);

    let approp = report.outcome(SubmissionType::Appropriation).unwrap();
    assert_eq!(approp.status, FileStatus::HeaderInvalid);
    assert_eq!(approp.rows_read, 0);

    // The other three files are still read and checked in full.
    for (t, rows) in [
        (SubmissionType::ObjectClassProgramActivity, 3),
        (SubmissionType::Award, 2),
        (SubmissionType::AwardFinancial, 3),
    ] {
        let outcome = report.outcome(t).unwrap();
        assert_eq!(outcome.status, FileStatus::Valid, "{t}");
        assert_eq!(outcome.rows_read, rows, "{t}");
    }

    // Presence checks need the appropriation file and are skipped, not failed.
    assert!(!report.errors.iter().any(|e| e.rule_id == "C-100" || e.rule_id == "C-110"));
    let notice = report
        .errors
        .iter()
        .find(|e| e.severity == Severity::Info)
        .unwrap();
    assert_eq!(notice.rule_id, "reconciliation");
    assert!(notice.message.contains("appropriation"));
    assert!(notice.message.contains("C-100, C-110"), "{}", notice.message);

    assert_eq!(report.errors.len(), 2, "{:#?}", report.errors);
    assert!(!report.structurally_valid);
}

#[test]
fn unparseable_amount_is_one_field_error_and_counts_as_zero() {
    let report = run("bad_amount");

    let amount: Vec<_> = report.errors.iter().filter(|e| e.rule_id == "AF-010").collect();
    assert_eq!(amount.len(), 1, "{:#?}", report.errors);
    assert_eq!(amount[0].submission, Some(SubmissionType::AwardFinancial));
    assert_eq!(amount[0].row, Some(2));
    assert_eq!(amount[0].target, "TransactionObligatedAmount");
    assert!(amount[0].message.contains("'abc'"));

    // 500.00 + 0 on the AF side against 600.00 + 150.50 on the OCPA side.
    let mismatch: Vec<_> = report.errors.iter().filter(|e| e.rule_id == "C-200").collect();
    assert_eq!(mismatch.len(), 1);
    assert_eq!(mismatch[0].target, "/097/2016/2017//0100");
    assert!(mismatch[0].message.contains("750.50"), "{}", mismatch[0].message);
    assert!(mismatch[0].message.contains("500.00"), "{}", mismatch[0].message);

    assert_eq!(report.errors.len(), 2, "{:#?}", report.errors);
    assert!(report.structurally_valid);
}

#[test]
fn orphan_key_is_error_and_idle_appropriation_is_warning() {
    let report = run("orphan_key");
    assert_eq!(report.errors.len(), 2, "{:#?}", report.errors);

    let orphan = &report.errors[0];
    assert_eq!(orphan.rule_id, "C-100");
    assert_eq!(orphan.severity, Severity::Error);
    assert_eq!(orphan.submission, Some(SubmissionType::ObjectClassProgramActivity));
    assert_eq!(orphan.target, "/097/2016/2017//0300");
    assert!(orphan.message.contains("/097/2016/2017//0300"));

    let idle = &report.errors[1];
    assert_eq!(idle.rule_id, "C-110");
    assert_eq!(idle.severity, Severity::Warning);
    assert_eq!(idle.target, "/097/2016/2017//0400");

    assert_eq!(report.summary.errors, 1);
    assert_eq!(report.summary.warnings, 1);
}

#[test]
fn unmatched_award_is_one_error_naming_its_rows() {
    let report = run("unmatched_award");
    assert!(report.structurally_valid);

    let links: Vec<_> = report.errors.iter().filter(|e| e.rule_id == "C-300").collect();
    assert_eq!(links.len(), 1, "{:#?}", report.errors);
    let link = links[0];
    assert_eq!(link.location, Location::CrossFile);
    assert_eq!(link.submission, Some(SubmissionType::AwardFinancial));
    assert_eq!(link.severity, Severity::Error);
    assert_eq!(link.target, "FAIN0009");
    assert_eq!(
        link.message,
        "award FAIN0009 referenced by award_financial row(s) 1, 3 does not exist in award"
    );
    // amounts are unchanged, so nothing else fires
    assert_eq!(report.errors.len(), 1, "{:#?}", report.errors);
}

#[test]
fn unknown_parent_award_is_reported() {
    let report = run("unmatched_parent");

    let parents: Vec<_> = report.errors.iter().filter(|e| e.rule_id == "C-310").collect();
    assert_eq!(parents.len(), 1, "{:#?}", report.errors);
    assert_eq!(parents[0].target, "PRE/2015/A/PARENT-999");
    assert!(
        parents[0].message.starts_with("parent award PRE/2015/A/PARENT-999"),
        "{}",
        parents[0].message
    );
    assert!(parents[0].message.contains("row(s) 1 "));
    // the row's FAIN still links, and rows without a parent are not references
    assert_eq!(report.errors.len(), 1, "{:#?}", report.errors);
}

#[test]
fn identical_input_gives_identical_report() {
    let first = serde_json::to_string_pretty(&run("bad_amount")).unwrap();
    let second = serde_json::to_string_pretty(&run("bad_amount")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn batch_size_does_not_change_the_report() {
    let default = run("bad_amount");
    let single = validator().with_batch_size(1).validate(scenario("bad_amount"));
    assert_eq!(default, single);
}

#[test]
fn missing_file_is_reported_and_dependent_checks_skipped() {
    let inputs: Vec<_> = scenario("valid")
        .into_iter()
        .filter(|i| i.submission != SubmissionType::Award)
        .collect();
    let report = validator().validate(inputs);

    let upload: Vec<_> = report.errors.iter().filter(|e| e.rule_id == "upload").collect();
    assert_eq!(upload.len(), 1);
    assert_eq!(upload[0].submission, Some(SubmissionType::Award));
    assert_eq!(upload[0].message, "file not uploaded");
    assert_eq!(
        report.outcome(SubmissionType::Award).unwrap().status,
        FileStatus::NotUploaded
    );

    let notice = report
        .errors
        .iter()
        .find(|e| e.rule_id == "reconciliation")
        .unwrap();
    assert!(notice.message.contains("C-300"));
    assert!(!notice.message.contains("C-100"));
    assert_eq!(report.errors.len(), 2, "{:#?}", report.errors);
}

#[test]
fn config_tolerance_applies_to_amount_checks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataact.toml");
    std::fs::write(
        &path,
        format!(
            "[rules]\ndir = {:?}\n\n[reconciliation]\ntolerance = \"300.00\"\n",
            rules_dir().display().to_string()
        ),
    )
    .unwrap();

    let config = ValidatorConfig::load(&path).unwrap();
    let validator = Validator::from_config(&config).unwrap();
    let report = validator.validate(scenario("bad_amount"));
    assert!(!report.errors.iter().any(|e| e.rule_id == "C-200"));
    assert!(report.errors.iter().any(|e| e.rule_id == "AF-010"));
}

#[test]
fn report_serializes_expected_shape() {
    let report = run("orphan_key");
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["structurally_valid"], true);
    assert_eq!(json["summary"]["warnings"], 1);
    assert_eq!(json["files"][0]["submission"], "appropriation");
    assert_eq!(json["files"][0]["status"], "valid");
    assert_eq!(json["errors"][0]["location"], "cross_file");
    assert_eq!(json["errors"][0]["severity"], "error");
    assert!(json["errors"][0].get("row").is_none());
}
