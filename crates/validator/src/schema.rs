//! Schema registry: required column set per submission type.
//!
//! The built-in registry carries the column lists of the four submission
//! templates. An external TOML file with the same shape can replace it
//! without engine changes:
//!
//! ```toml
//! [appropriation]
//! columns = ["AllocationTransferAgencyIdentifier", "AgencyIdentifier", ...]
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::error::ValidatorError;
use crate::model::{normalize_column, SubmissionType, KEY_COLUMNS};

// ---------------------------------------------------------------------------
// Built-in column lists
// ---------------------------------------------------------------------------

const APPROPRIATION_COLUMNS: &[&str] = &[
    "AllocationTransferAgencyIdentifier",
    "AgencyIdentifier",
    "BeginningPeriodOfAvailability",
    "EndingPeriodOfAvailability",
    "AvailabilityTypeCode",
    "MainAccountCode",
    "BudgetAuthorityAppropriatedAmount",
    "UnobligatedAmount",
    "OtherBudgetaryResourcesAmount",
];

const OBJECT_CLASS_PROGRAM_ACTIVITY_COLUMNS: &[&str] = &[
    "AllocationTransferAgencyIdentifier",
    "AgencyIdentifier",
    "BeginningPeriodOfAvailability",
    "EndingPeriodOfAvailability",
    "AvailabilityTypeCode",
    "MainAccountCode",
    "ObjectClass",
    "ObligatedAmount",
    "ProgramActivity",
    "OutlayAmount",
];

const AWARD_COLUMNS: &[&str] = &[
    "piidPrefix",
    "piidAwardYear",
    "piidAwardType",
    "piidAwardNumber",
    "FainAwardNumber",
    "AwardDescription",
    "AwardModAmendmentNumber",
    "ParentAwardIDprefix",
    "ParentAwardYear",
    "ParentAwardType",
    "ParentAwardNumber",
    "RecordType",
    "ActionDateDay",
    "ActionDateMonth",
    "ActionDateYear",
    "TypeOfAction",
    "ReasonForModification",
    "TypeOfContractPricing",
    "idvType",
    "ContractAwardType",
    "AssistanceType",
    "FederalPrimeAward",
    "NonFederalFundingAmount",
    "CurrentTotalFundingObligationAmount",
    "CurrentTotalValueAwardAmount",
    "FaceValueLoanGuarantee",
    "PotentialTotalValueAwardAmount",
    "AwardingAgencyName",
    "AwardingAgencyCode",
    "AwardingSubTierAgencyName",
    "AwardingSubTierAgencyCode",
    "AwardingOfficeName",
    "AwardingOfficeCode",
    "FundingAgencyName",
    "FundingAgencyCode",
    "FundingSubTierAgencyName",
    "FundingOfficeName",
    "FundingOfficeCode",
    "RecipientLegalEntityName",
    "RecipientDunsNumber",
    "RecipientUltimateParentUniqueId",
    "RecipientUltimateParentLegalEntityName",
    "RecipientLegalEntityAddressStreet1",
    "RecipientLegalEntityAddressStreet2",
    "RecipientLegalEntitylCityName",
    "RecipientLegalEntityStateCode",
    "RecipientLegalEntityZip",
    "RecipientLegalEntityZip+4",
    "RecipientLegalEntityPostalCode",
    "RecipientLegalEntityCongresionalDistrict",
    "RecipientLegalEntityCountryCode",
    "RecipientLegalEntityCountryName",
    "HighCompOfficer1FirstName",
    "HighCompOfficer1MiddleInitial",
    "HighCompOfficer1LastName",
    "HighCompOfficer2FirstName",
    "HighCompOfficer2MiddleInitial",
    "HighCompOfficer2LastName",
    "HighCompOfficer3FirstName",
    "HighCompOfficer3MiddleInitial",
    "HighCompOfficer3LastName",
    "HighCompOfficer4FirstName",
    "HighCompOfficer4MiddleInitial",
    "HighCompOfficer4LastName",
    "HighCompOfficer5FirstName",
    "HighCompOfficer5MiddleInitial",
    "HighCompOfficer5LastName",
    "HighCompOfficer1Amount",
    "HighCompOfficer2Amount",
    "HighCompOfficer3Amount",
    "HighCompOfficer4Amount",
    "HighCompOfficer5Amount",
    "BusinessType",
    "NAICS_Code",
    "NAICS_Description",
    "CFDA_Code",
    "CFDA_Description",
    "PeriodOfPerfStartDay",
    "PeriodOfPerfStartMonth",
    "PeriodOfPerfStartYear",
    "PeriodOfPerfCurrentEndDay",
    "PerioOfPerfCurrentEndMonth",
    "PeriodOfPerfCurrentEndYear",
    "PeriodOfPerfPotentialEndDay",
    "PeriodOfPerfPotentialEndMonth",
    "PeriodOfPerfPotentialEndYear",
    "OrderingPeriodEndDay",
    "OrderingPeriodEndMonth",
    "OrderingPeriodEndYear",
    "PlaceOfPerfCity",
    "PlaceOfPerfState",
    "PlaceOfPerfCounty",
    "PlaceOfPerfZip+4",
    "PlaceOfPerfCongressionalDistrict",
    "PlaceOfPerfCountryName",
];

const AWARD_FINANCIAL_COLUMNS: &[&str] = &[
    "AllocationTransferAgencyIdentifier",
    "AgencyIdentifier",
    "BeginningPeriodOfAvailability",
    "EndingPeriodOfAvailability",
    "AvailabilityTypeCode",
    "MainAccountCode",
    "ParentAwardIDprefix",
    "ParentAwardYear",
    "ParentAwardType",
    "ParentAwardNumber",
    "FainAwardNumber",
    "AwardModAmendmentNumber",
    "ObjectClass",
    "TransactionObligatedAmount",
];

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Required columns of one submission type. Matching is case- and
/// order-insensitive; duplicates are rejected at construction.
#[derive(Debug, Clone)]
pub struct Schema {
    submission: SubmissionType,
    columns: Vec<String>,
    normalized: BTreeSet<String>,
}

impl Schema {
    pub fn new(submission: SubmissionType, columns: Vec<String>) -> Result<Self, ValidatorError> {
        let mut normalized = BTreeSet::new();
        for column in &columns {
            let norm = normalize_column(column);
            if norm.is_empty() {
                return Err(ValidatorError::config(format!(
                    "schema for {submission}: blank column name"
                )));
            }
            if !normalized.insert(norm) {
                return Err(ValidatorError::config(format!(
                    "schema for {submission}: duplicate column '{}'",
                    column.trim()
                )));
            }
        }
        Ok(Self {
            submission,
            columns: columns.into_iter().map(|c| c.trim().to_string()).collect(),
            normalized,
        })
    }

    /// Built-in template. The static lists are trimmed and duplicate-free
    /// (`builtin_lists_pass_validation`), so no checks run here.
    fn builtin(submission: SubmissionType) -> Self {
        let columns: Vec<String> = builtin_columns(submission)
            .iter()
            .map(|c| c.to_string())
            .collect();
        let normalized = columns.iter().map(|c| normalize_column(c)).collect();
        Self {
            submission,
            columns,
            normalized,
        }
    }

    pub fn submission(&self) -> SubmissionType {
        self.submission
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.normalized.contains(&normalize_column(column))
    }

    /// Declared spelling of a column, looked up case-insensitively.
    pub fn canonical(&self, column: &str) -> Option<&str> {
        let wanted = normalize_column(column);
        self.columns
            .iter()
            .find(|c| normalize_column(c) == wanted)
            .map(String::as_str)
    }

    pub(crate) fn normalized(&self) -> &BTreeSet<String> {
        &self.normalized
    }

    /// Whether rows of this submission carry the full TAS.
    pub fn has_budgetary_key(&self) -> bool {
        KEY_COLUMNS.iter().all(|c| self.contains(c))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: BTreeMap<SubmissionType, Schema>,
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    columns: Vec<String>,
}

impl SchemaRegistry {
    /// Registry with the four built-in submission templates.
    /// Always holds all four types.
    pub fn builtin() -> Self {
        let schemas = SubmissionType::ALL
            .into_iter()
            .map(|submission| (submission, Schema::builtin(submission)))
            .collect();
        Self { schemas }
    }

    /// Parse an external schema definition. All four submission types are required.
    pub fn from_toml(input: &str) -> Result<Self, ValidatorError> {
        let raw: HashMap<String, SchemaFile> = toml::from_str(input)
            .map_err(|e| ValidatorError::config(format!("schema parse error: {e}")))?;

        let mut schemas = BTreeMap::new();
        for (name, def) in raw {
            let submission: SubmissionType = name.parse()?;
            schemas.insert(submission, Schema::new(submission, def.columns)?);
        }

        let missing: Vec<&str> = SubmissionType::ALL
            .iter()
            .filter(|t| !schemas.contains_key(t))
            .map(|t| t.name())
            .collect();
        if !missing.is_empty() {
            return Err(ValidatorError::config(format!(
                "schema file is missing submission type(s): {}",
                missing.join(", ")
            )));
        }

        Ok(Self { schemas })
    }

    pub fn load(path: &Path) -> Result<Self, ValidatorError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ValidatorError::Io(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn schema_for(&self, submission: SubmissionType) -> Result<&Schema, ValidatorError> {
        self.schemas.get(&submission).ok_or_else(|| {
            ValidatorError::config(format!("no schema registered for {submission}"))
        })
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_columns(submission: SubmissionType) -> &'static [&'static str] {
    match submission {
        SubmissionType::Appropriation => APPROPRIATION_COLUMNS,
        SubmissionType::ObjectClassProgramActivity => OBJECT_CLASS_PROGRAM_ACTIVITY_COLUMNS,
        SubmissionType::Award => AWARD_COLUMNS,
        SubmissionType::AwardFinancial => AWARD_FINANCIAL_COLUMNS,
    }
}
