//! Core types and data structures for the statement pipeline

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Base currency all consolidated metrics are reported in.
pub const BASE_CURRENCY: &str = "RON";

/// Foreign currency of the outbound leg of internal transfers.
pub const TRANSFER_CURRENCY: &str = "GBP";

/// Type code marking the outbound leg of an internal currency exchange.
pub const TRANSFER_OUT_CODE: &str = "EXO";

/// Type code marking the inbound leg of an internal currency exchange.
pub const TRANSFER_IN_CODE: &str = "EXI";

/// Returns true for type codes that mark an internal-transfer leg
pub fn is_internal_transfer_code(code: &str) -> bool {
    code == TRANSFER_IN_CODE || code == TRANSFER_OUT_CODE
}

/// Money movement direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Money coming into the account
    Inflow,
    /// Money leaving the account
    Outflow,
    /// No recoverable amount (informational rows)
    Neutral,
}

/// Spending/income categories assigned by the categorizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Revenue")]
    Revenue,
    #[serde(rename = "Expenses towards government (taxes)")]
    Taxes,
    #[serde(rename = "Expenses for accountant")]
    Accountant,
    #[serde(rename = "Expenses for Car Leasing")]
    CarLeasing,
    #[serde(rename = "Leasing Fuel Expenses")]
    LeasingFuel,
    #[serde(rename = "Expenses for employees")]
    Employees,
    #[serde(rename = "Paid dividends")]
    Dividends,
    #[serde(rename = "Other expenses")]
    OtherExpenses,
    /// Assigned at read time to reconciled transfer legs; never produced by rules
    #[serde(rename = "Internal transfer")]
    InternalTransfer,
}

impl Category {
    /// Human-readable label, identical to the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Revenue => "Revenue",
            Category::Taxes => "Expenses towards government (taxes)",
            Category::Accountant => "Expenses for accountant",
            Category::CarLeasing => "Expenses for Car Leasing",
            Category::LeasingFuel => "Leasing Fuel Expenses",
            Category::Employees => "Expenses for employees",
            Category::Dividends => "Paid dividends",
            Category::OtherExpenses => "Other expenses",
            Category::InternalTransfer => "Internal transfer",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of parsing a whole statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStatus {
    /// Every transaction chunk parsed
    Success,
    /// At least one chunk failed; failures are listed in `parse_errors`
    Partial,
}

/// Per-account metadata discovered while parsing, stored on the statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_name: String,
    pub account_currency: String,
    pub account_iban: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

/// Result of running the categorizer over one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct CategorizationResult {
    pub category: Category,
    /// Confidence in [0, 1]: 0.95 vendor, 0.90 strong keyword, 0.70 weak, 0.40 fallback
    pub confidence: f64,
    /// Human-readable reason naming the rule that fired
    pub reason: String,
    pub needs_review: bool,
}

/// An imported statement file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub statement_id: String,
    pub imported_at: NaiveDateTime,
    pub file_name: String,
    /// SHA-256 of the raw file bytes; unique dedup key
    pub file_hash: String,
    pub pages: u32,
    pub accounts_found: Vec<AccountSummary>,
    pub parse_status: ParseStatus,
    pub parse_errors: Vec<String>,
    /// Excludes the whole statement from aggregation without deleting it
    pub include_in_metrics: bool,
}

impl Statement {
    /// Create a new statement record with a fresh id
    pub fn new(
        file_name: String,
        file_hash: String,
        pages: u32,
        accounts_found: Vec<AccountSummary>,
        parse_status: ParseStatus,
        parse_errors: Vec<String>,
    ) -> Self {
        Self {
            statement_id: Uuid::new_v4().to_string(),
            imported_at: chrono::Utc::now().naive_utc(),
            file_name,
            file_hash,
            pages,
            accounts_found,
            parse_status,
            parse_errors,
            include_in_metrics: true,
        }
    }
}

/// A persisted ledger transaction
///
/// Immutable after import except for the user override fields and the
/// transfer-reconciliation fields. The `*_override` fields never mutate the
/// parsed originals; downstream consumers resolve them through
/// [`effective_amount`](Transaction::effective_amount) and
/// [`effective_category`](Transaction::effective_category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub statement_id: String,
    pub source_file_name: String,

    pub account_name: String,
    pub account_currency: String,
    pub account_iban: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,

    pub txn_date_utc: NaiveDate,
    pub description_raw: String,
    pub txn_type_code: Option<String>,
    /// Provider transaction id embedded in the statement text
    pub external_txn_id: Option<String>,
    pub from_account: Option<String>,
    pub to_account: Option<String>,

    pub money_out: Option<BigDecimal>,
    pub money_in: Option<BigDecimal>,
    pub balance: Option<BigDecimal>,

    pub direction: Direction,
    /// Unsigned primary amount; the non-null one of money in/out
    pub amount: BigDecimal,
    /// `amount` for inflow, `-amount` for outflow, zero for neutral
    pub signed_amount: BigDecimal,

    pub category: Category,
    pub confidence: f64,
    pub category_reason: String,
    pub needs_review: bool,
    pub is_internal_transfer: bool,

    /// Shared by both legs of a reconciled transfer pair
    pub transfer_group_id: Option<String>,
    pub transfer_from_currency: Option<String>,
    pub transfer_to_currency: Option<String>,
    /// Rate actually used by the provider, as stated in the statement text
    pub fx_rate_applied: Option<f64>,
    /// Authoritative historical daily rate on the transfer date
    pub fx_rate_official: Option<f64>,
    /// `official_rate * foreign_amount - base_amount`; positive means the
    /// realized conversion cost more than the official rate implied
    pub fx_loss_ron: Option<f64>,

    pub amount_override: Option<BigDecimal>,
    pub sign_override: Option<bool>,
    pub category_override: Option<Category>,
    pub override_reason: Option<String>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Transaction {
    /// Amount used by downstream aggregation.
    ///
    /// With `use_overrides`, `amount_override` replaces `amount` and
    /// `sign_override` flips the sign; without it, the parsed amount is
    /// returned untouched.
    pub fn effective_amount(&self, use_overrides: bool) -> BigDecimal {
        if !use_overrides {
            return self.amount.clone();
        }
        let base = self
            .amount_override
            .clone()
            .unwrap_or_else(|| self.amount.clone());
        if self.sign_override == Some(true) {
            -base
        } else {
            base
        }
    }

    /// Category used by downstream aggregation.
    ///
    /// Internal-transfer legs always resolve to `InternalTransfer`; otherwise
    /// the user override wins when `use_overrides` is set.
    pub fn effective_category(&self, use_overrides: bool) -> Category {
        if self.is_internal_transfer {
            return Category::InternalTransfer;
        }
        if use_overrides {
            if let Some(category) = self.category_override {
                return category;
            }
        }
        self.category
    }
}

/// Errors that can occur in the statement pipeline
#[derive(Debug, thiserror::Error)]
pub enum StatementError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Statement not found: {0}")]
    StatementNotFound(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type for statement pipeline operations
pub type StatementResult<T> = Result<T, StatementError>;
