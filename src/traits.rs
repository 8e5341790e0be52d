//! Collaborator seams: storage, text extraction, and FX rate lookup
//!
//! The pipeline core is storage- and transport-agnostic. Durable persistence,
//! PDF text extraction, and the historical rate feed are supplied by callers
//! through these traits.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::types::*;

/// Repository abstraction for statements and their transactions
///
/// A statement and its transactions are committed together; implementations
/// must not expose a statement whose transactions are still being written.
#[async_trait]
pub trait StatementStore: Send + Sync {
    /// Save a newly imported statement
    async fn save_statement(&mut self, statement: &Statement) -> StatementResult<()>;

    /// Get a statement by id
    async fn get_statement(&self, statement_id: &str) -> StatementResult<Option<Statement>>;

    /// Get a statement by its file content hash
    async fn get_statement_by_hash(&self, file_hash: &str) -> StatementResult<Option<Statement>>;

    /// List all statements, most recently imported first
    async fn list_statements(&self) -> StatementResult<Vec<Statement>>;

    /// Update an existing statement
    async fn update_statement(&mut self, statement: &Statement) -> StatementResult<()>;

    /// Save a batch of transactions belonging to one statement
    async fn save_transactions(&mut self, transactions: &[Transaction]) -> StatementResult<()>;

    /// Get a transaction by id
    async fn get_transaction(&self, transaction_id: &str) -> StatementResult<Option<Transaction>>;

    /// Update an existing transaction
    async fn update_transaction(&mut self, transaction: &Transaction) -> StatementResult<()>;

    /// Query transactions by filter, ordered by transaction date descending,
    /// with offset/limit pagination applied last
    async fn query_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> StatementResult<Vec<Transaction>>;

    /// Delete every transaction owned by a statement (used by re-parse)
    async fn delete_statement_transactions(&mut self, statement_id: &str) -> StatementResult<()>;
}

/// Extracts ordered per-page text from a raw statement file
///
/// PDF mechanics are out of scope for this core; tests use a fake.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> StatementResult<Vec<String>>;
}

/// External historical FX rate feed, keyed by date and currency code
///
/// `None` means "not available" — feeds do not publish a rate for every
/// calendar day, and transport failures are treated the same way. Lookups
/// never abort the surrounding computation.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn lookup(&self, date: NaiveDate, currency: &str) -> Option<f64>;
}

/// Transaction query filter
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub currency: Option<String>,
    pub category: Option<Category>,
    pub needs_review: Option<bool>,
    pub statement_id: Option<String>,
    /// Only transactions of statements with `include_in_metrics` set
    pub metrics_only: bool,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// Partial update of a transaction's user-editable override fields
///
/// Each field distinguishes "leave unchanged" (`None`) from "clear"
/// (`Some(None)`) and "set" (`Some(Some(value))`).
#[derive(Debug, Clone, Default)]
pub struct OverrideUpdate {
    pub amount_override: Option<Option<BigDecimal>>,
    pub sign_override: Option<Option<bool>>,
    pub category_override: Option<Option<Category>>,
    pub override_reason: Option<Option<String>>,
}
