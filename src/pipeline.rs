//! End-to-end statement pipeline
//!
//! Glues the parser, categorizer, reconciler, and aggregator onto a
//! [`StatementStore`]. One import runs to completion in memory before
//! anything is persisted: the statement and its fully reconciled
//! transactions are committed together, never half-processed.

use crate::categorizer::Categorizer;
use crate::fx::FxRateCache;
use crate::metrics::{
    parse_month_range, CurrencyFilter, MetricsAggregator, MetricsQuery, MetricsSummary,
    MonthlyMetrics,
};
use crate::parser::{ParsedTransaction, StatementTextParser};
use crate::reconcile::TransferReconciler;
use crate::traits::{OverrideUpdate, StatementStore, TextExtractor, TransactionFilter};
use crate::types::{
    is_internal_transfer_code, Category, Statement, StatementError, StatementResult, Transaction,
};
use crate::utils::sha256_hex;

pub struct StatementPipeline<S: StatementStore> {
    store: S,
    parser: StatementTextParser,
    categorizer: Categorizer,
    reconciler: TransferReconciler,
    aggregator: MetricsAggregator,
}

impl<S: StatementStore> StatementPipeline<S> {
    pub fn new(store: S, rates: FxRateCache) -> StatementResult<Self> {
        Ok(Self {
            store,
            parser: StatementTextParser::new()?,
            categorizer: Categorizer::new()?,
            reconciler: TransferReconciler::new(rates.clone()),
            aggregator: MetricsAggregator::new(rates),
        })
    }

    /// Import a statement file.
    ///
    /// Uploading the same bytes twice is idempotent: the existing statement
    /// is returned by content hash and nothing is re-parsed or duplicated.
    pub async fn import(
        &mut self,
        file_name: &str,
        bytes: &[u8],
        extractor: &dyn TextExtractor,
    ) -> StatementResult<Statement> {
        let file_hash = sha256_hex(bytes);
        if let Some(existing) = self.store.get_statement_by_hash(&file_hash).await? {
            return Ok(existing);
        }

        let pages = extractor.extract(bytes)?;
        let outcome = self.parser.parse(&pages);

        let statement = Statement::new(
            file_name.to_string(),
            file_hash,
            pages.len() as u32,
            outcome.accounts,
            outcome.parse_status,
            outcome.parse_errors,
        );

        let mut transactions = self.build_transactions(&statement, &outcome.transactions);
        self.reconciler.reconcile(&mut transactions).await;

        self.store.save_statement(&statement).await?;
        self.store.save_transactions(&transactions).await?;
        Ok(statement)
    }

    /// Re-run parsing and reconciliation for an existing statement from its
    /// original bytes, replacing its transactions.
    ///
    /// The statement keeps its id and hash; transaction-level overrides are
    /// lost with the replaced rows.
    pub async fn reparse(
        &mut self,
        statement_id: &str,
        bytes: &[u8],
        extractor: &dyn TextExtractor,
    ) -> StatementResult<Statement> {
        let mut statement = self
            .store
            .get_statement(statement_id)
            .await?
            .ok_or_else(|| StatementError::StatementNotFound(statement_id.to_string()))?;

        let pages = extractor.extract(bytes)?;
        let outcome = self.parser.parse(&pages);

        statement.pages = pages.len() as u32;
        statement.accounts_found = outcome.accounts;
        statement.parse_status = outcome.parse_status;
        statement.parse_errors = outcome.parse_errors;

        let mut transactions = self.build_transactions(&statement, &outcome.transactions);
        self.reconciler.reconcile(&mut transactions).await;

        self.store.delete_statement_transactions(statement_id).await?;
        self.store.update_statement(&statement).await?;
        self.store.save_transactions(&transactions).await?;
        Ok(statement)
    }

    /// Apply a partial override update to one transaction
    pub async fn apply_overrides(
        &mut self,
        transaction_id: &str,
        update: OverrideUpdate,
    ) -> StatementResult<Transaction> {
        let mut txn = self
            .store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| StatementError::TransactionNotFound(transaction_id.to_string()))?;

        if let Some(amount_override) = update.amount_override {
            txn.amount_override = amount_override;
        }
        if let Some(sign_override) = update.sign_override {
            txn.sign_override = sign_override;
        }
        if let Some(category_override) = update.category_override {
            txn.category_override = category_override;
        }
        if let Some(override_reason) = update.override_reason {
            txn.override_reason = override_reason;
        }
        txn.updated_at = chrono::Utc::now().naive_utc();

        self.store.update_transaction(&txn).await?;
        Ok(txn)
    }

    /// Toggle a whole statement in or out of metrics aggregation
    pub async fn set_include_in_metrics(
        &mut self,
        statement_id: &str,
        include: bool,
    ) -> StatementResult<Statement> {
        let mut statement = self
            .store
            .get_statement(statement_id)
            .await?
            .ok_or_else(|| StatementError::StatementNotFound(statement_id.to_string()))?;
        statement.include_in_metrics = include;
        self.store.update_statement(&statement).await?;
        Ok(statement)
    }

    /// Monthly metric points over an inclusive month range
    pub async fn monthly_metrics(
        &self,
        query: &MetricsQuery,
    ) -> StatementResult<Vec<MonthlyMetrics>> {
        let transactions = self.metrics_rows(query).await?;
        Ok(self
            .aggregator
            .aggregate(&transactions, &query.currency, query.use_overrides)
            .await)
    }

    /// Range totals over the same selection as [`monthly_metrics`](Self::monthly_metrics)
    pub async fn metrics_summary(&self, query: &MetricsQuery) -> StatementResult<MetricsSummary> {
        let points = self.monthly_metrics(query).await?;
        Ok(MetricsAggregator::summarize(&points))
    }

    pub async fn get_statement(&self, statement_id: &str) -> StatementResult<Option<Statement>> {
        self.store.get_statement(statement_id).await
    }

    pub async fn list_statements(&self) -> StatementResult<Vec<Statement>> {
        self.store.list_statements().await
    }

    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> StatementResult<Option<Transaction>> {
        self.store.get_transaction(transaction_id).await
    }

    pub async fn query_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> StatementResult<Vec<Transaction>> {
        self.store.query_transactions(filter).await
    }

    async fn metrics_rows(&self, query: &MetricsQuery) -> StatementResult<Vec<Transaction>> {
        let (from_date, to_date) = parse_month_range(&query.from_month, &query.to_month)?;
        let filter = TransactionFilter {
            from_date: Some(from_date),
            to_date: Some(to_date),
            currency: match &query.currency {
                CurrencyFilter::All => None,
                CurrencyFilter::Single(code) => Some(code.clone()),
            },
            metrics_only: true,
            ..Default::default()
        };
        self.store.query_transactions(&filter).await
    }

    fn build_transactions(
        &self,
        statement: &Statement,
        parsed: &[ParsedTransaction],
    ) -> Vec<Transaction> {
        let now = chrono::Utc::now().naive_utc();
        parsed
            .iter()
            .map(|txn| {
                let is_internal_transfer = txn
                    .txn_type_code
                    .as_deref()
                    .map_or(false, is_internal_transfer_code);

                let mut categorization = self.categorizer.categorize(
                    &txn.description_raw,
                    txn.txn_type_code.as_deref(),
                    txn.direction,
                    txn.to_account.as_deref(),
                    txn.from_account.as_deref(),
                );
                // Transfer legs are excluded from category buckets anyway;
                // the stored category is a neutral placeholder
                if is_internal_transfer {
                    categorization.category = Category::OtherExpenses;
                }

                Transaction {
                    id: uuid::Uuid::new_v4().to_string(),
                    statement_id: statement.statement_id.clone(),
                    source_file_name: statement.file_name.clone(),
                    account_name: txn.account_name.clone(),
                    account_currency: txn.account_currency.clone(),
                    account_iban: txn.account_iban.clone(),
                    period_start: txn.period_start,
                    period_end: txn.period_end,
                    txn_date_utc: txn.txn_date_utc,
                    description_raw: txn.description_raw.clone(),
                    txn_type_code: txn.txn_type_code.clone(),
                    external_txn_id: txn.external_txn_id.clone(),
                    from_account: txn.from_account.clone(),
                    to_account: txn.to_account.clone(),
                    money_out: txn.money_out.clone(),
                    money_in: txn.money_in.clone(),
                    balance: txn.balance.clone(),
                    direction: txn.direction,
                    amount: txn.amount.clone(),
                    signed_amount: txn.signed_amount.clone(),
                    category: categorization.category,
                    confidence: categorization.confidence,
                    category_reason: categorization.reason,
                    needs_review: categorization.needs_review,
                    is_internal_transfer,
                    transfer_group_id: None,
                    transfer_from_currency: txn.transfer_from_currency.clone(),
                    transfer_to_currency: txn.transfer_to_currency.clone(),
                    fx_rate_applied: txn.fx_rate_applied,
                    fx_rate_official: None,
                    fx_loss_ron: None,
                    amount_override: None,
                    sign_override: None,
                    category_override: None,
                    override_reason: None,
                    created_at: now,
                    updated_at: now,
                }
            })
            .collect()
    }
}
