//! In-memory store implementation for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

/// In-memory [`StatementStore`] for testing and development
#[derive(Debug, Clone)]
pub struct MemoryStore {
    statements: Arc<RwLock<HashMap<String, Statement>>>,
    transactions: Arc<RwLock<HashMap<String, Transaction>>>,
}

impl MemoryStore {
    /// Create a new memory store instance
    pub fn new() -> Self {
        Self {
            statements: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.statements.write().unwrap().clear();
        self.transactions.write().unwrap().clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatementStore for MemoryStore {
    async fn save_statement(&mut self, statement: &Statement) -> StatementResult<()> {
        self.statements
            .write()
            .unwrap()
            .insert(statement.statement_id.clone(), statement.clone());
        Ok(())
    }

    async fn get_statement(&self, statement_id: &str) -> StatementResult<Option<Statement>> {
        Ok(self.statements.read().unwrap().get(statement_id).cloned())
    }

    async fn get_statement_by_hash(&self, file_hash: &str) -> StatementResult<Option<Statement>> {
        Ok(self
            .statements
            .read()
            .unwrap()
            .values()
            .find(|statement| statement.file_hash == file_hash)
            .cloned())
    }

    async fn list_statements(&self) -> StatementResult<Vec<Statement>> {
        let mut items: Vec<Statement> = self.statements.read().unwrap().values().cloned().collect();
        items.sort_by(|a, b| b.imported_at.cmp(&a.imported_at));
        Ok(items)
    }

    async fn update_statement(&mut self, statement: &Statement) -> StatementResult<()> {
        if self
            .statements
            .read()
            .unwrap()
            .contains_key(&statement.statement_id)
        {
            self.statements
                .write()
                .unwrap()
                .insert(statement.statement_id.clone(), statement.clone());
            Ok(())
        } else {
            Err(StatementError::StatementNotFound(
                statement.statement_id.clone(),
            ))
        }
    }

    async fn save_transactions(&mut self, transactions: &[Transaction]) -> StatementResult<()> {
        let mut store = self.transactions.write().unwrap();
        for txn in transactions {
            store.insert(txn.id.clone(), txn.clone());
        }
        Ok(())
    }

    async fn get_transaction(&self, transaction_id: &str) -> StatementResult<Option<Transaction>> {
        Ok(self
            .transactions
            .read()
            .unwrap()
            .get(transaction_id)
            .cloned())
    }

    async fn update_transaction(&mut self, transaction: &Transaction) -> StatementResult<()> {
        if self
            .transactions
            .read()
            .unwrap()
            .contains_key(&transaction.id)
        {
            self.transactions
                .write()
                .unwrap()
                .insert(transaction.id.clone(), transaction.clone());
            Ok(())
        } else {
            Err(StatementError::TransactionNotFound(transaction.id.clone()))
        }
    }

    async fn query_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> StatementResult<Vec<Transaction>> {
        let excluded_statements: Vec<String> = if filter.metrics_only {
            self.statements
                .read()
                .unwrap()
                .values()
                .filter(|s| !s.include_in_metrics)
                .map(|s| s.statement_id.clone())
                .collect()
        } else {
            Vec::new()
        };

        let mut items: Vec<Transaction> = self
            .transactions
            .read()
            .unwrap()
            .values()
            .filter(|txn| {
                filter.from_date.is_none_or(|d| txn.txn_date_utc >= d)
                    && filter.to_date.is_none_or(|d| txn.txn_date_utc <= d)
                    && filter
                        .currency
                        .as_ref()
                        .is_none_or(|c| &txn.account_currency == c)
                    && filter.category.is_none_or(|c| txn.category == c)
                    && filter.needs_review.is_none_or(|n| txn.needs_review == n)
                    && filter
                        .statement_id
                        .as_ref()
                        .is_none_or(|id| &txn.statement_id == id)
                    && !excluded_statements.contains(&txn.statement_id)
            })
            .cloned()
            .collect();

        items.sort_by(|a, b| b.txn_date_utc.cmp(&a.txn_date_utc));

        let offset = filter.offset.unwrap_or(0);
        let items: Vec<Transaction> = items
            .into_iter()
            .skip(offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(items)
    }

    async fn delete_statement_transactions(&mut self, statement_id: &str) -> StatementResult<()> {
        self.transactions
            .write()
            .unwrap()
            .retain(|_, txn| txn.statement_id != statement_id);
        Ok(())
    }
}
