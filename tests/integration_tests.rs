//! Integration tests covering the full statement pipeline

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

use statements_core::{
    Category, CurrencyFilter, FxRateCache, MemoryStore, MetricsQuery, OverrideUpdate, ParseStatus,
    RateSource, StatementError, StatementPipeline, StatementResult, TextExtractor,
    TransactionFilter, TransferVolumes,
};

/// Text extractor returning canned pages, standing in for PDF extraction
struct FakeExtractor {
    pages: Vec<String>,
}

impl TextExtractor for FakeExtractor {
    fn extract(&self, _bytes: &[u8]) -> StatementResult<Vec<String>> {
        Ok(self.pages.clone())
    }
}

struct FakeRates(HashMap<String, f64>);

#[async_trait]
impl RateSource for FakeRates {
    async fn lookup(&self, _date: NaiveDate, currency: &str) -> Option<f64> {
        self.0.get(currency).copied()
    }
}

fn statement_pages() -> Vec<String> {
    vec![
        r#"Account statement
Account name Main GBP Account
Currency GBP
IBAN GB29 NWBK 6016 1331 9268 19
Transactions from 1 Jan 2024 to 31 Jan 2024
Date (UTC) Description Money out Money in Balance
05 Jan 2024 EXO Exchanged to RON 100.00 400.00
FX Rate GBP 1 = RON 5.75
ID: 64a1b2c3d4e5f60718293a4b
Transaction types explained below"#
            .to_string(),
        r#"Account statement
Account name Main RON Account
Currency RON
Transactions from 1 Jan 2024 to 31 Jan 2024
Date (UTC) Description Money out Money in Balance
05 Jan 2024 EXI Exchanged from GBP 575.00 1575.00
10 Jan 2024 MOA Payment received Acme SRL 1000.00 2575.00
12 Jan 2024 SALARIU IONESCU 400.00 2175.00
Transaction types explained below"#
            .to_string(),
    ]
}

fn pipeline() -> StatementPipeline<MemoryStore> {
    let rates = FxRateCache::new(Arc::new(FakeRates(HashMap::from([(
        "GBP".to_string(),
        5.80,
    )]))));
    StatementPipeline::new(MemoryStore::new(), rates).unwrap()
}

fn extractor() -> FakeExtractor {
    FakeExtractor {
        pages: statement_pages(),
    }
}

#[tokio::test]
async fn import_parses_categorizes_and_reconciles() {
    let mut pipeline = pipeline();
    let statement = pipeline
        .import("january.pdf", b"pdf-bytes", &extractor())
        .await
        .unwrap();

    assert_eq!(statement.parse_status, ParseStatus::Success);
    assert_eq!(statement.pages, 2);
    assert_eq!(statement.accounts_found.len(), 2);
    assert!(statement.include_in_metrics);

    let transactions = pipeline
        .query_transactions(&TransactionFilter {
            statement_id: Some(statement.statement_id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(transactions.len(), 4);

    let outbound = transactions
        .iter()
        .find(|t| t.txn_type_code.as_deref() == Some("EXO"))
        .unwrap();
    let inbound = transactions
        .iter()
        .find(|t| t.txn_type_code.as_deref() == Some("EXI"))
        .unwrap();
    assert!(outbound.is_internal_transfer);
    assert_eq!(
        outbound.transfer_group_id.as_deref(),
        Some("64a1b2c3d4e5f60718293a4b")
    );
    assert_eq!(outbound.transfer_group_id, inbound.transfer_group_id);
    assert_eq!(outbound.fx_rate_applied, Some(5.75));
    assert_eq!(outbound.fx_rate_official, Some(5.80));
    // official 5.80 * 100 GBP - 575 RON received, stored unrounded
    let loss = outbound.fx_loss_ron.unwrap();
    assert!((loss - 5.00).abs() < 1e-9);

    let salary = transactions
        .iter()
        .find(|t| t.description_raw.contains("SALARIU"))
        .unwrap();
    assert_eq!(salary.category, Category::Employees);
    assert_eq!(salary.confidence, 0.90);
    assert!(!salary.needs_review);

    let revenue = transactions
        .iter()
        .find(|t| t.txn_type_code.as_deref() == Some("MOA"))
        .unwrap();
    assert_eq!(revenue.category, Category::Revenue);
    assert_eq!(revenue.money_in, Some(BigDecimal::from(1000)));
}

#[tokio::test]
async fn uploading_the_same_bytes_twice_is_idempotent() {
    let mut pipeline = pipeline();
    let first = pipeline
        .import("january.pdf", b"pdf-bytes", &extractor())
        .await
        .unwrap();
    let second = pipeline
        .import("january-copy.pdf", b"pdf-bytes", &extractor())
        .await
        .unwrap();

    assert_eq!(first.statement_id, second.statement_id);
    assert_eq!(second.file_name, "january.pdf");

    let transactions = pipeline
        .query_transactions(&TransactionFilter::default())
        .await
        .unwrap();
    assert_eq!(transactions.len(), 4);
}

#[tokio::test]
async fn reparse_keeps_the_statement_id_and_replaces_transactions() {
    let mut pipeline = pipeline();
    let statement = pipeline
        .import("january.pdf", b"pdf-bytes", &extractor())
        .await
        .unwrap();

    let before = pipeline
        .query_transactions(&TransactionFilter::default())
        .await
        .unwrap();
    let edited = &before[0];
    pipeline
        .apply_overrides(
            &edited.id,
            OverrideUpdate {
                category_override: Some(Some(Category::Taxes)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let reparsed = pipeline
        .reparse(&statement.statement_id, b"pdf-bytes", &extractor())
        .await
        .unwrap();
    assert_eq!(reparsed.statement_id, statement.statement_id);
    assert_eq!(reparsed.file_hash, statement.file_hash);

    let after = pipeline
        .query_transactions(&TransactionFilter::default())
        .await
        .unwrap();
    assert_eq!(after.len(), 4);
    // Replaced rows are fresh: the override did not survive
    assert!(after.iter().all(|t| t.category_override.is_none()));
    assert!(after.iter().all(|t| !before.iter().any(|b| b.id == t.id)));
}

#[tokio::test]
async fn reparsing_an_unknown_statement_fails() {
    let mut pipeline = pipeline();
    let result = pipeline.reparse("missing", b"pdf-bytes", &extractor()).await;
    assert!(matches!(result, Err(StatementError::StatementNotFound(_))));
}

#[tokio::test]
async fn consolidated_metrics_roll_both_currencies_into_the_base() {
    let mut pipeline = pipeline();
    pipeline
        .import("january.pdf", b"pdf-bytes", &extractor())
        .await
        .unwrap();

    let points = pipeline
        .monthly_metrics(&MetricsQuery {
            from_month: "2024-01".to_string(),
            to_month: "2024-01".to_string(),
            currency: CurrencyFilter::All,
            use_overrides: false,
        })
        .await
        .unwrap();

    assert_eq!(points.len(), 1);
    let point = &points[0];
    assert_eq!(point.month, "2024-01");
    assert_eq!(point.currency, "RON");
    // 1000 revenue + 575 transfer inflow
    assert_eq!(point.revenue_total, 1575.00);
    assert_eq!(point.employees_total, 400.00);
    assert_eq!(
        point.transfers,
        TransferVolumes::Consolidated {
            transfers_in_ron: 575.00,
            transfers_out_original: 100.00,
            transfers_out_currency: Some("GBP".to_string()),
        }
    );
    assert_eq!(point.avg_fx_rate, Some(5.75));
    // 400 salary + transfer-out converted at the blended rate
    assert_eq!(point.total_expenses_operational, 975.00);
    assert_eq!(point.net_income_operational, 600.00);
    assert_eq!(point.counts_by_category.get("Internal transfer"), Some(&2));
    assert_eq!(point.counts_by_category.get("Revenue"), Some(&1));

    let summary = pipeline
        .metrics_summary(&MetricsQuery {
            from_month: "2024-01".to_string(),
            to_month: "2024-01".to_string(),
            currency: CurrencyFilter::All,
            use_overrides: false,
        })
        .await
        .unwrap();
    assert_eq!(summary.revenue_total, 1575.00);
    assert_eq!(summary.avg_fx_rate, Some(5.75));
}

#[tokio::test]
async fn overrides_change_metrics_only_when_requested() {
    let mut pipeline = pipeline();
    pipeline
        .import("january.pdf", b"pdf-bytes", &extractor())
        .await
        .unwrap();

    let salary = pipeline
        .query_transactions(&TransactionFilter {
            category: Some(Category::Employees),
            ..Default::default()
        })
        .await
        .unwrap()
        .remove(0);
    pipeline
        .apply_overrides(
            &salary.id,
            OverrideUpdate {
                amount_override: Some(Some(BigDecimal::from(300))),
                category_override: Some(Some(Category::Taxes)),
                override_reason: Some(Some("half was a tax prepayment".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let query = |use_overrides| MetricsQuery {
        from_month: "2024-01".to_string(),
        to_month: "2024-01".to_string(),
        currency: CurrencyFilter::Single("RON".to_string()),
        use_overrides,
    };

    let with = pipeline.monthly_metrics(&query(true)).await.unwrap();
    assert_eq!(with[0].taxes_total, 300.00);
    assert_eq!(with[0].employees_total, 0.00);

    let without = pipeline.monthly_metrics(&query(false)).await.unwrap();
    assert_eq!(without[0].taxes_total, 0.00);
    assert_eq!(without[0].employees_total, 400.00);
}

#[tokio::test]
async fn opted_out_statements_are_invisible_to_metrics() {
    let mut pipeline = pipeline();
    let statement = pipeline
        .import("january.pdf", b"pdf-bytes", &extractor())
        .await
        .unwrap();

    pipeline
        .set_include_in_metrics(&statement.statement_id, false)
        .await
        .unwrap();

    let points = pipeline
        .monthly_metrics(&MetricsQuery {
            from_month: "2024-01".to_string(),
            to_month: "2024-01".to_string(),
            currency: CurrencyFilter::All,
            use_overrides: false,
        })
        .await
        .unwrap();
    assert!(points.is_empty());

    // The statement itself is still stored and listable
    let listed = pipeline.list_statements().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].include_in_metrics);
}

#[tokio::test]
async fn invalid_month_ranges_are_rejected() {
    let pipeline = pipeline();
    let result = pipeline
        .monthly_metrics(&MetricsQuery {
            from_month: "2024-05".to_string(),
            to_month: "2024-01".to_string(),
            currency: CurrencyFilter::All,
            use_overrides: false,
        })
        .await;
    assert!(matches!(result, Err(StatementError::Validation(_))));

    let result = pipeline
        .monthly_metrics(&MetricsQuery {
            from_month: "Jan 2024".to_string(),
            to_month: "2024-02".to_string(),
            currency: CurrencyFilter::All,
            use_overrides: false,
        })
        .await;
    assert!(matches!(result, Err(StatementError::Validation(_))));
}
