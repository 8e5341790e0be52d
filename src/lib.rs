//! # Statements Core
//!
//! A storage-agnostic library turning raw bank-statement text into a
//! categorized ledger and monthly financial metrics.
//!
//! ## Features
//!
//! - **Statement parsing**: Fixed-layout statement text to structured
//!   transactions, with per-chunk error recovery
//! - **Categorization**: Priority-ordered keyword rules with confidence
//!   scores and review flags
//! - **Transfer reconciliation**: Pairs cross-currency internal transfer
//!   legs and computes realized FX loss against the official rate
//! - **FX rates**: Memoized historical rate lookup with weekend/holiday
//!   fallback, backed by the national bank's public feed
//! - **Monthly metrics**: Consolidated base-currency or single-currency
//!   rollups with user override support
//! - **Storage abstraction**: Database-agnostic design with trait-based
//!   storage
//!
//! ## Quick Start
//!
//! ```rust
//! use statements_core::{FxRateCache, MemoryStore, StatementPipeline};
//! use std::sync::Arc;
//!
//! # struct FakeRates;
//! # #[async_trait::async_trait]
//! # impl statements_core::RateSource for FakeRates {
//! #     async fn lookup(&self, _: chrono::NaiveDate, _: &str) -> Option<f64> { None }
//! # }
//! let rates = FxRateCache::new(Arc::new(FakeRates));
//! let pipeline = StatementPipeline::new(MemoryStore::new(), rates).unwrap();
//! // pipeline.import(...) with a TextExtractor implementation
//! ```

pub mod categorizer;
pub mod fx;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod reconcile;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use categorizer::Categorizer;
pub use fx::{BnrRateSource, FxRateCache};
pub use metrics::{
    CurrencyFilter, MetricsAggregator, MetricsQuery, MetricsSummary, MonthlyMetrics,
    TransferVolumes,
};
pub use parser::{AccountBlock, ParseOutcome, ParsedTransaction, StatementTextParser};
pub use pipeline::StatementPipeline;
pub use reconcile::TransferReconciler;
pub use traits::*;
pub use types::*;
pub use utils::MemoryStore;
