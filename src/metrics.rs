//! Monthly financial rollups over persisted transactions
//!
//! Two aggregation paths exist on purpose. The all-currency path converts
//! every currency's monthly totals into the base currency at the request
//! day's official rate and derives a blended transfer rate from the matched
//! volumes; the single-currency path keeps amounts in that currency and
//! blends the per-transfer applied rates instead. The formulas differ and
//! must stay separate: unifying them would change reported historical
//! figures.
//!
//! Accumulation runs at full precision; rounding to 2 decimals (4 for rates)
//! happens only when a point is emitted.

use bigdecimal::ToPrimitive;
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::fx::FxRateCache;
use crate::types::{
    Category, Direction, StatementError, StatementResult, Transaction, BASE_CURRENCY,
};

/// Currency scope of a metrics request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrencyFilter {
    /// Merge every currency into a consolidated base-currency series
    All,
    /// Report one currency, unconverted
    Single(String),
}

/// A metrics request over an inclusive month range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsQuery {
    /// `YYYY-MM`, or bare `YYYY` meaning January of that year
    pub from_month: String,
    pub to_month: String,
    pub currency: CurrencyFilter,
    /// Apply user amount/sign/category overrides when resolving transactions
    pub use_overrides: bool,
}

/// Internal-transfer volumes of one metric point; shape depends on the
/// currency scope of the request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransferVolumes {
    Consolidated {
        /// Inbound legs converted to the base currency
        transfers_in_ron: f64,
        /// Outbound legs kept in their original currency
        transfers_out_original: f64,
        transfers_out_currency: Option<String>,
    },
    SingleCurrency {
        transfers_in: f64,
        transfers_out: f64,
    },
}

/// One month of rolled-up figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyMetrics {
    /// `YYYY-MM`
    pub month: String,
    pub currency: String,
    /// Includes inbound internal-transfer volume
    pub revenue_total: f64,
    pub taxes_total: f64,
    pub accountant_total: f64,
    pub car_leasing_total: f64,
    pub leasing_fuel_total: f64,
    pub employees_total: f64,
    pub dividends_total: f64,
    pub other_expenses_total: f64,
    /// Net effective sum of internal-transfer legs (both directions)
    pub transfers_total: f64,
    pub transfers: TransferVolumes,
    /// Blended transfer rate; derivation differs per path
    pub avg_fx_rate: Option<f64>,
    pub total_expenses_operational: f64,
    pub net_income_operational: f64,
    /// Equal to operational net income; carried as its own reporting field
    pub net_cash_after_dividends: f64,
    pub counts_by_category: BTreeMap<String, usize>,
    pub needs_review_count: usize,
}

/// Range totals over a sequence of monthly points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub revenue_total: f64,
    pub taxes_total: f64,
    pub accountant_total: f64,
    pub car_leasing_total: f64,
    pub leasing_fuel_total: f64,
    pub employees_total: f64,
    pub dividends_total: f64,
    pub other_expenses_total: f64,
    pub transfers_total: f64,
    pub transfers: TransferVolumes,
    pub avg_fx_rate: Option<f64>,
    pub total_expenses_operational: f64,
    pub net_income_operational: f64,
    pub net_cash_after_dividends: f64,
    pub needs_review_count: usize,
}

/// First day of a `YYYY-MM` month; bare `YYYY` means January.
///
/// The shape is checked strictly: the month part must be two digits.
pub fn parse_month(value: &str) -> StatementResult<NaiveDate> {
    let value = value.trim();
    let invalid = || StatementError::Validation(format!("Invalid month format: {value}"));

    let bytes = value.as_bytes();
    let padded = if bytes.len() == 4 && bytes.iter().all(u8::is_ascii_digit) {
        format!("{value}-01-01")
    } else if bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit)
    {
        format!("{value}-01")
    } else {
        return Err(invalid());
    };
    NaiveDate::parse_from_str(&padded, "%Y-%m-%d").map_err(|_| invalid())
}

/// Last calendar day of the month containing `date`
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = match date.month() {
        12 => (date.year() + 1, 1),
        m => (date.year(), m + 1),
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

/// Inclusive date range covered by a month range; rejects reversed ranges
pub fn parse_month_range(from_month: &str, to_month: &str) -> StatementResult<(NaiveDate, NaiveDate)> {
    let from = parse_month(from_month)?;
    let to = month_end(parse_month(to_month)?);
    if from > to {
        return Err(StatementError::Validation(format!(
            "Month range start {from_month} is after end {to_month}"
        )));
    }
    Ok((from, to))
}

fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Per-bucket accumulator shared by both paths
#[derive(Default, Clone)]
struct BucketTotals {
    by_category: HashMap<Category, f64>,
    counts: BTreeMap<String, usize>,
    needs_review: usize,
    transfers_in: f64,
    transfers_out: f64,
    /// (weight, rate) pairs for the single-currency blended average
    applied_rates: Vec<(f64, f64)>,
}

impl BucketTotals {
    fn add(&mut self, txn: &Transaction, use_overrides: bool) {
        let category = txn.effective_category(use_overrides);
        let amount = txn.effective_amount(use_overrides).to_f64().unwrap_or_default();

        *self.by_category.entry(category).or_default() += amount;
        *self.counts.entry(category.as_str().to_string()).or_default() += 1;
        if txn.needs_review {
            self.needs_review += 1;
        }

        if txn.is_internal_transfer {
            if txn.direction == Direction::Inflow {
                self.transfers_in += amount.abs();
            } else {
                self.transfers_out += amount.abs();
            }
            if let Some(rate) = txn.fx_rate_applied {
                self.applied_rates.push((amount.abs(), rate));
            }
        }
    }

    fn total(&self, category: Category) -> f64 {
        self.by_category.get(&category).copied().unwrap_or_default()
    }

    fn expense_sum(&self) -> f64 {
        [
            Category::Taxes,
            Category::Accountant,
            Category::CarLeasing,
            Category::LeasingFuel,
            Category::Employees,
            Category::Dividends,
            Category::OtherExpenses,
        ]
        .into_iter()
        .map(|c| self.total(c))
        .sum()
    }
}

pub struct MetricsAggregator {
    rates: FxRateCache,
}

impl MetricsAggregator {
    pub fn new(rates: FxRateCache) -> Self {
        Self { rates }
    }

    /// Roll a pre-filtered transaction set up into ordered monthly points.
    ///
    /// Rate-unavailable is not an error: in the consolidated path a currency
    /// with no current rate is skipped for the request, leaving its rows out
    /// of the converted series.
    pub async fn aggregate(
        &self,
        transactions: &[Transaction],
        currency: &CurrencyFilter,
        use_overrides: bool,
    ) -> Vec<MonthlyMetrics> {
        match currency {
            CurrencyFilter::All => self.aggregate_consolidated(transactions, use_overrides).await,
            CurrencyFilter::Single(code) => {
                aggregate_single_currency(transactions, code, use_overrides)
            }
        }
    }

    async fn aggregate_consolidated(
        &self,
        transactions: &[Transaction],
        use_overrides: bool,
    ) -> Vec<MonthlyMetrics> {
        // One current-day rate per currency for the whole request
        let today = Utc::now().date_naive();
        let mut rate_map: HashMap<String, Option<f64>> = HashMap::new();
        for txn in transactions {
            if !rate_map.contains_key(&txn.account_currency) {
                let rate = self.rates.get_rate(today, &txn.account_currency).await;
                rate_map.insert(txn.account_currency.clone(), rate);
            }
        }

        let mut per_currency_month: BTreeMap<(String, String), BucketTotals> = BTreeMap::new();
        for txn in transactions {
            per_currency_month
                .entry((txn.account_currency.clone(), month_key(txn.txn_date_utc)))
                .or_default()
                .add(txn, use_overrides);
        }

        #[derive(Default)]
        struct MonthAccumulator {
            by_category: HashMap<Category, f64>,
            counts: BTreeMap<String, usize>,
            needs_review: usize,
            transfers_in_ron: f64,
            transfers_out_original: f64,
            transfers_out_currency: Option<String>,
        }

        let mut months: BTreeMap<String, MonthAccumulator> = BTreeMap::new();
        for ((currency, month), bucket) in per_currency_month {
            let Some(Some(rate)) = rate_map.get(&currency).copied() else {
                continue;
            };
            let acc = months.entry(month).or_default();
            for (category, value) in &bucket.by_category {
                *acc.by_category.entry(*category).or_default() += value * rate;
            }
            for (label, count) in &bucket.counts {
                *acc.counts.entry(label.clone()).or_default() += count;
            }
            acc.needs_review += bucket.needs_review;
            acc.transfers_in_ron += bucket.transfers_in * rate;
            if bucket.transfers_out > 0.0 && currency != BASE_CURRENCY {
                acc.transfers_out_original += bucket.transfers_out;
                acc.transfers_out_currency = Some(currency);
            }
        }

        months
            .into_iter()
            .map(|(month, acc)| {
                let total = |c: Category| acc.by_category.get(&c).copied().unwrap_or_default();
                let avg_fx_rate = (acc.transfers_out_original > 0.0)
                    .then(|| acc.transfers_in_ron / acc.transfers_out_original);
                let transfers_out_ron = avg_fx_rate
                    .map(|rate| acc.transfers_out_original * rate)
                    .unwrap_or_default();

                let revenue_total = total(Category::Revenue) + acc.transfers_in_ron;
                let total_expenses = total(Category::Taxes)
                    + total(Category::Accountant)
                    + total(Category::CarLeasing)
                    + total(Category::LeasingFuel)
                    + total(Category::Employees)
                    + total(Category::Dividends)
                    + total(Category::OtherExpenses)
                    + transfers_out_ron;

                MonthlyMetrics {
                    month,
                    currency: BASE_CURRENCY.to_string(),
                    revenue_total: round2(revenue_total),
                    taxes_total: round2(total(Category::Taxes)),
                    accountant_total: round2(total(Category::Accountant)),
                    car_leasing_total: round2(total(Category::CarLeasing)),
                    leasing_fuel_total: round2(total(Category::LeasingFuel)),
                    employees_total: round2(total(Category::Employees)),
                    dividends_total: round2(total(Category::Dividends)),
                    other_expenses_total: round2(total(Category::OtherExpenses)),
                    transfers_total: round2(total(Category::InternalTransfer)),
                    transfers: TransferVolumes::Consolidated {
                        transfers_in_ron: round2(acc.transfers_in_ron),
                        transfers_out_original: round2(acc.transfers_out_original),
                        transfers_out_currency: acc.transfers_out_currency,
                    },
                    avg_fx_rate: avg_fx_rate.map(round4),
                    total_expenses_operational: round2(total_expenses),
                    net_income_operational: round2(revenue_total - total_expenses),
                    net_cash_after_dividends: round2(revenue_total - total_expenses),
                    counts_by_category: acc.counts,
                    needs_review_count: acc.needs_review,
                }
            })
            .collect()
    }

    /// Sum a sequence of monthly points into one rollup.
    ///
    /// The blended rate is recomputed from the summed transfer volumes, not
    /// averaged over the per-month rates; in the single-currency shape no
    /// comparable derivation exists, so it stays unset.
    pub fn summarize(points: &[MonthlyMetrics]) -> MetricsSummary {
        let consolidated = points.iter().all(|p| {
            matches!(p.transfers, TransferVolumes::Consolidated { .. })
        });

        let mut summary = MetricsSummary {
            revenue_total: 0.0,
            taxes_total: 0.0,
            accountant_total: 0.0,
            car_leasing_total: 0.0,
            leasing_fuel_total: 0.0,
            employees_total: 0.0,
            dividends_total: 0.0,
            other_expenses_total: 0.0,
            transfers_total: 0.0,
            transfers: if consolidated {
                TransferVolumes::Consolidated {
                    transfers_in_ron: 0.0,
                    transfers_out_original: 0.0,
                    transfers_out_currency: None,
                }
            } else {
                TransferVolumes::SingleCurrency {
                    transfers_in: 0.0,
                    transfers_out: 0.0,
                }
            },
            avg_fx_rate: None,
            total_expenses_operational: 0.0,
            net_income_operational: 0.0,
            net_cash_after_dividends: 0.0,
            needs_review_count: 0,
        };

        for point in points {
            summary.revenue_total += point.revenue_total;
            summary.taxes_total += point.taxes_total;
            summary.accountant_total += point.accountant_total;
            summary.car_leasing_total += point.car_leasing_total;
            summary.leasing_fuel_total += point.leasing_fuel_total;
            summary.employees_total += point.employees_total;
            summary.dividends_total += point.dividends_total;
            summary.other_expenses_total += point.other_expenses_total;
            summary.transfers_total += point.transfers_total;
            summary.total_expenses_operational += point.total_expenses_operational;
            summary.net_income_operational += point.net_income_operational;
            summary.net_cash_after_dividends += point.net_cash_after_dividends;
            summary.needs_review_count += point.needs_review_count;

            match (&mut summary.transfers, &point.transfers) {
                (
                    TransferVolumes::Consolidated {
                        transfers_in_ron,
                        transfers_out_original,
                        transfers_out_currency,
                    },
                    TransferVolumes::Consolidated {
                        transfers_in_ron: in_ron,
                        transfers_out_original: out_original,
                        transfers_out_currency: out_currency,
                    },
                ) => {
                    *transfers_in_ron += in_ron;
                    *transfers_out_original += out_original;
                    if out_currency.is_some() {
                        *transfers_out_currency = out_currency.clone();
                    }
                }
                (
                    TransferVolumes::SingleCurrency {
                        transfers_in,
                        transfers_out,
                    },
                    TransferVolumes::SingleCurrency {
                        transfers_in: t_in,
                        transfers_out: t_out,
                    },
                ) => {
                    *transfers_in += t_in;
                    *transfers_out += t_out;
                }
                _ => {}
            }
        }

        if let TransferVolumes::Consolidated {
            transfers_in_ron,
            transfers_out_original,
            ..
        } = summary.transfers
        {
            if transfers_out_original > 0.0 {
                summary.avg_fx_rate = Some(round4(transfers_in_ron / transfers_out_original));
            }
        }

        summary.revenue_total = round2(summary.revenue_total);
        summary.taxes_total = round2(summary.taxes_total);
        summary.accountant_total = round2(summary.accountant_total);
        summary.car_leasing_total = round2(summary.car_leasing_total);
        summary.leasing_fuel_total = round2(summary.leasing_fuel_total);
        summary.employees_total = round2(summary.employees_total);
        summary.dividends_total = round2(summary.dividends_total);
        summary.other_expenses_total = round2(summary.other_expenses_total);
        summary.transfers_total = round2(summary.transfers_total);
        summary.total_expenses_operational = round2(summary.total_expenses_operational);
        summary.net_income_operational = round2(summary.net_income_operational);
        summary.net_cash_after_dividends = round2(summary.net_cash_after_dividends);
        if let TransferVolumes::Consolidated {
            transfers_in_ron,
            transfers_out_original,
            ..
        } = &mut summary.transfers
        {
            *transfers_in_ron = round2(*transfers_in_ron);
            *transfers_out_original = round2(*transfers_out_original);
        } else if let TransferVolumes::SingleCurrency {
            transfers_in,
            transfers_out,
        } = &mut summary.transfers
        {
            *transfers_in = round2(*transfers_in);
            *transfers_out = round2(*transfers_out);
        }

        summary
    }
}

fn aggregate_single_currency(
    transactions: &[Transaction],
    currency: &str,
    use_overrides: bool,
) -> Vec<MonthlyMetrics> {
    let mut months: BTreeMap<String, BucketTotals> = BTreeMap::new();
    for txn in transactions {
        if txn.account_currency != currency {
            continue;
        }
        months
            .entry(month_key(txn.txn_date_utc))
            .or_default()
            .add(txn, use_overrides);
    }

    months
        .into_iter()
        .map(|(month, bucket)| {
            // Amount-weighted average of the per-transfer applied rates
            let total_weight: f64 = bucket.applied_rates.iter().map(|(w, _)| w).sum();
            let avg_fx_rate = (total_weight > 0.0).then(|| {
                bucket
                    .applied_rates
                    .iter()
                    .map(|(w, r)| w * r)
                    .sum::<f64>()
                    / total_weight
            });

            let revenue_total = bucket.total(Category::Revenue) + bucket.transfers_in;
            let total_expenses = bucket.expense_sum() + bucket.transfers_out;

            MonthlyMetrics {
                month,
                currency: currency.to_string(),
                revenue_total: round2(revenue_total),
                taxes_total: round2(bucket.total(Category::Taxes)),
                accountant_total: round2(bucket.total(Category::Accountant)),
                car_leasing_total: round2(bucket.total(Category::CarLeasing)),
                leasing_fuel_total: round2(bucket.total(Category::LeasingFuel)),
                employees_total: round2(bucket.total(Category::Employees)),
                dividends_total: round2(bucket.total(Category::Dividends)),
                other_expenses_total: round2(bucket.total(Category::OtherExpenses)),
                transfers_total: round2(bucket.total(Category::InternalTransfer)),
                transfers: TransferVolumes::SingleCurrency {
                    transfers_in: round2(bucket.transfers_in),
                    transfers_out: round2(bucket.transfers_out),
                },
                avg_fx_rate: avg_fx_rate.map(round4),
                total_expenses_operational: round2(total_expenses),
                net_income_operational: round2(revenue_total - total_expenses),
                net_cash_after_dividends: round2(revenue_total - total_expenses),
                counts_by_category: bucket.counts,
                needs_review_count: bucket.needs_review,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RateSource;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;
    use std::sync::Arc;

    struct PerCurrencyRates(HashMap<String, f64>);

    #[async_trait]
    impl RateSource for PerCurrencyRates {
        async fn lookup(&self, _date: NaiveDate, currency: &str) -> Option<f64> {
            self.0.get(currency).copied()
        }
    }

    fn aggregator(rates: Vec<(&str, f64)>) -> MetricsAggregator {
        let map = rates
            .into_iter()
            .map(|(c, r)| (c.to_string(), r))
            .collect();
        MetricsAggregator::new(FxRateCache::new(Arc::new(PerCurrencyRates(map))))
    }

    fn txn(day: u32, currency: &str, category: Category, amount: &str, inflow: bool) -> Transaction {
        let now = chrono::Utc::now().naive_utc();
        let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let amount = BigDecimal::from_str(amount).unwrap();
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            statement_id: "s1".to_string(),
            source_file_name: "statement.pdf".to_string(),
            account_name: format!("{currency} account"),
            account_currency: currency.to_string(),
            account_iban: None,
            period_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            txn_date_utc: date,
            description_raw: "txn".to_string(),
            txn_type_code: None,
            external_txn_id: None,
            from_account: None,
            to_account: None,
            money_out: (!inflow).then(|| amount.clone()),
            money_in: inflow.then(|| amount.clone()),
            balance: None,
            direction: if inflow {
                Direction::Inflow
            } else {
                Direction::Outflow
            },
            amount: amount.clone(),
            signed_amount: if inflow { amount } else { -amount },
            category,
            confidence: 0.90,
            category_reason: "test".to_string(),
            needs_review: false,
            is_internal_transfer: false,
            transfer_group_id: None,
            transfer_from_currency: None,
            transfer_to_currency: None,
            fx_rate_applied: None,
            fx_rate_official: None,
            fx_loss_ron: None,
            amount_override: None,
            sign_override: None,
            category_override: None,
            override_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transfer_leg(day: u32, currency: &str, amount: &str, inflow: bool, rate: Option<f64>) -> Transaction {
        let mut leg = txn(day, currency, Category::OtherExpenses, amount, inflow);
        leg.is_internal_transfer = true;
        leg.fx_rate_applied = rate;
        leg
    }

    #[test]
    fn month_parsing_accepts_year_month_and_bare_year() {
        assert_eq!(
            parse_month("2024-03").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert_eq!(
            parse_month("2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert!(matches!(
            parse_month("03-2024"),
            Err(StatementError::Validation(_))
        ));
        // Month part must be zero-padded to two digits
        assert!(matches!(
            parse_month("2024-3"),
            Err(StatementError::Validation(_))
        ));
        assert!(matches!(
            parse_month("2024-13"),
            Err(StatementError::Validation(_))
        ));
    }

    #[test]
    fn month_range_covers_whole_end_month_and_rejects_reversed() {
        let (from, to) = parse_month_range("2024-01", "2024-02").unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        assert!(matches!(
            parse_month_range("2024-03", "2024-01"),
            Err(StatementError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn consolidated_path_converts_each_currency_at_todays_rate() {
        let txns = vec![
            txn(5, "RON", Category::Revenue, "1000.00", true),
            txn(6, "RON", Category::Taxes, "200.00", false),
            txn(7, "GBP", Category::OtherExpenses, "50.00", false),
        ];
        let points = aggregator(vec![("GBP", 5.80)])
            .aggregate(&txns, &CurrencyFilter::All, false)
            .await;

        assert_eq!(points.len(), 1);
        let point = &points[0];
        assert_eq!(point.currency, "RON");
        assert_eq!(point.revenue_total, 1000.00);
        assert_eq!(point.taxes_total, 200.00);
        assert_eq!(point.other_expenses_total, 290.00);
        assert_eq!(point.total_expenses_operational, 490.00);
        assert_eq!(point.net_income_operational, 510.00);
        assert_eq!(point.net_cash_after_dividends, 510.00);
        assert_eq!(point.needs_review_count, 0);
        assert_eq!(point.counts_by_category.get("Revenue"), Some(&1));
    }

    #[tokio::test]
    async fn currency_without_a_rate_is_dropped_from_the_consolidated_series() {
        let txns = vec![
            txn(5, "RON", Category::Revenue, "1000.00", true),
            txn(6, "CHF", Category::OtherExpenses, "300.00", false),
        ];
        let points = aggregator(vec![])
            .aggregate(&txns, &CurrencyFilter::All, false)
            .await;

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].revenue_total, 1000.00);
        assert_eq!(points[0].other_expenses_total, 0.00);
    }

    #[tokio::test]
    async fn consolidated_transfer_volumes_derive_a_blended_rate() {
        let txns = vec![
            transfer_leg(5, "GBP", "100.00", false, Some(5.75)),
            transfer_leg(5, "RON", "575.00", true, Some(5.75)),
        ];
        let points = aggregator(vec![("GBP", 5.80)])
            .aggregate(&txns, &CurrencyFilter::All, false)
            .await;

        assert_eq!(points.len(), 1);
        let point = &points[0];
        assert_eq!(
            point.transfers,
            TransferVolumes::Consolidated {
                transfers_in_ron: 575.00,
                transfers_out_original: 100.00,
                transfers_out_currency: Some("GBP".to_string()),
            }
        );
        assert_eq!(point.avg_fx_rate, Some(5.75));
        // transfers in count as revenue, transfers out (converted) as expense
        assert_eq!(point.revenue_total, 575.00);
        assert_eq!(point.total_expenses_operational, 575.00);
        assert_eq!(point.net_income_operational, 0.00);
    }

    #[tokio::test]
    async fn single_currency_path_blends_applied_rates_by_amount() {
        let txns = vec![
            transfer_leg(5, "GBP", "100.00", false, Some(5.00)),
            transfer_leg(9, "GBP", "300.00", false, Some(6.00)),
            txn(10, "RON", Category::Revenue, "999.00", true),
        ];
        let points = aggregator(vec![("GBP", 5.80)])
            .aggregate(&txns, &CurrencyFilter::Single("GBP".to_string()), false)
            .await;

        assert_eq!(points.len(), 1);
        let point = &points[0];
        assert_eq!(point.currency, "GBP");
        // (100*5 + 300*6) / 400
        assert_eq!(point.avg_fx_rate, Some(5.75));
        assert_eq!(
            point.transfers,
            TransferVolumes::SingleCurrency {
                transfers_in: 0.00,
                transfers_out: 400.00,
            }
        );
        assert_eq!(point.total_expenses_operational, 400.00);
    }

    #[tokio::test]
    async fn override_gating_controls_the_bucket_contribution() {
        let mut spend = txn(5, "RON", Category::OtherExpenses, "100.00", false);
        spend.amount_override = Some(BigDecimal::from(80));
        spend.sign_override = Some(true);
        let txns = vec![spend];

        let engine = aggregator(vec![]);
        let with = engine.aggregate(&txns, &CurrencyFilter::All, true).await;
        assert_eq!(with[0].other_expenses_total, -80.00);

        let without = engine.aggregate(&txns, &CurrencyFilter::All, false).await;
        assert_eq!(without[0].other_expenses_total, 100.00);
    }

    #[tokio::test]
    async fn category_override_moves_the_amount_between_buckets() {
        let mut spend = txn(5, "RON", Category::OtherExpenses, "150.00", false);
        spend.category_override = Some(Category::Accountant);
        let txns = vec![spend];

        let engine = aggregator(vec![]);
        let with = engine.aggregate(&txns, &CurrencyFilter::All, true).await;
        assert_eq!(with[0].accountant_total, 150.00);
        assert_eq!(with[0].other_expenses_total, 0.00);
    }

    #[tokio::test]
    async fn single_currency_result_matches_the_filtered_all_result_for_base_currency_data() {
        let txns = vec![
            txn(5, "RON", Category::Revenue, "1000.00", true),
            txn(6, "RON", Category::Employees, "400.00", false),
        ];
        let engine = aggregator(vec![]);
        let all = engine.aggregate(&txns, &CurrencyFilter::All, false).await;
        let single = engine
            .aggregate(&txns, &CurrencyFilter::Single("RON".to_string()), false)
            .await;

        assert_eq!(all[0].revenue_total, single[0].revenue_total);
        assert_eq!(all[0].employees_total, single[0].employees_total);
        assert_eq!(
            all[0].net_income_operational,
            single[0].net_income_operational
        );
    }

    #[tokio::test]
    async fn months_are_emitted_in_ascending_order() {
        let txns = vec![
            txn(5, "RON", Category::Revenue, "10.00", true),
            {
                let mut later = txn(5, "RON", Category::Revenue, "20.00", true);
                later.txn_date_utc = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
                later
            },
            {
                let mut middle = txn(5, "RON", Category::Revenue, "15.00", true);
                middle.txn_date_utc = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
                middle
            },
        ];
        let points = aggregator(vec![])
            .aggregate(&txns, &CurrencyFilter::All, false)
            .await;
        let months: Vec<&str> = points.iter().map(|p| p.month.as_str()).collect();
        assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);
    }

    #[tokio::test]
    async fn summary_recomputes_the_blended_rate_from_summed_volumes() {
        let txns = vec![
            transfer_leg(5, "GBP", "100.00", false, Some(5.75)),
            transfer_leg(5, "RON", "575.00", true, Some(5.75)),
            {
                let mut out = transfer_leg(5, "GBP", "200.00", false, Some(6.00));
                out.txn_date_utc = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
                out
            },
            {
                let mut inbound = transfer_leg(5, "RON", "1200.00", true, Some(6.00));
                inbound.txn_date_utc = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
                inbound
            },
        ];
        let points = aggregator(vec![("GBP", 5.80)])
            .aggregate(&txns, &CurrencyFilter::All, false)
            .await;
        assert_eq!(points.len(), 2);

        let summary = MetricsAggregator::summarize(&points);
        // (575 + 1200) / (100 + 200), not the mean of 5.75 and 6.0
        assert_eq!(summary.avg_fx_rate, Some(round4(1775.0 / 300.0)));
        assert_eq!(summary.revenue_total, 1775.00);
        assert_eq!(
            summary.net_cash_after_dividends,
            summary.net_income_operational
        );
        assert_eq!(summary.needs_review_count, 0);
    }

    #[test]
    fn summary_of_single_currency_points_has_no_blended_rate() {
        let point = MonthlyMetrics {
            month: "2024-01".to_string(),
            currency: "GBP".to_string(),
            revenue_total: 0.0,
            taxes_total: 0.0,
            accountant_total: 0.0,
            car_leasing_total: 0.0,
            leasing_fuel_total: 0.0,
            employees_total: 0.0,
            dividends_total: 0.0,
            other_expenses_total: 0.0,
            transfers_total: 0.0,
            transfers: TransferVolumes::SingleCurrency {
                transfers_in: 10.0,
                transfers_out: 20.0,
            },
            avg_fx_rate: Some(5.75),
            total_expenses_operational: 20.0,
            net_income_operational: -10.0,
            net_cash_after_dividends: -10.0,
            counts_by_category: BTreeMap::new(),
            needs_review_count: 1,
        };
        let summary = MetricsAggregator::summarize(&[point]);
        assert_eq!(summary.avg_fx_rate, None);
        assert_eq!(
            summary.transfers,
            TransferVolumes::SingleCurrency {
                transfers_in: 10.0,
                transfers_out: 20.0,
            }
        );
        assert_eq!(summary.needs_review_count, 1);
    }
}
