//! Cross-currency internal transfer reconciliation
//!
//! Pairs the outbound foreign-currency leg of an internal exchange with its
//! same-day inbound base-currency leg, using the provider's stated FX rate to
//! predict the inbound amount. Matched legs share a transfer group id and,
//! when the official historical rate resolves, carry the realized-vs-official
//! conversion loss.
//!
//! Runs over in-memory transactions before they are persisted, so a
//! statement is never stored half-reconciled. Matching is greedy and
//! deterministic, which also makes re-running it a no-op.

use bigdecimal::ToPrimitive;

use crate::fx::FxRateCache;
use crate::types::{
    is_internal_transfer_code, Transaction, BASE_CURRENCY, TRANSFER_CURRENCY, TRANSFER_IN_CODE,
    TRANSFER_OUT_CODE,
};

/// Maximum allowed distance, in base currency units, between the actual
/// inbound amount and the amount the stated rate predicts
const MATCH_TOLERANCE: f64 = 5.0;

pub struct TransferReconciler {
    rates: FxRateCache,
}

impl TransferReconciler {
    pub fn new(rates: FxRateCache) -> Self {
        Self { rates }
    }

    /// Flag and pair transfer legs in place.
    ///
    /// Every transfer-coded leg first gets a provisional self-group (its
    /// external transaction id, else its own id); pairing then overwrites the
    /// group on both legs of each accepted match.
    pub async fn reconcile(&self, transactions: &mut [Transaction]) {
        for txn in transactions.iter_mut() {
            let is_leg = txn
                .txn_type_code
                .as_deref()
                .map_or(false, is_internal_transfer_code);
            if is_leg {
                txn.is_internal_transfer = true;
                txn.transfer_group_id = Some(
                    txn.external_txn_id
                        .clone()
                        .unwrap_or_else(|| txn.id.clone()),
                );
            }
        }

        let outbound: Vec<usize> = transactions
            .iter()
            .enumerate()
            .filter(|(_, t)| is_outbound_leg(t))
            .map(|(i, _)| i)
            .collect();

        let mut consumed: Vec<usize> = Vec::new();

        for out_idx in outbound {
            let candidates: Vec<usize> = transactions
                .iter()
                .enumerate()
                .filter(|(i, t)| {
                    !consumed.contains(i) && is_inbound_candidate(t, &transactions[out_idx])
                })
                .map(|(i, _)| i)
                .collect();
            let Some(&first_candidate) = candidates.first() else {
                continue;
            };

            // The stated rate lives on whichever leg mentioned it
            let rate = transactions[out_idx]
                .fx_rate_applied
                .or(transactions[first_candidate].fx_rate_applied);
            let Some(rate) = rate else { continue };

            let Some(gbp_amount) = transactions[out_idx]
                .money_out
                .as_ref()
                .and_then(|a| a.to_f64())
            else {
                continue;
            };
            let expected_ron = gbp_amount * rate;

            let best = candidates
                .into_iter()
                .filter_map(|i| {
                    let ron = transactions[i].money_in.as_ref().and_then(|a| a.to_f64())?;
                    Some((i, ron, (ron - expected_ron).abs()))
                })
                .min_by(|a, b| a.2.total_cmp(&b.2));
            let Some((in_idx, ron_amount, distance)) = best else {
                continue;
            };
            if distance > MATCH_TOLERANCE {
                continue;
            }

            let group_id = transactions[out_idx]
                .external_txn_id
                .clone()
                .or_else(|| transactions[in_idx].external_txn_id.clone())
                .unwrap_or_else(|| transactions[out_idx].id.clone());

            let official = self
                .rates
                .get_rate(transactions[out_idx].txn_date_utc, TRANSFER_CURRENCY)
                .await;

            for &idx in &[out_idx, in_idx] {
                let leg = &mut transactions[idx];
                leg.transfer_group_id = Some(group_id.clone());
                leg.transfer_from_currency = Some(TRANSFER_CURRENCY.to_string());
                leg.transfer_to_currency = Some(BASE_CURRENCY.to_string());
                // A failed lookup leaves the pair grouped but without rates.
                // The loss is stored at full precision; rounding is for
                // presentation layers.
                if let Some(official) = official {
                    leg.fx_rate_official = Some(official);
                    leg.fx_rate_applied = Some(rate);
                    leg.fx_loss_ron = Some(official * gbp_amount - ron_amount);
                }
            }

            consumed.push(in_idx);
        }
    }
}

fn is_outbound_leg(txn: &Transaction) -> bool {
    txn.txn_type_code.as_deref() == Some(TRANSFER_OUT_CODE)
        && txn.account_currency == TRANSFER_CURRENCY
        && txn.money_out.is_some()
}

fn is_inbound_candidate(txn: &Transaction, outbound: &Transaction) -> bool {
    txn.txn_type_code.as_deref() == Some(TRANSFER_IN_CODE)
        && txn.account_currency == BASE_CURRENCY
        && txn.money_in.is_some()
        && txn.txn_date_utc == outbound.txn_date_utc
}
