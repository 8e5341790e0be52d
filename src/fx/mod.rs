//! Historical FX rate lookup with weekend/holiday fallback and memoization

pub mod bnr;

pub use bnr::BnrRateSource;

use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::traits::RateSource;
use crate::types::BASE_CURRENCY;

/// How many days back to walk when the feed has no rate for the requested
/// date (weekends and bank holidays publish nothing)
const FALLBACK_DAYS: i64 = 9;

/// Memoizing front for a [`RateSource`]
///
/// Successful lookups are cached under the requested date, including ones
/// resolved through the fallback walk, so the walk runs at most once per
/// (date, currency). Failed lookups are not cached and will be retried.
#[derive(Clone)]
pub struct FxRateCache {
    source: Arc<dyn RateSource>,
    cache: Arc<RwLock<HashMap<(NaiveDate, String), f64>>>,
}

impl FxRateCache {
    pub fn new(source: Arc<dyn RateSource>) -> Self {
        Self {
            source,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Rate converting one unit of `currency` into the base currency on
    /// `date`, falling back up to [`FALLBACK_DAYS`] earlier days.
    ///
    /// The base currency itself always resolves to 1.0 without touching the
    /// feed. `None` means no rate was found in the whole window.
    pub async fn get_rate(&self, date: NaiveDate, currency: &str) -> Option<f64> {
        if currency == BASE_CURRENCY {
            return Some(1.0);
        }

        let key = (date, currency.to_string());
        if let Some(rate) = self.cache.read().unwrap().get(&key) {
            return Some(*rate);
        }

        for offset in 0..=FALLBACK_DAYS {
            let lookup_date = date - Duration::days(offset);
            if let Some(rate) = self.source.lookup(lookup_date, currency).await {
                self.cache.write().unwrap().insert(key, rate);
                return Some(rate);
            }
        }
        None
    }
}
