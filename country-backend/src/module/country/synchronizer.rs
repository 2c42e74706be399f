//! Country refresh: pull the upstream catalog and rates, derive GDP
//! estimates and reconcile them into the store by case-insensitive name.

use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::info;

use super::gateway::CountryGateway;
use super::store::CountryStore;
use super::types::{CatalogEntry, NewCountry, RefreshReport};
use crate::error::Result;

/// Range of the per-country GDP multiplier, inclusive
pub const GDP_MULTIPLIER_RANGE: RangeInclusive<u32> = 1000..=2000;

/// Resolved writes for one run
#[derive(Debug, Default)]
pub struct RefreshPlan {
    pub inserts: Vec<NewCountry>,
    /// Existing id paired with its replacement row
    pub updates: Vec<(i64, NewCountry)>,
}

/// `population * multiplier / rate`, or 0 without a usable rate.
pub fn estimate_gdp(population: u64, exchange_rate: Option<f64>, multiplier: u32) -> f64 {
    match exchange_rate {
        Some(rate) if rate.is_finite() && rate > 0.0 => {
            population as f64 * f64::from(multiplier) / rate
        }
        _ => 0.0,
    }
}

fn usable_rate(rates: &HashMap<String, f64>, code: Option<&str>) -> Option<f64> {
    code.and_then(|code| rates.get(code))
        .copied()
        .filter(|rate| rate.is_finite() && *rate > 0.0)
}

/// Derive every row and split them against the identity snapshot.
///
/// Duplicate names within the catalog collapse to the last one seen.
pub fn plan_refresh<R: Rng>(
    catalog: Vec<CatalogEntry>,
    rates: &HashMap<String, f64>,
    index: &HashMap<String, i64>,
    refreshed_at: DateTime<Utc>,
    rng: &mut R,
) -> RefreshPlan {
    let mut rows: Vec<NewCountry> = Vec::with_capacity(catalog.len());
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(catalog.len());

    for entry in catalog {
        let exchange_rate = usable_rate(rates, entry.currency_code.as_deref());
        let multiplier = rng.random_range(GDP_MULTIPLIER_RANGE);

        let row = NewCountry {
            estimated_gdp: estimate_gdp(entry.population, exchange_rate, multiplier),
            exchange_rate,
            name: entry.name,
            capital: entry.capital,
            region: entry.region,
            population: entry.population,
            currency_code: entry.currency_code,
            flag_url: entry.flag_url,
            last_refreshed_at: refreshed_at,
        };

        match positions.get(&row.name_key()) {
            Some(&pos) => {
                tracing::warn!("Duplicate catalog entry for {}, keeping the last one", row.name);
                rows[pos] = row;
            }
            None => {
                positions.insert(row.name_key(), rows.len());
                rows.push(row);
            }
        }
    }

    let mut plan = RefreshPlan::default();
    for row in rows {
        match index.get(&row.name_key()) {
            Some(&id) => plan.updates.push((id, row)),
            None => plan.inserts.push(row),
        }
    }
    plan
}

/// Shared timestamp for every row touched by one run.
///
/// Millisecond precision, which is what the store keeps.
fn run_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub struct Synchronizer {
    store: CountryStore,
    gateway: Arc<dyn CountryGateway>,
    reference_currency: String,
    /// Fixed multiplier seed; `None` draws a fresh OS seed per run
    gdp_seed: Option<u64>,
}

impl Synchronizer {
    pub fn new(
        store: CountryStore,
        gateway: Arc<dyn CountryGateway>,
        reference_currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            reference_currency: reference_currency.into(),
            gdp_seed: None,
        }
    }

    pub fn with_gdp_seed(mut self, seed: Option<u64>) -> Self {
        self.gdp_seed = seed;
        self
    }

    fn multiplier_rng(&self) -> StdRng {
        match self.gdp_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// One full refresh. Both upstream fetches must succeed before anything
    /// is written.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let refreshed_at = run_timestamp();
        info!("Refreshing countries (reference currency {})", self.reference_currency);

        let (catalog, rates) = tokio::try_join!(
            self.gateway.fetch_country_catalog(),
            self.gateway.fetch_exchange_rates(&self.reference_currency)
        )?;
        info!("Fetched {} countries and {} exchange rates", catalog.len(), rates.len());

        let index = self.store.name_index().await?;
        let plan = plan_refresh(catalog, &rates, &index, refreshed_at, &mut self.multiplier_rng());

        self.store.apply(&plan.inserts, &plan.updates).await?;
        let (total_countries, _) = self.store.count_and_last_refresh().await?;

        info!(
            "Refresh complete: {} inserted, {} updated, {} total",
            plan.inserts.len(),
            plan.updates.len(),
            total_countries
        );

        Ok(RefreshReport {
            inserted: plan.inserts.len(),
            updated: plan.updates.len(),
            refreshed_at,
            total_countries,
        })
    }
}
