//! Read-side access to stored countries

use super::store::CountryStore;
use super::types::{CountryFilter, CountryRecord, SortSpec, StatusSummary};
use crate::error::{AppError, Result};

/// Listing parameters as they arrive on the query string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub region: Option<String>,
    pub currency: Option<String>,
    /// `<field>_<asc|desc>`
    pub sort: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

impl ListQuery {
    /// Build from raw query pairs. A repeated key keeps its last value and
    /// unknown keys are ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "region" => query.region = Some(value),
                "currency" => query.currency = Some(value),
                "sort" => query.sort = Some(value),
                _ => {}
            }
        }
        query
    }

    pub fn filter(&self) -> CountryFilter {
        CountryFilter {
            region: present(&self.region),
            currency_code: present(&self.currency),
        }
    }

    /// Unrecognised sort input is ignored rather than rejected.
    pub fn sort_spec(&self) -> Option<SortSpec> {
        let raw = self.sort.as_deref().filter(|s| !s.is_empty())?;
        let spec = SortSpec::parse(raw);
        if spec.is_none() {
            tracing::debug!("Ignoring unrecognised sort '{}'", raw);
        }
        spec
    }
}

#[derive(Clone)]
pub struct CountryQueries {
    store: CountryStore,
}

impl CountryQueries {
    pub fn new(store: CountryStore) -> Self {
        Self { store }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<CountryRecord>> {
        Ok(self.store.find_all(&query.filter(), query.sort_spec()).await?)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<CountryRecord> {
        self.store
            .find_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(name.to_string()))
    }

    pub async fn delete_by_name(&self, name: &str) -> Result<()> {
        if self.store.delete_by_name(name).await? {
            tracing::info!("Deleted country {}", name);
            Ok(())
        } else {
            Err(AppError::NotFound(name.to_string()))
        }
    }

    pub async fn status(&self) -> Result<StatusSummary> {
        let (total_countries, last_refreshed_at) = self.store.count_and_last_refresh().await?;
        Ok(StatusSummary { total_countries, last_refreshed_at })
    }
}
