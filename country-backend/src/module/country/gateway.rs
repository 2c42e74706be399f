//! Upstream data sources: the country catalog and the exchange-rate feed.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

use super::types::CatalogEntry;
use crate::config::BackendConfig;

const USER_AGENT: &str = concat!("country-backend/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

/// Source of upstream country data
#[async_trait]
pub trait CountryGateway: Send + Sync {
    async fn fetch_country_catalog(&self) -> Result<Vec<CatalogEntry>, GatewayError>;

    /// Rates are local currency units per one unit of `reference_currency`.
    async fn fetch_exchange_rates(
        &self,
        reference_currency: &str,
    ) -> Result<HashMap<String, f64>, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct UpstreamCountry {
    name: String,
    #[serde(default)]
    capital: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    population: Option<u64>,
    #[serde(default)]
    flag: Option<String>,
    #[serde(default)]
    currencies: Option<Vec<UpstreamCurrency>>,
}

#[derive(Debug, Deserialize)]
struct UpstreamCurrency {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamRates {
    #[serde(default)]
    result: Option<String>,
    #[serde(default, rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    rates: Option<HashMap<String, f64>>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl From<UpstreamCountry> for CatalogEntry {
    fn from(country: UpstreamCountry) -> Self {
        let currency_code = country
            .currencies
            .and_then(|list| list.into_iter().next())
            .and_then(|currency| non_blank(currency.code));

        Self {
            name: country.name.trim().to_string(),
            capital: non_blank(country.capital),
            region: non_blank(country.region),
            population: country.population.unwrap_or(0),
            flag_url: non_blank(country.flag),
            currency_code,
        }
    }
}

/// Decode a catalog body, dropping entries without a usable name.
pub fn parse_catalog(url: &str, body: &[u8]) -> Result<Vec<CatalogEntry>, GatewayError> {
    let countries: Vec<UpstreamCountry> = decode(url, body)?;
    let total = countries.len();

    let entries: Vec<CatalogEntry> = countries
        .into_iter()
        .map(CatalogEntry::from)
        .filter(|entry| !entry.name.is_empty())
        .collect();

    if entries.len() < total {
        tracing::warn!("Skipped {} catalog entries without a name", total - entries.len());
    }
    Ok(entries)
}

pub fn parse_rates(url: &str, body: &[u8]) -> Result<HashMap<String, f64>, GatewayError> {
    let rates: UpstreamRates = decode(url, body)?;

    if rates.result.as_deref() == Some("error") {
        return Err(GatewayError::Malformed {
            url: url.to_string(),
            reason: format!(
                "provider reported error: {}",
                rates.error_type.as_deref().unwrap_or("unknown")
            ),
        });
    }
    rates.rates.ok_or_else(|| GatewayError::Malformed {
        url: url.to_string(),
        reason: "missing field `rates`".to_string(),
    })
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(body).map_err(|e| GatewayError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// HTTP implementation against restcountries-style and open.er-api-style endpoints
pub struct HttpGateway {
    client: Client,
    countries_url: String,
    /// Contains a `{currency}` placeholder
    rates_url: String,
}

impl HttpGateway {
    pub fn new(
        countries_url: impl Into<String>,
        rates_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            countries_url: countries_url.into(),
            rates_url: rates_url.into(),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.countries_url.clone(),
            config.rates_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn rates_url_for(&self, reference_currency: &str) -> String {
        self.rates_url.replace("{currency}", reference_currency)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| GatewayError::Request { url: url.to_string(), source })?;

        if !response.status().is_success() {
            return Err(GatewayError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| GatewayError::Request { url: url.to_string(), source })?;

        Ok(body.to_vec())
    }
}

#[async_trait]
impl CountryGateway for HttpGateway {
    async fn fetch_country_catalog(&self) -> Result<Vec<CatalogEntry>, GatewayError> {
        let body = self.get_bytes(&self.countries_url).await?;
        let entries = parse_catalog(&self.countries_url, &body)?;
        tracing::debug!("Fetched {} catalog entries", entries.len());
        Ok(entries)
    }

    async fn fetch_exchange_rates(
        &self,
        reference_currency: &str,
    ) -> Result<HashMap<String, f64>, GatewayError> {
        let url = self.rates_url_for(reference_currency);
        let body = self.get_bytes(&url).await?;
        let rates = parse_rates(&url, &body)?;
        tracing::debug!("Fetched {} exchange rates against {}", rates.len(), reference_currency);
        Ok(rates)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Serves fixed data, or fails when configured to.
    #[derive(Clone, Default)]
    pub struct FixtureGateway {
        pub catalog: Vec<CatalogEntry>,
        pub rates: HashMap<String, f64>,
        pub fail_catalog: bool,
        pub fail_rates: bool,
    }

    impl FixtureGateway {
        pub fn new(catalog: Vec<CatalogEntry>, rates: &[(&str, f64)]) -> Self {
            Self {
                catalog,
                rates: rates.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl CountryGateway for FixtureGateway {
        async fn fetch_country_catalog(&self) -> Result<Vec<CatalogEntry>, GatewayError> {
            if self.fail_catalog {
                return Err(GatewayError::Status {
                    url: "fixture://countries".to_string(),
                    status: StatusCode::SERVICE_UNAVAILABLE,
                });
            }
            Ok(self.catalog.clone())
        }

        async fn fetch_exchange_rates(
            &self,
            _reference_currency: &str,
        ) -> Result<HashMap<String, f64>, GatewayError> {
            if self.fail_rates {
                return Err(GatewayError::Malformed {
                    url: "fixture://rates".to_string(),
                    reason: "missing field `rates`".to_string(),
                });
            }
            Ok(self.rates.clone())
        }
    }

    pub fn entry(name: &str, region: &str, population: u64, currency: Option<&str>) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            capital: None,
            region: Some(region.to_string()),
            population,
            flag_url: None,
            currency_code: currency.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog() {
        let body = br#"[
            {"name": "Nigeria", "capital": "Abuja", "region": "Africa", "population": 200000000,
             "flag": "https://flagcdn.com/ng.svg", "currencies": [{"code": "NGN", "name": "Naira"}]},
            {"name": "Antarctica", "region": "Polar", "population": 1000},
            {"name": "Zimbabwe", "capital": "", "region": "Africa", "population": 14000000,
             "currencies": [{"code": "BWP"}, {"code": "USD"}]},
            {"name": "  "}
        ]"#;

        let entries = parse_catalog("test://countries", body).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].name, "Nigeria");
        assert_eq!(entries[0].capital.as_deref(), Some("Abuja"));
        assert_eq!(entries[0].currency_code.as_deref(), Some("NGN"));
        assert_eq!(entries[0].flag_url.as_deref(), Some("https://flagcdn.com/ng.svg"));

        assert_eq!(entries[1].currency_code, None);
        assert_eq!(entries[1].capital, None);

        // First listed currency wins, blank capital is absent
        assert_eq!(entries[2].currency_code.as_deref(), Some("BWP"));
        assert_eq!(entries[2].capital, None);
    }

    #[test]
    fn test_parse_catalog_malformed() {
        let err = parse_catalog("test://countries", br#"{"message": "nope"}"#).unwrap_err();
        assert!(matches!(err, GatewayError::Malformed { .. }));
    }

    #[test]
    fn test_parse_rates() {
        let body = br#"{"result": "success", "base_code": "USD", "rates": {"USD": 1, "NGN": 1600.5}}"#;
        let rates = parse_rates("test://rates", body).unwrap();
        assert_eq!(rates.get("NGN"), Some(&1600.5));
        assert_eq!(rates.get("USD"), Some(&1.0));

        let err = parse_rates("test://rates", br#"{"result": "error", "error-type": "unsupported-code"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unsupported-code"));

        assert!(parse_rates("test://rates", br#"{"result": "success"}"#).is_err());
    }

    #[test]
    fn test_rates_url_substitution() {
        let gateway = HttpGateway::new(
            "http://localhost/countries",
            "http://localhost/latest/{currency}",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(gateway.rates_url_for("EUR"), "http://localhost/latest/EUR");
    }

    #[tokio::test]
    #[ignore] // Requires network connection
    async fn test_fetch_live_sources() {
        let gateway = HttpGateway::from_config(&BackendConfig::default()).unwrap();
        let catalog = gateway.fetch_country_catalog().await.unwrap();
        let rates = gateway.fetch_exchange_rates("USD").await.unwrap();
        assert!(!catalog.is_empty());
        assert!(rates.contains_key("EUR"));
    }
}
