//! Country data types shared by the store, gateway and synchronizer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted country row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    pub id: i64,
    pub name: String,
    pub capital: Option<String>,
    pub region: Option<String>,
    pub population: u64,
    pub currency_code: Option<String>,
    /// Local currency units per one unit of the reference currency
    pub exchange_rate: Option<f64>,
    pub estimated_gdp: f64,
    pub flag_url: Option<String>,
    pub last_refreshed_at: DateTime<Utc>,
}

/// A fully derived row ready to be written, without an identity yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewCountry {
    pub name: String,
    pub capital: Option<String>,
    pub region: Option<String>,
    pub population: u64,
    pub currency_code: Option<String>,
    pub exchange_rate: Option<f64>,
    pub estimated_gdp: f64,
    pub flag_url: Option<String>,
    pub last_refreshed_at: DateTime<Utc>,
}

impl NewCountry {
    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }
}

/// One entry of the upstream country catalog
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogEntry {
    pub name: String,
    pub capital: Option<String>,
    pub region: Option<String>,
    pub population: u64,
    pub flag_url: Option<String>,
    /// First currency listed upstream
    pub currency_code: Option<String>,
}

/// Equality filters for listing; both optional, combined with AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryFilter {
    pub region: Option<String>,
    pub currency_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    EstimatedGdp,
    Population,
    Name,
    ExchangeRate,
}

impl SortField {
    fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "gdp" | "estimated_gdp" => Some(Self::EstimatedGdp),
            "population" => Some(Self::Population),
            "name" => Some(Self::Name),
            "exchange" | "exchange_rate" => Some(Self::ExchangeRate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    /// Parse `<field>_<asc|desc>` or a bare `<field>`.
    ///
    /// Anything other than `desc` sorts ascending. Unrecognised fields yield
    /// `None`, meaning "leave unsorted".
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();

        if let Some((field, direction)) = input.rsplit_once('_') {
            if let Some(field) = SortField::from_key(field) {
                let direction = if direction.eq_ignore_ascii_case("desc") {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                return Some(Self { field, direction });
            }
        }

        SortField::from_key(input).map(|field| Self {
            field,
            direction: SortDirection::Asc,
        })
    }
}

/// Row count and most recent refresh timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    pub total_countries: u64,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

/// Outcome of one refresh run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub inserted: usize,
    pub updated: usize,
    pub refreshed_at: DateTime<Utc>,
    pub total_countries: u64,
}

/// Case-insensitive identity key for a country name
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_key() {
        assert_eq!(name_key("Nigeria"), "nigeria");
        assert_eq!(name_key("  NIGERIA "), "nigeria");
        assert_eq!(name_key("Åland Islands"), "åland islands");
    }

    #[test]
    fn test_sort_spec_parse() {
        assert_eq!(
            SortSpec::parse("gdp_desc"),
            Some(SortSpec { field: SortField::EstimatedGdp, direction: SortDirection::Desc })
        );
        assert_eq!(
            SortSpec::parse("estimated_gdp_asc"),
            Some(SortSpec { field: SortField::EstimatedGdp, direction: SortDirection::Asc })
        );
        assert_eq!(
            SortSpec::parse("exchange_rate"),
            Some(SortSpec { field: SortField::ExchangeRate, direction: SortDirection::Asc })
        );
        assert_eq!(
            SortSpec::parse("population"),
            Some(SortSpec { field: SortField::Population, direction: SortDirection::Asc })
        );
        assert_eq!(
            SortSpec::parse("name_DESC"),
            Some(SortSpec { field: SortField::Name, direction: SortDirection::Desc })
        );
        assert_eq!(
            SortSpec::parse("population_sideways"),
            Some(SortSpec { field: SortField::Population, direction: SortDirection::Asc })
        );
        assert_eq!(SortSpec::parse("area_desc"), None);
        assert_eq!(SortSpec::parse(""), None);
    }
}
