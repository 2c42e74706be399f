//! SQLite-backed country store.
//!
//! Rows are keyed by a surrogate `id`, with case-insensitive name identity
//! enforced through the derived `name_key` column.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

use super::types::{
    name_key, CountryFilter, CountryRecord, NewCountry, SortDirection, SortField, SortSpec,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS countries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_key TEXT NOT NULL UNIQUE,
    capital TEXT,
    region TEXT,
    population INTEGER NOT NULL CHECK (population >= 0),
    currency_code TEXT,
    exchange_rate REAL,
    estimated_gdp REAL NOT NULL DEFAULT 0 CHECK (estimated_gdp >= 0),
    flag_url TEXT,
    last_refreshed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS countries_region_idx ON countries(region);
CREATE INDEX IF NOT EXISTS countries_currency_idx ON countries(currency_code);
"#;

const SELECT_COLUMNS: &str = "SELECT id, name, capital, region, population, currency_code, \
     exchange_rate, estimated_gdp, flag_url, last_refreshed_at FROM countries";

/// Handle to the `countries` table. Cheap to clone.
#[derive(Clone)]
pub struct CountryStore {
    pool: SqlitePool,
}

impl CountryStore {
    /// Open (or create) a file database, e.g. `sqlite://data/countries.db`.
    pub async fn connect(database_url: &str) -> sqlx::Result<Self> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        if let Some(parent) = opts.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        info!("Opened country store at {}", database_url);
        Self::with_pool(pool).await
    }

    /// Private in-memory database, used by tests and throwaway instances.
    ///
    /// Pinned to a single connection that never expires: every SQLite
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> sqlx::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> sqlx::Result<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn find_all(
        &self,
        filter: &CountryFilter,
        sort: Option<SortSpec>,
    ) -> sqlx::Result<Vec<CountryRecord>> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        qb.push(" WHERE 1 = 1");

        if let Some(region) = filter.region.as_deref() {
            qb.push(" AND region = ").push_bind(region);
        }
        if let Some(currency) = filter.currency_code.as_deref() {
            qb.push(" AND currency_code = ").push_bind(currency);
        }

        qb.push(" ORDER BY ");
        if let Some(sort) = sort {
            qb.push(sort_column(sort.field));
            qb.push(match sort.direction {
                SortDirection::Asc => " ASC, ",
                SortDirection::Desc => " DESC, ",
            });
        }
        qb.push("id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    pub async fn find_by_name(&self, name: &str) -> sqlx::Result<Option<CountryRecord>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE name_key = ?1"))
            .bind(name_key(name))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    /// Insert, or update in place when the name already exists (any casing).
    pub async fn upsert(&self, country: &NewCountry) -> sqlx::Result<i64> {
        let mut conn = self.pool.acquire().await?;
        upsert_row(&mut *conn, country).await
    }

    pub async fn delete_by_name(&self, name: &str) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM countries WHERE name_key = ?1")
            .bind(name_key(name))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_and_last_refresh(&self) -> sqlx::Result<(u64, Option<DateTime<Utc>>)> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, MAX(last_refreshed_at) AS latest FROM countries",
        )
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        let latest: Option<String> = row.try_get("latest")?;
        let latest = latest.as_deref().map(decode_timestamp).transpose()?;

        Ok((u64::try_from(total).unwrap_or_default(), latest))
    }

    /// Snapshot of every stored identity, keyed by case-folded name.
    pub async fn name_index(&self) -> sqlx::Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT id, name_key FROM countries")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> sqlx::Result<(String, i64)> {
                Ok((row.try_get("name_key")?, row.try_get("id")?))
            })
            .collect()
    }

    /// Write resolved inserts and updates in one transaction.
    ///
    /// An update whose id vanished since the snapshot (deleted concurrently)
    /// is written as an upsert instead.
    pub async fn apply(
        &self,
        inserts: &[NewCountry],
        updates: &[(i64, NewCountry)],
    ) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;

        for (id, country) in updates {
            if !update_row(&mut *tx, *id, country).await? {
                debug!("Country {} (id {}) disappeared, re-inserting", country.name, id);
                upsert_row(&mut *tx, country).await?;
            }
        }
        for country in inserts {
            upsert_row(&mut *tx, country).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::EstimatedGdp => "estimated_gdp",
        SortField::Population => "population",
        SortField::Name => "name_key",
        SortField::ExchangeRate => "exchange_rate",
    }
}

async fn upsert_row(conn: &mut SqliteConnection, country: &NewCountry) -> sqlx::Result<i64> {
    let row = sqlx::query(
        r#"
INSERT INTO countries
  (name, name_key, capital, region, population, currency_code,
   exchange_rate, estimated_gdp, flag_url, last_refreshed_at)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(name_key) DO UPDATE SET
  name = excluded.name,
  capital = excluded.capital,
  region = excluded.region,
  population = excluded.population,
  currency_code = excluded.currency_code,
  exchange_rate = excluded.exchange_rate,
  estimated_gdp = excluded.estimated_gdp,
  flag_url = excluded.flag_url,
  last_refreshed_at = MAX(countries.last_refreshed_at, excluded.last_refreshed_at)
RETURNING id
"#,
    )
    .bind(&country.name)
    .bind(country.name_key())
    .bind(&country.capital)
    .bind(&country.region)
    .bind(encode_population(country.population))
    .bind(&country.currency_code)
    .bind(country.exchange_rate)
    .bind(country.estimated_gdp)
    .bind(&country.flag_url)
    .bind(encode_timestamp(country.last_refreshed_at))
    .fetch_one(&mut *conn)
    .await?;

    row.try_get("id")
}

/// Returns false when no row has this id.
async fn update_row(conn: &mut SqliteConnection, id: i64, country: &NewCountry) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
UPDATE countries SET
  name = ?1,
  name_key = ?2,
  capital = ?3,
  region = ?4,
  population = ?5,
  currency_code = ?6,
  exchange_rate = ?7,
  estimated_gdp = ?8,
  flag_url = ?9,
  last_refreshed_at = MAX(last_refreshed_at, ?10)
WHERE id = ?11
"#,
    )
    .bind(&country.name)
    .bind(country.name_key())
    .bind(&country.capital)
    .bind(&country.region)
    .bind(encode_population(country.population))
    .bind(&country.currency_code)
    .bind(country.exchange_rate)
    .bind(country.estimated_gdp)
    .bind(&country.flag_url)
    .bind(encode_timestamp(country.last_refreshed_at))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn row_to_record(row: &SqliteRow) -> sqlx::Result<CountryRecord> {
    let population: i64 = row.try_get("population")?;
    let refreshed: String = row.try_get("last_refreshed_at")?;

    Ok(CountryRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        capital: row.try_get("capital")?,
        region: row.try_get("region")?,
        population: u64::try_from(population).unwrap_or_default(),
        currency_code: row.try_get("currency_code")?,
        exchange_rate: row.try_get("exchange_rate")?,
        estimated_gdp: row.try_get("estimated_gdp")?,
        flag_url: row.try_get("flag_url")?,
        last_refreshed_at: decode_timestamp(&refreshed)?,
    })
}

fn encode_population(population: u64) -> i64 {
    i64::try_from(population).unwrap_or(i64::MAX)
}

/// Fixed-width RFC 3339 so that text comparison matches time order.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_timestamp(raw: &str) -> sqlx::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
