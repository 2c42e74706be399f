//! Country dataset: persistence, upstream sources, refresh and queries.

pub mod types;
pub mod store;
pub mod gateway;
pub mod synchronizer;
pub mod query;

pub use gateway::{CountryGateway, GatewayError, HttpGateway};
pub use query::{CountryQueries, ListQuery};
pub use store::CountryStore;
pub use synchronizer::Synchronizer;
pub use types::{CountryRecord, RefreshReport, StatusSummary};
