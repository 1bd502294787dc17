//! SQLite persistence for the news signal pipeline: reference catalog,
//! news and mentions, signals, recommendations and daily prices.

pub mod catalog;
pub mod db;
pub mod error;
pub mod news;
pub mod prices;
pub mod recommendations;
pub mod signals;

pub use catalog::SqlResearchCatalog;
pub use db::SignalDb;
pub use error::{StoreError, StoreResult};
pub use news::ScoredNewsBatch;
pub use prices::SqlPriceSource;
pub use signals::SignalWriteSummary;
