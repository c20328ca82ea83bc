pub mod error;
pub mod models;
pub mod store;

pub use error::{StateError, StateResult};
pub use models::{CachedScan, HistoryEntry, WhitelistEntry};
pub use store::{SqliteStateStore, SqliteStateStoreBuilder};
