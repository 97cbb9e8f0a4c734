//! SQLite storage implementation for the VN market data cache service.
//!
//! Implements the persistence traits defined in `vnquote-core`
//! (`HistoricalStore`, `PersistentQuoteCache`, `PersistentSearchCache`,
//! `AssetCatalog`) against a single SQLite database using `rusqlite` +
//! `r2d2`. This is the only crate in the workspace where `rusqlite`
//! appears; everything above it works against the `vnquote-core`
//! traits.
//!
//! ```text
//! core (domain traits)
//!        │
//!        ▼
//! storage-sqlite (this crate)
//!        │
//!        ▼
//!     SQLite DB
//! ```
//!
//! Reads go straight to a pooled connection via `spawn_blocking`; writes
//! are serialized through a single writer actor (see [`db::write_actor`])
//! to avoid `SQLITE_BUSY` contention under WAL mode.

pub mod assets;
pub mod db;
pub mod errors;
pub mod historical;
pub mod model;
pub mod quote_cache;
pub mod search_cache;

pub use assets::SqliteAssetCatalog;
pub use db::{create_pool, get_connection, run_migrations, spawn_writer, DbConnection, DbPool, WriteHandle};
pub use errors::{IntoCore, StorageError};
pub use historical::SqliteHistoricalStore;
pub use quote_cache::SqlitePersistentQuoteCache;
pub use search_cache::SqlitePersistentSearchCache;
