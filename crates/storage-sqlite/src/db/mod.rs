//! Connection pooling, migrations, and the single-writer actor.
//! Grounded on the teacher's `src-core/src/db.rs` pool/migration shape,
//! adapted from Diesel to `rusqlite` + `r2d2_sqlite` per the stack swap
//! recorded in DESIGN.md.

mod write_actor;

use std::sync::Arc;
use std::time::Duration;

use log::info;
use r2d2_sqlite::SqliteConnectionManager;

use crate::errors::{IntoCore, StorageError};
use vnquote_core::CoreResult;

pub use write_actor::{spawn_writer, WriteHandle};

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const MIGRATIONS: &[&str] = &[include_str!("../migrations/0001_init.sql")];

pub fn create_pool(db_path: &str) -> CoreResult<Arc<DbPool>> {
    info!("creating sqlite connection pool at {db_path}");
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
    });
    let pool = r2d2::Pool::builder()
        .max_size(8)
        .min_idle(Some(1))
        .connection_timeout(Duration::from_secs(30))
        .build(manager)
        .into_core()?;
    Ok(Arc::new(pool))
}

pub fn run_migrations(pool: &DbPool) -> CoreResult<()> {
    info!("running database migrations");
    let conn = get_connection(pool)?;
    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        conn.execute_batch(migration).map_err(|e| StorageError::MigrationFailed(format!("migration {idx}: {e}")))?;
    }
    Ok(())
}

pub fn get_connection(pool: &DbPool) -> CoreResult<DbConnection> {
    pool.get().into_core()
}
