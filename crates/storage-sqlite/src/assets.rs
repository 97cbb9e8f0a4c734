//! `AssetCatalog` implementation: the canonical identity table populated
//! by the Seeder and by search/quote side effects. Grounded on the
//! teacher's `assets::assets_repository::AssetRepository` pool-for-reads
//! / writer-actor-for-writes split.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use vnquote_core::{Asset, AssetCatalog, CoreResult, SearchHit};

use crate::db::{DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::model::{asset_from_row, asset_type_to_str};

pub struct SqliteAssetCatalog {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteAssetCatalog {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl AssetCatalog for SqliteAssetCatalog {
    async fn upsert_many(&self, assets: &[Asset]) -> CoreResult<usize> {
        if assets.is_empty() {
            return Ok(0);
        }
        let assets = assets.to_vec();
        self.writer
            .exec(move |conn| {
                let mut written = 0;
                for asset in &assets {
                    let metadata_json = asset.metadata.as_ref().map(|m| serde_json::to_string(m).unwrap_or_default());
                    conn.execute(
                        "INSERT INTO assets (symbol, name, asset_type, asset_class, asset_sub_class, exchange, currency, data_source, metadata_json)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                         ON CONFLICT(symbol) DO UPDATE SET
                             name = excluded.name,
                             asset_type = excluded.asset_type,
                             asset_class = excluded.asset_class,
                             asset_sub_class = excluded.asset_sub_class,
                             exchange = excluded.exchange,
                             currency = excluded.currency,
                             data_source = excluded.data_source,
                             metadata_json = excluded.metadata_json",
                        rusqlite::params![
                            asset.symbol,
                            asset.name,
                            asset_type_to_str(asset.asset_type),
                            asset.asset_class,
                            asset.asset_sub_class,
                            asset.exchange,
                            asset.currency,
                            asset.data_source,
                            metadata_json,
                        ],
                    )
                    .into_core()?;
                    written += 1;
                }
                Ok(written)
            })
            .await
    }

    async fn get(&self, symbol: &str) -> CoreResult<Option<Asset>> {
        let pool = self.pool.clone();
        let symbol = symbol.to_uppercase();
        tokio::task::spawn_blocking(move || -> CoreResult<Option<Asset>> {
            let conn = pool.get().into_core()?;
            let mut stmt = conn.prepare("SELECT * FROM assets WHERE symbol = ?1").into_core()?;
            let result = stmt.query_row(rusqlite::params![symbol], asset_from_row).optional().into_core()?;
            Ok(result)
        })
        .await
        .map_err(|e| vnquote_core::CoreError::Internal(format!("blocking task join error: {e}")))?
    }

    async fn search_by_text(&self, query: &str, limit: usize) -> CoreResult<Vec<SearchHit>> {
        let pool = self.pool.clone();
        let like_pattern = format!("%{}%", query.to_uppercase());
        tokio::task::spawn_blocking(move || -> CoreResult<Vec<SearchHit>> {
            let conn = pool.get().into_core()?;
            let mut stmt = conn
                .prepare("SELECT * FROM assets WHERE symbol LIKE ?1 OR UPPER(name) LIKE ?1 ORDER BY symbol LIMIT ?2")
                .into_core()?;
            let rows = stmt
                .query_map(rusqlite::params![like_pattern, limit as i64], |row| {
                    let asset = asset_from_row(row)?;
                    Ok(SearchHit {
                        symbol: asset.symbol,
                        name: asset.name,
                        asset_type: asset.asset_type,
                        asset_class: asset.asset_class,
                        asset_sub_class: asset.asset_sub_class,
                        exchange: asset.exchange,
                        currency: asset.currency,
                        data_source: asset.data_source,
                    })
                })
                .into_core()?;
            let mut hits = Vec::new();
            for row in rows {
                hits.push(row.into_core()?);
            }
            Ok(hits)
        })
        .await
        .map_err(|e| vnquote_core::CoreError::Internal(format!("blocking task join error: {e}")))?
    }

    async fn count(&self) -> CoreResult<usize> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> CoreResult<usize> {
            let conn = pool.get().into_core()?;
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0)).into_core()?;
            Ok(count as usize)
        })
        .await
        .map_err(|e| vnquote_core::CoreError::Internal(format!("blocking task join error: {e}")))?
    }
}
