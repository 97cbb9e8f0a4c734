//! `HistoricalStore` implementation: the durable per-(symbol, asset_type,
//! date) record table. Grounded on the teacher's
//! `market_data::repository::MarketDataRepository` quote-table shape,
//! generalized from a single `quotes` table to the richer
//! `historical_records` row carrying every OHLC/NAV/gold field.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;

use vnquote_core::{enumerate_dates, AssetType, CoreResult, HistoricalRecord, HistoricalStore};

use crate::db::{DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::model::{asset_type_to_str, historical_record_from_row, HistoricalRecordParams};

pub struct SqliteHistoricalStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteHistoricalStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

/// `col IS NULL OR CAST(col AS REAL) = 0`, the SQL-side mirror of
/// `HistoricalRecord::is_placeholder`'s `zero_or_none`, applied to one
/// table-qualified price column.
fn zero_or_none(table: &str, col: &str) -> String {
    format!("({table}.{col} IS NULL OR CAST({table}.{col} AS REAL) = 0)")
}

/// Conjunction of `zero_or_none` over every price field `is_placeholder`
/// checks, for `table` (either `excluded` or `historical_records`).
fn is_placeholder_sql(table: &str) -> String {
    ["open", "high", "low", "close", "nav", "buy_price", "sell_price"]
        .iter()
        .map(|col| zero_or_none(table, col))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn insert_records(conn: &rusqlite::Connection, records: &[HistoricalRecord]) -> CoreResult<()> {
    // A placeholder write (every price field absent/zero) must never
    // clobber a real row already on disk; real writes always win, and
    // placeholder-over-placeholder is a no-op either way. See spec.md
    // §3/§4.3/§9.
    let guard = format!("NOT ({incoming}) OR ({existing})", incoming = is_placeholder_sql("excluded"), existing = is_placeholder_sql("historical_records"));
    let sql = format!(
        "INSERT INTO historical_records
            (symbol, asset_type, date, open, high, low, close, adjclose, volume, nav, buy_price, sell_price, data_json, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(symbol, asset_type, date) DO UPDATE SET
            open = excluded.open, high = excluded.high, low = excluded.low, close = excluded.close,
            adjclose = excluded.adjclose, volume = excluded.volume, nav = excluded.nav,
            buy_price = excluded.buy_price, sell_price = excluded.sell_price,
            data_json = excluded.data_json, updated_at = excluded.updated_at
         WHERE {guard}"
    );
    for record in records {
        let p = HistoricalRecordParams::from(record);
        conn.execute(
            &sql,
            params![
                p.symbol, p.asset_type, p.date, p.open, p.high, p.low, p.close, p.adjclose, p.volume, p.nav,
                p.buy_price, p.sell_price, p.data_json, p.updated_at,
            ],
        )
        .into_core()?;
    }
    Ok(())
}

#[async_trait]
impl HistoricalStore for SqliteHistoricalStore {
    async fn store(&self, records: &[HistoricalRecord]) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let records = records.to_vec();
        self.writer.exec(move |conn| insert_records(conn, &records)).await
    }

    async fn cached_dates_in_range(&self, symbol: &str, asset_type: AssetType, start: NaiveDate, end: NaiveDate) -> CoreResult<HashSet<NaiveDate>> {
        let pool = self.pool.clone();
        let symbol = symbol.to_uppercase();
        let asset_type_str = asset_type_to_str(asset_type).to_string();
        let start_str = start.format("%Y-%m-%d").to_string();
        let end_str = end.format("%Y-%m-%d").to_string();
        tokio::task::spawn_blocking(move || -> CoreResult<HashSet<NaiveDate>> {
            let conn = pool.get().into_core()?;
            let mut stmt = conn
                .prepare("SELECT date FROM historical_records WHERE symbol = ?1 AND asset_type = ?2 AND date BETWEEN ?3 AND ?4")
                .into_core()?;
            let rows = stmt.query_map(params![symbol, asset_type_str, start_str, end_str], |row| row.get::<_, String>(0)).into_core()?;
            let mut dates = HashSet::new();
            for row in rows {
                let s = row.into_core()?;
                if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                    dates.insert(d);
                }
            }
            Ok(dates)
        })
        .await
        .map_err(|e| vnquote_core::CoreError::Internal(format!("blocking task join error: {e}")))?
    }

    async fn cached_records_in_range(&self, symbol: &str, asset_type: AssetType, start: NaiveDate, end: NaiveDate) -> CoreResult<Vec<HistoricalRecord>> {
        let pool = self.pool.clone();
        let symbol = symbol.to_uppercase();
        let asset_type_str = asset_type_to_str(asset_type).to_string();
        let start_str = start.format("%Y-%m-%d").to_string();
        let end_str = end.format("%Y-%m-%d").to_string();
        tokio::task::spawn_blocking(move || -> CoreResult<Vec<HistoricalRecord>> {
            let conn = pool.get().into_core()?;
            let mut stmt = conn
                .prepare(
                    "SELECT * FROM historical_records WHERE symbol = ?1 AND asset_type = ?2 AND date BETWEEN ?3 AND ?4 ORDER BY date ASC",
                )
                .into_core()?;
            let rows = stmt.query_map(params![symbol, asset_type_str, start_str, end_str], historical_record_from_row).into_core()?;
            let mut records = Vec::new();
            for row in rows {
                let record = row.into_core()?;
                if !record.is_placeholder() {
                    records.push(record);
                }
            }
            Ok(records)
        })
        .await
        .map_err(|e| vnquote_core::CoreError::Internal(format!("blocking task join error: {e}")))?
    }

    async fn most_recent_record(&self, symbol: &str, asset_type: AssetType, lookback_days: i64, as_of: NaiveDate) -> CoreResult<Option<HistoricalRecord>> {
        let pool = self.pool.clone();
        let symbol = symbol.to_uppercase();
        let asset_type_str = asset_type_to_str(asset_type).to_string();
        let floor = (as_of - chrono::Duration::days(lookback_days)).format("%Y-%m-%d").to_string();
        let as_of_str = as_of.format("%Y-%m-%d").to_string();
        tokio::task::spawn_blocking(move || -> CoreResult<Option<HistoricalRecord>> {
            let conn = pool.get().into_core()?;
            let mut stmt = conn
                .prepare(
                    "SELECT * FROM historical_records
                     WHERE symbol = ?1 AND asset_type = ?2 AND date BETWEEN ?3 AND ?4
                       AND (close IS NOT NULL OR nav IS NOT NULL OR buy_price IS NOT NULL OR sell_price IS NOT NULL)
                     ORDER BY date DESC LIMIT 20",
                )
                .into_core()?;
            let rows = stmt.query_map(params![symbol, asset_type_str, floor, as_of_str], historical_record_from_row).into_core()?;
            for row in rows {
                let record = row.into_core()?;
                if !record.is_placeholder() {
                    return Ok(Some(record));
                }
            }
            Ok(None)
        })
        .await
        .map_err(|e| vnquote_core::CoreError::Internal(format!("blocking task join error: {e}")))?
    }

    async fn mark_fetched(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
        policy: &dyn vnquote_core::AssetCachePolicy,
        now: DateTime<Utc>,
    ) -> CoreResult<usize> {
        let cached = self.cached_dates_in_range(symbol, asset_type, start, end).await?;
        let missing: Vec<NaiveDate> = enumerate_dates(start, end).into_iter().filter(|d| !cached.contains(d)).collect();
        if missing.is_empty() {
            return Ok(0);
        }
        let placeholders = policy.mark_fetched(symbol, asset_type, &missing, now);
        if placeholders.is_empty() {
            return Ok(0);
        }
        let count = placeholders.len();
        self.writer.exec(move |conn| insert_records(conn, &placeholders)).await?;
        Ok(count)
    }

    async fn delete_placeholders_older_than(&self, before: DateTime<Utc>) -> CoreResult<usize> {
        let before_str = before.to_rfc3339();
        self.writer
            .exec(move |conn| {
                let deleted = conn
                    .execute(
                        "DELETE FROM historical_records
                         WHERE updated_at < ?1
                           AND close IS NULL AND nav IS NULL AND buy_price IS NULL AND sell_price IS NULL",
                        params![before_str],
                    )
                    .into_core()?;
                Ok(deleted)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, spawn_writer};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use vnquote_core::{default_policy_for, LegacySharedPolicy};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 0, 0, 0).unwrap()
    }

    async fn test_store() -> SqliteHistoricalStore {
        let pool = create_pool(":memory:").unwrap();
        run_migrations(&pool).unwrap();
        let writer = spawn_writer((*pool).clone());
        SqliteHistoricalStore::new(pool, writer)
    }

    #[tokio::test]
    async fn store_then_read_range_round_trips() {
        let store = test_store().await;
        let date = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let mut record = HistoricalRecord::placeholder("VNM", AssetType::Stock, date, now());
        record.close = Some(dec!(125000));
        store.store(&[record]).await.unwrap();

        let records = store.cached_records_in_range("vnm", AssetType::Stock, date, date).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].close, Some(dec!(125000)));
    }

    #[tokio::test]
    async fn placeholder_rows_are_excluded_from_cached_records_but_count_as_cached_dates() {
        let store = test_store().await;
        let date = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let placeholder = HistoricalRecord::placeholder("VNM", AssetType::Stock, date, now());
        store.store(&[placeholder]).await.unwrap();

        assert!(store.cached_records_in_range("VNM", AssetType::Stock, date, date).await.unwrap().is_empty());
        assert!(store.cached_dates_in_range("VNM", AssetType::Stock, date, date).await.unwrap().contains(&date));
    }

    #[tokio::test]
    async fn mark_fetched_with_no_placeholder_policy_writes_nothing() {
        let store = test_store().await;
        let start = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 10, 2).unwrap();
        let written = store.mark_fetched("VNM", AssetType::Stock, start, end, default_policy_for(AssetType::Stock), now()).await.unwrap();
        assert_eq!(written, 0);
        assert!(store.cached_dates_in_range("VNM", AssetType::Stock, start, end).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_fetched_with_legacy_policy_writes_placeholders_for_missing_dates() {
        let store = test_store().await;
        let start = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 10, 2).unwrap();
        let written = store.mark_fetched("VN.GOLD", AssetType::Gold, start, end, &LegacySharedPolicy, now()).await.unwrap();
        assert_eq!(written, 2);
        let cached = store.cached_dates_in_range("VN.GOLD", AssetType::Gold, start, end).await.unwrap();
        assert_eq!(cached.len(), 2);
    }

    #[tokio::test]
    async fn legacy_policy_placeholder_write_never_clobbers_an_existing_real_record() {
        let store = test_store().await;
        let date = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let mut real = HistoricalRecord::placeholder("VN.GOLD", AssetType::Gold, date, now());
        real.close = Some(dec!(8200000));
        store.store(&[real]).await.unwrap();

        // mark_fetched under the legacy policy sees the date as missing from
        // its own vantage point and tries to lay down a placeholder for it;
        // the real row underneath must survive.
        let start = date;
        let end = date;
        let cached_before = store.cached_dates_in_range("VN.GOLD", AssetType::Gold, start, end).await.unwrap();
        assert!(cached_before.contains(&date));
        let placeholder = HistoricalRecord::placeholder("VN.GOLD", AssetType::Gold, date, now());
        store.store(&[placeholder]).await.unwrap();

        let records = store.cached_records_in_range("VN.GOLD", AssetType::Gold, start, end).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].close, Some(dec!(8200000)));
    }

    #[tokio::test]
    async fn delete_placeholders_older_than_removes_only_stale_placeholders() {
        let store = test_store().await;
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let old_now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let placeholder = HistoricalRecord::placeholder("VNM", AssetType::Stock, date, old_now);
        let mut real = HistoricalRecord::placeholder("VNM", AssetType::Stock, date + chrono::Duration::days(1), now());
        real.close = Some(dec!(1));
        store.store(&[placeholder, real]).await.unwrap();

        let deleted = store.delete_placeholders_older_than(now() - chrono::Duration::days(90)).await.unwrap();
        assert_eq!(deleted, 1);
    }
}
