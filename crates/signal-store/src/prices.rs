use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use signal_core::{Bar, PipelineError, PriceSeries, PriceSource};

use crate::db::{decode_ts, encode_ts, SignalDb};
use crate::error::StoreResult;

impl SignalDb {
    /// Insert or replace daily bars of one symbol in a single transaction
    pub async fn upsert_bars(&self, symbol: &str, bars: &[Bar]) -> StoreResult<u64> {
        let mut tx = self.pool().begin().await?;

        for bar in bars {
            sqlx::query(
                r#"
                INSERT INTO price_bars (symbol, ts, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol, ts) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume
                "#,
            )
            .bind(symbol)
            .bind(encode_ts(bar.timestamp))
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(bars.len() as u64)
    }

    /// Bars of `symbol` in `[start, end]`, oldest first
    pub async fn bars_between(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Bar>> {
        let rows: Vec<(String, f64, f64, f64, f64, f64)> = sqlx::query_as(
            "SELECT ts, open, high, low, close, volume FROM price_bars
             WHERE symbol = ? AND ts >= ? AND ts <= ?
             ORDER BY ts",
        )
        .bind(symbol)
        .bind(encode_ts(start))
        .bind(encode_ts(end))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|(ts, open, high, low, close, volume)| -> StoreResult<Bar> {
                Ok(Bar {
                    timestamp: decode_ts("price_bars", &ts)?,
                    open,
                    high,
                    low,
                    close,
                    volume,
                })
            })
            .collect()
    }
}

/// Price history read from the `price_bars` table
#[derive(Clone)]
pub struct SqlPriceSource {
    db: SignalDb,
    end: DateTime<Utc>,
}

impl SqlPriceSource {
    pub fn new(db: SignalDb) -> Self {
        Self {
            db,
            end: Utc::now(),
        }
    }

    /// Pin the end of every lookback window
    pub fn ending_at(mut self, end: DateTime<Utc>) -> Self {
        self.end = end;
        self
    }
}

#[async_trait]
impl PriceSource for SqlPriceSource {
    async fn price_history(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Option<PriceSeries>, PipelineError> {
        let start = self.end - Duration::days(i64::from(lookback_days));
        let bars = self.db.bars_between(symbol, start, self.end).await?;
        if bars.is_empty() {
            return Ok(None);
        }
        Ok(Some(PriceSeries::new(symbol, bars)))
    }
}
