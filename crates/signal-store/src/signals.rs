//! Signal write-back for both scoring paths

use chrono::{DateTime, Duration, Utc};
use signal_core::{Contribution, EntityKind, NewsWindowScore, Signal};
use sqlx::SqliteConnection;
use std::collections::HashMap;

use crate::db::{decode_ts, encode_ts, SignalDb};
use crate::error::StoreResult;

fn table_for(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::Company => ("company_signals", "company_id"),
        EntityKind::Industry => ("industry_signals", "industry_id"),
    }
}

/// Counts reported by a signal write-back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalWriteSummary {
    pub deleted: u64,
    pub upserted: u64,
}

async fn upsert_kind(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    signals: &[Signal],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    overwrite: bool,
) -> StoreResult<SignalWriteSummary> {
    let (table, column) = table_for(kind);
    let mut summary = SignalWriteSummary::default();

    if overwrite {
        let sql = format!("DELETE FROM {table} WHERE window_start <= ? AND window_end >= ?");
        summary.deleted = sqlx::query(&sql)
            .bind(encode_ts(window_start))
            .bind(encode_ts(window_end))
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }

    let sql = format!(
        r#"
        INSERT INTO {table} ({column}, window_start, window_end, score, details, top_news_ids, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT({column}, window_start, window_end) DO UPDATE SET
            score = excluded.score,
            details = excluded.details,
            top_news_ids = excluded.top_news_ids,
            updated_at = excluded.updated_at
        "#
    );
    for signal in signals.iter().filter(|s| s.entity_kind == kind) {
        sqlx::query(&sql)
            .bind(signal.entity_id)
            .bind(encode_ts(signal.window_start))
            .bind(encode_ts(signal.window_end))
            .bind(signal.score)
            .bind(serde_json::to_string(&signal.details)?)
            .bind(serde_json::to_string(&signal.top_news_ids)?)
            .bind(encode_ts(signal.updated_at))
            .execute(&mut *conn)
            .await?;
        summary.upserted += 1;
    }

    Ok(summary)
}

impl SignalDb {
    /// Upsert rollup signals of one kind in a single transaction.
    ///
    /// With `overwrite`, every existing signal of that kind whose window
    /// fully contains `[window_start, window_end]` is deleted first. The
    /// news window score fields are never touched by the upsert.
    pub async fn write_signals(
        &self,
        kind: EntityKind,
        signals: &[Signal],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        overwrite: bool,
    ) -> StoreResult<SignalWriteSummary> {
        let mut tx = self.pool().begin().await?;
        let summary = upsert_kind(&mut tx, kind, signals, window_start, window_end, overwrite).await?;
        tx.commit().await?;
        Ok(summary)
    }

    /// Write a whole rollup in one transaction. Industry signals (and the
    /// industry overwrite) are skipped when `industries` is `None`.
    pub async fn write_rollup(
        &self,
        companies: &[Signal],
        industries: Option<&[Signal]>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        overwrite: bool,
    ) -> StoreResult<SignalWriteSummary> {
        let mut tx = self.pool().begin().await?;
        let mut summary = upsert_kind(
            &mut tx,
            EntityKind::Company,
            companies,
            window_start,
            window_end,
            overwrite,
        )
        .await?;
        if let Some(industries) = industries {
            let industry = upsert_kind(
                &mut tx,
                EntityKind::Industry,
                industries,
                window_start,
                window_end,
                overwrite,
            )
            .await?;
            summary.deleted += industry.deleted;
            summary.upserted += industry.upserted;
        }
        tx.commit().await?;
        Ok(summary)
    }

    /// Signals of one kind for an exact window, ordered by entity id
    pub async fn signals_for_window(
        &self,
        kind: EntityKind,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> StoreResult<Vec<Signal>> {
        let (table, column) = table_for(kind);
        let sql = format!(
            "SELECT {column}, window_start, window_end, score, details, top_news_ids, updated_at
             FROM {table} WHERE window_start = ? AND window_end = ?
             ORDER BY {column}"
        );
        let rows: Vec<(i64, String, String, f64, String, String, String)> = sqlx::query_as(&sql)
            .bind(encode_ts(window_start))
            .bind(encode_ts(window_end))
            .fetch_all(self.pool())
            .await?;

        rows.into_iter()
            .map(|(entity_id, ws, we, score, details, top, updated)| -> StoreResult<Signal> {
                let details: Vec<Contribution> = serde_json::from_str(&details)?;
                Ok(Signal {
                    entity_kind: kind,
                    entity_id,
                    window_start: decode_ts(table, &ws)?,
                    window_end: decode_ts(table, &we)?,
                    score,
                    details,
                    top_news_ids: serde_json::from_str(&top)?,
                    updated_at: decode_ts(table, &updated)?,
                })
            })
            .collect()
    }

    /// Overwrite the news window score fields in one transaction.
    ///
    /// Each score lands on the entity's latest signal row. An entity with no
    /// signal row gets one spanning `lookback` up to its aggregation time,
    /// with a zero rollup score.
    pub async fn write_news_window_scores(
        &self,
        scores: &[NewsWindowScore],
        lookback: Duration,
    ) -> StoreResult<u64> {
        let mut tx = self.pool().begin().await?;
        let mut written = 0;

        for s in scores {
            let (table, column) = table_for(s.entity_kind);
            let aggregated_at = encode_ts(s.last_aggregated_at);
            let update_sql = format!(
                "UPDATE {table} SET window_score = ?, window_count = ?, last_aggregated_at = ?
                 WHERE id = (SELECT id FROM {table} WHERE {column} = ?
                             ORDER BY window_end DESC, id DESC LIMIT 1)"
            );
            let updated = sqlx::query(&update_sql)
                .bind(s.window_score)
                .bind(s.window_count)
                .bind(&aggregated_at)
                .bind(s.entity_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if updated == 0 {
                let insert_sql = format!(
                    "INSERT INTO {table} ({column}, window_start, window_end, window_score,
                                          window_count, last_aggregated_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)"
                );
                sqlx::query(&insert_sql)
                    .bind(s.entity_id)
                    .bind(encode_ts(s.last_aggregated_at - lookback))
                    .bind(&aggregated_at)
                    .bind(s.window_score)
                    .bind(s.window_count)
                    .bind(&aggregated_at)
                    .bind(&aggregated_at)
                    .execute(&mut *tx)
                    .await?;
            }
            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Latest aggregated news window score per entity
    pub async fn news_window_scores(&self, kind: EntityKind) -> StoreResult<HashMap<i64, f64>> {
        let (table, column) = table_for(kind);
        let sql = format!(
            "SELECT {column}, window_score FROM {table}
             WHERE last_aggregated_at IS NOT NULL
             ORDER BY {column}, last_aggregated_at, window_end, id"
        );
        let rows: Vec<(i64, f64)> = sqlx::query_as(&sql).fetch_all(self.pool()).await?;

        // Later rows per entity overwrite earlier ones
        Ok(rows.into_iter().collect())
    }
}
