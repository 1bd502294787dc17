//! News items, chunks, mentions and structured scores

use chrono::{DateTime, Utc};
use signal_core::{Mention, NewsChunk, ScoredNewsItem, TargetType};
use signal_rollup::parse_news_scores;
use std::collections::HashMap;
use tracing::warn;

use crate::db::{decode_ts, encode_ts, SignalDb};
use crate::error::StoreResult;

/// Scored news loaded for the window, plus ids whose payload failed to parse
#[derive(Debug, Default)]
pub struct ScoredNewsBatch {
    pub items: Vec<ScoredNewsItem>,
    pub malformed: Vec<i64>,
}

/// Ticker-looking surface text kept alongside company mentions
fn mention_ticker(mention: &Mention) -> Option<&str> {
    let surface = mention.surface_text.as_str();
    let looks_like_ticker = mention.target_type == TargetType::Company
        && !surface.is_empty()
        && surface
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.');
    looks_like_ticker.then_some(surface)
}

impl SignalDb {
    pub async fn insert_news_item(
        &self,
        id: i64,
        title: &str,
        url: Option<&str>,
        published_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO news_items (id, title, url, published_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                url = excluded.url,
                published_at = excluded.published_at
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(url)
        .bind(encode_ts(published_at))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn insert_news_chunk(&self, news_id: i64, chunk_index: i32, text: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO news_chunks (news_id, chunk_index, text) VALUES (?, ?, ?)
             ON CONFLICT(news_id, chunk_index) DO UPDATE SET text = excluded.text",
        )
        .bind(news_id)
        .bind(chunk_index)
        .bind(text)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn link_news_company(&self, news_id: i64, company_id: i64) -> StoreResult<()> {
        sqlx::query("INSERT OR IGNORE INTO news_item_companies (news_id, company_id) VALUES (?, ?)")
            .bind(news_id)
            .bind(company_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn link_news_industry(&self, news_id: i64, industry_id: i64) -> StoreResult<()> {
        sqlx::query("INSERT OR IGNORE INTO news_item_industries (news_id, industry_id) VALUES (?, ?)")
            .bind(news_id)
            .bind(industry_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Store the raw scorer output for a news item (replacing any earlier one)
    pub async fn save_news_score(
        &self,
        news_id: i64,
        payload: &str,
        scored_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO news_scores (news_id, payload, scored_at) VALUES (?, ?, ?)
             ON CONFLICT(news_id) DO UPDATE SET
                payload = excluded.payload,
                scored_at = excluded.scored_at",
        )
        .bind(news_id)
        .bind(payload)
        .bind(encode_ts(scored_at))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Chunks of news published at or after `since`, newest news first and
    /// chunk index ascending within an item.
    pub async fn chunks_since(
        &self,
        since: DateTime<Utc>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<NewsChunk>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows: Vec<(i64, i32, String, String)> = sqlx::query_as(
            r#"
            SELECT c.news_id, c.chunk_index, c.text, n.published_at
            FROM news_chunks c
            JOIN news_items n ON n.id = c.news_id
            WHERE n.published_at >= ?
            ORDER BY n.published_at DESC, c.news_id, c.chunk_index
            LIMIT ?
            "#,
        )
        .bind(encode_ts(since))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|(news_id, chunk_index, text, published_at)| -> StoreResult<NewsChunk> {
                Ok(NewsChunk {
                    news_id,
                    chunk_index,
                    text,
                    published_at: decode_ts("news_items", &published_at)?,
                })
            })
            .collect()
    }

    /// Append mentions, ignoring ones already recorded for the same chunk
    /// and target. Returns how many rows were inserted.
    pub async fn insert_mentions(&self, mentions: &[Mention]) -> StoreResult<u64> {
        let mut tx = self.pool().begin().await?;
        let mut inserted = 0;

        for m in mentions {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO news_entities (
                    news_id, chunk_id, surface_text, start_char, end_char, normalized_key,
                    ticker, lexical_score, semantic_score, final_score, target_type, target_id, method
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(m.news_id)
            .bind(m.chunk_index)
            .bind(&m.surface_text)
            .bind(m.start_char as i64)
            .bind(m.end_char as i64)
            .bind(&m.normalized_key)
            .bind(mention_ticker(m))
            .bind(m.lexical_score)
            .bind(m.semantic_score)
            .bind(m.final_score)
            .bind(m.target_type.as_str())
            .bind(m.target_id)
            .bind(&m.method)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn mention_count(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM news_entities")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    /// Scored news published at or after `since`, oldest first, with their
    /// linked companies and industries.
    pub async fn scored_news_since(&self, since: DateTime<Utc>) -> StoreResult<ScoredNewsBatch> {
        let since = encode_ts(since);
        let rows: Vec<(i64, String, String, String)> = sqlx::query_as(
            r#"
            SELECT s.news_id, s.payload, s.scored_at, n.published_at
            FROM news_scores s
            JOIN news_items n ON n.id = s.news_id
            WHERE n.published_at >= ?
            ORDER BY n.published_at, s.news_id
            "#,
        )
        .bind(&since)
        .fetch_all(self.pool())
        .await?;

        let company_links = self
            .links_since("news_item_companies", "company_id", &since)
            .await?;
        let industry_links = self
            .links_since("news_item_industries", "industry_id", &since)
            .await?;

        let mut batch = ScoredNewsBatch::default();
        for (news_id, raw, scored_at, published_at) in rows {
            let published_at = decode_ts("news_items", &published_at)?;
            let scored_at = decode_ts("news_scores", &scored_at)?;
            match parse_news_scores(&raw, Some(published_at), scored_at) {
                Ok(payload) => batch.items.push(ScoredNewsItem {
                    news_id,
                    published_at,
                    payload,
                    linked_company_ids: company_links.get(&news_id).cloned().unwrap_or_default(),
                    linked_industry_ids: industry_links.get(&news_id).cloned().unwrap_or_default(),
                }),
                Err(e) => {
                    warn!("Skipping news {} score payload: {}", news_id, e);
                    batch.malformed.push(news_id);
                }
            }
        }

        Ok(batch)
    }

    async fn links_since(
        &self,
        table: &str,
        column: &str,
        since: &str,
    ) -> StoreResult<HashMap<i64, Vec<i64>>> {
        let sql = format!(
            "SELECT l.news_id, l.{column} FROM {table} l
             JOIN news_items n ON n.id = l.news_id
             WHERE n.published_at >= ?
             ORDER BY l.news_id, l.{column}"
        );
        let rows: Vec<(i64, i64)> = sqlx::query_as(&sql)
            .bind(since)
            .fetch_all(self.pool())
            .await?;

        let mut links: HashMap<i64, Vec<i64>> = HashMap::new();
        for (news_id, target) in rows {
            links.entry(news_id).or_default().push(target);
        }
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
    }

    async fn seeded() -> SignalDb {
        let db = SignalDb::new("sqlite::memory:").await.unwrap();
        db.insert_news_item(1, "old", None, now() - Duration::days(10)).await.unwrap();
        db.insert_news_item(2, "recent", None, now() - Duration::days(2)).await.unwrap();
        db.insert_news_item(3, "newest", Some("https://example.com/3"), now() - Duration::hours(3))
            .await
            .unwrap();
        for news_id in 1..=3 {
            for idx in [1, 0] {
                db.insert_news_chunk(news_id, idx, &format!("news {news_id} chunk {idx}"))
                    .await
                    .unwrap();
            }
        }
        db
    }

    fn mention(news_id: i64, target_id: i64, surface: &str) -> Mention {
        Mention {
            news_id,
            chunk_index: 0,
            surface_text: surface.to_string(),
            start_char: 0,
            end_char: surface.chars().count(),
            normalized_key: surface.to_uppercase(),
            lexical_score: 2.0,
            semantic_score: 0.8,
            final_score: 1.16,
            target_type: TargetType::Company,
            target_id,
            method: "hybrid".to_string(),
        }
    }

    #[tokio::test]
    async fn test_chunks_since_order_and_limit() {
        let db = seeded().await;
        let chunks = db.chunks_since(now() - Duration::days(7), None).await.unwrap();
        let keys: Vec<(i64, i32)> = chunks.iter().map(|c| (c.news_id, c.chunk_index)).collect();
        assert_eq!(keys, vec![(3, 0), (3, 1), (2, 0), (2, 1)]);
        assert_eq!(chunks[0].published_at, now() - Duration::hours(3));

        let limited = db.chunks_since(now() - Duration::days(30), Some(3)).await.unwrap();
        assert_eq!(limited.len(), 3);
    }

    #[tokio::test]
    async fn test_insert_mentions_ignores_duplicates() {
        let db = seeded().await;
        let first = db
            .insert_mentions(&[mention(2, 7, "NVDA"), mention(2, 8, "Advanced Micro")])
            .await
            .unwrap();
        assert_eq!(first, 2);

        let again = db.insert_mentions(&[mention(2, 7, "NVDA")]).await.unwrap();
        assert_eq!(again, 0);
        assert_eq!(db.mention_count().await.unwrap(), 2);

        let (ticker,): (Option<String>,) =
            sqlx::query_as("SELECT ticker FROM news_entities WHERE target_id = 8")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(ticker, None);
    }

    #[tokio::test]
    async fn test_scored_news_with_links_and_malformed_payloads() {
        let db = seeded().await;
        sqlx::query("INSERT INTO companies (id, ticker, name) VALUES (7, 'NVDA', 'NVIDIA')")
            .execute(db.pool())
            .await
            .unwrap();
        db.link_news_company(2, 7).await.unwrap();
        db.save_news_score(
            2,
            "```json\n{\"sentiment_overall\": 0.4, \"targets\": [{\"target\": \"NVDA\", \"score\": 0.9}]}\n```",
            now() - Duration::days(2),
        )
        .await
        .unwrap();
        db.save_news_score(3, "not json", now()).await.unwrap();
        db.save_news_score(1, "{}", now()).await.unwrap();

        let batch = db.scored_news_since(now() - Duration::days(7)).await.unwrap();
        assert_eq!(batch.malformed, vec![3]);
        assert_eq!(batch.items.len(), 1);

        let item = &batch.items[0];
        assert_eq!(item.news_id, 2);
        assert_eq!(item.linked_company_ids, vec![7]);
        assert!(item.linked_industry_ids.is_empty());
        assert_eq!(item.payload.targets[0].target, "NVDA");
        // scored at publish time
        assert_eq!(item.payload.scores.decayed_weight, 1.0);
    }
}
