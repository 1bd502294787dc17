use chrono::NaiveDate;
use signal_core::Recommendation;
use std::collections::BTreeMap;

use crate::db::{decode_date, encode_date, SignalDb};
use crate::error::StoreResult;

type RecommendationRow = (
    i64,
    String,
    String,
    f64,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    String,
    bool,
    String,
    f64,
    f64,
    f64,
    i64,
    String,
);

impl SignalDb {
    /// Replace every recommendation of `as_of_date` atomically
    pub async fn replace_recommendations(
        &self,
        as_of_date: NaiveDate,
        recommendations: &[Recommendation],
    ) -> StoreResult<u64> {
        let date = encode_date(as_of_date);
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM recommendations WHERE as_of_date = ?")
            .bind(&date)
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0;
        for r in recommendations {
            sqlx::query(
                r#"
                INSERT INTO recommendations (
                    company_id, symbol, as_of_date, rs_score, rs_p1m, rs_p3m, rs_p6m, rs_method,
                    stage2_pass, stage2_reasons, news_window_score, news_weight_factor,
                    final_score, rank, details
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(r.company_id)
            .bind(&r.symbol)
            .bind(&date)
            .bind(r.rs_score)
            .bind(r.rs_p1m)
            .bind(r.rs_p3m)
            .bind(r.rs_p6m)
            .bind(&r.rs_method)
            .bind(r.stage2_pass)
            .bind(serde_json::to_string(&r.stage2_reasons)?)
            .bind(r.news_window_score)
            .bind(r.news_weight_factor)
            .bind(r.final_score)
            .bind(r.rank as i64)
            .bind(serde_json::to_string(&r.details)?)
            .execute(&mut *tx)
            .await?;
            inserted += 1;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Stored recommendations of one date by rank
    pub async fn recommendations_for(&self, as_of_date: NaiveDate) -> StoreResult<Vec<Recommendation>> {
        let rows: Vec<RecommendationRow> = sqlx::query_as(
            r#"
            SELECT company_id, symbol, as_of_date, rs_score, rs_p1m, rs_p3m, rs_p6m, rs_method,
                   stage2_pass, stage2_reasons, news_window_score, news_weight_factor,
                   final_score, rank, details
            FROM recommendations
            WHERE as_of_date = ?
            ORDER BY rank
            "#,
        )
        .bind(encode_date(as_of_date))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| -> StoreResult<Recommendation> {
                let (
                    company_id,
                    symbol,
                    date,
                    rs_score,
                    rs_p1m,
                    rs_p3m,
                    rs_p6m,
                    rs_method,
                    stage2_pass,
                    reasons,
                    news_window_score,
                    news_weight_factor,
                    final_score,
                    rank,
                    details,
                ) = row;
                let stage2_reasons: BTreeMap<String, bool> = serde_json::from_str(&reasons)?;
                Ok(Recommendation {
                    company_id,
                    symbol,
                    as_of_date: decode_date("recommendations", &date)?,
                    rs_score,
                    rs_p1m,
                    rs_p3m,
                    rs_p6m,
                    rs_method,
                    stage2_pass,
                    stage2_reasons,
                    news_window_score,
                    news_weight_factor,
                    final_score,
                    rank: rank as u32,
                    details: serde_json::from_str(&details)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn rec(company_id: i64, rank: u32, as_of: NaiveDate) -> Recommendation {
        Recommendation {
            company_id,
            symbol: format!("T{company_id}"),
            as_of_date: as_of,
            rs_score: 91.25,
            rs_p1m: Some(80.0),
            rs_p3m: None,
            rs_p6m: Some(95.5),
            rs_method: "percentile_relret_1/3/6m_wt=0.2/0.3/0.5".to_string(),
            stage2_pass: rank == 1,
            stage2_reasons: BTreeMap::from([("ma_stack".to_string(), true)]),
            news_window_score: 0.123456,
            news_weight_factor: 1.024,
            final_score: 93.44,
            rank,
            details: json!({"last_close": 101.5, "ma50": null}),
        }
    }

    #[tokio::test]
    async fn test_replace_rewrites_only_that_date() {
        let db = SignalDb::new("sqlite::memory:").await.unwrap();
        db.replace_recommendations(date(1), &[rec(1, 1, date(1)), rec(2, 2, date(1))])
            .await
            .unwrap();
        db.replace_recommendations(date(2), &[rec(1, 1, date(2))])
            .await
            .unwrap();

        let inserted = db
            .replace_recommendations(date(1), &[rec(3, 1, date(1))])
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let day1 = db.recommendations_for(date(1)).await.unwrap();
        assert_eq!(day1.len(), 1);
        assert_eq!(day1[0].company_id, 3);
        assert!(day1[0].stage2_pass);
        assert_eq!(day1[0].rs_p3m, None);
        assert_eq!(day1[0].details["last_close"], json!(101.5));
        assert_eq!(day1[0].stage2_reasons["ma_stack"], true);

        assert_eq!(db.recommendations_for(date(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_delete() {
        let db = SignalDb::new("sqlite::memory:").await.unwrap();
        db.replace_recommendations(date(1), &[rec(1, 1, date(1))])
            .await
            .unwrap();

        // duplicate (company, date) violates the unique key mid-transaction
        let result = db
            .replace_recommendations(date(1), &[rec(2, 1, date(1)), rec(2, 2, date(1))])
            .await;
        assert!(result.is_err());

        let kept = db.recommendations_for(date(1)).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].company_id, 1);
    }
}
