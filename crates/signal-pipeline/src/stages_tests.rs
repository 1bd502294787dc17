use super::config::PipelineConfig;
use super::stages::{self, PipelineContext};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use embedding_client::EmbeddingConfig;
use entity_linker::ResolverConfig;
use recommendation_engine::RecommendationConfig;
use signal_core::{
    Bar, ChunkVector, CompanyRecord, Embedder, EntityKind, ObjectType, PipelineError, Signal,
    VectorIndex,
};
use signal_rollup::{NewsScoreRollupOptions, RollupOptions, RollupWindow};
use signal_store::SignalDb;
use std::sync::Arc;
use technical_analysis::{RankerConfig, Stage2Config};
use vector_index::InMemoryVectorIndex;

struct UnitEmbedder;

#[async_trait]
impl Embedder for UnitEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig {
        database_url: "sqlite::memory:".to_string(),
        vector_database_url: None,
        vector_schema: "public".to_string(),
        vector_table: "research_embedding".to_string(),
        embedding: EmbeddingConfig::default(),
        resolver: ResolverConfig::default(),
        link_days_back: 7,
        link_limit: 800,
        rollup: RollupOptions::default(),
        news_scores: NewsScoreRollupOptions::default(),
        polarity_table: None,
        ranker: RankerConfig::default(),
        stage2: Stage2Config::default(),
        recommendation: RecommendationConfig::default(),
    }
}

fn vector(object_type: ObjectType, object_id: i64, v: [f32; 2]) -> ChunkVector {
    ChunkVector {
        object_type,
        object_id,
        chunk_index: 0,
        vector: v.to_vec(),
        metadata: serde_json::Value::Null,
    }
}

/// NVDA with a profile (id 100) and one news item (id 1) published a day ago
async fn seeded_db() -> SignalDb {
    let db = SignalDb::new("sqlite::memory:").await.unwrap();
    db.upsert_company(&CompanyRecord {
        id: 1,
        ticker: "NVDA".into(),
        name: "NVIDIA Corporation".into(),
        market_cap: Some(3.0e12),
        is_active: true,
    })
    .await
    .unwrap();
    sqlx::query("INSERT INTO company_profiles (id, company_id, body) VALUES (100, 1, 'GPUs')")
        .execute(db.pool())
        .await
        .unwrap();

    db.insert_news_item(1, "NVDA raises guidance", None, now() - Duration::days(1))
        .await
        .unwrap();
    db.insert_news_chunk(1, 0, "NVDA raised its data center guidance again.")
        .await
        .unwrap();
    db
}

async fn company_signal_rows(db: &SignalDb) -> i64 {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM company_signals")
        .fetch_one(db.pool())
        .await
        .unwrap();
    n
}

fn context(db: SignalDb, with_index: bool) -> PipelineContext {
    let index: Option<Arc<dyn VectorIndex>> = with_index.then(|| {
        Arc::new(InMemoryVectorIndex::from_vectors(vec![
            vector(ObjectType::CompanyProfile, 100, [1.0, 0.0]),
            vector(ObjectType::NewsChunk, 1, [1.0, 0.0]),
        ])) as Arc<dyn VectorIndex>
    });
    PipelineContext {
        config: config(),
        db,
        index,
        embedder: Arc::new(UnitEmbedder),
    }
}

#[tokio::test]
async fn test_link_inserts_mentions_once() {
    let ctx = context(seeded_db().await, true);

    let report = stages::link(&ctx, now()).await.unwrap();
    assert_eq!(report.stage, "link");
    assert_eq!(report.written, 1);
    assert_eq!(report.stats.processed, 1);
    assert_eq!(ctx.db.mention_count().await.unwrap(), 1);

    // A second run finds the same mention and appends nothing
    let again = stages::link(&ctx, now()).await.unwrap();
    assert_eq!(again.written, 0);
    assert_eq!(ctx.db.mention_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_vector_stages_require_index() {
    let ctx = context(seeded_db().await, false);

    let err = stages::link(&ctx, now()).await.unwrap_err();
    assert!(err.to_string().contains("VECTOR_DATABASE_URL"));
    assert!(stages::rollup(&ctx, now()).await.is_err());
}

#[tokio::test]
async fn test_rollup_writes_company_signal() {
    let ctx = context(seeded_db().await, true);

    let report = stages::rollup(&ctx, now()).await.unwrap();
    assert_eq!(report.written, 1);
    assert_eq!(report.stats.companies_updated, 1);

    let window = RollupWindow::ending_at(now(), &ctx.config.rollup);
    let signals = ctx
        .db
        .signals_for_window(EntityKind::Company, window.window_start, window.window_end)
        .await
        .unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].entity_id, 1);
    assert!(signals[0].score > 0.0);
    assert_eq!(signals[0].top_news_ids, vec![1]);
    assert!(ctx
        .db
        .signals_for_window(EntityKind::Industry, window.window_start, window.window_end)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_overwrite_rollup_is_idempotent() {
    let db = seeded_db().await;
    sqlx::query(
        "INSERT INTO company_risks (id, company_id, description) VALUES (200, 1, 'export controls')",
    )
    .execute(db.pool())
    .await
    .unwrap();
    db.insert_news_item(2, "Export curbs widen", None, now() - Duration::days(3))
        .await
        .unwrap();
    db.insert_news_chunk(2, 0, "New export curbs hit NVDA shipments.")
        .await
        .unwrap();

    let mut ctx = context(db, false);
    ctx.index = Some(Arc::new(InMemoryVectorIndex::from_vectors(vec![
        vector(ObjectType::CompanyProfile, 100, [1.0, 0.0]),
        vector(ObjectType::CompanyRisk, 200, [0.6, 0.8]),
        vector(ObjectType::NewsChunk, 1, [1.0, 0.0]),
        vector(ObjectType::NewsChunk, 2, [0.6, 0.8]),
    ])));
    ctx.config.rollup.overwrite = true;

    // A wider window left by an earlier run is replaced, not kept alongside
    let window = RollupWindow::ending_at(now(), &ctx.config.rollup);
    let stale = Signal {
        entity_kind: EntityKind::Company,
        entity_id: 1,
        window_start: window.window_start - Duration::days(1),
        window_end: window.window_end + Duration::days(1),
        score: 9.0,
        details: Vec::new(),
        top_news_ids: Vec::new(),
        updated_at: now() - Duration::days(1),
    };
    ctx.db
        .write_signals(
            EntityKind::Company,
            &[stale.clone()],
            stale.window_start,
            stale.window_end,
            false,
        )
        .await
        .unwrap();

    assert_eq!(company_signal_rows(&ctx.db).await, 1);

    stages::rollup(&ctx, now()).await.unwrap();
    let first = ctx
        .db
        .signals_for_window(EntityKind::Company, window.window_start, window.window_end)
        .await
        .unwrap();
    assert_eq!(company_signal_rows(&ctx.db).await, 1);

    stages::rollup(&ctx, now()).await.unwrap();
    let second = ctx
        .db
        .signals_for_window(EntityKind::Company, window.window_start, window.window_end)
        .await
        .unwrap();
    assert_eq!(company_signal_rows(&ctx.db).await, 1);

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), first.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.entity_id, b.entity_id);
        assert!((a.score - b.score).abs() < 1e-6);
        assert_eq!(a.top_news_ids, b.top_news_ids);
        assert_eq!(a.details.len(), b.details.len());
    }
    assert!((first[0].score - 9.0).abs() > 1e-6);
    assert!(!first[0].details.is_empty());
}

#[tokio::test]
async fn test_score_rollup_writes_window_scores() {
    let ctx = context(seeded_db().await, false);
    ctx.db
        .save_news_score(
            1,
            r#"{"sentiment_overall": 0.5,
                "targets": [{"target": "NVDA", "score": 0.8}],
                "scores": {"impact_score": 1.0, "credibility_score": 1.0,
                           "novelty_score": 1.0, "decayed_weight": 1.0}}"#,
            now() - Duration::days(1),
        )
        .await
        .unwrap();
    ctx.db.insert_news_item(2, "garbled", None, now() - Duration::hours(2)).await.unwrap();
    ctx.db.save_news_score(2, "not json", now()).await.unwrap();

    let report = stages::score_rollup(&ctx, now()).await.unwrap();
    assert_eq!(report.written, 1);
    assert_eq!(report.stats.skip_reasons["malformed_payload"], 1);

    let scores = ctx.db.news_window_scores(EntityKind::Company).await.unwrap();
    assert!(scores[&1] > 0.0);
}

#[tokio::test]
async fn test_recommend_saves_ranked_rows() {
    let ctx = context(seeded_db().await, false);
    for (symbol, daily) in [("SPY", 0.0004), ("NVDA", 0.004)] {
        let bars: Vec<Bar> = (0..300)
            .map(|i| {
                let close = 100.0 * (1.0f64 + daily).powi(i - 299);
                Bar {
                    timestamp: now() - Duration::days(i64::from(299 - i)),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1_000_000.0,
                }
            })
            .collect();
        ctx.db.upsert_bars(symbol, &bars).await.unwrap();
    }

    let as_of = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
    let report = stages::recommend(&ctx, now(), as_of).await.unwrap();
    assert_eq!(report.written, 1);

    let saved = ctx.db.recommendations_for(as_of).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].symbol, "NVDA");
    assert_eq!(saved[0].rank, 1);
    assert_eq!(saved[0].news_weight_factor, 1.0);
}

#[tokio::test]
async fn test_recommend_without_benchmark_fails() {
    let ctx = context(seeded_db().await, false);
    let as_of = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
    assert!(stages::recommend(&ctx, now(), as_of).await.is_err());
    assert!(ctx.db.recommendations_for(as_of).await.unwrap().is_empty());
}
