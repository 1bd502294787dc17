//! One function per pipeline stage. Each stage reads its inputs from the
//! store, computes, and commits its own write-back before returning.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use entity_linker::{AliasDictionary, EntityLinker, EntityResolver};
use recommendation_engine::RecommendationBuilder;
use serde::Serialize;
use serde_json::json;
use signal_core::{EntityKind, Embedder, PipelineError, RunStats, VectorIndex};
use signal_rollup::{NewsScoreAggregator, RollupEngine, RollupWindow};
use signal_store::{SignalDb, SqlPriceSource, SqlResearchCatalog};
use std::sync::Arc;
use tracing::info;

use crate::config::PipelineConfig;

/// Collaborators shared by every stage
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub db: SignalDb,
    pub index: Option<Arc<dyn VectorIndex>>,
    pub embedder: Arc<dyn Embedder>,
}

/// Summary printed after each stage
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub written: u64,
    pub stats: RunStats,
}

impl PipelineContext {
    /// The vector index, after a successful health check
    async fn healthy_index(&self) -> Result<Arc<dyn VectorIndex>> {
        let index = self.index.clone().ok_or_else(|| {
            PipelineError::Configuration("VECTOR_DATABASE_URL is not configured".to_string())
        })?;
        index.health().await.context("vector index health check failed")?;
        Ok(index)
    }
}

/// Resolve mentions in recent chunks and append them to the mention table
pub async fn link(ctx: &PipelineContext, now: DateTime<Utc>) -> Result<StageReport> {
    let index = ctx.healthy_index().await?;

    let companies = ctx.db.companies().await?;
    let industries = ctx.db.industries().await?;
    let players = ctx.db.industry_players().await?;
    let aliases = Arc::new(AliasDictionary::from_catalog(&companies, &industries, &players));
    info!("Loaded {} alias keys", aliases.len());

    let since = now - Duration::days(ctx.config.link_days_back);
    let chunks = ctx.db.chunks_since(since, Some(ctx.config.link_limit)).await?;
    info!("Linking {} chunks", chunks.len());

    let resolver = EntityResolver::new(index, ctx.embedder.clone(), aliases, ctx.config.resolver.clone());
    let outcome = EntityLinker::new(resolver).link(&chunks).await?;
    let written = ctx.db.insert_mentions(&outcome.mentions).await?;

    info!(
        "Linked {} mentions ({} new), {} chunks skipped",
        outcome.mentions.len(),
        written,
        outcome.stats.skipped
    );
    Ok(StageReport {
        stage: "link",
        written,
        stats: outcome.stats,
    })
}

/// Vector-hit rollup into company (and optionally industry) signals
pub async fn rollup(ctx: &PipelineContext, now: DateTime<Utc>) -> Result<StageReport> {
    let index = ctx.healthy_index().await?;
    let catalog = Arc::new(SqlResearchCatalog::new(ctx.db.clone()));
    let polarity = ctx.config.load_polarity_table()?;
    let options = ctx.config.rollup.clone();

    let engine = RollupEngine::new(index, catalog, polarity, options.clone())?;
    let window = RollupWindow::ending_at(now, &options);
    let chunks = ctx.db.chunks_since(window.since, None).await?;
    info!(
        "Rolling up {} chunks into window {} .. {}",
        chunks.len(),
        window.window_start,
        window.window_end
    );

    let outcome = engine.run(&chunks, now).await?;
    let industries = options
        .include_industry
        .then_some(outcome.industry_signals.as_slice());
    let summary = ctx
        .db
        .write_rollup(
            &outcome.company_signals,
            industries,
            outcome.window.window_start,
            outcome.window.window_end,
            options.overwrite,
        )
        .await?;

    println!(
        "STATS {}",
        json!({
            "companies": outcome.stats.companies_updated,
            "industries": outcome.stats.industries_updated,
            "processed": outcome.stats.processed,
        })
    );
    info!(
        "Rollup wrote {} signals (deleted {})",
        summary.upserted, summary.deleted
    );

    Ok(StageReport {
        stage: "rollup",
        written: summary.upserted,
        stats: outcome.stats,
    })
}

/// Structured news-score rollup into the window score fields
pub async fn score_rollup(ctx: &PipelineContext, now: DateTime<Utc>) -> Result<StageReport> {
    let options = ctx.config.news_scores.clone();
    let lookback = Duration::hours(options.lookback_hours);

    let companies = ctx.db.companies().await?;
    let industries = ctx.db.industries().await?;
    let batch = ctx.db.scored_news_since(now - lookback).await?;

    let outcome = NewsScoreAggregator::new(&companies, &industries, options).aggregate(&batch.items, now);
    let mut stats = outcome.stats.clone();
    for _ in &batch.malformed {
        stats.skip("malformed_payload");
    }

    let scores: Vec<_> = outcome
        .company_scores
        .iter()
        .chain(outcome.industry_scores.iter())
        .cloned()
        .collect();
    let written = ctx.db.write_news_window_scores(&scores, lookback).await?;

    info!(
        "News scores: considered {} items, companies={}, industries={}",
        outcome.considered_news,
        outcome.company_scores.len(),
        outcome.industry_scores.len()
    );
    Ok(StageReport {
        stage: "score-rollup",
        written,
        stats,
    })
}

/// Build and store the recommendations of `as_of_date`
pub async fn recommend(
    ctx: &PipelineContext,
    now: DateTime<Utc>,
    as_of_date: NaiveDate,
) -> Result<StageReport> {
    let builder = RecommendationBuilder::new(
        ctx.config.recommendation.clone(),
        ctx.config.ranker.clone(),
        ctx.config.stage2.clone(),
    )?;

    let companies = ctx.db.companies().await?;
    let news_scores = ctx.db.news_window_scores(EntityKind::Company).await?;
    let prices = SqlPriceSource::new(ctx.db.clone()).ending_at(now);

    let run = builder
        .build(&companies, &prices, &news_scores, as_of_date)
        .await?;
    let written = ctx
        .db
        .replace_recommendations(as_of_date, &run.recommendations)
        .await?;

    info!("Saved {} recommendations for {}", written, as_of_date);
    Ok(StageReport {
        stage: "recommend",
        written,
        stats: run.stats,
    })
}
