use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use signal_core::{
    CompanyRecord, PipelineError, PriceSeries, PriceSource, Recommendation, RunStats,
};
use std::collections::{BTreeMap, HashMap};
use technical_analysis::{
    MovingAverageSnapshot, RankerConfig, RelativeStrengthRanker, Stage2Config, TrendStageFilter,
};
use tracing::{info, warn};

use crate::news_weight::news_weight_factor;
use crate::rounding::{round_dp, round_opt};
use crate::universe::select_universe;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub benchmark: String,
    pub min_market_cap: f64,
    pub universe_limit: usize,
    pub news_alpha: f64,
    pub news_k: f64,
    pub save_top: usize,
    /// Calendar days of price history requested per symbol
    pub price_lookback_days: u32,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            benchmark: "SPY".to_string(),
            min_market_cap: 20e9,
            universe_limit: 800,
            news_alpha: 0.2,
            news_k: 1.0,
            save_top: 200,
            price_lookback_days: 400,
        }
    }
}

impl RecommendationConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.benchmark.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "benchmark symbol is required".to_string(),
            ));
        }
        if !self.news_alpha.is_finite() || !self.news_k.is_finite() {
            return Err(PipelineError::Configuration(
                "news alpha and k must be finite".to_string(),
            ));
        }
        if !self.min_market_cap.is_finite() {
            return Err(PipelineError::Configuration(
                "minimum market cap must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ranked recommendations for one date, ready to replace that date's rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRun {
    pub as_of_date: NaiveDate,
    pub recommendations: Vec<Recommendation>,
    pub stats: RunStats,
}

/// Unranked candidate
struct Candidate {
    company_id: i64,
    symbol: String,
    rs100: f64,
    p1m: Option<f64>,
    p3m: Option<f64>,
    p6m: Option<f64>,
    stage2_pass: bool,
    stage2_reasons: BTreeMap<String, bool>,
    news_window_score: f64,
    news_weight_factor: f64,
    final_score: f64,
    details: serde_json::Value,
}

pub struct RecommendationBuilder {
    ranker: RelativeStrengthRanker,
    stage2: TrendStageFilter,
    config: RecommendationConfig,
}

impl RecommendationBuilder {
    pub fn new(
        config: RecommendationConfig,
        ranker: RankerConfig,
        stage2: Stage2Config,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        ranker.validate()?;
        Ok(Self {
            ranker: RelativeStrengthRanker::new(ranker),
            stage2: TrendStageFilter::new(stage2),
            config,
        })
    }

    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }

    /// Select the universe, fetch prices and score it.
    ///
    /// `news_scores` maps company id to its news window score (absent = 0).
    /// A missing benchmark series aborts the run.
    pub async fn build(
        &self,
        companies: &[CompanyRecord],
        prices: &dyn PriceSource,
        news_scores: &HashMap<i64, f64>,
        as_of_date: NaiveDate,
    ) -> Result<RecommendationRun, PipelineError> {
        let mut stats = RunStats::default();
        let universe = select_universe(
            companies,
            self.config.min_market_cap,
            self.config.universe_limit,
        );
        if universe.is_empty() {
            warn!("No tickers in universe");
            return Ok(RecommendationRun {
                as_of_date,
                recommendations: Vec::new(),
                stats,
            });
        }

        let benchmark = match prices
            .price_history(&self.config.benchmark, self.config.price_lookback_days)
            .await
        {
            Ok(Some(series)) if !series.is_empty() => series,
            Ok(_) => {
                return Err(PipelineError::Configuration(format!(
                    "benchmark {} missing",
                    self.config.benchmark
                )))
            }
            Err(e) => {
                return Err(PipelineError::Configuration(format!(
                    "benchmark {} unavailable: {e}",
                    self.config.benchmark
                )))
            }
        };

        info!("Loading prices for {} tickers...", universe.len());
        let mut series = Vec::with_capacity(universe.len());
        for company in universe {
            match prices
                .price_history(&company.ticker, self.config.price_lookback_days)
                .await
            {
                Ok(Some(s)) if !s.is_empty() => series.push((company, s)),
                Ok(_) => stats.skip("no_prices"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping {}: {}", company.ticker, e);
                    stats.skip("price_fetch_failed");
                }
            }
        }

        let recommendations = self.score(&series, &benchmark, news_scores, as_of_date, &mut stats);
        info!(
            "Built {} recommendations for {}",
            recommendations.len(),
            as_of_date
        );

        Ok(RecommendationRun {
            as_of_date,
            recommendations,
            stats,
        })
    }

    /// Rank, filter and order already-loaded series. Stage-2 passes come
    /// first, then final score descending; ties keep input order.
    pub fn score(
        &self,
        series: &[(CompanyRecord, PriceSeries)],
        benchmark: &PriceSeries,
        news_scores: &HashMap<i64, f64>,
        as_of_date: NaiveDate,
        stats: &mut RunStats,
    ) -> Vec<Recommendation> {
        let closes: BTreeMap<String, Vec<f64>> = series
            .iter()
            .map(|(c, s)| (c.ticker.clone(), s.closes()))
            .collect();
        let rs_rows = self.ranker.rank(&closes, &benchmark.closes());
        let min_history = self.ranker.config().min_history;

        let evaluated: Vec<Result<Candidate, &'static str>> = series
            .par_iter()
            .map(|(company, s)| {
                let Some(rs) = rs_rows.get(&company.ticker) else {
                    return Err(if s.len() < min_history {
                        "short_history"
                    } else {
                        "no_rs"
                    });
                };
                let rs100 = rs.rs100.ok_or("no_rs")?;

                let stage2 = self.stage2.evaluate_series(s, Some(rs100));
                let news_window_score = news_scores.get(&company.id).copied().unwrap_or(0.0);
                let factor =
                    news_weight_factor(news_window_score, self.config.news_alpha, self.config.news_k);
                let final_score = (rs100 * factor).clamp(0.0, 100.0);

                Ok(Candidate {
                    company_id: company.id,
                    symbol: company.ticker.clone(),
                    rs100,
                    p1m: rs.p1m,
                    p3m: rs.p3m,
                    p6m: rs.p6m,
                    stage2_pass: stage2.pass,
                    stage2_reasons: stage2.reasons,
                    news_window_score,
                    news_weight_factor: factor,
                    final_score,
                    details: MovingAverageSnapshot::from_closes(&s.closes()).to_json(),
                })
            })
            .collect();

        let mut candidates = Vec::with_capacity(evaluated.len());
        for result in evaluated {
            match result {
                Ok(c) => candidates.push(c),
                Err(reason) => stats.skip(reason),
            }
        }

        candidates.sort_by(|a, b| {
            b.stage2_pass.cmp(&a.stage2_pass).then(
                b.final_score
                    .partial_cmp(&a.final_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        candidates.truncate(self.config.save_top);

        let method = self.ranker.config().method_label();
        let recommendations: Vec<Recommendation> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, c)| Recommendation {
                company_id: c.company_id,
                symbol: c.symbol,
                as_of_date,
                rs_score: round_dp(c.rs100, 2),
                rs_p1m: round_opt(c.p1m, 2),
                rs_p3m: round_opt(c.p3m, 2),
                rs_p6m: round_opt(c.p6m, 2),
                rs_method: method.clone(),
                stage2_pass: c.stage2_pass,
                stage2_reasons: c.stage2_reasons,
                news_window_score: round_dp(c.news_window_score, 6),
                news_weight_factor: round_dp(c.news_weight_factor, 3),
                final_score: round_dp(c.final_score, 3),
                rank: (i + 1) as u32,
                details: c.details,
            })
            .collect();

        stats.processed = recommendations.len();
        stats.companies_updated = recommendations.len();
        recommendations
    }
}
