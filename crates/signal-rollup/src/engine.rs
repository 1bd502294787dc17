//! Vector-hit rollup
//!
//! For every news chunk with a stored vector: query company and industry
//! research objects, weight each hit by similarity, polarity and age decay,
//! accumulate per company (and optionally per industry), and spread industry
//! hits onto companies.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{
    Contribution, EntityKind, NewsChunk, ObjectType, PipelineError, ResearchCatalog, RunStats,
    Signal, VectorHit, VectorIndex,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::accumulator::SignalAccumulator;
use crate::distribution::{industry_weights, DistributionMode};
use crate::polarity::PolarityTable;
use crate::resolution::{resolve_owner, Owner};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupOptions {
    /// News published within this many days is scanned
    pub days_back: i64,
    /// Written signal window is `[now - window_days, now]`
    pub window_days: i64,
    /// Hits requested per chunk for each of the company and industry queries
    pub topk_per_chunk: usize,
    pub min_sim: f64,
    /// Delete signals whose window contains the new window before writing
    pub overwrite: bool,
    pub distribution: DistributionMode,
    pub industry_top_n: usize,
    pub include_industry: bool,
}

impl Default for RollupOptions {
    fn default() -> Self {
        Self {
            days_back: 7,
            window_days: 7,
            topk_per_chunk: 5,
            min_sim: 0.35,
            overwrite: false,
            distribution: DistributionMode::Weight,
            industry_top_n: 8,
            include_industry: false,
        }
    }
}

impl RollupOptions {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.days_back < 0 || self.window_days < 0 {
            return Err(PipelineError::Configuration(
                "days_back and window_days must not be negative".to_string(),
            ));
        }
        if self.topk_per_chunk == 0 {
            return Err(PipelineError::Configuration(
                "topk_per_chunk must be at least 1".to_string(),
            ));
        }
        if !self.min_sim.is_finite() {
            return Err(PipelineError::Configuration(
                "min_sim must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Time bounds of one run, all derived from a single `now`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollupWindow {
    pub now: DateTime<Utc>,
    pub since: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl RollupWindow {
    pub fn ending_at(now: DateTime<Utc>, options: &RollupOptions) -> Self {
        Self {
            now,
            since: now - Duration::days(options.days_back),
            window_start: now - Duration::days(options.window_days),
            window_end: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupOutcome {
    pub window: RollupWindow,
    pub company_signals: Vec<Signal>,
    pub industry_signals: Vec<Signal>,
    pub stats: RunStats,
}

/// Whole days between two instants, absolute
fn age_days(now: DateTime<Utc>, published_at: DateTime<Utc>) -> i64 {
    (now - published_at).num_days().abs()
}

pub struct RollupEngine {
    index: Arc<dyn VectorIndex>,
    catalog: Arc<dyn ResearchCatalog>,
    polarity: PolarityTable,
    options: RollupOptions,
}

/// Per-run state
struct RunState {
    companies: SignalAccumulator,
    industries: SignalAccumulator,
    weights: HashMap<i64, Vec<(i64, f64)>>,
    stats: RunStats,
}

impl RollupEngine {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        catalog: Arc<dyn ResearchCatalog>,
        polarity: PolarityTable,
        options: RollupOptions,
    ) -> Result<Self, PipelineError> {
        polarity.validate()?;
        options.validate()?;
        Ok(Self {
            index,
            catalog,
            polarity,
            options,
        })
    }

    pub fn options(&self) -> &RollupOptions {
        &self.options
    }

    /// Aggregate `chunks` into signals for the window ending at `now`.
    ///
    /// Chunks older than the lookback are ignored; the rest are processed
    /// newest news first, then by chunk index. Nothing is written here.
    pub async fn run(
        &self,
        chunks: &[NewsChunk],
        now: DateTime<Utc>,
    ) -> Result<RollupOutcome, PipelineError> {
        let window = RollupWindow::ending_at(now, &self.options);

        let mut ordered: Vec<&NewsChunk> =
            chunks.iter().filter(|c| c.published_at >= window.since).collect();
        ordered.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then(a.news_id.cmp(&b.news_id))
                .then(a.chunk_index.cmp(&b.chunk_index))
        });

        let mut state = RunState {
            companies: SignalAccumulator::new(EntityKind::Company),
            industries: SignalAccumulator::new(EntityKind::Industry),
            weights: HashMap::new(),
            stats: RunStats::default(),
        };
        let mut news_vectors: HashMap<i64, BTreeMap<i32, Vec<f32>>> = HashMap::new();

        for chunk in ordered {
            if !news_vectors.contains_key(&chunk.news_id) {
                let vectors = self
                    .index
                    .vectors_for(ObjectType::NewsChunk, chunk.news_id)
                    .await?;
                news_vectors.insert(chunk.news_id, vectors);
            }
            let Some(query) = news_vectors
                .get(&chunk.news_id)
                .and_then(|v| v.get(&chunk.chunk_index))
            else {
                debug!(news_id = chunk.news_id, chunk = chunk.chunk_index, "no stored vector");
                state.stats.skip("missing_vector");
                continue;
            };

            let age = age_days(window.now, chunk.published_at);

            let company_hits = self
                .index
                .search(query, &ObjectType::COMPANY, self.options.topk_per_chunk)
                .await?;
            for hit in company_hits {
                self.apply_hit(&mut state, chunk, &hit, age).await?;
            }

            let industry_hits = self
                .index
                .search(query, &ObjectType::INDUSTRY, self.options.topk_per_chunk)
                .await?;
            for hit in industry_hits {
                self.apply_hit(&mut state, chunk, &hit, age).await?;
            }

            state.stats.processed += 1;
        }

        let company_signals =
            state
                .companies
                .into_signals(window.window_start, window.window_end, window.now);
        let industry_signals = if self.options.include_industry {
            state
                .industries
                .into_signals(window.window_start, window.window_end, window.now)
        } else {
            Vec::new()
        };

        let mut stats = state.stats;
        stats.companies_updated = company_signals.len();
        stats.industries_updated = industry_signals.len();

        info!(
            companies = stats.companies_updated,
            industries = stats.industries_updated,
            chunks = stats.processed,
            skipped = stats.skipped,
            mode = %self.options.distribution,
            top_n = self.options.industry_top_n,
            include_industry = self.options.include_industry,
            "Rolled up signals for window {}..{}",
            window.window_start.date_naive(),
            window.window_end.date_naive()
        );

        Ok(RollupOutcome {
            window,
            company_signals,
            industry_signals,
            stats,
        })
    }

    async fn apply_hit(
        &self,
        state: &mut RunState,
        chunk: &NewsChunk,
        hit: &VectorHit,
        age: i64,
    ) -> Result<(), PipelineError> {
        if hit.similarity < self.options.min_sim {
            state.stats.skip("below_min_sim");
            return Ok(());
        }

        let object = match self.catalog.lookup(hit.object_type, hit.object_id).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                debug!(object_type = %hit.object_type, object_id = hit.object_id, "research object not found");
                state.stats.skip("unresolved_object");
                return Ok(());
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Dropping hit {} {}: {}", hit.object_type, hit.object_id, e);
                state.stats.skip("lookup_failed");
                return Ok(());
            }
        };

        let resolution = resolve_owner(&object, &self.polarity);
        let decay = self.polarity.decay(hit.object_type, age);
        let value = hit.similarity * resolution.polarity * decay;
        let record = |contribution: f64, note: Option<String>| Contribution {
            news_id: chunk.news_id,
            chunk_id: chunk.chunk_index,
            object_type: hit.object_type,
            object_id: hit.object_id,
            similarity: hit.similarity,
            polarity: resolution.polarity,
            decay,
            contribution,
            note,
        };

        match resolution.owner {
            Owner::Company(company_id) => {
                state.companies.add(company_id, record(value, None));
            }
            Owner::Industry {
                industry_id,
                player,
            } => {
                if self.options.include_industry {
                    state.industries.add(industry_id, record(value, None));
                }
                if self.options.distribution == DistributionMode::Off {
                    return Ok(());
                }

                if let Some(company_id) = player.and_then(|p| p.company_id) {
                    state.companies.add(
                        company_id,
                        record(value, Some("player→company 100%".to_string())),
                    );
                    return Ok(());
                }

                if !state.weights.contains_key(&industry_id) {
                    let players = match self.catalog.industry_players(industry_id).await {
                        Ok(players) => players,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            warn!("No distribution for industry {}: {}", industry_id, e);
                            Vec::new()
                        }
                    };
                    let weights = industry_weights(
                        &players,
                        self.options.industry_top_n,
                        self.options.distribution,
                    );
                    state.weights.insert(industry_id, weights);
                }
                if let Some(weights) = state.weights.get(&industry_id) {
                    for &(company_id, w) in weights {
                        state.companies.add(
                            company_id,
                            record(value * w, Some(format!("industry→company w={w:.3}"))),
                        );
                    }
                }
            }
        }

        Ok(())
    }
}
