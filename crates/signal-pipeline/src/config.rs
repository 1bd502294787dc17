use anyhow::{bail, Context, Result};
use embedding_client::EmbeddingConfig;
use entity_linker::ResolverConfig;
use recommendation_engine::RecommendationConfig;
use signal_rollup::{DistributionMode, NewsScoreRollupOptions, PolarityTable, RollupOptions};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use technical_analysis::{RankerConfig, Stage2Config};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Storage
    pub database_url: String,
    pub vector_database_url: Option<String>,
    pub vector_schema: String,
    pub vector_table: String,

    // Embedding service
    pub embedding: EmbeddingConfig,

    // Entity linking
    pub resolver: ResolverConfig,
    pub link_days_back: i64,      // 7
    pub link_limit: usize,        // 800

    // Rollups
    pub rollup: RollupOptions,
    pub news_scores: NewsScoreRollupOptions,
    pub polarity_table: Option<PathBuf>,

    // Recommendations
    pub ranker: RankerConfig,
    pub stage2: Stage2Config,
    pub recommendation: RecommendationConfig,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let embedding_defaults = EmbeddingConfig::default();
        let stage2_defaults = Stage2Config::default();

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:signals.db".to_string()),
            vector_database_url: env::var("VECTOR_DATABASE_URL").ok(),
            vector_schema: env::var("VECTOR_SCHEMA").unwrap_or_else(|_| "public".to_string()),
            vector_table: env::var("VECTOR_TABLE")
                .unwrap_or_else(|_| "research_embedding".to_string()),

            embedding: EmbeddingConfig {
                timeout: Duration::from_secs(
                    env::var("EMBEDDING_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()
                        .context("EMBEDDING_TIMEOUT_SECS")?,
                ),
                ..embedding_defaults
            },

            resolver: ResolverConfig {
                alpha: env::var("EL_ALPHA")
                    .unwrap_or_else(|_| "0.3".to_string())
                    .parse()
                    .context("EL_ALPHA")?,
                beta: env::var("EL_BETA")
                    .unwrap_or_else(|_| "0.7".to_string())
                    .parse()
                    .context("EL_BETA")?,
                context_window: env::var("EL_CTX_WINDOW")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .context("EL_CTX_WINDOW")?,
                min_score: env::var("EL_MIN_SCORE")
                    .unwrap_or_else(|_| "0.35".to_string())
                    .parse()
                    .context("EL_MIN_SCORE")?,
                top_k: env::var("EL_TOPK")
                    .unwrap_or_else(|_| "8".to_string())
                    .parse()
                    .context("EL_TOPK")?,
            },
            link_days_back: env::var("LINK_DAYS_BACK")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("LINK_DAYS_BACK")?,
            link_limit: env::var("LINK_LIMIT")
                .unwrap_or_else(|_| "800".to_string())
                .parse()
                .context("LINK_LIMIT")?,

            rollup: RollupOptions {
                days_back: env::var("ROLLUP_DAYS_BACK")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .context("ROLLUP_DAYS_BACK")?,
                window_days: env::var("ROLLUP_WINDOW_DAYS")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .context("ROLLUP_WINDOW_DAYS")?,
                topk_per_chunk: env::var("ROLLUP_TOPK_PER_CHUNK")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("ROLLUP_TOPK_PER_CHUNK")?,
                min_sim: env::var("ROLLUP_MIN_SIM")
                    .unwrap_or_else(|_| "0.35".to_string())
                    .parse()
                    .context("ROLLUP_MIN_SIM")?,
                overwrite: false,
                distribution: env::var("INDUSTRY_TO_COMPANY")
                    .unwrap_or_else(|_| "weight".to_string())
                    .parse::<DistributionMode>()?,
                industry_top_n: env::var("INDUSTRY_TOP_N")
                    .unwrap_or_else(|_| "8".to_string())
                    .parse()
                    .context("INDUSTRY_TOP_N")?,
                include_industry: false,
            },
            news_scores: NewsScoreRollupOptions {
                lookback_hours: env::var("NEWS_LOOKBACK_HOURS")
                    .unwrap_or_else(|_| "168".to_string())
                    .parse()
                    .context("NEWS_LOOKBACK_HOURS")?,
                min_decayed_weight: env::var("NEWS_MIN_DECAYED_WEIGHT")
                    .unwrap_or_else(|_| "0.05".to_string())
                    .parse()
                    .context("NEWS_MIN_DECAYED_WEIGHT")?,
                apply_overall_when_missing: false,
            },
            polarity_table: env::var("POLARITY_TABLE").ok().map(PathBuf::from),

            ranker: RankerConfig {
                windows: parse_triple(
                    &env::var("RS_WINDOWS").unwrap_or_else(|_| "21,63,126".to_string()),
                    "RS_WINDOWS",
                )?,
                weights: parse_triple(
                    &env::var("RS_WEIGHTS").unwrap_or_else(|_| "0.2,0.3,0.5".to_string()),
                    "RS_WEIGHTS",
                )?,
                ..RankerConfig::default()
            },
            stage2: Stage2Config {
                rs_threshold: env::var("RS_THRESHOLD")
                    .unwrap_or_else(|_| "70".to_string())
                    .parse()
                    .context("RS_THRESHOLD")?,
                ..stage2_defaults
            },
            recommendation: RecommendationConfig {
                benchmark: env::var("BENCHMARK_SYMBOL").unwrap_or_else(|_| "SPY".to_string()),
                min_market_cap: env::var("MIN_MARKET_CAP")
                    .unwrap_or_else(|_| "20000000000".to_string())
                    .parse()
                    .context("MIN_MARKET_CAP")?,
                universe_limit: env::var("UNIVERSE_LIMIT")
                    .unwrap_or_else(|_| "800".to_string())
                    .parse()
                    .context("UNIVERSE_LIMIT")?,
                news_alpha: env::var("NEWS_ALPHA")
                    .unwrap_or_else(|_| "0.2".to_string())
                    .parse()
                    .context("NEWS_ALPHA")?,
                news_k: env::var("NEWS_K")
                    .unwrap_or_else(|_| "1.0".to_string())
                    .parse()
                    .context("NEWS_K")?,
                save_top: env::var("SAVE_TOP")
                    .unwrap_or_else(|_| "200".to_string())
                    .parse()
                    .context("SAVE_TOP")?,
                ..RecommendationConfig::default()
            },
        };

        Ok(config)
    }

    /// Apply `--flag value` overrides from the command line
    pub fn apply_args(&mut self, args: &[String]) -> Result<()> {
        if let Some(v) = arg_value(args, "--days-back")? {
            self.rollup.days_back = v;
        }
        if let Some(v) = arg_value(args, "--window-days")? {
            self.rollup.window_days = v;
        }
        if let Some(v) = arg_value(args, "--topk-per-chunk")? {
            self.rollup.topk_per_chunk = v;
        }
        if let Some(v) = arg_value(args, "--min-sim")? {
            self.rollup.min_sim = v;
        }
        if let Some(v) = arg_value::<DistributionMode>(args, "--industry-to-company")? {
            self.rollup.distribution = v;
        }
        if let Some(v) = arg_value(args, "--industry-top-n")? {
            self.rollup.industry_top_n = v;
        }
        if has_flag(args, "--overwrite") {
            self.rollup.overwrite = true;
        }
        if has_flag(args, "--include-industry") {
            self.rollup.include_industry = true;
        }

        if let Some(v) = arg_value(args, "--link-days-back")? {
            self.link_days_back = v;
        }
        if let Some(v) = arg_value(args, "--limit")? {
            self.link_limit = v;
        }

        if let Some(v) = arg_value(args, "--lookback-hours")? {
            self.news_scores.lookback_hours = v;
        }
        if let Some(v) = arg_value(args, "--min-decayed-weight")? {
            self.news_scores.min_decayed_weight = v;
        }
        if has_flag(args, "--apply-overall") {
            self.news_scores.apply_overall_when_missing = true;
        }

        if let Some(v) = arg_value(args, "--benchmark")? {
            self.recommendation.benchmark = v;
        }
        if let Some(v) = arg_value(args, "--min-cap")? {
            self.recommendation.min_market_cap = v;
        }
        if let Some(v) = arg_value(args, "--universe-limit")? {
            self.recommendation.universe_limit = v;
        }
        if let Some(v) = arg_value(args, "--save-top")? {
            self.recommendation.save_top = v;
        }
        if let Some(v) = arg_value(args, "--rs-threshold")? {
            self.stage2.rs_threshold = v;
        }
        if let Some(raw) = arg_value::<String>(args, "--rs-windows")? {
            self.ranker.windows = parse_triple(&raw, "--rs-windows")?;
        }
        if let Some(raw) = arg_value::<String>(args, "--rs-weights")? {
            self.ranker.weights = parse_triple(&raw, "--rs-weights")?;
        }
        if let Some(v) = arg_value(args, "--news-alpha")? {
            self.recommendation.news_alpha = v;
        }
        if let Some(v) = arg_value(args, "--news-k")? {
            self.recommendation.news_k = v;
        }
        if let Some(path) = arg_value::<String>(args, "--polarity-table")? {
            self.polarity_table = Some(PathBuf::from(path));
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            bail!("DATABASE_URL must not be empty");
        }
        if self.link_days_back < 0 {
            bail!("link days back must not be negative");
        }
        if self.news_scores.lookback_hours < 0 {
            bail!("news score lookback must not be negative");
        }
        self.resolver.validate()?;
        self.rollup.validate()?;
        self.ranker.validate()?;
        self.recommendation.validate()?;
        Ok(())
    }

    /// Polarity table from `POLARITY_TABLE`, or the built-in default
    pub fn load_polarity_table(&self) -> Result<PolarityTable> {
        match &self.polarity_table {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading polarity table {}", path.display()))?;
                Ok(PolarityTable::from_json(&text)?)
            }
            None => Ok(PolarityTable::default()),
        }
    }
}

/// Three comma-separated values, e.g. `21,63,126`
pub fn parse_triple<T>(raw: &str, name: &str) -> Result<[T; 3]>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let values = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid value in {name}: {e}"))
        })
        .collect::<Result<Vec<T>>>()?;
    <[T; 3]>::try_from(values)
        .map_err(|v| anyhow::anyhow!("{name} needs exactly 3 values, got {}", v.len()))
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

/// Parsed value following `name`; a flag without a value is an error
pub fn arg_value<T>(args: &[String], name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(idx) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    let raw = args
        .get(idx + 1)
        .with_context(|| format!("{name} requires a value"))?;
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| anyhow::anyhow!("invalid value for {name}: {e}"))
}
