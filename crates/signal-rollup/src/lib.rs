//! Signal Rollup
//!
//! Turns news chunk similarity against research objects into time-decayed,
//! polarity-weighted company and industry signals, and separately sums
//! structured news-score payloads into per-entity window scores.

pub mod accumulator;
pub mod distribution;
pub mod engine;
pub mod news_scores;
pub mod polarity;
pub mod resolution;

pub use accumulator::{top_news_ids, SignalAccumulator, TOP_NEWS_LIMIT};
pub use distribution::{industry_weights, DistributionMode};
pub use engine::{RollupEngine, RollupOptions, RollupOutcome, RollupWindow};
pub use news_scores::{
    parse_news_scores, strip_code_fence, NewsScoreAggregator, NewsScoreOutcome,
    NewsScoreRollupOptions,
};
pub use polarity::{PolarityEntry, PolarityTable};
pub use resolution::{resolve_owner, Owner, Resolution};
