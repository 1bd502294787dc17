//! Recommendation Engine
//!
//! Blends percentile relative strength, the Stage-2 trend template and the
//! news window score into a daily ranked list of trade candidates.

pub mod builder;
pub mod news_weight;
pub mod rounding;
pub mod universe;

pub use builder::{RecommendationBuilder, RecommendationConfig, RecommendationRun};
pub use news_weight::news_weight_factor;
pub use universe::select_universe;
