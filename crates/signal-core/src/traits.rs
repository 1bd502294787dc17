use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::{IndustryPlayerRecord, ObjectType, PipelineError, PriceSeries, ResearchObject, VectorHit};

/// Approximate nearest-neighbour cosine search over embedded objects
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top `k` hits restricted to `allowed` object types, most similar first.
    /// An empty result is a valid "no match".
    async fn search(
        &self,
        query: &[f32],
        allowed: &[ObjectType],
        k: usize,
    ) -> Result<Vec<VectorHit>, PipelineError>;

    /// Stored vectors of one object keyed by chunk index
    async fn vectors_for(
        &self,
        object_type: ObjectType,
        object_id: i64,
    ) -> Result<BTreeMap<i32, Vec<f32>>, PipelineError>;

    /// Fails with `PipelineError::Configuration` when the index is unusable
    async fn health(&self) -> Result<(), PipelineError>;
}

/// Text embedding collaborator
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;
}

/// Lookup of research objects referenced by vector hits.
///
/// A deleted or unknown object is `Ok(None)`, never an error.
#[async_trait]
pub trait ResearchCatalog: Send + Sync {
    async fn lookup(
        &self,
        object_type: ObjectType,
        object_id: i64,
    ) -> Result<Option<ResearchObject>, PipelineError>;

    /// Players of an industry that are bound to a company
    async fn industry_players(
        &self,
        industry_id: i64,
    ) -> Result<Vec<IndustryPlayerRecord>, PipelineError>;
}

/// Daily price history provider
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// `Ok(None)` when the symbol has no history
    async fn price_history(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Option<PriceSeries>, PipelineError>;
}
