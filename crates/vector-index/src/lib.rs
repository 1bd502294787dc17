//! Vector Index
//!
//! Cosine nearest-neighbour search over news-chunk and research-object
//! embeddings that share one index, partitioned by object type.

pub mod cosine;
pub mod memory;
pub mod pgvector;

pub use cosine::cosine_similarity;
pub use memory::InMemoryVectorIndex;
pub use pgvector::{PgVectorIndex, TableName};
