use serde::{Deserialize, Serialize};
use signal_core::{
    Embedder, Mention, MentionCandidate, NewsChunk, ObjectType, PipelineError, TargetType,
    VectorIndex,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::alias::AliasDictionary;

/// Method label written on every resolved mention
pub const METHOD_HYBRID: &str = "hybrid";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Weight of the lexical (alias) score
    pub alpha: f64,
    /// Weight of the semantic (vector) score
    pub beta: f64,
    /// Characters of context taken on each side of a mention
    pub context_window: usize,
    pub min_score: f64,
    pub top_k: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            beta: 0.7,
            context_window: 120,
            min_score: 0.35,
            top_k: 8,
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.alpha.is_finite() || !self.beta.is_finite() || !self.min_score.is_finite() {
            return Err(PipelineError::Configuration(
                "resolver weights and min_score must be finite".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(PipelineError::Configuration(
                "resolver top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn hybrid_score(&self, lexical: f64, semantic: f64) -> f64 {
        self.alpha * lexical + self.beta * semantic
    }
}

/// Substring of `text` spanning `window` characters either side of the
/// character range `start..end`, clamped to the text.
pub fn context_window(text: &str, start: usize, end: usize, window: usize) -> String {
    let len = text.chars().count();
    let from = start.saturating_sub(window).min(len);
    let to = end.saturating_add(window).min(len);
    if from >= to {
        return String::new();
    }
    text.chars().skip(from).take(to - from).collect()
}

/// Resolves candidate mentions of one chunk to catalog targets
pub struct EntityResolver {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    aliases: Arc<AliasDictionary>,
    config: ResolverConfig,
}

impl EntityResolver {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        aliases: Arc<AliasDictionary>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            aliases,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn aliases(&self) -> &AliasDictionary {
        &self.aliases
    }

    /// Score every candidate whose key is a known alias and keep those at or
    /// above `min_score`. A target is emitted at most once per chunk, by the
    /// first candidate (in input order) that resolves to it.
    ///
    /// Embedding failures surface as `PipelineError::Upstream` for the chunk.
    pub async fn resolve_chunk(
        &self,
        chunk: &NewsChunk,
        candidates: &[MentionCandidate],
    ) -> Result<Vec<Mention>, PipelineError> {
        let known: Vec<&MentionCandidate> = candidates
            .iter()
            .filter(|c| self.aliases.contains(&c.normalized_key))
            .collect();
        if known.is_empty() {
            return Ok(Vec::new());
        }

        let item = format!("news {} chunk {}", chunk.news_id, chunk.chunk_index);
        let contexts: Vec<String> = known
            .iter()
            .map(|c| context_window(&chunk.text, c.start, c.end, self.config.context_window))
            .collect();
        let vectors = self
            .embedder
            .embed(&contexts)
            .await
            .map_err(|e| PipelineError::upstream(&item, e))?;
        if vectors.len() != contexts.len() {
            return Err(PipelineError::upstream(
                &item,
                format!(
                    "embedder returned {} vectors for {} contexts",
                    vectors.len(),
                    contexts.len()
                ),
            ));
        }

        let mut seen: HashSet<(TargetType, i64)> = HashSet::new();
        let mut mentions = Vec::new();

        for (candidate, query) in known.into_iter().zip(vectors.iter()) {
            let hits = self
                .index
                .search(query, &ObjectType::RESEARCH, self.config.top_k)
                .await?;
            let semantic = hits
                .iter()
                .map(|h| h.similarity)
                .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))
                .unwrap_or(0.0);

            let (Some(lexical), Some(target)) = (
                self.aliases.lexical_score(&candidate.normalized_key),
                self.aliases.first_target(&candidate.normalized_key),
            ) else {
                continue;
            };

            let score = self.config.hybrid_score(lexical, semantic);
            if score < self.config.min_score {
                debug!(
                    surface = %candidate.surface_text,
                    score,
                    "mention below threshold"
                );
                continue;
            }

            if !seen.insert((target.target_type, target.target_id)) {
                continue;
            }

            mentions.push(Mention {
                news_id: chunk.news_id,
                chunk_index: chunk.chunk_index,
                surface_text: candidate.surface_text.clone(),
                start_char: candidate.start,
                end_char: candidate.end,
                normalized_key: candidate.normalized_key.clone(),
                lexical_score: lexical,
                semantic_score: semantic,
                final_score: score,
                target_type: target.target_type,
                target_id: target.target_id,
                method: METHOD_HYBRID.to_string(),
            });
        }

        Ok(mentions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use signal_core::ChunkVector;
    use vector_index::InMemoryVectorIndex;

    /// Embeds every text to the same fixed vector
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
            Err(PipelineError::Configuration("connection refused".to_string()))
        }
    }

    fn candidate(surface: &str, start: usize) -> MentionCandidate {
        MentionCandidate {
            surface_text: surface.to_string(),
            start,
            end: start + surface.chars().count(),
            normalized_key: crate::alias::normalize(surface),
        }
    }

    fn chunk(text: &str) -> NewsChunk {
        NewsChunk {
            news_id: 7,
            chunk_index: 0,
            text: text.to_string(),
            published_at: Utc::now(),
        }
    }

    fn research_index() -> Arc<InMemoryVectorIndex> {
        Arc::new(InMemoryVectorIndex::from_vectors(vec![ChunkVector {
            object_type: ObjectType::CompanyProfile,
            object_id: 1,
            chunk_index: 0,
            vector: vec![1.0, 0.0],
            metadata: serde_json::Value::Null,
        }]))
    }

    fn aliases() -> Arc<AliasDictionary> {
        let mut dict = AliasDictionary::new();
        dict.add("AAPL", TargetType::Company, 1, 2.0);
        dict.add("Apple", TargetType::Company, 1, 1.5);
        dict.add("Pear", TargetType::Company, 2, 0.1);
        Arc::new(dict)
    }

    fn resolver(embedder: Arc<dyn Embedder>) -> EntityResolver {
        EntityResolver::new(research_index(), embedder, aliases(), ResolverConfig::default())
    }

    #[test]
    fn test_context_window_clamps() {
        assert_eq!(context_window("abcdefghij", 4, 6, 2), "cdefgh");
        assert_eq!(context_window("abcdefghij", 0, 2, 5), "abcdefg");
        assert_eq!(context_window("abc", 1, 2, 100), "abc");
        assert_eq!(context_window("héllo wörld", 6, 11, 1), " wörld");
    }

    #[test]
    fn test_hybrid_score() {
        let cfg = ResolverConfig::default();
        let s = cfg.hybrid_score(2.0, 0.5);
        assert!((s - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let cfg = ResolverConfig {
            top_k: 0,
            ..ResolverConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(ResolverConfig::default().validate().is_ok());
    }

    #[tokio::test]
    async fn test_resolves_known_alias() {
        let r = resolver(Arc::new(FixedEmbedder(vec![1.0, 0.0])));
        let text = "AAPL shares climbed";
        let mentions = r.resolve_chunk(&chunk(text), &[candidate("AAPL", 0)]).await.unwrap();

        assert_eq!(mentions.len(), 1);
        let m = &mentions[0];
        assert_eq!(m.target_type, TargetType::Company);
        assert_eq!(m.target_id, 1);
        assert_eq!(m.lexical_score, 2.0);
        assert!((m.semantic_score - 1.0).abs() < 1e-9);
        assert!((m.final_score - 1.3).abs() < 1e-9);
        assert_eq!(m.method, "hybrid");
    }

    #[tokio::test]
    async fn test_unknown_alias_dropped() {
        let r = resolver(Arc::new(FixedEmbedder(vec![1.0, 0.0])));
        let mentions = r
            .resolve_chunk(&chunk("MSFT fell"), &[candidate("MSFT", 0)])
            .await
            .unwrap();
        assert!(mentions.is_empty());
    }

    #[tokio::test]
    async fn test_below_threshold_dropped() {
        // 0.3 * 0.1 + 0.7 * 0.0 = 0.03
        let r = resolver(Arc::new(FixedEmbedder(vec![0.0, 1.0])));
        let mentions = r
            .resolve_chunk(&chunk("Pear growers"), &[candidate("Pear", 0)])
            .await
            .unwrap();
        assert!(mentions.is_empty());
    }

    #[tokio::test]
    async fn test_same_target_emitted_once_per_chunk() {
        let r = resolver(Arc::new(FixedEmbedder(vec![1.0, 0.0])));
        let text = "Apple (AAPL) beat";
        let mentions = r
            .resolve_chunk(&chunk(text), &[candidate("Apple", 0), candidate("AAPL", 7)])
            .await
            .unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].surface_text, "Apple");
    }

    #[tokio::test]
    async fn test_no_hits_means_zero_semantic_score() {
        let r = EntityResolver::new(
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            aliases(),
            ResolverConfig::default(),
        );
        let mentions = r
            .resolve_chunk(&chunk("AAPL"), &[candidate("AAPL", 0)])
            .await
            .unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].semantic_score, 0.0);
        assert!((mentions[0].final_score - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_upstream() {
        let r = resolver(Arc::new(FailingEmbedder));
        let err = r
            .resolve_chunk(&chunk("AAPL"), &[candidate("AAPL", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Upstream { .. }));
        assert!(!err.is_fatal());
    }
}
