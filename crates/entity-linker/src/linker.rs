//! Batch driver: candidate extraction plus resolution over many chunks

use serde::{Deserialize, Serialize};
use signal_core::{Mention, MentionCandidate, NewsChunk, PipelineError, RunStats};
use tracing::{debug, info, warn};

use crate::candidates::{MentionExtractor, TokenExtractor};
use crate::resolver::EntityResolver;

/// Mentions produced by one linking run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkOutcome {
    pub mentions: Vec<Mention>,
    pub stats: RunStats,
}

pub struct EntityLinker {
    resolver: EntityResolver,
    extractors: Vec<Box<dyn MentionExtractor>>,
}

impl EntityLinker {
    /// Linker whose only candidate source is the token scanner
    pub fn new(resolver: EntityResolver) -> Self {
        Self {
            resolver,
            extractors: vec![Box::new(TokenExtractor::new())],
        }
    }

    /// Add an extractor (e.g. an NER adapter). Added extractors run in the
    /// order they were added, all before the built-in token scanner.
    pub fn with_extractor(mut self, extractor: Box<dyn MentionExtractor>) -> Self {
        let at = self.extractors.len().saturating_sub(1);
        self.extractors.insert(at, extractor);
        self
    }

    /// Candidates whose key is a known alias, in extractor order
    fn candidates(&self, text: &str) -> Vec<MentionCandidate> {
        let aliases = self.resolver.aliases();
        self.extractors
            .iter()
            .flat_map(|e| e.candidates(text))
            .filter(|c| aliases.contains(&c.normalized_key))
            .collect()
    }

    /// Link every chunk. A chunk whose embedding fails is skipped and
    /// tallied; fatal errors abort the run.
    pub async fn link(&self, chunks: &[NewsChunk]) -> Result<LinkOutcome, PipelineError> {
        let mut outcome = LinkOutcome::default();

        if self.resolver.aliases().is_empty() {
            warn!("Alias dictionary is empty; no mentions can be resolved");
        }

        for chunk in chunks {
            let candidates = self.candidates(&chunk.text);
            if candidates.is_empty() {
                outcome.stats.skip("no_candidates");
                continue;
            }

            match self.resolver.resolve_chunk(chunk, &candidates).await {
                Ok(mentions) => {
                    debug!(
                        news_id = chunk.news_id,
                        chunk = chunk.chunk_index,
                        mentions = mentions.len(),
                        "chunk linked"
                    );
                    outcome.stats.processed += 1;
                    outcome.mentions.extend(mentions);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping chunk: {}", e);
                    outcome.stats.skip("embedding_failed");
                }
            }
        }

        info!(
            chunks = chunks.len(),
            mentions = outcome.mentions.len(),
            skipped = outcome.stats.skipped,
            "Entity linking complete"
        );
        Ok(outcome)
    }
}
