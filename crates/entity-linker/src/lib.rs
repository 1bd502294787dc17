//! Entity Linking Module
//!
//! Resolves company, industry and industry-player mentions inside news
//! chunks by fusing an alias-dictionary (lexical) score with the best
//! cosine similarity of the mention's context against research objects.

pub mod alias;
pub mod candidates;
pub mod linker;
pub mod resolver;

pub use alias::{normalize, AliasDictionary, AliasEntry};
pub use candidates::{MentionExtractor, TokenExtractor, MAX_PHRASE_TOKENS};
pub use linker::{EntityLinker, LinkOutcome};
pub use resolver::{context_window, EntityResolver, ResolverConfig};
