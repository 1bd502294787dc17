//! Candidate mention extraction
//!
//! Named-entity recognition is an external collaborator behind
//! [`MentionExtractor`]. The built-in [`TokenExtractor`] splits text into
//! runs of `[A-Za-z0-9.-]` at least two characters long, regardless of case,
//! and proposes each token plus phrases of up to [`MAX_PHRASE_TOKENS`]
//! whitespace-separated tokens. Tickers (`NVDA`, `BRK.B`) and names
//! (`Nvidia`, `Apple Inc.`) both come out of the same scan; the linker keeps
//! only candidates whose key is a known alias.

use regex::Regex;
use signal_core::MentionCandidate;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::alias::normalize;

/// Longest phrase, in tokens, proposed as one candidate
pub const MAX_PHRASE_TOKENS: usize = 4;

static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9.\-]{2,}").expect("token pattern is valid"));

/// Produces candidate mentions from chunk text. Offsets are in characters.
pub trait MentionExtractor: Send + Sync {
    fn candidates(&self, text: &str) -> Vec<MentionCandidate>;
}

#[derive(Debug, Clone, Copy)]
pub struct TokenExtractor {
    max_phrase_tokens: usize,
}

impl Default for TokenExtractor {
    fn default() -> Self {
        Self {
            max_phrase_tokens: MAX_PHRASE_TOKENS,
        }
    }
}

impl TokenExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only single tokens, no phrases
    pub fn single_tokens() -> Self {
        Self {
            max_phrase_tokens: 1,
        }
    }
}

/// Byte spans of every token, with leading and trailing `.`/`-` trimmed
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    TOKEN_REGEX
        .find_iter(text)
        .filter_map(|m| {
            let raw = m.as_str();
            let trimmed = raw.trim_matches(|c| c == '.' || c == '-');
            if trimmed.len() < 2 {
                return None;
            }
            let lead = raw.len() - raw.trim_start_matches(|c| c == '.' || c == '-').len();
            let start = m.start() + lead;
            Some((start, start + trimmed.len()))
        })
        .collect()
}

impl MentionExtractor for TokenExtractor {
    /// Longest phrase first at each position; a key is reported once, at its
    /// first occurrence.
    fn candidates(&self, text: &str) -> Vec<MentionCandidate> {
        let spans = token_spans(text);
        let char_starts: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        let to_char = |byte: usize| char_starts.partition_point(|&b| b < byte);

        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for (i, &(start, _)) in spans.iter().enumerate() {
            // Phrases only continue across plain whitespace
            let mut last = i;
            while last + 1 < spans.len()
                && last + 1 - i < self.max_phrase_tokens
                && text[spans[last].1..spans[last + 1].0]
                    .chars()
                    .all(char::is_whitespace)
            {
                last += 1;
            }

            for j in (i..=last).rev() {
                let end = spans[j].1;
                let surface = &text[start..end];
                let key = normalize(surface);
                if key.is_empty() || !seen.insert(key.clone()) {
                    continue;
                }
                out.push(MentionCandidate {
                    surface_text: surface.to_string(),
                    start: to_char(start),
                    end: to_char(end),
                    normalized_key: key,
                });
            }
        }

        out
    }
}
