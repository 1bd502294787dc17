//! Alias dictionary
//!
//! Maps a normalized surface form to every target registered under it, in
//! registration order. The first registered target of a key is the one a
//! mention resolves to.

use serde::{Deserialize, Serialize};
use signal_core::{CompanyRecord, IndustryPlayerRecord, IndustryRecord, TargetType};
use std::collections::HashMap;

/// Alias weights used when building the dictionary from the catalog
const COMPANY_TICKER_WEIGHT: f64 = 2.0;
const COMPANY_NAME_WEIGHT: f64 = 1.5;
const INDUSTRY_NAME_WEIGHT: f64 = 1.0;
const PLAYER_COMPANY_TICKER_WEIGHT: f64 = 1.5;
const PLAYER_COMPANY_NAME_WEIGHT: f64 = 1.2;
const PLAYER_NAME_WEIGHT: f64 = 1.0;

/// Uppercase, collapse every run of characters outside `[A-Z0-9]` into a
/// single space, trim.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;

    for ch in s.chars().flat_map(|c| c.to_uppercase()) {
        if ch.is_ascii_uppercase() || ch.is_ascii_digit() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }

    out
}

/// One target registered under an alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub target_type: TargetType,
    pub target_id: i64,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasDictionary {
    entries: HashMap<String, Vec<AliasEntry>>,
}

impl AliasDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `alias` for a target. Aliases that normalize to nothing are ignored.
    pub fn add(&mut self, alias: &str, target_type: TargetType, target_id: i64, weight: f64) {
        let key = normalize(alias);
        if key.is_empty() {
            return;
        }
        self.entries.entry(key).or_default().push(AliasEntry {
            target_type,
            target_id,
            weight,
        });
    }

    /// Build from the reference catalog.
    ///
    /// Companies register ticker and name; industries their name; players
    /// register the bound company's ticker and name plus their own name.
    pub fn from_catalog(
        companies: &[CompanyRecord],
        industries: &[IndustryRecord],
        players: &[IndustryPlayerRecord],
    ) -> Self {
        let mut dict = Self::new();
        let by_id: HashMap<i64, &CompanyRecord> = companies.iter().map(|c| (c.id, c)).collect();

        for c in companies {
            dict.add(&c.ticker, TargetType::Company, c.id, COMPANY_TICKER_WEIGHT);
            dict.add(&c.name, TargetType::Company, c.id, COMPANY_NAME_WEIGHT);
        }
        for ind in industries {
            dict.add(&ind.name, TargetType::Industry, ind.id, INDUSTRY_NAME_WEIGHT);
        }
        for p in players {
            if let Some(company) = p.company_id.and_then(|id| by_id.get(&id)) {
                dict.add(
                    &company.ticker,
                    TargetType::IndustryPlayer,
                    p.id,
                    PLAYER_COMPANY_TICKER_WEIGHT,
                );
                dict.add(
                    &company.name,
                    TargetType::IndustryPlayer,
                    p.id,
                    PLAYER_COMPANY_NAME_WEIGHT,
                );
            }
            dict.add(&p.name, TargetType::IndustryPlayer, p.id, PLAYER_NAME_WEIGHT);
        }

        dict
    }

    /// Targets registered under an already-normalized key
    pub fn get(&self, key: &str) -> Option<&[AliasEntry]> {
        self.entries
            .get(key)
            .map(|v| v.as_slice())
            .filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Highest alias weight registered under the key
    pub fn lexical_score(&self, key: &str) -> Option<f64> {
        self.get(key)
            .map(|entries| entries.iter().map(|e| e.weight).fold(f64::NEG_INFINITY, f64::max))
    }

    /// First registered target for the key
    pub fn first_target(&self, key: &str) -> Option<&AliasEntry> {
        self.get(key).and_then(|entries| entries.first())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
