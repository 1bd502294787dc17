//! Structured news-score rollup
//!
//! Sums `impact * credibility * novelty * decayed_weight * sentiment` per
//! matched company (by ticker) and industry (by name) into window scores.
//! Independent of the vector-hit rollup; the two never share a number.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use signal_core::{
    CompanyRecord, EntityKind, IndustryRecord, NewsScorePayload, NewsWindowScore, PipelineError,
    RunStats, ScoredNewsItem,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Half-life assumed when a payload carries none
pub const DEFAULT_HALF_LIFE_HOURS: f64 = 72.0;

/// Multiplier filled in when the scorer omitted the whole `scores` block
const MISSING_SCORE_DEFAULT: f64 = 0.5;

/// Strip a surrounding Markdown code fence (` ``` ` or ` ```json `)
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.trim()
}

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

/// Parse a scorer payload and recompute its decayed weight.
///
/// `decayed_weight = exp(-max(0, age_hours) / half_life_hours)` where age is
/// measured from `published_at` to `scored_at`; 1.0 when the publish time is
/// unknown. A missing `scores` block gets neutral 0.5 multipliers.
pub fn parse_news_scores(
    raw: &str,
    published_at: Option<DateTime<Utc>>,
    scored_at: DateTime<Utc>,
) -> Result<NewsScorePayload, PipelineError> {
    let text = strip_code_fence(raw);
    let value: Value = serde_json::from_str(text)
        .map_err(|e| PipelineError::InvalidData(format!("news score payload: {e}")))?;
    if !value.is_object() {
        return Err(PipelineError::InvalidData(
            "news score payload is not a JSON object".to_string(),
        ));
    }
    let has_scores = value.get("scores").map(|s| s.is_object()).unwrap_or(false);

    let mut payload: NewsScorePayload = serde_json::from_value(value)
        .map_err(|e| PipelineError::InvalidData(format!("news score payload: {e}")))?;

    if !has_scores {
        payload.scores.impact_score = MISSING_SCORE_DEFAULT;
        payload.scores.credibility_score = MISSING_SCORE_DEFAULT;
        payload.scores.novelty_score = MISSING_SCORE_DEFAULT;
        payload.scores.decay_half_life_hours = DEFAULT_HALF_LIFE_HOURS;
    }
    if !payload.scores.decay_half_life_hours.is_finite()
        || payload.scores.decay_half_life_hours <= 0.0
    {
        payload.scores.decay_half_life_hours = DEFAULT_HALF_LIFE_HOURS;
    }

    payload.scores.decayed_weight = match published_at {
        Some(published) => {
            let age_hours = ((scored_at - published).num_seconds() as f64 / 3600.0).max(0.0);
            round6((-age_hours / payload.scores.decay_half_life_hours).exp())
        }
        None => 1.0,
    };

    Ok(payload)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsScoreRollupOptions {
    pub lookback_hours: i64,
    pub min_decayed_weight: f64,
    /// Spread `base * sentiment_overall` over linked entities of a kind
    /// when no target of that kind matched
    pub apply_overall_when_missing: bool,
}

impl Default for NewsScoreRollupOptions {
    fn default() -> Self {
        Self {
            lookback_hours: 24 * 7,
            min_decayed_weight: 0.05,
            apply_overall_when_missing: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsScoreOutcome {
    pub company_scores: Vec<NewsWindowScore>,
    pub industry_scores: Vec<NewsWindowScore>,
    pub considered_news: usize,
    pub stats: RunStats,
}

#[derive(Debug, Default, Clone, Copy)]
struct WindowTotal {
    sum: f64,
    count: i64,
}

impl WindowTotal {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }
}

/// Matches payload targets against the catalog and sums window scores
pub struct NewsScoreAggregator {
    companies_by_symbol: HashMap<String, i64>,
    industries_by_name: HashMap<String, i64>,
    options: NewsScoreRollupOptions,
}

impl NewsScoreAggregator {
    pub fn new(
        companies: &[CompanyRecord],
        industries: &[IndustryRecord],
        options: NewsScoreRollupOptions,
    ) -> Self {
        Self {
            companies_by_symbol: companies.iter().map(|c| (c.ticker.clone(), c.id)).collect(),
            industries_by_name: industries.iter().map(|i| (i.name.clone(), i.id)).collect(),
            options,
        }
    }

    /// Aggregate items published within the lookback, oldest first.
    pub fn aggregate(&self, items: &[ScoredNewsItem], now: DateTime<Utc>) -> NewsScoreOutcome {
        let since = now - Duration::hours(self.options.lookback_hours);
        let mut ordered: Vec<&ScoredNewsItem> =
            items.iter().filter(|i| i.published_at >= since).collect();
        ordered.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then(a.news_id.cmp(&b.news_id))
        });

        let mut companies: BTreeMap<i64, WindowTotal> = BTreeMap::new();
        let mut industries: BTreeMap<i64, WindowTotal> = BTreeMap::new();
        let mut outcome = NewsScoreOutcome::default();

        for item in ordered {
            let scores = &item.payload.scores;
            if scores.decayed_weight < self.options.min_decayed_weight {
                outcome.stats.skip("decayed");
                continue;
            }
            let base = scores.impact_score
                * scores.credibility_score
                * scores.novelty_score
                * scores.decayed_weight;
            if base == 0.0 {
                outcome.stats.skip("zero_base");
                continue;
            }

            let mut matched_companies = BTreeSet::new();
            let mut matched_industries = BTreeSet::new();

            for target in &item.payload.targets {
                let key = target.target.trim();
                if let Some(&id) = self.companies_by_symbol.get(key) {
                    companies.entry(id).or_default().add(base * target.score);
                    matched_companies.insert(id);
                } else if let Some(&id) = self.industries_by_name.get(key) {
                    industries.entry(id).or_default().add(base * target.score);
                    matched_industries.insert(id);
                } else {
                    debug!(news_id = item.news_id, target = key, "unmatched score target");
                }
            }

            if self.options.apply_overall_when_missing {
                let overall = base * item.payload.sentiment_overall;
                if matched_companies.is_empty() {
                    for &id in &item.linked_company_ids {
                        companies.entry(id).or_default().add(overall);
                    }
                }
                if matched_industries.is_empty() {
                    for &id in &item.linked_industry_ids {
                        industries.entry(id).or_default().add(overall);
                    }
                }
            }

            outcome.considered_news += 1;
            outcome.stats.processed += 1;
        }

        let finish = |kind: EntityKind, totals: BTreeMap<i64, WindowTotal>| -> Vec<NewsWindowScore> {
            totals
                .into_iter()
                .map(|(entity_id, t)| NewsWindowScore {
                    entity_kind: kind,
                    entity_id,
                    window_score: t.sum,
                    window_count: t.count,
                    last_aggregated_at: now,
                })
                .collect()
        };
        outcome.company_scores = finish(EntityKind::Company, companies);
        outcome.industry_scores = finish(EntityKind::Industry, industries);
        outcome.stats.companies_updated = outcome.company_scores.len();
        outcome.stats.industries_updated = outcome.industry_scores.len();

        info!(
            "considered_news={} updated_companies={} updated_industries={}",
            outcome.considered_news,
            outcome.stats.companies_updated,
            outcome.stats.industries_updated
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use signal_core::{ScoreBlock, SentimentTarget};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn catalog() -> (Vec<CompanyRecord>, Vec<IndustryRecord>) {
        (
            vec![CompanyRecord {
                id: 1,
                ticker: "NVDA".to_string(),
                name: "Nvidia".to_string(),
                market_cap: Some(3.0e12),
                is_active: true,
            }],
            vec![IndustryRecord {
                id: 10,
                name: "Semiconductors".to_string(),
            }],
        )
    }

    fn item(news_id: i64, hours_ago: i64, targets: Vec<(&str, f64)>, decayed: f64) -> ScoredNewsItem {
        ScoredNewsItem {
            news_id,
            published_at: now() - Duration::hours(hours_ago),
            payload: NewsScorePayload {
                sentiment_overall: 0.5,
                targets: targets
                    .into_iter()
                    .map(|(t, s)| SentimentTarget {
                        target: t.to_string(),
                        score: s,
                        confidence: 0.9,
                    })
                    .collect(),
                scores: ScoreBlock {
                    impact_score: 1.0,
                    credibility_score: 0.5,
                    novelty_score: 0.8,
                    decayed_weight: decayed,
                    decay_half_life_hours: 72.0,
                },
            },
            linked_company_ids: vec![1],
            linked_industry_ids: vec![10],
        }
    }

    fn aggregator(options: NewsScoreRollupOptions) -> NewsScoreAggregator {
        let (companies, industries) = catalog();
        NewsScoreAggregator::new(&companies, &industries, options)
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```{\"a\":1}"), "```{\"a\":1}");
    }

    #[test]
    fn test_parse_recomputes_decayed_weight() {
        let raw = r#"```json
        {"sentiment_overall": 0.4,
         "targets": [{"target": "NVDA", "score": 0.7, "confidence": 0.9}],
         "scores": {"impact_score": 0.9, "credibility_score": 0.8, "novelty_score": 0.6,
                    "decayed_weight": 0.0, "decay_half_life_hours": 24}}
        ```"#;
        let published = now() - Duration::hours(24);
        let payload = parse_news_scores(raw, Some(published), now()).unwrap();
        assert!((payload.scores.decayed_weight - round6((-1.0f64).exp())).abs() < 1e-12);
        assert_eq!(payload.targets.len(), 1);

        let undated = parse_news_scores(raw, None, now()).unwrap();
        assert_eq!(undated.scores.decayed_weight, 1.0);
    }

    #[test]
    fn test_parse_fills_missing_scores_block() {
        let payload = parse_news_scores(r#"{"sentiment_overall": -0.2}"#, Some(now()), now()).unwrap();
        assert_eq!(payload.scores.impact_score, 0.5);
        assert_eq!(payload.scores.novelty_score, 0.5);
        assert_eq!(payload.scores.decayed_weight, 1.0);
    }

    #[test]
    fn test_parse_target_without_score() {
        let raw = r#"{"targets": [{"target": "NVDA"}, {"target": "AMD", "score": -0.4}],
                      "scores": {"impact_score": 1.0, "credibility_score": 1.0, "novelty_score": 1.0}}"#;
        let payload = parse_news_scores(raw, None, now()).unwrap();
        assert_eq!(payload.targets.len(), 2);
        assert_eq!(payload.targets[0].score, 0.0);
        assert_eq!(payload.targets[0].confidence, 0.0);
        assert_eq!(payload.targets[1].score, -0.4);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_news_scores("not json", None, now()).is_err());
        assert!(parse_news_scores("[1, 2]", None, now()).is_err());
    }

    #[test]
    fn test_aggregate_sums_matched_targets() {
        let agg = aggregator(NewsScoreRollupOptions::default());
        let items = vec![
            item(1, 5, vec![("NVDA", 0.5), ("Semiconductors", -1.0)], 1.0),
            item(2, 2, vec![(" NVDA ", 1.0), ("Unknown Co", 1.0)], 0.5),
        ];
        let outcome = agg.aggregate(&items, now());

        // base item1 = 1*0.5*0.8*1.0 = 0.4; item2 = 0.2
        assert_eq!(outcome.considered_news, 2);
        assert_eq!(outcome.company_scores.len(), 1);
        let nvda = &outcome.company_scores[0];
        assert!((nvda.window_score - (0.4 * 0.5 + 0.2 * 1.0)).abs() < 1e-12);
        assert_eq!(nvda.window_count, 2);
        assert_eq!(nvda.last_aggregated_at, now());

        let semis = &outcome.industry_scores[0];
        assert!((semis.window_score + 0.4).abs() < 1e-12);
        assert_eq!(semis.window_count, 1);
    }

    #[test]
    fn test_aggregate_skips_decayed_and_zero_base_and_old() {
        let agg = aggregator(NewsScoreRollupOptions::default());
        let mut zero = item(2, 1, vec![("NVDA", 1.0)], 1.0);
        zero.payload.scores.novelty_score = 0.0;
        let items = vec![
            item(1, 1, vec![("NVDA", 1.0)], 0.01),
            zero,
            item(3, 200, vec![("NVDA", 1.0)], 1.0),
        ];
        let outcome = agg.aggregate(&items, now());
        assert_eq!(outcome.considered_news, 0);
        assert!(outcome.company_scores.is_empty());
        assert_eq!(outcome.stats.skip_reasons["decayed"], 1);
        assert_eq!(outcome.stats.skip_reasons["zero_base"], 1);
    }

    #[test]
    fn test_overall_fallback_only_for_unmatched_kinds() {
        let agg = aggregator(NewsScoreRollupOptions {
            apply_overall_when_missing: true,
            ..NewsScoreRollupOptions::default()
        });
        let items = vec![item(1, 1, vec![("NVDA", 1.0)], 1.0)];
        let outcome = agg.aggregate(&items, now());

        // company matched directly, so only the industry receives the fallback
        assert_eq!(outcome.company_scores[0].window_count, 1);
        assert!((outcome.company_scores[0].window_score - 0.4).abs() < 1e-12);
        assert_eq!(outcome.industry_scores.len(), 1);
        assert!((outcome.industry_scores[0].window_score - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_fallback_disabled_by_default() {
        let agg = aggregator(NewsScoreRollupOptions::default());
        let outcome = agg.aggregate(&[item(1, 1, vec![], 1.0)], now());
        assert_eq!(outcome.considered_news, 1);
        assert!(outcome.company_scores.is_empty());
        assert!(outcome.industry_scores.is_empty());
    }
}
