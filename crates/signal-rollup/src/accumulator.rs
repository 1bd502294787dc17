use chrono::{DateTime, Utc};
use signal_core::{Contribution, EntityKind, Signal};
use std::collections::{BTreeMap, HashMap};

/// Number of news ids kept on a signal
pub const TOP_NEWS_LIMIT: usize = 10;

#[derive(Debug, Default)]
struct EntityTotals {
    score: f64,
    details: Vec<Contribution>,
    /// Max |contribution| per news id, in first-seen order
    news_abs: Vec<(i64, f64)>,
    news_pos: HashMap<i64, usize>,
}

impl EntityTotals {
    fn add(&mut self, contribution: Contribution) {
        self.score += contribution.contribution;

        let magnitude = contribution.contribution.abs();
        match self.news_pos.get(&contribution.news_id) {
            Some(&pos) => {
                let slot = &mut self.news_abs[pos].1;
                *slot = slot.max(magnitude);
            }
            None => {
                self.news_pos
                    .insert(contribution.news_id, self.news_abs.len());
                self.news_abs.push((contribution.news_id, magnitude));
            }
        }

        self.details.push(contribution);
    }
}

/// Up to `limit` news ids by descending magnitude. Ties keep first-seen order.
pub fn top_news_ids(news_abs: &[(i64, f64)], limit: usize) -> Vec<i64> {
    let mut ranked: Vec<(i64, f64)> = news_abs.to_vec();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().take(limit).map(|(id, _)| id).collect()
}

/// Per-entity running sums for one rollup run.
///
/// Contributions are summed in insertion order, so identical input yields
/// identical scores.
#[derive(Debug)]
pub struct SignalAccumulator {
    kind: EntityKind,
    entities: BTreeMap<i64, EntityTotals>,
}

impl SignalAccumulator {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entities: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn add(&mut self, entity_id: i64, contribution: Contribution) {
        self.entities.entry(entity_id).or_default().add(contribution);
    }

    pub fn score(&self, entity_id: i64) -> Option<f64> {
        self.entities.get(&entity_id).map(|e| e.score)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// One signal per touched entity, ordered by entity id
    pub fn into_signals(
        self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Vec<Signal> {
        let kind = self.kind;
        self.entities
            .into_iter()
            .map(|(entity_id, totals)| Signal {
                entity_kind: kind,
                entity_id,
                window_start,
                window_end,
                score: totals.score,
                top_news_ids: top_news_ids(&totals.news_abs, TOP_NEWS_LIMIT),
                details: totals.details,
                updated_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_core::ObjectType;

    fn contribution(news_id: i64, value: f64) -> Contribution {
        Contribution {
            news_id,
            chunk_id: 0,
            object_type: ObjectType::CompanyRisk,
            object_id: 1,
            similarity: 1.0,
            polarity: value.signum(),
            decay: 1.0,
            contribution: value,
            note: None,
        }
    }

    #[test]
    fn test_scores_sum_per_entity() {
        let mut acc = SignalAccumulator::new(EntityKind::Company);
        acc.add(1, contribution(10, 0.5));
        acc.add(1, contribution(11, -0.2));
        acc.add(2, contribution(10, 0.1));

        assert_eq!(acc.len(), 2);
        assert!((acc.score(1).unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(acc.score(3), None);
    }

    #[test]
    fn test_top_news_uses_max_abs_per_news() {
        let mut acc = SignalAccumulator::new(EntityKind::Company);
        acc.add(1, contribution(10, 0.1));
        acc.add(1, contribution(11, -0.9));
        acc.add(1, contribution(10, 0.5));
        acc.add(1, contribution(12, 0.3));

        let now = Utc::now();
        let signals = acc.into_signals(now, now, now);
        assert_eq!(signals[0].top_news_ids, vec![11, 10, 12]);
        assert_eq!(signals[0].details.len(), 4);
    }

    #[test]
    fn test_top_news_truncates_and_keeps_tie_order() {
        let news: Vec<(i64, f64)> = (0..15).map(|i| (i, 1.0)).collect();
        let top = top_news_ids(&news, TOP_NEWS_LIMIT);
        assert_eq!(top, (0..10).collect::<Vec<_>>());
    }
}
