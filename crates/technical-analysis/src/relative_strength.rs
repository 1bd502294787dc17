//! Percentile relative strength against a benchmark

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use signal_core::{PipelineError, RelativeStrengthRow};
use std::collections::BTreeMap;

/// Return over the last `lookback` sessions: `s[-1] / s[-1-lookback] - 1`.
///
/// `None` when the series is too short or the base close is not positive.
pub fn period_return(closes: &[f64], lookback: usize) -> Option<f64> {
    if closes.len() < lookback + 1 {
        return None;
    }
    let last = closes[closes.len() - 1];
    let base = closes[closes.len() - 1 - lookback];
    if base <= 0.0 || !base.is_finite() || !last.is_finite() {
        return None;
    }
    Some(last / base - 1.0)
}

/// `(1 + r_stock) / (1 + r_bench) - 1`, `None` if either leg is undefined
pub fn relative_return(stock: &[f64], bench: &[f64], lookback: usize) -> Option<f64> {
    let rs = period_return(stock, lookback)?;
    let rb = period_return(bench, lookback)?;
    let rel = (1.0 + rs) / (1.0 + rb) - 1.0;
    rel.is_finite().then_some(rel)
}

/// Percentile rank (0, 100] of every defined value among the defined values.
///
/// Ties share the lowest rank: `(count strictly below + 1) / n_defined * 100`.
/// Undefined inputs stay undefined.
pub fn percentile_ranks(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut sorted: Vec<f64> = values.iter().flatten().copied().collect();
    if sorted.is_empty() {
        return vec![None; values.len()];
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len() as f64;

    values
        .iter()
        .map(|v| {
            v.map(|x| {
                let below = sorted.partition_point(|&u| u < x);
                (below as f64 + 1.0) / n * 100.0
            })
        })
        .collect()
}

/// Weighted mean of the defined percentiles, renormalized over their weights
pub fn blend_percentiles(percentiles: &[Option<f64>], weights: &[f64]) -> Option<f64> {
    let (num, den) = percentiles
        .iter()
        .zip(weights.iter())
        .filter_map(|(p, w)| p.map(|p| (p * w, *w)))
        .fold((0.0, 0.0), |(n, d), (pw, w)| (n + pw, d + w));
    (den > 0.0).then(|| num / den)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankerConfig {
    /// Lookbacks in sessions for the 1, 3 and 6 month legs
    pub windows: [usize; 3],
    pub weights: [f64; 3],
    /// Symbols with fewer closes are left out of the ranking
    pub min_history: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            windows: [21, 63, 126],
            weights: [0.2, 0.3, 0.5],
            min_history: 200,
        }
    }
}

impl RankerConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.windows.iter().any(|&w| w == 0) {
            return Err(PipelineError::Configuration(
                "relative strength windows must be positive".to_string(),
            ));
        }
        if self.weights.iter().any(|w| !w.is_finite() || *w < 0.0)
            || self.weights.iter().sum::<f64>() <= 0.0
        {
            return Err(PipelineError::Configuration(
                "relative strength weights must be non-negative with a positive sum".to_string(),
            ));
        }
        Ok(())
    }

    /// Label stored with each recommendation, e.g.
    /// `percentile_relret_1/3/6m_wt=0.2/0.3/0.5`
    pub fn method_label(&self) -> String {
        format!(
            "percentile_relret_1/3/6m_wt={}/{}/{}",
            self.weights[0], self.weights[1], self.weights[2]
        )
    }
}

pub struct RelativeStrengthRanker {
    config: RankerConfig,
}

impl Default for RelativeStrengthRanker {
    fn default() -> Self {
        Self::new(RankerConfig::default())
    }
}

impl RelativeStrengthRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Rank every symbol with at least `min_history` closes against `bench`.
    ///
    /// Symbols whose legs are all undefined are excluded from the result.
    pub fn rank(
        &self,
        closes: &BTreeMap<String, Vec<f64>>,
        bench: &[f64],
    ) -> BTreeMap<String, RelativeStrengthRow> {
        let eligible: Vec<(&String, &Vec<f64>)> = closes
            .iter()
            .filter(|(_, c)| c.len() >= self.config.min_history)
            .collect();

        let windows = self.config.windows;
        let relative: Vec<[Option<f64>; 3]> = eligible
            .par_iter()
            .map(|(_, c)| windows.map(|w| relative_return(c, bench, w)))
            .collect();

        let legs: Vec<Vec<Option<f64>>> = (0..3)
            .map(|leg| percentile_ranks(&relative.iter().map(|r| r[leg]).collect::<Vec<_>>()))
            .collect();

        eligible
            .iter()
            .enumerate()
            .filter_map(|(i, (symbol, _))| {
                let p = [legs[0][i], legs[1][i], legs[2][i]];
                let rs100 = blend_percentiles(&p, &self.config.weights)?;
                Some((
                    (*symbol).clone(),
                    RelativeStrengthRow {
                        p1m: p[0],
                        p3m: p[1],
                        p6m: p[2],
                        rs100: Some(rs100),
                    },
                ))
            })
            .collect()
    }
}
